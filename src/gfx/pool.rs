// Command buffer pool
//
// Buffers are recycled by fence status, never by age: a buffer goes back
// to the idle list only once the fence of its last submission has
// signaled. Fences are pooled the same way and reset for reuse instead of
// being recreated per submission.
//
// The pool is plain bookkeeping. Native work goes through a
// `CommandAllocator`, passed in on every call, so the same policy runs
// against the Vulkan backend and against host-side fakes.

use std::collections::VecDeque;
use std::fmt;

use anyhow::Result;
use parking_lot::Mutex;

use super::{CommandList, GfxError};

/// Native operations the pool needs from its queue.
pub trait CommandAllocator {
    type Buffer: Copy + PartialEq + fmt::Debug;
    type Fence: Copy + PartialEq + fmt::Debug;

    fn allocate_buffer(&self) -> Result<Self::Buffer>;
    fn reset_buffer(&self, buffer: Self::Buffer) -> Result<()>;
    fn free_buffers(&self, buffers: &[Self::Buffer]);

    /// Create an unsignaled fence.
    fn create_fence(&self) -> Result<Self::Fence>;
    fn reset_fences(&self, fences: &[Self::Fence]) -> Result<()>;
    fn destroy_fence(&self, fence: Self::Fence);

    fn fence_signaled(&self, fence: Self::Fence) -> Result<bool>;

    /// Block until every fence in `fences` has signaled.
    fn wait_fences(&self, fences: &[Self::Fence]) -> Result<()>;
}

struct InFlight<B, F> {
    buffer: B,
    fence: F,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Completed buffers waiting to be handed out again.
    pub idle: usize,
    /// Submitted buffers whose fence has not been observed signaled.
    pub in_flight: usize,
    /// Every live buffer, including those currently held by callers.
    pub allocated: usize,
    pub spare_fences: usize,
}

pub struct CommandBufferPool<A: CommandAllocator> {
    idle: Vec<A::Buffer>,
    in_flight: VecDeque<InFlight<A::Buffer, A::Fence>>,
    spare_fences: Vec<A::Fence>,
    allocated: usize,
}

impl<A: CommandAllocator> Default for CommandBufferPool<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: CommandAllocator> CommandBufferPool<A> {
    pub fn new() -> Self {
        Self {
            idle: Vec::new(),
            in_flight: VecDeque::new(),
            spare_fences: Vec::new(),
            allocated: 0,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            in_flight: self.in_flight.len(),
            allocated: self.allocated,
            spare_fences: self.spare_fences.len(),
        }
    }

    /// Get a buffer ready to record, reusing a completed one if possible.
    pub fn acquire(&mut self, alloc: &A) -> Result<A::Buffer> {
        self.reclaim(alloc)?;

        if let Some(buffer) = self.idle.pop() {
            if let Err(e) = alloc.reset_buffer(buffer) {
                self.idle.push(buffer);
                return Err(e);
            }
            log::trace!("Reusing command buffer {:?}", buffer);
            return Ok(buffer);
        }

        let buffer = alloc.allocate_buffer()?;
        self.allocated += 1;
        log::debug!("Allocated command buffer {:?} ({} live)", buffer, self.allocated);
        Ok(buffer)
    }

    /// Record `buffer` as submitted and return the fence to signal.
    pub fn track(&mut self, alloc: &A, buffer: A::Buffer) -> Result<A::Fence> {
        let fence = match self.spare_fences.pop() {
            Some(fence) => fence,
            None => alloc.create_fence()?,
        };
        self.in_flight.push_back(InFlight { buffer, fence });
        Ok(fence)
    }

    /// Undo [`track`](Self::track) for a submission that never reached the
    /// device. The fence is still unsignaled, so it goes straight back.
    pub fn untrack(&mut self, fence: A::Fence) -> Option<A::Buffer> {
        let index = self.in_flight.iter().position(|entry| entry.fence == fence)?;
        let entry = self.in_flight.remove(index)?;
        self.spare_fences.push(entry.fence);
        self.idle.push(entry.buffer);
        Some(entry.buffer)
    }

    /// Move every submission whose fence has signaled back to the idle list.
    /// Returns how many buffers were recycled.
    pub fn reclaim(&mut self, alloc: &A) -> Result<usize> {
        let mut completed = Vec::new();
        let mut pending = VecDeque::with_capacity(self.in_flight.len());

        while let Some(entry) = self.in_flight.pop_front() {
            match alloc.fence_signaled(entry.fence) {
                Ok(true) => completed.push(entry),
                Ok(false) => pending.push_back(entry),
                Err(e) => {
                    pending.push_back(entry);
                    pending.extend(self.in_flight.drain(..));
                    self.in_flight = pending;
                    self.restore(completed);
                    return Err(e);
                }
            }
        }
        self.in_flight = pending;

        let count = completed.len();
        self.recycle(alloc, completed)?;
        Ok(count)
    }

    /// Block on one submission's fence, then recycle its buffer.
    pub fn complete(&mut self, alloc: &A, fence: A::Fence) -> Result<()> {
        alloc.wait_fences(&[fence])?;

        if let Some(index) = self.in_flight.iter().position(|entry| entry.fence == fence) {
            if let Some(entry) = self.in_flight.remove(index) {
                self.recycle(alloc, vec![entry])?;
            }
        }
        Ok(())
    }

    /// Block until every submission completes, then recycle them all.
    pub fn wait_all(&mut self, alloc: &A) -> Result<()> {
        if self.in_flight.is_empty() {
            return Ok(());
        }

        let fences: Vec<_> = self.in_flight.iter().map(|entry| entry.fence).collect();
        alloc.wait_fences(&fences)?;

        let completed: Vec<_> = self.in_flight.drain(..).collect();
        self.recycle(alloc, completed)
    }

    /// Free a buffer that left the pool and will not be submitted.
    pub fn discard(&mut self, alloc: &A, buffer: A::Buffer) {
        alloc.free_buffers(&[buffer]);
        self.allocated = self.allocated.saturating_sub(1);
    }

    /// Free every pooled buffer and destroy every fence, in flight or not.
    ///
    /// The caller guarantees the device no longer references any of them.
    /// Buffers currently held by callers are not touched.
    pub fn reset(&mut self, alloc: &A) {
        let mut buffers = std::mem::take(&mut self.idle);
        let in_flight = std::mem::take(&mut self.in_flight);
        let mut fences = std::mem::take(&mut self.spare_fences);

        for entry in in_flight {
            buffers.push(entry.buffer);
            fences.push(entry.fence);
        }

        if !buffers.is_empty() {
            alloc.free_buffers(&buffers);
        }
        for fence in fences {
            alloc.destroy_fence(fence);
        }

        self.allocated = self.allocated.saturating_sub(buffers.len());
        log::debug!("Command buffer cache reset ({} buffers freed)", buffers.len());
    }

    fn recycle(&mut self, alloc: &A, completed: Vec<InFlight<A::Buffer, A::Fence>>) -> Result<()> {
        if completed.is_empty() {
            return Ok(());
        }

        let fences: Vec<_> = completed.iter().map(|entry| entry.fence).collect();
        if let Err(e) = alloc.reset_fences(&fences) {
            // The fences stay signaled; keep them tracked so the next
            // reclaim picks them up again.
            self.in_flight.extend(completed);
            return Err(e);
        }

        for entry in completed {
            self.spare_fences.push(entry.fence);
            self.idle.push(entry.buffer);
        }
        Ok(())
    }

    fn restore(&mut self, completed: Vec<InFlight<A::Buffer, A::Fence>>) {
        self.in_flight.extend(completed);
    }
}

/// A command list whose native buffer came out of a [`CommandBufferPool`].
pub trait PooledList: CommandList {
    type Buffer;

    /// Queue family the list was released against.
    fn family(&self) -> u32;

    /// Identity of the pool owning the buffer, see [`pool_id`].
    fn pool_id(&self) -> usize;

    /// True once a begin/end pair has completed, i.e. the buffer is executable.
    fn is_recorded(&self) -> bool;

    /// Hand the buffer over to the pool; dropping the list afterwards must
    /// not touch it.
    fn into_buffer(self) -> Self::Buffer;
}

pub fn pool_id<A: CommandAllocator>(pool: &Mutex<CommandBufferPool<A>>) -> usize {
    pool as *const Mutex<CommandBufferPool<A>> as usize
}

/// Submit `list` to the queue owning `pool`.
///
/// The list is ended first if still recording. Lists from another pool and
/// lists that never recorded anything are rejected and stay with the
/// caller's drop path. `native_submit` gets the buffer and the fence to
/// signal; if it fails the submission is untracked again. With `wait` the
/// call returns once the fence has signaled and the buffer is idle.
pub fn submit<A, L, F>(
    pool: &Mutex<CommandBufferPool<A>>,
    alloc: &A,
    family: u32,
    mut list: L,
    wait: bool,
    native_submit: F,
) -> Result<()>
where
    A: CommandAllocator,
    L: PooledList<Buffer = A::Buffer>,
    F: FnOnce(A::Buffer, A::Fence) -> Result<()>,
{
    if list.pool_id() != pool_id(pool) {
        return Err(GfxError::ForeignCommandList {
            list_family: list.family(),
            queue_family: family,
        }
        .into());
    }

    if list.is_recording() {
        log::debug!("Submitting a list that is still recording; ending it first");
        list.end()?;
    }
    if !list.is_recorded() {
        return Err(GfxError::UnrecordedCommandList.into());
    }

    let buffer = list.into_buffer();
    let mut pool = pool.lock();
    let fence = match pool.track(alloc, buffer) {
        Ok(fence) => fence,
        Err(e) => {
            pool.discard(alloc, buffer);
            return Err(e);
        }
    };

    if let Err(e) = native_submit(buffer, fence) {
        pool.untrack(fence);
        return Err(e);
    }

    if wait {
        pool.complete(alloc, fence)?;
    }
    Ok(())
}

/// Let go of a list that will never be submitted: end it if it is still
/// recording, then free its buffer.
pub fn abandon<A, L>(pool: &Mutex<CommandBufferPool<A>>, alloc: &A, list: &mut L, buffer: A::Buffer)
where
    A: CommandAllocator,
    L: CommandList,
{
    if let Err(e) = list.end() {
        log::warn!("Dropping command buffer mid-recording: {:?}", e);
    }
    pool.lock().discard(alloc, buffer);
}
