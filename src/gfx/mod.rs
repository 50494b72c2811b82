// Graphics abstraction - hardware-agnostic facade
//
// Capability traits for each level of the stack (renderer -> device ->
// queue -> command list) and the closed set of backends behind them.
// Backend-independent decision logic lives in the submodules so it can be
// exercised without a GPU.

pub mod error;
pub mod extension;
pub mod pool;
pub mod queue_family;
pub mod selection;

use std::fmt;

use anyhow::Result;
use bitflags::bitflags;

use crate::backend::VulkanRenderer;
use crate::config::Config;
use crate::core::{Ref, Window};

pub use error::GfxError;

bitflags! {
    /// Kinds of work a queue can execute.
    ///
    /// `PRESENT` is not a hardware bit; it is answered by asking the
    /// presentation surface about a specific queue family.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueFlags: u8 {
        const GRAPHICS = 0x1;
        const TRANSFER = 0x2;
        const COMPUTE = 0x4;
        const PRESENT = 0x8;
    }
}

/// A recordable, then submittable, unit of GPU work.
pub trait CommandList {
    fn is_recording(&self) -> bool;

    /// Capabilities of the queue this list was allocated against.
    fn usage(&self) -> QueueFlags;

    /// Start recording. No-op if already recording.
    fn begin(&mut self) -> Result<()>;

    /// Finish recording. No-op if not recording.
    fn end(&mut self) -> Result<()>;
}

/// Execution channel for one set of capabilities.
pub trait CommandQueue {
    type List: CommandList;

    /// Union of the capabilities this queue satisfies.
    fn usage(&self) -> QueueFlags;

    /// Hand out a list ready to record.
    ///
    /// Buffers whose previous submission has completed are reused before
    /// new ones are allocated. A buffer whose fence has not signaled is
    /// never handed out.
    fn release(&self) -> Result<Self::List>;

    /// Queue a finished list for execution.
    ///
    /// With `wait` the call blocks until this submission completes, after
    /// which the list's buffer is immediately reusable.
    fn submit(&self, list: Self::List, wait: bool) -> Result<()>;

    /// Block until every outstanding submission on this queue completes.
    fn wait(&self) -> Result<()>;

    /// Reclaim every pooled buffer and fence regardless of outstanding work.
    ///
    /// # Safety
    /// No GPU work may still reference buffers from this queue. Intended
    /// for teardown, after the queue or device has been waited on.
    unsafe fn reset_cache(&self) -> Result<()>;
}

/// Logical device facade.
pub trait GraphicsDevice {
    type Queue: CommandQueue;

    fn queues(&self) -> &[Self::Queue];

    /// True iff a single queue covers every capability in `flags`.
    fn has_queue(&self, flags: QueueFlags) -> bool {
        self.queues().iter().any(|queue| queue.usage().contains(flags))
    }

    /// First queue whose capabilities are a superset of `flags`.
    ///
    /// Asking for a combination no queue covers is a programming error;
    /// check [`has_queue`](Self::has_queue) first when absence is expected.
    fn queue(&self, flags: QueueFlags) -> Result<&Self::Queue> {
        self.queues()
            .iter()
            .find(|queue| queue.usage().contains(flags))
            .ok_or_else(|| GfxError::NoMatchingQueue(flags).into())
    }

    fn wait_idle(&self) -> Result<()>;
}

/// Backend entry point: owns the device it selected.
pub trait RendererBackend {
    type Device: GraphicsDevice;

    fn info(&self) -> RendererInfo;
    fn device(&self) -> &Ref<Self::Device>;
}

/// Graphics APIs with a compiled backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    Vulkan,
}

impl Api {
    /// Look up a backend by name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Some(Api::Vulkan),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Api::Vulkan => "Vulkan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererInfo {
    pub api: Api,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for RendererInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.api.name(), self.major, self.minor, self.patch)
    }
}

/// The renderer, one variant per backend.
///
/// Adding a backend means adding a variant here and an arm to each match.
pub enum Renderer {
    Vulkan(VulkanRenderer),
}

impl Renderer {
    /// Bring up a renderer for `api`.
    ///
    /// `window` is only consulted during construction (surface extensions
    /// and surface creation). Construction either fully succeeds or every
    /// native object created so far is released before the error returns.
    pub fn create(api: Api, window: Option<&dyn Window>, config: &Config) -> Result<Ref<Renderer>> {
        let renderer = match api {
            Api::Vulkan => Renderer::Vulkan(VulkanRenderer::new(window, config)?),
        };
        log::info!("Renderer ready: {}", renderer.info());
        Ok(Ref::new(renderer))
    }

    /// Like [`create`](Self::create), with `Ok(None)` for unknown API names.
    pub fn create_by_name(
        name: &str,
        window: Option<&dyn Window>,
        config: &Config,
    ) -> Result<Option<Ref<Renderer>>> {
        match Api::from_name(name) {
            Some(api) => Self::create(api, window, config).map(Some),
            None => {
                log::error!("No renderer backend named '{}'", name);
                Ok(None)
            }
        }
    }

    pub fn info(&self) -> RendererInfo {
        match self {
            Renderer::Vulkan(renderer) => renderer.info(),
        }
    }

    /// Block until the device has finished all work.
    pub fn wait_idle(&self) -> Result<()> {
        match self {
            Renderer::Vulkan(renderer) => renderer.device().wait_idle(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Host-side stand-ins for native objects.

    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;

    use anyhow::Result;
    use parking_lot::Mutex;

    use super::pool::{self, CommandAllocator, CommandBufferPool, PooledList};
    use super::{CommandList, CommandQueue, GraphicsDevice, QueueFlags};

    /// Allocator whose fences only signal when a test says so.
    #[derive(Default)]
    pub struct FakeAllocator {
        next_buffer: Cell<u32>,
        next_fence: Cell<u32>,
        pub signaled: RefCell<HashSet<u32>>,
        pub freed: RefCell<Vec<u32>>,
        pub destroyed_fences: RefCell<Vec<u32>>,
        pub resets: Cell<usize>,
        /// When set, `wait_fences` signals what it waits on.
        pub complete_on_wait: Cell<bool>,
        pub fail_fences: Cell<bool>,
    }

    impl FakeAllocator {
        pub fn signal(&self, fence: u32) {
            self.signaled.borrow_mut().insert(fence);
        }
    }

    impl CommandAllocator for FakeAllocator {
        type Buffer = u32;
        type Fence = u32;

        fn allocate_buffer(&self) -> Result<u32> {
            let id = self.next_buffer.get() + 1;
            self.next_buffer.set(id);
            Ok(id)
        }

        fn reset_buffer(&self, _buffer: u32) -> Result<()> {
            self.resets.set(self.resets.get() + 1);
            Ok(())
        }

        fn free_buffers(&self, buffers: &[u32]) {
            self.freed.borrow_mut().extend_from_slice(buffers);
        }

        fn create_fence(&self) -> Result<u32> {
            anyhow::ensure!(!self.fail_fences.get(), "out of fences");
            let id = self.next_fence.get() + 100;
            self.next_fence.set(self.next_fence.get() + 1);
            Ok(id)
        }

        fn reset_fences(&self, fences: &[u32]) -> Result<()> {
            let mut signaled = self.signaled.borrow_mut();
            for fence in fences {
                signaled.remove(fence);
            }
            Ok(())
        }

        fn destroy_fence(&self, fence: u32) {
            self.destroyed_fences.borrow_mut().push(fence);
        }

        fn fence_signaled(&self, fence: u32) -> Result<bool> {
            Ok(self.signaled.borrow().contains(&fence))
        }

        fn wait_fences(&self, fences: &[u32]) -> Result<()> {
            if self.complete_on_wait.get() {
                for &fence in fences {
                    self.signal(fence);
                }
            }
            anyhow::ensure!(
                fences.iter().all(|f| self.signaled.borrow().contains(f)),
                "wait would block forever"
            );
            Ok(())
        }
    }

    pub struct FakeList {
        pub buffer: u32,
        pub usage: QueueFlags,
        pub family: u32,
        pub pool: usize,
        pub recording: bool,
        pub recorded: bool,
    }

    impl CommandList for FakeList {
        fn is_recording(&self) -> bool {
            self.recording
        }

        fn usage(&self) -> QueueFlags {
            self.usage
        }

        fn begin(&mut self) -> Result<()> {
            if !self.recording {
                self.recording = true;
                self.recorded = false;
            }
            Ok(())
        }

        fn end(&mut self) -> Result<()> {
            if self.recording {
                self.recording = false;
                self.recorded = true;
            }
            Ok(())
        }
    }

    impl PooledList for FakeList {
        type Buffer = u32;

        fn family(&self) -> u32 {
            self.family
        }

        fn pool_id(&self) -> usize {
            self.pool
        }

        fn is_recorded(&self) -> bool {
            self.recorded
        }

        fn into_buffer(self) -> u32 {
            self.buffer
        }
    }

    /// Queue that completes every submission as soon as it is waited on.
    pub struct FakeQueue {
        pub usage: QueueFlags,
        pub family: u32,
        pub allocator: FakeAllocator,
        pub pool: Mutex<CommandBufferPool<FakeAllocator>>,
    }

    impl std::fmt::Debug for FakeQueue {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FakeQueue")
                .field("usage", &self.usage)
                .field("family", &self.family)
                .finish_non_exhaustive()
        }
    }

    impl FakeQueue {
        pub fn new(usage: QueueFlags) -> Self {
            Self::with_family(usage, 0)
        }

        pub fn with_family(usage: QueueFlags, family: u32) -> Self {
            let allocator = FakeAllocator::default();
            allocator.complete_on_wait.set(true);
            Self {
                usage,
                family,
                allocator,
                pool: Mutex::new(CommandBufferPool::new()),
            }
        }
    }

    impl CommandQueue for FakeQueue {
        type List = FakeList;

        fn usage(&self) -> QueueFlags {
            self.usage
        }

        fn release(&self) -> Result<FakeList> {
            let buffer = self.pool.lock().acquire(&self.allocator)?;
            Ok(FakeList {
                buffer,
                usage: self.usage,
                family: self.family,
                pool: pool::pool_id(&self.pool),
                recording: false,
                recorded: false,
            })
        }

        fn submit(&self, list: FakeList, wait: bool) -> Result<()> {
            pool::submit(&self.pool, &self.allocator, self.family, list, wait, |_, _| Ok(()))
        }

        fn wait(&self) -> Result<()> {
            self.pool.lock().wait_all(&self.allocator)
        }

        unsafe fn reset_cache(&self) -> Result<()> {
            self.pool.lock().reset(&self.allocator);
            Ok(())
        }
    }

    pub struct FakeDevice {
        pub queues: Vec<FakeQueue>,
    }

    impl GraphicsDevice for FakeDevice {
        type Queue = FakeQueue;

        fn queues(&self) -> &[FakeQueue] {
            &self.queues
        }

        fn wait_idle(&self) -> Result<()> {
            self.queues.iter().try_for_each(|queue| queue.wait())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeDevice, FakeQueue};
    use super::*;

    fn device(usages: &[QueueFlags]) -> FakeDevice {
        FakeDevice {
            queues: usages.iter().map(|&usage| FakeQueue::new(usage)).collect(),
        }
    }

    #[test]
    fn has_queue_needs_a_single_covering_queue() {
        let device = device(&[
            QueueFlags::GRAPHICS | QueueFlags::TRANSFER,
            QueueFlags::TRANSFER,
        ]);

        assert!(device.has_queue(QueueFlags::GRAPHICS));
        assert!(device.has_queue(QueueFlags::GRAPHICS | QueueFlags::TRANSFER));
        assert!(!device.has_queue(QueueFlags::COMPUTE));
        assert!(!device.has_queue(QueueFlags::GRAPHICS | QueueFlags::COMPUTE));
    }

    #[test]
    fn union_across_queues_does_not_count() {
        let device = device(&[QueueFlags::GRAPHICS, QueueFlags::COMPUTE]);
        assert!(!device.has_queue(QueueFlags::GRAPHICS | QueueFlags::COMPUTE));
    }

    #[test]
    fn queue_returns_first_superset() {
        let device = device(&[
            QueueFlags::TRANSFER,
            QueueFlags::GRAPHICS | QueueFlags::TRANSFER | QueueFlags::COMPUTE,
            QueueFlags::GRAPHICS | QueueFlags::TRANSFER,
        ]);

        let queue = device.queue(QueueFlags::GRAPHICS).unwrap();
        assert_eq!(
            queue.usage(),
            QueueFlags::GRAPHICS | QueueFlags::TRANSFER | QueueFlags::COMPUTE
        );
        assert_eq!(device.queue(QueueFlags::TRANSFER).unwrap().usage(), QueueFlags::TRANSFER);
    }

    #[test]
    fn queue_without_match_is_an_error() {
        let device = device(&[QueueFlags::GRAPHICS]);
        let err = device.queue(QueueFlags::PRESENT).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GfxError>(),
            Some(GfxError::NoMatchingQueue(flags)) if *flags == QueueFlags::PRESENT
        ));
    }

    #[test]
    fn waited_submission_is_reused_immediately() {
        let device = device(&[QueueFlags::GRAPHICS]);
        let queue = device.queue(QueueFlags::GRAPHICS).unwrap();

        let mut list = queue.release().unwrap();
        let buffer = list.buffer;
        list.begin().unwrap();
        assert!(list.is_recording());
        list.end().unwrap();
        queue.submit(list, true).unwrap();

        let again = queue.release().unwrap();
        assert_eq!(again.buffer, buffer);
        assert_eq!(again.usage(), QueueFlags::GRAPHICS);
    }

    #[test]
    fn api_names() {
        assert_eq!(Api::from_name("Vulkan"), Some(Api::Vulkan));
        assert_eq!(Api::from_name(" vk "), Some(Api::Vulkan));
        assert_eq!(Api::from_name("direct3d12"), None);
    }

    #[test]
    fn renderer_info_display() {
        let info = RendererInfo {
            api: Api::Vulkan,
            major: 1,
            minor: 2,
            patch: 0,
        };
        assert_eq!(info.to_string(), "Vulkan 1.2.0");
    }

    #[test]
    fn list_released_elsewhere_is_refused() {
        let device = FakeDevice {
            queues: vec![
                FakeQueue::with_family(QueueFlags::GRAPHICS, 0),
                FakeQueue::with_family(QueueFlags::TRANSFER, 1),
            ],
        };
        let graphics = device.queue(QueueFlags::GRAPHICS).unwrap();
        let transfer = device.queue(QueueFlags::TRANSFER).unwrap();

        let mut list = graphics.release().unwrap();
        list.begin().unwrap();
        let err = transfer.submit(list, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GfxError>(),
            Some(GfxError::ForeignCommandList { list_family: 0, queue_family: 1 })
        ));
        assert_eq!(transfer.pool.lock().stats().in_flight, 0);
    }
}
