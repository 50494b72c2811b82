// Graphics errors
//
// Conditions a caller may want to tell apart. They travel inside
// anyhow::Error and come back out with `downcast_ref::<GfxError>()`.

use ash::vk;
use thiserror::Error;

use super::QueueFlags;

#[derive(Debug, Error)]
pub enum GfxError {
    #[error("Required extension {0} is not present")]
    MissingExtension(String),

    #[error("Required layer {0} is not present")]
    MissingLayer(String),

    #[error("No viable graphics device found")]
    NoViableDevice,

    #[error("Queue families not found for {missing:?}")]
    IncompleteQueueCoverage { missing: QueueFlags },

    #[error("No queue meets the requirements {0:?}")]
    NoMatchingQueue(QueueFlags),

    #[error(
        "Command list was allocated from queue family {list_family} but \
         submitted to queue family {queue_family}"
    )]
    ForeignCommandList { list_family: u32, queue_family: u32 },

    #[error("Command list was submitted without being recorded")]
    UnrecordedCommandList,

    #[error("Timed out waiting for a fence after {0} ms")]
    FenceTimeout(u64),

    #[error("Handle does not point at a {0}")]
    IncompatibleCast(&'static str),

    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

impl From<vk::Result> for GfxError {
    fn from(value: vk::Result) -> Self {
        Self::Vulkan(value)
    }
}
