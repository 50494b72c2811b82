// Vulkan backend
//
// Native implementation of the gfx traits on top of ash.

pub mod device;
pub mod instance;
pub mod queue;
pub mod renderer;
pub mod surface;
pub mod sync;

pub use device::VulkanDevice;
pub use instance::Instance;
pub use queue::{VulkanCommandBuffer, VulkanQueue};
pub use renderer::VulkanRenderer;
