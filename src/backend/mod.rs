// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash that own their handles and release them on drop.

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
