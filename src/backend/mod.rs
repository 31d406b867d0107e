// Backend module - Vulkan abstraction layer
//
// Scoped wrappers around ash objects. Each wrapper owns exactly one handle
// and keeps its parent alive through an Arc, so teardown order falls out of
// drop order.

pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use device::{pick_physical_device, Device};
pub use error::{InitError, InitResult};
pub use instance::Instance;
pub use surface::Surface;
pub use swapchain::Swapchain;
