// Error types for the Vulkan bring-up sequence
//
// Every fallible step reports through InitError. The first failure aborts
// the whole sequence; nothing is retried or downgraded.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

pub type InitResult<T> = std::result::Result<T, InitError>;

#[derive(Debug, Error)]
pub enum InitError {
    /// The Vulkan loader itself could not be found or linked.
    #[error("failed to load the Vulkan library: {0}")]
    LoadLibrary(#[from] ash::LoadingError),

    /// A requested validation layer is not installed on this system.
    #[error("validation layer {0:?} requested but not available")]
    MissingValidationLayer(String),

    /// The windowing system handed us an unusable handle.
    #[error("failed to get a native window or display handle: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    /// A configured string (window title, layer name) contains a NUL byte.
    #[error("configured name is not a valid C string: {0}")]
    InvalidName(#[from] std::ffi::NulError),

    /// Physical device enumeration came back empty.
    #[error("no GPU with Vulkan support found")]
    NoVulkanGpu,

    /// Devices exist but none passed the suitability checks.
    #[error("no suitable GPU found")]
    NoSuitableGpu,

    /// The surface stopped reporting formats between selection and swapchain
    /// creation.
    #[error("surface reports no formats")]
    NoSurfaceFormats,

    /// A shader binary could not be read or has a malformed size.
    #[error("failed to read shader {path:?}: {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A Vulkan call returned non-success, tagged with the step that made it.
    #[error("{step} failed: {result}")]
    Vulkan {
        step: &'static str,
        result: vk::Result,
    },
}

impl InitError {
    /// Tags a raw Vulkan result with the step that produced it.
    pub(crate) fn vulkan(step: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { step, result }
    }
}
