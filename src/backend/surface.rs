// Window surface - the presentation target
//
// Binds the window to the instance. The khr::surface function table is
// resolved once at creation and reused for every capability query.

use ash::khr::surface;
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use super::error::{InitError, InitResult};
use super::Instance;

pub struct Surface {
    pub handle: vk::SurfaceKHR,
    fns: surface::Instance,
    // Keeps the instance alive until the surface is destroyed
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new(
        instance: Arc<Instance>,
        window: &(impl HasDisplayHandle + HasWindowHandle),
    ) -> InitResult<Self> {
        let fns = surface::Instance::new(instance.entry(), &instance.handle);

        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                &instance.handle,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )
        }
        .map_err(InitError::vulkan("creating the window surface"))?;

        Ok(Self {
            handle,
            fns,
            _instance: instance,
        })
    }

    /// Whether the given queue family of this device can present to the surface.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> VkResult<bool> {
        unsafe {
            self.fns
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
        }
    }

    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.fns
                .get_physical_device_surface_capabilities(physical_device, self.handle)
        }
    }

    pub fn formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.fns
                .get_physical_device_surface_formats(physical_device, self.handle)
        }
    }

    pub fn present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.fns
                .get_physical_device_surface_present_modes(physical_device, self.handle)
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.fns.destroy_surface(self.handle, None) };
    }
}
