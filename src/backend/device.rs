// Vulkan device - GPU selection and the logical device
//
// Responsibilities:
// - Queue family discovery (graphics + present, first match)
// - Physical device selection (first suitable device wins)
// - Logical device + queue creation

use ash::prelude::VkResult;
use ash::vk;
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::error::{InitError, InitResult};
use super::swapchain::SwapchainSupport;
use super::{Instance, Surface};

/// Device extensions every candidate GPU must offer.
const DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Queue family indices for the two kinds of work this program submits.
/// Both may point at the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn same_family(&self) -> bool {
        self.graphics == self.present
    }
}

/// Scan the queue families in index order and record the lowest index with
/// graphics support and, independently, the lowest index that can present.
/// Scanning stops as soon as both are known (first match, not best match).
pub(crate) fn find_queue_families(
    properties: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> VkResult<bool>,
) -> VkResult<Option<QueueFamilyIndices>> {
    let mut graphics = None;
    let mut present = None;

    for (index, family) in properties.iter().enumerate() {
        let index = index as u32;

        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        if present.is_none() && supports_present(index)? {
            present = Some(index);
        }
        if graphics.is_some() && present.is_some() {
            break;
        }
    }

    Ok(graphics
        .zip(present)
        .map(|(graphics, present)| QueueFamilyIndices { graphics, present }))
}

fn has_required_extensions(available: &[vk::ExtensionProperties]) -> bool {
    DEVICE_EXTENSIONS.iter().all(|required| {
        available.iter().any(|extension| {
            extension
                .extension_name_as_c_str()
                .map(|name| name == *required)
                .unwrap_or(false)
        })
    })
}

/// Queue families for `physical_device` if it satisfies every requirement:
/// a complete graphics/present pair, the required device extensions, and at
/// least one surface format and present mode. `None` means unsuitable.
fn query_suitability(
    instance: &Instance,
    surface: &Surface,
    physical_device: vk::PhysicalDevice,
) -> InitResult<Option<QueueFamilyIndices>> {
    let properties = unsafe {
        instance
            .handle
            .get_physical_device_queue_family_properties(physical_device)
    };
    let families = find_queue_families(&properties, |index| {
        surface.supports_present(physical_device, index)
    })
    .map_err(InitError::vulkan("querying surface presentation support"))?;

    let families = match families {
        Some(families) => families,
        None => return Ok(None),
    };

    let available = unsafe {
        instance
            .handle
            .enumerate_device_extension_properties(physical_device)
    }
    .map_err(InitError::vulkan("enumerating device extensions"))?;
    if !has_required_extensions(&available) {
        return Ok(None);
    }

    let support = SwapchainSupport::query(surface, physical_device)?;
    if support.formats.is_empty() || support.present_modes.is_empty() {
        return Ok(None);
    }

    Ok(Some(families))
}

/// Pick the first physical device that passes the suitability checks.
pub fn pick_physical_device(
    instance: &Instance,
    surface: &Surface,
) -> InitResult<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = unsafe { instance.handle.enumerate_physical_devices() }
        .map_err(InitError::vulkan("enumerating physical devices"))?;

    if devices.is_empty() {
        return Err(InitError::NoVulkanGpu);
    }

    for physical_device in devices {
        let properties = unsafe {
            instance
                .handle
                .get_physical_device_properties(physical_device)
        };
        let device_name = properties
            .device_name_as_c_str()
            .unwrap_or(c"unknown")
            .to_string_lossy();

        match query_suitability(instance, surface, physical_device)? {
            Some(families) => {
                log::info!("Selected GPU: {}", device_name);
                log::info!(
                    "API version: {}.{}.{}",
                    vk::api_version_major(properties.api_version),
                    vk::api_version_minor(properties.api_version),
                    vk::api_version_patch(properties.api_version)
                );
                return Ok((physical_device, families));
            }
            None => {
                log::debug!("Skipping unsuitable GPU: {}", device_name);
            }
        }
    }

    Err(InitError::NoSuitableGpu)
}

/// Logical device wrapper with automatic cleanup.
pub struct Device {
    pub handle: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub instance: Arc<Instance>,
}

impl Device {
    /// Create the logical device with one queue per unique family at
    /// priority 1.0, then fetch the queue handles.
    pub fn new(
        instance: Arc<Instance>,
        physical_device: vk::PhysicalDevice,
        families: QueueFamilyIndices,
        validation_layers: &[String],
        enable_validation: bool,
    ) -> InitResult<Arc<Self>> {
        // The same family may serve both roles; create each queue once
        let unique_families: HashSet<u32> =
            HashSet::from([families.graphics, families.present]);

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&priorities)
            })
            .collect();

        let extension_ptrs: Vec<*const c_char> =
            DEVICE_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();

        // Device-level layers are ignored by current drivers but older
        // implementations still read them
        let layer_names = if enable_validation {
            validation_layers
                .iter()
                .map(|name| CString::new(name.as_str()))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&features);

        let handle = unsafe {
            instance
                .handle
                .create_device(physical_device, &create_info, None)
        }
        .map_err(InitError::vulkan("creating the logical device"))?;

        let graphics_queue = unsafe { handle.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { handle.get_device_queue(families.present, 0) };

        log::info!(
            "Logical device created (graphics family {}, present family {})",
            families.graphics,
            families.present
        );

        Ok(Arc::new(Self {
            handle,
            physical_device,
            families,
            graphics_queue,
            present_queue,
            instance,
        }))
    }

    /// Wait for the device to go idle (e.g. before cleanup).
    pub fn wait_idle(&self) -> InitResult<()> {
        unsafe { self.handle.device_wait_idle() }
            .map_err(InitError::vulkan("waiting for the device to go idle"))?;
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying logical device");
        let _ = self.wait_idle();
        unsafe {
            self.handle.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut properties = vk::ExtensionProperties::default();
        for (dst, src) in properties.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as c_char;
        }
        properties
    }

    #[test]
    fn scan_records_lowest_index_per_predicate() {
        // Graphics first appears at index 1, present support only at index 0
        let properties = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let present = [true, false, false];

        let found = find_queue_families(&properties, |index| Ok(present[index as usize]))
            .unwrap()
            .unwrap();
        assert_eq!(
            found,
            QueueFamilyIndices {
                graphics: 1,
                present: 0
            }
        );
    }

    #[test]
    fn scan_keeps_first_graphics_match() {
        let properties = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let present = [false, true];

        let found = find_queue_families(&properties, |index| Ok(present[index as usize]))
            .unwrap()
            .unwrap();
        assert_eq!(
            found,
            QueueFamilyIndices {
                graphics: 0,
                present: 1
            }
        );
    }

    #[test]
    fn shared_family_yields_equal_indices() {
        let properties = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];

        let found = find_queue_families(&properties, |_| Ok(true))
            .unwrap()
            .unwrap();
        assert_eq!(found.graphics, found.present);
        assert!(found.same_family());
    }

    #[test]
    fn scan_stops_once_both_are_found() {
        let properties = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queries = 0;

        let found = find_queue_families(&properties, |_| {
            queries += 1;
            Ok(true)
        })
        .unwrap();
        assert!(found.is_some());
        assert_eq!(queries, 1);
    }

    #[test]
    fn scan_without_present_support_finds_nothing() {
        let properties = [family(vk::QueueFlags::GRAPHICS)];
        let found = find_queue_families(&properties, |_| Ok(false)).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn scan_without_graphics_finds_nothing() {
        let properties = [family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        let found = find_queue_families(&properties, |_| Ok(true)).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn scan_propagates_query_errors() {
        let properties = [family(vk::QueueFlags::GRAPHICS)];
        let result =
            find_queue_families(&properties, |_| Err(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert_eq!(result, Err(vk::Result::ERROR_SURFACE_LOST_KHR));
    }

    #[test]
    fn extension_check_requires_swapchain() {
        assert!(!has_required_extensions(&[]));
        assert!(!has_required_extensions(&[extension(c"VK_KHR_maintenance1")]));
        assert!(has_required_extensions(&[
            extension(c"VK_KHR_maintenance1"),
            extension(ash::khr::swapchain::NAME),
        ]));
    }
}
