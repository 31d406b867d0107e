// Vulkan instance - API context root
//
// Responsibilities:
// - Loading the Vulkan library
// - Validation layer availability check
// - Instance creation with the platform's presentation extensions
// - Debug messenger routing validation output into the log

use ash::ext::debug_utils;
use ash::vk;
use raw_window_handle::HasDisplayHandle;
use std::ffi::{c_char, c_void, CStr, CString};

use super::error::{InitError, InitResult};

/// Vulkan instance wrapper with automatic cleanup.
///
/// Owns the loaded entry point and, when validation is enabled, the debug
/// messenger together with its function table. The messenger functions are
/// resolved once here and reused for the whole instance lifetime.
pub struct Instance {
    entry: ash::Entry,
    pub handle: ash::Instance,
    debug_utils: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Create the instance.
    ///
    /// When `enable_validation` is set, every layer in `validation_layers`
    /// must be present on the system or creation fails before any Vulkan
    /// object exists. The debug messenger create-info is also chained into
    /// instance creation so that messages emitted while the instance itself
    /// is being created are captured.
    pub fn new(
        display: &impl HasDisplayHandle,
        app_name: &str,
        validation_layers: &[String],
        enable_validation: bool,
    ) -> InitResult<Self> {
        let entry = unsafe { ash::Entry::load() }?;

        // Layer names have to outlive the create call
        let layer_names = if enable_validation {
            validation_layers
                .iter()
                .map(|name| CString::new(name.as_str()))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        if enable_validation {
            let available = unsafe { entry.enumerate_instance_layer_properties() }
                .map_err(InitError::vulkan("enumerating instance layers"))?;
            if let Some(layer) = missing_layer(&layer_names, &available) {
                return Err(InitError::MissingValidationLayer(layer));
            }
            log::info!("Validation layers enabled: {:?}", validation_layers);
        }

        log_available_extensions(&entry);

        // Platform presentation extensions, plus debug utils when validating
        let display_handle = display.display_handle()?.as_raw();
        let mut extensions =
            ash_window::enumerate_required_extensions(display_handle)
                .map_err(InitError::vulkan("querying required surface extensions"))?
                .to_vec();
        if enable_validation {
            extensions.push(debug_utils::NAME.as_ptr());
        }

        let app_name = CString::new(app_name)?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let layer_ptrs: Vec<*const c_char> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let mut debug_info = debug_messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .map_err(InitError::vulkan("creating the Vulkan instance"))?;

        // From here on a failure must destroy the instance; letting the
        // wrapper drop takes care of that.
        let mut instance = Self {
            entry,
            handle,
            debug_utils: None,
        };

        if enable_validation {
            let loader = debug_utils::Instance::new(&instance.entry, &instance.handle);
            let messenger = unsafe {
                loader.create_debug_utils_messenger(&debug_info, None)
            }
            .map_err(InitError::vulkan("creating the debug messenger"))?;
            instance.debug_utils = Some((loader, messenger));
        }

        Ok(instance)
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.handle.destroy_instance(None);
        }
    }
}

/// First requested layer that is absent from the enumerated list, if any.
fn missing_layer(
    requested: &[CString],
    available: &[vk::LayerProperties],
) -> Option<String> {
    requested.iter().find_map(|wanted| {
        let found = available.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .map(|name| name == wanted.as_c_str())
                .unwrap_or(false)
        });
        (!found).then(|| wanted.to_string_lossy().into_owned())
    })
}

fn log_available_extensions(entry: &ash::Entry) {
    if let Ok(extensions) = unsafe { entry.enumerate_instance_extension_properties(None) } {
        log::debug!("{} instance extensions available:", extensions.len());
        for extension in &extensions {
            if let Ok(name) = extension.extension_name_as_c_str() {
                log::debug!("  {}", name.to_string_lossy());
            }
        }
    }
}

/// Severity and type filter shared by the chained and the standalone
/// messenger: verbose/warning/error across all three message types.
fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str) -> vk::LayerProperties {
        let mut properties = vk::LayerProperties::default();
        for (dst, src) in properties.layer_name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        properties
    }

    fn requested(names: &[&str]) -> Vec<CString> {
        names
            .iter()
            .map(|name| CString::new(*name).unwrap())
            .collect()
    }

    #[test]
    fn layer_check_passes_when_all_present() {
        let available = vec![
            layer("VK_LAYER_KHRONOS_validation"),
            layer("VK_LAYER_MESA_overlay"),
        ];
        let wanted = requested(&["VK_LAYER_KHRONOS_validation"]);
        assert_eq!(missing_layer(&wanted, &available), None);
    }

    #[test]
    fn layer_check_reports_absent_layer_by_name() {
        let available = vec![layer("VK_LAYER_MESA_overlay")];
        let wanted = requested(&["VK_LAYER_KHRONOS_validation"]);
        assert_eq!(
            missing_layer(&wanted, &available),
            Some("VK_LAYER_KHRONOS_validation".to_string())
        );
    }

    #[test]
    fn layer_check_passes_with_empty_request() {
        let available = vec![layer("VK_LAYER_MESA_overlay")];
        assert_eq!(missing_layer(&[], &available), None);
    }

    #[test]
    fn layer_check_checks_every_requested_layer() {
        let available = vec![layer("VK_LAYER_KHRONOS_validation")];
        let wanted = requested(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_made_up"]);
        assert_eq!(
            missing_layer(&wanted, &available),
            Some("VK_LAYER_made_up".to_string())
        );
    }
}
