// Vulkan Instance - API entry and validation
//
// Responsibilities:
// - Loader entry + instance creation with negotiated extensions/layers
// - Debug messenger (debug builds with validation only)
// - Surface loader shared by presentation queries
//
// Everything created from the instance holds a Ref to it, so the instance
// is always destroyed last.

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use std::ffi::{CStr, CString};

pub const DEBUG_UTILS: &str = "VK_EXT_debug_utils";
pub const PORTABILITY_ENUMERATION: &str = "VK_KHR_portability_enumeration";

/// Vulkan instance wrapper with automatic cleanup
pub struct Instance {
    // Order matters for drop: the messenger goes before the instance
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: Surface,
    instance: ash::Instance,
    entry: Entry,
    api_version: u32,
    extensions: Vec<String>,
}

impl Instance {
    /// Create the instance.
    ///
    /// `extensions` and `layers` must already be negotiated against what
    /// the loader offers.
    pub fn new(
        entry: Entry,
        app_name: &str,
        api_version: u32,
        extensions: &[String],
        layers: &[String],
    ) -> Result<Self> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("Hearth")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(api_version);

        let extension_names = to_cstrings(extensions)?;
        let layer_names = to_cstrings(layers)?;
        let extension_ptrs: Vec<_> = extension_names.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<_> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let mut flags = vk::InstanceCreateFlags::empty();
        if extensions.iter().any(|ext| ext == PORTABILITY_ENUMERATION) {
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;
        let surface_loader = Surface::new(&entry, &instance);

        log::info!(
            "Vulkan instance created (API {}.{}.{}, {} extensions, {} layers)",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version),
            extensions.len(),
            layers.len()
        );
        for ext in extensions {
            log::debug!("  instance extension: {}", ext);
        }
        for layer in layers {
            log::debug!("  instance layer: {}", layer);
        }

        Ok(Self {
            debug_utils: None,
            surface_loader,
            instance,
            entry,
            api_version,
            extensions: extensions.to_vec(),
        })
    }

    /// Route validation messages into the log.
    ///
    /// Failure is not fatal: validation output is simply lost.
    pub fn attach_debug_messenger(&mut self) -> bool {
        if self.debug_utils.is_some() {
            return true;
        }
        if !self.has_extension(DEBUG_UTILS) {
            log::warn!("{} not enabled - validation messages will not show", DEBUG_UTILS);
            return false;
        }

        let debug_utils = DebugUtils::new(&self.entry, &self.instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        match unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) } {
            Ok(messenger) => {
                self.debug_utils = Some((debug_utils, messenger));
                log::debug!("Debug messenger attached");
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to create Vulkan debug messenger ({}) - validation errors will not show",
                    e
                );
                false
            }
        }
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn ash_instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

fn to_cstrings(names: &[String]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| CString::new(name.as_str()).with_context(|| format!("Invalid name {:?}", name)))
        .collect()
}

/// Read a fixed-size, NUL-terminated name from a Vulkan properties struct.
pub(crate) fn name_from_raw(raw: &[std::os::raw::c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Log level for a validation message, `None` for severities not surfaced.
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Option<log::Level> {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Some(log::Level::Error)
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Some(log::Level::Warn)
    } else {
        None
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let Some(level) = severity_level(message_severity) else {
        return vk::FALSE;
    };
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }

    let message = CStr::from_ptr((*p_callback_data).p_message);
    log::log!(level, "[Vulkan] {}", message.to_string_lossy());

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_warnings_and_errors_are_surfaced() {
        type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;

        assert_eq!(severity_level(Severity::ERROR), Some(log::Level::Error));
        assert_eq!(severity_level(Severity::WARNING), Some(log::Level::Warn));
        assert_eq!(severity_level(Severity::INFO), None);
        assert_eq!(severity_level(Severity::VERBOSE), None);
    }

    #[test]
    fn raw_names_stop_at_nul() {
        let mut raw = [0 as std::os::raw::c_char; 16];
        for (slot, byte) in raw.iter_mut().zip(b"VK_KHR_surface") {
            *slot = *byte as std::os::raw::c_char;
        }
        assert_eq!(name_from_raw(&raw), "VK_KHR_surface");
    }
}
