// Surface - platform window connection
//
// Maps raw window/display handles onto the matching VK_KHR_*_surface
// extension and creates the surface. Owned surfaces are destroyed before
// the instance that created them.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

use super::Instance;
use crate::core::Ref;

/// Instance extensions needed to create a surface on `display`.
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        RawDisplayHandle::Android(_) => khr::AndroidSurface::name(),
        other => anyhow::bail!("Unsupported display handle type: {:?}", other),
    };

    Ok(vec![khr::Surface::name(), platform])
}

/// Create a surface for a native window.
///
/// # Safety
/// The handles must refer to a live window that outlives the surface, and
/// `instance` must have the extensions from [`required_extensions`] enabled.
pub unsafe fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    let surface = match (display, window) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            let loader = khr::Win32Surface::new(entry, instance);
            unsafe { loader.create_win32_surface(&create_info, None) }
        }

        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display.display.context("Xlib display handle is null")?;
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.as_ptr() as *mut _)
                .window(handle.window as vk::Window);
            let loader = khr::XlibSurface::new(entry, instance);
            unsafe { loader.create_xlib_surface(&create_info, None) }
        }

        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
            let connection = display.connection.context("Xcb connection handle is null")?;
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection.as_ptr() as *mut _)
                .window(handle.window.get() as vk::xcb_window_t);
            let loader = khr::XcbSurface::new(entry, instance);
            unsafe { loader.create_xcb_surface(&create_info, None) }
        }

        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr() as *mut _)
                .surface(handle.surface.as_ptr() as *mut _);
            let loader = khr::WaylandSurface::new(entry, instance);
            unsafe { loader.create_wayland_surface(&create_info, None) }
        }

        (RawDisplayHandle::Android(_), RawWindowHandle::AndroidNdk(handle)) => {
            let create_info = vk::AndroidSurfaceCreateInfoKHR::builder()
                .window(handle.a_native_window.as_ptr() as *mut _);
            let loader = khr::AndroidSurface::new(entry, instance);
            unsafe { loader.create_android_surface(&create_info, None) }
        }

        _ => anyhow::bail!("Unsupported window handle type"),
    };

    surface.context("Failed to create window surface")
}

/// Presentation surface, destroyed on drop.
pub struct Surface {
    handle: vk::SurfaceKHR,
    instance: Ref<Instance>,
}

impl Surface {
    pub fn new(instance: Ref<Instance>, handle: vk::SurfaceKHR) -> Self {
        Self { handle, instance }
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Whether `family` on `physical_device` can present here.
    /// Query failures count as "no".
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> bool {
        let supported = unsafe {
            self.instance
                .surface_loader()
                .get_physical_device_surface_support(physical_device, family, self.handle)
        };
        match supported {
            Ok(supported) => supported,
            Err(e) => {
                log::warn!("Surface support query failed for family {}: {}", family, e);
                false
            }
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance
                .surface_loader()
                .destroy_surface(self.handle, None)
        };
    }
}
