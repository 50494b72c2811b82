// Vulkan renderer - backend bring-up
//
// Init order: loader -> instance -> debug messenger -> surface -> physical
// device selection -> logical device. Every native object is owned by an
// RAII wrapper, so an error at any step releases what was already created,
// newest first.

use anyhow::{Context, Result};
use ash::{vk, Entry};

use super::device::VulkanDevice;
use super::instance::{name_from_raw, DEBUG_UTILS, PORTABILITY_ENUMERATION};
use super::surface::Surface;
use super::Instance;
use crate::config::Config;
use crate::core::{Ref, Window};
use crate::gfx::extension::{self, ExtensionRequest, RequestKind};
use crate::gfx::selection::{self, DeviceCandidate, DeviceKind};
use crate::gfx::{Api, RendererBackend, RendererInfo};

pub const PROPERTIES2: &str = "VK_KHR_get_physical_device_properties2";
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const SWAPCHAIN: &str = "VK_KHR_swapchain";
pub const PORTABILITY_SUBSET: &str = "VK_KHR_portability_subset";

/// Bring-up progress. Only a `Ready` renderer is ever handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RendererState {
    Uninitialized,
    InstanceCreated,
    DebugMessengerAttached,
    DeviceSelected,
    Ready,
}

/// Instance extensions the engine asks for, plus what the window needs.
pub fn instance_extension_requests(window_extensions: &[String]) -> Vec<ExtensionRequest> {
    let mut requests = vec![
        ExtensionRequest::optional(PROPERTIES2),
        ExtensionRequest::optional(DEBUG_UTILS),
        ExtensionRequest::optional(PORTABILITY_ENUMERATION),
    ];
    requests.extend(window_extensions.iter().map(ExtensionRequest::required));
    requests
}

pub fn layer_requests(validation: bool) -> Vec<ExtensionRequest> {
    if validation {
        vec![ExtensionRequest::optional(VALIDATION_LAYER)]
    } else {
        Vec::new()
    }
}

/// Swapchain support only matters once there is something to present to.
pub fn device_extension_requests(has_surface: bool) -> Vec<ExtensionRequest> {
    let swapchain = if has_surface {
        ExtensionRequest::required(SWAPCHAIN)
    } else {
        ExtensionRequest::optional(SWAPCHAIN)
    };
    vec![swapchain, ExtensionRequest::optional(PORTABILITY_SUBSET)]
}

pub fn device_kind(device_type: vk::PhysicalDeviceType) -> DeviceKind {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => DeviceKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceKind::Virtual,
        vk::PhysicalDeviceType::CPU => DeviceKind::Cpu,
        _ => DeviceKind::Other,
    }
}

/// Instance version: the configured one, capped by what the loader offers.
pub fn negotiate_api_version(requested: u32, loader: Option<u32>) -> u32 {
    requested.min(loader.unwrap_or(vk::API_VERSION_1_0))
}

pub struct VulkanRenderer {
    // Order matters for drop: device, then surface, then instance
    device: Ref<VulkanDevice>,
    _surface: Option<Surface>,
    _instance: Ref<Instance>,
    info: RendererInfo,
}

impl VulkanRenderer {
    pub fn new(window: Option<&dyn Window>, config: &Config) -> Result<Self> {
        let mut state = RendererState::Uninitialized;
        let validation = cfg!(debug_assertions) && config.debug.validation_layers;

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let [major, minor, patch] = config.renderer.api_version;
        let loader_version = entry
            .try_enumerate_instance_version()
            .context("Failed to query instance version")?;
        let api_version =
            negotiate_api_version(vk::make_api_version(0, major, minor, patch), loader_version);

        // Step 2: Negotiate instance extensions and layers
        let window_extensions = match window {
            Some(window) => window.required_extensions()?,
            None => Vec::new(),
        };

        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .context("Failed to enumerate instance extensions")?;
        let available_extensions: Vec<String> = available_extensions
            .iter()
            .map(|ext| name_from_raw(&ext.extension_name))
            .collect();
        let extensions = extension::negotiate(
            RequestKind::Extension,
            available_extensions.iter().map(String::as_str),
            &instance_extension_requests(&window_extensions),
        )?;

        let available_layers = entry
            .enumerate_instance_layer_properties()
            .context("Failed to enumerate instance layers")?;
        let available_layers: Vec<String> = available_layers
            .iter()
            .map(|layer| name_from_raw(&layer.layer_name))
            .collect();
        let layers = extension::negotiate(
            RequestKind::Layer,
            available_layers.iter().map(String::as_str),
            &layer_requests(validation),
        )?;

        // Step 3: Create instance
        let mut instance = Instance::new(
            entry,
            &config.renderer.application_name,
            api_version,
            &extensions,
            &layers,
        )?;
        state = advance(state, RendererState::InstanceCreated);

        // Step 4: Setup debug messenger if validation enabled
        if validation && instance.attach_debug_messenger() {
            state = advance(state, RendererState::DebugMessengerAttached);
        }
        let instance = Ref::new(instance);

        // Step 5: Surface
        let surface = match window {
            Some(window) => window
                .create_surface(instance.entry(), instance.ash_instance())?
                .map(|handle| Surface::new(instance.clone(), handle)),
            None => None,
        };
        if surface.is_none() {
            log::info!("No presentation surface; running headless");
        }

        // Step 6: Pick physical device (GPU)
        let device_requests = device_extension_requests(surface.is_some());
        let candidate = selection::select(enumerate_candidates(&instance)?, &device_requests)?;
        log::info!("Selected GPU: {} ({:?})", candidate.name, candidate.kind);
        state = advance(state, RendererState::DeviceSelected);

        // Step 7: Create logical device
        let device_extensions = extension::negotiate(
            RequestKind::Extension,
            candidate.extensions.iter().map(String::as_str),
            &device_requests,
        )?;
        let device = VulkanDevice::new(
            instance.clone(),
            candidate.handle,
            surface.as_ref(),
            &device_extensions,
            config.device.queue_coverage,
            config.device.fence_timeout_ms,
        )?;
        advance(state, RendererState::Ready);

        let info = RendererInfo {
            api: Api::Vulkan,
            major: vk::api_version_major(api_version),
            minor: vk::api_version_minor(api_version),
            patch: vk::api_version_patch(api_version),
        };

        Ok(Self {
            device: Ref::new(device),
            _surface: surface,
            _instance: instance,
            info,
        })
    }
}

impl RendererBackend for VulkanRenderer {
    type Device = VulkanDevice;

    fn info(&self) -> RendererInfo {
        self.info
    }

    fn device(&self) -> &Ref<VulkanDevice> {
        &self.device
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        log::info!("Shutting down Vulkan renderer...");
    }
}

fn advance(from: RendererState, to: RendererState) -> RendererState {
    log::debug!("Renderer state: {:?} -> {:?}", from, to);
    to
}

fn enumerate_candidates(instance: &Instance) -> Result<Vec<DeviceCandidate<vk::PhysicalDevice>>> {
    let vk_instance = instance.ash_instance();
    let devices = unsafe { vk_instance.enumerate_physical_devices() }
        .context("Failed to enumerate physical devices")?;

    if devices.is_empty() {
        log::error!("No Vulkan-capable GPU found");
    }

    let candidates = devices
        .into_iter()
        .map(|device| {
            let props = unsafe { vk_instance.get_physical_device_properties(device) };
            let features = unsafe { vk_instance.get_physical_device_features(device) };

            let extensions =
                match unsafe { vk_instance.enumerate_device_extension_properties(device) } {
                    Ok(extensions) => extensions
                        .iter()
                        .map(|ext| name_from_raw(&ext.extension_name))
                        .collect(),
                    Err(e) => {
                        log::warn!("Failed to enumerate device extensions: {}", e);
                        Vec::new()
                    }
                };

            DeviceCandidate {
                handle: device,
                name: name_from_raw(&props.device_name),
                kind: device_kind(props.device_type),
                geometry_shader: features.geometry_shader == vk::TRUE,
                extensions,
            }
        })
        .collect();

    Ok(candidates)
}
