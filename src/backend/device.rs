// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Queue family discovery against the requested capabilities
// - Feature negotiation by API version tier
// - Logical device + one queue per distinct family
//
// The logical device lives in its own `Ref` so queues (and the command
// buffers they hand out) keep it alive; it is destroyed after the last of
// them is gone, and before the instance.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CString;

use super::instance::name_from_raw;
use super::queue::VulkanQueue;
use super::surface::Surface;
use super::Instance;
use crate::core::Ref;
use crate::gfx::queue_family::{self, CoveragePolicy};
use crate::gfx::{GraphicsDevice, QueueFlags};

/// Which feature query structures a device/instance pair supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FeatureTier {
    /// Vulkan 1.0: the core features struct only.
    Core,
    V11,
    V12,
    V13,
}

impl FeatureTier {
    pub fn from_version(version: u32) -> Self {
        match (vk::api_version_major(version), vk::api_version_minor(version)) {
            (0, _) | (1, 0) => FeatureTier::Core,
            (1, 1) => FeatureTier::V11,
            (1, 2) => FeatureTier::V12,
            _ => FeatureTier::V13,
        }
    }
}

/// Hardware capability bits of one queue family.
pub fn family_flags(flags: vk::QueueFlags) -> QueueFlags {
    let mut usage = QueueFlags::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        usage |= QueueFlags::GRAPHICS;
    }
    if flags.contains(vk::QueueFlags::TRANSFER) {
        usage |= QueueFlags::TRANSFER;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        usage |= QueueFlags::COMPUTE;
    }
    usage
}

/// Native logical device, destroyed when the last holder lets go.
pub struct LogicalDevice {
    device: ash::Device,
    _instance: Ref<Instance>,
}

impl LogicalDevice {
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan logical device...");
        unsafe { self.device.destroy_device(None) };
    }
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Queues go first: they drain and free their pools on drop
    queues: Vec<VulkanQueue>,
    logical: Ref<LogicalDevice>,
    name: String,
}

impl VulkanDevice {
    /// Create the logical device and its queues.
    ///
    /// # Arguments
    /// * `extensions` - device extensions, already negotiated
    /// * `policy` - what to do when a requested capability has no family
    /// * `fence_timeout_ms` - bound on every fence wait, `None` waits forever
    pub fn new(
        instance: Ref<Instance>,
        physical_device: vk::PhysicalDevice,
        surface: Option<&Surface>,
        extensions: &[String],
        policy: CoveragePolicy,
        fence_timeout_ms: Option<u64>,
    ) -> Result<Self> {
        let vk_instance = instance.ash_instance();
        let properties = unsafe { vk_instance.get_physical_device_properties(physical_device) };
        let name = name_from_raw(&properties.device_name);

        // Step 1: Map capabilities onto queue families
        let mut requested = QueueFlags::GRAPHICS | QueueFlags::TRANSFER | QueueFlags::COMPUTE;
        if surface.is_some() {
            requested |= QueueFlags::PRESENT;
        }

        let family_properties =
            unsafe { vk_instance.get_physical_device_queue_family_properties(physical_device) };
        let family_bits: Vec<QueueFlags> = family_properties
            .iter()
            .map(|family| family_flags(family.queue_flags))
            .collect();

        let families = queue_family::discover(requested, &family_bits, |family| {
            surface.map_or(false, |surface| surface.supports_present(physical_device, family))
        });
        policy.check(&families)?;

        let plan = families.queue_plan();
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = plan
            .iter()
            .map(|entry| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(entry.family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        // Step 2: Enable everything the device supports at its tier
        let version = instance.api_version().min(properties.api_version);
        let tier = FeatureTier::from_version(version);
        log::debug!("Device feature tier: {:?}", tier);

        let core_features = unsafe { vk_instance.get_physical_device_features(physical_device) };
        let mut features11 = vk::PhysicalDeviceVulkan11Features::default();
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder();
        if tier >= FeatureTier::V11 {
            features2 = features2.push_next(&mut features11);
        }
        if tier >= FeatureTier::V12 {
            features2 = features2.push_next(&mut features12);
        }
        if tier >= FeatureTier::V13 {
            features2 = features2.push_next(&mut features13);
        }
        if tier >= FeatureTier::V11 {
            unsafe { vk_instance.get_physical_device_features2(physical_device, &mut features2) };
        }

        // Step 3: Create logical device
        let extension_names = extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid device extension name")?;
        let extension_ptrs: Vec<_> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);
        create_info = if tier == FeatureTier::Core {
            create_info.enabled_features(&core_features)
        } else {
            create_info.push_next(&mut *features2)
        };

        let device = unsafe { vk_instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;
        let logical = Ref::new(LogicalDevice {
            device,
            _instance: instance.clone(),
        });

        log::info!("Logical device created on {} ({} extensions)", name, extensions.len());
        for ext in extensions {
            log::debug!("  device extension: {}", ext);
        }

        // Step 4: One queue per distinct family
        let queues = plan
            .iter()
            .map(|entry| {
                VulkanQueue::new(logical.clone(), entry.family, entry.usage, fence_timeout_ms)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            queues,
            logical,
            name,
        })
    }
}

impl GraphicsDevice for VulkanDevice {
    type Queue = VulkanQueue;

    fn queues(&self) -> &[VulkanQueue] {
        &self.queues
    }

    /// Wait for device to be idle (e.g., before cleanup)
    fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.raw().device_wait_idle() }.context("Failed to wait for device idle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device {}...", self.name);

        if let Err(e) = self.wait_idle() {
            log::error!("{:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_tier_follows_version() {
        assert_eq!(FeatureTier::from_version(vk::API_VERSION_1_0), FeatureTier::Core);
        assert_eq!(FeatureTier::from_version(vk::API_VERSION_1_1), FeatureTier::V11);
        assert_eq!(FeatureTier::from_version(vk::API_VERSION_1_2), FeatureTier::V12);
        assert_eq!(FeatureTier::from_version(vk::API_VERSION_1_3), FeatureTier::V13);
        assert_eq!(
            FeatureTier::from_version(vk::make_api_version(0, 1, 4, 0)),
            FeatureTier::V13
        );
    }

    #[test]
    fn tier_uses_the_lower_of_instance_and_device() {
        let negotiated = vk::API_VERSION_1_2.min(vk::make_api_version(0, 1, 3, 250));
        assert_eq!(FeatureTier::from_version(negotiated), FeatureTier::V12);

        let negotiated = vk::API_VERSION_1_3.min(vk::make_api_version(0, 1, 1, 120));
        assert_eq!(FeatureTier::from_version(negotiated), FeatureTier::V11);
    }

    #[test]
    fn family_flags_keep_hardware_bits_only() {
        let flags = vk::QueueFlags::GRAPHICS
            | vk::QueueFlags::COMPUTE
            | vk::QueueFlags::TRANSFER
            | vk::QueueFlags::SPARSE_BINDING;
        assert_eq!(
            family_flags(flags),
            QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER
        );
        assert_eq!(family_flags(vk::QueueFlags::SPARSE_BINDING), QueueFlags::empty());
    }
}
