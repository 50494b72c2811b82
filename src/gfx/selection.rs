// Physical device selection
//
// Each candidate gets a score: a base by device type, a bonus for optional
// capabilities and for each optional extension it offers. Missing any
// required extension disqualifies it outright (score 0). The strictly
// highest non-zero score wins; ties keep the earlier candidate.

use super::extension::ExtensionRequest;
use super::GfxError;

pub const DISCRETE_SCORE: u32 = 1000;
pub const INTEGRATED_SCORE: u32 = 100;
pub const OTHER_SCORE: u32 = 1;
pub const GEOMETRY_SHADER_BONUS: u32 = 50;
pub const OPTIONAL_EXTENSION_BONUS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

/// Hardware description gathered once per enumeration pass.
#[derive(Debug, Clone)]
pub struct DeviceCandidate<H> {
    pub handle: H,
    pub name: String,
    pub kind: DeviceKind,
    pub geometry_shader: bool,
    pub extensions: Vec<String>,
}

impl<H> DeviceCandidate<H> {
    fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }
}

pub fn score<H>(candidate: &DeviceCandidate<H>, requested: &[ExtensionRequest]) -> u32 {
    let mut score = match candidate.kind {
        DeviceKind::Discrete => DISCRETE_SCORE,
        DeviceKind::Integrated => INTEGRATED_SCORE,
        DeviceKind::Virtual | DeviceKind::Cpu | DeviceKind::Other => OTHER_SCORE,
    };

    if candidate.geometry_shader {
        score += GEOMETRY_SHADER_BONUS;
    }

    for request in requested {
        let found = candidate.has_extension(&request.name);
        if request.required && !found {
            log::debug!(
                "Device {} lacks required extension {}",
                candidate.name,
                request.name
            );
            return 0;
        }
        if found && !request.required {
            score += OPTIONAL_EXTENSION_BONUS;
        }
    }

    score
}

/// Pick the best-scoring candidate.
pub fn select<H>(
    candidates: impl IntoIterator<Item = DeviceCandidate<H>>,
    requested: &[ExtensionRequest],
) -> Result<DeviceCandidate<H>, GfxError> {
    let mut best: Option<(u32, DeviceCandidate<H>)> = None;

    for candidate in candidates {
        let points = score(&candidate, requested);
        log::debug!("Device {} ({:?}) scored {}", candidate.name, candidate.kind, points);

        let better = match &best {
            Some((best_points, _)) => points > *best_points,
            None => points > 0,
        };
        if better {
            best = Some((points, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
        .ok_or(GfxError::NoViableDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, kind: DeviceKind, extensions: &[&str]) -> DeviceCandidate<u32> {
        DeviceCandidate {
            handle: id,
            name: format!("gpu{}", id),
            kind,
            geometry_shader: false,
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn requests() -> Vec<ExtensionRequest> {
        vec![
            ExtensionRequest::required("VK_KHR_swapchain"),
            ExtensionRequest::optional("VK_KHR_portability_subset"),
        ]
    }

    #[test]
    fn discrete_outranks_integrated() {
        let discrete = candidate(0, DeviceKind::Discrete, &["VK_KHR_swapchain"]);
        let integrated = candidate(1, DeviceKind::Integrated, &["VK_KHR_swapchain"]);
        assert!(score(&discrete, &requests()) > score(&integrated, &requests()));

        let chosen = select(vec![integrated, discrete], &requests()).unwrap();
        assert_eq!(chosen.handle, 0);
    }

    #[test]
    fn missing_required_extension_scores_zero() {
        let discrete = candidate(0, DeviceKind::Discrete, &["VK_KHR_portability_subset"]);
        assert_eq!(score(&discrete, &requests()), 0);

        let integrated = candidate(1, DeviceKind::Integrated, &["VK_KHR_swapchain"]);
        let chosen = select(vec![discrete, integrated], &requests()).unwrap();
        assert_eq!(chosen.handle, 1);
    }

    #[test]
    fn optional_extension_and_geometry_shader_add_bonus() {
        let plain = candidate(0, DeviceKind::Integrated, &["VK_KHR_swapchain"]);
        let mut rich = candidate(
            1,
            DeviceKind::Integrated,
            &["VK_KHR_swapchain", "VK_KHR_portability_subset"],
        );
        rich.geometry_shader = true;

        assert_eq!(score(&plain, &requests()), INTEGRATED_SCORE);
        assert_eq!(
            score(&rich, &requests()),
            INTEGRATED_SCORE + GEOMETRY_SHADER_BONUS + OPTIONAL_EXTENSION_BONUS
        );
    }

    #[test]
    fn ties_keep_first_candidate() {
        let a = candidate(7, DeviceKind::Discrete, &["VK_KHR_swapchain"]);
        let b = candidate(8, DeviceKind::Discrete, &["VK_KHR_swapchain"]);
        assert_eq!(select(vec![a, b], &requests()).unwrap().handle, 7);
    }

    #[test]
    fn no_viable_device_is_an_error() {
        let a = candidate(0, DeviceKind::Discrete, &[]);
        let b = candidate(1, DeviceKind::Cpu, &[]);
        assert!(matches!(
            select(vec![a, b], &requests()),
            Err(GfxError::NoViableDevice)
        ));
        assert!(matches!(
            select(Vec::<DeviceCandidate<u32>>::new(), &requests()),
            Err(GfxError::NoViableDevice)
        ));
    }
}
