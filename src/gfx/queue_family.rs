// Queue family discovery
//
// Families are walked in index order. For every requested capability not
// yet assigned, the family is accepted if it exposes the matching hardware
// bit or, for PRESENT, if the surface says this family can present. The
// first family to match a capability keeps it. Discovery stops as soon as
// everything requested is assigned.

use serde::Deserialize;

use super::{GfxError, QueueFlags};

/// Hardware-backed capabilities. PRESENT is answered by the surface.
const HARDWARE_BITS: QueueFlags = QueueFlags::GRAPHICS
    .union(QueueFlags::TRANSFER)
    .union(QueueFlags::COMPUTE);

/// Capability → family map for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyAssignment {
    requested: QueueFlags,
    assigned: Vec<(QueueFlags, u32)>,
}

/// One queue to create: a distinct family and every capability it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePlan {
    pub family: u32,
    pub usage: QueueFlags,
}

impl FamilyAssignment {
    pub fn family_for(&self, capability: QueueFlags) -> Option<u32> {
        self.assigned
            .iter()
            .find(|(cap, _)| *cap == capability)
            .map(|&(_, family)| family)
    }

    pub fn found(&self) -> QueueFlags {
        self.assigned
            .iter()
            .fold(QueueFlags::empty(), |acc, (cap, _)| acc | *cap)
    }

    pub fn missing(&self) -> QueueFlags {
        self.requested - self.found()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Collapse the assignment to one entry per distinct family, ordered by
    /// family index, each tagged with the union of its capabilities.
    pub fn queue_plan(&self) -> Vec<QueuePlan> {
        let mut plan: Vec<QueuePlan> = Vec::new();
        for &(capability, family) in &self.assigned {
            match plan.iter_mut().find(|entry| entry.family == family) {
                Some(entry) => entry.usage |= capability,
                None => plan.push(QueuePlan {
                    family,
                    usage: capability,
                }),
            }
        }
        plan.sort_by_key(|entry| entry.family);
        plan
    }
}

/// Assign each requested capability to a family.
///
/// `families[i]` holds the hardware bits of family `i`; `supports_present`
/// is asked about a family index only while PRESENT is still unassigned.
pub fn discover(
    requested: QueueFlags,
    families: &[QueueFlags],
    mut supports_present: impl FnMut(u32) -> bool,
) -> FamilyAssignment {
    let mut assignment = FamilyAssignment {
        requested,
        assigned: Vec::new(),
    };

    for (index, bits) in families.iter().enumerate() {
        let family = index as u32;

        for capability in requested.iter() {
            if assignment.family_for(capability).is_some() {
                continue;
            }

            let matches = if HARDWARE_BITS.contains(capability) {
                bits.contains(capability)
            } else {
                capability == QueueFlags::PRESENT && supports_present(family)
            };

            if matches {
                assignment.assigned.push((capability, family));
            }
        }

        if assignment.is_complete() {
            break;
        }
    }

    assignment
}

/// What to do when discovery leaves capabilities unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoveragePolicy {
    /// Log and carry on with what was found.
    #[default]
    Warn,
    /// Refuse to create the device.
    Fail,
}

impl CoveragePolicy {
    pub fn check(self, assignment: &FamilyAssignment) -> Result<(), GfxError> {
        let missing = assignment.missing();
        if missing.is_empty() {
            return Ok(());
        }

        match self {
            CoveragePolicy::Warn => {
                log::warn!("Not all device queue families were found! Missing {:?}", missing);
                Ok(())
            }
            CoveragePolicy::Fail => Err(GfxError::IncompleteQueueCoverage { missing }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: QueueFlags = QueueFlags::GRAPHICS
        .union(QueueFlags::TRANSFER)
        .union(QueueFlags::COMPUTE);

    #[test]
    fn single_family_with_everything_yields_one_queue() {
        let assignment = discover(ALL, &[ALL], |_| false);
        assert!(assignment.is_complete());
        assert_eq!(
            assignment.queue_plan(),
            vec![QueuePlan {
                family: 0,
                usage: ALL
            }]
        );
    }

    #[test]
    fn first_matching_family_wins() {
        let families = [
            QueueFlags::TRANSFER,
            QueueFlags::GRAPHICS | QueueFlags::TRANSFER,
            QueueFlags::COMPUTE | QueueFlags::TRANSFER,
            QueueFlags::COMPUTE,
        ];
        let assignment = discover(ALL, &families, |_| false);

        assert_eq!(assignment.family_for(QueueFlags::TRANSFER), Some(0));
        assert_eq!(assignment.family_for(QueueFlags::GRAPHICS), Some(1));
        assert_eq!(assignment.family_for(QueueFlags::COMPUTE), Some(2));
        assert_eq!(
            assignment.queue_plan(),
            vec![
                QueuePlan { family: 0, usage: QueueFlags::TRANSFER },
                QueuePlan { family: 1, usage: QueueFlags::GRAPHICS },
                QueuePlan { family: 2, usage: QueueFlags::COMPUTE },
            ]
        );
    }

    #[test]
    fn discovery_is_deterministic() {
        let families = [
            QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
            QueueFlags::TRANSFER,
            QueueFlags::COMPUTE,
        ];
        let requested = ALL | QueueFlags::PRESENT;
        let first = discover(requested, &families, |family| family == 1);
        for _ in 0..16 {
            assert_eq!(discover(requested, &families, |family| family == 1), first);
        }
    }

    #[test]
    fn present_is_answered_by_the_surface() {
        let families = [QueueFlags::GRAPHICS, QueueFlags::TRANSFER];
        let mut asked = Vec::new();
        let assignment = discover(
            QueueFlags::GRAPHICS | QueueFlags::PRESENT,
            &families,
            |family| {
                asked.push(family);
                family == 1
            },
        );

        assert_eq!(asked, vec![0, 1]);
        assert_eq!(assignment.family_for(QueueFlags::PRESENT), Some(1));
        assert_eq!(assignment.family_for(QueueFlags::GRAPHICS), Some(0));
    }

    #[test]
    fn present_shares_the_graphics_queue() {
        let assignment = discover(
            QueueFlags::GRAPHICS | QueueFlags::PRESENT,
            &[QueueFlags::GRAPHICS | QueueFlags::TRANSFER],
            |_| true,
        );
        assert_eq!(
            assignment.queue_plan(),
            vec![QueuePlan {
                family: 0,
                usage: QueueFlags::GRAPHICS | QueueFlags::PRESENT
            }]
        );
    }

    #[test]
    fn stops_once_everything_is_assigned() {
        let mut asked = Vec::new();
        discover(
            QueueFlags::GRAPHICS | QueueFlags::PRESENT,
            &[QueueFlags::GRAPHICS, QueueFlags::GRAPHICS, QueueFlags::GRAPHICS],
            |family| {
                asked.push(family);
                true
            },
        );
        assert_eq!(asked, vec![0]);
    }

    #[test]
    fn partial_coverage_reports_missing() {
        let assignment = discover(ALL, &[QueueFlags::GRAPHICS | QueueFlags::TRANSFER], |_| false);
        assert!(!assignment.is_complete());
        assert_eq!(assignment.missing(), QueueFlags::COMPUTE);
        assert_eq!(assignment.found(), QueueFlags::GRAPHICS | QueueFlags::TRANSFER);
    }

    #[test]
    fn warn_policy_tolerates_missing_capabilities() {
        let assignment = discover(ALL, &[QueueFlags::GRAPHICS], |_| false);
        assert!(CoveragePolicy::Warn.check(&assignment).is_ok());
    }

    #[test]
    fn fail_policy_rejects_missing_capabilities() {
        let assignment = discover(ALL, &[QueueFlags::GRAPHICS], |_| false);
        let err = CoveragePolicy::Fail.check(&assignment).unwrap_err();
        assert!(matches!(
            err,
            GfxError::IncompleteQueueCoverage { missing }
                if missing == QueueFlags::TRANSFER | QueueFlags::COMPUTE
        ));

        let complete = discover(QueueFlags::GRAPHICS, &[QueueFlags::GRAPHICS], |_| false);
        assert!(CoveragePolicy::Fail.check(&complete).is_ok());
    }
}
