use std::fmt;

use crate::internal::common::Map;
use crate::internal::common::data_structures::new_map;
use crate::internal::common::error::PoolError;
use crate::internal::common::resources::{ResourceProfile, ResourceRequirement};

/// Multiset of resource profiles.
///
/// Only profiles with a positive count are stored, so two counters are equal iff they
/// hold the same profile -> count mapping. Subtraction comes in two flavours that the
/// caller has to pick explicitly: [`ResourceCounter::subtract`] fails with
/// `NegativeResult` and leaves the counter untouched, [`ResourceCounter::subtract_saturating`]
/// clamps at zero.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResourceCounter {
    resources: Map<ResourceProfile, usize>,
}

impl ResourceCounter {
    pub fn empty() -> Self {
        ResourceCounter {
            resources: new_map(),
        }
    }

    pub fn with_resource(profile: ResourceProfile, count: usize) -> Self {
        let mut counter = Self::empty();
        counter.add(profile, count);
        counter
    }

    pub fn with_resources<I: IntoIterator<Item = (ResourceProfile, usize)>>(resources: I) -> Self {
        let mut counter = Self::empty();
        for (profile, count) in resources {
            counter.add(profile, count);
        }
        counter
    }

    pub fn add(&mut self, profile: ResourceProfile, count: usize) {
        if count > 0 {
            *self.resources.entry(profile).or_insert(0) += count;
        }
    }

    pub fn add_counter(&mut self, other: &ResourceCounter) {
        for (profile, count) in other.resources_with_count() {
            self.add(profile.clone(), count);
        }
    }

    pub fn subtract(&mut self, profile: &ResourceProfile, count: usize) -> crate::Result<()> {
        if count == 0 {
            return Ok(());
        }
        let current = self.get_resource_count(profile);
        if count > current {
            return Err(PoolError::NegativeResult(format!(
                "subtracting {count} x {profile} from a counter holding {current}"
            )));
        }
        self.set_count(profile, current - count);
        Ok(())
    }

    pub fn subtract_saturating(&mut self, profile: &ResourceProfile, count: usize) {
        let current = self.get_resource_count(profile);
        self.set_count(profile, current.saturating_sub(count));
    }

    /// All-or-nothing: if any profile would go negative the counter is left unchanged.
    pub fn subtract_counter(&mut self, other: &ResourceCounter) -> crate::Result<()> {
        for (profile, count) in other.resources_with_count() {
            let current = self.get_resource_count(profile);
            if count > current {
                return Err(PoolError::NegativeResult(format!(
                    "subtracting {count} x {profile} from a counter holding {current}"
                )));
            }
        }
        for (profile, count) in other.resources_with_count() {
            let current = self.get_resource_count(profile);
            self.set_count(profile, current - count);
        }
        Ok(())
    }

    fn set_count(&mut self, profile: &ResourceProfile, count: usize) {
        if count == 0 {
            self.resources.remove(profile);
        } else if let Some(value) = self.resources.get_mut(profile) {
            *value = count;
        } else {
            self.resources.insert(profile.clone(), count);
        }
    }

    #[inline]
    pub fn get_resource_count(&self, profile: &ResourceProfile) -> usize {
        self.resources.get(profile).copied().unwrap_or(0)
    }

    pub fn total_resource_count(&self) -> usize {
        self.resources.values().sum()
    }

    /// Sum of all profiles weighted by their counts.
    pub fn total_resource(&self) -> ResourceProfile {
        self.resources
            .iter()
            .fold(ResourceProfile::zero(), |acc, (profile, count)| {
                acc.merge(&profile.multiply(*count as u64))
            })
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceProfile> {
        self.resources.keys()
    }

    pub fn resources_with_count(&self) -> impl Iterator<Item = (&ResourceProfile, usize)> {
        self.resources.iter().map(|(profile, count)| (profile, *count))
    }

    #[inline]
    pub fn contains_resource(&self, profile: &ResourceProfile) -> bool {
        self.resources.contains_key(profile)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn to_requirements(&self) -> Vec<ResourceRequirement> {
        self.resources
            .iter()
            .map(|(profile, count)| ResourceRequirement::new(profile.clone(), *count))
            .collect()
    }

    pub fn from_requirements(requirements: &[ResourceRequirement]) -> Self {
        Self::with_resources(
            requirements
                .iter()
                .map(|rq| (rq.profile().clone(), rq.count())),
        )
    }
}

impl fmt::Debug for ResourceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self
            .resources
            .iter()
            .map(|(profile, count)| format!("{profile}: {count}"))
            .collect();
        entries.sort_unstable();
        f.debug_list().entries(entries).finish()
    }
}
