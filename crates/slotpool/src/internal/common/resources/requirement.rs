use serde::{Deserialize, Serialize};
use std::fmt;

use crate::internal::common::resources::ResourceProfile;

/// Number of slots of a given profile that somebody needs.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    profile: ResourceProfile,
    count: usize,
}

impl ResourceRequirement {
    pub fn new(profile: ResourceProfile, count: usize) -> Self {
        ResourceRequirement { profile, count }
    }

    pub fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl fmt::Display for ResourceRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {}", self.count, self.profile)
    }
}
