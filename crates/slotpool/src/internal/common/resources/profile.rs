use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::internal::common::error::PoolError;
use crate::internal::common::resources::{MemorySize, ResourceAmount};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
enum ProfileKind {
    Unknown,
    Any,
    Specified,
}

/// Shape of a slot: cpu, four memory pools and named extended resources.
///
/// Two special profiles exist besides the specified ones:
/// * `UNKNOWN` is a request for a slot of any shape. As an offered profile it only
///   satisfies another `UNKNOWN` request.
/// * `ANY` is an offered profile that satisfies every request.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    kind: ProfileKind,
    cpu_cores: ResourceAmount,
    task_heap_memory: MemorySize,
    task_off_heap_memory: MemorySize,
    managed_memory: MemorySize,
    network_memory: MemorySize,
    extended_resources: BTreeMap<String, ResourceAmount>,
}

impl ResourceProfile {
    pub fn unknown() -> Self {
        ResourceProfile {
            kind: ProfileKind::Unknown,
            ..Self::zero()
        }
    }

    pub fn any() -> Self {
        ResourceProfile {
            kind: ProfileKind::Any,
            cpu_cores: ResourceAmount::MAX,
            task_heap_memory: MemorySize::MAX,
            task_off_heap_memory: MemorySize::MAX,
            managed_memory: MemorySize::MAX,
            network_memory: MemorySize::MAX,
            extended_resources: BTreeMap::new(),
        }
    }

    pub fn zero() -> Self {
        ResourceProfile {
            kind: ProfileKind::Specified,
            cpu_cores: ResourceAmount::ZERO,
            task_heap_memory: MemorySize::ZERO,
            task_off_heap_memory: MemorySize::ZERO,
            managed_memory: MemorySize::ZERO,
            network_memory: MemorySize::ZERO,
            extended_resources: BTreeMap::new(),
        }
    }

    pub fn builder() -> ResourceProfileBuilder {
        ResourceProfileBuilder {
            profile: Self::zero(),
        }
    }

    pub fn from_cpu_and_heap(cpu_cores: ResourceAmount, task_heap_memory: MemorySize) -> Self {
        Self::builder()
            .cpu_cores(cpu_cores)
            .task_heap_memory(task_heap_memory)
            .build()
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.kind == ProfileKind::Unknown
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        self.kind == ProfileKind::Any
    }

    pub fn cpu_cores(&self) -> ResourceAmount {
        self.cpu_cores
    }

    pub fn task_heap_memory(&self) -> MemorySize {
        self.task_heap_memory
    }

    pub fn task_off_heap_memory(&self) -> MemorySize {
        self.task_off_heap_memory
    }

    pub fn managed_memory(&self) -> MemorySize {
        self.managed_memory
    }

    pub fn network_memory(&self) -> MemorySize {
        self.network_memory
    }

    pub fn extended_resources(&self) -> &BTreeMap<String, ResourceAmount> {
        &self.extended_resources
    }

    /// Returns true if a slot with this (offered) profile can serve `required`.
    pub fn is_matching(&self, required: &ResourceProfile) -> bool {
        if self.is_any() || self == required {
            return true;
        }
        if self.is_unknown() {
            return false;
        }
        if required.is_unknown() {
            return true;
        }
        if required.is_any() {
            return false;
        }
        self.dimensions_cover(required)
    }

    pub fn is_less_or_equal(&self, other: &ResourceProfile) -> bool {
        if self == other {
            return true;
        }
        if self.is_unknown() || other.is_unknown() {
            return false;
        }
        if other.is_any() {
            return true;
        }
        if self.is_any() {
            return false;
        }
        other.dimensions_cover(self)
    }

    fn dimensions_cover(&self, required: &ResourceProfile) -> bool {
        self.cpu_cores >= required.cpu_cores
            && self.task_heap_memory >= required.task_heap_memory
            && self.task_off_heap_memory >= required.task_off_heap_memory
            && self.managed_memory >= required.managed_memory
            && self.network_memory >= required.network_memory
            && required.extended_resources.iter().all(|(name, amount)| {
                self.extended_resources
                    .get(name)
                    .is_some_and(|offered| offered >= amount)
            })
    }

    pub fn merge(&self, other: &ResourceProfile) -> ResourceProfile {
        if self.is_any() || other.is_any() {
            return Self::any();
        }
        if self.is_unknown() || other.is_unknown() {
            return Self::unknown();
        }
        let mut extended_resources = self.extended_resources.clone();
        for (name, amount) in &other.extended_resources {
            let entry = extended_resources
                .entry(name.clone())
                .or_insert(ResourceAmount::ZERO);
            *entry = entry.saturating_add(*amount);
        }
        ResourceProfile {
            kind: ProfileKind::Specified,
            cpu_cores: self.cpu_cores.saturating_add(other.cpu_cores),
            task_heap_memory: self.task_heap_memory.saturating_add(other.task_heap_memory),
            task_off_heap_memory: self
                .task_off_heap_memory
                .saturating_add(other.task_off_heap_memory),
            managed_memory: self.managed_memory.saturating_add(other.managed_memory),
            network_memory: self.network_memory.saturating_add(other.network_memory),
            extended_resources,
        }
    }

    pub fn subtract(&self, other: &ResourceProfile) -> crate::Result<ResourceProfile> {
        if self.is_any() {
            return Ok(Self::any());
        }
        if self.is_unknown() || other.is_unknown() {
            return Ok(Self::unknown());
        }
        if other.is_any() {
            return Err(PoolError::NegativeResult(format!(
                "cannot subtract {other} from {self}"
            )));
        }
        let negative = || PoolError::NegativeResult(format!("cannot subtract {other} from {self}"));
        let mut extended_resources = self.extended_resources.clone();
        for (name, amount) in &other.extended_resources {
            let current = extended_resources
                .get(name)
                .copied()
                .unwrap_or(ResourceAmount::ZERO);
            let rest = current.checked_sub(*amount).ok_or_else(negative)?;
            if rest.is_zero() {
                extended_resources.remove(name);
            } else {
                extended_resources.insert(name.clone(), rest);
            }
        }
        Ok(ResourceProfile {
            kind: ProfileKind::Specified,
            cpu_cores: self
                .cpu_cores
                .checked_sub(other.cpu_cores)
                .ok_or_else(negative)?,
            task_heap_memory: self
                .task_heap_memory
                .checked_sub(other.task_heap_memory)
                .ok_or_else(negative)?,
            task_off_heap_memory: self
                .task_off_heap_memory
                .checked_sub(other.task_off_heap_memory)
                .ok_or_else(negative)?,
            managed_memory: self
                .managed_memory
                .checked_sub(other.managed_memory)
                .ok_or_else(negative)?,
            network_memory: self
                .network_memory
                .checked_sub(other.network_memory)
                .ok_or_else(negative)?,
            extended_resources,
        })
    }

    pub fn multiply(&self, factor: u64) -> ResourceProfile {
        if !matches!(self.kind, ProfileKind::Specified) {
            return self.clone();
        }
        ResourceProfile {
            kind: ProfileKind::Specified,
            cpu_cores: self.cpu_cores.saturating_mul(factor),
            task_heap_memory: self.task_heap_memory.saturating_mul(factor),
            task_off_heap_memory: self.task_off_heap_memory.saturating_mul(factor),
            managed_memory: self.managed_memory.saturating_mul(factor),
            network_memory: self.network_memory.saturating_mul(factor),
            extended_resources: self
                .extended_resources
                .iter()
                .filter(|_| factor > 0)
                .map(|(name, amount)| (name.clone(), amount.saturating_mul(factor)))
                .collect(),
        }
    }
}

impl PartialOrd for ResourceProfile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.is_less_or_equal(other) {
            Some(Ordering::Less)
        } else if other.is_less_or_equal(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl fmt::Display for ResourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ProfileKind::Unknown => write!(f, "ResourceProfile{{UNKNOWN}}"),
            ProfileKind::Any => write!(f, "ResourceProfile{{ANY}}"),
            ProfileKind::Specified => {
                write!(
                    f,
                    "ResourceProfile{{cpu={}, heap={}, off_heap={}, managed={}, network={}",
                    self.cpu_cores,
                    self.task_heap_memory,
                    self.task_off_heap_memory,
                    self.managed_memory,
                    self.network_memory
                )?;
                for (name, amount) in &self.extended_resources {
                    write!(f, ", {name}={amount}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

pub struct ResourceProfileBuilder {
    profile: ResourceProfile,
}

impl ResourceProfileBuilder {
    pub fn cpu_cores<A: Into<ResourceAmount>>(mut self, amount: A) -> Self {
        self.profile.cpu_cores = amount.into();
        self
    }

    pub fn task_heap_memory(mut self, size: MemorySize) -> Self {
        self.profile.task_heap_memory = size;
        self
    }

    pub fn task_off_heap_memory(mut self, size: MemorySize) -> Self {
        self.profile.task_off_heap_memory = size;
        self
    }

    pub fn managed_memory(mut self, size: MemorySize) -> Self {
        self.profile.managed_memory = size;
        self
    }

    pub fn network_memory(mut self, size: MemorySize) -> Self {
        self.profile.network_memory = size;
        self
    }

    /// Zero amounts are dropped so that profiles compare equal regardless of them.
    pub fn extended_resource<A: Into<ResourceAmount>>(mut self, name: &str, amount: A) -> Self {
        let amount = amount.into();
        if amount.is_zero() {
            self.profile.extended_resources.remove(name);
        } else {
            self.profile
                .extended_resources
                .insert(name.to_string(), amount);
        }
        self
    }

    pub fn build(self) -> ResourceProfile {
        self.profile
    }
}
