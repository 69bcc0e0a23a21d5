use derive_more::{Add, AddAssign, Sum};
use serde::{Deserialize, Serialize};

const MEBI: u64 = 1024 * 1024;

/// Amount of memory in bytes.
#[derive(
    Debug,
    Default,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Add,
    AddAssign,
    Sum,
)]
pub struct MemorySize(u64);

impl MemorySize {
    pub const ZERO: MemorySize = MemorySize(0);
    pub const MAX: MemorySize = MemorySize(u64::MAX);

    pub fn from_bytes(bytes: u64) -> Self {
        MemorySize(bytes)
    }

    pub fn from_mebi_bytes(mebi_bytes: u64) -> Self {
        MemorySize(mebi_bytes.saturating_mul(MEBI))
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    pub fn mebi_bytes(&self) -> u64 {
        self.0 / MEBI
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(&self, other: MemorySize) -> Option<MemorySize> {
        self.0.checked_sub(other.0).map(MemorySize)
    }

    pub fn saturating_add(&self, other: MemorySize) -> MemorySize {
        MemorySize(self.0.saturating_add(other.0))
    }

    pub fn saturating_mul(&self, factor: u64) -> MemorySize {
        MemorySize(self.0.saturating_mul(factor))
    }
}

impl std::fmt::Display for MemorySize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if *self == MemorySize::MAX {
            write!(f, "max")
        } else if self.0 % MEBI == 0 {
            write!(f, "{}MiB", self.0 / MEBI)
        } else {
            write!(f, "{}B", self.0)
        }
    }
}
