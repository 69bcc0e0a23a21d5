use derive_more::{Add, AddAssign, Sum};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type ResourceUnits = u32;
pub type ResourceFractions = u32;

pub const FRACTIONS_PER_UNIT: ResourceFractions = 10_000;
pub const FRACTIONS_MAX_DIGITS: usize = 4; // = log10(FRACTIONS_PER_UNIT)

/// Fixed-point amount of a countable resource (cpu cores, gpus, ...).
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
pub struct ResourceAmount(u64);

impl ResourceAmount {
    pub const ZERO: ResourceAmount = ResourceAmount(0);
    pub const MAX: ResourceAmount = ResourceAmount(u64::MAX);

    pub fn new(units: ResourceUnits, fractions: ResourceFractions) -> Self {
        assert!(fractions < FRACTIONS_PER_UNIT);
        ResourceAmount(units as u64 * FRACTIONS_PER_UNIT as u64 + fractions as u64)
    }

    pub fn new_units(units: ResourceUnits) -> Self {
        ResourceAmount(units as u64 * FRACTIONS_PER_UNIT as u64)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn units(&self) -> ResourceUnits {
        (self.0 / (FRACTIONS_PER_UNIT as u64)) as ResourceUnits
    }

    pub fn fractions(&self) -> ResourceFractions {
        (self.0 % (FRACTIONS_PER_UNIT as u64)) as ResourceFractions
    }

    pub fn total_fractions(&self) -> u64 {
        self.0
    }

    pub fn checked_sub(&self, other: ResourceAmount) -> Option<ResourceAmount> {
        self.0.checked_sub(other.0).map(ResourceAmount)
    }

    pub fn saturating_add(&self, other: ResourceAmount) -> ResourceAmount {
        ResourceAmount(self.0.saturating_add(other.0))
    }

    pub fn saturating_mul(&self, factor: u64) -> ResourceAmount {
        ResourceAmount(self.0.saturating_mul(factor))
    }
}

impl From<ResourceUnits> for ResourceAmount {
    fn from(units: ResourceUnits) -> Self {
        ResourceAmount::new_units(units)
    }
}

impl std::fmt::Display for ResourceAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if *self == ResourceAmount::MAX {
            return write!(f, "max");
        }
        let fractions = self.fractions();
        // Sums of amounts may exceed the range of `ResourceUnits`
        write!(f, "{}", self.0 / FRACTIONS_PER_UNIT as u64)?;
        if fractions != 0 {
            let num = format!("{:01$}", fractions, FRACTIONS_MAX_DIGITS);
            write!(f, ".{}", num.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl FromStr for ResourceAmount {
    type Err = crate::Error;

    /// Parses "2", "0.5" or "1.25"; at most four fractional digits are allowed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (units, fractions) = match s.split_once('.') {
            Some((units, fractions)) => (units, fractions),
            None => (s, ""),
        };
        if fractions.len() > FRACTIONS_MAX_DIGITS {
            return Err(format!("Resource amount '{s}' has too many fractional digits").into());
        }
        let units: ResourceUnits = units
            .parse()
            .map_err(|_| format!("Invalid resource amount '{s}'"))?;
        let fractions: ResourceFractions = if fractions.is_empty() {
            0
        } else {
            let padded = format!("{fractions:0<width$}", width = FRACTIONS_MAX_DIGITS);
            padded
                .parse()
                .map_err(|_| format!("Invalid resource amount '{s}'"))?
        };
        Ok(ResourceAmount::new(units, fractions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_amount_add() {
        let r1 = ResourceAmount::new(10, 1234);
        let r2 = ResourceAmount::new(2, 4321);
        let r3 = ResourceAmount::new(7, 9999);
        assert_eq!(r1 + r2, ResourceAmount::new(12, 5555));
        assert_eq!(r1 + r3, ResourceAmount::new(18, 1233));
        assert_eq!(r1 + ResourceAmount::ZERO, r1);
    }

    #[test]
    pub fn test_amount_checked_sub() {
        let r1 = ResourceAmount::new(1, 5000);
        assert_eq!(
            r1.checked_sub(ResourceAmount::new_units(1)),
            Some(ResourceAmount::new(0, 5000))
        );
        assert_eq!(r1.checked_sub(ResourceAmount::new_units(2)), None);
    }

    #[test]
    pub fn test_amount_display() {
        assert_eq!(ResourceAmount::new(0, 0).to_string(), "0");
        assert_eq!(ResourceAmount::new(0, 1).to_string(), "0.0001");
        assert_eq!(ResourceAmount::new(500, 123).to_string(), "500.0123");
        assert_eq!(ResourceAmount::new(1, 2200).to_string(), "1.22");
        assert_eq!(ResourceAmount::MAX.to_string(), "max");
        let large = ResourceAmount::new_units(u32::MAX) + ResourceAmount::new(1, 5);
        assert_eq!(large.to_string(), "4294967296.0005");
    }

    #[test]
    pub fn test_amount_parse() {
        assert_eq!(
            "2".parse::<ResourceAmount>().unwrap(),
            ResourceAmount::new_units(2)
        );
        assert_eq!(
            "0.5".parse::<ResourceAmount>().unwrap(),
            ResourceAmount::new(0, 5000)
        );
        assert_eq!(
            "1.0025".parse::<ResourceAmount>().unwrap(),
            ResourceAmount::new(1, 25)
        );
        assert!("1.00001".parse::<ResourceAmount>().is_err());
        assert!("x".parse::<ResourceAmount>().is_err());
    }
}
