use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::internal::common::error::PoolError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_BATCH_SLOT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_IDLE_SLOT_TIMEOUT: Duration = Duration::from_secs(50);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// What happens with an offered slot that no pending request can use right now.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferMode {
    /// Keep it as an idle slot for future requests.
    #[default]
    Idle,
    /// Reject it; the worker keeps the slot.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfiguration {
    pub offer_mode: OfferMode,
    /// Used for interactive requests that do not carry their own timeout.
    pub request_timeout: Duration,
    /// How long a batch request may stay unfulfillable before it fails.
    pub batch_slot_timeout: Duration,
    /// Idle slots older than this are given back to their workers.
    pub idle_slot_timeout: Option<Duration>,
    /// Period of the housekeeping tick (batch timeouts, idle slots).
    pub check_interval: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        PoolConfiguration {
            offer_mode: OfferMode::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            batch_slot_timeout: DEFAULT_BATCH_SLOT_TIMEOUT,
            idle_slot_timeout: Some(DEFAULT_IDLE_SLOT_TIMEOUT),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

impl PoolConfiguration {
    pub fn validate(&self) -> crate::Result<()> {
        let check = |name: &str, value: Duration| {
            if value.is_zero() {
                Err(PoolError::ConfigurationError(format!(
                    "{name} has to be positive"
                )))
            } else {
                Ok(())
            }
        };
        check("request_timeout", self.request_timeout)?;
        check("batch_slot_timeout", self.batch_slot_timeout)?;
        check("check_interval", self.check_interval)?;
        if let Some(timeout) = self.idle_slot_timeout {
            check("idle_slot_timeout", timeout)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_valid() {
        PoolConfiguration::default().validate().unwrap();
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = PoolConfiguration {
            check_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PoolError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_offer_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&OfferMode::Strict).unwrap(),
            "\"strict\""
        );
        let mode: OfferMode = serde_json::from_str("\"idle\"").unwrap();
        assert_eq!(mode, OfferMode::Idle);
    }
}
