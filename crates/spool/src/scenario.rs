use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use slotpool::pool::{OfferMode, PoolConfiguration, SlotOffer};
use slotpool::resources::{MemorySize, ResourceAmount, ResourceCounter, ResourceProfile};
use slotpool::AllocationId;

use crate::common::error::SpoolError;

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountValue {
    Int(u32),
    Float(f64),
    String(String),
}

impl AmountValue {
    fn parse(self) -> crate::Result<ResourceAmount> {
        match self {
            AmountValue::Int(n) => Ok(ResourceAmount::new_units(n)),
            AmountValue::Float(f) => Ok(f.to_string().parse()?),
            AmountValue::String(s) => Ok(s.parse()?),
        }
    }
}

fn deserialize_amount<'de, D>(deserializer: D) -> Result<ResourceAmount, D::Error>
where
    D: Deserializer<'de>,
{
    AmountValue::deserialize(deserializer)?
        .parse()
        .map_err(serde::de::Error::custom)
}

fn deserialize_extended<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, ResourceAmount>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, AmountValue>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, value)| {
            let amount = value.parse().map_err(D::Error::custom)?;
            Ok((name, amount))
        })
        .collect::<Result<_, D::Error>>()
}

fn deserialize_human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    humantime::parse_duration(&buf).map_err(serde::de::Error::custom)
}

fn deserialize_human_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = Option::<String>::deserialize(deserializer)?;

    if let Some(b) = buf {
        humantime::parse_duration(&b)
            .map(Some)
            .map_err(serde::de::Error::custom)
    } else {
        Ok(None)
    }
}

/// `"off"` disables the timeout, a missing value keeps the default.
fn deserialize_switchable_duration<'de, D>(
    deserializer: D,
) -> Result<Option<Option<Duration>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) if value == "off" => Ok(Some(None)),
        Some(value) => humantime::parse_duration(&value)
            .map(|d| Some(Some(d)))
            .map_err(serde::de::Error::custom),
    }
}

fn default_cause() -> String {
    "released by scenario".to_string()
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKindDef {
    #[default]
    Specified,
    Any,
    Unknown,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProfileDef {
    #[serde(default)]
    pub kind: ProfileKindDef,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub cpus: ResourceAmount,
    #[serde(default)]
    pub heap_mb: u64,
    #[serde(default)]
    pub off_heap_mb: u64,
    #[serde(default)]
    pub managed_mb: u64,
    #[serde(default)]
    pub network_mb: u64,
    #[serde(default, deserialize_with = "deserialize_extended")]
    pub extended: BTreeMap<String, ResourceAmount>,
}

impl ProfileDef {
    pub fn to_profile(&self) -> ResourceProfile {
        match self.kind {
            ProfileKindDef::Any => ResourceProfile::any(),
            ProfileKindDef::Unknown => ResourceProfile::unknown(),
            ProfileKindDef::Specified => {
                let mut builder = ResourceProfile::builder()
                    .cpu_cores(self.cpus)
                    .task_heap_memory(MemorySize::from_mebi_bytes(self.heap_mb))
                    .task_off_heap_memory(MemorySize::from_mebi_bytes(self.off_heap_mb))
                    .managed_memory(MemorySize::from_mebi_bytes(self.managed_mb))
                    .network_memory(MemorySize::from_mebi_bytes(self.network_mb));
                for (name, amount) in &self.extended {
                    builder = builder.extended_resource(name, *amount);
                }
                builder.build()
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SlotDef {
    pub allocation: u64,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub profile: ProfileDef,
}

impl SlotDef {
    pub fn to_offer(&self) -> SlotOffer {
        SlotOffer::new(
            AllocationId::new(self.allocation),
            self.index,
            self.profile.to_profile(),
        )
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RequirementDef {
    #[serde(default)]
    pub profile: ProfileDef,
    pub count: usize,
}

pub fn to_counter(requirements: &[RequirementDef]) -> ResourceCounter {
    ResourceCounter::with_resources(
        requirements
            .iter()
            .map(|r| (r.profile.to_profile(), r.count)),
    )
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum EventDef {
    Register {
        worker: u32,
    },
    Offer {
        worker: u32,
        #[serde(default)]
        hostname: Option<String>,
        slots: Vec<SlotDef>,
    },
    Request {
        id: u64,
        #[serde(default)]
        profile: ProfileDef,
        #[serde(default, deserialize_with = "deserialize_human_duration_opt")]
        timeout: Option<Duration>,
    },
    BatchRequest {
        id: u64,
        #[serde(default)]
        profile: ProfileDef,
    },
    ReleaseSlot {
        id: u64,
        #[serde(default = "default_cause")]
        cause: String,
    },
    Requirements {
        #[serde(default)]
        resources: Vec<RequirementDef>,
    },
    NotEnoughResources {
        #[serde(default)]
        acquired: Vec<RequirementDef>,
    },
    ReleaseWorker {
        worker: u32,
        #[serde(default = "default_cause")]
        cause: String,
    },
    Sleep {
        #[serde(deserialize_with = "deserialize_human_duration")]
        duration: Duration,
    },
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PoolSection {
    #[serde(default)]
    pub offer_mode: Option<OfferMode>,
    #[serde(default, deserialize_with = "deserialize_human_duration_opt")]
    pub request_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_human_duration_opt")]
    pub batch_slot_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_switchable_duration")]
    pub idle_slot_timeout: Option<Option<Duration>>,
    #[serde(default, deserialize_with = "deserialize_human_duration_opt")]
    pub check_interval: Option<Duration>,
}

impl PoolSection {
    /// Fills the missing values with defaults and validates the result.
    pub fn to_configuration(&self) -> crate::Result<PoolConfiguration> {
        let defaults = PoolConfiguration::default();
        let config = PoolConfiguration {
            offer_mode: self.offer_mode.unwrap_or(defaults.offer_mode),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            batch_slot_timeout: self
                .batch_slot_timeout
                .unwrap_or(defaults.batch_slot_timeout),
            idle_slot_timeout: self
                .idle_slot_timeout
                .unwrap_or(defaults.idle_slot_timeout),
            check_interval: self.check_interval.unwrap_or(defaults.check_interval),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub events: Vec<EventDef>,
}

impl Scenario {
    fn validate(&self) -> crate::Result<()> {
        for event in &self.events {
            match event {
                EventDef::Offer { worker, slots, .. } if slots.is_empty() => {
                    return Err(SpoolError::ScenarioError(format!(
                        "Offer of worker {worker} contains no slots"
                    )));
                }
                EventDef::Requirements { resources: entries, .. }
                | EventDef::NotEnoughResources { acquired: entries } => {
                    if entries.iter().any(|e| e.count == 0) {
                        return Err(SpoolError::ScenarioError(
                            "Resource counts have to be positive".into(),
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn parse(str: &str) -> crate::Result<Scenario> {
        let scenario: Scenario = toml::from_str(str)?;
        scenario.validate()?;
        Ok(scenario)
    }
}

/// Renders the configuration as a `[pool]` table that `Scenario::parse` accepts.
pub fn format_configuration(config: &PoolConfiguration) -> String {
    let mode = match config.offer_mode {
        OfferMode::Idle => "idle",
        OfferMode::Strict => "strict",
    };
    let idle = config
        .idle_slot_timeout
        .map(|d| humantime::format_duration(d).to_string())
        .unwrap_or_else(|| "off".to_string());
    let mut out = String::from("[pool]\n");
    let _ = writeln!(out, "offer-mode = \"{mode}\"");
    let _ = writeln!(
        out,
        "request-timeout = \"{}\"",
        humantime::format_duration(config.request_timeout)
    );
    let _ = writeln!(
        out,
        "batch-slot-timeout = \"{}\"",
        humantime::format_duration(config.batch_slot_timeout)
    );
    let _ = writeln!(out, "idle-slot-timeout = \"{idle}\"");
    let _ = writeln!(
        out,
        "check-interval = \"{}\"",
        humantime::format_duration(config.check_interval)
    );
    out
}
