use std::time::Instant;

use crate::events::EventProcessor;
use crate::internal::common::{Map, Set};
use crate::internal::common::ids::SlotRequestId;
use crate::internal::common::resources::{ResourceCounter, ResourceProfile};
use crate::internal::pool::core::SlotPool;
use crate::internal::pool::reactor::{on_release_slot, on_request_slot};
use crate::internal::pool::request::{
    RequestIdGenerator, RequestKind, RequestOrigin, RequestRecord, SlotFuture, SlotPromise,
};
use crate::internal::pool::slot::PhysicalSlot;

const REQUIREMENT_DECREASED: &str = "resource requirement decreased";

enum UnitState {
    Pending(SlotFuture),
    Allocated(PhysicalSlot),
}

/// One synthesized request of a declared requirement.
struct RequirementUnit {
    request_id: SlotRequestId,
    state: UnitState,
    in_use: bool,
}

/// What a single reconciliation did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequirementChange {
    /// Newly synthesized requests, in creation order.
    pub created: Vec<SlotRequestId>,
    /// Requests cancelled or whose slots were given back, newest first.
    pub released: Vec<SlotRequestId>,
    /// Units that were lost or failed and are not tracked anymore.
    pub dropped: Vec<SlotRequestId>,
}

/// Turns declared resource requirements ("4 units of profile X") into slot requests.
///
/// Units of a profile are kept in creation order. Increasing a requirement appends
/// new units; decreasing it removes the newest units that are not in use.
#[derive(Default)]
pub struct DeclarativeBridge {
    requirements: ResourceCounter,
    units: Map<ResourceProfile, Vec<RequirementUnit>>,
}

impl DeclarativeBridge {
    pub fn requirements(&self) -> &ResourceCounter {
        &self.requirements
    }

    pub fn set_requirements(
        &mut self,
        pool: &mut SlotPool,
        events: &mut dyn EventProcessor,
        id_generator: &RequestIdGenerator,
        requirements: ResourceCounter,
        now: Instant,
    ) -> RequirementChange {
        log::debug!("New resource requirements: {requirements:?}");
        events.on_resource_requirements_declared(&requirements);
        self.requirements = requirements;
        self.reconcile(pool, id_generator, now)
    }

    /// Brings the synthesized units in line with the declared requirements.
    pub fn reconcile(
        &mut self,
        pool: &mut SlotPool,
        id_generator: &RequestIdGenerator,
        now: Instant,
    ) -> RequirementChange {
        let mut change = RequirementChange::default();
        self.poll_units(&mut change);

        let profiles: Set<&ResourceProfile> = self
            .requirements
            .resources()
            .chain(self.units.keys())
            .collect();
        let mut profiles: Vec<ResourceProfile> = profiles.into_iter().cloned().collect();
        profiles.sort_by_cached_key(|p| p.to_string());

        for profile in profiles {
            let target = self.requirements.get_resource_count(&profile);
            let units = self.units.entry(profile.clone()).or_default();
            if units.len() < target {
                if pool.is_closed() {
                    continue;
                }
                for _ in units.len()..target {
                    if let Some(unit) = synthesize_unit(pool, id_generator, &profile, now) {
                        change.created.push(unit.request_id);
                        units.push(unit);
                    }
                }
            } else if units.len() > target {
                let mut excess = units.len() - target;
                let mut index = units.len();
                while excess > 0 && index > 0 {
                    index -= 1;
                    if units[index].in_use {
                        continue;
                    }
                    let unit = units.remove(index);
                    on_release_slot(pool, unit.request_id, REQUIREMENT_DECREASED, now);
                    change.released.push(unit.request_id);
                    excess -= 1;
                }
                if excess > 0 {
                    log::debug!(
                        "Requirement decrease of {profile} deferred, {excess} units are in use"
                    );
                }
            }
            if units.is_empty() {
                self.units.remove(&profile);
            }
        }
        change
    }

    /// Marks a unit as used by the scheduler, protecting it from requirement decreases.
    pub fn set_in_use(&mut self, request_id: SlotRequestId, in_use: bool) -> bool {
        for unit in self.units.values_mut().flatten() {
            if unit.request_id == request_id {
                unit.in_use = in_use;
                return true;
            }
        }
        false
    }

    /// Request ids of the units of `profile` in creation order.
    pub fn units_of(&self, profile: &ResourceProfile) -> Vec<SlotRequestId> {
        self.units
            .get(profile)
            .map(|units| units.iter().map(|u| u.request_id).collect())
            .unwrap_or_default()
    }

    /// Units that already hold a slot, per profile.
    pub fn acquired(&self) -> ResourceCounter {
        ResourceCounter::with_resources(self.units.iter().map(|(profile, units)| {
            let count = units
                .iter()
                .filter(|u| matches!(u.state, UnitState::Allocated(_)))
                .count();
            (profile.clone(), count)
        }))
    }

    pub fn slot_of(&self, request_id: SlotRequestId) -> Option<&PhysicalSlot> {
        self.units
            .values()
            .flatten()
            .find(|u| u.request_id == request_id)
            .and_then(|u| match &u.state {
                UnitState::Allocated(slot) => Some(slot),
                UnitState::Pending(_) => None,
            })
    }

    fn poll_units(&mut self, change: &mut RequirementChange) {
        for units in self.units.values_mut() {
            units.retain_mut(|unit| {
                let lost = match &mut unit.state {
                    UnitState::Pending(future) => match future.try_result() {
                        None => None,
                        Some(Ok(slot)) => {
                            unit.state = UnitState::Allocated(slot);
                            None
                        }
                        Some(Err(e)) => Some(e),
                    },
                    UnitState::Allocated(slot) => slot.release_listener().try_lost(),
                };
                match lost {
                    Some(error) => {
                        log::debug!("Requirement unit {} dropped: {error}", unit.request_id);
                        change.dropped.push(unit.request_id);
                        false
                    }
                    None => true,
                }
            });
        }
    }
}

fn synthesize_unit(
    pool: &mut SlotPool,
    id_generator: &RequestIdGenerator,
    profile: &ResourceProfile,
    now: Instant,
) -> Option<RequirementUnit> {
    let mut request_id = id_generator.next_id();
    while pool.is_request_known(request_id) {
        request_id = id_generator.next_id();
    }
    let (promise, future) = SlotPromise::new(request_id);
    let record = RequestRecord {
        request_id,
        profile: profile.clone(),
        kind: RequestKind::Batch,
        origin: RequestOrigin::Requirement,
        order: 0,
        created: now,
        deadline: None,
        unfulfillable_since: None,
        promise,
    };
    match on_request_slot(pool, record, now) {
        Ok(()) => Some(RequirementUnit {
            request_id,
            state: UnitState::Pending(future),
            in_use: false,
        }),
        Err(e) => {
            log::warn!("Cannot synthesize a request for {profile}: {e}");
            None
        }
    }
}
