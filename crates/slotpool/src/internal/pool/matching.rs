use crate::internal::common::Set;
use crate::internal::common::ids::{AllocationId, SlotRequestId};
use crate::internal::common::resources::ResourceProfile;
use crate::internal::pool::core::SlotPool;

/// Single matching pass over the pool.
///
/// Pending requests are visited in submission order and each one takes the first idle
/// slot (in idle order) whose profile satisfies it. The pool is not modified; the
/// caller binds the returned pairs.
pub(crate) fn find_matches(pool: &SlotPool) -> Vec<(SlotRequestId, AllocationId)> {
    let mut result = Vec::new();
    let free_count = pool.free_slot_count();
    if free_count == 0 || pool.pending_count() == 0 {
        return result;
    }

    let mut taken: Set<AllocationId> = Set::default();
    // Taken slots never come back during a pass, so a profile that found nothing once
    // will not find anything later either
    let mut hopeless: Vec<&ResourceProfile> = Vec::new();

    for request in pool.pending_records() {
        if taken.len() == free_count {
            break;
        }
        if hopeless.contains(&&request.profile) {
            continue;
        }
        let found = pool.free_slots().find(|slot| {
            !taken.contains(&slot.allocation_id) && slot.profile.is_matching(&request.profile)
        });
        match found {
            Some(slot) => {
                taken.insert(slot.allocation_id);
                result.push((request.request_id, slot.allocation_id));
            }
            None => hopeless.push(&request.profile),
        }
    }
    result
}
