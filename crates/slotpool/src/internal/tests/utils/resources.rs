use derive_builder::Builder;

use crate::internal::common::resources::{MemorySize, ResourceProfile};
use crate::internal::pool::slot::SlotOffer;
use crate::AllocationId;

pub fn cpus(n: u32) -> ResourceProfile {
    ResourceProfile::builder().cpu_cores(n).build()
}

pub fn cpus_mem(n: u32, mebi_bytes: u64) -> ResourceProfile {
    ResourceProfile::builder()
        .cpu_cores(n)
        .task_heap_memory(MemorySize::from_mebi_bytes(mebi_bytes))
        .build()
}

#[derive(Builder, Clone)]
#[builder(pattern = "owned")]
pub struct TestOffer {
    allocation_id: u64,
    #[builder(default)]
    slot_index: u32,
    #[builder(default = "1")]
    cpus: u32,
    #[builder(default)]
    heap_mb: u64,
    #[builder(default)]
    extended: Vec<(String, u32)>,
}

impl TestOffer {
    pub fn profile(&self) -> ResourceProfile {
        let mut builder = ResourceProfile::builder()
            .cpu_cores(self.cpus)
            .task_heap_memory(MemorySize::from_mebi_bytes(self.heap_mb));
        for (name, amount) in &self.extended {
            builder = builder.extended_resource(name, *amount);
        }
        builder.build()
    }

    pub fn to_offer(&self) -> SlotOffer {
        SlotOffer::new(
            AllocationId::new(self.allocation_id),
            self.slot_index,
            self.profile(),
        )
    }
}

impl TestOfferBuilder {
    pub fn offer(self) -> SlotOffer {
        self.build().unwrap().to_offer()
    }
}

pub fn offer(allocation_id: u64, slot_index: u32, profile: ResourceProfile) -> SlotOffer {
    SlotOffer::new(AllocationId::new(allocation_id), slot_index, profile)
}
