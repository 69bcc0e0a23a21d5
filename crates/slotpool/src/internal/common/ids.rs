use crate::define_id_type;

// Stable identity of a worker process; survives reconnects of the same process.
define_id_type!(WorkerId, u32);

// Identifies one concrete slot offered by a worker.
define_id_type!(AllocationId, u64);

// Handle of a requester; chosen by the caller or generated by the pool.
define_id_type!(SlotRequestId, u64);
