pub mod amount;
pub mod counter;
pub mod memory;
pub mod profile;
pub mod requirement;

pub use amount::{ResourceAmount, ResourceFractions, ResourceUnits};
pub use counter::ResourceCounter;
pub use memory::MemorySize;
pub use profile::{ResourceProfile, ResourceProfileBuilder};
pub use requirement::ResourceRequirement;
