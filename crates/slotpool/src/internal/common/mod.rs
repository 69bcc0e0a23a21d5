pub(crate) mod data_structures;
pub(crate) mod error;
pub(crate) mod ids;
pub(crate) mod index;
pub mod resources;
pub(crate) mod utils;

pub use data_structures::{Map, Set};
