pub mod common;
pub mod gateway;
pub mod runner;
pub mod scenario;

pub type Error = crate::common::error::SpoolError;
pub type Result<T> = std::result::Result<T, Error>;

// Reexports
pub use slotpool;
