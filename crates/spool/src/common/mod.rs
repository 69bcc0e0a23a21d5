pub mod error;
pub mod setup;
