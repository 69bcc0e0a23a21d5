pub mod configuration;
pub mod core;
pub mod gateway;
pub(crate) mod matching;
pub(crate) mod reactor;
pub mod request;
pub mod slot;
pub mod worker;
