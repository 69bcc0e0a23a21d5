pub mod bridge;
pub mod mainthread;
#[allow(clippy::module_inception)]
pub mod service;
