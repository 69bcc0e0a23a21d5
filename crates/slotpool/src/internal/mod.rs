#[macro_use]
pub(crate) mod common;
pub mod pool;
pub mod security;
pub mod service;

#[cfg(test)]
pub mod tests;
