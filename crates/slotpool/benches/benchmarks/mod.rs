pub mod pool;
pub mod requirements;
