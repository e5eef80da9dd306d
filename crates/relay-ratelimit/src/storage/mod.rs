//! Rate-limit storage back ends

pub mod memory;
pub mod redis;
