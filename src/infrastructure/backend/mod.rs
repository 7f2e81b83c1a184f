//! L2 vector backend implementations

mod in_memory;
mod redis;

pub use self::in_memory::InMemoryVectorBackend;
pub use self::redis::RedisVectorBackend;
