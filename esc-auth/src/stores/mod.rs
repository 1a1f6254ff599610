//! Token store implementations

mod local;
mod memory;

pub use local::LocalTokenStore;
pub use memory::MemoryTokenStore;
