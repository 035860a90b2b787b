//! Object storage capability and its implementations.

pub mod base;
pub mod fs;
pub mod memory;

pub use base::ObjectStore;
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
