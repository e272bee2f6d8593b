//! In-memory implementations of the datastore and cache seams.

pub mod cache;
pub mod evaluate;
pub mod memory;

pub use cache::MemoryCacheStore;
pub use evaluate::FilterMatcher;
pub use memory::MemoryStore;
