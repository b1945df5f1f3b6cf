//! Buffer pool management for KestrelDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - Pluggable replacement policies (LRU and CLOCK)
//! - Pin counting so resident pages cannot be evicted while in use
//! - Dirty page tracking with write-back before frame reuse

mod frame;
mod pool;
mod replacer;
mod store;

pub use frame::{Frame, FrameId};
pub use pool::{BufferPoolConfig, BufferPoolManager};
pub use replacer::{ClockReplacer, LruReplacer, Replacer};
pub use store::{MemoryPageStore, PageStore};
