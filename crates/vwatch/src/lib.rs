#![cfg_attr(not(test), no_std)]

//! # Virtual Mapping Watch Registry (vwatch)
//!
//! `vwatch` lets any subsystem register interest in one virtual-to-physical
//! mapping and be called back at exactly the moment the page tables change
//! that mapping (copy-on-write, unmapping). It provides:
//!
//! - A hashed, multimap registry keyed by `(page, address space)`.
//! - Attach/detach of caller-owned watch handles, and invalidation dispatch
//!   that invokes every matching watch in attach order.
//! - A lock-free empty-bucket fast path so unwatched mappings cost almost
//!   nothing to invalidate.
//!
//! The registry is passive: memory-management code decides when a mapping
//! changes and calls [`WatchRegistry::invalidate`] at that point, under its
//! own page-table lock. See the [`WatchRegistry`] documentation for the
//! external locking contract, which is the crux of correct use.

extern crate alloc;

mod address;
mod aspace;
mod registry;
mod watch;

pub use address::{FrameNumber, PAGE_SHIFT, PAGE_SIZE, PageNumber, VirtualAddress};
pub use aspace::AddressSpaceId;
pub use registry::{BUCKET_BITS, BUCKET_COUNT, WatchRegistry, init, registry};
pub use watch::{WatchCallback, WatchHandle, WatchKey};
