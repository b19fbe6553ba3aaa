//! The mapping watch registry.
//!
//! A hashed multimap from `(page, address space)` to the set of watches
//! currently attached to that mapping. Memory-management code calls
//! [`WatchRegistry::invalidate`] at the point it replaces or removes a
//! virtual-to-physical mapping, and every watch attached to that exact key is
//! invoked with the replacement frame.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use alloc::{boxed::Box, vec::Vec};
use spin::Mutex;

use crate::{
    AddressSpaceId, FrameNumber, VirtualAddress, WatchCallback, WatchHandle, WatchKey,
    watch::WatchLink,
};

/// Number of bits of hash used to select a bucket.
pub const BUCKET_BITS: usize = 8;

/// Number of buckets in the registry. Power of two so bucket selection is a
/// shift rather than a modulo.
pub const BUCKET_COUNT: usize = 1 << BUCKET_BITS;

/// 2^64 / phi, the multiplier for Fibonacci hashing.
const HASH_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Computes the bucket index for a key.
///
/// Both inputs are low-bit-aligned (page starts have zero offset bits and
/// address-space identities are typically pointer-derived), so a naive
/// reduction would cluster badly. We fold the address space identity into the
/// page start address, then take the top `BUCKET_BITS` bits of a Fibonacci
/// multiplicative hash, which mixes the high bits down well enough for this
/// purpose. Distribution quality only affects performance; dispatch always
/// re-checks full key equality.
fn bucket_index(key: WatchKey) -> usize {
    let folded = (key.page.start().as_usize() as u64)
        .wrapping_add(key.aspace.as_usize() as u64);
    (folded.wrapping_mul(HASH_MULTIPLIER) >> (u64::BITS as usize - BUCKET_BITS)) as usize
}

/// One attached watch, stored in its bucket in insertion order.
struct Watch {
    key: WatchKey,
    id: u64,
    callback: Box<dyn WatchCallback>,
}

/// One hash bucket: the collision list plus an occupancy counter that the
/// invalidate fast path reads without taking the lock. The counter is only
/// written while the lock is held.
struct Bucket {
    occupancy: AtomicUsize,
    watches: Mutex<Vec<Watch>>,
}

impl Bucket {
    const fn new() -> Self {
        Self {
            occupancy: AtomicUsize::new(0),
            watches: Mutex::new(Vec::new()),
        }
    }
}

/// A hashed registry of watches on virtual-to-physical mappings.
///
/// The registry is a passive data structure: it decides nothing about *when*
/// mappings change, it only dispatches to the watches attached to a key when
/// told that the key's mapping changed. All three operations take `&self` and
/// serialize per bucket, so unrelated keys do not contend.
///
/// # External locking contract
///
/// The registry's own locks only protect its bucket structure. They do NOT
/// order an [`attach`](Self::attach) for key `K` against an
/// [`invalidate`](Self::invalidate) for the same `K`; the caller must provide
/// that ordering. The required discipline is: the code mutating a page table
/// calls `invalidate` while holding the page-table lock for the affected
/// address space, and every `attach`/`detach` touching a mapping in that
/// address space runs under the same lock. Without this, a watch attached
/// concurrently with an invalidation of its key may or may not be invoked,
/// and the empty-bucket fast path in `invalidate` is unsound.
///
/// Most users go through the process-wide instance (see [`init`] and
/// [`registry`]); the type is also directly constructible for callers that
/// prefer to pass a registry through their own context.
pub struct WatchRegistry {
    buckets: [Bucket; BUCKET_COUNT],
    next_id: AtomicU64,
}

impl WatchRegistry {
    /// Creates a new, empty registry.
    pub const fn new() -> Self {
        Self {
            buckets: [const { Bucket::new() }; BUCKET_COUNT],
            next_id: AtomicU64::new(0),
        }
    }

    /// Attaches a watch on the mapping of `vaddr` within `aspace`.
    ///
    /// Any offset within the target page is accepted; the address is
    /// truncated to its page boundary before being stored. The watch is
    /// visible to subsequent [`invalidate`](Self::invalidate) calls for the
    /// key as soon as this returns. Multiple watches may be attached to the
    /// same key; an invalidation invokes all of them in attach order.
    ///
    /// If `handle` already names an attached watch, that watch is detached
    /// first, so a handle never names more than one watch at a time.
    ///
    /// See the [external locking contract](WatchRegistry#external-locking-contract).
    pub fn attach<C>(
        &self,
        handle: &mut WatchHandle,
        vaddr: VirtualAddress,
        aspace: AddressSpaceId,
        callback: C,
    ) where
        C: WatchCallback + 'static,
    {
        if handle.is_attached() {
            self.detach(handle);
        }

        let key = WatchKey::new(vaddr.page_number(), aspace);
        let bucket_idx = bucket_index(key);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let bucket = &self.buckets[bucket_idx];
        let mut watches = bucket.watches.lock();
        watches.push(Watch {
            key,
            id,
            callback: Box::new(callback),
        });
        bucket.occupancy.store(watches.len(), Ordering::Release);
        drop(watches);

        handle.set_link(WatchLink {
            bucket: bucket_idx,
            id,
        });
        log::trace!("attached watch {id} on {key:?} (bucket {bucket_idx})");
    }

    /// Detaches the watch named by `handle`, if any.
    ///
    /// Idempotent: calling this on an already-detached or never-attached
    /// handle is a no-op, so it is safe to call unconditionally from a
    /// teardown path. Other watches in the same bucket keep their relative
    /// order.
    pub fn detach(&self, handle: &mut WatchHandle) {
        let Some(link) = handle.take_link() else {
            return;
        };

        let bucket = &self.buckets[link.bucket];
        let mut watches = bucket.watches.lock();
        if let Some(pos) = watches.iter().position(|w| w.id == link.id) {
            watches.remove(pos);
            bucket.occupancy.store(watches.len(), Ordering::Release);
            log::trace!("detached watch {} (bucket {})", link.id, link.bucket);
        }
    }

    /// Notifies every watch on `(vaddr, aspace)` that the mapping now refers
    /// to `new_page` (`None` when the page was unmapped).
    ///
    /// `vaddr` is truncated to its page boundary the same way
    /// [`attach`](Self::attach) truncates it. Watches in the same bucket
    /// under a different key (hash collisions) are skipped. Zero matches is
    /// the common case and returns without taking any lock: the bucket's
    /// occupancy counter is read first, and an empty bucket short-circuits.
    /// That unlocked read is only sound under the
    /// [external locking contract](WatchRegistry#external-locking-contract).
    ///
    /// Callbacks run synchronously, under the bucket lock, in attach order.
    /// They must not re-enter the registry.
    pub fn invalidate(
        &self,
        vaddr: VirtualAddress,
        aspace: AddressSpaceId,
        new_page: Option<FrameNumber>,
    ) {
        let key = WatchKey::new(vaddr.page_number(), aspace);
        let bucket = &self.buckets[bucket_index(key)];

        // Fast path: nothing hashes here, so nothing can match.
        if bucket.occupancy.load(Ordering::Acquire) == 0 {
            return;
        }

        let mut watches = bucket.watches.lock();
        for watch in watches.iter_mut() {
            if watch.key == key {
                watch.callback.mapping_changed(key, new_page);
            }
        }
    }

    /// Returns the total number of attached watches.
    ///
    /// Sums the per-bucket occupancy counters without locking, so the result
    /// is approximate while attaches or detaches are in flight.
    pub fn attached_watches(&self) -> usize {
        self.buckets
            .iter()
            .map(|b| b.occupancy.load(Ordering::Relaxed))
            .sum()
    }

    /// Returns the bucket index a key would land in. Test-only hook for
    /// constructing hash collisions deliberately.
    #[cfg(test)]
    fn bucket_of(&self, vaddr: VirtualAddress, aspace: AddressSpaceId) -> usize {
        bucket_index(WatchKey::new(vaddr.page_number(), aspace))
    }
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry instance.
///
/// Initialized once via [`init`]. In test mode this is thread-local so each
/// test gets its own instance.
#[cfg(not(test))]
static REGISTRY: spin::Once<WatchRegistry> = spin::Once::new();

#[cfg(test)]
std::thread_local! {
    static REGISTRY: spin::Once<WatchRegistry> = spin::Once::new();
}

/// Initializes the process-wide registry.
///
/// Must be called exactly once, before any other registry operation. There is
/// no teardown; the registry lives for the rest of the process.
///
/// # Panics
///
/// Panics if the registry has already been initialized.
pub fn init() {
    #[cfg(not(test))]
    {
        if REGISTRY.get().is_some() {
            panic!("watch registry already initialized");
        }
        REGISTRY.call_once(WatchRegistry::new);
    }

    #[cfg(test)]
    {
        REGISTRY.with(|r| {
            if r.get().is_some() {
                panic!("watch registry already initialized");
            }
            r.call_once(WatchRegistry::new);
        });
    }

    log::debug!("watch registry initialized with {BUCKET_COUNT} buckets");
}

/// Returns a reference to the process-wide registry.
///
/// # Panics
///
/// Panics if [`init`] has not been called yet.
pub fn registry() -> &'static WatchRegistry {
    #[cfg(not(test))]
    {
        REGISTRY
            .get()
            .expect("watch registry not initialized; call vwatch::init during startup")
    }

    #[cfg(test)]
    {
        REGISTRY.with(|r| {
            // SAFETY: We leak the reference to make it 'static. This is safe because:
            // 1. In test mode, each thread has its own REGISTRY
            // 2. Once set, it's never modified (spin::Once guarantees this)
            // 3. The thread-local lives for the entire duration of the thread
            unsafe {
                &*(r.get().expect(
                    "watch registry not initialized; call vwatch::init during startup",
                ) as *const WatchRegistry)
            }
        })
    }
}
