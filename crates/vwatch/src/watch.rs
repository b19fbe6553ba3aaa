//! Watch keys, handles, and the callback seam.

use crate::{AddressSpaceId, FrameNumber, PageNumber};

/// The exact lookup key for a watch: one page in one address space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct WatchKey {
    /// The page being watched.
    pub page: PageNumber,
    /// The address space the page belongs to.
    pub aspace: AddressSpaceId,
}

impl WatchKey {
    /// Creates a key from a page and an address space identity.
    #[inline]
    pub const fn new(page: PageNumber, aspace: AddressSpaceId) -> Self {
        Self { page, aspace }
    }
}

/// A caller-supplied unit of behavior invoked when a watched mapping changes.
///
/// The registry calls [`mapping_changed`](WatchCallback::mapping_changed)
/// synchronously, exactly once per matching invalidation, with the key the
/// watch was attached under and the frame newly backing the mapping (`None`
/// when the mapping was removed rather than replaced). The return value is
/// not consumed.
///
/// Callbacks run while the registry holds the bucket lock, so they must not
/// call back into the registry and must be short and non-blocking.
pub trait WatchCallback: Send {
    /// Called when the watched virtual-to-physical mapping has changed.
    fn mapping_changed(&mut self, key: WatchKey, new_page: Option<FrameNumber>);
}

impl<F> WatchCallback for F
where
    F: FnMut(WatchKey, Option<FrameNumber>) + Send,
{
    fn mapping_changed(&mut self, key: WatchKey, new_page: Option<FrameNumber>) {
        self(key, new_page)
    }
}

/// Back reference from an attached handle to the registry slot holding its
/// watch. The id disambiguates the watch from others in the same bucket.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WatchLink {
    pub(crate) bucket: usize,
    pub(crate) id: u64,
}

/// A caller-owned record of one registered watch.
///
/// A handle is either *detached* (its initial state, and after
/// [`detach`](crate::WatchRegistry::detach)) or *attached* (after
/// [`attach`](crate::WatchRegistry::attach)). The handle is a token, not a
/// guard: dropping an attached handle does not detach the watch. Callers are
/// expected to detach on their teardown path, which is safe even when no
/// attach ever happened.
#[derive(Debug, Default)]
pub struct WatchHandle {
    link: Option<WatchLink>,
}

impl WatchHandle {
    /// Creates a new, detached handle.
    #[inline]
    pub const fn new() -> Self {
        Self { link: None }
    }

    /// Returns true if this handle currently names an attached watch.
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.link.is_some()
    }

    pub(crate) fn set_link(&mut self, link: WatchLink) {
        self.link = Some(link);
    }

    pub(crate) fn take_link(&mut self) -> Option<WatchLink> {
        self.link.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VirtualAddress;

    #[test]
    fn new_handle_is_detached() {
        let handle = WatchHandle::new();
        assert!(!handle.is_attached());
    }

    #[test]
    fn default_handle_is_detached() {
        let handle = WatchHandle::default();
        assert!(!handle.is_attached());
    }

    #[test]
    fn key_equality() {
        let page = VirtualAddress::new(0x1000).page_number();
        let aspace = AddressSpaceId::new(1);
        assert_eq!(WatchKey::new(page, aspace), WatchKey::new(page, aspace));
        assert_ne!(
            WatchKey::new(page, aspace),
            WatchKey::new(page, AddressSpaceId::new(2))
        );
    }

    #[test]
    fn closures_implement_callback() {
        let mut calls = 0usize;
        let mut cb = |_key: WatchKey, _new_page: Option<FrameNumber>| calls += 1;
        let key = WatchKey::new(
            VirtualAddress::new(0x1000).page_number(),
            AddressSpaceId::new(1),
        );
        cb.mapping_changed(key, Some(FrameNumber::new(3)));
        cb.mapping_changed(key, None);
        drop(cb);
        assert_eq!(calls, 2);
    }
}
