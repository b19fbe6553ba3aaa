//! Address space identity.
//!
//! The registry keys watches by the address space a mapping belongs to, but it
//! never owns or inspects the address space itself. Callers hand it an opaque
//! identity token instead, typically derived from the address of their own
//! address-space structure.

use core::fmt;

/// Opaque identity of one virtual address space.
///
/// Two tokens compare equal exactly when they were built from the same raw
/// value, so a caller that derives tokens from the address of its page-table
/// context gets pointer-identity semantics. The registry only compares and
/// hashes tokens; it never dereferences them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct AddressSpaceId(usize);

impl AddressSpaceId {
    /// Creates an identity token from a raw value.
    #[inline]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Creates an identity token from the address of a caller-owned object.
    ///
    /// The token is only meaningful while the object stays at that address;
    /// callers must detach any watches keyed on it before the object moves or
    /// is dropped.
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Returns the raw identity value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for AddressSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressSpaceId({:#x})", self.0)
    }
}

impl From<usize> for AddressSpaceId {
    #[inline]
    fn from(id: usize) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_follows_raw_value() {
        assert_eq!(AddressSpaceId::new(7), AddressSpaceId::new(7));
        assert_ne!(AddressSpaceId::new(7), AddressSpaceId::new(8));
    }

    #[test]
    fn from_ptr_uses_address() {
        let ctx = [0u64; 4];
        let id = AddressSpaceId::from_ptr(&ctx);
        assert_eq!(id.as_usize(), &ctx as *const _ as usize);
    }

    #[test]
    fn distinct_objects_get_distinct_ids() {
        let a = 0u64;
        let b = 0u64;
        assert_ne!(
            AddressSpaceId::from_ptr(&a),
            AddressSpaceId::from_ptr(&b)
        );
    }
}
