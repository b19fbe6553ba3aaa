//! Address and page/frame number types used as registry keys.
//!
//! This module provides a virtual address wrapper plus page and frame number
//! newtypes. The registry never walks page tables, so addresses are treated as
//! opaque key material; the only structural operation is truncating an address
//! to its page boundary.

use core::fmt;
use core::ops::{Add, Sub};

/// Page size in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Number of page-offset bits in a virtual address.
pub const PAGE_SHIFT: usize = 12;

/// A virtual memory address.
///
/// This is a newtype wrapper around the raw address value. Unlike a page-table
/// walker, the watch registry accepts any `usize` here: the address is only
/// ever truncated to its page and hashed, never dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtualAddress(usize);

impl VirtualAddress {
    /// Creates a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Creates a virtual address from a pointer.
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Returns the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Checks if the address is aligned to the given alignment.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[inline]
    pub const fn is_aligned(self, align: usize) -> bool {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        self.0 & (align - 1) == 0
    }

    /// Aligns the address down to the given alignment.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    #[inline]
    pub const fn align_down(self, align: usize) -> Self {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        Self(self.0 & !(align - 1))
    }

    /// Returns the byte offset of this address within its page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the page number containing this address.
    #[inline]
    pub const fn page_number(self) -> PageNumber {
        PageNumber::new(self.0 >> PAGE_SHIFT)
    }
}

impl fmt::Pointer for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0 as *const u8)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualAddress({:#x})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<usize> for VirtualAddress {
    #[inline]
    fn from(addr: usize) -> Self {
        Self::new(addr)
    }
}

impl Add<usize> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn add(self, rhs: usize) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl Sub<usize> for VirtualAddress {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: usize) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}

impl Sub<VirtualAddress> for VirtualAddress {
    type Output = usize;

    #[inline]
    fn sub(self, rhs: VirtualAddress) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Macro to define common page/frame number functionality.
///
/// This macro generates the basic structure and methods common to both number
/// types, reducing code duplication.
macro_rules! impl_page_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new page/frame number.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw page/frame number.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_page_number_common!(
    PageNumber,
    "A virtual memory page number.\n\n\
     Represents a virtual memory page. Page numbers are zero-indexed and correspond to\n\
     PAGE_SIZE-aligned virtual addresses. Converting an address to its page number\n\
     discards the page-offset bits, which is how the registry normalizes its keys."
);

impl PageNumber {
    /// Returns the virtual address at the start of this page.
    #[inline]
    pub const fn start(self) -> VirtualAddress {
        VirtualAddress::new(self.0 << PAGE_SHIFT)
    }
}

impl From<VirtualAddress> for PageNumber {
    #[inline]
    fn from(addr: VirtualAddress) -> Self {
        addr.page_number()
    }
}

impl_page_number_common!(
    FrameNumber,
    "A physical memory frame number.\n\n\
     Identifies the physical frame newly backing a mapping after a change. The\n\
     registry forwards frame numbers to watch callbacks verbatim and never\n\
     interprets them."
);

#[cfg(test)]
mod tests {
    use super::*;

    mod virtual_address {
        use super::*;

        #[test]
        fn new_and_as_usize() {
            let addr = VirtualAddress::new(0x1234);
            assert_eq!(addr.as_usize(), 0x1234);
        }

        #[test]
        fn alignment_check() {
            let addr = VirtualAddress::new(PAGE_SIZE * 4);
            assert!(addr.is_aligned(PAGE_SIZE));
            assert!(addr.is_aligned(1));
            assert!(!addr.is_aligned(PAGE_SIZE * 8));
        }

        #[test]
        fn align_down() {
            let addr = VirtualAddress::new(PAGE_SIZE + 0x24);
            assert_eq!(
                addr.align_down(PAGE_SIZE),
                VirtualAddress::new(PAGE_SIZE)
            );
        }

        #[test]
        fn page_offset() {
            let addr = VirtualAddress::new(PAGE_SIZE * 3 + 0x4);
            assert_eq!(addr.page_offset(), 0x4);
        }

        #[test]
        fn page_offset_at_boundary() {
            let addr = VirtualAddress::new(PAGE_SIZE);
            assert_eq!(addr.page_offset(), 0);
        }

        #[test]
        fn page_number_truncates() {
            // Every offset within a page maps to the same page number.
            let base = VirtualAddress::new(PAGE_SIZE * 7);
            for offset in [0, 1, 0x123, PAGE_SIZE - 1] {
                assert_eq!((base + offset).page_number(), PageNumber::new(7));
            }
        }

        #[test]
        fn from_ptr_identity() {
            let value = 42u8;
            let addr = VirtualAddress::from_ptr(&value);
            assert_eq!(addr.as_usize(), &value as *const u8 as usize);
        }

        #[test]
        fn add_operator() {
            let addr = VirtualAddress::new(0x0100);
            assert_eq!((addr + 0x50).as_usize(), 0x0150);
        }

        #[test]
        fn sub_operators() {
            let addr = VirtualAddress::new(0x0150);
            assert_eq!((addr - 0x50).as_usize(), 0x0100);
            assert_eq!(addr - VirtualAddress::new(0x0100), 0x50);
        }

        #[test]
        fn debug_format() {
            let addr = VirtualAddress::new(0x0100);
            let debug_str = format!("{:?}", addr);
            assert!(debug_str.contains("VirtualAddress"));
            assert!(debug_str.contains("0x100"));
        }

        #[test]
        fn display_format() {
            let addr = VirtualAddress::new(0x0100);
            assert_eq!(format!("{}", addr), "0x100");
        }
    }

    mod page_number {
        use super::*;

        #[test]
        fn start_address() {
            let page = PageNumber::new(1);
            assert_eq!(page.start().as_usize(), PAGE_SIZE);
        }

        #[test]
        fn from_virtual_address() {
            let addr = VirtualAddress::new(PAGE_SIZE * 3 + 10);
            assert_eq!(PageNumber::from(addr), PageNumber::new(3));
        }

        #[test]
        fn round_trip() {
            let page = PageNumber::new(42);
            assert_eq!(page.start().page_number(), page);
        }

        #[test]
        fn comparison() {
            assert!(PageNumber::new(5) < PageNumber::new(10));
            assert_eq!(PageNumber::new(5), PageNumber::new(5));
        }
    }

    mod frame_number {
        use super::*;

        #[test]
        fn new_frame() {
            let frame = FrameNumber::new(42);
            assert_eq!(frame.as_usize(), 42);
        }

        #[test]
        fn add_and_sub() {
            let frame = FrameNumber::new(10);
            assert_eq!((frame + 5).as_usize(), 15);
            assert_eq!(frame + 5 - frame, 5);
        }

        #[test]
        fn debug_format() {
            let frame = FrameNumber::new(7);
            assert_eq!(format!("{:?}", frame), "FrameNumber(7)");
        }
    }
}
