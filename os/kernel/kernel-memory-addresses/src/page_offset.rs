use crate::PageSize;
use core::fmt;
use core::marker::PhantomData;

/// The offset within a page of size `S` (`0..S::SIZE`).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageOffset<S: PageSize> {
    value: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PageOffset<S> {
    /// Create from a raw value. Values beyond the page size are masked;
    /// debug builds assert they are in range.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        debug_assert!(value < S::SIZE, "offset must be < page size");
        Self::from_low_bits(value)
    }

    /// Keep only the offset bits of `raw`.
    #[inline]
    #[must_use]
    pub(crate) const fn from_low_bits(raw: u64) -> Self {
        Self {
            value: raw & S::OFFSET_MASK,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.value
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.value as usize
    }
}

impl<S: PageSize> fmt::Debug for PageOffset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageOffset<{}>({:#X})", S::as_str(), self.value)
    }
}
