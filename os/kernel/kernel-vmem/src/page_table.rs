//! # Page-Table Levels
//!
//! One frame per table, 512 entries per frame. The four levels only differ by
//! which nine bits of the virtual address select their entry.

pub mod entry;

pub use entry::PageTableEntry;

use core::fmt;
use core::ops::Range;
use kernel_info::memory::{ENTRIES_PER_TABLE, KERNEL_PML4_START};
use kernel_memory_addresses::VirtualAddress;

/// Nine index bits per level.
const INDEX_MASK: u64 = 0x1FF;

/// A paging level, from the root (PML4) down to the leaf table (PT).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TableLevel {
    /// Page Map Level 4, the root referenced by CR3.
    Pml4,
    /// Page Directory Pointer Table.
    Pdpt,
    /// Page Directory.
    Pd,
    /// Page Table; its entries map 4 KiB pages.
    Pt,
}

impl TableLevel {
    /// Position of the lowest index bit of this level in a virtual address.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    /// The level below, or `None` for the leaf table.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pml4 => Some(Self::Pdpt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pd => Some(Self::Pt),
            Self::Pt => None,
        }
    }

    /// Entry index selected by `va` at this level.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex(((va.as_u64() >> self.shift()) & INDEX_MASK) as u16)
    }

    /// Address bits contributed by `index` at this level (inverse of
    /// [`index_of`](Self::index_of), without sign extension).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn address_bits(self, index: TableIndex) -> u64 {
        (index.0 as u64) << self.shift()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pml4 => "PML4",
            Self::Pdpt => "PDPT",
            Self::Pd => "PD",
            Self::Pt => "PT",
        }
    }
}

impl fmt::Display for TableLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index into a single table (`0..512`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// Every slot of a table.
    #[allow(clippy::cast_possible_truncation)]
    pub const ALL: Range<u16> = 0..ENTRIES_PER_TABLE as u16;

    /// PML4 slots that translate user addresses.
    #[allow(clippy::cast_possible_truncation)]
    pub const USER_HALF: Range<u16> = 0..KERNEL_PML4_START as u16;

    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Split a virtual address into its four table indices, root first.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> [TableIndex; 4] {
    [
        TableLevel::Pml4.index_of(va),
        TableLevel::Pdpt.index_of(va),
        TableLevel::Pd.index_of(va),
        TableLevel::Pt.index_of(va),
    ]
}

/// One page-table frame.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::new(); ENTRIES_PER_TABLE],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageTableEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub const fn entry_mut(&mut self, i: TableIndex) -> &mut PageTableEntry {
        &mut self.entries[i.as_usize()]
    }

    /// Clear every entry.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::new());
    }

    /// Overwrite this table with a copy of `other`.
    #[inline]
    pub fn copy_from(&mut self, other: &Self) {
        self.entries.copy_from_slice(&other.entries);
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);
