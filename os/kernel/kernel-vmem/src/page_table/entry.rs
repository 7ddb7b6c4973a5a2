//! # Page-Table Entry

use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4K};

/// One 64-bit slot of any paging level.
///
/// The same layout serves PML4, PDPT, PD and PT entries because the kernel
/// never maps huge pages: bit 7 (PS) is always zero, so a non-leaf entry is
/// always a pointer to the next table and a PT entry is always a 4 KiB leaf.
///
/// The frame is only reachable through [`frame`](Self::frame) /
/// [`next_table`](Self::next_table), which return `None` unless the entry is
/// present. Clearing [`present`](Self::present) keeps every other bit intact.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    /// Bit 0: Present.
    pub present: bool,

    /// Bit 1: Writable. On non-leaf entries this gates the whole subtree.
    pub writable: bool,

    /// Bit 2: User accessible (CPL 3).
    pub user: bool,

    /// Bit 3: Page-level write-through.
    pub write_through: bool,

    /// Bit 4: Page-level cache disable.
    pub cache_disable: bool,

    /// Bit 5: Accessed. Set by the CPU on any access through this entry.
    pub accessed: bool,

    /// Bit 6: Dirty. Set by the CPU on a write through this leaf.
    pub dirty: bool,

    /// Bit 7: PS. Must stay zero.
    page_size: bool,

    /// Bit 8: Global. Survives CR3 reloads when CR4.PGE is set.
    pub global: bool,

    /// Bits 9–11: available to the OS.
    #[bits(3)]
    pub os_available_low: u8,

    /// Bits 12–51: frame number.
    #[bits(40)]
    frame_number: u64,

    /// Bits 52–58: available to the OS.
    #[bits(7)]
    pub os_available_high: u8,

    /// Bits 59–62: protection key (ignored unless CR4.PKE).
    #[bits(4)]
    pub protection_key: u8,

    /// Bit 63: No-Execute.
    pub no_execute: bool,
}

impl PageTableEntry {
    /// Non-leaf entry pointing at `table`.
    ///
    /// Intermediate levels are kernel-composed as present, writable and
    /// user-accessible; the leaf decides the effective permissions.
    #[inline]
    #[must_use]
    pub const fn table(table: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(true)
            .with_frame_number(table.frame_number())
    }

    /// User-accessible 4 KiB leaf.
    #[inline]
    #[must_use]
    pub const fn user_page(frame: PhysicalPage<Size4K>, writable: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(writable)
            .with_user(true)
            .with_frame_number(frame.frame_number())
    }

    /// Supervisor-only, global 4 KiB leaf.
    #[inline]
    #[must_use]
    pub const fn kernel_page(frame: PhysicalPage<Size4K>, writable: bool) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(writable)
            .with_global(true)
            .with_frame_number(frame.frame_number())
    }

    /// The mapped frame, if present.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> Option<PhysicalPage<Size4K>> {
        if self.present() {
            debug_assert!(!self.page_size(), "huge page entries are not supported");
            Some(PhysicalPage::from_frame_number(self.frame_number()))
        } else {
            None
        }
    }

    /// The next-level table, if present. Same bits as [`frame`](Self::frame),
    /// named for non-leaf use.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        self.frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    fn frame(pa: u64) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(PhysicalAddress::new(pa))
    }

    #[test]
    fn table_entries_are_present_writable_user() {
        let e = PageTableEntry::table(frame(0x0012_3000));
        assert_eq!(e.into_bits(), 0x0012_3000 | 0b111);
        assert_eq!(e.next_table(), Some(frame(0x0012_3000)));
    }

    #[test]
    fn user_page_respects_writable_flag() {
        let ro = PageTableEntry::user_page(frame(0x5000), false);
        assert!(ro.present() && ro.user() && !ro.writable());

        let rw = PageTableEntry::user_page(frame(0x5000), true);
        assert!(rw.present() && rw.user() && rw.writable());
        assert!(!rw.global());
    }

    #[test]
    fn kernel_page_is_not_user_accessible() {
        let e = PageTableEntry::kernel_page(frame(0x9000), true);
        assert!(e.present() && e.global() && e.writable());
        assert!(!e.user());
    }

    #[test]
    fn frame_is_hidden_when_not_present() {
        let mut e = PageTableEntry::user_page(frame(0x7000), true).with_dirty(true);
        e.set_present(false);
        assert_eq!(e.frame(), None);

        // Everything except P survives.
        assert!(e.dirty() && e.writable() && e.user());
        e.set_present(true);
        assert_eq!(e.frame(), Some(frame(0x7000)));
    }

    #[test]
    fn no_execute_is_bit_63() {
        let e = PageTableEntry::new().with_no_execute(true);
        assert_eq!(e.into_bits(), 1 << 63);
    }
}
