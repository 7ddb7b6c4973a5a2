//! # CR3

use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4K};

/// CR3: Page-Map Level-4 Base Register (IA-32e, PCID disabled).
///
/// Holds the frame of the active PML4 and the cache-control flags used for
/// the PML4 walk itself.
#[bitfield(u64)]
pub struct Cr3 {
    #[bits(3)]
    __reserved0: u8,

    /// Bit 3: PWT: Page-level Write-Through for PML4 accesses.
    pub pwt: bool,

    /// Bit 4: PCD: Page-level Cache Disable for PML4 accesses.
    pub pcd: bool,

    #[bits(7)]
    __reserved1: u8,

    /// Bits 12–51: PML4 frame number.
    #[bits(40)]
    pml4_frame: u64,

    #[bits(12)]
    __reserved2: u16,
}

impl Cr3 {
    /// CR3 value selecting `pml4` with write-back caching.
    #[must_use]
    pub const fn for_root(pml4: PhysicalPage<Size4K>) -> Self {
        Self::new().with_pml4_frame(pml4.frame_number())
    }

    /// The PML4 frame this value selects.
    #[must_use]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_frame_number(self.pml4_frame())
    }
}

#[cfg(feature = "asm")]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let mut cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

/// Writing CR3 also flushes every non-global TLB entry.
#[cfg(feature = "asm")]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
