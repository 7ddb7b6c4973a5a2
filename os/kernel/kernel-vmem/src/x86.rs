//! # x86-64 MMU

use crate::{Mmu, RootPage};
use kernel_memory_addresses::{Size4K, VirtualPage};
use kernel_registers::cr3::Cr3;
use kernel_registers::tlb::invlpg;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// The MMU of the executing CPU, driven through CR3 and `invlpg`.
#[derive(Debug)]
pub struct X86Mmu {
    _private: (),
}

impl X86Mmu {
    /// # Safety
    /// Only usable at CPL0 with long-mode paging enabled.
    #[inline]
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Mmu for X86Mmu {
    #[inline]
    fn load_root(&self, root: RootPage) {
        // SAFETY: CPL0 per construction; `root` holds the kernel mappings.
        unsafe { Cr3::for_root(root).store_unsafe() }
    }

    #[inline]
    fn active_root(&self) -> RootPage {
        // SAFETY: CPL0 per construction.
        unsafe { Cr3::load_unsafe() }.root()
    }

    #[inline]
    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        // SAFETY: CPL0 per construction.
        unsafe { invlpg(page) }
    }
}
