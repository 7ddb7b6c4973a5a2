//! # Translation Lookaside Buffer

use kernel_memory_addresses::{Size4K, VirtualPage};

/// Drop the cached translation for `page` on the executing CPU.
///
/// # Safety
/// Privileged instruction; must run at CPL0.
#[inline]
pub unsafe fn invlpg(page: VirtualPage<Size4K>) {
    let va = page.base().as_u64();
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
    }
}
