//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};

/// Size of the only page granularity the kernel maps.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// Entries per page-table level.
pub const ENTRIES_PER_TABLE: usize = 512;

/// First address that is no longer user space. Everything below is user space.
pub const USERSPACE_END: u64 = 0x0000_8000_0000_0000;

/// Lowest canonical kernel address.
pub const KERNEL_SPACE_START: u64 = 0xffff_8000_0000_0000;

/// First PML4 slot that belongs to the kernel half.
#[allow(clippy::cast_possible_truncation)]
pub const KERNEL_PML4_START: usize = ((KERNEL_SPACE_START >> 39) & 0x1FF) as usize;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Where the kernel executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Whether `va` lies in the user half of the address space.
#[inline]
#[must_use]
pub const fn is_user_vaddr(va: VirtualAddress) -> bool {
    va.as_u64() < USERSPACE_END
}

/// Whether `va` lies in the kernel half of the address space.
#[inline]
#[must_use]
pub const fn is_kernel_vaddr(va: VirtualAddress) -> bool {
    va.as_u64() >= KERNEL_SPACE_START
}

const _: () = {
    assert!(PAGE_SIZE == 4096);
    assert!(KERNEL_PML4_START == ENTRIES_PER_TABLE / 2);
    assert!(KERNEL_SPACE_START.is_multiple_of(1 << 39));
    assert!(HHDM_BASE >= KERNEL_SPACE_START);
    assert!(KERNEL_BASE > HHDM_BASE);
    assert!(USERSPACE_END < KERNEL_SPACE_START);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_half_boundary() {
        assert!(is_user_vaddr(VirtualAddress::zero()));
        assert!(is_user_vaddr(VirtualAddress::new(USERSPACE_END - 1)));
        assert!(!is_user_vaddr(VirtualAddress::new(USERSPACE_END)));
        assert!(!is_user_vaddr(VirtualAddress::new(KERNEL_BASE)));
    }

    #[test]
    fn kernel_half_boundary() {
        assert!(!is_kernel_vaddr(VirtualAddress::new(USERSPACE_END)));
        assert!(is_kernel_vaddr(VirtualAddress::new(KERNEL_SPACE_START)));
        assert!(is_kernel_vaddr(VirtualAddress::new(HHDM_BASE)));
    }
}
