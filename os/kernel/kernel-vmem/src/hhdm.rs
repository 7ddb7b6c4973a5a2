//! # Higher-Half Direct Map

use crate::PhysMapper;
use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// [`PhysMapper`] for a kernel that maps all physical memory at
/// [`HHDM_BASE`].
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = self.to_kernel_vaddr(pa).as_mut_ptr::<T>();
        debug_assert!(ptr.is_aligned(), "{pa} is misaligned for the target type");
        // SAFETY: the direct map covers all RAM; validity of `T` is on the caller.
        unsafe { &mut *ptr }
    }

    #[inline]
    fn to_kernel_vaddr(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(HHDM_BASE + pa.as_u64())
    }

    #[inline]
    fn to_physical(&self, va: VirtualAddress) -> PhysicalAddress {
        debug_assert!(va.as_u64() >= HHDM_BASE, "{va} is outside the direct map");
        PhysicalAddress::new(va.as_u64() - HHDM_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translations_are_inverse() {
        let pa = PhysicalAddress::new(0x0000_0001_2345_6000);
        let va = HhdmPhysMapper.to_kernel_vaddr(pa);
        assert_eq!(va.as_u64(), HHDM_BASE + 0x0000_0001_2345_6000);
        assert_eq!(HhdmPhysMapper.to_physical(va), pa);
    }

    #[test]
    fn frame_zero_is_the_map_base() {
        assert_eq!(
            HhdmPhysMapper.to_kernel_vaddr(PhysicalAddress::zero()),
            VirtualAddress::new(HHDM_BASE)
        );
    }
}
