//! # Kernel Address Space
//!
//! The kernel's PML4 is assembled during boot by a
//! [`KernelAddressSpaceBuilder`] and then frozen into a
//! [`KernelAddressSpace`], which offers no way to change the mappings again.
//! Every [`AddressSpace`] copies its upper half from this root.

use super::{AddressSpace, AddressSpaceError, MapError, RootPage};
use crate::page_table::PageTableEntry;
use crate::walker::TableWalker;
use crate::{FrameAlloc, Mmu, PhysMapper};
use kernel_info::memory::is_kernel_vaddr;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_sync::SyncOnceCell;
use log::{debug, info};

static KERNEL_SPACE: SyncOnceCell<KernelAddressSpace> = SyncOnceCell::new();

/// The kernel's own, immutable address space.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelAddressSpace {
    root: RootPage,
}

impl KernelAddressSpace {
    /// Wrap an already populated kernel PML4.
    ///
    /// # Safety
    /// `root` must hold the complete kernel mappings and must not be modified
    /// for as long as any address space derived from it exists.
    #[inline]
    #[must_use]
    pub const unsafe fn from_root(root: RootPage) -> Self {
        Self { root }
    }

    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    /// Read-only view through which lookups and traversals work like on any
    /// other address space. `set_page`, `clear_page`, `set_dirty`,
    /// `set_accessed` and `destroy` panic on the view.
    #[inline]
    #[must_use]
    pub const fn view<'m, M: PhysMapper>(&self, mapper: &'m M) -> AddressSpace<'m, M> {
        AddressSpace {
            root: self.root,
            kernel_root: self.root,
            walker: TableWalker::new(mapper),
        }
    }

    /// Load CR3 with the kernel's root.
    #[inline]
    pub fn activate<C: Mmu>(&self, mmu: &C) {
        mmu.load_root(self.root);
    }
}

/// Activate `space`, or the kernel address space when there is none.
pub fn activate_or_kernel<M: PhysMapper, C: Mmu>(
    mmu: &C,
    space: Option<&AddressSpace<'_, M>>,
    kernel: &KernelAddressSpace,
) {
    match space {
        Some(space) => space.activate(mmu),
        None => kernel.activate(mmu),
    }
}

/// Publish the kernel address space for the rest of the kernel's lifetime.
///
/// # Errors
/// Hands `space` back if one was already installed.
pub fn install_kernel_space(
    space: KernelAddressSpace,
) -> Result<&'static KernelAddressSpace, KernelAddressSpace> {
    let installed = KERNEL_SPACE.set(space)?;
    info!("Kernel address space installed at {}", installed.root);
    Ok(installed)
}

/// The kernel address space, once [`install_kernel_space`] ran.
#[inline]
#[must_use]
pub fn kernel_space() -> Option<&'static KernelAddressSpace> {
    KERNEL_SPACE.get()
}

/// Boot-time construction of the kernel PML4.
pub struct KernelAddressSpaceBuilder<'m, M: PhysMapper> {
    root: RootPage,
    walker: TableWalker<'m, M>,
}

impl<'m, M: PhysMapper> KernelAddressSpaceBuilder<'m, M> {
    /// Start from an empty PML4.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`] if no frame is available.
    pub fn new<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, AddressSpaceError> {
        let root = alloc.alloc_4k().ok_or(AddressSpaceError::OutOfMemory)?;
        let walker = TableWalker::new(mapper);
        walker.table_mut(root).zero();
        Ok(Self { root, walker })
    }

    /// Map the kernel page `va` to `frame`, supervisor-only and global.
    ///
    /// # Panics
    /// If `va` is not page aligned or not in the kernel half.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a table could not be allocated.
    pub fn map_page<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
        writable: bool,
    ) -> Result<(), MapError> {
        assert!(va.is_aligned::<Size4K>(), "kernel page {va} is not page aligned");
        assert!(is_kernel_vaddr(va), "{va} is not a kernel address");

        let entry = self.walker.lookup_or_create(self.root, va, alloc)?;
        *entry = PageTableEntry::kernel_page(frame, writable);
        Ok(())
    }

    /// Freeze the mappings.
    #[must_use]
    pub fn finish(self) -> KernelAddressSpace {
        debug!("Kernel PML4 finished at {}", self.root);
        KernelAddressSpace { root: self.root }
    }
}
