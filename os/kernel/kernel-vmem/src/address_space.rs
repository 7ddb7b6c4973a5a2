//! # Address Space (x86-64, PML4-rooted)
//!
//! An [`AddressSpace`] is a PML4 frame plus everything reachable from its
//! lower half. The upper half is a copy of the kernel's PML4 taken at
//! creation and is never modified or freed through this type.
//!
//! ## Operations
//!
//! - [`AddressSpace::create`] / [`AddressSpace::destroy`]: lifecycle.
//! - [`AddressSpace::set_page`] / [`AddressSpace::clear_page`]: map and unmap
//!   one user page.
//! - [`AddressSpace::get_page`]: user address → kernel alias.
//! - Dirty and accessed bit queries and updates.
//! - [`AddressSpace::activate`] / [`activate_or_kernel`]: load CR3.
//!
//! ## TLB maintenance
//!
//! Clearing a page or rewriting its dirty/accessed bits invalidates the
//! single affected translation, and only when this address space is the one
//! loaded on the CPU. Other address spaces have no cached translations to
//! worry about because loading CR3 flushes them.

mod kernel;

pub use kernel::{
    KernelAddressSpace, KernelAddressSpaceBuilder, activate_or_kernel, install_kernel_space,
    kernel_space,
};

use crate::page_table::{PageTableEntry, TableIndex, TableLevel};
use crate::walker::{TableWalker, WalkError};
use crate::{FrameAlloc, Mmu, PhysMapper};
use kernel_info::memory::is_user_vaddr;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::{debug, trace};

/// The PML4 root page for an [`AddressSpace`].
pub type RootPage = PhysicalPage<Size4K>;

/// Creating an address space failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AddressSpaceError {
    #[error("out of memory while allocating the PML4")]
    OutOfMemory,
}

/// Installing a mapping failed. The tree is unchanged.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("out of memory while allocating a {0} table")]
    OutOfMemory(TableLevel),
}

impl From<WalkError> for MapError {
    fn from(e: WalkError) -> Self {
        match e {
            WalkError::OutOfMemory(level) | WalkError::Missing(level) => Self::OutOfMemory(level),
        }
    }
}

/// Kind of user access to validate.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: RootPage,
    kernel_root: RootPage,
    walker: TableWalker<'m, M>,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate a PML4 and seed it with the kernel's mappings.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`] if no frame is available; nothing is
    /// allocated in that case.
    pub fn create<A: FrameAlloc>(
        mapper: &'m M,
        alloc: &mut A,
        kernel: &KernelAddressSpace,
    ) -> Result<Self, AddressSpaceError> {
        let Some(root) = alloc.alloc_4k() else {
            log::warn!("Out of frames for a new PML4");
            return Err(AddressSpaceError::OutOfMemory);
        };

        let walker = TableWalker::new(mapper);
        let template = walker.table_mut(kernel.root_page());
        walker.table_mut(root).copy_from(template);

        debug!("Created address space {root}");
        Ok(Self {
            root,
            kernel_root: kernel.root_page(),
            walker,
        })
    }

    /// Adopt an existing PML4.
    ///
    /// # Safety
    /// `root` must be a PML4 whose upper half equals the kernel's, and whose
    /// lower half is owned by the returned handle alone.
    #[inline]
    pub const unsafe fn from_root(
        mapper: &'m M,
        root: RootPage,
        kernel: &KernelAddressSpace,
    ) -> Self {
        Self {
            root,
            kernel_root: kernel.root_page(),
            walker: TableWalker::new(mapper),
        }
    }

    /// Physical page of the PML4.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    /// Whether this handle refers to the kernel's own PML4.
    #[inline]
    #[must_use]
    pub const fn is_kernel(&self) -> bool {
        self.root.frame_number() == self.kernel_root.frame_number()
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.walker.mapper()
    }

    #[inline]
    pub(crate) const fn walker(&self) -> &TableWalker<'m, M> {
        &self.walker
    }

    /// Load CR3 with this address space's root.
    #[inline]
    pub fn activate<C: Mmu>(&self, mmu: &C) {
        mmu.load_root(self.root);
    }

    /// Map the user page `upage` to the frame behind the kernel alias `kpage`.
    ///
    /// Missing tables are created; on failure every table created by this
    /// call is released again.
    ///
    /// # Panics
    /// If either address is not page aligned, `upage` is not a user address,
    /// or this is the kernel address space. Debug builds also reject
    /// overwriting a present mapping.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] with the level whose table could not be
    /// allocated.
    pub fn set_page<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        upage: VirtualAddress,
        kpage: VirtualAddress,
        writable: bool,
    ) -> Result<(), MapError> {
        assert!(upage.is_aligned::<Size4K>(), "user page {upage} is not page aligned");
        assert!(kpage.is_aligned::<Size4K>(), "kernel page {kpage} is not page aligned");
        assert!(is_user_vaddr(upage), "{upage} is not a user address");
        assert!(!self.is_kernel(), "the kernel address space is immutable");

        let frame = self.mapper().to_physical(kpage).page::<Size4K>();
        let entry = self.walker.lookup_or_create(self.root, upage, alloc)?;
        debug_assert!(!entry.present(), "{upage} is already mapped");

        *entry = PageTableEntry::user_page(frame, writable);
        trace!("Mapped {upage} -> {frame} (writable: {writable})");
        Ok(())
    }

    /// Mark the user page `upage` not present. Other bits of the entry are
    /// kept. No-op if it is not mapped.
    ///
    /// # Panics
    /// If `upage` is not page aligned, not a user address, or this is the
    /// kernel address space.
    pub fn clear_page<C: Mmu>(&self, mmu: &C, upage: VirtualAddress) {
        assert!(upage.is_aligned::<Size4K>(), "user page {upage} is not page aligned");
        assert!(is_user_vaddr(upage), "{upage} is not a user address");
        assert!(!self.is_kernel(), "the kernel address space is immutable");

        if let Ok(entry) = self.walker.lookup(self.root, upage)
            && entry.present()
        {
            entry.set_present(false);
            self.invalidate_if_active(mmu, upage);
            trace!("Unmapped {upage}");
        }
    }

    /// Kernel alias of the byte that user address `uaddr` maps to.
    ///
    /// # Panics
    /// If `uaddr` is not a user address.
    #[must_use]
    pub fn get_page(&self, uaddr: VirtualAddress) -> Option<VirtualAddress> {
        assert!(is_user_vaddr(uaddr), "{uaddr} is not a user address");
        let frame = self.walker.lookup(self.root, uaddr).ok()?.frame()?;
        Some(self.mapper().to_kernel_vaddr(frame.join(uaddr.offset())))
    }

    /// Physical address `va` translates to, for any present mapping.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.walker.lookup(self.root, va).ok()?.frame()?;
        Some(frame.join(va.offset()))
    }

    /// Physical address of the user byte `va`, if user mode could perform
    /// `access` on it.
    #[must_use]
    pub fn resolve_user(&self, va: VirtualAddress, access: Access) -> Option<PhysicalAddress> {
        if !is_user_vaddr(va) {
            return None;
        }
        let entry = *self.walker.lookup(self.root, va).ok()?;
        if !entry.user() || (access == Access::Write && !entry.writable()) {
            return None;
        }
        Some(entry.frame()?.join(va.offset()))
    }

    /// Whether the leaf entry for `vpage` has been written through. `false`
    /// if there is no leaf entry.
    #[must_use]
    pub fn is_dirty(&self, vpage: VirtualAddress) -> bool {
        self.walker.lookup(self.root, vpage).is_ok_and(|e| e.dirty())
    }

    /// Whether the leaf entry for `vpage` has been accessed. `false` if there
    /// is no leaf entry.
    #[must_use]
    pub fn is_accessed(&self, vpage: VirtualAddress) -> bool {
        self.walker.lookup(self.root, vpage).is_ok_and(|e| e.accessed())
    }

    /// Overwrite the dirty bit of `vpage`'s leaf entry, if there is one.
    ///
    /// # Panics
    /// If `vpage` is not a user address or this is the kernel address space.
    pub fn set_dirty<C: Mmu>(&self, mmu: &C, vpage: VirtualAddress, dirty: bool) {
        self.assert_user_writable(vpage);
        if let Ok(entry) = self.walker.lookup(self.root, vpage) {
            entry.set_dirty(dirty);
            self.invalidate_if_active(mmu, vpage);
        }
    }

    /// Overwrite the accessed bit of `vpage`'s leaf entry, if there is one.
    ///
    /// # Panics
    /// If `vpage` is not a user address or this is the kernel address space.
    pub fn set_accessed<C: Mmu>(&self, mmu: &C, vpage: VirtualAddress, accessed: bool) {
        self.assert_user_writable(vpage);
        if let Ok(entry) = self.walker.lookup(self.root, vpage) {
            entry.set_accessed(accessed);
            self.invalidate_if_active(mmu, vpage);
        }
    }

    /// Release every frame this address space owns: present user pages, the
    /// tables below the user half of the PML4, and the PML4 itself.
    ///
    /// # Panics
    /// If this is the kernel address space.
    pub fn destroy<A: FrameAlloc>(self, alloc: &mut A) {
        assert!(!self.is_kernel(), "the kernel address space must never be destroyed");

        let pml4 = self.walker.table_mut(self.root);
        let mut released = 0;
        for i in TableIndex::USER_HALF {
            if let Some(pdpt) = pml4.get(TableIndex::new(i)).next_table() {
                released += self.release_table(alloc, pdpt, TableLevel::Pdpt);
            }
        }
        alloc.free_4k(self.root);
        debug!("Destroyed address space {}, released {} frames", self.root, released + 1);
    }

    /// [`destroy`](Self::destroy) for an optional address space; `None` is a
    /// no-op.
    pub fn destroy_opt<A: FrameAlloc>(space: Option<Self>, alloc: &mut A) {
        if let Some(space) = space {
            space.destroy(alloc);
        }
    }

    /// Free `table`, everything below it and every page its leaves map.
    /// Returns the number of frames released.
    fn release_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        table: PhysicalPage<Size4K>,
        level: TableLevel,
    ) -> usize {
        let entries = self.walker.table_mut(table);
        let mut released = 0;
        for i in TableIndex::ALL {
            let Some(frame) = entries.get(TableIndex::new(i)).frame() else {
                continue;
            };
            released += match level.next() {
                Some(child_level) => self.release_table(alloc, frame, child_level),
                None => {
                    alloc.free_4k(frame);
                    1
                }
            };
        }
        alloc.free_4k(table);
        released + 1
    }

    /// Entries in the upper half are shared with every other address space.
    fn assert_user_writable(&self, va: VirtualAddress) {
        assert!(is_user_vaddr(va), "{va} is not a user address");
        assert!(!self.is_kernel(), "the kernel address space is immutable");
    }

    fn invalidate_if_active<C: Mmu>(&self, mmu: &C, va: VirtualAddress) {
        if mmu.active_root() == self.root {
            mmu.invalidate_page(va.page());
        }
    }
}

#[cfg(test)]
mod tests;
