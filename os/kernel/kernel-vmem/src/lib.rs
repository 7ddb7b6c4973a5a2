//! # Virtual Memory Support
//!
//! Four-level x86-64 paging for the kernel: the page-table entry layout, a
//! level walker that creates intermediate tables on demand, per-process
//! [`AddressSpace`]s that share the kernel half, and a traversal engine over
//! every present leaf mapping.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each level containing 512 (2⁹) entries of 8 bytes (64 bits) each.
//!
//! ```text
//!  PML4  →  PDPT  →  PD  →  PT  →  Physical Page
//!   │        │        │       │
//!   │        │        │       └───► PTE   (Page Table Entry)  → maps 4 KiB page
//!   │        │        └───────────► PDE   (Page Directory Entry)
//!   │        └────────────────────► PDPTE (Page Directory Pointer Table Entry)
//!   └─────────────────────────────► PML4E (Page Map Level 4 Entry)
//! ```
//!
//! Only 4 KiB leaves exist here: every PML4E, PDPTE and PDE points to the
//! next table, and every PTE maps one page.
//!
//! ## Ownership
//!
//! * The kernel's own PML4 is built once through
//!   [`KernelAddressSpaceBuilder`] and frozen into a [`KernelAddressSpace`].
//! * [`AddressSpace::create`] copies that PML4, so the upper 256 slots of
//!   every address space point at the same kernel tables.
//! * Tables and pages reachable from the lower 256 slots belong to exactly
//!   one address space and are released by [`AddressSpace::destroy`].
//!
//! ## Collaborators
//!
//! The crate never touches hardware or allocators directly. It goes through
//! three small traits:
//!
//! * [`FrameAlloc`]: hands out and takes back 4 KiB physical frames.
//! * [`PhysMapper`]: converts between physical frames and their kernel alias.
//! * [`Mmu`]: loads CR3, reports the active root and invalidates single TLB
//!   entries. [`X86Mmu`] is the real thing; tests use a recording fake.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub mod address_space;
mod hhdm;
pub mod page_table;
mod traversal;
mod walker;
#[cfg(target_arch = "x86_64")]
mod x86;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::address_space::{
    Access, AddressSpace, AddressSpaceError, KernelAddressSpace, KernelAddressSpaceBuilder,
    MapError, RootPage, activate_or_kernel, install_kernel_space, kernel_space,
};
pub use crate::hhdm::HhdmPhysMapper;
pub use crate::page_table::{PageTable, PageTableEntry, TableIndex, TableLevel};
pub use crate::walker::WalkError;
#[cfg(target_arch = "x86_64")]
pub use crate::x86::X86Mmu;

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage};

/// Source of physical 4 KiB frames.
pub trait FrameAlloc {
    /// Take one frame, or `None` when memory is exhausted. The contents are
    /// unspecified.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Give back a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: PhysicalPage<Size4K>);
}

/// Translation between physical memory and the kernel's view of it.
pub trait PhysMapper {
    /// Borrow the object of type `T` stored at physical address `pa`.
    ///
    /// # Safety
    /// `pa` must be backed by memory holding a valid `T`, and the caller must
    /// not create overlapping mutable borrows of it.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// Kernel virtual alias of `pa`.
    fn to_kernel_vaddr(&self, pa: PhysicalAddress) -> VirtualAddress;

    /// Physical address behind the kernel alias `va`.
    fn to_physical(&self, va: VirtualAddress) -> PhysicalAddress;
}

/// The memory-management unit of the executing CPU.
pub trait Mmu {
    /// Make `root` the active PML4. Completes before returning and flushes
    /// all non-global translations.
    fn load_root(&self, root: RootPage);

    /// The PML4 currently loaded.
    fn active_root(&self) -> RootPage;

    /// Drop the cached translation for one page.
    fn invalidate_page(&self, page: VirtualPage<Size4K>);
}
