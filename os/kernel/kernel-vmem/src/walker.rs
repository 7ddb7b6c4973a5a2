//! # Level Walker
//!
//! A single recursive procedure that descends from any table to the leaf
//! entry for a virtual address, one [`TableLevel`] per call. In *create* mode
//! missing intermediate tables are allocated, zeroed and linked on the way
//! down; if anything deeper fails, each level that allocated a table on this
//! walk unlinks and frees it again before the error propagates, so a failed
//! walk leaves the tree exactly as it found it.

use crate::page_table::{PageTable, PageTableEntry, TableLevel};
use crate::{FrameAlloc, PhysMapper};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Why a walk did not reach the leaf entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum WalkError {
    /// Lookup only: the table at this level does not exist.
    #[error("no {0} table on the walk")]
    Missing(TableLevel),
    /// Create mode: allocating the table at this level failed.
    #[error("out of memory while allocating a {0} table")]
    OutOfMemory(TableLevel),
}

/// Stand-in allocator type for lookups. Uninhabited, so a lookup can never
/// allocate.
enum NoAlloc {}

impl FrameAlloc for NoAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        match *self {}
    }

    fn free_4k(&mut self, _frame: PhysicalPage<Size4K>) {
        match *self {}
    }
}

/// Walks and edits page tables through a [`PhysMapper`].
pub(crate) struct TableWalker<'m, M: PhysMapper> {
    mapper: &'m M,
}

impl<'m, M: PhysMapper> TableWalker<'m, M> {
    #[inline]
    pub const fn new(mapper: &'m M) -> Self {
        Self { mapper }
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Borrow the table stored in `frame`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn table_mut(&self, frame: PhysicalPage<Size4K>) -> &mut PageTable {
        // SAFETY: every frame handed to the walker holds a page table, and the
        // mapper yields a writable kernel alias for it.
        unsafe { self.mapper.phys_to_mut::<PageTable>(frame.base()) }
    }

    /// Leaf entry for `va` below `root`, without allocating.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn lookup(
        &self,
        root: PhysicalPage<Size4K>,
        va: VirtualAddress,
    ) -> Result<&mut PageTableEntry, WalkError> {
        self.walk(root, TableLevel::Pml4, va, None::<&mut NoAlloc>)
    }

    /// Leaf entry for `va` below `root`, creating missing tables from `alloc`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn lookup_or_create<A: FrameAlloc>(
        &self,
        root: PhysicalPage<Size4K>,
        va: VirtualAddress,
        alloc: &mut A,
    ) -> Result<&mut PageTableEntry, WalkError> {
        self.walk(root, TableLevel::Pml4, va, Some(alloc))
    }

    #[allow(clippy::mut_from_ref)]
    fn walk<A: FrameAlloc>(
        &self,
        table: PhysicalPage<Size4K>,
        level: TableLevel,
        va: VirtualAddress,
        mut alloc: Option<&mut A>,
    ) -> Result<&mut PageTableEntry, WalkError> {
        let entries = self.table_mut(table);
        let index = level.index_of(va);

        let Some(child_level) = level.next() else {
            return Ok(entries.entry_mut(index));
        };

        let (child, fresh) = match entries.get(index).next_table() {
            Some(child) => (child, false),
            None => {
                let Some(frames) = alloc.as_deref_mut() else {
                    return Err(WalkError::Missing(child_level));
                };
                let Some(child) = frames.alloc_4k() else {
                    log::warn!("Out of frames for a {child_level} table while mapping {va}");
                    return Err(WalkError::OutOfMemory(child_level));
                };
                self.table_mut(child).zero();
                entries.set(index, PageTableEntry::table(child));
                (child, true)
            }
        };

        let leaf = self.walk(child, child_level, va, alloc.as_deref_mut());
        if leaf.is_err()
            && fresh
            && let Some(frames) = alloc
        {
            entries.set(index, PageTableEntry::new());
            frames.free_4k(child);
        }
        leaf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::TableIndex;
    use crate::testing::{SimulatedMemory, TestFrameAlloc};

    fn setup(frames: usize) -> (SimulatedMemory, TestFrameAlloc, PhysicalPage<Size4K>) {
        let memory = SimulatedMemory::new(frames);
        let mut alloc = TestFrameAlloc::new(frames);
        let root = alloc.alloc_page();
        memory.zero_frame(root);
        (memory, alloc, root)
    }

    #[test]
    fn lookup_does_not_allocate() {
        let (memory, alloc, root) = setup(16);
        let walker = TableWalker::new(&memory);
        let before = alloc.free_frames();

        let err = walker.lookup(root, VirtualAddress::new(0x40_0000)).unwrap_err();
        assert_eq!(err, WalkError::Missing(TableLevel::Pdpt));
        assert_eq!(alloc.free_frames(), before);
    }

    #[test]
    fn create_builds_three_intermediate_tables() {
        let (memory, mut alloc, root) = setup(16);
        let walker = TableWalker::new(&memory);
        let before = alloc.free_frames();
        let va = VirtualAddress::new(0x0000_1234_5678_9000);

        let leaf = walker.lookup_or_create(root, va, &mut alloc).unwrap();
        assert!(!leaf.present());
        assert_eq!(alloc.free_frames(), before - 3);

        // Second walk reuses the chain.
        walker.lookup_or_create(root, va, &mut alloc).unwrap();
        assert_eq!(alloc.free_frames(), before - 3);

        // Intermediate entries are present, writable and user.
        let pml4 = walker.table_mut(root).get(TableLevel::Pml4.index_of(va));
        assert!(pml4.present() && pml4.writable() && pml4.user());
        assert!(walker.lookup(root, va).is_ok());
    }

    #[test]
    fn failure_at_every_depth_unwinds_completely() {
        let va = VirtualAddress::new(0x0000_0000_0040_0000);
        for successes in 0..3 {
            let (memory, mut alloc, root) = setup(16);
            let walker = TableWalker::new(&memory);
            let before = alloc.free_frames();

            alloc.fail_after(successes);
            let expected = [TableLevel::Pdpt, TableLevel::Pd, TableLevel::Pt][successes];
            let err = walker.lookup_or_create(root, va, &mut alloc).unwrap_err();
            assert_eq!(err, WalkError::OutOfMemory(expected));

            assert_eq!(alloc.free_frames(), before, "leaked after {successes} allocations");
            assert!(walker.table_mut(root).get(TableLevel::Pml4.index_of(va)).frame().is_none());
        }
    }

    #[test]
    fn failure_keeps_preexisting_tables() {
        let (memory, mut alloc, root) = setup(16);
        let walker = TableWalker::new(&memory);
        let first = VirtualAddress::new(0x0000_0000_0040_0000);
        walker.lookup_or_create(root, first, &mut alloc).unwrap();
        let after_first = alloc.free_frames();

        // Same PML4 and PDPT slots, different PD slot: only a PT is new.
        let second = VirtualAddress::new(0x0000_0000_0080_0000);
        alloc.fail_after(0);
        let err = walker.lookup_or_create(root, second, &mut alloc).unwrap_err();
        assert_eq!(err, WalkError::OutOfMemory(TableLevel::Pt));
        assert_eq!(alloc.free_frames(), after_first);
        assert!(walker.lookup(root, first).is_ok());
    }

    #[test]
    fn new_tables_are_zeroed() {
        let (memory, mut alloc, root) = setup(16);
        // Dirty a frame and free it; the allocator hands it out again first.
        let dirty = alloc.alloc_page();
        memory.write(dirty.base(), &[0xAA; 4096]);
        alloc.free_4k(dirty);

        let walker = TableWalker::new(&memory);
        let va = VirtualAddress::new(0x0000_0000_0000_3000);
        walker.lookup_or_create(root, va, &mut alloc).unwrap();

        let pdpt = walker.table_mut(root).get(TableIndex::new(0)).next_table();
        assert_eq!(pdpt, Some(dirty));
        let pdpt = walker.table_mut(dirty);
        for i in 1..512 {
            assert_eq!(pdpt.get(TableIndex::new(i)).into_bits(), 0);
        }
    }
}
