//! # Traversal Engine
//!
//! Depth-first walk over every present leaf entry, in ascending index order
//! at each level. The visitor receives the entry and the canonical virtual
//! address it maps, and may stop the walk by returning
//! [`ControlFlow::Break`]. Whatever context it needs is captured by the
//! closure.

use crate::address_space::AddressSpace;
use crate::page_table::{PageTableEntry, TableIndex, TableLevel};
use crate::PhysMapper;
use core::ops::{ControlFlow, Range};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

impl<M: PhysMapper> AddressSpace<'_, M> {
    /// Visit every present leaf, kernel half included.
    ///
    /// Returns [`ControlFlow::Continue`] if every leaf was visited, or the
    /// first [`ControlFlow::Break`] the visitor produced.
    pub fn for_each_leaf<B, F>(&self, mut visitor: F) -> ControlFlow<B>
    where
        F: FnMut(&mut PageTableEntry, VirtualAddress) -> ControlFlow<B>,
    {
        self.visit(self.root_page(), TableLevel::Pml4, 0, TableIndex::ALL, &mut visitor)
    }

    /// Visit every present leaf in the user half only.
    pub fn for_each_user_leaf<B, F>(&self, mut visitor: F) -> ControlFlow<B>
    where
        F: FnMut(&mut PageTableEntry, VirtualAddress) -> ControlFlow<B>,
    {
        self.visit(
            self.root_page(),
            TableLevel::Pml4,
            0,
            TableIndex::USER_HALF,
            &mut visitor,
        )
    }

    fn visit<B, F>(
        &self,
        table: PhysicalPage<Size4K>,
        level: TableLevel,
        prefix: u64,
        slots: Range<u16>,
        visitor: &mut F,
    ) -> ControlFlow<B>
    where
        F: FnMut(&mut PageTableEntry, VirtualAddress) -> ControlFlow<B>,
    {
        let entries = self.walker().table_mut(table);
        for i in slots {
            let index = TableIndex::new(i);
            let entry = entries.entry_mut(index);
            let Some(next) = entry.next_table() else {
                continue;
            };

            let bits = prefix | level.address_bits(index);
            match level.next() {
                Some(child_level) => {
                    self.visit(next, child_level, bits, TableIndex::ALL, visitor)?;
                }
                None => visitor(entry, VirtualAddress::from_table_bits(bits))?,
            }
        }
        ControlFlow::Continue(())
    }
}
