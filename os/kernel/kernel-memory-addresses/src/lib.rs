//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw 64-bit values that flow through the
//! paging code: virtual addresses, physical addresses, page bases and in-page
//! offsets.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`VirtualAddress`] | An address translated by the page tables. Knows how to split itself into table indices and how to become canonical again. |
//! | [`PhysicalAddress`] | An address on the physical bus (RAM or MMIO). |
//! | [`VirtualPage<S>`] / [`PhysicalPage<S>`] | The page-aligned base of a page of size `S`. |
//! | [`PageOffset<S>`] | The byte offset inside a page of size `S`. |
//!
//! The kernel only ever maps 4 KiB pages, so [`Size4K`] is the single
//! [`PageSize`] marker. The marker still lives in the type so that a page base
//! can never be confused with a raw address.
//!
//! ## Canonical addresses
//!
//! x86-64 with four paging levels translates 48 address bits. Bits 48..=63 must
//! be copies of bit 47; such an address is *canonical*. The lower half
//! (`0x0000_0000_0000_0000..=0x0000_7FFF_FFFF_FFFF`) and the upper half
//! (`0xFFFF_8000_0000_0000..=0xFFFF_FFFF_FFFF_FFFF`) are separated by a hole
//! the CPU refuses to translate. [`VirtualAddress::from_table_bits`] restores
//! the sign extension when an address is rebuilt from its table indices.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0000_0040_0000_1234);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0000_0040_0000_1000);
//! assert_eq!(off.as_u64(), 0x234);
//! assert_eq!(page.join(off), va);
//!
//! let kernel = VirtualAddress::from_table_bits(0x0000_8000_0000_0000);
//! assert_eq!(kernel.as_u64(), 0xFFFF_8000_0000_0000);
//! assert!(kernel.is_canonical());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page;
mod page_offset;
mod page_size;
mod physical_address;
mod virtual_address;

pub use page::{PhysicalPage, VirtualPage};
pub use page_offset::PageOffset;
pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;
