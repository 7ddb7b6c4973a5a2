//! # Kernel synchronization primitives
//!
//! Only one-time publication is needed here: the kernel's own address space is
//! built at boot and then read by every thread without further locking.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod sync_once_cell;

pub use sync_once_cell::SyncOnceCell;
