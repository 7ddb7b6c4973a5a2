//! # Typed x86-64 Registers
//!
//! The paging code needs exactly two privileged primitives: loading the
//! translation root ([`cr3::Cr3`]) and dropping a single cached translation
//! ([`tlb::invlpg`]).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "tlb")]
pub mod tlb;

/// Read a privileged register.
pub trait LoadRegisterUnsafe {
    /// # Safety
    /// Ring 0 only.
    unsafe fn load_unsafe() -> Self;
}

/// Write a privileged register.
pub trait StoreRegisterUnsafe {
    /// # Safety
    /// Ring 0 only, and the new value must keep the kernel running (for CR3:
    /// the root must map the executing code and stack).
    unsafe fn store_unsafe(self);
}
