//! # Kernel Configuration
//!
//! Compile-time constants that describe the virtual memory layout and the
//! per-process limits shared by the paging code and the system-call layer.
//! Every value is a `const` and the relationships between them are checked by
//! `const` assertions, so an inconsistent configuration fails to build.
//!
//! ## Virtual Memory Architecture
//!
//! ```text
//! Virtual Address Space Layout (48-bit, four-level paging):
//!
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐  PML4[0]
//!                       │           User Space            │
//!                       │   (private per address space)   │
//! USERSPACE_END         ├─────────────────────────────────┤ 0x0000_8000_0000_0000
//!                       │      Non-canonical hole         │
//! KERNEL_SPACE_START    ├─────────────────────────────────┤ 0xffff_8000_0000_0000  PML4[256]
//!                       │          Kernel Space           │
//!                       │ (shared by every address space) │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │       Kernel Text & Data        │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘  PML4[511]
//! ```
//!
//! The kernel half starts exactly at a PML4 boundary, so the upper 256 PML4
//! entries of the kernel's own table can be copied verbatim into every new
//! address space.
//!
//! ## Modules
//! * [`memory`]: address-space boundaries and the user/kernel predicate.
//! * [`process`]: descriptor-table capacity and path limits.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod process;
