//! # System Call Layer
//!
//! Everything between a user process trapping into the kernel and the
//! kernel's file and console services:
//!
//! * [`Sysno`]: the system call numbers.
//! * [`SyscallFrame`]: the register snapshot built by the entry stub.
//! * [`UserMemory`]: validated byte-wise access to user memory, with a
//!   page-walking implementation ([`PageWalkProbe`]) and, on x86-64, a
//!   fault-recovering one in [`trap`].
//! * [`FileDescriptorTable`]: per-process open files.
//! * [`SyscallDispatcher`]: decodes a frame, runs the call against a
//!   [`SyscallHost`] and reports how the process continues.
//!
//! ## Calling convention
//!
//! ```text
//! rax  number in, return value out
//! rdi  arg0
//! rsi  arg1
//! rdx  arg2
//! r10  arg3
//! r8   arg4
//! r9   arg5
//! ```
//!
//! Failures a process can cause on its own return `-1`. Handing the kernel a
//! pointer it must not touch terminates the process with status `-1`.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

mod dispatch;
mod fd_table;
mod frame;
mod number;
#[cfg(target_arch = "x86_64")]
pub mod trap;
mod user_memory;

pub use crate::dispatch::{Continuation, SyscallDispatcher, SyscallHost};
pub use crate::fd_table::FileDescriptorTable;
pub use crate::frame::SyscallFrame;
pub use crate::number::{Sysno, UnknownSyscall};
pub use crate::user_memory::{PageWalkProbe, UserFault, UserMemory, UserStrError};
