//! # User Memory Access
//!
//! The kernel never dereferences a pointer handed in by a process directly.
//! Every byte goes through a [`UserMemory`] implementation that first checks
//! the address lies below the user/kernel boundary and then either walks the
//! page tables ([`PageWalkProbe`]) or relies on the page-fault handler to
//! recover ([`crate::trap::TrapProbe`]).

use kernel_info::memory::is_user_vaddr;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{Access, AddressSpace, PhysMapper};

/// A user address the process may not access the requested way.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("invalid user memory access at {0}")]
pub struct UserFault(pub VirtualAddress);

/// Reading a NUL-terminated string from user memory failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum UserStrError {
    #[error(transparent)]
    Fault(#[from] UserFault),
    /// No terminator within the buffer.
    #[error("string does not fit into {0} bytes")]
    TooLong(usize),
}

/// Byte-wise access to the current process's memory.
pub trait UserMemory {
    /// Read the byte at `va`.
    ///
    /// # Errors
    /// [`UserFault`] if `va` is not a readable user address.
    fn read_byte(&self, va: VirtualAddress) -> Result<u8, UserFault>;

    /// Write `byte` to `va`.
    ///
    /// # Errors
    /// [`UserFault`] if `va` is not a writable user address.
    fn write_byte(&self, va: VirtualAddress, byte: u8) -> Result<(), UserFault>;

    /// Fill `dst` from user memory starting at `src`.
    ///
    /// # Errors
    /// The first [`UserFault`]; `dst` is partially written in that case.
    fn copy_from_user(&self, src: VirtualAddress, dst: &mut [u8]) -> Result<(), UserFault> {
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = self.read_byte(user_offset(src, i)?)?;
        }
        Ok(())
    }

    /// Copy `src` into user memory starting at `dst`.
    ///
    /// # Errors
    /// The first [`UserFault`]; bytes before it have been written.
    fn copy_to_user(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), UserFault> {
        for (i, &byte) in src.iter().enumerate() {
            self.write_byte(user_offset(dst, i)?, byte)?;
        }
        Ok(())
    }

    /// Read the NUL-terminated string at `src` into `buf` and return it
    /// without the terminator. Bytes after the terminator are not touched.
    ///
    /// # Errors
    /// [`UserStrError::Fault`] if a byte cannot be read,
    /// [`UserStrError::TooLong`] if `buf` fills up before a NUL is found.
    fn read_c_str<'b>(
        &self,
        src: VirtualAddress,
        buf: &'b mut [u8],
    ) -> Result<&'b [u8], UserStrError> {
        let mut len = 0;
        loop {
            if len == buf.len() {
                return Err(UserStrError::TooLong(buf.len()));
            }
            let byte = self.read_byte(user_offset(src, len)?)?;
            if byte == 0 {
                return Ok(&buf[..len]);
            }
            buf[len] = byte;
            len += 1;
        }
    }
}

/// `base + offset`, as long as it stays a user address.
fn user_offset(base: VirtualAddress, offset: usize) -> Result<VirtualAddress, UserFault> {
    base.checked_add(offset as u64)
        .filter(|va| is_user_vaddr(*va))
        .ok_or(UserFault(base))
}

/// Validates every access by walking the page tables of an address space,
/// then touches the byte through the kernel's alias of the frame.
///
/// Works whether or not the address space is the active one and never
/// faults.
pub struct PageWalkProbe<'s, 'm, M: PhysMapper> {
    space: &'s AddressSpace<'m, M>,
}

impl<'s, 'm, M: PhysMapper> PageWalkProbe<'s, 'm, M> {
    #[must_use]
    pub const fn new(space: &'s AddressSpace<'m, M>) -> Self {
        Self { space }
    }
}

impl<M: PhysMapper> UserMemory for PageWalkProbe<'_, '_, M> {
    fn read_byte(&self, va: VirtualAddress) -> Result<u8, UserFault> {
        let pa = self
            .space
            .resolve_user(va, Access::Read)
            .ok_or(UserFault(va))?;
        // SAFETY: `pa` lies in a frame mapped present for user mode.
        Ok(unsafe { *self.space.mapper().phys_to_mut::<u8>(pa) })
    }

    fn write_byte(&self, va: VirtualAddress, byte: u8) -> Result<(), UserFault> {
        let pa = self
            .space
            .resolve_user(va, Access::Write)
            .ok_or(UserFault(va))?;
        // SAFETY: `pa` lies in a frame mapped present and writable for user mode.
        unsafe {
            *self.space.mapper().phys_to_mut::<u8>(pa) = byte;
        }
        Ok(())
    }
}
