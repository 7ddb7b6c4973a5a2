//! # System Call Dispatch
//!
//! [`SyscallDispatcher::handle`] decodes a [`SyscallFrame`], validates every
//! user pointer through [`UserMemory`] and forwards the work to a
//! [`SyscallHost`]. The return value is stored in `rax`; the returned
//! [`Continuation`] tells the trap handler what happens to the process.
//!
//! | Call    | Success          | Failure                                        |
//! |---------|------------------|------------------------------------------------|
//! | `halt`  | powers off       |                                                |
//! | `exit`  | terminates       |                                                |
//! | `open`  | descriptor ≥ 3   | `-1`; bad pointer terminates with `-1`         |
//! | `read`  | bytes read       | `-1` on bad descriptor; bad buffer terminates  |
//! | `write` | bytes written    | `-1` on bad descriptor; bad buffer terminates  |
//! | `close` | `0`              | `-1`                                           |
//!
//! Numbers that name no system call terminate the caller with `-1`. Known
//! but unsupported calls return `-1`.

use crate::fd_table::FileDescriptorTable;
use crate::frame::SyscallFrame;
use crate::number::Sysno;
use crate::user_memory::{UserFault, UserMemory, UserStrError};
use kernel_info::memory::USERSPACE_END;
use kernel_info::process::{
    MAX_OPEN_FILES, MAX_PATH_LEN, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO,
};
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};
use log::{debug, info, trace, warn};

/// Bytes moved between user memory and the host per step.
const CHUNK: usize = 256;

/// Services the dispatcher needs from the rest of the kernel.
pub trait SyscallHost {
    /// An open file.
    type File;

    /// Turn the machine off. May return on hosts that cannot.
    fn power_off(&mut self);

    /// Open the file at `path`, or `None` if there is none.
    fn open(&mut self, path: &[u8]) -> Option<Self::File>;

    fn write_console(&mut self, bytes: &[u8]);

    /// Fill `buf` from the keyboard; returns the number of bytes stored.
    fn read_console(&mut self, buf: &mut [u8]) -> usize;

    /// Returns the number of bytes actually written, which may be short.
    fn write_file(&mut self, file: &mut Self::File, bytes: &[u8]) -> usize;

    /// Returns the number of bytes read; `0` at end of file.
    fn read_file(&mut self, file: &mut Self::File, buf: &mut [u8]) -> usize;

    fn close(&mut self, file: Self::File);
}

/// What the trap handler does after a system call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Continuation {
    /// Return to the process with `rax` holding the result.
    Resume,
    /// Terminate the process with this status. Its files are already closed.
    Exit(i32),
    /// The machine is being switched off.
    PowerOff,
}

/// Result of a call body: either a value for `rax` or an early end.
type Outcome = Result<i64, Continuation>;

/// Runs system calls for one process.
pub struct SyscallDispatcher<'a, H: SyscallHost, U: UserMemory, const N: usize = MAX_OPEN_FILES> {
    host: &'a mut H,
    memory: &'a U,
    files: &'a mut FileDescriptorTable<H::File, N>,
}

impl<'a, H: SyscallHost, U: UserMemory, const N: usize> SyscallDispatcher<'a, H, U, N> {
    pub const fn new(
        host: &'a mut H,
        memory: &'a U,
        files: &'a mut FileDescriptorTable<H::File, N>,
    ) -> Self {
        Self {
            host,
            memory,
            files,
        }
    }

    /// Execute the call described by `frame` and store its result in `rax`.
    pub fn handle(&mut self, frame: &mut SyscallFrame) -> Continuation {
        let sysno = match Sysno::try_from(frame.number()) {
            Ok(sysno) => sysno,
            Err(e) => {
                warn!("{e}, terminating the caller");
                return self.terminate(-1);
            }
        };
        let (arg0, arg1, arg2) = (frame.arg(0), frame.arg(1), frame.arg(2));
        trace!("syscall {sysno}({arg0:#x}, {arg1:#x}, {arg2:#x})");

        let outcome = match sysno {
            Sysno::Halt => Err(self.halt()),
            Sysno::Exit => Err(self.terminate(int_arg(arg0))),
            Sysno::Open => self.open(VirtualAddress::new(arg0)),
            Sysno::Read => self.read(int_arg(arg0), VirtualAddress::new(arg1), arg2),
            Sysno::Write => self.write(int_arg(arg0), VirtualAddress::new(arg1), arg2),
            Sysno::Close => Ok(self.close(int_arg(arg0))),
            Sysno::Fork
            | Sysno::Exec
            | Sysno::Wait
            | Sysno::Create
            | Sysno::Remove
            | Sysno::Filesize
            | Sysno::Seek
            | Sysno::Tell => {
                debug!("syscall {sysno} is not supported");
                Ok(-1)
            }
        };

        match outcome {
            Ok(value) => {
                frame.set_return(value);
                Continuation::Resume
            }
            Err(continuation) => continuation,
        }
    }

    fn halt(&mut self) -> Continuation {
        info!("Power-off requested");
        self.host.power_off();
        Continuation::PowerOff
    }

    /// Close every open file and end the process with `status`.
    fn terminate(&mut self, status: i32) -> Continuation {
        for file in self.files.drain() {
            self.host.close(file);
        }
        info!("Process exit({status})");
        Continuation::Exit(status)
    }

    fn open(&mut self, path: VirtualAddress) -> Outcome {
        if path.is_null() {
            return Ok(-1);
        }
        // Room for the longest path plus its terminator.
        let mut buf = [0; MAX_PATH_LEN + 1];
        let name = match self.memory.read_c_str(path, &mut buf) {
            Ok([]) | Err(UserStrError::TooLong(_)) => return Ok(-1),
            Ok(name) => name,
            Err(UserStrError::Fault(fault)) => {
                warn!("open: {fault}");
                return Err(self.terminate(-1));
            }
        };

        let Some(file) = self.host.open(name) else {
            return Ok(-1);
        };
        match self.files.install(file) {
            Ok(fd) => Ok(i64::from(fd)),
            Err(file) => {
                warn!("open: descriptor table full");
                self.host.close(file);
                Ok(-1)
            }
        }
    }

    fn write(&mut self, fd: i32, buf: VirtualAddress, len: u64) -> Outcome {
        if len == 0 {
            return Ok(0);
        }
        self.check_buffer(buf, len)?;
        let console = fd == STDOUT_FILENO || fd == STDERR_FILENO;
        if !console && !self.files.is_open(fd) {
            return Ok(-1);
        }
        // Nothing reaches the console or the file unless every page of the
        // buffer is readable.
        if let Err(fault) = self.touch_pages(buf, len) {
            warn!("write: {fault}");
            return Err(self.terminate(-1));
        }

        let mut chunk = [0; CHUNK];
        let mut done = 0;
        while done < len {
            let n = chunk_len(len - done);
            let src = buf + done;
            if let Err(fault) = self.memory.copy_from_user(src, &mut chunk[..n]) {
                warn!("write: {fault}");
                return Err(self.terminate(-1));
            }
            let written = if console {
                self.host.write_console(&chunk[..n]);
                n
            } else {
                match self.files.get_mut(fd) {
                    Some(file) => self.host.write_file(file, &chunk[..n]).min(n),
                    None => 0,
                }
            };
            done += written as u64;
            if written < n {
                break;
            }
        }
        Ok(byte_count(done))
    }

    fn read(&mut self, fd: i32, buf: VirtualAddress, len: u64) -> Outcome {
        if len == 0 {
            return Ok(0);
        }
        self.check_buffer(buf, len)?;
        let console = fd == STDIN_FILENO;
        if !console && !self.files.is_open(fd) {
            return Ok(-1);
        }

        let mut chunk = [0; CHUNK];
        let mut done = 0;
        while done < len {
            let n = chunk_len(len - done);
            let got = if console {
                self.host.read_console(&mut chunk[..n])
            } else {
                match self.files.get_mut(fd) {
                    Some(file) => self.host.read_file(file, &mut chunk[..n]),
                    None => 0,
                }
            };
            let got = got.min(n);
            if let Err(fault) = self.memory.copy_to_user(buf + done, &chunk[..got]) {
                warn!("read: {fault}");
                return Err(self.terminate(-1));
            }
            done += got as u64;
            if got < n {
                break;
            }
        }
        Ok(byte_count(done))
    }

    fn close(&mut self, fd: i32) -> i64 {
        match self.files.remove(fd) {
            Some(file) => {
                self.host.close(file);
                0
            }
            None => -1,
        }
    }

    /// Read one byte from every page `buf..buf + len` touches.
    fn touch_pages(&self, buf: VirtualAddress, len: u64) -> Result<(), UserFault> {
        let last = buf + (len - 1);
        let mut va = buf;
        while va.page::<Size4K>() != last.page::<Size4K>() {
            self.memory.read_byte(va)?;
            va = va.page::<Size4K>().base() + Size4K::SIZE;
        }
        self.memory.read_byte(last).map(drop)
    }

    /// Terminate the caller unless `buf..buf + len` lies in user space.
    fn check_buffer(&mut self, buf: VirtualAddress, len: u64) -> Result<(), Continuation> {
        match buf.as_u64().checked_add(len) {
            Some(end) if !buf.is_null() && end <= USERSPACE_END => Ok(()),
            _ => {
                warn!("buffer {buf}+{len:#x} is outside user space");
                Err(self.terminate(-1))
            }
        }
    }
}

/// Descriptors and statuses are C `int`s; only the low half of the register
/// counts.
#[allow(clippy::cast_possible_truncation)]
const fn int_arg(reg: u64) -> i32 {
    (reg as u32).cast_signed()
}

#[allow(clippy::cast_possible_truncation)]
fn chunk_len(remaining: u64) -> usize {
    remaining.min(CHUNK as u64) as usize
}

fn byte_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
