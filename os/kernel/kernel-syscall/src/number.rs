/// System call numbers, passed in `rax`.
#[repr(u64)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Sysno {
    /// Power the machine off.
    Halt = 0,
    /// Terminate the calling process with a status.
    Exit = 1,
    Fork = 2,
    Exec = 3,
    Wait = 4,
    Create = 5,
    Remove = 6,
    /// Open a file by its NUL-terminated path.
    Open = 7,
    Filesize = 8,
    /// Read from a descriptor into a user buffer.
    Read = 9,
    /// Write a user buffer to a descriptor.
    Write = 10,
    Seek = 11,
    Tell = 12,
    /// Release a descriptor.
    Close = 13,
}

impl Sysno {
    pub const ALL: [Self; 14] = [
        Self::Halt,
        Self::Exit,
        Self::Fork,
        Self::Exec,
        Self::Wait,
        Self::Create,
        Self::Remove,
        Self::Open,
        Self::Filesize,
        Self::Read,
        Self::Write,
        Self::Seek,
        Self::Tell,
        Self::Close,
    ];

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Exit => "exit",
            Self::Fork => "fork",
            Self::Exec => "exec",
            Self::Wait => "wait",
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Open => "open",
            Self::Filesize => "filesize",
            Self::Read => "read",
            Self::Write => "write",
            Self::Seek => "seek",
            Self::Tell => "tell",
            Self::Close => "close",
        }
    }
}

impl core::fmt::Display for Sysno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A number in `rax` that names no system call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unknown system call number {0}")]
pub struct UnknownSyscall(pub u64);

impl TryFrom<u64> for Sysno {
    type Error = UnknownSyscall;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or(UnknownSyscall(value))
    }
}
