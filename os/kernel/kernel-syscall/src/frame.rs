/// Register state of a process at the moment it issued `syscall`.
///
/// The entry stub pushes the registers so that, read from the stack pointer
/// upwards, they form this struct:
///
/// ```text
///   +0  rax     number on entry, return value on exit
///   +8  rdi     arg0
///   +16 rsi     arg1
///   +24 rdx     arg2
///   +32 r10     arg3 (rcx is taken by `syscall`)
///   +40 r8      arg4
///   +48 r9      arg5
///   +56 rip     user return address (from rcx)
///   +64 rflags  user flags (from r11)
///   +72 rsp     user stack pointer
/// ```
#[derive(Debug, Default, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct SyscallFrame {
    pub rax: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub r10: u64,
    pub r8: u64,
    pub r9: u64,
    pub rip: u64,
    pub rflags: u64,
    pub rsp: u64,
}

const _: () = assert!(size_of::<SyscallFrame>() == 80);

impl SyscallFrame {
    /// A frame for call `number` with the first three arguments set.
    #[must_use]
    pub const fn with_args(number: u64, arg0: u64, arg1: u64, arg2: u64) -> Self {
        Self {
            rax: number,
            rdi: arg0,
            rsi: arg1,
            rdx: arg2,
            r10: 0,
            r8: 0,
            r9: 0,
            rip: 0,
            rflags: 0,
            rsp: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.rax
    }

    /// Argument `n` (0..6) in calling-convention order.
    ///
    /// # Panics
    /// If `n` is 6 or more.
    #[must_use]
    pub const fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.rdi,
            1 => self.rsi,
            2 => self.rdx,
            3 => self.r10,
            4 => self.r8,
            5 => self.r9,
            _ => panic!("system calls take at most six arguments"),
        }
    }

    #[inline]
    pub const fn set_return(&mut self, value: i64) {
        self.rax = value.cast_unsigned();
    }

    #[inline]
    #[must_use]
    pub const fn return_value(&self) -> i64 {
        self.rax.cast_signed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn layout_matches_push_order() {
        assert_eq!(offset_of!(SyscallFrame, rax), 0);
        assert_eq!(offset_of!(SyscallFrame, rdi), 8);
        assert_eq!(offset_of!(SyscallFrame, r10), 32);
        assert_eq!(offset_of!(SyscallFrame, r9), 48);
        assert_eq!(offset_of!(SyscallFrame, rip), 56);
        assert_eq!(offset_of!(SyscallFrame, rsp), 72);
    }

    #[test]
    fn arguments_in_order() {
        let frame = SyscallFrame {
            rdi: 1,
            rsi: 2,
            rdx: 3,
            r10: 4,
            r8: 5,
            r9: 6,
            ..SyscallFrame::default()
        };
        let args: Vec<u64> = (0..6).map(|n| frame.arg(n)).collect();
        assert_eq!(args, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn negative_returns_survive_the_register() {
        let mut frame = SyscallFrame::with_args(7, 0, 0, 0);
        frame.set_return(-1);
        assert_eq!(frame.rax, u64::MAX);
        assert_eq!(frame.return_value(), -1);
    }
}
