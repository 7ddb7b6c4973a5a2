//! # Per-Process Limits

/// Descriptor of the console input stream.
pub const STDIN_FILENO: i32 = 0;

/// Descriptor of the console output stream.
pub const STDOUT_FILENO: i32 = 1;

/// Descriptor of the console error stream.
pub const STDERR_FILENO: i32 = 2;

/// Lowest descriptor handed out by `open`; 0..=2 are reserved for the console.
pub const FIRST_FREE_FD: i32 = 3;

/// Slots in a process's descriptor table, including the reserved ones.
pub const MAX_OPEN_FILES: usize = 64;

/// Longest path (in bytes, without the terminating NUL) accepted from user space.
pub const MAX_PATH_LEN: usize = 256;

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const _: () = {
    assert!(FIRST_FREE_FD > STDERR_FILENO);
    assert!(MAX_OPEN_FILES > FIRST_FREE_FD as usize);
    assert!(MAX_OPEN_FILES <= i32::MAX as usize);
    assert!(MAX_PATH_LEN > 0);
};
