use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const FULL: u8 = 2;

/// A cell written at most once and read lock-free afterwards.
///
/// Readers racing with the writer see `None` until the value is published.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// The value, once it has been published.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == FULL {
            // SAFETY: FULL is only stored after the value was written.
            Some(unsafe { self.get_unchecked() })
        } else {
            None
        }
    }

    /// Store `value` and return a reference to it.
    ///
    /// # Errors
    /// Hands `value` back if the cell is already (being) initialized.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if !self.begin_init() {
            return Err(value);
        }
        Ok(self.publish(value))
    }

    fn begin_init(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn publish(&self, value: T) -> &T {
        // SAFETY: the WRITING state makes us the only writer.
        unsafe {
            (*self.value.get()).write(value);
        }
        self.state.store(FULL, Ordering::Release);
        // SAFETY: just written
        unsafe { self.get_unchecked() }
    }

    unsafe fn get_unchecked(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == FULL {
            // SAFETY: FULL and we have exclusive access.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// SAFETY: only `&T` escapes, and only after the single write completed.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
