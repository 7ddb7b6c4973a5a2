use kernel_info::process::{FIRST_FREE_FD, MAX_OPEN_FILES};

/// Per-process table of open files, indexed by descriptor.
///
/// Descriptors below [`FIRST_FREE_FD`] belong to the console and are never
/// handed out. `N` bounds the descriptor numbers, so at most
/// `N - FIRST_FREE_FD` files are open at once.
pub struct FileDescriptorTable<F, const N: usize = MAX_OPEN_FILES> {
    slots: [Option<F>; N],
}

impl<F, const N: usize> FileDescriptorTable<F, N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Store `file` under the lowest free descriptor.
    ///
    /// # Errors
    /// Hands `file` back if every descriptor is taken.
    pub fn install(&mut self, file: F) -> Result<i32, F> {
        let Some(index) = (Self::FIRST..N).find(|&i| self.slots[i].is_none()) else {
            return Err(file);
        };
        self.slots[index] = Some(file);
        // Bounded by N, which fits the descriptor type.
        Ok(i32::try_from(index).unwrap_or(i32::MAX))
    }

    pub fn get_mut(&mut self, fd: i32) -> Option<&mut F> {
        self.slots.get_mut(Self::slot(fd)?)?.as_mut()
    }

    #[must_use]
    pub fn is_open(&self, fd: i32) -> bool {
        Self::slot(fd).is_some_and(|i| self.slots[i].is_some())
    }

    /// Take the file out of the table, freeing `fd` for reuse.
    pub fn remove(&mut self, fd: i32) -> Option<F> {
        self.slots.get_mut(Self::slot(fd)?)?.take()
    }

    /// Number of open files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every open file, lowest descriptor first.
    pub fn drain(&mut self) -> impl Iterator<Item = F> + '_ {
        self.slots.iter_mut().filter_map(Option::take)
    }

    #[allow(clippy::cast_sign_loss)]
    const FIRST: usize = FIRST_FREE_FD as usize;

    fn slot(fd: i32) -> Option<usize> {
        let index = usize::try_from(fd).ok()?;
        (Self::FIRST..N).contains(&index).then_some(index)
    }
}

impl<F, const N: usize> Default for FileDescriptorTable<F, N> {
    fn default() -> Self {
        Self::new()
    }
}
