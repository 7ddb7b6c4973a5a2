//! # Host-Side Test Machine
//!
//! Stand-ins for the hardware and the frame allocator so paging code can run
//! under `cargo test`:
//!
//! * [`SimulatedMemory`]: a heap buffer of 4 KiB frames addressed by
//!   physical address, with HHDM-style kernel aliases.
//! * [`TestFrameAlloc`]: hands out those frames, counts them, detects double
//!   frees and can be told to run dry.
//! * [`RecordingMmu`]: remembers the loaded root and every invalidated page.
//! * [`TestMachine`]: all of the above plus a small kernel address space.

use crate::address_space::{KernelAddressSpace, KernelAddressSpaceBuilder, RootPage};
use crate::{FrameAlloc, Mmu, PhysMapper};
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell, UnsafeCell};
use kernel_info::memory::{HHDM_BASE, KERNEL_BASE};
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage,
};

const FRAME_SIZE: usize = Size4K::SIZE as usize;

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; FRAME_SIZE]>);

/// Simulated physical RAM. Physical address `n * 4096` is frame `n`.
pub struct SimulatedMemory {
    frames: Box<[Frame]>,
}

impl SimulatedMemory {
    #[must_use]
    pub fn new(frames: usize) -> Self {
        let frames = (0..frames)
            .map(|_| Frame(UnsafeCell::new([0; FRAME_SIZE])))
            .collect();
        Self { frames }
    }

    /// Kernel alias of a frame, as a page allocator would return it.
    #[must_use]
    pub fn kernel_alias(&self, frame: PhysicalPage<Size4K>) -> VirtualAddress {
        self.to_kernel_vaddr(frame.base())
    }

    pub fn zero_frame(&self, frame: PhysicalPage<Size4K>) {
        self.write(frame.base(), &[0; FRAME_SIZE]);
    }

    /// Copy `bytes` to physical memory starting at `pa`. May cross frames.
    pub fn write(&self, pa: PhysicalAddress, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            *self.byte_mut(pa + i as u64) = b;
        }
    }

    /// Copy `len` bytes of physical memory starting at `pa`.
    #[must_use]
    pub fn read(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        (0..len).map(|i| *self.byte_mut(pa + i as u64)).collect()
    }

    /// [`write`](Self::write) through a kernel alias.
    pub fn write_kernel(&self, va: VirtualAddress, bytes: &[u8]) {
        self.write(self.to_physical(va), bytes);
    }

    /// [`read`](Self::read) through a kernel alias.
    #[must_use]
    pub fn read_kernel(&self, va: VirtualAddress, len: usize) -> Vec<u8> {
        self.read(self.to_physical(va), len)
    }

    #[allow(clippy::mut_from_ref, clippy::cast_possible_truncation)]
    fn byte_mut(&self, pa: PhysicalAddress) -> &mut u8 {
        let (frame, offset) = pa.split::<Size4K>();
        let index = frame.frame_number() as usize;
        assert!(index < self.frames.len(), "{pa} is beyond simulated memory");
        // SAFETY: in bounds; tests are single-threaded per machine.
        unsafe { &mut (*self.frames[index].0.get())[offset.as_usize()] }
    }
}

impl PhysMapper for SimulatedMemory {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let (frame, offset) = pa.split::<Size4K>();
        let index = frame.frame_number() as usize;
        assert!(index < self.frames.len(), "{pa} is beyond simulated memory");
        assert!(
            offset.as_usize() + size_of::<T>() <= FRAME_SIZE,
            "object at {pa} crosses a frame boundary"
        );
        // SAFETY: in bounds; the caller vouches for the type.
        unsafe {
            &mut *self.frames[index]
                .0
                .get()
                .cast::<u8>()
                .add(offset.as_usize())
                .cast::<T>()
        }
    }

    fn to_kernel_vaddr(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(HHDM_BASE + pa.as_u64())
    }

    fn to_physical(&self, va: VirtualAddress) -> PhysicalAddress {
        assert!(va.as_u64() >= HHDM_BASE, "{va} is not a kernel alias");
        PhysicalAddress::new(va.as_u64() - HHDM_BASE)
    }
}

/// Frame allocator over [`SimulatedMemory`]. Frame 0 is never handed out.
pub struct TestFrameAlloc {
    free: Vec<PhysicalPage<Size4K>>,
    in_use: BTreeSet<u64>,
    remaining_successes: Option<usize>,
}

impl TestFrameAlloc {
    /// Manage frames `1..frames`; the lowest numbers are handed out first.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        let free = (1..frames as u64)
            .rev()
            .map(PhysicalPage::from_frame_number)
            .collect();
        Self {
            free,
            in_use: BTreeSet::new(),
            remaining_successes: None,
        }
    }

    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn frames_in_use(&self) -> usize {
        self.in_use.len()
    }

    /// Let the next `successes` allocations succeed and fail every one after.
    pub fn fail_after(&mut self, successes: usize) {
        self.remaining_successes = Some(successes);
    }

    /// Undo [`fail_after`](Self::fail_after).
    pub fn stop_failing(&mut self) {
        self.remaining_successes = None;
    }

    /// Allocate a frame, panicking if that is impossible.
    pub fn alloc_page(&mut self) -> PhysicalPage<Size4K> {
        self.alloc_4k().expect("test frame allocator exhausted")
    }
}

impl FrameAlloc for TestFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if let Some(remaining) = self.remaining_successes.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let frame = self.free.pop()?;
        self.in_use.insert(frame.frame_number());
        Some(frame)
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        assert!(
            self.in_use.remove(&frame.frame_number()),
            "{frame} freed but not allocated"
        );
        self.free.push(frame);
    }
}

/// An [`Mmu`] that only records what it is asked to do.
pub struct RecordingMmu {
    active: Cell<RootPage>,
    loads: Cell<usize>,
    invalidated: RefCell<Vec<VirtualPage<Size4K>>>,
}

impl RecordingMmu {
    #[must_use]
    pub fn new(active: RootPage) -> Self {
        Self {
            active: Cell::new(active),
            loads: Cell::new(0),
            invalidated: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }

    /// Pages invalidated since the last call.
    pub fn take_invalidations(&self) -> Vec<VirtualPage<Size4K>> {
        self.invalidated.take()
    }
}

impl Mmu for RecordingMmu {
    fn load_root(&self, root: RootPage) {
        self.active.set(root);
        self.loads.set(self.loads.get() + 1);
    }

    fn active_root(&self) -> RootPage {
        self.active.get()
    }

    fn invalidate_page(&self, page: VirtualPage<Size4K>) {
        self.invalidated.borrow_mut().push(page);
    }
}

/// Simulated memory, allocator, MMU and a kernel address space that maps one
/// writable page at [`KERNEL_BASE`]. The kernel space is active initially.
pub struct TestMachine {
    pub memory: SimulatedMemory,
    pub frames: TestFrameAlloc,
    pub kernel: KernelAddressSpace,
    pub mmu: RecordingMmu,
}

impl TestMachine {
    #[must_use]
    pub fn new(frames: usize) -> Self {
        let memory = SimulatedMemory::new(frames);
        let mut alloc = TestFrameAlloc::new(frames);

        let kernel = {
            let mut builder =
                KernelAddressSpaceBuilder::new(&memory, &mut alloc).expect("kernel PML4");
            let image = alloc.alloc_page();
            builder
                .map_page(&mut alloc, VirtualAddress::new(KERNEL_BASE), image, true)
                .expect("kernel mapping");
            builder.finish()
        };

        let mmu = RecordingMmu::new(kernel.root_page());
        Self {
            memory,
            frames: alloc,
            kernel,
            mmu,
        }
    }
}
