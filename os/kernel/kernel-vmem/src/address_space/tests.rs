use super::*;
use crate::testing::TestMachine;
use kernel_info::memory::{KERNEL_BASE, USERSPACE_END};
use kernel_memory_addresses::VirtualPage;

const UPAGE: VirtualAddress = VirtualAddress::new(0x0000_0000_0804_8000);

fn page(va: u64) -> VirtualPage<Size4K> {
    VirtualPage::containing(VirtualAddress::new(va))
}

#[test]
fn set_then_get_round_trips_every_offset() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());

    space.set_page(&mut m.frames, UPAGE, kpage, true).unwrap();

    for offset in [0, 1, 0x7FF, 0xFFF] {
        assert_eq!(space.get_page(UPAGE + offset), Some(kpage + offset));
    }
    assert_eq!(space.get_page(UPAGE + 0x1000), None);
    space.destroy(&mut m.frames);
}

#[test]
fn writable_flag_controls_user_write_access() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let ro = UPAGE;
    let rw = UPAGE + 0x1000;
    let ro_page = m.memory.kernel_alias(m.frames.alloc_page());
    space.set_page(&mut m.frames, ro, ro_page, false).unwrap();
    let rw_page = m.memory.kernel_alias(m.frames.alloc_page());
    space.set_page(&mut m.frames, rw, rw_page, true).unwrap();

    assert!(space.resolve_user(ro, Access::Read).is_some());
    assert!(space.resolve_user(ro, Access::Write).is_none());
    assert!(space.resolve_user(rw + 0x10, Access::Write).is_some());
    space.destroy(&mut m.frames);
}

#[test]
fn clear_page_is_idempotent() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());
    space.set_page(&mut m.frames, UPAGE, kpage, true).unwrap();

    space.clear_page(&m.mmu, UPAGE);
    assert_eq!(space.get_page(UPAGE), None);
    space.clear_page(&m.mmu, UPAGE);
    assert_eq!(space.get_page(UPAGE), None);

    // Never mapped at all: still fine.
    space.clear_page(&m.mmu, UPAGE + 0x0020_0000);

    // The frame still belongs to the caller; clearing does not free it.
    let kframe = m.memory.to_physical(kpage).page::<Size4K>();
    m.frames.free_4k(kframe);
    space.destroy(&mut m.frames);
}

#[test]
fn clear_page_keeps_the_other_bits() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());
    space.set_page(&mut m.frames, UPAGE, kpage, true).unwrap();
    space.set_dirty(&m.mmu, UPAGE, true);

    space.clear_page(&m.mmu, UPAGE);

    let entry = *space.walker().lookup(space.root_page(), UPAGE).unwrap();
    assert!(!entry.present());
    assert!(entry.dirty() && entry.writable() && entry.user());
    assert!(space.is_dirty(UPAGE));

    m.frames.free_4k(m.memory.to_physical(kpage).page());
    space.destroy(&mut m.frames);
}

#[test]
fn out_of_memory_leaves_no_trace() {
    for successes in 0..3 {
        let mut m = TestMachine::new(64);
        let kernel_frames = m.frames.frames_in_use();
        let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
        let kframe = m.frames.alloc_page();
        let before = m.frames.free_frames();

        m.frames.fail_after(successes);
        let err = space
            .set_page(&mut m.frames, UPAGE, m.memory.kernel_alias(kframe), true)
            .unwrap_err();
        m.frames.stop_failing();

        let expected = [TableLevel::Pdpt, TableLevel::Pd, TableLevel::Pt][successes];
        assert_eq!(err, MapError::OutOfMemory(expected));
        assert_eq!(m.frames.free_frames(), before);
        assert_eq!(space.get_page(UPAGE), None);

        let flow: core::ops::ControlFlow<()> =
            space.for_each_user_leaf(|_, _| core::ops::ControlFlow::Break(()));
        assert!(flow.is_continue());

        m.frames.free_4k(kframe);
        space.destroy(&mut m.frames);
        assert_eq!(m.frames.frames_in_use(), kernel_frames);
    }
}

#[test]
fn create_reports_out_of_memory() {
    let mut m = TestMachine::new(64);
    m.frames.fail_after(0);
    let before = m.frames.free_frames();
    let result = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel);
    assert!(matches!(result, Err(AddressSpaceError::OutOfMemory)));
    assert_eq!(m.frames.free_frames(), before);
}

#[test]
fn kernel_mappings_are_inherited() {
    let mut m = TestMachine::new(64);
    let kernel = m.kernel.view(&m.memory);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();

    let image = VirtualAddress::new(KERNEL_BASE + 0x123);
    assert!(kernel.translate(image).is_some());
    assert_eq!(space.translate(image), kernel.translate(image));

    // Every kernel PML4 slot is a verbatim copy.
    let ours = space.walker().table_mut(space.root_page());
    let theirs = space.walker().table_mut(m.kernel.root_page());
    for i in 256..512 {
        assert_eq!(ours.get(TableIndex::new(i)), theirs.get(TableIndex::new(i)));
    }

    // Kernel pages are not reachable from user mode.
    assert!(space.resolve_user(image, Access::Read).is_none());
    space.destroy(&mut m.frames);
}

#[test]
fn destroy_returns_every_frame() {
    let mut m = TestMachine::new(128);
    let before = m.frames.free_frames();
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();

    // Spread over different PML4, PDPT and PD slots.
    let pages = [
        0x0000_0000_0040_0000_u64,
        0x0000_0000_0040_1000,
        0x0000_0000_4000_0000,
        0x0000_0080_0000_0000,
        0x0000_7FFF_FFFF_F000,
    ];
    for &p in &pages {
        let kpage = m.memory.kernel_alias(m.frames.alloc_page());
        space
            .set_page(&mut m.frames, VirtualAddress::new(p), kpage, true)
            .unwrap();
    }
    assert!(m.frames.free_frames() < before);

    space.destroy(&mut m.frames);
    assert_eq!(m.frames.free_frames(), before);

    // The kernel's tables are untouched and still resolve.
    let kernel = m.kernel.view(&m.memory);
    assert!(kernel.translate(VirtualAddress::new(KERNEL_BASE)).is_some());
}

#[test]
fn destroy_of_none_is_a_no_op() {
    let mut m = TestMachine::new(16);
    let before = m.frames.free_frames();
    AddressSpace::<crate::testing::SimulatedMemory>::destroy_opt(None, &mut m.frames);
    assert_eq!(m.frames.free_frames(), before);
}

#[test]
fn dirty_and_accessed_are_independent() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());
    space.set_page(&mut m.frames, UPAGE, kpage, true).unwrap();

    assert!(!space.is_dirty(UPAGE));
    assert!(!space.is_accessed(UPAGE));

    space.set_dirty(&m.mmu, UPAGE, true);
    assert!(space.is_dirty(UPAGE));
    assert!(!space.is_accessed(UPAGE));

    space.set_accessed(&m.mmu, UPAGE, true);
    space.set_dirty(&m.mmu, UPAGE, false);
    assert!(!space.is_dirty(UPAGE));
    assert!(space.is_accessed(UPAGE));
    space.destroy(&mut m.frames);
}

#[test]
fn unmapped_pages_are_neither_dirty_nor_accessed() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    assert!(!space.is_dirty(UPAGE));
    assert!(!space.is_accessed(UPAGE));

    // No leaf entry to update: nothing happens, nothing is invalidated.
    space.set_dirty(&m.mmu, UPAGE, true);
    assert!(!space.is_dirty(UPAGE));
    assert!(m.mmu.take_invalidations().is_empty());
    space.destroy(&mut m.frames);
}

#[test]
fn only_the_active_space_invalidates() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());
    space.set_page(&mut m.frames, UPAGE, kpage, true).unwrap();

    // Kernel space is active.
    space.set_dirty(&m.mmu, UPAGE, true);
    space.set_accessed(&m.mmu, UPAGE, true);
    assert!(m.mmu.take_invalidations().is_empty());

    space.activate(&m.mmu);
    space.set_dirty(&m.mmu, UPAGE, false);
    assert_eq!(m.mmu.take_invalidations(), [page(UPAGE.as_u64())]);
    space.set_accessed(&m.mmu, UPAGE + 0x10, false);
    assert_eq!(m.mmu.take_invalidations(), [page(UPAGE.as_u64())]);
    space.clear_page(&m.mmu, UPAGE);
    assert_eq!(m.mmu.take_invalidations(), [page(UPAGE.as_u64())]);

    m.kernel.activate(&m.mmu);
    m.frames.free_4k(m.memory.to_physical(kpage).page());
    space.destroy(&mut m.frames);
}

#[test]
fn activate_without_a_space_loads_the_kernel_root() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();

    activate_or_kernel(&m.mmu, Some(&space), &m.kernel);
    assert_eq!(m.mmu.active_root(), space.root_page());

    activate_or_kernel::<crate::testing::SimulatedMemory, _>(&m.mmu, None, &m.kernel);
    assert_eq!(m.mmu.active_root(), m.kernel.root_page());
    assert_eq!(m.mmu.load_count(), 2);
    space.destroy(&mut m.frames);
}

#[test]
fn resolve_user_rejects_kernel_and_unmapped_addresses() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    assert!(space.resolve_user(VirtualAddress::new(USERSPACE_END), Access::Read).is_none());
    assert!(space.resolve_user(UPAGE, Access::Read).is_none());
    assert!(space.resolve_user(VirtualAddress::zero(), Access::Read).is_none());
    space.destroy(&mut m.frames);
}

#[test]
#[should_panic(expected = "is not a user address")]
fn get_page_rejects_kernel_addresses() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let _ = space.get_page(VirtualAddress::new(KERNEL_BASE));
}

#[test]
#[should_panic(expected = "is not a user address")]
fn set_page_rejects_kernel_addresses() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());
    let _ = space.set_page(&mut m.frames, VirtualAddress::new(USERSPACE_END), kpage, true);
}

#[test]
#[should_panic(expected = "not page aligned")]
fn set_page_rejects_unaligned_pages() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());
    let _ = space.set_page(&mut m.frames, UPAGE + 8, kpage, true);
}

#[test]
#[should_panic(expected = "kernel address space is immutable")]
fn kernel_view_refuses_mappings() {
    let mut m = TestMachine::new(64);
    let kernel = m.kernel.view(&m.memory);
    let kpage = m.memory.kernel_alias(m.frames.alloc_page());
    let _ = kernel.set_page(&mut m.frames, UPAGE, kpage, true);
}

#[test]
#[should_panic(expected = "must never be destroyed")]
fn kernel_view_refuses_destruction() {
    let mut m = TestMachine::new(64);
    let kernel = m.kernel.view(&m.memory);
    kernel.destroy(&mut m.frames);
}

#[test]
#[should_panic(expected = "kernel address space is immutable")]
fn kernel_view_refuses_dirty_updates() {
    let m = TestMachine::new(16);
    let kernel = m.kernel.view(&m.memory);
    kernel.set_dirty(&m.mmu, UPAGE, true);
}

#[test]
#[should_panic(expected = "kernel address space is immutable")]
fn kernel_view_refuses_accessed_updates() {
    let m = TestMachine::new(16);
    let kernel = m.kernel.view(&m.memory);
    kernel.set_accessed(&m.mmu, UPAGE, true);
}

#[test]
#[should_panic(expected = "kernel address space is immutable")]
fn kernel_view_refuses_unmapping() {
    let m = TestMachine::new(16);
    let kernel = m.kernel.view(&m.memory);
    kernel.clear_page(&m.mmu, UPAGE);
}

#[test]
#[should_panic(expected = "is not a user address")]
fn user_spaces_refuse_kernel_dirty_updates() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    space.set_dirty(&m.mmu, VirtualAddress::new(KERNEL_BASE), true);
}

#[test]
fn kernel_entries_stay_untouched_by_user_updates() {
    let mut m = TestMachine::new(64);
    let space = AddressSpace::create(&m.memory, &mut m.frames, &m.kernel).unwrap();
    let kernel_page = VirtualAddress::new(KERNEL_BASE);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        space.set_accessed(&m.mmu, kernel_page, true);
    }));

    assert!(result.is_err());
    assert!(!space.is_accessed(kernel_page));
    assert!(!m.kernel.view(&m.memory).is_accessed(kernel_page));
    space.destroy(&mut m.frames);
}

#[test]
fn kernel_space_is_installed_once() {
    let m = TestMachine::new(16);
    let installed = install_kernel_space(m.kernel).unwrap();
    assert_eq!(installed.root_page(), m.kernel.root_page());
    assert_eq!(kernel_space(), Some(installed));

    let other = TestMachine::new(16).kernel;
    assert_eq!(install_kernel_space(other), Err(other));
    assert_eq!(kernel_space().map(KernelAddressSpace::root_page), Some(m.kernel.root_page()));
}
