//! # Fault-Recovering User Access
//!
//! [`TrapProbe`] touches user memory directly through the active page
//! tables. If the access faults, the page-fault handler calls
//! [`recover_probe_fault`], which resumes execution after the faulting
//! instruction with `-1` in `rax`.
//!
//! Both probes load the address to resume at into `rax` before the access:
//!
//! ```text
//! get_user:                         put_user:
//!   lea   rax, [rip + 2f]             lea  rax, [rip + 2f]
//!   movzx rax, byte ptr [rdi]         mov  byte ptr [rdi], sil
//! 2:                                  xor  eax, eax
//!   ret                             2:
//!                                     ret
//! ```

use crate::user_memory::{UserFault, UserMemory};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::memory::is_user_vaddr;
use kernel_memory_addresses::VirtualAddress;

/// Set while a probe runs. There is one CPU, and probes do not nest.
static PROBE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Byte at `uaddr`, zero-extended, or `-1` if the read faulted.
#[unsafe(naked)]
unsafe extern "C" fn get_user(uaddr: *const u8) -> i64 {
    core::arch::naked_asm!(
        "lea rax, [rip + 2f]",
        "movzx rax, byte ptr [rdi]",
        "2:",
        "ret",
    )
}

/// `0` if `byte` was stored at `udst`, `-1` if the write faulted.
#[unsafe(naked)]
unsafe extern "C" fn put_user(udst: *mut u8, byte: u8) -> i64 {
    core::arch::naked_asm!(
        "lea rax, [rip + 2f]",
        "mov byte ptr [rdi], sil",
        "xor eax, eax",
        "2:",
        "ret",
    )
}

/// Upper bound on the distance from a probe's entry to its recovery label.
const PROBE_LEN: u64 = 16;

/// Whether `rip` lies between the entry of a probe and the recovery label
/// `label` that probe loaded.
fn faulted_at_access(rip: u64, label: u64) -> bool {
    [get_user as usize as u64, put_user as usize as u64]
        .into_iter()
        .any(|entry| entry <= rip && rip < label && label - entry <= PROBE_LEN)
}

/// Page-fault hook. Call it with the faulting context before treating a
/// fault as fatal.
///
/// If the fault was raised in kernel mode by the access inside a running
/// probe, `rip` is moved to the probe's recovery label (held in `rax`),
/// `rax` becomes `-1` and `true` is returned. Otherwise nothing changes.
pub fn recover_probe_fault(kernel_mode: bool, rip: &mut u64, rax: &mut u64) -> bool {
    if !kernel_mode || !PROBE_ACTIVE.load(Ordering::Acquire) {
        return false;
    }
    if !faulted_at_access(*rip, *rax) {
        return false;
    }
    *rip = *rax;
    *rax = u64::MAX;
    true
}

struct ActiveProbe;

impl ActiveProbe {
    fn enter() -> Self {
        let was_active = PROBE_ACTIVE.swap(true, Ordering::AcqRel);
        debug_assert!(!was_active, "user memory probes must not nest");
        Self
    }
}

impl Drop for ActiveProbe {
    fn drop(&mut self) {
        PROBE_ACTIVE.store(false, Ordering::Release);
    }
}

/// [`UserMemory`] through the live page tables of the current process.
pub struct TrapProbe {
    _private: (),
}

impl TrapProbe {
    /// # Safety
    /// The page-fault handler must call [`recover_probe_fault`], and the
    /// process whose memory is accessed must be the one loaded in CR3.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl UserMemory for TrapProbe {
    fn read_byte(&self, va: VirtualAddress) -> Result<u8, UserFault> {
        if !is_user_vaddr(va) {
            return Err(UserFault(va));
        }
        let _probe = ActiveProbe::enter();
        // SAFETY: faults are recovered by the page-fault handler.
        let value = unsafe { get_user(va.as_ptr()) };
        u8::try_from(value).map_err(|_| UserFault(va))
    }

    fn write_byte(&self, va: VirtualAddress, byte: u8) -> Result<(), UserFault> {
        if !is_user_vaddr(va) {
            return Err(UserFault(va));
        }
        let _probe = ActiveProbe::enter();
        // SAFETY: faults are recovered by the page-fault handler.
        match unsafe { put_user(va.as_mut_ptr(), byte) } {
            0 => Ok(()),
            _ => Err(UserFault(va)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// The probe flag is global.
    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn probes_access_mapped_memory() {
        let _guard = SERIAL.lock().unwrap();
        let mut cell = [0x5A_u8, 0xFF];
        unsafe {
            assert_eq!(get_user(cell.as_ptr()), 0x5A);
            assert_eq!(get_user(cell.as_ptr().add(1)), 0xFF);
            assert_eq!(put_user(cell.as_mut_ptr(), 7), 0);
        }
        assert_eq!(cell[0], 7);
    }

    #[test]
    fn faults_outside_a_probe_are_left_alone() {
        let _guard = SERIAL.lock().unwrap();
        let (mut rip, mut rax) = (0x1000, 0x2000);
        assert!(!recover_probe_fault(true, &mut rip, &mut rax));
        assert_eq!((rip, rax), (0x1000, 0x2000));
    }

    /// Address of the access instruction and of the recovery label, past
    /// the 7-byte `lea`.
    fn fault_context(entry: u64) -> (u64, u64) {
        (entry + 7, entry + 11)
    }

    #[test]
    fn kernel_faults_inside_a_probe_resume_at_the_label() {
        let _guard = SERIAL.lock().unwrap();
        let _probe = ActiveProbe::enter();

        for entry in [get_user as usize as u64, put_user as usize as u64] {
            let (access, label) = fault_context(entry);
            let (mut rip, mut rax) = (access, label);
            assert!(!recover_probe_fault(false, &mut rip, &mut rax), "user faults are not ours");
            assert!(recover_probe_fault(true, &mut rip, &mut rax));
            assert_eq!(rip, label);
            assert_eq!(rax.cast_signed(), -1);
        }
    }

    #[test]
    fn kernel_faults_outside_the_access_are_left_alone() {
        let _guard = SERIAL.lock().unwrap();
        let _probe = ActiveProbe::enter();

        let (_, label) = fault_context(get_user as usize as u64);
        let (mut rip, mut rax) = (0x1000, label);
        assert!(!recover_probe_fault(true, &mut rip, &mut rax));
        assert_eq!((rip, rax), (0x1000, label));

        let (mut rip, mut rax) = (0x1000, 0x2000);
        assert!(!recover_probe_fault(true, &mut rip, &mut rax));
        assert_eq!((rip, rax), (0x1000, 0x2000));
    }

    #[test]
    fn kernel_addresses_are_rejected_before_touching_them() {
        let _guard = SERIAL.lock().unwrap();
        let probe = unsafe { TrapProbe::new() };
        let va = VirtualAddress::new(kernel_info::memory::KERNEL_BASE);
        assert_eq!(probe.read_byte(va), Err(UserFault(va)));
        assert_eq!(probe.write_byte(va, 0), Err(UserFault(va)));
        assert!(!PROBE_ACTIVE.load(Ordering::Acquire));
    }
}
