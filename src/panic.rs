//! The sole diverging path (§7, §9 "exceptions for control flow — not used").
//!
//! Painting tracked pages with `0x69` is the allocator's job (an external
//! collaborator, §1); this module's contract ends at logging the reason and
//! halting the CPU forever.

use crate::trap::InterruptFrame;

/// Logs `reason` and halts. Called by any component that cannot safely
/// resume: frame-integrity failures, APIC/IOAPIC init failures, the
/// solvency check, and fatal CPU exceptions.
pub fn kernel_panic(reason: core::fmt::Arguments) -> ! {
    crate::log_error!("kernel_panic: {}", reason);
    halt_forever()
}

/// Same as [`kernel_panic`] but also dumps the interrupt frame that was
/// live when the decision to panic was made.
pub fn kernel_panic_frame(frame: &InterruptFrame, reason: &str) -> ! {
    crate::log_error!(
        "kernel_panic: {} | vector={} rip={:#x} cs={:#x} rsp={:#x} ss={:#x} rflags={:#x}",
        reason,
        { frame.vector },
        { frame.rip },
        { frame.cs },
        { frame.rsp },
        { frame.ss },
        { frame.rflags },
    );
    halt_forever()
}

/// Disables interrupts and spins on `hlt` forever. Also the target of the
/// `halt` syscall (§6, `№ 23`).
pub fn halt_forever() -> ! {
    crate::cpu::cli();
    loop {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

#[cfg(not(test))]
#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    crate::log_error!("rust panic: {}", info);
    halt_forever()
}
