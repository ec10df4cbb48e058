//! Legacy 8259 PIC quiesce (§4.B).
//!
//! The PIC is remapped off the CPU exception vectors (0-31) and then masked
//! in full — it is never used as an interrupt source once the APIC/IOAPIC
//! path is live. Uses the `pic8259` crate the same way the rest of the
//! pack's PIC-only kernels do for the remap step.

use pic8259::ChainedPics;
use spin::Mutex;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;
const PIC_EOI: u8 = 0x20;

static PICS: Mutex<ChainedPics> = Mutex::new(unsafe { ChainedPics::new(0x20, 0x28) });

/// Remaps both PICs away from the CPU exception range, then masks every
/// line and sends a spurious EOI to each command port so any interrupt
/// already in flight is acknowledged rather than left pending.
pub fn quiesce() {
    unsafe {
        PICS.lock().initialize();
        write_port_u8(PIC1_DATA, 0xFF);
        write_port_u8(PIC2_DATA, 0xFF);
        write_port_u8(PIC1_COMMAND, PIC_EOI);
        write_port_u8(PIC2_COMMAND, PIC_EOI);
    }
    crate::log_info!("pic: remapped to 0x20/0x28 and fully masked");
}

unsafe fn write_port_u8(port: u16, value: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
    }
}
