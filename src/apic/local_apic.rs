//! Local APIC detection and bring-up (§4.B).
//!
//! Grounded in the MSR/LVT layout used by `brianmayclone-anyos`'s
//! `arch::x86::apic` driver; read/written here through the Limine HHDM
//! rather than a dedicated MMIO window.

use crate::cpu;
use crate::error::ApicError;

const IA32_APIC_BASE_MSR: u32 = 0x1B;
const APIC_BASE_ENABLE: u64 = 1 << 11;
const APIC_BASE_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

// Register offsets within the 4 KiB local-APIC MMIO page.
const REG_ID: usize = 0x20;
const REG_EOI: usize = 0xB0;
const REG_SPURIOUS: usize = 0xF0;
const REG_ESR: usize = 0x280;
const REG_LVT_TIMER: usize = 0x320;
const REG_LVT_LINT0: usize = 0x350;
const REG_LVT_LINT1: usize = 0x360;
const REG_LVT_ERROR: usize = 0x370;
const REG_TIMER_INITIAL_COUNT: usize = 0x380;
const REG_TIMER_DIVIDE: usize = 0x3E0;

const LVT_MASKED: u32 = 1 << 16;
const LVT_TIMER_PERIODIC: u32 = 1 << 17;
const LVT_DELIVERY_EXTINT: u32 = 0b111 << 8;
const SPURIOUS_SOFTWARE_ENABLE: u32 = 1 << 8;
const SPURIOUS_VECTOR: u32 = 0xFF;
/// Divide-by-16, the teacher's chosen timer divisor.
const TIMER_DIVIDE_BY_16: u32 = 0b0011;

pub struct LocalApic {
    mmio_virt_base: u64,
}

impl LocalApic {
    unsafe fn read(&self, reg: usize) -> u32 {
        unsafe { core::ptr::read_volatile((self.mmio_virt_base as usize + reg) as *const u32) }
    }

    unsafe fn write(&self, reg: usize, value: u32) {
        unsafe { core::ptr::write_volatile((self.mmio_virt_base as usize + reg) as *mut u32, value) };
    }

    pub fn id(&self) -> u8 {
        (unsafe { self.read(REG_ID) } >> 24) as u8
    }

    pub fn end_of_interrupt(&self) {
        unsafe { self.write(REG_EOI, 0) };
    }

    /// Programs the timer LVT for periodic delivery on `vector`, counting
    /// down from `initial_count` at divide-by-16 (§4.B "LVT_TIMER
    /// configured for the chosen divisor"). The count is in bus-clock
    /// ticks and is not wall-clock calibrated (§9).
    pub fn configure_timer(&self, vector: u8, initial_count: u32) {
        unsafe {
            self.write(REG_TIMER_DIVIDE, TIMER_DIVIDE_BY_16);
            self.write(REG_LVT_TIMER, LVT_TIMER_PERIODIC | vector as u32);
            self.write(REG_TIMER_INITIAL_COUNT, initial_count);
        }
    }
}

/// CPUID(1).edx bit 9 reports local-APIC presence.
pub fn detect() -> bool {
    let result = cpu::cpuid(1);
    result.edx & (1 << 9) != 0
}

/// Reads the local-APIC base from its MSR, maps it through the HHDM, masks
/// every LVT entry, routes LINT0 as ExtINT (for the one-time PIC handoff),
/// clears the error register twice, and issues a settling EOI.
pub fn init(hhdm_offset: u64) -> Result<LocalApic, ApicError> {
    if !detect() {
        return Err(ApicError::NoLocalApic);
    }

    let base_msr = cpu::read_msr(IA32_APIC_BASE_MSR);
    let phys_base = base_msr & APIC_BASE_ADDR_MASK;
    let enabled = base_msr | APIC_BASE_ENABLE;
    unsafe { cpu::write_msr(IA32_APIC_BASE_MSR, enabled) };

    let apic = LocalApic { mmio_virt_base: hhdm_offset + phys_base };

    unsafe {
        apic.write(REG_LVT_TIMER, LVT_MASKED);
        apic.write(REG_LVT_LINT1, LVT_MASKED);
        apic.write(REG_LVT_ERROR, LVT_MASKED);
        apic.write(REG_LVT_LINT0, LVT_DELIVERY_EXTINT);
        apic.write(REG_ESR, 0);
        apic.write(REG_ESR, 0);
        apic.write(REG_SPURIOUS, SPURIOUS_SOFTWARE_ENABLE | SPURIOUS_VECTOR);
        apic.write(REG_EOI, 0);
    }

    crate::log_info!("local_apic: id={} base={:#x}", apic.id(), phys_base);
    Ok(apic)
}
