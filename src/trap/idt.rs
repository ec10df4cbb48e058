//! IDT construction: 256 entries, IST assignment for fatal vectors (§4.A).

use core::arch::asm;
use core::mem::size_of;
use super::gdt::{self, selectors};
use super::stubs;

pub const IRQ_BASE: u8 = 32;
pub const IRQ_COUNT: u8 = 16;
pub const SYSCALL_VECTOR: u8 = 0x80;

const GATE_INTERRUPT: u8 = 0x8E; // present, DPL=0, 32/64-bit interrupt gate
const GATE_TRAP_USER: u8 = 0xEE; // present, DPL=3, 32/64-bit trap gate

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    zero: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry { offset_low: 0, selector: 0, ist: 0, type_attr: 0, offset_mid: 0, offset_high: 0, zero: 0 }
    }

    fn new(handler: unsafe extern "C" fn(), type_attr: u8, ist: u8) -> Self {
        let addr = handler as usize as u64;
        IdtEntry {
            offset_low: addr as u16,
            selector: selectors::KERNEL_CODE,
            ist,
            type_attr,
            offset_mid: (addr >> 16) as u16,
            offset_high: (addr >> 32) as u32,
            zero: 0,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u64,
}

const ENTRIES: usize = 256;
static mut IDT: [IdtEntry; ENTRIES] = [IdtEntry::missing(); ENTRIES];

/// Human name for a vector, used by panic output and post-IRQ logs (§4.A).
pub fn vector_name(vector: u8) -> &'static str {
    match vector {
        0 => "divide-error",
        1 => "debug",
        2 => "nmi",
        3 => "breakpoint",
        4 => "overflow",
        5 => "bound-range",
        6 => "invalid-opcode",
        7 => "device-not-available",
        8 => "double-fault",
        9 => "coprocessor-segment-overrun",
        10 => "invalid-tss",
        11 => "segment-not-present",
        12 => "stack-fault",
        13 => "general-protection",
        14 => "page-fault",
        16 => "x87-fpu-error",
        17 => "alignment-check",
        18 => "machine-check",
        19 => "simd-fp-exception",
        20 => "virtualization-exception",
        0x80 => "syscall",
        v if v >= IRQ_BASE && v < IRQ_BASE + IRQ_COUNT => "irq",
        _ => "reserved",
    }
}

macro_rules! set_exception {
    ($n:literal, $handler:expr) => {
        unsafe { IDT[$n] = IdtEntry::new($handler, GATE_INTERRUPT, 0) }
    };
    ($n:literal, $handler:expr, ist = $ist:expr) => {
        unsafe { IDT[$n] = IdtEntry::new($handler, GATE_INTERRUPT, $ist as u8) }
    };
}

/// Builds all 256 IDT entries and loads the table. Requires [`gdt::init`]
/// to have already run (selectors and IST stacks must exist).
pub fn init() {
    set_exception!(0, stubs::isr0);
    set_exception!(1, stubs::isr1);
    set_exception!(2, stubs::isr2, ist = gdt::IST_NMI);
    set_exception!(3, stubs::isr3);
    set_exception!(4, stubs::isr4);
    set_exception!(5, stubs::isr5);
    set_exception!(6, stubs::isr6);
    set_exception!(7, stubs::isr7);
    set_exception!(8, stubs::isr8, ist = gdt::IST_DOUBLE_FAULT);
    set_exception!(9, stubs::isr9);
    set_exception!(10, stubs::isr10);
    set_exception!(11, stubs::isr11);
    set_exception!(12, stubs::isr12, ist = gdt::IST_DOUBLE_FAULT);
    set_exception!(13, stubs::isr13);
    set_exception!(14, stubs::isr14);
    set_exception!(16, stubs::isr16);
    set_exception!(17, stubs::isr17);
    set_exception!(18, stubs::isr18, ist = gdt::IST_MACHINE_CHECK);
    set_exception!(19, stubs::isr19);
    set_exception!(20, stubs::isr20);

    macro_rules! set_irq {
        ($n:literal, $handler:expr) => {
            unsafe { IDT[(IRQ_BASE as usize) + $n] = IdtEntry::new($handler, GATE_INTERRUPT, 0) }
        };
    }
    set_irq!(0, stubs::irq0);
    set_irq!(1, stubs::irq1);
    set_irq!(2, stubs::irq2);
    set_irq!(3, stubs::irq3);
    set_irq!(4, stubs::irq4);
    set_irq!(5, stubs::irq5);
    set_irq!(6, stubs::irq6);
    set_irq!(7, stubs::irq7);
    set_irq!(8, stubs::irq8);
    set_irq!(9, stubs::irq9);
    set_irq!(10, stubs::irq10);
    set_irq!(11, stubs::irq11);
    set_irq!(12, stubs::irq12);
    set_irq!(13, stubs::irq13);
    set_irq!(14, stubs::irq14);
    set_irq!(15, stubs::irq15);

    unsafe {
        IDT[SYSCALL_VECTOR as usize] = IdtEntry::new(stubs::isr128, GATE_TRAP_USER, 0);
    }

    let ptr = IdtPointer {
        limit: (size_of::<IdtEntry>() * ENTRIES - 1) as u16,
        base: unsafe { core::ptr::addr_of!(IDT) as u64 },
    };
    unsafe {
        asm!("lidt [{}]", in(reg) &ptr, options(readonly, nostack, preserves_flags));
    }
    crate::log_info!("idt: loaded {} entries, syscall vector {:#x} dpl=3", ENTRIES, SYSCALL_VECTOR);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_names_cover_exceptions_irqs_and_syscall() {
        assert_eq!(vector_name(8), "double-fault");
        assert_eq!(vector_name(14), "page-fault");
        assert_eq!(vector_name(32), "irq");
        assert_eq!(vector_name(47), "irq");
        assert_eq!(vector_name(0x80), "syscall");
    }
}
