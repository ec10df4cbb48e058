//! CPU/trap layer (§4.A): GDT/TSS/IST, the 256-entry IDT, and the raw stubs
//! that turn hardware traps into [`frame::InterruptFrame`] values.

pub mod exceptions;
pub mod frame;
pub mod gdt;
pub mod idt;
mod stubs;

pub use frame::InterruptFrame;
pub use idt::{IRQ_BASE, IRQ_COUNT, SYSCALL_VECTOR};

/// Brings up the CPU/trap layer: GDT+TSS+IST stacks, then the IDT.
pub fn init() {
    gdt::init();
    idt::init();
}
