//! Timer, keyboard, and serial IRQ sources (§4.C, §9 "ambient" wait-queue
//! producers). Each is a zero-sized [`crate::irq::IrqHandler`] registered
//! once at boot; legacy PC IRQ numbering (0 = timer, 1 = keyboard, 4 =
//! COM1) is unchanged from the real hardware regardless of whether the
//! line arrives through the IOAPIC or the local APIC's own timer LVT.

use crate::irq::IrqHandler;
use crate::trap::InterruptFrame;
use x86_64::instructions::port::Port;

pub const IRQ_TIMER: u8 = 0;
pub const IRQ_KEYBOARD: u8 = 1;
pub const IRQ_SERIAL: u8 = 4;

pub struct TimerSource;

impl IrqHandler for TimerSource {
    fn handle(&self, _irq: u8, _frame: &mut InterruptFrame, _ctx: usize) {
        crate::sched::timer_tick();
    }
}

pub static TIMER_SOURCE: TimerSource = TimerSource;

/// PS/2 keyboard. Only scancode release events with a printable ASCII
/// mapping reach the console ring; everything else (modifiers, extended
/// scancodes) is consumed and dropped, not an error (§9 open question
/// about the TTY wait queue: this is the entire producer side of it).
pub struct KeyboardSource;

const SET1_TO_ASCII: [u8; 0x3A] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0,
    b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\',
    b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

impl IrqHandler for KeyboardSource {
    fn handle(&self, _irq: u8, _frame: &mut InterruptFrame, _ctx: usize) {
        let scancode = unsafe { Port::<u8>::new(0x60).read() };
        if scancode & 0x80 != 0 {
            return; // key release
        }
        if let Some(&ascii) = SET1_TO_ASCII.get(scancode as usize) {
            if ascii != 0 {
                crate::console::notify_input_ready(ascii);
            }
        }
    }
}

pub static KEYBOARD_SOURCE: KeyboardSource = KeyboardSource;

/// COM1 data-ready interrupt. Feeds the same console ring as the keyboard
/// (§4, "wait queues (ambient)": the TTY read path has exactly two
/// legitimate producers).
pub struct SerialSource;

impl IrqHandler for SerialSource {
    fn handle(&self, _irq: u8, _frame: &mut InterruptFrame, _ctx: usize) {
        let byte = unsafe { Port::<u8>::new(0x3F8).read() };
        crate::console::notify_input_ready(byte);
    }
}

pub static SERIAL_SOURCE: SerialSource = SerialSource;
