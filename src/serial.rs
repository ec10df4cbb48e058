//! Serial port driver (UART 16550) used as the kernel's sole log transport.

use core::fmt;
use spin::Mutex;
use x86_64::instructions::port::Port;

const COM1: u16 = 0x3F8;

const DATA: u16 = 0;
const INT_ENABLE: u16 = 1;
const FIFO_CTRL: u16 = 2;
const LINE_CTRL: u16 = 3;
const MODEM_CTRL: u16 = 4;
const LINE_STATUS: u16 = 5;
const DIVISOR_LSB: u16 = 0;
const DIVISOR_MSB: u16 = 1;

pub struct SerialPort {
    data: Port<u8>,
    int_enable: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_status: Port<u8>,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base + DATA),
            int_enable: Port::new(base + INT_ENABLE),
            fifo_ctrl: Port::new(base + FIFO_CTRL),
            line_ctrl: Port::new(base + LINE_CTRL),
            modem_ctrl: Port::new(base + MODEM_CTRL),
            line_status: Port::new(base + LINE_STATUS),
        }
    }

    /// 115200 baud, 8N1.
    unsafe fn init(&mut self) {
        self.int_enable.write(0x00);
        self.line_ctrl.write(0x80);
        Port::<u8>::new(COM1 + DIVISOR_LSB).write(0x01);
        Port::<u8>::new(COM1 + DIVISOR_MSB).write(0x00);
        self.line_ctrl.write(0x03);
        self.fifo_ctrl.write(0xC7);
        self.modem_ctrl.write(0x0B);
    }

    unsafe fn write_byte(&mut self, byte: u8) {
        while self.line_status.read() & 0x20 == 0 {}
        self.data.write(byte);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            unsafe { self.write_byte(byte) };
        }
        Ok(())
    }
}

static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

/// Bring up the COM1 transport. Must run before any `serial_println!`.
pub fn init() {
    unsafe { SERIAL1.lock().init() };
}

/// Writes one raw byte to COM1, used by the `write` syscall's console path.
pub fn write_byte(byte: u8) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        unsafe { SERIAL1.lock().write_byte(byte) };
    });
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    // Interrupt handlers log too, so the lock must never be held across a trap.
    x86_64::instructions::interrupts::without_interrupts(|| {
        SERIAL1.lock().write_fmt(args).ok();
    });
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}
