//! TTY input path backing the `read` syscall (§4.E "Wait queues (ambient)").
//!
//! A small ring buffer fed by whichever driver calls [`notify_input_ready`]
//! — the keyboard or serial IRQ handler are the only two legitimate
//! callers (§9 open question on wake-on-IRQ wiring).

use spin::Mutex;
use crate::sched::WaitQueue;

const RING_CAPACITY: usize = 256;

struct Ring {
    buf: [u8; RING_CAPACITY],
    head: usize,
    len: usize,
}

impl Ring {
    const fn new() -> Self {
        Ring { buf: [0; RING_CAPACITY], head: 0, len: 0 }
    }

    fn push(&mut self, byte: u8) {
        if self.len == RING_CAPACITY {
            // Drop the oldest byte; a slow reader should not stall the driver.
            self.head = (self.head + 1) % RING_CAPACITY;
            self.len -= 1;
        }
        let tail = (self.head + self.len) % RING_CAPACITY;
        self.buf[tail] = byte;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % RING_CAPACITY;
        self.len -= 1;
        Some(byte)
    }
}

static RING: Mutex<Ring> = Mutex::new(Ring::new());
static READERS: WaitQueue = WaitQueue::new();

/// Called by the keyboard or serial driver when a new byte is available.
pub fn notify_input_ready(byte: u8) {
    RING.lock().push(byte);
    READERS.wake_one();
}

/// Blocks the caller until at least one line (terminated by `\n`, or the
/// buffer fills) is available, then copies it into `buf`. Returns the
/// number of bytes written, excluding any terminator.
pub fn read_line(buf: &mut [u8]) -> usize {
    let mut n = 0;
    loop {
        while n < buf.len() {
            match RING.lock().pop() {
                Some(b'\n') => return n,
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        if n >= buf.len() {
            return n;
        }
        READERS.block_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_when_full() {
        let mut ring = Ring::new();
        for i in 0..(RING_CAPACITY + 10) {
            ring.push((i % 256) as u8);
        }
        assert_eq!(ring.len, RING_CAPACITY);
        // Oldest 10 bytes were evicted; the next pop is byte 10.
        assert_eq!(ring.pop(), Some(10u8));
    }

    #[test]
    fn push_then_pop_is_fifo() {
        let mut ring = Ring::new();
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), None);
    }
}
