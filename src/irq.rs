//! IRQ line table and dispatch (§4.C).
//!
//! One entry per legacy IRQ line (0-15); the table is the single place that
//! knows how a line's vector maps onto an IOAPIC redirection entry.

use spin::Mutex;
use crate::apic::InterruptControllers;
use crate::error::IrqError;
use crate::trap::{InterruptFrame, IRQ_BASE, IRQ_COUNT};

/// Capability interface for IRQ handlers (§4.C ambient addition), in place
/// of a raw function pointer so a handler can carry its own state behind
/// `&'static dyn`.
pub trait IrqHandler: Sync {
    fn handle(&self, irq: u8, frame: &mut InterruptFrame, ctx: usize);
}

#[derive(Clone, Copy)]
struct Entry {
    handler: Option<&'static dyn IrqHandler>,
    ctx: usize,
    name: &'static str,
    count: u64,
    last_tsc: u64,
    warned_unhandled: bool,
}

impl Entry {
    const fn empty() -> Self {
        Entry { handler: None, ctx: 0, name: "", count: 0, last_tsc: 0, warned_unhandled: false }
    }
}

const SLOTS: usize = IRQ_COUNT as usize;

struct IrqTable {
    entries: [Entry; SLOTS],
    controllers: Option<InterruptControllers>,
}

static TABLE: Mutex<IrqTable> = Mutex::new(IrqTable {
    entries: [Entry::empty(); SLOTS],
    controllers: None,
});

/// Installs the interrupt controllers discovered during boot. Must run
/// before any `register` call that expects a live IOAPIC route.
pub fn attach_controllers(controllers: InterruptControllers) {
    TABLE.lock().controllers = Some(controllers);
}

/// Attaches `handler` to `irq` and unmasks the corresponding IOAPIC line.
pub fn register(irq: u8, handler: &'static dyn IrqHandler, ctx: usize, name: &'static str) -> Result<(), IrqError> {
    if irq as usize >= SLOTS {
        return Err(IrqError::OutOfRange);
    }
    let mut table = TABLE.lock();
    table.entries[irq as usize] = Entry { handler: Some(handler), ctx, name, count: 0, last_tsc: 0, warned_unhandled: false };

    if let Some(controllers) = &table.controllers {
        let (gsi, active_low, level) = controllers.io.legacy_irq_to_gsi(irq);
        let vector = IRQ_BASE + irq;
        let dest = controllers.local.id();
        controllers
            .io
            .route(gsi, vector, dest, active_low, level)
            .map_err(|_| IrqError::RouteUnavailable)?;
    }
    Ok(())
}

/// Masks `irq` at the IOAPIC (if routed) and detaches its handler.
pub fn unregister(irq: u8) -> Result<(), IrqError> {
    if irq as usize >= SLOTS {
        return Err(IrqError::OutOfRange);
    }
    let mut table = TABLE.lock();
    if let Some(controllers) = &table.controllers {
        let (gsi, _, _) = controllers.io.legacy_irq_to_gsi(irq);
        controllers.io.mask(gsi);
    }
    table.entries[irq as usize] = Entry::empty();
    Ok(())
}

/// Single entry point from the common IRQ stub (§4.C steps 1-9).
pub fn dispatch(frame: &mut InterruptFrame) {
    let vector = frame.vector;
    if vector < IRQ_BASE as u64 {
        crate::log_warn!("irq::dispatch called with non-irq vector {}", vector);
        return;
    }
    let irq = (vector - IRQ_BASE as u64) as u8;
    if irq as usize >= SLOTS {
        acknowledge();
        return;
    }

    let expected_cs = frame.cs;
    let expected_rip = frame.rip;

    let (handler, ctx) = {
        let mut table = TABLE.lock();
        let entry = &mut table.entries[irq as usize];
        match entry.handler {
            Some(h) => {
                entry.count += 1;
                entry.last_tsc = crate::cpu::read_tsc();
                (Some(h), entry.ctx)
            }
            None => {
                if !entry.warned_unhandled {
                    crate::log_warn!("irq {} ({}) has no handler, masking", irq, entry.name);
                    entry.warned_unhandled = true;
                }
                (None, 0)
            }
        }
    };

    match handler {
        Some(h) => h.handle(irq, frame, ctx),
        None => {
            let _ = unregister(irq);
        }
    }

    if frame.cs != expected_cs || frame.rip != expected_rip {
        crate::panic::kernel_panic_frame(frame, "IRQ: frame corrupted");
    }

    acknowledge();
    crate::sched::handle_post_irq(irq);
}

fn acknowledge() {
    let table = TABLE.lock();
    if let Some(controllers) = &table.controllers {
        controllers.local.end_of_interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler;
    impl IrqHandler for CountingHandler {
        fn handle(&self, _irq: u8, _frame: &mut InterruptFrame, _ctx: usize) {}
    }
    static HANDLER: CountingHandler = CountingHandler;

    #[test]
    fn register_rejects_out_of_range_line() {
        assert_eq!(register(200, &HANDLER, 0, "bogus"), Err(IrqError::OutOfRange));
    }

    #[test]
    fn unregister_rejects_out_of_range_line() {
        assert_eq!(unregister(200), Err(IrqError::OutOfRange));
    }
}
