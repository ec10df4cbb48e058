//! Exception classification and dispatch (§4.A, §7).
//!
//! A small, fixed table decides whether a vector is fatal (dumps the frame
//! and calls [`crate::panic::kernel_panic`]) or recoverable. Page faults are
//! the one exception that *could* resume cleanly (demand paging / CoW), but
//! that machinery is an external collaborator here (§1) — this core treats
//! every page fault as fatal, which is a conservative, always-safe default.

use super::frame::InterruptFrame;
use super::idt::vector_name;

/// Vectors the core always treats as an unrecoverable CPU fault.
/// Breakpoint (3) is handled separately and is never fatal.
fn is_fatal(vector: u64) -> bool {
    matches!(vector, 0..=20) && vector != 3
}

pub fn handle(frame: &mut InterruptFrame) {
    let vector = frame.vector;

    if vector == 3 {
        // Breakpoint: logged and resumed, never fatal. Useful for itests.
        crate::log_info!("exception: breakpoint at {:#x}", { frame.rip });
        return;
    }

    if is_fatal(vector) {
        crate::log_error!(
            "fatal exception {} ({}) at cs:rip={:#x}:{:#x} err={:#x}",
            vector,
            vector_name(vector as u8),
            { frame.cs },
            { frame.rip },
            { frame.error_code },
        );
        crate::panic::kernel_panic_frame(frame, vector_name(vector as u8));
    } else {
        crate::log_warn!("unhandled exception vector {} ignored", vector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_fatal_vectors() {
        assert!(is_fatal(8)); // double fault
        assert!(is_fatal(13)); // general protection
        assert!(is_fatal(14)); // page fault
        assert!(!is_fatal(3)); // breakpoint handled separately anyway
    }
}
