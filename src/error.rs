//! Kernel-wide error taxonomy.
//!
//! Internal code threads `Result<T, KernelError>`. Only the syscall gateway
//! collapses this down to the wire's `(uint64_t)-1`; everywhere else the
//! specific kind survives into the log line.

use core::fmt;

/// The syscall gateway's error taxonomy (§7), reused as the crate-wide kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Bad pointer, zero length where required, geometry out of bounds.
    InvalidArg,
    /// fd or pending record not owned by the caller's process/task.
    NotOwned,
    /// Path or handle absent.
    NotFound,
    /// Framebuffer absent or similar missing external collaborator.
    Unsupported,
    /// A fixed-capacity table (tasks, handles, IOAPICs) is full.
    Exhausted,
    /// The CPU or a device did not behave as the driver expected.
    HardwareFault,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernelError::InvalidArg => "invalid argument",
            KernelError::NotOwned => "not owned by caller",
            KernelError::NotFound => "not found",
            KernelError::Unsupported => "unsupported",
            KernelError::Exhausted => "resource exhausted",
            KernelError::HardwareFault => "hardware fault",
        };
        f.write_str(s)
    }
}

/// IRQ-table local errors (§4.C). Converts into [`KernelError`] at the
/// boundary where a caller only understands the unified taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    OutOfRange,
    NotRegistered,
    RouteUnavailable,
}

impl fmt::Display for IrqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrqError::OutOfRange => "irq line out of range",
            IrqError::NotRegistered => "irq line not registered",
            IrqError::RouteUnavailable => "no ioapic route for irq line",
        };
        f.write_str(s)
    }
}

impl From<IrqError> for KernelError {
    fn from(e: IrqError) -> Self {
        match e {
            IrqError::OutOfRange => KernelError::InvalidArg,
            IrqError::NotRegistered => KernelError::NotFound,
            IrqError::RouteUnavailable => KernelError::Unsupported,
        }
    }
}

/// APIC/ACPI bring-up errors (§4.B). All are fatal at `init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApicError {
    NoLocalApic,
    RsdpMissing,
    RsdpChecksum,
    MadtMissing,
    MadtChecksum,
    IoApicTableFull,
}

impl fmt::Display for ApicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApicError::NoLocalApic => "no local apic present",
            ApicError::RsdpMissing => "rsdp not supplied by bootloader",
            ApicError::RsdpChecksum => "rsdp checksum mismatch",
            ApicError::MadtMissing => "madt not found in rsdt/xsdt",
            ApicError::MadtChecksum => "madt checksum mismatch",
            ApicError::IoApicTableFull => "ioapic descriptor table full",
        };
        f.write_str(s)
    }
}

impl From<ApicError> for KernelError {
    fn from(_: ApicError) -> Self {
        KernelError::HardwareFault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn kernel_error_display_is_nonempty() {
        for e in [
            KernelError::InvalidArg,
            KernelError::NotOwned,
            KernelError::NotFound,
            KernelError::Unsupported,
            KernelError::Exhausted,
            KernelError::HardwareFault,
        ] {
            assert!(!e.to_string().is_empty());
        }
    }

    #[test]
    fn irq_error_converts_to_kernel_error() {
        assert_eq!(KernelError::from(IrqError::OutOfRange), KernelError::InvalidArg);
        assert_eq!(KernelError::from(IrqError::NotRegistered), KernelError::NotFound);
        assert_eq!(KernelError::from(IrqError::RouteUnavailable), KernelError::Unsupported);
    }
}
