//! Interrupt controller bring-up (§4.B): legacy PIC quiesce, local APIC
//! enable, ACPI/MADT discovery, and IOAPIC redirection setup.

pub mod acpi;
pub mod ioapic;
pub mod local_apic;
pub mod pic;

use crate::error::ApicError;
use ioapic::IoApicTable;
use local_apic::LocalApic;

pub struct InterruptControllers {
    pub local: LocalApic,
    pub io: IoApicTable,
}

/// Brings the interrupt-routing hardware fully under IDT control:
/// 1. Quiesce the legacy PIC so it cannot deliver a stray vector.
/// 2. Enable and configure the local APIC.
/// 3. Parse ACPI's MADT for the IOAPIC list and source overrides.
/// 4. Map every IOAPIC and record its redirection-table size.
///
/// `hhdm_offset` and `rsdp_phys` come from the Limine boot protocol.
pub fn init(hhdm_offset: u64, rsdp_phys: u64) -> Result<InterruptControllers, ApicError> {
    pic::quiesce();

    let local = local_apic::init(hhdm_offset)?;
    let madt = acpi::parse_madt(hhdm_offset, rsdp_phys)?;
    let io = ioapic::init(hhdm_offset, &madt.io_apics, &madt.overrides);

    crate::log_info!("apic: interrupt controllers ready");
    Ok(InterruptControllers { local, io })
}
