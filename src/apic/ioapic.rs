//! IOAPIC redirection table management (§4.B).
//!
//! Grounded in `brianmayclone-anyos`'s `arch::x86::ioapic` dual-register
//! index/window protocol, adapted to the HHDM and to this kernel's
//! `IoApicDescriptor`/`SourceOverride` shapes from [`super::acpi`].

use super::acpi::{IoApicDescriptor, SourceOverride};

const REGSEL: usize = 0x00;
const IOWIN: usize = 0x10;

const IOAPICVER: u32 = 0x01;
const IOREDTBL_BASE: u32 = 0x10;

const REDIR_MASKED: u64 = 1 << 16;
const REDIR_LEVEL_TRIGGERED: u64 = 1 << 15;
const REDIR_ACTIVE_LOW: u64 = 1 << 13;

const MAX_CONTROLLERS: usize = 8;

struct Controller {
    virt_base: u64,
    gsi_base: u32,
    max_entry: u32,
}

pub struct IoApicTable {
    controllers: [Option<Controller>; MAX_CONTROLLERS],
    overrides: alloc::vec::Vec<SourceOverride>,
}

impl IoApicTable {
    unsafe fn select(&self, ctrl: &Controller, index: u32) {
        unsafe {
            core::ptr::write_volatile((ctrl.virt_base as usize + REGSEL) as *mut u32, index);
        }
    }

    unsafe fn read(&self, ctrl: &Controller, index: u32) -> u32 {
        unsafe {
            self.select(ctrl, index);
            core::ptr::read_volatile((ctrl.virt_base as usize + IOWIN) as *const u32)
        }
    }

    unsafe fn write(&self, ctrl: &Controller, index: u32, value: u32) {
        unsafe {
            self.select(ctrl, index);
            core::ptr::write_volatile((ctrl.virt_base as usize + IOWIN) as *mut u32, value);
        }
    }

    fn controller_for_gsi(&self, gsi: u32) -> Option<&Controller> {
        self.controllers
            .iter()
            .filter_map(|c| c.as_ref())
            .find(|c| gsi >= c.gsi_base && gsi <= c.gsi_base + c.max_entry)
    }

    /// Maps a legacy ISA IRQ line (0-15) to a GSI, honoring any interrupt
    /// source override, and falling back to the identity mapping.
    pub fn legacy_irq_to_gsi(&self, legacy_irq: u8) -> (u32, bool, bool) {
        for o in &self.overrides {
            if o.legacy_irq == legacy_irq {
                let active_low = o.flags & 0b11 == 0b11;
                let level_triggered = (o.flags >> 2) & 0b11 == 0b11;
                return (o.gsi, active_low, level_triggered);
            }
        }
        (legacy_irq as u32, false, false)
    }

    /// Writes a redirection entry routing `gsi` to `vector` on `dest_apic_id`.
    /// High dword (destination) is written before the low dword, so the
    /// entry stays masked until the vector is fully programmed.
    pub fn route(&self, gsi: u32, vector: u8, dest_apic_id: u8, active_low: bool, level_triggered: bool) -> Result<(), crate::error::ApicError> {
        let ctrl = self.controller_for_gsi(gsi).ok_or(crate::error::ApicError::IoApicTableFull)?;
        let pin = gsi - ctrl.gsi_base;
        let index = IOREDTBL_BASE + pin * 2;

        let mut low = vector as u64;
        if active_low {
            low |= REDIR_ACTIVE_LOW;
        }
        if level_triggered {
            low |= REDIR_LEVEL_TRIGGERED;
        }
        low |= REDIR_MASKED;
        let high = (dest_apic_id as u64) << 56;

        unsafe {
            self.write(ctrl, index + 1, (high >> 32) as u32);
            self.write(ctrl, index, low as u32);
            // Unmask now that vector and destination are both committed.
            self.write(ctrl, index, (low & !REDIR_MASKED) as u32);
        }
        Ok(())
    }

    pub fn mask(&self, gsi: u32) {
        if let Some(ctrl) = self.controller_for_gsi(gsi) {
            let pin = gsi - ctrl.gsi_base;
            let index = IOREDTBL_BASE + pin * 2;
            unsafe {
                let low = self.read(ctrl, index);
                self.write(ctrl, index, low | REDIR_MASKED as u32);
            }
        }
    }
}

/// Maps every IOAPIC from the MADT through the HHDM and records its
/// redirection-table size by reading `IOAPICVER`.
pub fn init(hhdm_offset: u64, descriptors: &[IoApicDescriptor], overrides: &[SourceOverride]) -> IoApicTable {
    let mut controllers: [Option<Controller>; MAX_CONTROLLERS] = Default::default();
    for (slot, desc) in controllers.iter_mut().zip(descriptors.iter()) {
        let virt_base = hhdm_offset + desc.phys_addr as u64;
        let ver = unsafe {
            core::ptr::write_volatile((virt_base as usize + REGSEL) as *mut u32, IOAPICVER);
            core::ptr::read_volatile((virt_base as usize + IOWIN) as *const u32)
        };
        let max_entry = (ver >> 16) & 0xFF;
        *slot = Some(Controller { virt_base, gsi_base: desc.gsi_base, max_entry });
    }
    let table = IoApicTable { controllers, overrides: overrides.to_owned() };
    crate::log_info!("ioapic: mapped {} controller(s), {} override(s)", descriptors.len(), overrides.len());
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_table() -> IoApicTable {
        IoApicTable { controllers: Default::default(), overrides: alloc::vec::Vec::new() }
    }

    #[test]
    fn legacy_irq_falls_back_to_identity_gsi() {
        let table = empty_table();
        let (gsi, active_low, level) = table.legacy_irq_to_gsi(5);
        assert_eq!(gsi, 5);
        assert!(!active_low);
        assert!(!level);
    }

    #[test]
    fn override_table_takes_precedence() {
        let mut table = empty_table();
        table.overrides.push(SourceOverride { bus: 0, legacy_irq: 0, gsi: 2, flags: 0 });
        let (gsi, _, _) = table.legacy_irq_to_gsi(0);
        assert_eq!(gsi, 2);
    }
}
