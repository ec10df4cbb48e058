//! RSDP → RSDT/XSDT → MADT parsing (§4.B).
//!
//! Grounded in the RSDP/MADT struct shapes used by ACPI-capable kernels in
//! the broader example pack (the teacher carries no APIC/ACPI code at all;
//! this module's shapes follow the sibling `brianmayclone-anyos` kernel's
//! `arch::x86::acpi` driver, adapted to read tables through the Limine HHDM
//! rather than a private virtual-memory window).

use alloc::vec::Vec;
use crate::error::ApicError;

#[repr(C, packed)]
struct Rsdp {
    signature: [u8; 8],
    checksum: u8,
    oem_id: [u8; 6],
    revision: u8,
    rsdt_address: u32,
    // ACPI 2.0+ fields (only valid when revision >= 2):
    length: u32,
    xsdt_address: u64,
    extended_checksum: u8,
    reserved: [u8; 3],
}

#[repr(C, packed)]
struct SdtHeader {
    signature: [u8; 4],
    length: u32,
    revision: u8,
    checksum: u8,
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
    oem_revision: u32,
    creator_id: u32,
    creator_revision: u32,
}

const MADT_ENTRY_LOCAL_APIC: u8 = 0;
const MADT_ENTRY_IO_APIC: u8 = 1;
const MADT_ENTRY_SOURCE_OVERRIDE: u8 = 2;

#[derive(Debug, Clone, Copy)]
pub struct IoApicDescriptor {
    pub id: u8,
    pub phys_addr: u32,
    pub gsi_base: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceOverride {
    pub bus: u8,
    pub legacy_irq: u8,
    pub gsi: u32,
    pub flags: u16,
}

pub struct MadtInfo {
    pub local_apic_phys: u32,
    pub io_apics: Vec<IoApicDescriptor>,
    pub overrides: Vec<SourceOverride>,
}

fn checksum_ok(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

unsafe fn bytes_at<'a>(addr: u64, len: usize) -> &'a [u8] {
    unsafe { core::slice::from_raw_parts(addr as *const u8, len) }
}

fn validate_rsdp(hhdm_offset: u64, rsdp_phys: u64) -> Result<Rsdp, ApicError> {
    let virt = hhdm_offset + rsdp_phys;
    let rsdp = unsafe { core::ptr::read_unaligned(virt as *const Rsdp) };
    if &rsdp.signature != b"RSD PTR " {
        return Err(ApicError::RsdpMissing);
    }
    // Revision 0 checksums the first 20 bytes; revision >= 2 checksums all 36.
    let len = if rsdp.revision >= 2 { 36 } else { 20 };
    let bytes = unsafe { bytes_at(virt, len) };
    if !checksum_ok(bytes) {
        return Err(ApicError::RsdpChecksum);
    }
    Ok(rsdp)
}

fn header_at(hhdm_offset: u64, phys: u64) -> (SdtHeader, u64) {
    let virt = hhdm_offset + phys;
    let header = unsafe { core::ptr::read_unaligned(virt as *const SdtHeader) };
    (header, virt)
}

fn find_madt(hhdm_offset: u64, rsdp: &Rsdp) -> Result<(u64, u32), ApicError> {
    if rsdp.revision >= 2 && rsdp.xsdt_address != 0 {
        if let Some(found) = scan_sdt_list(hhdm_offset, rsdp.xsdt_address, 8) {
            return Ok(found);
        }
    }
    if let Some(found) = scan_sdt_list(hhdm_offset, rsdp.rsdt_address as u64, 4) {
        return Ok(found);
    }
    Err(ApicError::MadtMissing)
}

/// Walks an RSDT (4-byte pointers) or XSDT (8-byte pointers) looking for
/// the `"APIC"` (MADT) signature. Returns `(table_phys_addr, table_length)`.
fn scan_sdt_list(hhdm_offset: u64, sdt_phys: u64, ptr_size: usize) -> Option<(u64, u32)> {
    if sdt_phys == 0 {
        return None;
    }
    let (header, virt) = header_at(hhdm_offset, sdt_phys);
    let bytes = unsafe { bytes_at(virt, header.length as usize) };
    if !checksum_ok(bytes) {
        return None;
    }
    let entries_start = virt + core::mem::size_of::<SdtHeader>() as u64;
    let entries_len = header.length as usize - core::mem::size_of::<SdtHeader>();
    let count = entries_len / ptr_size;
    for i in 0..count {
        let entry_ptr = entries_start + (i * ptr_size) as u64;
        let table_phys = if ptr_size == 8 {
            unsafe { core::ptr::read_unaligned(entry_ptr as *const u64) }
        } else {
            unsafe { core::ptr::read_unaligned(entry_ptr as *const u32) as u64 }
        };
        let (sub_header, _) = header_at(hhdm_offset, table_phys);
        if &sub_header.signature == b"APIC" {
            return Some((table_phys, sub_header.length));
        }
    }
    None
}

/// Locates and parses the MADT, returning local-APIC address, IOAPICs, and
/// interrupt source overrides. Requires the HHDM offset and RSDP physical
/// address supplied by the boot protocol.
pub fn parse_madt(hhdm_offset: u64, rsdp_phys: u64) -> Result<MadtInfo, ApicError> {
    let rsdp = validate_rsdp(hhdm_offset, rsdp_phys)?;
    let (madt_phys, madt_len) = find_madt(hhdm_offset, &rsdp)?;
    let virt = hhdm_offset + madt_phys;
    let bytes = unsafe { bytes_at(virt, madt_len as usize) };
    if !checksum_ok(bytes) {
        return Err(ApicError::MadtChecksum);
    }

    // MADT body: u32 local_apic_addr, u32 flags, then a TLV entry stream.
    let local_apic_phys = u32::from_le_bytes(bytes[36..40].try_into().unwrap());

    let mut io_apics = Vec::new();
    let mut overrides = Vec::new();
    let mut offset = 44usize;
    while offset + 2 <= bytes.len() {
        let entry_type = bytes[offset];
        let entry_len = bytes[offset + 1] as usize;
        if entry_len == 0 || offset + entry_len > bytes.len() {
            break;
        }
        match entry_type {
            MADT_ENTRY_IO_APIC => {
                if io_apics.len() < 8 {
                    let id = bytes[offset + 2];
                    let phys_addr = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
                    let gsi_base = u32::from_le_bytes(bytes[offset + 8..offset + 12].try_into().unwrap());
                    io_apics.push(IoApicDescriptor { id, phys_addr, gsi_base });
                }
            }
            MADT_ENTRY_SOURCE_OVERRIDE => {
                if overrides.len() < 32 {
                    let bus = bytes[offset + 2];
                    let legacy_irq = bytes[offset + 3];
                    let gsi = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
                    let flags = u16::from_le_bytes(bytes[offset + 8..offset + 10].try_into().unwrap());
                    overrides.push(SourceOverride { bus, legacy_irq, gsi, flags });
                }
            }
            MADT_ENTRY_LOCAL_APIC => {}
            _ => {}
        }
        offset += entry_len;
    }

    if io_apics.len() >= 8 {
        return Err(ApicError::IoApicTableFull);
    }

    Ok(MadtInfo { local_apic_phys, io_apics, overrides })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_accepts_zero_sum_bytes() {
        assert!(checksum_ok(&[0x01, 0xFF]));
        assert!(!checksum_ok(&[0x01, 0x02]));
    }
}
