//! Bounded user/kernel copy primitives (§4.F "Argument validation
//! discipline"). No handler dereferences a user pointer directly.
//!
//! Page-table-aware range checking is an external collaborator's job here
//! (the virtual-memory layer is out of scope, §1); this core validates
//! against the coarse user/kernel split instead: addresses below
//! [`USER_SPACE_CEILING`] are user-accessible, everything at or above it is
//! kernel-only. A real page-table walk would refine, never loosen, this.

use crate::error::KernelError;

/// Below this address is user space; at or above is kernel space. Matches
/// the conventional higher-half split for a 4-level x86-64 page table.
pub const USER_SPACE_CEILING: u64 = 0x0000_8000_0000_0000;

pub const MAX_IO_BYTES: usize = 512;
pub const MAX_TEXT_BYTES: usize = 256;

fn range_is_user_accessible(addr: u64, len: usize) -> bool {
    if addr == 0 {
        return false;
    }
    if len == 0 {
        return true;
    }
    let end = match addr.checked_add(len as u64) {
        Some(e) => e,
        None => return false,
    };
    addr < USER_SPACE_CEILING && end <= USER_SPACE_CEILING
}

/// Copies up to `dst.len()` bytes from `user_src` into `dst`.
pub fn copy_from_user(dst: &mut [u8], user_src: u64) -> Result<(), KernelError> {
    if !range_is_user_accessible(user_src, dst.len()) {
        return Err(KernelError::InvalidArg);
    }
    let src = unsafe { core::slice::from_raw_parts(user_src as *const u8, dst.len()) };
    dst.copy_from_slice(src);
    Ok(())
}

/// Copies `src` into `user_dst`.
pub fn copy_to_user(user_dst: u64, src: &[u8]) -> Result<(), KernelError> {
    if !range_is_user_accessible(user_dst, src.len()) {
        return Err(KernelError::InvalidArg);
    }
    let dst = unsafe { core::slice::from_raw_parts_mut(user_dst as *mut u8, src.len()) };
    dst.copy_from_slice(src);
    Ok(())
}

/// Bounded copy with mandatory NUL termination: reads at most `cap - 1`
/// bytes from `user_src`, stopping early at a NUL, and always writes a
/// terminating NUL into `dst[..cap]`. Returns the string length (excluding
/// the NUL).
pub fn copy_user_str(dst: &mut [u8], user_src: u64) -> Result<usize, KernelError> {
    if dst.is_empty() {
        return Err(KernelError::InvalidArg);
    }
    let cap = dst.len();
    if !range_is_user_accessible(user_src, cap) {
        return Err(KernelError::InvalidArg);
    }
    let src = unsafe { core::slice::from_raw_parts(user_src as *const u8, cap) };
    let len = src[..cap - 1].iter().position(|&b| b == 0).unwrap_or(cap - 1);
    dst[..len].copy_from_slice(&src[..len]);
    dst[len] = 0;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_address_is_rejected() {
        assert!(!range_is_user_accessible(USER_SPACE_CEILING, 1));
        assert!(!range_is_user_accessible(u64::MAX - 4, 8));
    }

    #[test]
    fn user_address_in_range_is_accepted() {
        assert!(range_is_user_accessible(0x1000, 64));
    }

    #[test]
    fn zero_length_range_is_accessible_for_a_nonnull_address() {
        assert!(range_is_user_accessible(0x1000, 0));
    }

    #[test]
    fn null_address_is_always_rejected() {
        assert!(!range_is_user_accessible(0, 0));
        assert!(!range_is_user_accessible(0, 8));
    }
}
