//! Minimal in-memory file table backing the filesystem syscalls (14-21),
//! grounded in the teacher's `vfs::mock::MockFs` capability-table pattern
//! but reduced to what the syscall ABI actually needs: named byte blobs,
//! opened by handle, read/written/seeked/truncated/deleted.

use alloc::string::String;
use alloc::vec::Vec;
use spin::Mutex;
use crate::error::KernelError;

const MAX_FILES: usize = 64;
pub const MAX_NAME_LEN: usize = 64;
pub const MAX_PAYLOAD: usize = 4096;

struct FileEntry {
    name: String,
    data: Vec<u8>,
}

struct Ramfs {
    files: Vec<Option<FileEntry>>,
}

static RAMFS: Mutex<Option<Ramfs>> = Mutex::new(None);

pub fn init() {
    let mut files = Vec::with_capacity(MAX_FILES);
    for _ in 0..MAX_FILES {
        files.push(None);
    }
    *RAMFS.lock() = Some(Ramfs { files });
}

/// A process's capability over one open file (§4.D handle table).
#[derive(Debug, Clone, Copy)]
pub struct FileHandle {
    file_index: u32,
    pub offset: u32,
}

fn find_by_name(ramfs: &Ramfs, name: &str) -> Option<usize> {
    ramfs.files.iter().position(|f| matches!(f, Some(e) if e.name == name))
}

pub fn create(name: &str) -> Result<FileHandle, KernelError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(KernelError::InvalidArg);
    }
    let mut guard = RAMFS.lock();
    let ramfs = guard.as_mut().expect("ramfs not initialized");
    if let Some(idx) = find_by_name(ramfs, name) {
        return Ok(FileHandle { file_index: idx as u32, offset: 0 });
    }
    let slot = ramfs.files.iter().position(|f| f.is_none()).ok_or(KernelError::Exhausted)?;
    ramfs.files[slot] = Some(FileEntry { name: String::from(name), data: Vec::new() });
    Ok(FileHandle { file_index: slot as u32, offset: 0 })
}

pub fn open(name: &str) -> Result<FileHandle, KernelError> {
    let guard = RAMFS.lock();
    let ramfs = guard.as_ref().expect("ramfs not initialized");
    let idx = find_by_name(ramfs, name).ok_or(KernelError::NotFound)?;
    Ok(FileHandle { file_index: idx as u32, offset: 0 })
}

pub fn unlink(name: &str) -> Result<(), KernelError> {
    let mut guard = RAMFS.lock();
    let ramfs = guard.as_mut().expect("ramfs not initialized");
    let idx = find_by_name(ramfs, name).ok_or(KernelError::NotFound)?;
    ramfs.files[idx] = None;
    Ok(())
}

pub fn read(handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize, KernelError> {
    let n = buf.len().min(MAX_PAYLOAD);
    let guard = RAMFS.lock();
    let ramfs = guard.as_ref().expect("ramfs not initialized");
    let entry = ramfs.files[handle.file_index as usize].as_ref().ok_or(KernelError::NotFound)?;
    let start = handle.offset as usize;
    if start >= entry.data.len() {
        return Ok(0);
    }
    let end = (start + n).min(entry.data.len());
    buf[..end - start].copy_from_slice(&entry.data[start..end]);
    handle.offset += (end - start) as u32;
    Ok(end - start)
}

pub fn write(handle: &mut FileHandle, buf: &[u8]) -> Result<usize, KernelError> {
    let n = buf.len().min(MAX_PAYLOAD);
    let mut guard = RAMFS.lock();
    let ramfs = guard.as_mut().expect("ramfs not initialized");
    let entry = ramfs.files[handle.file_index as usize].as_mut().ok_or(KernelError::NotFound)?;
    let start = handle.offset as usize;
    if entry.data.len() < start + n {
        entry.data.resize(start + n, 0);
    }
    entry.data[start..start + n].copy_from_slice(&buf[..n]);
    handle.offset += n as u32;
    Ok(n)
}

pub fn seek(handle: &mut FileHandle, offset: u32) {
    handle.offset = offset;
}

pub fn truncate(handle: &FileHandle, len: u32) -> Result<(), KernelError> {
    let mut guard = RAMFS.lock();
    let ramfs = guard.as_mut().expect("ramfs not initialized");
    let entry = ramfs.files[handle.file_index as usize].as_mut().ok_or(KernelError::NotFound)?;
    entry.data.resize(len as usize, 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_write_then_read_round_trips() {
        init();
        let mut h = create("hello.txt").unwrap();
        assert_eq!(write(&mut h, b"hi").unwrap(), 2);
        h.offset = 0;
        let mut buf = [0u8; 8];
        let n = read(&mut h, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi");
    }

    #[test]
    fn open_missing_file_is_not_found() {
        init();
        assert_eq!(open("nope.txt").unwrap_err(), KernelError::NotFound);
    }
}
