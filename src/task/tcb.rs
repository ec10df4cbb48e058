//! Task control block (§3 "Task control block").

use super::context::CpuContext;

pub const INVALID_TASK_ID: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    pub const INVALID: TaskId = TaskId(INVALID_TASK_ID);

    pub fn is_valid(self) -> bool {
        self.0 != INVALID_TASK_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Unused,
    Ready,
    Running,
    Blocked,
    Sleeping,
    Terminated,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        const USER_MODE = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    None,
    Exited,
    Faulted,
    Killed,
}

/// A task's region of owned stack memory. Ownership tracking only; the
/// allocator that backs it is an external collaborator (§1).
#[derive(Debug, Clone, Copy)]
pub struct StackRegion {
    pub bottom: u64,
    pub top: u64,
}

pub const HANDLE_TABLE_CAPACITY: usize = 16;

/// Per-process table of open RAMFS handles (§4.D ambient addition), owned
/// by whichever task carries `process_id == task_id` for that process.
#[derive(Debug, Clone, Copy)]
pub struct HandleTable {
    pub slots: [Option<crate::ramfs::FileHandle>; HANDLE_TABLE_CAPACITY],
}

impl HandleTable {
    pub const fn empty() -> Self {
        HandleTable { slots: [None; HANDLE_TABLE_CAPACITY] }
    }

    pub fn insert(&mut self, handle: crate::ramfs::FileHandle) -> Option<u32> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(handle);
                return Some(i as u32);
            }
        }
        None
    }

    pub fn get(&self, fd: u32) -> Option<&crate::ramfs::FileHandle> {
        self.slots.get(fd as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, fd: u32) -> Option<&mut crate::ramfs::FileHandle> {
        self.slots.get_mut(fd as usize).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, fd: u32) -> Option<crate::ramfs::FileHandle> {
        self.slots.get_mut(fd as usize).and_then(|s| s.take())
    }

    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}

pub struct Tcb {
    pub task_id: TaskId,
    pub process_id: TaskId,
    pub name: [u8; 16],
    pub priority: u8,
    pub flags: TaskFlags,
    pub state: TaskState,
    pub entry: u64,
    pub arg: u64,
    pub kernel_stack: StackRegion,
    pub user_stack: Option<StackRegion>,
    pub page_dir_phys: u64,
    pub context: CpuContext,
    pub exit_reason: ExitReason,
    pub fault_reason: u64,
    pub exit_code: i32,
    pub context_switches: u64,
    pub last_scheduled_tsc: u64,
    pub handles: HandleTable,
}

impl Tcb {
    pub fn unused() -> Self {
        Tcb {
            task_id: TaskId::INVALID,
            process_id: TaskId::INVALID,
            name: [0; 16],
            priority: 128,
            flags: TaskFlags::empty(),
            state: TaskState::Unused,
            entry: 0,
            arg: 0,
            kernel_stack: StackRegion { bottom: 0, top: 0 },
            user_stack: None,
            page_dir_phys: 0,
            context: CpuContext::empty(),
            exit_reason: ExitReason::None,
            fault_reason: 0,
            exit_code: 0,
            context_switches: 0,
            last_scheduled_tsc: 0,
            handles: HandleTable::empty(),
        }
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }
}
