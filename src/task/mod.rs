//! Task model (§4.D): TCB arena, creation, and termination.

pub mod context;
pub mod tcb;

use spin::Mutex;
use tcb::{ExitReason, StackRegion, TaskFlags, TaskId, TaskState, Tcb};

pub const MAX_TASKS: usize = 64;
const KERNEL_STACK_SIZE: usize = 16 * 1024;

struct KernelStacks {
    storage: [[u8; KERNEL_STACK_SIZE]; MAX_TASKS],
}

static KERNEL_STACKS: Mutex<KernelStacks> = Mutex::new(KernelStacks { storage: [[0; KERNEL_STACK_SIZE]; MAX_TASKS] });

struct TaskTable {
    tasks: [Tcb; MAX_TASKS],
    next_id: u64,
}

static TABLE: Mutex<Option<TaskTable>> = Mutex::new(None);

pub fn init() {
    let tasks = core::array::from_fn(|_| Tcb::unused());
    *TABLE.lock() = Some(TaskTable { tasks, next_id: 1 });
}

fn name_bytes(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let n = name.len().min(15);
    out[..n].copy_from_slice(&name.as_bytes()[..n]);
    out
}

/// Allocates a TCB and kernel stack, and (for user tasks) records the user
/// stack and page directory; returns `INVALID_TASK_ID` on exhaustion
/// (§4.D `task_create` contract).
pub fn task_create(name: &str, entry: u64, arg: u64, priority: u8, flags: TaskFlags, user_stack: Option<StackRegion>, page_dir_phys: u64) -> TaskId {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("task table not initialized");

    let slot = match table.tasks.iter().position(|t| t.state == TaskState::Unused) {
        Some(s) => s,
        None => return TaskId::INVALID,
    };

    let task_id = TaskId(table.next_id);
    table.next_id += 1;

    let stack_top = {
        let stacks = KERNEL_STACKS.lock();
        let base = stacks.storage[slot].as_ptr() as u64;
        base + KERNEL_STACK_SIZE as u64
    };

    let context = if flags.contains(TaskFlags::USER_MODE) {
        let user = user_stack.expect("user task requires a user stack");
        context::CpuContext::new_user(entry, arg, user.top, page_dir_phys)
    } else {
        context::CpuContext::new_kernel(entry, arg, stack_top)
    };

    table.tasks[slot] = Tcb {
        task_id,
        process_id: task_id,
        name: name_bytes(name),
        priority,
        flags,
        state: TaskState::Ready,
        entry,
        arg,
        kernel_stack: StackRegion { bottom: stack_top - KERNEL_STACK_SIZE as u64, top: stack_top },
        user_stack,
        page_dir_phys,
        context,
        exit_reason: ExitReason::None,
        fault_reason: 0,
        exit_code: 0,
        context_switches: 0,
        last_scheduled_tsc: 0,
        handles: tcb::HandleTable::empty(),
    };

    task_id
}

/// Transitions `id` to `Terminated`, releases its stacks (by marking the
/// slot reusable), drops any pending fate record, closes its file handles,
/// and requests a schedule if it was the current task.
pub fn task_terminate(id: TaskId, reason: ExitReason, code: i32) {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("task table not initialized");
    if let Some(tcb) = table.tasks.iter_mut().find(|t| t.task_id == id) {
        tcb.exit_reason = reason;
        tcb.exit_code = code;
        tcb.state = TaskState::Terminated;
        tcb.handles.close_all();
    }
    drop(guard);

    crate::syscall::fate::clear_pending(id);

    if crate::sched::current_task() == Some(id) {
        crate::sched::reap_and_schedule(id);
    }
}

/// Reclaims a `Terminated` slot back to `Unused` once the scheduler is done
/// with it (never called on the currently-running task).
pub fn reap(id: TaskId) {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("task table not initialized");
    if let Some(tcb) = table.tasks.iter_mut().find(|t| t.task_id == id && t.state == TaskState::Terminated) {
        *tcb = Tcb::unused();
    }
}

pub fn with_task<R>(id: TaskId, f: impl FnOnce(&Tcb) -> R) -> Option<R> {
    let guard = TABLE.lock();
    let table = guard.as_ref().expect("task table not initialized");
    table.tasks.iter().find(|t| t.task_id == id).map(f)
}

pub fn with_task_mut<R>(id: TaskId, f: impl FnOnce(&mut Tcb) -> R) -> Option<R> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("task table not initialized");
    table.tasks.iter_mut().find(|t| t.task_id == id).map(f)
}

/// Raw pointer to a task's context, for [`context::switch_context`]. Valid
/// as long as the task's slot is not reaped; callers hold interrupts
/// disabled across the switch, so the table cannot be mutated concurrently.
pub fn context_ptr(id: TaskId) -> Option<*mut context::CpuContext> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().expect("task table not initialized");
    table.tasks.iter_mut().find(|t| t.task_id == id).map(|t| core::ptr::addr_of_mut!(t.context))
}

pub fn set_state(id: TaskId, state: TaskState) {
    with_task_mut(id, |t| t.state = state);
}

pub fn state_of(id: TaskId) -> Option<TaskState> {
    with_task(id, |t| t.state)
}

pub fn kernel_stack_top(id: TaskId) -> Option<u64> {
    with_task(id, |t| t.kernel_stack.top)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_until_exhausted_returns_invalid_id() {
        init();
        let mut last = TaskId::INVALID;
        for i in 0..MAX_TASKS {
            last = task_create("t", 0, 0, 128, TaskFlags::empty(), None, 0);
            assert!(last.is_valid(), "task {} should allocate", i);
        }
        let overflow = task_create("overflow", 0, 0, 128, TaskFlags::empty(), None, 0);
        assert_eq!(overflow, TaskId::INVALID);
        let _ = last;
    }

    #[test]
    fn terminate_then_reap_frees_the_slot() {
        init();
        let id = task_create("t", 0, 0, 128, TaskFlags::empty(), None, 0);
        task_terminate(id, ExitReason::Exited, 0);
        assert_eq!(state_of(id), Some(TaskState::Terminated));
        reap(id);
        assert_eq!(state_of(id), None);
    }
}
