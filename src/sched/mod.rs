//! Scheduler (§4.E): priority-weighted round-robin, wait queues, the W/L
//! solvency check, and the post-IRQ preemption hook.
//!
//! Ready-queue mechanics are grounded in the teacher's
//! `loom_of_fate::scheduler` (harmony-weighted selection trimmed down to
//! plain priority order, since harmony scoring has no counterpart here).

use alloc::collections::VecDeque;
use spin::Mutex;
use crate::task::context::{switch_context, CpuContext};
use crate::task::tcb::{TaskId, TaskState};
use crate::task::{self, MAX_TASKS};

const PRIORITY_CLASSES: usize = 4;

fn priority_class(priority: u8) -> usize {
    ((priority as usize) * PRIORITY_CLASSES / 256).min(PRIORITY_CLASSES - 1)
}

struct SchedulerState {
    ready: [VecDeque<TaskId>; PRIORITY_CLASSES],
    current: Option<TaskId>,
    preemption_enabled: bool,
    time_quantum_ticks: u64,
    quantum_remaining: u64,
    ticks: u64,
    context_switches: u64,
}

static STATE: Mutex<SchedulerState> = Mutex::new(SchedulerState {
    ready: [VecDeque::new(), VecDeque::new(), VecDeque::new(), VecDeque::new()],
    current: None,
    preemption_enabled: false,
    time_quantum_ticks: 10,
    quantum_remaining: 10,
    ticks: 0,
    context_switches: 0,
});

pub fn init() {
    let mut state = STATE.lock();
    for q in state.ready.iter_mut() {
        q.clear();
    }
    state.current = None;
    state.preemption_enabled = false;
    state.quantum_remaining = state.time_quantum_ticks;
    state.ticks = 0;
    state.context_switches = 0;
}

pub fn enable_preemption(ticks_per_quantum: u64) {
    let mut state = STATE.lock();
    state.preemption_enabled = true;
    state.time_quantum_ticks = ticks_per_quantum.max(1);
    state.quantum_remaining = state.time_quantum_ticks;
}

/// Inserts a newly created task into its priority's ready queue (§4.E).
pub fn schedule_task(id: TaskId) {
    let priority = task::with_task(id, |t| t.priority).unwrap_or(128);
    crate::cpu::without_interrupts(|| {
        STATE.lock().ready[priority_class(priority)].push_back(id);
    });
}

/// Moves `id` from `Blocked` to `Ready` iff it is currently `Blocked`.
pub fn unblock_task(id: TaskId) {
    wake_from(id, TaskState::Blocked);
}

/// Moves `id` to `Ready` iff it is currently in `from`. Shared by
/// [`unblock_task`] (wait queues) and the sleep timer's expiry path, which
/// wakes out of `Sleeping` rather than `Blocked` (§4.D).
fn wake_from(id: TaskId, from: TaskState) {
    crate::cpu::without_interrupts(|| {
        let moved = task::with_task_mut(id, |t| {
            if t.state == from {
                t.state = TaskState::Ready;
                true
            } else {
                false
            }
        });
        if moved == Some(true) {
            let priority = task::with_task(id, |t| t.priority).unwrap_or(128);
            STATE.lock().ready[priority_class(priority)].push_back(id);
        }
    });
}

pub fn current_task() -> Option<TaskId> {
    STATE.lock().current
}

fn pick_next() -> Option<TaskId> {
    let mut state = STATE.lock();
    for class in 0..PRIORITY_CLASSES {
        if let Some(id) = state.ready[class].pop_front() {
            return Some(id);
        }
    }
    None
}

/// Consults the W/L ledger; halts the kernel if the balance has crossed to
/// non-positive (§4.E "Solvency check").
fn solvency_check() {
    if crate::syscall::fate::ledger_balance() <= 0 {
        crate::panic::kernel_panic(format_args!("the house always wins: W/L ledger bankrupt"));
    }
}

/// Picks the next ready task and switches to it if different from the
/// current one. Returns immediately (no switch) if nothing is ready besides
/// the caller.
pub fn schedule() {
    crate::cpu::without_interrupts(|| {
        solvency_check();

        let next = match pick_next() {
            Some(id) => id,
            None => return,
        };

        let prev = STATE.lock().current;
        if prev == Some(next) {
            task::set_state(next, TaskState::Running);
            return;
        }

        if let Some(prev_id) = prev {
            if task::state_of(prev_id) == Some(TaskState::Running) {
                task::set_state(prev_id, TaskState::Ready);
                schedule_task(prev_id);
            }
        }

        task::set_state(next, TaskState::Running);
        STATE.lock().current = Some(next);
        STATE.lock().context_switches += 1;
        STATE.lock().quantum_remaining = STATE.lock().time_quantum_ticks;

        if let Some(stack_top) = task::kernel_stack_top(next) {
            crate::trap::gdt::set_kernel_stack(stack_top);
        }

        let prev_ctx: *mut CpuContext = match prev.and_then(task::context_ptr) {
            Some(p) => p,
            None => {
                static mut SCRATCH: CpuContext = CpuContext::empty();
                unsafe { core::ptr::addr_of_mut!(SCRATCH) }
            }
        };
        let next_ctx = task::context_ptr(next).expect("scheduled task has no context");

        unsafe { switch_context(prev_ctx, next_ctx) };
    });
}

/// Re-enqueues the caller (if still `Running`) and calls [`schedule`].
pub fn yield_now() {
    crate::cpu::without_interrupts(|| {
        if let Some(id) = current_task() {
            if task::state_of(id) == Some(TaskState::Running) {
                task::set_state(id, TaskState::Ready);
                schedule_task(id);
            }
        }
        schedule();
    });
}

/// Called once from [`task::task_terminate`] when the current task exits;
/// picks a new current task without re-enqueuing the exiting one. Reaps the
/// exiting task's slot before switching away, since `schedule()` does not
/// return into this call once the switch actually happens.
pub fn reap_and_schedule(exited: TaskId) {
    crate::cpu::without_interrupts(|| {
        let mut state = STATE.lock();
        if state.current == Some(exited) {
            state.current = None;
        }
        drop(state);
        task::reap(exited);
        schedule();
    });
}

/// Per-tick bookkeeping (§4.E): wakes expired sleepers, and sets the
/// preemption flag consumed by [`handle_post_irq`].
pub fn timer_tick() {
    let mut state = STATE.lock();
    state.ticks += 1;
    if state.preemption_enabled && state.quantum_remaining > 0 {
        state.quantum_remaining -= 1;
    }
    drop(state);
    sleep::expire_due();
}

/// Tail of every IRQ dispatch (§4.E "Post-IRQ hook"). On the timer line,
/// drives preemption once the quantum is exhausted.
pub fn handle_post_irq(_irq: u8) {
    let should_preempt = {
        let state = STATE.lock();
        state.preemption_enabled && state.quantum_remaining == 0
    };
    if should_preempt {
        schedule();
    }
}

/// A wait queue: a FIFO of blocked tasks guarded by the same IRQ-disable
/// discipline as the ready queues (§4.E ambient addition).
pub struct WaitQueue {
    waiters: Mutex<VecDeque<TaskId>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue { waiters: Mutex::new(VecDeque::new()) }
    }

    /// Moves the calling task onto this queue, marks it `Blocked`, and
    /// yields the CPU. Returns once some other context has woken it.
    pub fn block_current(&self) {
        crate::cpu::without_interrupts(|| {
            if let Some(id) = current_task() {
                task::set_state(id, TaskState::Blocked);
                self.waiters.lock().push_back(id);
                schedule();
            }
        });
    }

    pub fn wake_one(&self) {
        crate::cpu::without_interrupts(|| {
            if let Some(id) = self.waiters.lock().pop_front() {
                unblock_task(id);
            }
        });
    }

    pub fn wake_all(&self) {
        crate::cpu::without_interrupts(|| {
            let mut waiters = self.waiters.lock();
            while let Some(id) = waiters.pop_front() {
                unblock_task(id);
            }
        });
    }
}

mod sleep {
    use super::*;

    const MAX_SLEEPERS: usize = MAX_TASKS;
    static SLEEPERS: Mutex<[Option<(TaskId, u64)>; MAX_SLEEPERS]> = Mutex::new([None; MAX_SLEEPERS]);

    /// Bounded to 60 000 ms per call (§4.E "Cancellation / timeout").
    pub fn sleep_ms(ticks_remaining: u64) {
        crate::cpu::without_interrupts(|| {
            if let Some(id) = super::current_task() {
                let mut sleepers = SLEEPERS.lock();
                if let Some(slot) = sleepers.iter_mut().find(|s| s.is_none()) {
                    *slot = Some((id, ticks_remaining));
                    task::set_state(id, TaskState::Sleeping);
                    drop(sleepers);
                    super::schedule();
                }
            }
        });
    }

    pub fn expire_due() {
        let mut sleepers = SLEEPERS.lock();
        for slot in sleepers.iter_mut() {
            if let Some((id, ticks)) = slot {
                if *ticks == 0 {
                    let id = *id;
                    *slot = None;
                    super::wake_from(id, TaskState::Sleeping);
                } else {
                    *ticks -= 1;
                }
            }
        }
    }
}

pub use sleep::sleep_ms;

pub const MAX_SLEEP_MS: u32 = 60_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_class_spans_full_byte_range() {
        assert_eq!(priority_class(0), 0);
        assert_eq!(priority_class(255), PRIORITY_CLASSES - 1);
    }
}
