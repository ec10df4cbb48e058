//! The fate/roulette subsystem (§3, §4.F): LFSR spins, the task-keyed
//! pending-result handshake, and the W/L currency ledger.

use spin::Mutex;
use crate::task::tcb::TaskId;
use crate::task::MAX_TASKS;

/// Galois LFSR, polynomial `x^32 + x^7 + x^5 + x^3 + x^2 + x + 1`. Seeded
/// from the TSC at boot, falling back to a fixed constant when the TSC
/// reads zero (virtualized environments with no working counter).
struct Lfsr {
    state: u32,
}

const LFSR_FALLBACK_SEED: u32 = 0xDEAD_BEEF;
const LFSR_TAPS: u32 = 0b1000_0000_0000_0000_0000_0000_1011_1111;

impl Lfsr {
    fn seeded() -> Self {
        let tsc = crate::cpu::read_tsc() as u32;
        let state = if tsc == 0 { LFSR_FALLBACK_SEED } else { tsc };
        Lfsr { state }
    }

    fn next(&mut self) -> u32 {
        let lsb = self.state & 1;
        self.state >>= 1;
        if lsb == 1 {
            self.state ^= LFSR_TAPS;
        }
        if self.state == 0 {
            self.state = LFSR_FALLBACK_SEED;
        }
        self.state
    }
}

static LFSR: Mutex<Option<Lfsr>> = Mutex::new(None);

fn spin_lfsr() -> u32 {
    let mut guard = LFSR.lock();
    if guard.is_none() {
        *guard = Some(Lfsr::seeded());
    }
    guard.as_mut().unwrap().next()
}

#[derive(Debug, Clone, Copy)]
struct PendingSpin {
    task_id: TaskId,
    value: u32,
    token: u32,
    is_win: bool,
}

static PENDING: Mutex<[Option<PendingSpin>; MAX_TASKS]> = Mutex::new([None; MAX_TASKS]);

/// Draws one raw LFSR value with no pending-slot bookkeeping, for the
/// `random_next` syscall (§6, `№ 12`), which carries no handshake.
pub fn random_next() -> u32 {
    spin_lfsr()
}

/// Spins the LFSR once, decides win/loss from its low bit, and stores the
/// result keyed by `task_id`. Rejects a second outstanding spin for the
/// same task. Returns `(token << 32) | value`.
pub fn roulette_spin(task_id: TaskId) -> Result<u64, crate::error::KernelError> {
    let mut pending = PENDING.lock();
    if pending.iter().any(|p| matches!(p, Some(s) if s.task_id == task_id)) {
        return Err(crate::error::KernelError::InvalidArg);
    }
    let slot = pending.iter().position(|p| p.is_none()).ok_or(crate::error::KernelError::Exhausted)?;

    let value = spin_lfsr();
    let mut token = spin_lfsr();
    if token == 0 {
        token = 1;
    }
    let is_win = value & 1 != 0;

    pending[slot] = Some(PendingSpin { task_id, value, token, is_win });
    Ok(((token as u64) << 32) | value as u64)
}

/// Consumes the pending spin for `task_id`, applying the W/L outcome iff
/// the high 32 bits of `packed` match the stored token.
pub fn roulette_result(task_id: TaskId, packed: u64) -> Result<bool, crate::error::KernelError> {
    let claimed_token = (packed >> 32) as u32;

    let mut pending = PENDING.lock();
    let slot = pending.iter().position(|p| matches!(p, Some(s) if s.task_id == task_id))
        .ok_or(crate::error::KernelError::NotFound)?;

    if pending[slot].unwrap().token != claimed_token {
        return Err(crate::error::KernelError::NotOwned);
    }
    let record = pending[slot].take().unwrap();

    if record.is_win {
        award_win();
    } else {
        award_loss();
    }

    if let Some(hook) = outcome_hook() {
        hook.on_outcome(task_id, record.is_win);
    }

    Ok(record.is_win)
}

pub fn clear_pending(task_id: TaskId) {
    let mut pending = PENDING.lock();
    if let Some(slot) = pending.iter().position(|p| matches!(p, Some(s) if s.task_id == task_id)) {
        pending[slot] = None;
    }
}

/// Single signed balance, initialized to 10 (§3 "W/L currency ledger").
static LEDGER: Mutex<i64> = Mutex::new(10);

pub fn award_win() {
    *LEDGER.lock() += 10;
}

pub fn award_loss() {
    *LEDGER.lock() -= 10;
}

pub fn ledger_balance() -> i64 {
    *LEDGER.lock()
}

/// Capability interface notified after every resolved spin (§4.F
/// "Outcome hook (ambient)"). Degrades to a no-op when unset.
pub trait FateOutcomeHook: Sync {
    fn on_outcome(&self, task_id: TaskId, is_win: bool);
}

static OUTCOME_HOOK: Mutex<Option<&'static dyn FateOutcomeHook>> = Mutex::new(None);

pub fn set_outcome_hook(hook: &'static dyn FateOutcomeHook) {
    *OUTCOME_HOOK.lock() = Some(hook);
}

fn outcome_hook() -> Option<&'static dyn FateOutcomeHook> {
    *OUTCOME_HOOK.lock()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfsr_never_settles_on_zero() {
        let mut l = Lfsr { state: 1 };
        for _ in 0..10_000 {
            assert_ne!(l.next(), 0);
        }
    }

    #[test]
    fn spin_then_result_applies_ledger_delta() {
        *LEDGER.lock() = 10;
        *PENDING.lock() = [None; MAX_TASKS];
        let id = TaskId(7);
        let packed = roulette_spin(id).unwrap();
        let before = ledger_balance();
        let won = roulette_result(id, packed).unwrap();
        let after = ledger_balance();
        assert_eq!(after - before, if won { 10 } else { -10 });
    }

    #[test]
    fn forged_token_is_rejected() {
        *PENDING.lock() = [None; MAX_TASKS];
        let id = TaskId(9);
        let packed = roulette_spin(id).unwrap();
        let forged = packed ^ (1u64 << 32); // flip one bit of the token half only
        assert_eq!(roulette_result(id, forged), Err(crate::error::KernelError::NotOwned));
    }

    #[test]
    fn forged_token_leaves_the_pending_record_in_place() {
        *PENDING.lock() = [None; MAX_TASKS];
        let id = TaskId(10);
        let packed = roulette_spin(id).unwrap();
        let forged = packed ^ (1u64 << 32);
        assert!(roulette_result(id, forged).is_err());
        // the real token still resolves the spin since the record was never taken
        assert!(roulette_result(id, packed).is_ok());
    }

    #[test]
    fn second_spin_for_same_task_is_rejected() {
        *PENDING.lock() = [None; MAX_TASKS];
        let id = TaskId(11);
        roulette_spin(id).unwrap();
        assert_eq!(roulette_spin(id), Err(crate::error::KernelError::InvalidArg));
    }
}
