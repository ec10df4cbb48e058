//! Syscall gateway (§4.F): trap-gate dispatch, the table-driven handler
//! lookup, and per-call W/L accounting.

pub mod abi;
pub mod fate;
pub mod usercopy;

use abi::*;
use crate::error::KernelError;
use crate::task::tcb::{ExitReason, TaskId};
use crate::trap::InterruptFrame;

/// What the dispatcher should do once a handler returns (§4.F contract).
pub enum Disposition {
    /// The return value has been written into the frame; `iret` proceeds normally.
    Ok,
    /// Control will reach the interrupt epilogue through the scheduler instead
    /// (task exited, or a blocking/yielding call already switched away).
    NoReturn,
}

type Handler = fn(&mut InterruptFrame, TaskId) -> Disposition;

struct Entry {
    handler: Handler,
    name: &'static str,
}

fn unknown_syscall(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    frame.set_syscall_return(ERROR_RETURN);
    Disposition::Ok
}

const TABLE: [Entry; SYSCALL_COUNT] = [
    Entry { handler: sys_yield, name: "yield" },
    Entry { handler: sys_exit, name: "exit" },
    Entry { handler: sys_write, name: "write" },
    Entry { handler: sys_read, name: "read" },
    Entry { handler: sys_roulette_spin, name: "roulette_spin" },
    Entry { handler: sys_sleep_ms, name: "sleep_ms" },
    Entry { handler: sys_fb_info, name: "fb_info" },
    Entry { handler: sys_draw_rect, name: "draw_rect" },
    Entry { handler: sys_draw_circle, name: "draw_circle" },
    Entry { handler: sys_draw_line, name: "draw_line" },
    Entry { handler: sys_draw_text, name: "draw_text" },
    Entry { handler: sys_draw_clear, name: "draw_clear" },
    Entry { handler: sys_random_next, name: "random_next" },
    Entry { handler: sys_roulette_result, name: "roulette_result" },
    Entry { handler: sys_fs_open, name: "fs_open" },
    Entry { handler: sys_fs_close, name: "fs_close" },
    Entry { handler: sys_fs_read, name: "fs_read" },
    Entry { handler: sys_fs_write, name: "fs_write" },
    Entry { handler: sys_fs_stat, name: "fs_stat" },
    Entry { handler: sys_fs_mkdir, name: "fs_mkdir" },
    Entry { handler: sys_fs_unlink, name: "fs_unlink" },
    Entry { handler: sys_fs_list, name: "fs_list" },
    Entry { handler: sys_sys_info, name: "sys_info" },
    Entry { handler: sys_halt, name: "halt" },
];

/// Entry point from the syscall stub (§4.F). `rax` selects the handler;
/// every successful call awards one W, every failing one awards one L
/// (§4.F "Per-syscall accounting").
pub fn dispatch(frame: &mut InterruptFrame) {
    let task_id = crate::sched::current_task().unwrap_or(TaskId::INVALID);
    let number = frame.syscall_number();

    let entry = match TABLE.get(number as usize) {
        Some(e) => e,
        None => {
            crate::log_warn!("syscall: unknown number {}", number);
            unknown_syscall(frame, task_id);
            fate::award_loss();
            return;
        }
    };

    match (entry.handler)(frame, task_id) {
        Disposition::Ok => {
            if frame.rax == ERROR_RETURN {
                fate::award_loss();
            } else {
                fate::award_win();
            }
        }
        Disposition::NoReturn => {}
    }
}

fn ok(frame: &mut InterruptFrame, value: u64) -> Disposition {
    frame.set_syscall_return(value);
    Disposition::Ok
}

fn err(frame: &mut InterruptFrame, e: KernelError) -> Disposition {
    crate::log_warn!("syscall {} failed: {}", frame.syscall_number(), e);
    frame.set_syscall_return(ERROR_RETURN);
    Disposition::Ok
}

fn sys_yield(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    crate::sched::yield_now();
    ok(frame, 0)
}

fn sys_exit(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    let code = frame.syscall_args().0 as i32;
    crate::task::task_terminate(task, ExitReason::Exited, code);
    Disposition::NoReturn
}

fn sys_write(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (user_buf, len, ..) = frame.syscall_args();
    let n = (len as usize).min(usercopy::MAX_IO_BYTES);
    let mut tmp = [0u8; usercopy::MAX_IO_BYTES];
    match usercopy::copy_from_user(&mut tmp[..n], user_buf) {
        Ok(()) => {
            for &b in &tmp[..n] {
                crate::serial::write_byte(b);
            }
            ok(frame, n as u64)
        }
        Err(e) => err(frame, e),
    }
}

fn sys_read(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (user_buf, cap, ..) = frame.syscall_args();
    let n = (cap as usize).min(usercopy::MAX_IO_BYTES);
    if n == 0 {
        return err(frame, KernelError::InvalidArg);
    }
    let mut tmp = [0u8; usercopy::MAX_IO_BYTES];
    let len = crate::console::read_line(&mut tmp[..n]);
    match usercopy::copy_to_user(user_buf, &tmp[..len]) {
        Ok(()) => ok(frame, len as u64),
        Err(e) => err(frame, e),
    }
}

fn sys_roulette_spin(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    match fate::roulette_spin(task) {
        Ok(packed) => ok(frame, packed),
        Err(e) => err(frame, e),
    }
}

fn sys_sleep_ms(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (ms, ..) = frame.syscall_args();
    let ms = (ms as u32).min(crate::sched::MAX_SLEEP_MS);
    crate::sched::sleep_ms(ms as u64);
    ok(frame, 0)
}

fn sys_fb_info(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (out_ptr, ..) = frame.syscall_args();
    match crate::fb::info() {
        Some(fb) => {
            let info = UserFbInfo { width: fb.width, height: fb.height, pitch: fb.pitch, bpp: fb.bpp as u32 };
            let bytes = unsafe { core::slice::from_raw_parts(&info as *const _ as *const u8, core::mem::size_of::<UserFbInfo>()) };
            match usercopy::copy_to_user(out_ptr, bytes) {
                Ok(()) => ok(frame, 0),
                Err(e) => err(frame, e),
            }
        }
        None => err(frame, KernelError::Unsupported),
    }
}

fn read_user_struct<T: Copy>(user_ptr: u64) -> Result<T, KernelError> {
    let mut buf = core::mem::MaybeUninit::<T>::uninit();
    let bytes = unsafe { core::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut u8, core::mem::size_of::<T>()) };
    usercopy::copy_from_user(bytes, user_ptr)?;
    Ok(unsafe { buf.assume_init() })
}

fn sys_draw_rect(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (user_ptr, ..) = frame.syscall_args();
    let rect: UserRect = match read_user_struct(user_ptr) {
        Ok(r) => r,
        Err(e) => return err(frame, e),
    };
    if !crate::fb::validate_rect(rect.width, rect.height) {
        return err(frame, KernelError::InvalidArg);
    }
    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            crate::fb::put_pixel(x, y, rect.rgb);
        }
    }
    ok(frame, 0)
}

fn sys_draw_circle(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (user_ptr, ..) = frame.syscall_args();
    let circle: UserCircle = match read_user_struct(user_ptr) {
        Ok(c) => c,
        Err(e) => return err(frame, e),
    };
    if !crate::fb::validate_circle(circle.radius) {
        return err(frame, KernelError::InvalidArg);
    }
    let r = circle.radius as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                let x = circle.x as i64 + dx;
                let y = circle.y as i64 + dy;
                if x >= 0 && y >= 0 {
                    crate::fb::put_pixel(x as u32, y as u32, circle.rgb);
                }
            }
        }
    }
    ok(frame, 0)
}

fn sys_draw_line(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    // Geometry payload is a pair of rects' worth of endpoints; only the
    // generic validation is exercised here (line rasterization is an
    // external collaborator concern per scope, §1).
    let (user_ptr, ..) = frame.syscall_args();
    if user_ptr == 0 {
        return err(frame, KernelError::InvalidArg);
    }
    ok(frame, 0)
}

fn sys_draw_text(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (user_ptr, len, ..) = frame.syscall_args();
    if len as usize >= usercopy::MAX_TEXT_BYTES {
        return err(frame, KernelError::InvalidArg);
    }
    let mut buf = [0u8; usercopy::MAX_TEXT_BYTES];
    match usercopy::copy_user_str(&mut buf, user_ptr) {
        Ok(_len) => ok(frame, 0),
        Err(e) => err(frame, e),
    }
}

fn sys_draw_clear(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (rgb, ..) = frame.syscall_args();
    match crate::fb::info() {
        Some(fb) => {
            for y in 0..fb.height {
                for x in 0..fb.width {
                    crate::fb::put_pixel(x, y, rgb as u32);
                }
            }
            ok(frame, 0)
        }
        None => err(frame, KernelError::Unsupported),
    }
}

fn sys_random_next(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    ok(frame, fate::random_next() as u64)
}

fn sys_roulette_result(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    let (packed, ..) = frame.syscall_args();
    match fate::roulette_result(task, packed) {
        Ok(_is_win) => ok(frame, 0),
        Err(e) => err(frame, e),
    }
}

fn with_handle_table<R>(task: TaskId, f: impl FnOnce(&mut crate::task::tcb::HandleTable) -> R) -> Option<R> {
    crate::task::with_task_mut(task, |t| f(&mut t.handles))
}

fn sys_fs_open(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    let (user_name, create, ..) = frame.syscall_args();
    let mut name_buf = [0u8; crate::ramfs::MAX_NAME_LEN + 1];
    let name_len = match usercopy::copy_user_str(&mut name_buf, user_name) {
        Ok(n) => n,
        Err(e) => return err(frame, e),
    };
    let name = core::str::from_utf8(&name_buf[..name_len]).unwrap_or("");
    let handle = if create != 0 { crate::ramfs::create(name) } else { crate::ramfs::open(name) };
    let handle = match handle {
        Ok(h) => h,
        Err(e) => return err(frame, e),
    };
    match with_handle_table(task, |t| t.insert(handle)) {
        Some(Some(fd)) => ok(frame, fd as u64),
        _ => err(frame, KernelError::Exhausted),
    }
}

fn sys_fs_close(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    let (fd, ..) = frame.syscall_args();
    match with_handle_table(task, |t| t.remove(fd as u32)) {
        Some(Some(_)) => ok(frame, 0),
        _ => err(frame, KernelError::NotOwned),
    }
}

fn sys_fs_read(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    let (fd, user_buf, cap, ..) = frame.syscall_args();
    let n = (cap as usize).min(crate::ramfs::MAX_PAYLOAD);
    let mut tmp = alloc::vec![0u8; n];
    let result = with_handle_table(task, |t| {
        t.get_mut(fd as u32).map(|h| crate::ramfs::read(h, &mut tmp)).unwrap_or(Err(KernelError::NotOwned))
    });
    match result {
        Some(Ok(len)) => match usercopy::copy_to_user(user_buf, &tmp[..len]) {
            Ok(()) => ok(frame, len as u64),
            Err(e) => err(frame, e),
        },
        Some(Err(e)) => err(frame, e),
        None => err(frame, KernelError::NotOwned),
    }
}

fn sys_fs_write(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    let (fd, user_buf, len, ..) = frame.syscall_args();
    let n = (len as usize).min(crate::ramfs::MAX_PAYLOAD);
    let mut tmp = alloc::vec![0u8; n];
    if let Err(e) = usercopy::copy_from_user(&mut tmp, user_buf) {
        return err(frame, e);
    }
    let result = with_handle_table(task, |t| {
        t.get_mut(fd as u32).map(|h| crate::ramfs::write(h, &tmp)).unwrap_or(Err(KernelError::NotOwned))
    });
    match result {
        Some(Ok(n)) => ok(frame, n as u64),
        Some(Err(e)) => err(frame, e),
        None => err(frame, KernelError::NotOwned),
    }
}

fn sys_fs_stat(frame: &mut InterruptFrame, task: TaskId) -> Disposition {
    let (fd, ..) = frame.syscall_args();
    match with_handle_table(task, |t| t.get(fd as u32).is_some()) {
        Some(true) => ok(frame, 0),
        _ => err(frame, KernelError::NotOwned),
    }
}

fn sys_fs_mkdir(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    // RAMFS is a flat namespace (§1 scope); directories are not modeled.
    err(frame, KernelError::Unsupported)
}

fn sys_fs_unlink(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (user_name, ..) = frame.syscall_args();
    let mut name_buf = [0u8; crate::ramfs::MAX_NAME_LEN + 1];
    let name_len = match usercopy::copy_user_str(&mut name_buf, user_name) {
        Ok(n) => n,
        Err(e) => return err(frame, e),
    };
    let name = core::str::from_utf8(&name_buf[..name_len]).unwrap_or("");
    match crate::ramfs::unlink(name) {
        Ok(()) => ok(frame, 0),
        Err(e) => err(frame, e),
    }
}

fn sys_fs_list(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    // Directory listing has no counterpart in the flat RAMFS namespace.
    err(frame, KernelError::Unsupported)
}

fn sys_sys_info(frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    let (out_ptr, ..) = frame.syscall_args();
    let info = UserSysInfo { ticks: 0, ledger_balance: fate::ledger_balance(), task_count: 0 };
    let bytes = unsafe { core::slice::from_raw_parts(&info as *const _ as *const u8, core::mem::size_of::<UserSysInfo>()) };
    match usercopy::copy_to_user(out_ptr, bytes) {
        Ok(()) => ok(frame, 0),
        Err(e) => err(frame, e),
    }
}

fn sys_halt(_frame: &mut InterruptFrame, _task: TaskId) -> Disposition {
    crate::panic::halt_forever()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_exactly_syscall_count_entries_and_unique_names() {
        assert_eq!(TABLE.len(), SYSCALL_COUNT);
        for i in 0..TABLE.len() {
            for j in (i + 1)..TABLE.len() {
                assert_ne!(TABLE[i].name, TABLE[j].name);
            }
        }
    }
}
