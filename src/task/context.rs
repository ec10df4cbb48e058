//! Context save area and the raw context-switch primitive (§4.D).
//!
//! Field layout and switch sequence are grounded in the teacher's
//! `loom_of_fate::context` module, trimmed of its Ring-1 "service mode"
//! constructor and per-instruction serial debug prints — neither survives
//! into this core.

use core::arch::naked_asm;

/// Everything needed to resume a task exactly where it left off. Field
/// offsets are load-bearing: [`switch_context`] addresses them by hand.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CpuContext {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,

    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
    /// Page-directory physical address; `0` means "keep the current CR3".
    pub cr3: u64,
}

impl CpuContext {
    pub const fn empty() -> Self {
        CpuContext {
            r15: 0, r14: 0, r13: 0, r12: 0, rbp: 0, rbx: 0,
            r11: 0, r10: 0, r9: 0, r8: 0, rax: 0, rcx: 0,
            rdx: 0, rsi: 0, rdi: 0,
            rip: 0, cs: 0, rflags: 0, rsp: 0, ss: 0, cr3: 0,
        }
    }

    /// Fresh kernel-mode context: the first switch into this task lands at
    /// `entry` with `arg` already in `rdi`, per §4.D's `task_create` contract.
    pub fn new_kernel(entry: u64, arg: u64, stack_top: u64) -> Self {
        CpuContext {
            rdi: arg,
            rip: entry,
            cs: crate::trap::gdt::selectors::KERNEL_CODE as u64,
            rflags: 0x202,
            rsp: stack_top - 8,
            ss: crate::trap::gdt::selectors::KERNEL_DATA as u64,
            cr3: 0,
            ..Self::empty()
        }
    }

    /// Fresh ring-3 context for a user task (§4.D).
    pub fn new_user(entry: u64, arg: u64, user_stack_top: u64, page_dir_phys: u64) -> Self {
        CpuContext {
            rdi: arg,
            rip: entry,
            cs: crate::trap::gdt::selectors::USER_CODE as u64,
            rflags: 0x202,
            rsp: user_stack_top,
            ss: crate::trap::gdt::selectors::USER_DATA as u64,
            cr3: page_dir_phys,
            ..Self::empty()
        }
    }
}

/// Saves the running task's register file into `*old`, then restores `*new`
/// and resumes it via `iretq`. Builds the IRETQ frame on the current
/// (kernel) stack, so no SMAP/stack-switch hazard exists going into ring 3.
///
/// # Safety
/// Caller must hold interrupts disabled and must not call this with `old`
/// or `new` dangling. Never returns to its caller directly: execution
/// resumes wherever `new.rip` points.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut CpuContext, _new: *const CpuContext) {
    naked_asm!(
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], rbp",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x30], r11",
        "mov [rdi + 0x38], r10",
        "mov [rdi + 0x40], r9",
        "mov [rdi + 0x48], r8",
        "mov [rdi + 0x50], rax",
        "mov [rdi + 0x58], rcx",
        "mov [rdi + 0x60], rdx",
        "mov [rdi + 0x68], rsi",
        "mov [rdi + 0x70], rdi",

        "mov rax, [rsp]",
        "mov [rdi + 0x78], rax", // rip = return address
        "mov ax, cs",
        "mov [rdi + 0x80], rax",
        "pushfq",
        "pop rax",
        "mov [rdi + 0x88], rax",
        "lea rax, [rsp + 8]",
        "mov [rdi + 0x90], rax", // rsp before the call's return address
        "mov ax, ss",
        "mov [rdi + 0x98], rax",

        "mov rax, [rsi + 0xA0]",
        "test rax, rax",
        "jz 2f",
        "mov cr3, rax",
        "2:",

        "mov r15, [rsi + 0x00]",
        "mov r14, [rsi + 0x08]",
        "mov r13, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov rbp, [rsi + 0x20]",
        "mov rbx, [rsi + 0x28]",
        "mov r11, [rsi + 0x30]",
        "mov r10, [rsi + 0x38]",
        "mov r9,  [rsi + 0x40]",
        "mov r8,  [rsi + 0x48]",
        "mov rax, [rsi + 0x50]",
        "mov rcx, [rsi + 0x58]",
        "mov rdx, [rsi + 0x60]",

        "push qword ptr [rsi + 0x98]", // ss
        "push qword ptr [rsi + 0x90]", // rsp
        "mov rax, [rsi + 0x88]",
        "or rax, 0x200",
        "push rax",                    // rflags, IF forced on
        "push qword ptr [rsi + 0x80]", // cs
        "push qword ptr [rsi + 0x78]", // rip

        "mov rdi, [rsi + 0x70]",
        "mov rsi, [rsi + 0x68]",
        "iretq",
    );
}
