//! Raw trap stubs (§4.A, §9 "abstract the common register-saving epilogue
//! into a macro").
//!
//! Every vector gets its own tiny entry point (pushes a synthesized error
//! code when the CPU doesn't supply one, then the vector number) that falls
//! through into one of three shared epilogues. The epilogues build the
//! [`super::frame::InterruptFrame`] bit-for-bit and hand its address to the
//! Rust dispatcher in `rdi`.

use core::arch::global_asm;

/// Vectors for which the CPU itself pushes an error code.
macro_rules! has_error_code {
    (8) => { true }; (10) => { true }; (11) => { true }; (12) => { true };
    (13) => { true }; (14) => { true }; (17) => { true };
    ($v:tt) => { false };
}

macro_rules! exception_stub {
    ($v:literal) => {
        exception_stub!(@emit $v, has_error_code!($v));
    };
    (@emit $v:literal, true) => {
        concat!(
            ".global isr", stringify!($v), "\n",
            "isr", stringify!($v), ":\n",
            "push ", stringify!($v), "\n",
            "jmp common_exception_stub\n",
        )
    };
    (@emit $v:literal, false) => {
        concat!(
            ".global isr", stringify!($v), "\n",
            "isr", stringify!($v), ":\n",
            "push 0\n",
            "push ", stringify!($v), "\n",
            "jmp common_exception_stub\n",
        )
    };
}

global_asm!(
    r#"
.section .text
.code64

# --- shared epilogue used by exception, IRQ, and syscall stubs ---------
# On entry: [rsp] = vector, [rsp+8] = error_code, CPU block above that.
common_push_gprs:
    push r15
    push r14
    push r13
    push r12
    push r11
    push r10
    push r9
    push r8
    push rbp
    push rdi
    push rsi
    push rdx
    push rcx
    push rbx
    push rax
    ret

common_pop_gprs:
    pop rax
    pop rbx
    pop rcx
    pop rdx
    pop rsi
    pop rdi
    pop rbp
    pop r8
    pop r9
    pop r10
    pop r11
    pop r12
    pop r13
    pop r14
    pop r15
    ret

common_exception_stub:
    call common_push_gprs
    mov rdi, rsp
    call dispatch_exception
    call common_pop_gprs
    add rsp, 16
    iretq

common_irq_stub:
    call common_push_gprs
    mov rdi, rsp
    call dispatch_irq
    call common_pop_gprs
    add rsp, 16
    iretq

.global isr128
isr128:
    push 0
    push 0x80
    call common_push_gprs
    mov rdi, rsp
    call dispatch_syscall
    call common_pop_gprs
    add rsp, 16
    iretq
"#
);

global_asm!(exception_stub!(0));
global_asm!(exception_stub!(1));
global_asm!(exception_stub!(2));
global_asm!(exception_stub!(3));
global_asm!(exception_stub!(4));
global_asm!(exception_stub!(5));
global_asm!(exception_stub!(6));
global_asm!(exception_stub!(7));
global_asm!(exception_stub!(8));
global_asm!(exception_stub!(9));
global_asm!(exception_stub!(10));
global_asm!(exception_stub!(11));
global_asm!(exception_stub!(12));
global_asm!(exception_stub!(13));
global_asm!(exception_stub!(14));
global_asm!(exception_stub!(16));
global_asm!(exception_stub!(17));
global_asm!(exception_stub!(18));
global_asm!(exception_stub!(19));
global_asm!(exception_stub!(20));

macro_rules! irq_stub {
    ($n:literal, $vector:literal) => {
        global_asm!(concat!(
            ".global irq", stringify!($n), "\n",
            "irq", stringify!($n), ":\n",
            "push 0\n",
            "push ", stringify!($vector), "\n",
            "jmp common_irq_stub\n",
        ));
    };
}

irq_stub!(0, 32);
irq_stub!(1, 33);
irq_stub!(2, 34);
irq_stub!(3, 35);
irq_stub!(4, 36);
irq_stub!(5, 37);
irq_stub!(6, 38);
irq_stub!(7, 39);
irq_stub!(8, 40);
irq_stub!(9, 41);
irq_stub!(10, 42);
irq_stub!(11, 43);
irq_stub!(12, 44);
irq_stub!(13, 45);
irq_stub!(14, 46);
irq_stub!(15, 47);

unsafe extern "C" {
    pub fn isr0();
    pub fn isr1();
    pub fn isr2();
    pub fn isr3();
    pub fn isr4();
    pub fn isr5();
    pub fn isr6();
    pub fn isr7();
    pub fn isr8();
    pub fn isr9();
    pub fn isr10();
    pub fn isr11();
    pub fn isr12();
    pub fn isr13();
    pub fn isr14();
    pub fn isr16();
    pub fn isr17();
    pub fn isr18();
    pub fn isr19();
    pub fn isr20();
    pub fn isr128();

    pub fn irq0();
    pub fn irq1();
    pub fn irq2();
    pub fn irq3();
    pub fn irq4();
    pub fn irq5();
    pub fn irq6();
    pub fn irq7();
    pub fn irq8();
    pub fn irq9();
    pub fn irq10();
    pub fn irq11();
    pub fn irq12();
    pub fn irq13();
    pub fn irq14();
    pub fn irq15();
}

/// Called by `common_exception_stub`. Exported with `no_mangle` so the
/// symbol the stub's `call` references survives.
#[unsafe(no_mangle)]
extern "C" fn dispatch_exception(frame: *mut super::frame::InterruptFrame) {
    unsafe { super::exceptions::handle(&mut *frame) }
}

#[unsafe(no_mangle)]
extern "C" fn dispatch_irq(frame: *mut super::frame::InterruptFrame) {
    unsafe { crate::irq::dispatch(&mut *frame) }
}

#[unsafe(no_mangle)]
extern "C" fn dispatch_syscall(frame: *mut super::frame::InterruptFrame) {
    unsafe { crate::syscall::dispatch(&mut *frame) }
}
