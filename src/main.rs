#![no_std]
#![no_main]

//! # SlopOS entry point
//!
//! Consumes the Limine boot protocol responses (§1 "Boot protocol
//! consumed"), brings up the trap layer, interrupt controllers, task
//! model, and scheduler, then hands off into the idle task. This call
//! never returns.

use limine::{
    LimineCmdlineRequest, LimineFramebufferRequest, LimineHhdmRequest, LimineRsdpRequest,
};
use slopos::drivers::irq_sources::{
    IRQ_KEYBOARD, IRQ_SERIAL, IRQ_TIMER, KEYBOARD_SOURCE, SERIAL_SOURCE, TIMER_SOURCE,
};
use slopos::fb::FramebufferInfo;
use slopos::task::tcb::TaskFlags;
use slopos::{apic, cmdline, fb, irq, ramfs, sched, serial, task, trap};

static HHDM_REQUEST: LimineHhdmRequest = LimineHhdmRequest::new(0);
static RSDP_REQUEST: LimineRsdpRequest = LimineRsdpRequest::new(0);
static FRAMEBUFFER_REQUEST: LimineFramebufferRequest = LimineFramebufferRequest::new(0);
static CMDLINE_REQUEST: LimineCmdlineRequest = LimineCmdlineRequest::new(0);

/// Bus-clock ticks between timer interrupts (divide-by-16). Not
/// wall-clock calibrated (§4.E "Ordering guarantees").
const TIMER_INITIAL_COUNT: u32 = 10_000_000;
const PREEMPTION_QUANTUM_TICKS: u64 = 5;

#[no_mangle]
extern "C" fn kmain() -> ! {
    unsafe { slopos::init_global_allocator() };
    unsafe { slopos::mana_pool::init_heap_canaries() };
    serial::init();
    slopos::log_info!("slopos: booting");

    let cmdline_str = CMDLINE_REQUEST
        .get_response()
        .get()
        .and_then(|r| r.cmdline.to_str())
        .and_then(|s| s.to_str().ok())
        .unwrap_or("");
    let boot_config = cmdline::parse(cmdline_str);
    slopos::log_info!("cmdline: itests={:?} verbosity={:?}", boot_config.itests, boot_config.itests_verbosity);

    let hhdm_offset = HHDM_REQUEST
        .get_response()
        .get()
        .map(|r| r.offset)
        .unwrap_or_else(|| slopos::kernel_panic!("no HHDM response from bootloader"));

    let rsdp_phys = RSDP_REQUEST
        .get_response()
        .get()
        .and_then(|r| r.address.as_ptr())
        .map(|p| p as u64 - hhdm_offset)
        .unwrap_or_else(|| slopos::kernel_panic!("no RSDP response from bootloader"));

    if let Some(fb_response) = FRAMEBUFFER_REQUEST.get_response().get() {
        if let Some(framebuffer) = fb_response.framebuffers().first() {
            fb::set_framebuffer(FramebufferInfo {
                addr: framebuffer.address.as_ptr().unwrap() as u64,
                width: framebuffer.width as u32,
                height: framebuffer.height as u32,
                pitch: framebuffer.pitch as u32,
                bpp: framebuffer.bpp as u8,
            });
            slopos::log_info!("framebuffer: {}x{}@{}bpp", framebuffer.width, framebuffer.height, framebuffer.bpp);
        }
    }

    trap::init();
    slopos::log_info!("trap: GDT/IDT ready");

    let controllers = match apic::init(hhdm_offset, rsdp_phys) {
        Ok(c) => c,
        Err(e) => slopos::kernel_panic!("apic init failed: {}", e),
    };
    controllers.local.configure_timer(trap::IRQ_BASE + IRQ_TIMER, TIMER_INITIAL_COUNT);
    irq::attach_controllers(controllers);

    irq::register(IRQ_TIMER, &TIMER_SOURCE, 0, "timer").unwrap();
    irq::register(IRQ_KEYBOARD, &KEYBOARD_SOURCE, 0, "keyboard").unwrap();
    irq::register(IRQ_SERIAL, &SERIAL_SOURCE, 0, "serial").unwrap();

    ramfs::init();
    task::init();
    sched::init();

    let idle_id = task::task_create("idle", idle_task as usize as u64, 0, 0, TaskFlags::empty(), None, 0);
    sched::schedule_task(idle_id);

    sched::enable_preemption(PREEMPTION_QUANTUM_TICKS);
    slopos::cpu::sti();

    slopos::log_info!("slopos: handing off to the scheduler");
    sched::schedule();

    unreachable!("schedule() does not return once a task is running");
}

/// Runs whenever nothing else is ready. Parks the CPU between ticks
/// rather than spinning (§4.E "single CPU... the running task has
/// exclusive use... unless it voluntarily yields").
extern "C" fn idle_task(_arg: u64) -> ! {
    loop {
        slopos::cpu::halt();
        sched::yield_now();
    }
}
