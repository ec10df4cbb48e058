//! Global Descriptor Table, Task State Segment, and IST stacks (§4.A).
//!
//! Only the segments this kernel actually uses are installed: kernel
//! code/data (ring 0), user code/data (ring 3), and the TSS. The TSS's
//! `rsp0` is updated on every switch to a user task so that a trap from
//! ring 3 lands on that task's kernel stack (§5).

use core::mem::size_of;
use core::arch::asm;

/// Number of guarded exception stacks carved out of [`IST_STACKS`].
pub const IST_COUNT: usize = 3;
const IST_STACK_SIZE: usize = 16 * 1024;

/// IST index used for double fault, NMI, and machine-check (§3).
pub const IST_DOUBLE_FAULT: usize = 1;
pub const IST_NMI: usize = 2;
pub const IST_MACHINE_CHECK: usize = 3;

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_middle: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        GdtEntry { limit_low: 0, base_low: 0, base_middle: 0, access: 0, granularity: 0, base_high: 0 }
    }

    const fn kernel_code() -> Self {
        GdtEntry { limit_low: 0xFFFF, base_low: 0, base_middle: 0, access: 0b1001_1010, granularity: 0b1010_1111, base_high: 0 }
    }

    const fn kernel_data() -> Self {
        GdtEntry { limit_low: 0xFFFF, base_low: 0, base_middle: 0, access: 0b1001_0010, granularity: 0b1100_1111, base_high: 0 }
    }

    const fn user_data() -> Self {
        GdtEntry { limit_low: 0xFFFF, base_low: 0, base_middle: 0, access: 0b1111_0010, granularity: 0b1000_1111, base_high: 0 }
    }

    const fn user_code() -> Self {
        GdtEntry { limit_low: 0xFFFF, base_low: 0, base_middle: 0, access: 0b1111_1010, granularity: 0b1010_1111, base_high: 0 }
    }

    fn tss(tss: &'static TaskStateSegment) -> [GdtEntry; 2] {
        let ptr = tss as *const _ as u64;
        let limit = (size_of::<TaskStateSegment>() - 1) as u64;
        let low = GdtEntry {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (ptr & 0xFFFF) as u16,
            base_middle: ((ptr >> 16) & 0xFF) as u8,
            access: 0b1000_1001,
            granularity: ((limit >> 16) & 0x0F) as u8,
            base_high: ((ptr >> 24) & 0xFF) as u8,
        };
        let high = GdtEntry {
            limit_low: ((ptr >> 32) & 0xFFFF) as u16,
            base_low: ((ptr >> 48) & 0xFFFF) as u16,
            base_middle: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        };
        [low, high]
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct TaskStateSegment {
    reserved_1: u32,
    rsp: [u64; 3],
    reserved_2: u64,
    ist: [u64; 7],
    reserved_3: u64,
    reserved_4: u16,
    iomap_base: u16,
}

impl TaskStateSegment {
    const fn new() -> Self {
        TaskStateSegment {
            reserved_1: 0,
            rsp: [0; 3],
            reserved_2: 0,
            ist: [0; 7],
            reserved_3: 0,
            reserved_4: 0,
            iomap_base: size_of::<TaskStateSegment>() as u16,
        }
    }

    pub fn set_kernel_stack(&mut self, stack_top: u64) {
        self.rsp[0] = stack_top;
    }

    pub fn set_ist(&mut self, index: usize, stack_top: u64) {
        self.ist[index - 1] = stack_top;
    }
}

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u64,
}

#[repr(align(16))]
struct GlobalDescriptorTable {
    entries: [GdtEntry; 7],
}

pub mod selectors {
    pub const KERNEL_CODE: u16 = 0x08;
    pub const KERNEL_DATA: u16 = 0x10;
    pub const USER_DATA: u16 = 0x18 | 3;
    pub const USER_CODE: u16 = 0x20 | 3;
    pub const TSS: u16 = 0x28;
}

static mut TSS: TaskStateSegment = TaskStateSegment::new();
static mut GDT: GlobalDescriptorTable = GlobalDescriptorTable { entries: [GdtEntry::null(); 7] };
static mut IST_STACKS: [[u8; IST_STACK_SIZE]; IST_COUNT] = [[0; IST_STACK_SIZE]; IST_COUNT];

/// Builds the GDT/TSS, carves out the IST stacks, and loads all three
/// (`lgdt`, segment reload, `ltr`). Must run once, early in boot, before
/// the IDT is loaded.
pub fn init() {
    unsafe {
        GDT.entries[1] = GdtEntry::kernel_code();
        GDT.entries[2] = GdtEntry::kernel_data();
        GDT.entries[3] = GdtEntry::user_data();
        GDT.entries[4] = GdtEntry::user_code();
        let tss_entries = GdtEntry::tss(&*core::ptr::addr_of!(TSS));
        GDT.entries[5] = tss_entries[0];
        GDT.entries[6] = tss_entries[1];

        for i in 0..IST_COUNT {
            // Stacks grow down; a guard page would precede the low end in a
            // real mapping, the allocator (external collaborator) owns that.
            let top = IST_STACKS[i].as_ptr() as u64 + IST_STACK_SIZE as u64;
            TSS.set_ist(i + 1, top);
        }

        load();
        load_tss();
    }
    crate::log_info!("gdt: loaded, tss rsp0=0 (set on first user task switch)");
}

unsafe fn load() {
    let ptr = GdtPointer {
        limit: (size_of::<GdtEntry>() * GDT.entries.len() - 1) as u16,
        base: core::ptr::addr_of!(GDT.entries) as u64,
    };
    unsafe {
        asm!("lgdt [{}]", in(reg) &ptr, options(readonly, nostack, preserves_flags));
        asm!(
            "push {sel}",
            "lea {tmp}, [rip + 2f]",
            "push {tmp}",
            "retfq",
            "2:",
            sel = in(reg) selectors::KERNEL_CODE as u64,
            tmp = lateout(reg) _,
            options(preserves_flags),
        );
        asm!(
            "mov ds, ax", "mov es, ax", "mov fs, ax", "mov gs, ax", "mov ss, ax",
            in("ax") selectors::KERNEL_DATA,
            options(preserves_flags, nostack),
        );
    }
}

unsafe fn load_tss() {
    unsafe {
        asm!("ltr ax", in("ax") selectors::TSS, options(nostack, preserves_flags));
    }
}

/// Points TSS.RSP0 at `stack_top`. Called on every switch to a user task
/// so a ring-3→ring-0 trap lands on the right kernel stack (§5).
pub fn set_kernel_stack(stack_top: u64) {
    unsafe {
        TSS.set_kernel_stack(stack_top);
    }
}
