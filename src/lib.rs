//! # SlopOS
//!
//! A single-processor x86_64 kernel: interrupt routing, task scheduling,
//! a ring-3 syscall ABI, a RAM-backed filesystem, and a framebuffer
//! graphics stack, threaded through with a "fate/roulette" subsystem that
//! ties win/loss accounting to syscalls and a scheduler solvency check.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use mana_pool::BuddyAllocator;

/// Global allocator for the kernel heap. The page allocator proper is an
/// external collaborator (§1); this crate only consumes allocation.
#[global_allocator]
static GLOBAL_ALLOCATOR: BuddyAllocator = BuddyAllocator::new();

const HEAP_SIZE: usize = 1024 * 1024;
static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Brings up the global allocator. Must run before the first heap
/// allocation, and exactly once.
///
/// # Safety
/// Must be called exactly once, before any other code touches the heap.
pub unsafe fn init_global_allocator() {
    let heap_start = core::ptr::addr_of_mut!(HEAP) as usize;
    unsafe { GLOBAL_ALLOCATOR.init(heap_start, HEAP_SIZE) };
}

pub mod apic;
pub mod cmdline;
pub mod console;
pub mod cpu;
pub mod drivers;
pub mod error;
pub mod fb;
pub mod irq;
pub mod logging;
pub mod mana_pool;
pub mod panic;
pub mod ramfs;
pub mod sched;
pub mod serial;
pub mod syscall;
pub mod task;
pub mod trap;
