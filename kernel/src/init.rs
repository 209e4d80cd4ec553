// SPDX-License-Identifier: GPL-2.0

//! Kernel initialization

use crate::error::Result;

/// Early kernel initialization
pub fn early_init() {
	crate::console::write_str("[+] Early initialization complete\n");
}

/// Initialize all kernel subsystems
fn init_subsystems() {
	crate::console::write_str("[*] Initializing kernel subsystems...\n");

	// Initialize timer system
	crate::console::write_str("    - Timer system\n");
	if let Err(_e) = crate::timer::init_timer() {
		crate::console::write_str("      [!] Timer init failed (non-fatal)\n");
	}

	// Initialize interrupt handlers
	crate::console::write_str("    - Interrupt handlers\n");
	if let Err(_e) = crate::interrupt::init() {
		crate::console::write_str("      [!] Interrupt init failed (non-fatal)\n");
	}

	// Initialize scheduler
	crate::console::write_str("    - Scheduler\n");
	if let Err(_e) = crate::scheduler::init() {
		crate::console::write_str("      [!] Scheduler init failed (non-fatal)\n");
	}

	// Probe drivers (ramdisk)
	crate::console::write_str("    - Drivers\n");
	if let Err(_e) = crate::drivers_init::init_drivers() {
		crate::console::write_str("      [!] Driver init failed (non-fatal)\n");
	}

	// Mount the filesystem and bring up the swap device
	crate::console::write_str("    - Filesystem\n");
	if let Err(_e) = init_filesystem() {
		crate::console::write_str("      [!] Filesystem init failed (non-fatal)\n");
	}

	// Syscall entry point (SYSCALL/SYSRET MSRs)
	crate::console::write_str("    - Syscalls\n");
	if let Err(_e) = crate::syscalls::init_syscalls() {
		crate::console::write_str("      [!] Syscall init failed (non-fatal)\n");
	}

	crate::console::write_str("[+] Subsystems initialized\n");
}

/// Format and mount a disk for the root filesystem, and bring up the swap
/// device every process's supplemental page table shares.
const ROOT_FS_SECTORS: u32 = 8192;

fn init_filesystem() -> Result<()> {
	use alloc::sync::Arc;

	use crate::block::RamDisk;
	use crate::driver::BlockDriverOps;

	let disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new(ROOT_FS_SECTORS));
	crate::fs::format(disk.clone(), ROOT_FS_SECTORS)?;
	crate::fs::mount(disk)?;
	crate::process::init()?;
	Ok(())
}

/// Main kernel initialization  
pub fn main_init() -> ! {
	// Print boot banner
	crate::console::write_str("\n");
	crate::console::write_str("========================================\n");
	crate::console::write_str("         Rust Kernel v0.1.0\n");
	crate::console::write_str("========================================\n");
	crate::console::write_str("\n");

	// Initialize subsystems
	init_subsystems();

	// Print system information
	crate::console::write_str("\n");
	crate::console::write_str("System Information:\n");
	crate::console::write_str("  Architecture: x86_64\n");
	crate::console::write_str("  Memory mapping: 0-1GB identity mapped\n");
	crate::console::write_str("  Page size: 2MB (large pages)\n");
	crate::console::write_str("\n");
	crate::console::write_str("[+] Kernel initialization complete\n");
	crate::console::write_str("\n");

	// Enter main kernel loop
	main_kernel_loop()
}

/// Main kernel loop with task scheduling
fn main_kernel_loop() -> ! {
	crate::console::write_str("Entering kernel main loop...\n");

	let mut tick_count: u64 = 0;

	loop {
		tick_count = tick_count.wrapping_add(1);

		// Handle timer tick periodically
		if tick_count % 10000 == 0 {
			crate::timer::handle_timer_tick();
		}

		// Schedule next task
		crate::scheduler::schedule();

		// Heartbeat indicator
		if tick_count % 5_000_000 == 0 {
			crate::console::write_str(".");
		}

		// Halt CPU to save power
		unsafe { core::arch::asm!("hlt"); }
	}
}
