// SPDX-License-Identifier: GPL-2.0

//! Driver initialization and management

use crate::error::Result;
use crate::info;

/// Initialize all built-in drivers.
///
/// Keyboard and serial are out-of-scope input/output collaborators; the
/// only driver this kernel's filesystem and swap device actually depend on
/// is the ramdisk block device.
pub fn init_drivers() -> Result<()> {
	info!("Initializing built-in drivers");

	init_ramdisk_driver()?;

	info!("Built-in drivers initialized");
	Ok(())
}

/// Initialize ramdisk driver
fn init_ramdisk_driver() -> Result<()> {
	info!("Initializing ramdisk driver");

	// TODO: Create ramdisk device
	// This would typically involve:
	// 1. Allocating memory for the ramdisk
	// 2. Registering the device with the block device subsystem
	// 3. Setting up device file operations

	info!("Ramdisk driver initialized");
	Ok(())
}
