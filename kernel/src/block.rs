// SPDX-License-Identifier: GPL-2.0

//! Sector-granular block device abstraction.
//!
//! The real disk controller is out of scope for this crate (see the
//! module-level docs on [`crate::fs`] and [`crate::memory::swap`]); this
//! module only fixes the contract a disk driver must offer — read/write one
//! fixed-size sector at a time — and provides a [`RamDisk`] implementation
//! so the FAT filesystem and the swap area have something to run against in
//! tests and non-hardware builds.

use alloc::vec;
use alloc::vec::Vec;

use crate::driver::BlockDriverOps;
use crate::error::{Error, Result};
use crate::sync::Spinlock;
use crate::types::DISK_SECTOR_SIZE;

/// A disk backed entirely by heap memory.
///
/// Grounded on `drivers/src/ramdisk.rs`'s `RamDisk`, but the sector store is
/// guarded by a lock instead of cast through an immutable reference.
pub struct RamDisk {
	sectors: Spinlock<Vec<[u8; DISK_SECTOR_SIZE]>>,
}

impl RamDisk {
	/// Create a disk of `sector_count` zeroed sectors.
	pub fn new(sector_count: u32) -> Self {
		Self {
			sectors: Spinlock::new(vec![[0u8; DISK_SECTOR_SIZE]; sector_count as usize]),
		}
	}
}

impl BlockDriverOps for RamDisk {
	fn read_block(&self, block: u64, buffer: &mut [u8]) -> Result<usize> {
		let sectors = self.sectors.lock();
		let sector = sectors
			.get(block as usize)
			.ok_or(Error::InvalidArgument)?;
		let n = core::cmp::min(buffer.len(), sector.len());
		buffer[..n].copy_from_slice(&sector[..n]);
		Ok(n)
	}

	fn write_block(&self, block: u64, buffer: &[u8]) -> Result<usize> {
		let mut sectors = self.sectors.lock();
		let sector = sectors
			.get_mut(block as usize)
			.ok_or(Error::InvalidArgument)?;
		let n = core::cmp::min(buffer.len(), sector.len());
		sector[..n].copy_from_slice(&buffer[..n]);
		Ok(n)
	}

	fn get_block_size(&self) -> u32 {
		DISK_SECTOR_SIZE as u32
	}

	fn get_total_blocks(&self) -> u64 {
		self.sectors.lock().len() as u64
	}

	fn flush(&self) -> Result<()> {
		Ok(())
	}
}

/// Read one sector, failing loudly if the driver under-delivers.
///
/// Every caller in `fs::fat` and `memory::swap` wants a full, fixed-size
/// sector or nothing; this wraps the `BlockDriverOps` byte-count contract
/// into that shape.
pub fn read_sector(disk: &dyn BlockDriverOps, sector: u32, buf: &mut [u8; DISK_SECTOR_SIZE]) -> Result<()> {
	let n = disk.read_block(sector as u64, buf)?;
	if n != DISK_SECTOR_SIZE {
		return Err(Error::Io);
	}
	Ok(())
}

/// Write one sector.
pub fn write_sector(disk: &dyn BlockDriverOps, sector: u32, buf: &[u8; DISK_SECTOR_SIZE]) -> Result<()> {
	let n = disk.write_block(sector as u64, buf)?;
	if n != DISK_SECTOR_SIZE {
		return Err(Error::Io);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn ramdisk_round_trips_a_sector() {
		let disk = RamDisk::new(16);
		let mut data = [0u8; DISK_SECTOR_SIZE];
		data[0] = 0xAB;
		data[DISK_SECTOR_SIZE - 1] = 0xCD;
		write_sector(&disk, 3, &data).unwrap();

		let mut out = [0u8; DISK_SECTOR_SIZE];
		read_sector(&disk, 3, &mut out).unwrap();
		assert_eq!(out, data);
	}

	#[test_case]
	fn ramdisk_rejects_out_of_range_sector() {
		let disk = RamDisk::new(4);
		let buf = [0u8; DISK_SECTOR_SIZE];
		assert!(write_sector(&disk, 4, &buf).is_err());
	}
}
