// SPDX-License-Identifier: GPL-2.0

//! Swap slot allocation and anonymous-page swap I/O.
//!
//! Grounded on `vm/anon.c`: a single swap disk divided into fixed-size
//! slots of `SECTORS_PER_PAGE` sectors each, tracked by a bitmap where a set
//! bit means "slot in use".

use alloc::sync::Arc;

use crate::block::{read_sector, write_sector};
use crate::driver::BlockDriverOps;
use crate::error::{Error, Result};
use crate::sync::Spinlock;
use crate::types::{DISK_SECTOR_SIZE, PAGE_SIZE, SECTORS_PER_PAGE};

/// A growable bitmap of fixed size, mirroring the scan-and-flip semantics
/// `vm/anon.c` relies on from pintos's `struct bitmap`.
pub struct Bitmap {
	bits: alloc::vec::Vec<u64>,
	len: usize,
}

impl Bitmap {
	pub fn new(len: usize) -> Self {
		let words = (len + 63) / 64;
		Self {
			bits: alloc::vec![0u64; words],
			len,
		}
	}

	fn get(&self, idx: usize) -> bool {
		self.bits[idx / 64] & (1 << (idx % 64)) != 0
	}

	fn set(&mut self, idx: usize, value: bool) {
		if value {
			self.bits[idx / 64] |= 1 << (idx % 64);
		} else {
			self.bits[idx / 64] &= !(1 << (idx % 64));
		}
	}

	/// Find the first clear bit and set it, returning its index. Mirrors
	/// `bitmap_scan_and_flip(swap_table, 0, 1, false)`.
	pub fn scan_and_flip(&mut self) -> Option<usize> {
		for idx in 0..self.len {
			if !self.get(idx) {
				self.set(idx, true);
				return Some(idx);
			}
		}
		None
	}

	pub fn clear(&mut self, idx: usize) {
		self.set(idx, false);
	}

	pub fn len(&self) -> usize {
		self.len
	}
}

/// The swap disk plus the bitmap tracking which of its slots are occupied.
pub struct SwapDevice {
	disk: Arc<dyn BlockDriverOps>,
	table: Spinlock<Bitmap>,
}

impl SwapDevice {
	/// `vm_anon_init`: size the slot bitmap to the disk's sector count
	/// divided by sectors-per-page.
	pub fn new(disk: Arc<dyn BlockDriverOps>) -> Self {
		let slots = (disk.get_total_blocks() as usize) / SECTORS_PER_PAGE;
		Self {
			disk,
			table: Spinlock::new(Bitmap::new(slots)),
		}
	}

	/// `anon_swap_out`: claim a free slot and write `page` (one full page)
	/// to it. Returns the slot index to later `swap_in` from.
	pub fn swap_out(&self, page: &[u8; PAGE_SIZE]) -> Result<usize> {
		let slot = {
			let mut table = self.table.lock();
			table.scan_and_flip().ok_or(Error::OutOfMemory)?
		};
		let base_sector = (slot * SECTORS_PER_PAGE) as u32;
		for i in 0..SECTORS_PER_PAGE {
			let mut sector = [0u8; DISK_SECTOR_SIZE];
			let start = i * DISK_SECTOR_SIZE;
			sector.copy_from_slice(&page[start..start + DISK_SECTOR_SIZE]);
			if let Err(e) = write_sector(self.disk.as_ref(), base_sector + i as u32, &sector) {
				self.table.lock().clear(slot);
				return Err(e);
			}
		}
		Ok(slot)
	}

	/// `anon_swap_in`: read `slot` back into `page` and release the slot.
	pub fn swap_in(&self, slot: usize, page: &mut [u8; PAGE_SIZE]) -> Result<()> {
		let base_sector = (slot * SECTORS_PER_PAGE) as u32;
		for i in 0..SECTORS_PER_PAGE {
			let mut sector = [0u8; DISK_SECTOR_SIZE];
			read_sector(self.disk.as_ref(), base_sector + i as u32, &mut sector)?;
			let start = i * DISK_SECTOR_SIZE;
			page[start..start + DISK_SECTOR_SIZE].copy_from_slice(&sector);
		}
		self.table.lock().clear(slot);
		Ok(())
	}

	/// Release a slot without reading it back, used when an anonymous
	/// page is destroyed while still swapped out (`anon_destroy`'s
	/// not-resident branch).
	pub fn discard(&self, slot: usize) {
		self.table.lock().clear(slot);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::RamDisk;

	fn device(slots: usize) -> SwapDevice {
		let sectors = slots * SECTORS_PER_PAGE;
		SwapDevice::new(Arc::new(RamDisk::new(sectors as u32)))
	}

	#[test_case]
	fn swap_out_then_in_round_trips_page_contents() {
		let dev = device(4);
		let mut page = [0u8; PAGE_SIZE];
		page[0] = 0x42;
		page[PAGE_SIZE - 1] = 0x99;

		let slot = dev.swap_out(&page).unwrap();
		let mut back = [0u8; PAGE_SIZE];
		dev.swap_in(slot, &mut back).unwrap();
		assert_eq!(back, page);
	}

	#[test_case]
	fn swap_out_reuses_slot_after_swap_in() {
		let dev = device(1);
		let page = [1u8; PAGE_SIZE];
		let slot_a = dev.swap_out(&page).unwrap();
		assert!(dev.swap_out(&page).is_err());
		let mut back = [0u8; PAGE_SIZE];
		dev.swap_in(slot_a, &mut back).unwrap();
		let slot_b = dev.swap_out(&page).unwrap();
		assert_eq!(slot_a, slot_b);
	}

	#[test_case]
	fn bitmap_scan_and_flip_finds_lowest_clear_bit() {
		let mut bitmap = Bitmap::new(8);
		assert_eq!(bitmap.scan_and_flip(), Some(0));
		assert_eq!(bitmap.scan_and_flip(), Some(1));
		bitmap.clear(0);
		assert_eq!(bitmap.scan_and_flip(), Some(0));
	}
}
