// SPDX-License-Identifier: GPL-2.0

//! Physical frame table and clock (second-chance) eviction.
//!
//! Grounded on `vm/vm.c`'s `frame_list`/`vm_get_frame`/`vm_get_victim`/
//! `vm_evict_frame`. The original walks an intrusive `struct list`; we keep
//! a flat `Vec<Frame>` with a persistent cursor index instead, since nothing
//! here needs O(1) removal from the middle and a `Vec` is the idiomatic
//! substitute.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::memory::allocator::{alloc_pages, free_pages, GfpFlags, PageFrameNumber};
use crate::memory::page_table::PageTableManager;
use crate::memory::spt::SupplementalPageTable;
use crate::sync::{Mutex, Spinlock};
use crate::types::{PhysAddr, VirtAddr};

/// A physical page frame currently backing some user virtual page.
pub struct Frame {
	pub kva: PhysAddr,
	/// The owning address space and the virtual address it is mapped at,
	/// `None` for a frame that has been evicted but not yet reused.
	pub owner: Option<FrameOwner>,
}

/// Identifies which address space and virtual page a frame is mapped into,
/// so the clock algorithm can consult accessed/dirty bits and the eviction
/// path can hand the page's contents back to its supplemental page table
/// before the frame is reused.
pub struct FrameOwner {
	pub pml4: Arc<Mutex<PageTableManager>>,
	pub spt: Arc<Mutex<SupplementalPageTable>>,
	pub va: VirtAddr,
}

/// The system-wide table of user-pool frames.
pub struct FrameTable {
	frames: Vec<Frame>,
	clock_cursor: usize,
}

impl FrameTable {
	pub const fn new() -> Self {
		Self {
			frames: Vec::new(),
			clock_cursor: 0,
		}
	}

	/// Obtain a fresh user-pool frame, evicting a victim if the allocator
	/// is out of memory. Mirrors `vm_get_frame`: always returns a valid
	/// frame or propagates the allocator's error.
	pub fn get_frame(&mut self) -> Result<PhysAddr> {
		match alloc_pages(0, GfpFlags::USER | GfpFlags::ZERO) {
			Ok(pfn) => {
				let kva = pfn.to_phys_addr();
				self.frames.push(Frame { kva, owner: None });
				Ok(kva)
			}
			Err(Error::OutOfMemory) => self.evict_one(),
			Err(e) => Err(e),
		}
	}

	/// Record that `kva` is now backing `va` in `pml4`/`spt`, so future
	/// clock scans can consult its accessed bit and eviction can write its
	/// contents back through the owning supplemental page table.
	pub fn set_owner(
		&mut self,
		kva: PhysAddr,
		pml4: Arc<Mutex<PageTableManager>>,
		spt: Arc<Mutex<SupplementalPageTable>>,
		va: VirtAddr,
	) {
		if let Some(frame) = self.frames.iter_mut().find(|f| f.kva == kva) {
			frame.owner = Some(FrameOwner { pml4, spt, va });
		}
	}

	/// Run the clock algorithm to select and evict a victim, then return
	/// its now-free physical address for reuse. Mirrors `vm_get_victim` +
	/// `vm_evict_frame`.
	fn evict_one(&mut self) -> Result<PhysAddr> {
		if self.frames.is_empty() {
			return Err(Error::OutOfMemory);
		}

		let victim_index = loop {
			if self.clock_cursor >= self.frames.len() {
				self.clock_cursor = 0;
			}
			let idx = self.clock_cursor;
			let frame = &self.frames[idx];
			let accessed = match &frame.owner {
				Some(owner) => owner.pml4.lock().is_accessed(owner.va),
				None => false,
			};
			if accessed {
				if let Some(owner) = &frame.owner {
					owner.pml4.lock().clear_accessed(owner.va);
				}
				self.clock_cursor = (self.clock_cursor + 1) % self.frames.len();
				continue;
			}
			break idx;
		};

		let frame = self.frames.remove(victim_index);
		if victim_index < self.clock_cursor || (victim_index == self.clock_cursor && self.clock_cursor != 0) {
			self.clock_cursor -= 1;
		}
		if self.frames.is_empty() {
			self.clock_cursor = 0;
		} else {
			self.clock_cursor %= self.frames.len();
		}

		if let Some(owner) = &frame.owner {
			owner.spt.lock().evict_resident(owner.va, &owner.pml4)?;
			owner.pml4.lock().unmap_page(owner.va).ok();
		}

		unsafe {
			core::ptr::write_bytes(frame.kva.as_usize() as *mut u8, 0, crate::types::PAGE_SIZE);
		}

		Ok(frame.kva)
	}

	/// Remove the frame at `kva` from the table entirely, e.g. when a page
	/// holding it is destroyed without ever being swapped out.
	pub fn release(&mut self, kva: PhysAddr) {
		if let Some(pos) = self.frames.iter().position(|f| f.kva == kva) {
			self.frames.remove(pos);
			free_pages(PageFrameNumber::from_phys_addr(kva), 0);
			if self.clock_cursor > pos {
				self.clock_cursor -= 1;
			}
			if !self.frames.is_empty() {
				self.clock_cursor %= self.frames.len();
			} else {
				self.clock_cursor = 0;
			}
		}
	}

	pub fn len(&self) -> usize {
		self.frames.len()
	}
}

pub static FRAME_TABLE: Spinlock<FrameTable> = Spinlock::new(FrameTable::new());

#[cfg(test)]
mod tests {
	use super::*;

	#[test_case]
	fn frame_table_starts_empty() {
		let table = FrameTable::new();
		assert_eq!(table.len(), 0);
	}

	#[test_case]
	fn release_of_unknown_frame_is_a_no_op() {
		let mut table = FrameTable::new();
		table.release(PhysAddr::new(0x1000));
		assert_eq!(table.len(), 0);
	}
}
