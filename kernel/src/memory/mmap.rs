// SPDX-License-Identifier: GPL-2.0

//! Memory-mapped files.
//!
//! Grounded on `vm/file.c`'s `do_mmap`/`do_munmap`/`lazy_load_file`. Those
//! two entry points are empty stubs in every revision of the original this
//! crate was distilled from; the behavior implemented here — lazy
//! file-backed pages, per-page offset/read-bytes tracking, write-back of
//! dirty pages on unmap — follows the governing specification rather than
//! the source's unfinished version.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use crate::error::{Error, Result};
use crate::fs::file::FileHandle;
use crate::memory::page_table::PageTableManager;
use crate::memory::spt::{PageTarget, SupplementalPageTable, LazyFileLoad};
use crate::sync::Mutex;
use crate::types::{VirtAddr, PAGE_SIZE};

/// One active mmap region, recorded so `munmap` knows how many pages to
/// tear down and `mmap` can reject overlapping requests.
struct Mapping {
	page_count: usize,
}

/// Per-process registry of active mmap regions, keyed by the mapping's
/// first page.
pub struct MmapTable {
	mappings: BTreeMap<VirtAddr, Mapping>,
}

impl MmapTable {
	pub fn new() -> Self {
		Self {
			mappings: BTreeMap::new(),
		}
	}

	/// `do_mmap`: install `length` bytes of `file` starting at `offset` as
	/// lazily-loaded pages at `addr`. Fails closed on misalignment or
	/// overlap with an existing mapping, unwinding any pages already
	/// installed on a mid-way failure.
	pub fn mmap(
		&mut self,
		addr: VirtAddr,
		length: usize,
		writable: bool,
		file: Arc<FileHandle>,
		offset: u64,
		spt: &mut SupplementalPageTable,
	) -> Result<VirtAddr> {
		if length == 0 || addr.as_usize() % PAGE_SIZE != 0 || offset % PAGE_SIZE as u64 != 0 {
			return Err(Error::InvalidArgument);
		}

		let page_count = (length + PAGE_SIZE - 1) / PAGE_SIZE;
		for i in 0..page_count {
			let va = VirtAddr::new(addr.as_usize() + i * PAGE_SIZE);
			if spt.find_page(va).is_some() {
				self.unwind(spt, addr, i);
				return Err(Error::AlreadyExists);
			}
		}

		for i in 0..page_count {
			let va = VirtAddr::new(addr.as_usize() + i * PAGE_SIZE);
			let page_offset = offset + (i * PAGE_SIZE) as u64;
			let remaining = length - i * PAGE_SIZE;
			let read_bytes = core::cmp::min(PAGE_SIZE, remaining);

			if let Err(e) = spt.alloc_page(
				va,
				writable,
				PageTarget::File,
				Some(LazyFileLoad {
					file: file.clone(),
					offset: page_offset,
					read_bytes,
				}),
			) {
				self.unwind(spt, addr, i);
				return Err(e);
			}
		}

		self.mappings.insert(addr, Mapping { page_count });
		Ok(addr)
	}

	fn unwind(&self, spt: &mut SupplementalPageTable, addr: VirtAddr, installed: usize) {
		for i in 0..installed {
			let va = VirtAddr::new(addr.as_usize() + i * PAGE_SIZE);
			spt.discard_uninit(va);
		}
	}

	/// `do_munmap`: tear down every page of the mapping that starts at
	/// `addr`, writing back any dirty file-backed pages first.
	pub fn munmap(
		&mut self,
		addr: VirtAddr,
		spt: &mut SupplementalPageTable,
		pml4: &Arc<Mutex<PageTableManager>>,
	) -> Result<()> {
		let mapping = self.mappings.remove(&addr).ok_or(Error::InvalidArgument)?;
		for i in 0..mapping.page_count {
			let va = VirtAddr::new(addr.as_usize() + i * PAGE_SIZE);
			spt.remove_page(va, pml4);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::RamDisk;
	use crate::driver::BlockDriverOps;
	use crate::fs::fat::FatTable;
	use crate::fs::file::FileHandle;
	use crate::fs::inode::Inode;
	use crate::memory::swap::SwapDevice;
	use crate::types::SECTORS_PER_PAGE;

	fn spt() -> SupplementalPageTable {
		let disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new((4 * SECTORS_PER_PAGE) as u32));
		SupplementalPageTable::new(Arc::new(SwapDevice::new(disk)))
	}

	fn dummy_file() -> Arc<FileHandle> {
		let disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new(256));
		let fat = Arc::new(FatTable::format(disk, 256).unwrap());
		let inode = Arc::new(Inode::new_in_memory(fat, 2, false));
		Arc::new(FileHandle::open(inode))
	}

	#[test_case]
	fn mmap_rejects_unaligned_address() {
		let mut table = MmapTable::new();
		let mut s = spt();
		let result = table.mmap(VirtAddr::new(1), PAGE_SIZE, true, dummy_file(), 0, &mut s);
		assert!(result.is_err());
	}

	#[test_case]
	fn mmap_rejects_unaligned_offset() {
		let mut table = MmapTable::new();
		let mut s = spt();
		let result = table.mmap(VirtAddr::new(0x1000), PAGE_SIZE, true, dummy_file(), 1, &mut s);
		assert!(result.is_err());
	}

	#[test_case]
	fn mmap_then_munmap_clears_every_page() {
		let mut table = MmapTable::new();
		let mut s = spt();
		let pml4 = Arc::new(Mutex::new(PageTableManager::new().unwrap()));
		let addr = VirtAddr::new(0x2000);
		table
			.mmap(addr, PAGE_SIZE * 2, true, dummy_file(), 0, &mut s)
			.unwrap();
		assert!(s.find_page(addr).is_some());
		table.munmap(addr, &mut s, &pml4).unwrap();
		assert!(s.find_page(addr).is_none());
	}
}
