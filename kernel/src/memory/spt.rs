// SPDX-License-Identifier: GPL-2.0

//! Supplemental page table and the demand-paging fault handler.
//!
//! Grounded on `vm/vm.c`'s `spt_find_page`/`spt_insert_page`/
//! `vm_try_handle_fault`/`vm_stack_growth`/`supplemental_page_table_copy`.
//! The original keys pages in a `struct hash`; a `BTreeMap<VirtAddr, Page>`
//! is the ordered-map substitute idiomatic Rust reaches for here.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use crate::arch::x86_64::context::Context;
use crate::error::{Error, Result};
use crate::fs::file::FileHandle;
use crate::memory::frame::FRAME_TABLE;
use crate::memory::page_table::{PageTableFlags, PageTableManager};
use crate::memory::swap::SwapDevice;
use crate::sync::Mutex;
use crate::types::{PhysAddr, VirtAddr, PAGE_SIZE, STACK_SIZE_LIMIT, USER_STACK};

/// What a [`Page`] is backed by, and how to materialize its first fault.
pub enum PageKind {
	/// Not yet materialized. `init` produces the real kind on first fault;
	/// `aux` carries whatever that initializer needs (a file slice for a
	/// lazily-loaded executable segment, for instance).
	Uninit {
		target: PageTarget,
		aux: Option<LazyFileLoad>,
	},
	/// Backed by swap once evicted; `None` while resident.
	Anon { swap_index: Option<usize> },
	/// Backed by a file region; written back to `file` on munmap/eviction
	/// if `writable`.
	File {
		file: Arc<FileHandle>,
		offset: u64,
		read_bytes: usize,
	},
}

/// What an [`PageKind::Uninit`] page turns into once it is first faulted in.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PageTarget {
	Anon,
	File,
}

/// Aux data for a lazily-loaded file-backed page (executable segment or
/// mmap region), mirroring the original's `loading_datas`/`lazy_load_file`.
#[derive(Clone)]
pub struct LazyFileLoad {
	pub file: Arc<FileHandle>,
	pub offset: u64,
	pub read_bytes: usize,
}

/// One user virtual page's worth of bookkeeping.
pub struct Page {
	pub va: VirtAddr,
	pub writable: bool,
	pub frame: Option<PhysAddr>,
	pub kind: PageKind,
}

impl Page {
	fn new_uninit(va: VirtAddr, writable: bool, target: PageTarget, aux: Option<LazyFileLoad>) -> Self {
		Self {
			va,
			writable,
			frame: None,
			kind: PageKind::Uninit { target, aux },
		}
	}
}

/// Per-process map of user virtual pages, plus the swap device every
/// anonymous page shares.
pub struct SupplementalPageTable {
	pages: BTreeMap<VirtAddr, Page>,
	swap: Arc<SwapDevice>,
}

impl SupplementalPageTable {
	pub fn new(swap: Arc<SwapDevice>) -> Self {
		Self {
			pages: BTreeMap::new(),
			swap,
		}
	}

	fn page_base(addr: VirtAddr) -> VirtAddr {
		VirtAddr::new(addr.as_usize() & !(PAGE_SIZE - 1))
	}

	/// `spt_find_page`.
	pub fn find_page(&self, addr: VirtAddr) -> Option<&Page> {
		self.pages.get(&Self::page_base(addr))
	}

	pub(crate) fn find_page_mut(&mut self, addr: VirtAddr) -> Option<&mut Page> {
		self.pages.get_mut(&Self::page_base(addr))
	}

	/// `vm_alloc_page_with_initializer` + `spt_insert_page`: register a new
	/// lazily-loaded page. Fails if one is already mapped at this address.
	pub fn alloc_page(
		&mut self,
		va: VirtAddr,
		writable: bool,
		target: PageTarget,
		aux: Option<LazyFileLoad>,
	) -> Result<()> {
		let key = Self::page_base(va);
		if self.pages.contains_key(&key) {
			return Err(Error::AlreadyExists);
		}
		self.pages.insert(key, Page::new_uninit(key, writable, target, aux));
		Ok(())
	}

	/// `spt_remove_page`: drop a page's bookkeeping and release any
	/// resource (frame or swap slot) it still holds.
	pub fn remove_page(&mut self, addr: VirtAddr, pml4: &Arc<Mutex<PageTableManager>>) {
		let key = Self::page_base(addr);
		if let Some(page) = self.pages.remove(&key) {
			self.destroy_page(page, pml4);
		}
	}

	/// Drop a page that was registered but never faulted in, so it holds
	/// no frame and no PTE — used to unwind a partially-installed mmap
	/// request, where there is nothing yet to write back or unmap.
	pub(crate) fn discard_uninit(&mut self, addr: VirtAddr) {
		let key = Self::page_base(addr);
		if let Some(page) = self.pages.get(&key) {
			debug_assert!(page.frame.is_none());
		}
		self.pages.remove(&key);
	}

	fn destroy_page(&self, page: Page, pml4: &Arc<Mutex<PageTableManager>>) {
		match (&page.kind, page.frame) {
			(PageKind::Anon { swap_index: Some(slot) }, None) => {
				self.swap.discard(*slot);
			}
			(PageKind::File { file, offset, read_bytes }, Some(kva)) => {
				if pml4.lock().is_dirty(page.va) {
					let buf = unsafe {
						core::slice::from_raw_parts(kva.as_usize() as *const u8, *read_bytes)
					};
					file.write_at(*offset, buf).ok();
				}
				pml4.lock().unmap_page(page.va).ok();
				FRAME_TABLE.lock().release(kva);
			}
			(_, Some(kva)) => {
				pml4.lock().unmap_page(page.va).ok();
				FRAME_TABLE.lock().release(kva);
			}
			_ => {}
		}
	}

	/// `supplemental_page_table_kill`: tear down every page, called on
	/// process exit before the address space's pml4 is freed.
	pub fn destroy_all(&mut self, pml4: &Arc<Mutex<PageTableManager>>) {
		let pages = core::mem::take(&mut self.pages);
		for (_, page) in pages {
			self.destroy_page(page, pml4);
		}
	}

	/// `is_stack_growth` / the address-range half of `vm_stack_growth`'s
	/// precondition.
	pub fn is_stack_growth(fault_addr: VirtAddr, rsp: VirtAddr) -> bool {
		let on_stack_range = (USER_STACK - STACK_SIZE_LIMIT) <= fault_addr.as_usize()
			&& fault_addr.as_usize() <= USER_STACK;
		let plausible_access = fault_addr.as_usize() == rsp.as_usize().wrapping_sub(8)
			|| rsp.as_usize() <= fault_addr.as_usize();
		on_stack_range && plausible_access
	}

	/// `vm_stack_growth`: install a fresh zero-filled anonymous page to
	/// extend the stack down to cover `addr`.
	fn grow_stack(&mut self, addr: VirtAddr) -> Result<()> {
		let key = Self::page_base(addr);
		if self.pages.contains_key(&key) {
			return Ok(());
		}
		self.pages
			.insert(key, Page::new_uninit(key, true, PageTarget::Anon, None));
		Ok(())
	}

	/// Persist a resident page's contents when the frame table selects it
	/// as an eviction victim, and clear its residency. Mirrors the
	/// type-specific halves of `vm_evict_frame`/`anon_swap_out`.
	pub fn evict_resident(&mut self, va: VirtAddr, pml4: &Arc<Mutex<PageTableManager>>) -> Result<()> {
		let key = Self::page_base(va);
		let page = self.pages.get_mut(&key).ok_or(Error::NotFound)?;
		let dirty = pml4.lock().is_dirty(page.va);
		let kva = match page.frame.take() {
			Some(kva) => kva,
			None => return Ok(()),
		};

		match &mut page.kind {
			PageKind::Anon { swap_index } => {
				let buf = unsafe { &*(kva.as_usize() as *const [u8; PAGE_SIZE]) };
				*swap_index = Some(self.swap.swap_out(buf)?);
			}
			PageKind::File { file, offset, read_bytes } => {
				if dirty {
					let buf = unsafe {
						core::slice::from_raw_parts(kva.as_usize() as *const u8, *read_bytes)
					};
					file.write_at(*offset, buf)?;
					pml4.lock().clear_dirty(page.va);
				}
			}
			PageKind::Uninit { .. } => {}
		}
		Ok(())
	}

	/// `vm_do_claim_page` + the type-specific `*_initializer`/lazy-load
	/// step: bring a page's frame into residence and install the mapping.
	fn claim_page(
		&mut self,
		key: VirtAddr,
		pml4: &Arc<Mutex<PageTableManager>>,
		self_arc: &Arc<Mutex<SupplementalPageTable>>,
	) -> Result<()> {
		let swap = self.swap.clone();
		let page = self.pages.get_mut(&key).ok_or(Error::NotFound)?;

		if page.frame.is_some() {
			return Ok(());
		}

		let kva = FRAME_TABLE.lock().get_frame()?;
		FRAME_TABLE.lock().set_owner(kva, pml4.clone(), self_arc.clone(), key);

		match &mut page.kind {
			PageKind::Uninit { target, aux } => {
				match target {
					PageTarget::Anon => {
						let buf = unsafe {
							core::slice::from_raw_parts_mut(kva.as_usize() as *mut u8, PAGE_SIZE)
						};
						buf.fill(0);
					}
					PageTarget::File => {
						let load = aux.clone().ok_or(Error::InvalidArgument)?;
						load_file_page(&load, kva)?;
						page.kind = PageKind::File {
							file: load.file,
							offset: load.offset,
							read_bytes: load.read_bytes,
						};
					}
				}
				if matches!(target, PageTarget::Anon) {
					page.kind = PageKind::Anon { swap_index: None };
				}
			}
			PageKind::Anon { swap_index: Some(slot) } => {
				let buf = unsafe { &mut *(kva.as_usize() as *mut [u8; PAGE_SIZE]) };
				swap.swap_in(*slot, buf)?;
				page.kind = PageKind::Anon { swap_index: None };
			}
			PageKind::Anon { swap_index: None } => {}
			PageKind::File { file, offset, read_bytes } => {
				let load = LazyFileLoad {
					file: file.clone(),
					offset: *offset,
					read_bytes: *read_bytes,
				};
				load_file_page(&load, kva)?;
			}
		}

		page.frame = Some(kva);
		let mut flags = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;
		if page.writable {
			flags = flags | PageTableFlags::WRITABLE;
		}
		pml4.lock().map_page(key, kva, flags)?;
		Ok(())
	}

	/// `vm_try_handle_fault`: the full page-fault decision tree.
	///
	/// `not_present` is `false` for a write to a read-only page, which
	/// always fails (`vm_handle_wp` always returns false upstream).
	pub fn handle_fault(
		&mut self,
		fault_addr: VirtAddr,
		not_present: bool,
		write: bool,
		_user: bool,
		ctx: &Context,
		pml4: &Arc<Mutex<PageTableManager>>,
		self_arc: &Arc<Mutex<SupplementalPageTable>>,
	) -> Result<()> {
		if !not_present {
			return Err(Error::PermissionDenied);
		}

		let key = Self::page_base(fault_addr);
		if !self.pages.contains_key(&key) {
			if Self::is_stack_growth(fault_addr, VirtAddr::new(ctx.rsp as usize)) {
				self.grow_stack(fault_addr)?;
			} else {
				return Err(Error::InvalidArgument);
			}
		}

		if write && !self.pages.get(&key).map(|p| p.writable).unwrap_or(false) {
			return Err(Error::PermissionDenied);
		}

		self.claim_page(key, pml4, self_arc)
	}

	/// `supplemental_page_table_copy`: duplicate every entry for `fork`.
	/// Anonymous pages are materialized and memcpy'd into a fresh frame
	/// immediately; uninit pages get a fresh aux with a duplicated file
	/// handle; file-backed pages are shared by reopening the file.
	pub fn copy_from(
		&mut self,
		self_arc: &Arc<Mutex<SupplementalPageTable>>,
		parent: &mut SupplementalPageTable,
		parent_arc: &Arc<Mutex<SupplementalPageTable>>,
		parent_pml4: &Arc<Mutex<PageTableManager>>,
		child_pml4: &Arc<Mutex<PageTableManager>>,
	) -> Result<()> {
		let keys: alloc::vec::Vec<VirtAddr> = parent.pages.keys().copied().collect();
		for key in keys {
			parent.claim_page(key, parent_pml4, parent_arc)?;
			let parent_page = parent.pages.get(&key).ok_or(Error::NotFound)?;
			let parent_kva = parent_page.frame.ok_or(Error::NotFound)?;

			match &parent_page.kind {
				PageKind::File { file, offset, read_bytes } => {
					self.pages.insert(
						key,
						Page {
							va: key,
							writable: parent_page.writable,
							frame: None,
							kind: PageKind::Uninit {
								target: PageTarget::File,
								aux: Some(LazyFileLoad {
									file: Arc::new(file.duplicate()?),
									offset: *offset,
									read_bytes: *read_bytes,
								}),
							},
						},
					);
				}
				_ => {
					let writable = parent_page.writable;
					self.pages.insert(
						key,
						Page::new_uninit(key, writable, PageTarget::Anon, None),
					);
					self.claim_page(key, child_pml4, self_arc)?;
					let child_kva = self.pages.get(&key).and_then(|p| p.frame).ok_or(Error::NotFound)?;
					unsafe {
						core::ptr::copy_nonoverlapping(
							parent_kva.as_usize() as *const u8,
							child_kva.as_usize() as *mut u8,
							PAGE_SIZE,
						);
					}
				}
			}
		}
		Ok(())
	}
}

fn load_file_page(load: &LazyFileLoad, kva: PhysAddr) -> Result<()> {
	let buf = unsafe { core::slice::from_raw_parts_mut(kva.as_usize() as *mut u8, PAGE_SIZE) };
	buf.fill(0);
	load.file.read_at(load.offset, &mut buf[..load.read_bytes])?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::RamDisk;
	use crate::types::SECTORS_PER_PAGE;

	fn swap_device() -> Arc<SwapDevice> {
		Arc::new(SwapDevice::new(Arc::new(RamDisk::new((4 * SECTORS_PER_PAGE) as u32))))
	}

	#[test_case]
	fn alloc_page_rejects_duplicate_mapping() {
		let mut spt = SupplementalPageTable::new(swap_device());
		let va = VirtAddr::new(0x1000);
		spt.alloc_page(va, true, PageTarget::Anon, None).unwrap();
		assert!(spt.alloc_page(va, true, PageTarget::Anon, None).is_err());
	}

	#[test_case]
	fn stack_growth_heuristic_matches_known_cases() {
		let rsp = VirtAddr::new(USER_STACK - 16);
		assert!(SupplementalPageTable::is_stack_growth(
			VirtAddr::new(rsp.as_usize() - 8),
			rsp
		));
		assert!(SupplementalPageTable::is_stack_growth(rsp, rsp));
		assert!(!SupplementalPageTable::is_stack_growth(
			VirtAddr::new(rsp.as_usize() - 9),
			rsp
		));
		assert!(!SupplementalPageTable::is_stack_growth(
			VirtAddr::new(USER_STACK - STACK_SIZE_LIMIT - PAGE_SIZE),
			rsp
		));
	}

	#[test_case]
	fn find_page_returns_none_for_unmapped_address() {
		let spt = SupplementalPageTable::new(swap_device());
		assert!(spt.find_page(VirtAddr::new(0x2000)).is_none());
	}
}
