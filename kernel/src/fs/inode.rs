// SPDX-License-Identifier: GPL-2.0

//! On-disk inode metadata and the in-memory inode cache.
//!
//! Grounded on `filesys/inode.c`: `struct inode_disk` (length, start
//! cluster, directory flag) persisted at the inode's own sector, with an
//! in-memory `struct inode` layered on top carrying `open_cnt`,
//! `deny_write_cnt`, and a deferred-removal flag. `open_inodes` there is a
//! process-wide list deduplicating inodes by sector so every open of the
//! same file shares one set of counters; `Filesystem::open_inodes` here is
//! the same idea as a `BTreeMap`.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::fs::fat::{Cluster, FatTable};
use crate::sync::Mutex;
use crate::types::DISK_SECTOR_SIZE;

/// The persisted half of an inode: everything written to its own sector.
#[derive(Debug, Clone, Copy)]
pub struct InodeDisk {
	pub length: u32,
	pub start: Cluster,
	pub is_dir: bool,
}

impl InodeDisk {
	fn to_bytes(self) -> [u8; DISK_SECTOR_SIZE] {
		let mut buf = [0u8; DISK_SECTOR_SIZE];
		buf[0..4].copy_from_slice(&self.length.to_le_bytes());
		buf[4..8].copy_from_slice(&self.start.to_le_bytes());
		buf[8] = self.is_dir as u8;
		buf
	}

	fn from_bytes(buf: &[u8; DISK_SECTOR_SIZE]) -> Self {
		Self {
			length: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
			start: Cluster::from_le_bytes(buf[4..8].try_into().unwrap()),
			is_dir: buf[8] != 0,
		}
	}
}

/// An open file or directory's in-memory bookkeeping: the persisted
/// [`InodeDisk`] plus the counters `Filesystem` consults to decide when a
/// `remove`d inode's clusters can actually be freed.
pub struct Inode {
	fat: Arc<FatTable>,
	/// The cluster holding this inode's own `InodeDisk`, distinct from the
	/// cluster chain (`data.start`) holding its contents. `None` for a
	/// standalone in-memory inode used only in tests, never flushed.
	sector: Option<Cluster>,
	data: Mutex<InodeDisk>,
	open_count: AtomicU32,
	deny_write_count: AtomicU32,
	removed: AtomicBool,
}

impl Inode {
	/// `inode_create`: reserve one cluster for `inode_sector`'s metadata,
	/// a `size`-byte data chain, and persist both.
	pub fn create(fat: &Arc<FatTable>, inode_sector: Cluster, size: u32, is_dir: bool) -> Result<()> {
		let cluster_count = (size as usize + DISK_SECTOR_SIZE - 1) / DISK_SECTOR_SIZE;
		let start = if cluster_count == 0 {
			0
		} else {
			let first_sector = fat.allocate(cluster_count)?;
			fat.to_cluster(first_sector)
		};

		for c in fat.walk(start) {
			fat.write_cluster(c, &[0u8; DISK_SECTOR_SIZE])?;
		}

		let disk = InodeDisk { length: size, start, is_dir };
		fat.write_cluster(inode_sector, &disk.to_bytes())
	}

	/// `inode_open`: read `InodeDisk` back from `sector`, with `open_cnt`
	/// starting at zero — the caller (`Filesystem::open`) bumps it.
	pub fn open(fat: Arc<FatTable>, sector: Cluster) -> Result<Self> {
		let mut buf = [0u8; DISK_SECTOR_SIZE];
		fat.read_cluster(sector, &mut buf)?;
		Ok(Self {
			fat,
			sector: Some(sector),
			data: Mutex::new(InodeDisk::from_bytes(&buf)),
			open_count: AtomicU32::new(0),
			deny_write_count: AtomicU32::new(0),
			removed: AtomicBool::new(false),
		})
	}

	/// A standalone inode with no on-disk metadata sector, for tests that
	/// only need something `FileHandle`/the VM mmap path can read and
	/// write through.
	pub fn new_in_memory(fat: Arc<FatTable>, data_start: Cluster, is_dir: bool) -> Self {
		Self {
			fat,
			sector: None,
			data: Mutex::new(InodeDisk {
				length: 0,
				start: data_start,
				is_dir,
			}),
			open_count: AtomicU32::new(0),
			deny_write_count: AtomicU32::new(0),
			removed: AtomicBool::new(false),
		}
	}

	pub fn sector(&self) -> Option<Cluster> {
		self.sector
	}

	pub fn is_dir(&self) -> bool {
		self.data.lock().is_dir
	}

	pub fn length(&self) -> u64 {
		self.data.lock().length as u64
	}

	pub(crate) fn reopen(&self) {
		self.open_count.fetch_add(1, Ordering::AcqRel);
	}

	/// `inode_read_at`: copy `buf.len()` bytes starting at `offset`,
	/// walking the cluster chain one cluster at a time. Short reads past
	/// EOF return fewer bytes, never an error.
	pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
		let data = *self.data.lock();
		if offset >= data.length as u64 {
			return Ok(0);
		}
		let readable = core::cmp::min(buf.len() as u64, data.length as u64 - offset) as usize;
		let chain = self.fat.walk(data.start);

		let mut done = 0;
		while done < readable {
			let pos = offset as usize + done;
			let cluster_idx = pos / DISK_SECTOR_SIZE;
			let cluster = *chain.get(cluster_idx).ok_or(Error::Io)?;
			let mut sector_buf = [0u8; DISK_SECTOR_SIZE];
			self.fat.read_cluster(cluster, &mut sector_buf)?;

			let in_cluster_off = pos % DISK_SECTOR_SIZE;
			let n = core::cmp::min(DISK_SECTOR_SIZE - in_cluster_off, readable - done);
			buf[done..done + n].copy_from_slice(&sector_buf[in_cluster_off..in_cluster_off + n]);
			done += n;
		}
		Ok(done)
	}

	/// `inode_write_at`: extend the chain via `FatTable::create_chain` if
	/// `offset + buf.len()` runs past the current length, then write
	/// through cluster by cluster. Refuses if `deny_write` is in effect.
	pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
		if self.deny_write_count.load(Ordering::Acquire) > 0 {
			return Err(Error::PermissionDenied);
		}
		if buf.is_empty() {
			return Ok(0);
		}

		let mut data = self.data.lock();
		let end = offset + buf.len() as u64;
		let mut chain = self.fat.walk(data.start);

		let clusters_needed = (end as usize + DISK_SECTOR_SIZE - 1) / DISK_SECTOR_SIZE;
		while chain.len() < clusters_needed {
			let prev = *chain.last().unwrap_or(&0);
			let next = self.fat.create_chain(prev);
			if next == 0 {
				return Err(Error::ENOSPC);
			}
			if data.start == 0 {
				data.start = next;
			}
			chain.push(next);
		}

		let mut done = 0;
		while done < buf.len() {
			let pos = offset as usize + done;
			let cluster_idx = pos / DISK_SECTOR_SIZE;
			let cluster = chain[cluster_idx];
			let in_cluster_off = pos % DISK_SECTOR_SIZE;
			let n = core::cmp::min(DISK_SECTOR_SIZE - in_cluster_off, buf.len() - done);

			let mut sector_buf = [0u8; DISK_SECTOR_SIZE];
			if in_cluster_off != 0 || n != DISK_SECTOR_SIZE {
				self.fat.read_cluster(cluster, &mut sector_buf)?;
			}
			sector_buf[in_cluster_off..in_cluster_off + n].copy_from_slice(&buf[done..done + n]);
			self.fat.write_cluster(cluster, &sector_buf)?;
			done += n;
		}

		if end > data.length as u64 {
			data.length = end as u32;
			if let Some(sector) = self.sector {
				self.fat.write_cluster(sector, &data.to_bytes())?;
			}
		}
		Ok(done)
	}

	pub(crate) fn deny_write(&self) {
		self.deny_write_count.fetch_add(1, Ordering::AcqRel);
	}

	pub(crate) fn allow_write(&self) {
		self.deny_write_count.fetch_sub(1, Ordering::AcqRel);
	}

	pub fn mark_removed(&self) {
		self.removed.store(true, Ordering::Release);
	}

	pub fn is_removed(&self) -> bool {
		self.removed.load(Ordering::Acquire)
	}

	/// `inode_close`: drop one reference; on the last close of a
	/// `remove`d inode, free its data chain and its own metadata cluster.
	/// Returns `true` if this closed the last reference.
	pub(crate) fn close(&self) -> Result<bool> {
		if self.open_count.fetch_sub(1, Ordering::AcqRel) != 1 {
			return Ok(false);
		}
		if self.removed.load(Ordering::Acquire) {
			let data = *self.data.lock();
			self.fat.remove_chain(data.start, 0);
			if let Some(sector) = self.sector {
				self.fat.remove_chain(sector, 0);
			}
		}
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::RamDisk;
	use crate::driver::BlockDriverOps;

	fn fat() -> Arc<FatTable> {
		let disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new(256));
		Arc::new(FatTable::format(disk, 256).unwrap())
	}

	#[test_case]
	fn create_then_open_round_trips_metadata() {
		let fat = fat();
		let inode_sector = fat.create_chain(0);
		Inode::create(&fat, inode_sector, 100, false).unwrap();
		let inode = Inode::open(fat, inode_sector).unwrap();
		assert_eq!(inode.length(), 100);
		assert!(!inode.is_dir());
	}

	#[test_case]
	fn write_then_read_round_trips_bytes() {
		let fat = fat();
		let inode_sector = fat.create_chain(0);
		Inode::create(&fat, inode_sector, 0, false).unwrap();
		let inode = Inode::open(fat, inode_sector).unwrap();

		inode.write_at(0, b"hello").unwrap();
		let mut buf = [0u8; 5];
		let n = inode.read_at(0, &mut buf).unwrap();
		assert_eq!(n, 5);
		assert_eq!(&buf, b"hello");
	}

	#[test_case]
	fn write_past_one_cluster_extends_the_chain() {
		let fat = fat();
		let inode_sector = fat.create_chain(0);
		Inode::create(&fat, inode_sector, 0, false).unwrap();
		let inode = Inode::open(fat, inode_sector).unwrap();

		let data = [0x7Au8; DISK_SECTOR_SIZE + 10];
		inode.write_at(0, &data).unwrap();
		let mut back = [0u8; DISK_SECTOR_SIZE + 10];
		inode.read_at(0, &mut back).unwrap();
		assert_eq!(&back[..], &data[..]);
	}

	#[test_case]
	fn write_refused_while_deny_write_is_active() {
		let fat = fat();
		let inode_sector = fat.create_chain(0);
		Inode::create(&fat, inode_sector, 0, false).unwrap();
		let inode = Inode::open(fat, inode_sector).unwrap();
		inode.deny_write();
		assert!(inode.write_at(0, b"x").is_err());
	}
}
