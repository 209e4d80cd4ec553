// SPDX-License-Identifier: GPL-2.0

//! Flat-root filesystem: directory entries, the open-inode cache, and the
//! syscall-facing `create`/`remove`/`open` surface.
//!
//! Grounded on `filesys/filesys.c` and `filesys/directory.c`: one root
//! directory with no subdirectories (spec.md §4's Non-goals drop the
//! directory hierarchy entirely), `filesys_create`/`filesys_remove`/
//! `filesys_open` driving an inode cache keyed by sector so concurrent
//! opens of the same file share one set of open/deny-write counters.
//! `filesys.c`'s single global lock becomes [`FILESYSTEM`]: a `Spinlock`
//! wrapping the whole [`Filesystem`], held across every directory lookup
//! and cache mutation. Reads and writes through an already-open
//! [`FileHandle`] don't take it — they only touch [`FatTable`], which has
//! its own lock.

pub mod fat;
pub mod file;
pub mod inode;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use crate::driver::BlockDriverOps;
use crate::error::{Error, Result};
use crate::fs::fat::{Cluster, FatTable, ROOT_DIR_CLUSTER};
use crate::fs::inode::Inode;
use crate::sync::Spinlock;
use crate::types::DISK_SECTOR_SIZE;

pub use file::FileHandle;

/// Longest name the flat root directory can hold.
pub const NAME_MAX: usize = 27;

/// One slot in the root directory: a name and the sector of the inode it
/// names, or a free slot when `inode_sector` is `0` (never a valid inode
/// sector — sector 0 is the boot sector).
#[derive(Debug, Clone, Copy)]
struct RawEntry {
	inode_sector: Cluster,
	name_len: u8,
	name: [u8; NAME_MAX],
}

impl RawEntry {
	const SIZE: usize = 4 + 1 + NAME_MAX;

	fn free() -> Self {
		Self {
			inode_sector: 0,
			name_len: 0,
			name: [0; NAME_MAX],
		}
	}

	fn named(name: &str, inode_sector: Cluster) -> Result<Self> {
		if name.is_empty() || name.len() > NAME_MAX {
			return Err(Error::InvalidArgument);
		}
		let mut raw = [0u8; NAME_MAX];
		raw[..name.len()].copy_from_slice(name.as_bytes());
		Ok(Self {
			inode_sector,
			name_len: name.len() as u8,
			name: raw,
		})
	}

	fn name(&self) -> &[u8] {
		&self.name[..self.name_len as usize]
	}

	fn to_bytes(self) -> [u8; Self::SIZE] {
		let mut buf = [0u8; Self::SIZE];
		buf[0..4].copy_from_slice(&self.inode_sector.to_le_bytes());
		buf[4] = self.name_len;
		buf[5..5 + NAME_MAX].copy_from_slice(&self.name);
		buf
	}

	fn from_bytes(buf: &[u8]) -> Self {
		Self {
			inode_sector: Cluster::from_le_bytes(buf[0..4].try_into().unwrap()),
			name_len: buf[4],
			name: buf[5..5 + NAME_MAX].try_into().unwrap(),
		}
	}
}

const ENTRIES_PER_SECTOR: usize = DISK_SECTOR_SIZE / RawEntry::SIZE;

/// Where a directory entry lives: which cluster, and which slot within it.
struct EntryLocation {
	cluster: Cluster,
	index: usize,
}

/// A mounted FAT filesystem plus the inodes it currently has open.
pub struct Filesystem {
	fat: Arc<FatTable>,
	open_inodes: BTreeMap<Cluster, Arc<Inode>>,
}

impl Filesystem {
	fn read_dir_sector(&self, cluster: Cluster) -> Result<[u8; DISK_SECTOR_SIZE]> {
		let mut buf = [0u8; DISK_SECTOR_SIZE];
		self.fat.read_cluster(cluster, &mut buf)?;
		Ok(buf)
	}

	fn find_entry(&self, name: &str) -> Option<(EntryLocation, RawEntry)> {
		for cluster in self.fat.walk(ROOT_DIR_CLUSTER) {
			let buf = self.read_dir_sector(cluster).ok()?;
			for index in 0..ENTRIES_PER_SECTOR {
				let raw = RawEntry::from_bytes(&buf[index * RawEntry::SIZE..(index + 1) * RawEntry::SIZE]);
				if raw.inode_sector != 0 && raw.name() == name.as_bytes() {
					return Some((EntryLocation { cluster, index }, raw));
				}
			}
		}
		None
	}

	fn write_entry(&self, loc: &EntryLocation, entry: RawEntry) -> Result<()> {
		let mut buf = self.read_dir_sector(loc.cluster)?;
		let start = loc.index * RawEntry::SIZE;
		buf[start..start + RawEntry::SIZE].copy_from_slice(&entry.to_bytes());
		self.fat.write_cluster(loc.cluster, &buf)
	}

	fn insert_entry(&mut self, name: &str, inode_sector: Cluster) -> Result<()> {
		let entry = RawEntry::named(name, inode_sector)?;

		let mut last = ROOT_DIR_CLUSTER;
		for cluster in self.fat.walk(ROOT_DIR_CLUSTER) {
			last = cluster;
			let buf = self.read_dir_sector(cluster)?;
			for index in 0..ENTRIES_PER_SECTOR {
				let raw = RawEntry::from_bytes(&buf[index * RawEntry::SIZE..(index + 1) * RawEntry::SIZE]);
				if raw.inode_sector == 0 {
					return self.write_entry(&EntryLocation { cluster, index }, entry);
				}
			}
		}

		let next = self.fat.create_chain(last);
		if next == 0 {
			return Err(Error::ENOSPC);
		}
		self.fat.write_cluster(next, &[0u8; DISK_SECTOR_SIZE])?;
		self.write_entry(&EntryLocation { cluster: next, index: 0 }, entry)
	}

	/// `filesys_create`: reserve an inode sector and data chain, then link
	/// `name` to it from the root directory. Rolls back the inode on
	/// failure to link, so a crowded directory never leaks clusters.
	pub fn create(&mut self, name: &str, size: u32) -> Result<()> {
		if self.find_entry(name).is_some() {
			return Err(Error::AlreadyExists);
		}
		let inode_sector = self.fat.create_chain(0);
		if inode_sector == 0 {
			return Err(Error::ENOSPC);
		}
		if let Err(e) = Inode::create(&self.fat, inode_sector, size, false) {
			self.fat.remove_chain(inode_sector, 0);
			return Err(e);
		}
		if let Err(e) = self.insert_entry(name, inode_sector) {
			self.fat.remove_chain(inode_sector, 0);
			return Err(e);
		}
		Ok(())
	}

	/// `filesys_remove`: unlink `name` immediately; the inode itself (and
	/// its clusters) survive until every open [`FileHandle`] on it closes,
	/// via [`Inode::mark_removed`]'s deferred-removal accounting.
	pub fn remove(&mut self, name: &str) -> Result<()> {
		let (loc, entry) = self.find_entry(name).ok_or(Error::NotFound)?;
		self.write_entry(&loc, RawEntry::free())?;

		if let Some(inode) = self.open_inodes.get(&entry.inode_sector) {
			inode.mark_removed();
		} else {
			let inode = Inode::open(self.fat.clone(), entry.inode_sector)?;
			inode.reopen();
			inode.mark_removed();
			inode.close()?;
		}
		Ok(())
	}

	/// `filesys_open`: look `name` up and hand back a fresh [`FileHandle`]
	/// on its inode, sharing the cached `Arc<Inode>` with every other
	/// handle already open on the same sector.
	pub fn open(&mut self, name: &str) -> Result<FileHandle> {
		let (_, entry) = self.find_entry(name).ok_or(Error::NotFound)?;

		let inode = match self.open_inodes.get(&entry.inode_sector) {
			Some(inode) => inode.clone(),
			None => {
				let inode = Arc::new(Inode::open(self.fat.clone(), entry.inode_sector)?);
				self.open_inodes.insert(entry.inode_sector, inode.clone());
				inode
			}
		};
		inode.reopen();
		Ok(FileHandle::open(inode))
	}

	/// `file_close`, plus dropping this filesystem's cache entry once the
	/// inode has no handles left — the counterpart of `open`'s insert.
	pub fn close(&mut self, handle: FileHandle) -> Result<()> {
		let sector = handle.inode().sector();
		let last = handle.close()?;
		if last {
			if let Some(sector) = sector {
				self.open_inodes.remove(&sector);
			}
		}
		Ok(())
	}
}

/// The one mounted filesystem, guarding every directory lookup and cache
/// mutation — `filesys.c`'s single global lock, carried as a `Spinlock`
/// around the whole [`Filesystem`] rather than a lock field inside it.
static FILESYSTEM: Spinlock<Option<Filesystem>> = Spinlock::new(None);

fn with_filesystem<R>(f: impl FnOnce(&mut Filesystem) -> Result<R>) -> Result<R> {
	let mut guard = FILESYSTEM.lock();
	let fs = guard.as_mut().ok_or(Error::NotInitialized)?;
	f(fs)
}

/// `filesys_format` + `filesys_init(true)`: lay a fresh FAT filesystem over
/// `disk` and mount it.
pub fn format(disk: Arc<dyn BlockDriverOps>, total_sectors: u32) -> Result<()> {
	let fat = Arc::new(FatTable::format(disk, total_sectors)?);
	*FILESYSTEM.lock() = Some(Filesystem {
		fat,
		open_inodes: BTreeMap::new(),
	});
	Ok(())
}

/// `filesys_init(false)`: mount the FAT filesystem already on `disk`.
pub fn mount(disk: Arc<dyn BlockDriverOps>) -> Result<()> {
	let fat = Arc::new(FatTable::open(disk)?);
	*FILESYSTEM.lock() = Some(Filesystem {
		fat,
		open_inodes: BTreeMap::new(),
	});
	Ok(())
}

/// `filesys_done`: flush the FAT back to disk. Open handles outlive this;
/// only a fresh `format`/`mount` replaces the table they point at.
pub fn unmount() -> Result<()> {
	with_filesystem(|fs| fs.fat.close())
}

pub fn create(name: &str, size: u32) -> Result<()> {
	with_filesystem(|fs| fs.create(name, size))
}

pub fn remove(name: &str) -> Result<()> {
	with_filesystem(|fs| fs.remove(name))
}

pub fn open(name: &str) -> Result<FileHandle> {
	with_filesystem(|fs| fs.open(name))
}

pub fn close(handle: FileHandle) -> Result<()> {
	with_filesystem(|fs| fs.close(handle))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::block::RamDisk;

	fn setup() {
		let disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new(256));
		format(disk, 256).unwrap();
	}

	#[test_case]
	fn create_then_open_round_trips_writes() {
		setup();
		create("greeting", 0).unwrap();
		let handle = open("greeting").unwrap();
		handle.write(b"hello").unwrap();
		close(handle).unwrap();

		let handle = open("greeting").unwrap();
		let mut buf = [0u8; 5];
		handle.read(&mut buf).unwrap();
		assert_eq!(&buf, b"hello");
		close(handle).unwrap();
	}

	#[test_case]
	fn create_rejects_duplicate_names() {
		setup();
		create("a", 0).unwrap();
		assert!(matches!(create("a", 0), Err(Error::AlreadyExists)));
	}

	#[test_case]
	fn open_missing_name_fails() {
		setup();
		assert!(matches!(open("missing"), Err(Error::NotFound)));
	}

	#[test_case]
	fn remove_defers_reclaim_until_last_close() {
		setup();
		create("doomed", 0).unwrap();
		let handle = open("doomed").unwrap();
		remove("doomed").unwrap();

		// Unlinked: a second open by name fails immediately...
		assert!(matches!(open("doomed"), Err(Error::NotFound)));
		// ...but the still-open handle keeps working until it closes.
		handle.write(b"x").unwrap();
		close(handle).unwrap();
	}

	#[test_case]
	fn many_files_spill_the_root_directory_into_a_second_cluster() {
		setup();
		for i in 0..20u32 {
			let name = alloc::format!("f{}", i);
			create(&name, 0).unwrap();
		}
		for i in 0..20u32 {
			let name = alloc::format!("f{}", i);
			close(open(&name).unwrap()).unwrap();
		}
	}
}
