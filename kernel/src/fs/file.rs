// SPDX-License-Identifier: GPL-2.0

//! Open-file handles: position, deny-write, duplication.
//!
//! Grounded on `filesys/file.c`'s `struct file` (`inode`, `pos`,
//! `deny_write`), with `file_read_at`/`file_write_at`/`file_seek`/
//! `file_tell`/`file_length`/`file_deny_write`/`file_allow_write`/
//! `file_reopen`/`file_close` carried over as methods.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicI64, Ordering};

use crate::error::Result;
use crate::fs::inode::Inode;

/// One open handle on an [`Inode`]. Cheap to duplicate — cloning the
/// `Arc<FileHandle>` (as `dup2` does) shares this handle's position;
/// [`FileHandle::duplicate`] instead opens a second, independent handle on
/// the same inode, the way `file_reopen` does for `fork` and `mmap`.
pub struct FileHandle {
	inode: Arc<Inode>,
	position: AtomicI64,
	deny_write: bool,
}

impl FileHandle {
	/// `file_open`: wrap an already-open inode reference. The caller is
	/// responsible for having bumped `inode`'s open count (`Filesystem::open`
	/// does this when it hands out the first handle on a sector).
	pub fn open(inode: Arc<Inode>) -> Self {
		Self {
			inode,
			position: AtomicI64::new(0),
			deny_write: false,
		}
	}

	pub fn inode(&self) -> &Arc<Inode> {
		&self.inode
	}

	/// `file_read`: read at the current position and advance it.
	pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
		let pos = self.position.load(Ordering::Acquire) as u64;
		let n = self.inode.read_at(pos, buf)?;
		self.position.fetch_add(n as i64, Ordering::AcqRel);
		Ok(n)
	}

	/// `file_read_at`: read at an explicit offset, position untouched.
	pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
		self.inode.read_at(offset, buf)
	}

	/// `file_write`: write at the current position and advance it.
	pub fn write(&self, buf: &[u8]) -> Result<usize> {
		let pos = self.position.load(Ordering::Acquire) as u64;
		let n = self.inode.write_at(pos, buf)?;
		self.position.fetch_add(n as i64, Ordering::AcqRel);
		Ok(n)
	}

	/// `file_write_at`: write at an explicit offset, position untouched —
	/// used by eviction write-back and mmap unmap write-back.
	pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
		self.inode.write_at(offset, buf)
	}

	/// `file_seek`.
	pub fn seek(&self, pos: u64) {
		self.position.store(pos as i64, Ordering::Release);
	}

	/// `file_tell`.
	pub fn tell(&self) -> u64 {
		self.position.load(Ordering::Acquire) as u64
	}

	/// `file_length`.
	pub fn length(&self) -> u64 {
		self.inode.length()
	}

	/// `file_deny_write`: this handle's inode refuses every write (not
	/// just writes through this handle) until a matching `allow_write`,
	/// used while a process's own executable is running.
	pub fn deny_write(&mut self) {
		if !self.deny_write {
			self.inode.deny_write();
			self.deny_write = true;
		}
	}

	pub fn allow_write(&mut self) {
		if self.deny_write {
			self.inode.allow_write();
			self.deny_write = false;
		}
	}

	/// `file_reopen`: a second, independent handle on the same inode —
	/// fresh position, but the deny-write state (and thus the inode's
	/// deny count) carries over, matching spec.md §4.2's "inherits
	/// deny-write state".
	pub fn duplicate(&self) -> Result<FileHandle> {
		self.inode.reopen();
		let mut dup = FileHandle::open(self.inode.clone());
		if self.deny_write {
			dup.deny_write();
		}
		Ok(dup)
	}

	/// `file_close`: drop this handle's reference to the inode, freeing
	/// its clusters if this was the last reference to a removed file.
	/// Returns `true` when this closed the inode's last reference, so
	/// `Filesystem::close` knows to drop its cache entry too.
	pub fn close(mut self) -> Result<bool> {
		self.allow_write();
		self.inode.close()
	}
}
