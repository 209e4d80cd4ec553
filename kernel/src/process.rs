// SPDX-License-Identifier: GPL-2.0

//! Process lifecycle: `fork`, `exec`, `wait`, `exit`.
//!
//! Grounded on `userprog/process.c`: `process_fork`/`process_exec`/
//! `process_wait`/`process_exit`. The parent/child handshake record
//! (`struct process`'s `exit_status`/`fork_succ`/`sema_fork`/`sema_wait`/
//! `is_orphan`) is split out into [`ProcessBank`], shared via `Arc` between
//! a `Process` and whichever of its parent or children still cares about its
//! outcome, so either side can tear its own `Process` down without the
//! bank disappearing out from under the other.
//!
//! Thread creation and scheduling are the (out-of-scope) scheduler's job;
//! this module hands the scheduler a fully-prepared [`Process`] plus, for a
//! freshly loaded image, the [`Context`] it should resume with.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use crate::arch::x86_64::context::Context;
use crate::block::RamDisk;
use crate::driver::BlockDriverOps;
use crate::error::{Error, Result};
use crate::fs::file::FileHandle;
use crate::memory::mmap::MmapTable;
use crate::memory::page_table::PageTableManager;
use crate::memory::spt::{LazyFileLoad, PageTarget, SupplementalPageTable};
use crate::memory::swap::SwapDevice;
use crate::sync::{Mutex, Semaphore, Spinlock};
use crate::types::{Pid, VirtAddr, PAGE_SIZE, USER_STACK};

/// `fd 0`/`fd 1` are reserved for stdin/stdout (spec.md §6); real
/// file-backed descriptors start here.
const FIRST_FD: i32 = 2;

const DEFAULT_SWAP_SECTORS: u32 = 2048;

/// Shared between a [`Process`] and its parent across fork/wait/exit,
/// outliving whichever side's `Process` is torn down first. Mirrors
/// `struct process`'s bank fields, split out because the parent and child
/// `Process` records have independent lifetimes.
pub struct ProcessBank {
	pid: Pid,
	exit_status: Spinlock<Option<i32>>,
	exit_mark: AtomicBool,
	/// Set by the parent's `exit` on a still-live child it is abandoning, so
	/// the child's own `exit` knows no `wait` will ever consume its status.
	orphan: AtomicBool,
	/// Signaled once by the child after it finishes (or fails) duplicating
	/// the parent's address space.
	sema_fork: Semaphore,
	/// Signaled once by the child's `exit`, downed by `wait`.
	sema_wait: Semaphore,
}

impl ProcessBank {
	fn new(pid: Pid) -> Arc<Self> {
		Arc::new(Self {
			pid,
			exit_status: Spinlock::new(None),
			exit_mark: AtomicBool::new(false),
			orphan: AtomicBool::new(false),
			sema_fork: Semaphore::new(0),
			sema_wait: Semaphore::new(0),
		})
	}

	pub fn pid(&self) -> Pid {
		self.pid
	}

	pub fn has_exited(&self) -> bool {
		self.exit_mark.load(Ordering::Acquire)
	}

	pub fn is_orphan(&self) -> bool {
		self.orphan.load(Ordering::Acquire)
	}
}

/// One user process's full resource set: address space, open files, and
/// the bank it shares with whichever of parent/children still reference it.
pub struct Process {
	pid: Pid,
	parent: Option<Pid>,
	name: Spinlock<String>,
	bank: Arc<ProcessBank>,
	children: Mutex<Vec<Arc<ProcessBank>>>,
	pml4: Arc<Mutex<PageTableManager>>,
	spt: Arc<Mutex<SupplementalPageTable>>,
	mmaps: Mutex<MmapTable>,
	open_files: Mutex<BTreeMap<i32, Arc<FileHandle>>>,
	next_fd: AtomicI32,
	/// The process's own executable, kept open (and deny-write) for its
	/// lifetime — `process_exec`'s `file_deny_write(file)`.
	exec_file: Mutex<Option<FileHandle>>,
}

impl Process {
	pub fn pid(&self) -> Pid {
		self.pid
	}

	pub fn parent_pid(&self) -> Option<Pid> {
		self.parent
	}

	pub fn name(&self) -> String {
		self.name.lock().clone()
	}

	pub fn pml4(&self) -> &Arc<Mutex<PageTableManager>> {
		&self.pml4
	}

	pub fn spt(&self) -> &Arc<Mutex<SupplementalPageTable>> {
		&self.spt
	}

	pub fn mmaps(&self) -> &Mutex<MmapTable> {
		&self.mmaps
	}

	fn new(pid: Pid, parent: Option<Pid>, name: &str) -> Result<Arc<Self>> {
		let swap = swap_device()?;
		Ok(Arc::new(Self {
			pid,
			parent,
			name: Spinlock::new(name.to_string()),
			bank: ProcessBank::new(pid),
			children: Mutex::new(Vec::new()),
			pml4: Arc::new(Mutex::new(PageTableManager::new()?)),
			spt: Arc::new(Mutex::new(SupplementalPageTable::new(swap))),
			mmaps: Mutex::new(MmapTable::new()),
			open_files: Mutex::new(BTreeMap::new()),
			next_fd: AtomicI32::new(FIRST_FD),
			exec_file: Mutex::new(None),
		}))
	}

	/// Install a fresh handle at the lowest free fd, returning it.
	pub fn install_fd(&self, handle: FileHandle) -> i32 {
		let fd = self.next_fd.fetch_add(1, Ordering::AcqRel);
		self.open_files.lock().insert(fd, Arc::new(handle));
		fd
	}

	/// `convert_fd`: look a descriptor up, failing closed (never a silent
	/// null) per SPEC_FULL.md §4.6's resolution of the open question.
	pub fn get_fd(&self, fd: i32) -> Result<Arc<FileHandle>> {
		self.open_files.lock().get(&fd).cloned().ok_or(Error::EBADF)
	}

	/// `sys_close`: drop this process's reference to `fd`. Closing the
	/// filesystem's last handle on the underlying inode happens inside
	/// `fs::close`.
	pub fn close_fd(&self, fd: i32) -> Result<()> {
		let handle = self.open_files.lock().remove(&fd).ok_or(Error::EBADF)?;
		match Arc::try_unwrap(handle) {
			Ok(handle) => crate::fs::close(handle),
			// Still referenced by another fd (`dup2`'s alias); nothing to
			// close yet.
			Err(_) => Ok(()),
		}
	}

	/// `sys_dup2`: alias `new` to the same handle as `old`, sharing its
	/// position (SPEC_FULL.md §10). `dup2(old, old)` is a no-op success.
	pub fn dup2(&self, old: i32, new: i32) -> Result<i32> {
		if old == new {
			self.get_fd(old)?;
			return Ok(new);
		}
		let handle = self.get_fd(old)?;
		let previous = self.open_files.lock().insert(new, handle);
		if let Some(previous) = previous {
			if let Ok(previous) = Arc::try_unwrap(previous) {
				crate::fs::close(previous).ok();
			}
		}
		Ok(new)
	}
}

/// The live process table, keyed by pid.
static PROCESS_TABLE: Spinlock<BTreeMap<Pid, Arc<Process>>> = Spinlock::new(BTreeMap::new());
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

/// The one swap device every process's SPT shares (spec.md §3's "swap
/// device every anonymous page shares").
static SWAP_DEVICE: Spinlock<Option<Arc<SwapDevice>>> = Spinlock::new(None);

fn allocate_pid() -> Pid {
	Pid(NEXT_PID.fetch_add(1, Ordering::AcqRel))
}

fn swap_device() -> Result<Arc<SwapDevice>> {
	SWAP_DEVICE.lock().clone().ok_or(Error::NotInitialized)
}

/// Bring up the swap device backing every process's anonymous pages with a
/// default in-memory disk. Call once at boot, after the filesystem has been
/// mounted; a no-op if [`init_swap`] already ran.
pub fn init() -> Result<()> {
	if SWAP_DEVICE.lock().is_none() {
		let disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new(DEFAULT_SWAP_SECTORS));
		*SWAP_DEVICE.lock() = Some(Arc::new(SwapDevice::new(disk)));
	}
	Ok(())
}

/// Initialize the swap device from a caller-supplied disk, for callers that
/// want a differently sized or differently backed swap area than [`init`]'s
/// default.
pub fn init_swap(disk: Arc<dyn BlockDriverOps>) {
	*SWAP_DEVICE.lock() = Some(Arc::new(SwapDevice::new(disk)));
}

pub fn current_process() -> Option<Arc<Process>> {
	let pid = crate::scheduler::current_task()?;
	PROCESS_TABLE.lock().get(&pid).cloned()
}

/// The running process's pid, without paying for the `Arc<Process>` lookup.
pub fn current_process_pid() -> Option<Pid> {
	crate::scheduler::current_task()
}

pub fn find_process(pid: Pid) -> Option<Arc<Process>> {
	PROCESS_TABLE.lock().get(&pid).cloned()
}

/// One loadable segment of a parsed ELF image: a page-aligned run of
/// `file_size` real bytes followed by `mem_size - file_size` zero bytes
/// (`.bss`), installed as lazily-loaded pages.
struct ElfSegment {
	va: u64,
	file_offset: u64,
	file_size: u64,
	mem_size: u64,
	writable: bool,
}

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const PT_LOAD: u32 = 1;
const PF_W: u32 = 1 << 1;

/// Read and validate the ELF64 header and program header table, grounded
/// on the standard ELF64 layout (the teacher's `usermode::SimpleElfHeader`
/// was never wired to real bytes; this reads straight off the file the way
/// an ELF loader front-end would before handing segments to the VM
/// subsystem).
fn parse_elf(file: &FileHandle) -> Result<(u64, Vec<ElfSegment>)> {
	let mut ehdr = [0u8; 64];
	let n = file.read_at(0, &mut ehdr)?;
	if n != ehdr.len() || ehdr[0..4] != ELF_MAGIC || ehdr[4] != 2
	/* ELFCLASS64 */
	{
		return Err(Error::InvalidArgument);
	}

	let entry = u64::from_le_bytes(ehdr[24..32].try_into().unwrap());
	let phoff = u64::from_le_bytes(ehdr[32..40].try_into().unwrap());
	let phentsize = u16::from_le_bytes(ehdr[54..56].try_into().unwrap()) as u64;
	let phnum = u16::from_le_bytes(ehdr[56..58].try_into().unwrap()) as u64;

	let mut segments = Vec::new();
	for i in 0..phnum {
		let mut phdr = [0u8; 56];
		file.read_at(phoff + i * phentsize, &mut phdr)?;
		let p_type = u32::from_le_bytes(phdr[0..4].try_into().unwrap());
		if p_type != PT_LOAD {
			continue;
		}
		let p_flags = u32::from_le_bytes(phdr[4..8].try_into().unwrap());
		let p_offset = u64::from_le_bytes(phdr[8..16].try_into().unwrap());
		let p_vaddr = u64::from_le_bytes(phdr[16..24].try_into().unwrap());
		let p_filesz = u64::from_le_bytes(phdr[32..40].try_into().unwrap());
		let p_memsz = u64::from_le_bytes(phdr[40..48].try_into().unwrap());
		segments.push(ElfSegment {
			va: p_vaddr,
			file_offset: p_offset,
			file_size: p_filesz,
			mem_size: p_memsz,
			writable: p_flags & PF_W != 0,
		});
	}
	Ok((entry, segments))
}

/// Install one ELF segment as a run of uninit→file pages, page-aligned per
/// `process_exec`'s `load_segment`: the first `file_size` bytes of the
/// range are read lazily from `file`, the rest zero-filled on first fault.
fn install_segment(spt: &mut SupplementalPageTable, file: &Arc<FileHandle>, seg: &ElfSegment) -> Result<()> {
	let page_base = seg.va & !((PAGE_SIZE as u64) - 1);
	let page_offset_in_page = seg.va - page_base;
	let span = page_offset_in_page + seg.mem_size;
	let page_count = ((span + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64) as usize;

	for i in 0..page_count {
		let va = VirtAddr::new((page_base + (i as u64) * PAGE_SIZE as u64) as usize);
		let page_start_in_segment = (i as u64) * PAGE_SIZE as u64;
		let offset_into_page = if i == 0 { page_offset_in_page } else { 0 };

		let consumed_before_this_page = page_start_in_segment.saturating_sub(page_offset_in_page);
		let file_remaining = seg.file_size.saturating_sub(consumed_before_this_page);
		let read_bytes = core::cmp::min(PAGE_SIZE as u64 - offset_into_page, file_remaining) as usize;

		let aux = if read_bytes > 0 {
			Some(LazyFileLoad {
				file: file.clone(),
				offset: seg.file_offset + consumed_before_this_page,
				read_bytes: offset_into_page as usize + read_bytes,
			})
		} else {
			None
		};

		if spt.find_page(va).is_some() {
			continue;
		}
		spt.alloc_page(va, seg.writable, PageTarget::File, aux)?;
	}
	Ok(())
}

/// Build the argv layout on a single freshly mapped stack page, matching
/// `process_exec`'s `argument_stack`: strings (in argv order), word
/// alignment, a null sentinel, the pointer array in reverse, and a fake
/// return address.
fn setup_stack(kva: usize, path: &str, args: &[String]) -> u64 {
	let page_top = kva + PAGE_SIZE;
	let mut sp = page_top;

	let mut pointers = Vec::with_capacity(args.len() + 1);
	// Argument 0 is the program path itself, matching `cmd_line` conventions.
	for arg in core::iter::once(path).chain(args.iter().map(String::as_str)) {
		let bytes = arg.as_bytes();
		sp -= bytes.len() + 1;
		unsafe {
			core::ptr::copy_nonoverlapping(bytes.as_ptr(), sp as *mut u8, bytes.len());
			*((sp + bytes.len()) as *mut u8) = 0;
		}
		pointers.push(sp as u64);
	}

	sp &= !0x7; // word-align

	sp -= 8; // null sentinel terminating argv
	unsafe { *(sp as *mut u64) = 0 };

	for &ptr in &pointers {
		sp -= 8;
		unsafe { *(sp as *mut u64) = ptr };
	}

	sp -= 8; // fake return address
	unsafe { *(sp as *mut u64) = 0 };

	sp as u64
}

/// Load `path` into a fresh address space (`pml4`/`spt` are already empty)
/// and produce the `Context` the scheduler should resume with, plus the
/// now-deny-write-pending executable handle. Shared by [`bootstrap`]
/// (brand-new process) and [`exec`] (in-place replacement, after the caller
/// has already torn down its previous image).
fn load_image(
	pml4: &Arc<Mutex<PageTableManager>>,
	spt: &Arc<Mutex<SupplementalPageTable>>,
	path: &str,
	args: &[String],
) -> Result<(Context, FileHandle)> {
	let file = crate::fs::open(path)?;
	let (entry, segments) = match parse_elf(&file) {
		Ok(v) => v,
		Err(e) => {
			crate::fs::close(file).ok();
			return Err(e);
		}
	};

	let shared_file = Arc::new(file);
	{
		let mut guard = spt.lock();
		for seg in &segments {
			if let Err(e) = install_segment(&mut guard, &shared_file, seg) {
				guard.destroy_all(pml4);
				return Err(e);
			}
		}
	}

	let stack_va = VirtAddr::new(USER_STACK - PAGE_SIZE);
	spt.lock().alloc_page(stack_va, true, PageTarget::Anon, None)?;

	// Force the stack page resident now so argv can be written directly
	// through its kva; the dummy context's rsp is irrelevant because the
	// page already exists in the SPT (no stack-growth decision is made).
	let dummy_ctx = Context::new();
	spt.lock()
		.handle_fault(stack_va, true, true, true, &dummy_ctx, pml4, spt)?;

	let kva = pml4.lock().translate(stack_va).ok_or(Error::Generic)?.as_usize();
	let rsp = setup_stack(kva, path, args);

	let cr3 = pml4.lock().root_table_addr().as_u64();
	let mut ctx = Context::new_user(entry, rsp, cr3);
	ctx.rflags |= 0x200;

	let file = match Arc::try_unwrap(shared_file) {
		Ok(file) => file,
		// Still referenced by a lazily-loaded segment's aux; reopen our own
		// handle for the deny-write lifetime instead.
		Err(arc) => arc.duplicate()?,
	};
	Ok((ctx, file))
}

/// `process_execute`-equivalent bootstrap for the very first process (no
/// parent to fork from): build a brand-new address space, load `path`, and
/// register it. Returns the pid and the `Context` the scheduler should
/// dispatch it with.
pub fn bootstrap(path: &str, args: &[String]) -> Result<(Pid, Context)> {
	let pid = allocate_pid();
	let process = Process::new(pid, None, path)?;

	let (ctx, mut file) = load_image(&process.pml4, &process.spt, path, args)?;
	file.deny_write();
	*process.exec_file.lock() = Some(file);

	PROCESS_TABLE.lock().insert(pid, process);
	crate::scheduler::add_task(pid)?;
	Ok((pid, ctx))
}

/// `process_fork`: duplicate the calling process's address space and open
/// files into a new child. The duplication — the work the forked child
/// performs on its own stack before signaling `sema_fork` in the original —
/// runs synchronously in the parent's call here, since spawning a kernel
/// thread to run it on is the (out-of-scope) scheduler's concern. Returns
/// the child pid and the `Context` the scheduler should dispatch it with
/// (rax forced to 0, the child's view of fork's return value).
pub fn fork(parent: &Arc<Process>, child_name: &str, ctx: &Context) -> Result<(Pid, Context)> {
	let child_pid = allocate_pid();
	let child = Process::new(child_pid, Some(parent.pid), child_name)?;

	let result = (|| -> Result<()> {
		{
			let mut parent_spt = parent.spt.lock();
			let mut child_spt = child.spt.lock();
			child_spt.copy_from(&child.spt, &mut parent_spt, &parent.spt, &parent.pml4, &child.pml4)?;
		}

		let files: Vec<(i32, Arc<FileHandle>)> = parent
			.open_files
			.lock()
			.iter()
			.map(|(&fd, handle)| (fd, handle.clone()))
			.collect();
		for (fd, handle) in files {
			let dup = handle.duplicate()?;
			child.open_files.lock().insert(fd, Arc::new(dup));
		}
		child.next_fd.store(parent.next_fd.load(Ordering::Acquire), Ordering::Release);
		Ok(())
	})();

	child.bank.sema_fork.up();
	// The handshake `process_fork` performs across two kernel threads
	// collapses to an immediately-satisfied down: the work above already
	// ran to completion before we get here.
	child.bank.sema_fork.down();

	result?;

	let mut child_ctx = *ctx;
	child_ctx.rax = 0; // fork() returns 0 in the child
	child_ctx.cr3 = child.pml4.lock().root_table_addr().as_u64();

	parent.children.lock().push(child.bank.clone());
	PROCESS_TABLE.lock().insert(child_pid, child);
	crate::scheduler::add_task(child_pid)?;

	Ok((child_pid, child_ctx))
}

/// `process_exec`: tear down the calling process's current image in place
/// and load a new one. Never returns on success — it hands the fresh
/// `Context` straight to [`Context::restore`], which resumes user mode
/// directly, matching spec.md §4.6's "resumes user mode" and
/// SPEC_FULL.md §4.6's "modeled as not returning on the success path".
pub fn exec(process: &Arc<Process>, path: &str, args: &[String]) -> Result<core::convert::Infallible> {
	process.spt.lock().destroy_all(&process.pml4);
	process.pml4.lock().destroy();
	*process.pml4.lock() = PageTableManager::new()?;

	if let Some(old) = process.exec_file.lock().take() {
		crate::fs::close(old).ok();
	}

	let (ctx, mut file) = load_image(&process.pml4, &process.spt, path, args)?;
	file.deny_write();
	*process.exec_file.lock() = Some(file);
	*process.name.lock() = path.to_string();

	unsafe { ctx.restore() }
}

/// `process_wait`: block until `child_pid` exits (or reap it immediately if
/// it already has), then consume its bank. A pid can only be waited once —
/// the bank is removed from the child list up front, so a second wait on
/// the same pid fails with [`Error::ECHILD`] per SPEC_FULL.md §4.6's
/// `iter().find(|bank| bank.pid == child_tid)` resolution.
pub fn wait(process: &Arc<Process>, child_pid: Pid) -> Result<i32> {
	let bank = {
		let mut children = process.children.lock();
		let idx = children.iter().position(|bank| bank.pid == child_pid).ok_or(Error::ECHILD)?;
		children.remove(idx)
	};

	bank.sema_wait.down();
	bank.exit_status.lock().ok_or(Error::ECHILD)
}

/// `process_exit`: close every open resource, publish the exit status, and
/// settle accounts with both the parent (signal `sema_wait`) and every
/// still-live child (mark orphan). Sweeps the *entire* child list, not just
/// the first entry — a REDESIGN FLAG resolution recorded in DESIGN.md.
pub fn exit(process: &Arc<Process>, status: i32) {
	{
		let fds: Vec<i32> = process.open_files.lock().keys().copied().collect();
		for fd in fds {
			if let Some(handle) = process.open_files.lock().remove(&fd) {
				if let Ok(handle) = Arc::try_unwrap(handle) {
					crate::fs::close(handle).ok();
				}
			}
		}
	}
	if let Some(exec_file) = process.exec_file.lock().take() {
		crate::fs::close(exec_file).ok();
	}

	{
		let mut children = process.children.lock();
		for bank in children.drain(..) {
			// A child that already exited is simply dropped — nothing else
			// references its bank once it's out of this list. A still-live
			// child is told it is now orphaned, so its own `exit` knows no
			// one will ever `wait` it.
			if !bank.has_exited() {
				bank.orphan.store(true, Ordering::Release);
			}
		}
	}

	process.spt.lock().destroy_all(&process.pml4);
	process.pml4.lock().destroy();

	// An orphaned process has no parent left to `wait` it — the parent
	// already dropped its bank from its own child list — so there is
	// nothing to publish a status or signal a waiter for.
	if !process.bank.is_orphan() {
		*process.bank.exit_status.lock() = Some(status);
		process.bank.exit_mark.store(true, Ordering::Release);
		process.bank.sema_wait.up();
	}

	crate::scheduler::remove_task(process.pid).ok();
	PROCESS_TABLE.lock().remove(&process.pid);
}

/// Entry point the (out-of-scope) interrupt trampoline calls on a page
/// fault: translate the raw fault into the SPT's decision tree.
pub fn handle_page_fault(
	process: &Arc<Process>,
	fault_addr: VirtAddr,
	not_present: bool,
	write: bool,
	user: bool,
	ctx: &Context,
) -> Result<()> {
	process
		.spt
		.lock()
		.handle_fault(fault_addr, not_present, write, user, ctx, &process.pml4, &process.spt)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fs;

	fn setup_fs() {
		let disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new(256));
		fs::format(disk, 256).ok();
		let swap_disk: Arc<dyn BlockDriverOps> = Arc::new(RamDisk::new(64));
		init_swap(swap_disk);
	}

	#[test_case]
	fn process_bank_reports_no_exit_before_exit_is_called() {
		let bank = ProcessBank::new(Pid(42));
		assert!(!bank.has_exited());
	}

	#[test_case]
	fn install_fd_and_close_fd_round_trip() {
		setup_fs();
		fs::create("p", 0).ok();
		let handle = fs::open("p").unwrap();
		let process = Process::new(Pid(1), None, "p").unwrap();
		let fd = process.install_fd(handle);
		assert!(fd >= FIRST_FD);
		assert!(process.get_fd(fd).is_ok());
		process.close_fd(fd).unwrap();
		assert!(matches!(process.get_fd(fd), Err(Error::EBADF)));
	}

	#[test_case]
	fn dup2_aliases_shared_position() {
		setup_fs();
		fs::create("q", 0).ok();
		let handle = fs::open("q").unwrap();
		let process = Process::new(Pid(2), None, "q").unwrap();
		let fd = process.install_fd(handle);
		let dup = process.dup2(fd, fd + 5).unwrap();
		assert_eq!(dup, fd + 5);

		let original = process.get_fd(fd).unwrap();
		original.write(b"hi").unwrap();
		let aliased = process.get_fd(fd + 5).unwrap();
		assert_eq!(aliased.tell(), 2);
	}

	#[test_case]
	fn dup2_to_self_is_a_no_op() {
		setup_fs();
		fs::create("r", 0).ok();
		let handle = fs::open("r").unwrap();
		let process = Process::new(Pid(3), None, "r").unwrap();
		let fd = process.install_fd(handle);
		assert_eq!(process.dup2(fd, fd).unwrap(), fd);
	}

	#[test_case]
	fn wait_on_unknown_child_fails_with_echild() {
		setup_fs();
		let process = Process::new(Pid(4), None, "s").unwrap();
		assert!(matches!(wait(&process, Pid(999)), Err(Error::ECHILD)));
	}
}
