// SPDX-License-Identifier: GPL-2.0

//! System call dispatch.
//!
//! Grounded on `userprog/syscall.c`'s `syscall_handler`: a single dispatch
//! point keyed by syscall number, every argument and output buffer crossing
//! the user/kernel boundary through `copy_from_user`/`copy_to_user`-style
//! helpers rather than being dereferenced directly. fd 0/1 are reserved for
//! stdin/stdout; the terminal driver behind them is out of scope here, so
//! `write(1, ...)` goes straight to the kernel console and `read(0, ...)`
//! is unsupported.

use alloc::string::String;
use alloc::vec::Vec;

use alloc::sync::Arc;

use crate::error::{Error, Result};
use crate::memory::{copy_from_user, copy_string_from_user, copy_to_user, UserPtr};
use crate::process::{self, Process};
use crate::types::{Pid, VirtAddr};

/// Syscall numbers, matching spec.md §6's external-interface surface.
#[derive(Debug, Clone, Copy)]
#[repr(u64)]
pub enum SyscallNumber {
	Halt = 0,
	Exit = 1,
	Fork = 2,
	Exec = 3,
	Wait = 4,
	Create = 5,
	Remove = 6,
	Open = 7,
	Filesize = 8,
	Read = 9,
	Write = 10,
	Seek = 11,
	Tell = 12,
	Close = 13,
	Dup2 = 14,
	Mmap = 15,
	Munmap = 16,
}

/// Raw syscall arguments as handed up from the (out-of-scope) interrupt
/// trampoline.
#[derive(Debug)]
pub struct SyscallArgs {
	pub syscall_num: u64,
	pub arg0: u64,
	pub arg1: u64,
	pub arg2: u64,
	pub arg3: u64,
	pub arg4: u64,
}

const MAX_PATH_LEN: usize = 256;

/// Single dispatch point. The trampoline calls this with the faulting
/// process's own `Process` (obtained via [`process::current_process`])
/// already established as "current" by the scheduler.
pub fn handle_syscall(args: SyscallArgs) -> u64 {
	let result = dispatch(args);
	match result {
		Ok(value) => value,
		Err(error) => (-error.to_errno()) as u64,
	}
}

fn dispatch(args: SyscallArgs) -> Result<u64> {
	match args.syscall_num {
		0 => sys_halt(),
		1 => sys_exit(args.arg0 as i32),
		2 => sys_fork(),
		3 => sys_exec(args.arg0, args.arg1, args.arg2 as usize),
		4 => sys_wait(args.arg0 as u32),
		5 => sys_create(args.arg0, args.arg1 as u32),
		6 => sys_remove(args.arg0),
		7 => sys_open(args.arg0),
		8 => sys_filesize(args.arg0 as i32),
		9 => sys_read(args.arg0 as i32, args.arg1, args.arg2),
		10 => sys_write(args.arg0 as i32, args.arg1, args.arg2),
		11 => sys_seek(args.arg0 as i32, args.arg1),
		12 => sys_tell(args.arg0 as i32),
		13 => sys_close(args.arg0 as i32),
		14 => sys_dup2(args.arg0 as i32, args.arg1 as i32),
		15 => sys_mmap(args.arg0 as i32, args.arg1, args.arg2, args.arg3, args.arg4),
		16 => sys_munmap(args.arg0),
		_ => Err(Error::ENOSYS),
	}
}

fn current() -> Result<Arc<Process>> {
	process::current_process().ok_or(Error::ESRCH)
}

fn read_path(user_ptr: u64) -> Result<String> {
	let ptr = UserPtr::from_const(user_ptr as *const u8)?;
	copy_string_from_user(ptr, MAX_PATH_LEN)
}

/// `halt`: shut the machine down. There's nothing to clean up that the
/// (out-of-scope) power-off path doesn't already handle; loop on `hlt` as a
/// placeholder for whatever actually cuts power.
pub fn sys_halt() -> Result<u64> {
	crate::console::write_str("[halt] system halted\n");
	loop {
		unsafe { core::arch::asm!("hlt") };
	}
}

/// `exit(status)`: never returns.
pub fn sys_exit(status: i32) -> Result<u64> {
	let process = current()?;
	process::exit(&process, status);
	crate::scheduler::schedule();
	loop {
		unsafe { core::arch::asm!("hlt") };
	}
}

/// `fork()`: the calling thread's own context is whatever the trampoline
/// captured before entering the syscall; [`process::fork`] hands back the
/// child's pid and the `Context` it should be dispatched with, which the
/// scheduler is responsible for actually running.
pub fn sys_fork() -> Result<u64> {
	let process = current()?;
	let ctx = crate::arch::x86_64::context::Context::new();
	let (child_pid, _child_ctx) = process::fork(&process, &process.name(), &ctx)?;
	Ok(child_pid.0 as u64)
}

/// `exec(cmd_line)`: `cmd_line` is already-tokenized by the (out-of-scope)
/// argument tokenizer by the time it reaches here, so this takes just the
/// path and an argv slice read out of a user-supplied pointer array.
pub fn sys_exec(path_ptr: u64, argv_ptr: u64, argc: usize) -> Result<u64> {
	let process = current()?;
	let path = read_path(path_ptr)?;

	let mut args = Vec::with_capacity(argc);
	for i in 0..argc {
		let entry_ptr = UserPtr::<u64>::new((argv_ptr as *mut u64).wrapping_add(i))?;
		let mut raw = [0u8; 8];
		copy_from_user(&mut raw, entry_ptr.cast())?;
		let str_ptr = u64::from_ne_bytes(raw);
		let arg_ptr = UserPtr::from_const(str_ptr as *const u8)?;
		args.push(copy_string_from_user(arg_ptr, MAX_PATH_LEN)?);
	}

	match process::exec(&process, &path, &args) {
		Ok(infallible) => match infallible {},
		Err(e) => Err(e),
	}
}

/// `wait(pid)`.
pub fn sys_wait(pid: u32) -> Result<u64> {
	let process = current()?;
	let status = process::wait(&process, Pid(pid))?;
	Ok(status as u32 as u64)
}

/// `create(name, initial_size)`.
pub fn sys_create(name_ptr: u64, size: u32) -> Result<u64> {
	let name = read_path(name_ptr)?;
	crate::fs::create(&name, size)?;
	Ok(1)
}

/// `remove(name)`.
pub fn sys_remove(name_ptr: u64) -> Result<u64> {
	let name = read_path(name_ptr)?;
	crate::fs::remove(&name)?;
	Ok(1)
}

/// `open(name)`.
pub fn sys_open(name_ptr: u64) -> Result<u64> {
	let process = current()?;
	let name = read_path(name_ptr)?;
	let handle = crate::fs::open(&name)?;
	Ok(process.install_fd(handle) as u64)
}

/// `filesize(fd)`.
pub fn sys_filesize(fd: i32) -> Result<u64> {
	let process = current()?;
	let handle = process.get_fd(fd)?;
	Ok(handle.length())
}

/// `read(fd, buffer, size)`. `fd 0` (stdin) is unsupported — the terminal
/// driver it would read from is out of scope.
pub fn sys_read(fd: i32, buf_ptr: u64, size: u64) -> Result<u64> {
	if fd == 0 {
		return Err(Error::NotSupported);
	}
	let process = current()?;
	let handle = process.get_fd(fd)?;

	let mut kernel_buf = alloc::vec![0u8; size as usize];
	let n = handle.read(&mut kernel_buf)?;

	let user_ptr = UserPtr::new(buf_ptr as *mut u8)?;
	copy_to_user(user_ptr, &kernel_buf[..n])?;
	Ok(n as u64)
}

/// `write(fd, buffer, size)`. `fd 1` (stdout) goes straight to the kernel
/// console.
pub fn sys_write(fd: i32, buf_ptr: u64, size: u64) -> Result<u64> {
	let mut kernel_buf = alloc::vec![0u8; size as usize];
	let user_ptr = UserPtr::from_const(buf_ptr as *const u8)?;
	copy_from_user(&mut kernel_buf, user_ptr)?;

	if fd == 1 {
		if let Ok(s) = core::str::from_utf8(&kernel_buf) {
			crate::print!("{}", s);
		}
		return Ok(size);
	}

	let process = current()?;
	let handle = process.get_fd(fd)?;
	let n = handle.write(&kernel_buf)?;
	Ok(n as u64)
}

/// `seek(fd, position)`.
pub fn sys_seek(fd: i32, position: u64) -> Result<u64> {
	let process = current()?;
	let handle = process.get_fd(fd)?;
	handle.seek(position);
	Ok(0)
}

/// `tell(fd)`.
pub fn sys_tell(fd: i32) -> Result<u64> {
	let process = current()?;
	let handle = process.get_fd(fd)?;
	Ok(handle.tell())
}

/// `close(fd)`.
pub fn sys_close(fd: i32) -> Result<u64> {
	let process = current()?;
	process.close_fd(fd)?;
	Ok(0)
}

/// `dup2(old_fd, new_fd)`.
pub fn sys_dup2(old_fd: i32, new_fd: i32) -> Result<u64> {
	let process = current()?;
	Ok(process.dup2(old_fd, new_fd)? as u64)
}

/// `mmap(addr, length, writable, fd, offset)`.
pub fn sys_mmap(fd: i32, addr: u64, length: u64, writable: u64, offset: u64) -> Result<u64> {
	if length == 0 {
		return Err(Error::InvalidArgument);
	}
	let process = current()?;
	let handle = process.get_fd(fd)?;

	let va = VirtAddr::new(addr as usize);
	let mut spt_guard = process.spt().lock();
	let result = process
		.mmaps()
		.lock()
		.mmap(va, length as usize, writable != 0, handle, offset, &mut *spt_guard);
	drop(spt_guard);
	Ok(result?.as_usize() as u64)
}

/// `munmap(addr)`.
pub fn sys_munmap(addr: u64) -> Result<u64> {
	let process = current()?;
	let va = VirtAddr::new(addr as usize);
	let mut spt_guard = process.spt().lock();
	let result: Result<()> = process.mmaps().lock().munmap(va, &mut *spt_guard, process.pml4());
	drop(spt_guard);
	result?;
	Ok(0)
}

/// Architecture-specific syscall entry point.
#[cfg(target_arch = "x86_64")]
pub mod arch {
	use super::*;

	/// x86_64 syscall entry point (called from assembly).
	#[no_mangle]
	pub extern "C" fn syscall_entry(
		syscall_num: u64,
		arg0: u64,
		arg1: u64,
		arg2: u64,
		arg3: u64,
		arg4: u64,
	) -> u64 {
		handle_syscall(SyscallArgs {
			syscall_num,
			arg0,
			arg1,
			arg2,
			arg3,
			arg4,
		})
	}
}

/// Initialize syscall handling: set up SYSCALL/SYSRET MSRs.
pub fn init_syscalls() -> Result<()> {
	#[cfg(target_arch = "x86_64")]
	unsafe {
		let star_msr = 0xC0000081u32;
		let lstar_msr = 0xC0000082u32;
		let sfmask_msr = 0xC0000084u32;

		// Format: [63:48] user CS, [47:32] kernel CS.
		let star_value = (0x1Bu64 << 48) | (0x08u64 << 32);
		core::arch::asm!(
		    "wrmsr",
		    in("ecx") star_msr,
		    in("eax") (star_value & 0xFFFFFFFF) as u32,
		    in("edx") (star_value >> 32) as u32,
		    options(nostack, preserves_flags)
		);

		let entry_addr = arch::syscall_entry as *const () as u64;
		core::arch::asm!(
		    "wrmsr",
		    in("ecx") lstar_msr,
		    in("eax") (entry_addr & 0xFFFFFFFF) as u32,
		    in("edx") (entry_addr >> 32) as u32,
		    options(nostack, preserves_flags)
		);

		core::arch::asm!(
		    "wrmsr",
		    in("ecx") sfmask_msr,
		    in("eax") 0x200u32,
		    in("edx") 0u32,
		    options(nostack, preserves_flags)
		);

		let efer_msr = 0xC0000080u32;
		let mut efer_low: u32;
		let mut efer_high: u32;
		core::arch::asm!(
		    "rdmsr",
		    in("ecx") efer_msr,
		    out("eax") efer_low,
		    out("edx") efer_high,
		    options(nostack, preserves_flags)
		);
		efer_low |= 1;
		core::arch::asm!(
		    "wrmsr",
		    in("ecx") efer_msr,
		    in("eax") efer_low,
		    in("edx") efer_high,
		    options(nostack, preserves_flags)
		);
	}

	crate::info!("Syscall handling initialized");
	Ok(())
}
