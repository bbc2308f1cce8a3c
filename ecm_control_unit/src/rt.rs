//! Real-time setup for the step-generating thread.
//!
//! Step pulses are timed by sleeping on the calling thread, so jitter on that
//! thread becomes feed error. On a bench PC with the `rt` feature:
//!
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`
//! 2. prefault stack pages
//! 3. `sched_setaffinity` to one core
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`
//!
//! Without the feature every step is a no-op, which is what the simulation
//! and the test suite run with.

use thiserror::Error;

/// RT setup failure.
#[derive(Debug, Error)]
pub enum RtError {
    /// Memory locking failed.
    #[error("mlockall failed: {0}")]
    MemoryLock(String),

    /// CPU pinning failed.
    #[error("pinning to CPU {cpu} failed: {reason}")]
    Affinity {
        /// Requested core.
        cpu: usize,
        /// OS error text.
        reason: String,
    },

    /// Scheduler change failed.
    #[error("sched_setscheduler(SCHED_FIFO, {priority}) failed: {reason}")]
    Scheduler {
        /// Requested priority.
        priority: i32,
        /// OS error text.
        reason: String,
    },

    /// Priority outside the SCHED_FIFO range.
    #[error("RT priority {0} outside 1..=99")]
    InvalidPriority(i32),
}

/// Stack touched by [`prefault_stack`] [bytes].
const PREFAULT_STACK_BYTES: usize = 256 * 1024;

#[cfg(feature = "rt")]
fn lock_memory() -> Result<(), RtError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RtError::MemoryLock(e.to_string()))
}

#[cfg(not(feature = "rt"))]
fn lock_memory() -> Result<(), RtError> {
    Ok(())
}

/// Touch a stack buffer so its pages are resident before pulsing starts.
fn prefault_stack() {
    let mut buf = [0u8; PREFAULT_STACK_BYTES];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xA5) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn set_affinity(cpu: usize) -> Result<(), RtError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let fail = |e: nix::Error| RtError::Affinity {
        cpu,
        reason: e.to_string(),
    };
    let mut cpuset = CpuSet::new();
    cpuset.set(cpu).map_err(fail)?;
    sched_setaffinity(Pid::from_raw(0), &cpuset).map_err(fail)
}

#[cfg(not(feature = "rt"))]
fn set_affinity(_cpu: usize) -> Result<(), RtError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(RtError::Scheduler {
            priority,
            reason: std::io::Error::last_os_error().to_string(),
        });
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(())
}

/// Run the RT setup sequence on the calling thread.
///
/// # Errors
///
/// Invalid priority, or the first OS call that fails.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtError> {
    if !(1..=99).contains(&rt_priority) {
        return Err(RtError::InvalidPriority(rt_priority));
    }
    lock_memory()?;
    prefault_stack();
    set_affinity(cpu_core)?;
    set_scheduler(rt_priority)?;
    Ok(())
}

/// Whether this build performs the OS calls.
pub const fn rt_enabled() -> bool {
    cfg!(feature = "rt")
}
