//! Address-based thread parking.
//!
//! Four operations on a 32-bit cell: block-if-equal, block-if-equal with a
//! timeout, wake up to `n` waiters, wake all waiters. The OS return codes are
//! discarded; callers convey semantics exclusively through the monitored
//! value and re-check it after every wake (spurious wakes are permitted).
//!
//! Ordering with respect to the cell is the caller's responsibility: the
//! kernel only compares the current value against `expected` before sleeping.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Block the calling thread while `*cell == expected`.
///
/// Returns immediately if the value already differs. May wake spuriously.
#[inline]
pub(crate) fn wait(cell: &AtomicU32, expected: u32) {
    imp::wait(cell, expected);
}

/// As [`wait`], but gives up after `timeout`.
#[inline]
pub(crate) fn wait_for(cell: &AtomicU32, expected: u32, timeout: Duration) {
    imp::wait_for(cell, expected, timeout);
}

/// Wake up to `count` threads blocked on `cell`.
#[inline]
pub(crate) fn wake(cell: &AtomicU32, count: u32) {
    imp::wake(cell, count);
}

/// Wake every thread blocked on `cell`.
#[inline]
pub(crate) fn wake_all(cell: &AtomicU32) {
    imp::wake_all(cell);
}

#[cfg(target_os = "linux")]
mod imp {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use rustix::thread::futex;
    use rustix::time::Timespec;

    pub(super) fn wait(cell: &AtomicU32, expected: u32) {
        // EAGAIN (value changed) and EINTR both mean "re-check"; the caller's
        // retry loop handles every outcome, so the result is dropped.
        let _ = futex::wait(cell, futex::Flags::PRIVATE, expected, None);
    }

    pub(super) fn wait_for(cell: &AtomicU32, expected: u32, timeout: Duration) {
        let timespec = Timespec {
            tv_sec: timeout.as_secs() as _,
            tv_nsec: timeout.subsec_nanos() as _,
        };
        let _ = futex::wait(cell, futex::Flags::PRIVATE, expected, Some(&timespec));
    }

    pub(super) fn wake(cell: &AtomicU32, count: u32) {
        let _ = futex::wake(cell, futex::Flags::PRIVATE, count.min(i32::MAX as u32) as _);
    }

    pub(super) fn wake_all(cell: &AtomicU32) {
        let _ = futex::wake(cell, futex::Flags::PRIVATE, i32::MAX as _);
    }
}

#[cfg(target_os = "macos")]
mod imp {
    use std::ffi::{c_int, c_void};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    // https://github.com/apple-oss-distributions/xnu/blob/main/bsd/sys/ulock.h
    const UL_COMPARE_AND_WAIT: u32 = 1;
    const ULF_WAKE_ALL: u32 = 0x0000_0100;
    const ULF_NO_ERRNO: u32 = 0x0100_0000;

    unsafe extern "C" {
        fn __ulock_wait(operation: u32, addr: *mut c_void, value: u64, timeout_us: u32) -> c_int;
        fn __ulock_wake(operation: u32, addr: *mut c_void, wake_value: u64) -> c_int;
    }

    fn addr(cell: &AtomicU32) -> *mut c_void {
        cell.as_ptr().cast()
    }

    pub(super) fn wait(cell: &AtomicU32, expected: u32) {
        // SAFETY: the cell is a valid, aligned 4-byte location for the
        // duration of the call; a timeout of zero means wait forever.
        unsafe {
            __ulock_wait(
                UL_COMPARE_AND_WAIT | ULF_NO_ERRNO,
                addr(cell),
                u64::from(expected),
                0,
            );
        }
    }

    pub(super) fn wait_for(cell: &AtomicU32, expected: u32, timeout: Duration) {
        // Zero means infinite to the kernel; an expired timeout returns to
        // the caller's deadline check instead.
        let micros = timeout.as_micros().clamp(1, u128::from(u32::MAX)) as u32;
        // SAFETY: as for `wait`.
        unsafe {
            __ulock_wait(
                UL_COMPARE_AND_WAIT | ULF_NO_ERRNO,
                addr(cell),
                u64::from(expected),
                micros,
            );
        }
    }

    pub(super) fn wake(cell: &AtomicU32, count: u32) {
        // ulock can only wake one or all; waking more than one rounds up.
        let operation = if count == 1 {
            UL_COMPARE_AND_WAIT | ULF_NO_ERRNO
        } else {
            UL_COMPARE_AND_WAIT | ULF_NO_ERRNO | ULF_WAKE_ALL
        };
        // SAFETY: as for `wait`.
        unsafe {
            __ulock_wake(operation, addr(cell), 0);
        }
    }

    pub(super) fn wake_all(cell: &AtomicU32) {
        // SAFETY: as for `wait`.
        unsafe {
            __ulock_wake(UL_COMPARE_AND_WAIT | ULF_NO_ERRNO | ULF_WAKE_ALL, addr(cell), 0);
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
compile_error!("strait requires futex-style address waiting (linux or macos)");
