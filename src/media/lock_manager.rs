//! Process-wide lock manager for the FFmpeg backend.
//!
//! The callback follows the classic libav lock-manager contract: one entry
//! point keyed by an opaque handle and an operation code, reporting through
//! status codes only. It is backed by `parking_lot::RawMutex` so a mutex can
//! be taken in one call and released in another without a guard.
//!
//! FFmpeg no longer accepts an external lock manager, so the registration
//! uses the callback itself to serialise codec initialisation across
//! threads.

use std::alloc::{alloc, dealloc, Layout};
use std::ffi::{c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::OnceLock;

use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;

use crate::error::{DecodeError, Result};

pub const LOCK_SUCCESS: c_int = 0;
pub const LOCK_FAILURE: c_int = 1;

/// Signature of a lock-manager callback.
pub type LockManagerFn = unsafe extern "C" fn(*mut *mut c_void, c_int) -> c_int;

/// Operation requested from the lock manager
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    Create = 0,
    Obtain = 1,
    Release = 2,
    Destroy = 3,
}

impl TryFrom<c_int> for LockOp {
    type Error = c_int;

    fn try_from(value: c_int) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(LockOp::Create),
            1 => Ok(LockOp::Obtain),
            2 => Ok(LockOp::Release),
            3 => Ok(LockOp::Destroy),
            other => Err(other),
        }
    }
}

/// Lock-manager callback.
///
/// Returns `LOCK_SUCCESS` or `LOCK_FAILURE`; never panics or unwinds into
/// the caller. `Obtain` is a try-lock and reports contention as failure.
///
/// # Safety
///
/// `handle` must be null or point to a slot that is either null (for
/// `Create`) or holds a handle produced by `Create` and not yet destroyed.
/// `Release` must only follow a successful `Obtain` on the same handle.
pub unsafe extern "C" fn lock_manager(handle: *mut *mut c_void, op: c_int) -> c_int {
    if handle.is_null() {
        return LOCK_FAILURE;
    }
    let Ok(op) = LockOp::try_from(op) else {
        return LOCK_FAILURE;
    };
    catch_unwind(AssertUnwindSafe(|| unsafe { apply(handle, op) })).unwrap_or(LOCK_FAILURE)
}

unsafe fn apply(handle: *mut *mut c_void, op: LockOp) -> c_int {
    let layout = Layout::new::<RawMutex>();
    match op {
        LockOp::Create => {
            let mutex = alloc(layout) as *mut RawMutex;
            if mutex.is_null() {
                return LOCK_FAILURE;
            }
            mutex.write(RawMutex::INIT);
            *handle = mutex as *mut c_void;
            LOCK_SUCCESS
        }
        LockOp::Obtain => match (*handle as *const RawMutex).as_ref() {
            Some(mutex) if mutex.try_lock() => LOCK_SUCCESS,
            _ => LOCK_FAILURE,
        },
        LockOp::Release => match (*handle as *const RawMutex).as_ref() {
            Some(mutex) => {
                mutex.unlock();
                LOCK_SUCCESS
            }
            None => LOCK_FAILURE,
        },
        LockOp::Destroy => {
            let mutex = *handle as *mut RawMutex;
            if !mutex.is_null() {
                dealloc(mutex as *mut u8, layout);
            }
            *handle = ptr::null_mut();
            LOCK_SUCCESS
        }
    }
}

/// Opaque handle produced by the callback's `Create` operation.
struct LockHandle(*mut c_void);

impl LockHandle {
    fn get(&self) -> *mut c_void {
        self.0
    }
}

// The handle is only touched through the callback, which is thread-safe.
unsafe impl Send for LockHandle {}
unsafe impl Sync for LockHandle {}

/// The process-wide registration. Lives for the rest of the process once
/// installed.
pub struct LockRegistration {
    callback: LockManagerFn,
    handle: LockHandle,
}

static REGISTRATION: OnceLock<LockRegistration> = OnceLock::new();

/// Install the lock manager and initialise FFmpeg, once per process.
///
/// Later calls return the existing registration.
pub fn register() -> Result<&'static LockRegistration> {
    if let Some(registration) = REGISTRATION.get() {
        return Ok(registration);
    }
    ffmpeg_next::init()?;
    let registration = LockRegistration::new(lock_manager)?;
    // A racing thread may have won; the unused registration is dropped here.
    Ok(REGISTRATION.get_or_init(move || registration))
}

impl LockRegistration {
    fn new(callback: LockManagerFn) -> Result<Self> {
        let mut raw: *mut c_void = ptr::null_mut();
        if unsafe { callback(&mut raw, LockOp::Create as c_int) } != LOCK_SUCCESS || raw.is_null() {
            return Err(DecodeError::LockManager);
        }
        Ok(Self {
            callback,
            handle: LockHandle(raw),
        })
    }

    /// Take the shared lock without blocking.
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        self.call(LockOp::Obtain)
            .then(|| LockGuard { registration: self })
    }

    /// Take the shared lock, retrying until the callback reports success.
    pub fn lock(&self) -> LockGuard<'_> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            std::thread::yield_now();
        }
    }

    fn call(&self, op: LockOp) -> bool {
        let mut raw = self.handle.get();
        unsafe { (self.callback)(&mut raw, op as c_int) == LOCK_SUCCESS }
    }
}

impl Drop for LockRegistration {
    fn drop(&mut self) {
        unsafe {
            (self.callback)(&mut self.handle.0, LockOp::Destroy as c_int);
        }
    }
}

/// Releases the shared lock when dropped.
pub struct LockGuard<'a> {
    registration: &'a LockRegistration,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.registration.call(LockOp::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::time::{Duration, Instant};

    fn create() -> *mut c_void {
        let mut raw = ptr::null_mut();
        assert_eq!(unsafe { lock_manager(&mut raw, LockOp::Create as c_int) }, LOCK_SUCCESS);
        assert!(!raw.is_null());
        raw
    }

    #[test]
    fn test_lock_lifecycle() {
        let mut raw = create();
        unsafe {
            assert_eq!(lock_manager(&mut raw, LockOp::Obtain as c_int), LOCK_SUCCESS);
            assert_eq!(lock_manager(&mut raw, LockOp::Obtain as c_int), LOCK_FAILURE);
            assert_eq!(lock_manager(&mut raw, LockOp::Release as c_int), LOCK_SUCCESS);
            assert_eq!(lock_manager(&mut raw, LockOp::Obtain as c_int), LOCK_SUCCESS);
            assert_eq!(lock_manager(&mut raw, LockOp::Release as c_int), LOCK_SUCCESS);
            assert_eq!(lock_manager(&mut raw, LockOp::Destroy as c_int), LOCK_SUCCESS);
        }
        assert!(raw.is_null());
    }

    #[test]
    fn test_unknown_op_and_null_handle_fail() {
        let mut raw = create();
        unsafe {
            assert_eq!(lock_manager(&mut raw, 7), LOCK_FAILURE);
            assert_eq!(lock_manager(ptr::null_mut(), LockOp::Create as c_int), LOCK_FAILURE);
            assert_eq!(lock_manager(&mut raw, LockOp::Destroy as c_int), LOCK_SUCCESS);
            // obtaining a destroyed (null) handle is a failure, not a crash
            assert_eq!(lock_manager(&mut raw, LockOp::Obtain as c_int), LOCK_FAILURE);
        }
    }

    #[test]
    fn test_contended_obtain_does_not_block() {
        let raw = LockHandle(create());
        let held = Barrier::new(2);
        let checked = Barrier::new(2);

        crossbeam::thread::scope(|s| {
            s.spawn(|_| {
                let mut handle = raw.get();
                assert_eq!(unsafe { lock_manager(&mut handle, LockOp::Obtain as c_int) }, LOCK_SUCCESS);
                held.wait();
                checked.wait();
                assert_eq!(unsafe { lock_manager(&mut handle, LockOp::Release as c_int) }, LOCK_SUCCESS);
            });
            s.spawn(|_| {
                let mut handle = raw.get();
                held.wait();
                let started = Instant::now();
                assert_eq!(unsafe { lock_manager(&mut handle, LockOp::Obtain as c_int) }, LOCK_FAILURE);
                assert!(started.elapsed() < Duration::from_secs(1));
                checked.wait();
            });
        })
        .unwrap();

        let mut handle = raw.get();
        unsafe {
            assert_eq!(lock_manager(&mut handle, LockOp::Obtain as c_int), LOCK_SUCCESS);
            assert_eq!(lock_manager(&mut handle, LockOp::Release as c_int), LOCK_SUCCESS);
            assert_eq!(lock_manager(&mut handle, LockOp::Destroy as c_int), LOCK_SUCCESS);
        }
    }

    #[test]
    fn test_registration_is_shared() {
        let first = register().unwrap();
        let second = register().unwrap();
        assert!(ptr::eq(first, second));
    }

    #[test]
    fn test_registration_guard_releases() {
        let registration = LockRegistration::new(lock_manager).unwrap();
        let guard = registration.lock();
        assert!(registration.try_lock().is_none());
        drop(guard);
        assert!(registration.try_lock().is_some());
    }
}
