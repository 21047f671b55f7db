//! C ABI for the native low-latency audio backend
//!
//! The backend is reached through a table of `extern "C"` function pointers
//! so the same `NativeSink` can drive a platform library linked at build
//! time (`native-link` feature) or the in-process null device.
//!
//! # Safety
//! Every handle returned by `open` is owned by exactly one `NativeStream`,
//! which closes it once on drop. Callers never touch raw handles.

pub mod null_device;

use std::os::raw::{c_int, c_void};
use std::ptr::NonNull;

// ============================================================================
// FFI Bindings
// ============================================================================

/// Function table exported by a native audio backend.
///
/// Return conventions: `open` yields null on failure; `start`, `pause` and
/// `flush` return 0 on success; `write` returns the bytes accepted (0 when
/// the device queue is full) or a negative error code.
#[repr(C)]
pub struct NativeAudioApi {
    pub open: unsafe extern "C" fn(
        channels: c_int,
        sample_rate: c_int,
        bit_depth: c_int,
        is_float: bool,
    ) -> *mut c_void,
    pub start: unsafe extern "C" fn(handle: *mut c_void) -> c_int,
    pub pause: unsafe extern "C" fn(handle: *mut c_void) -> c_int,
    pub write: unsafe extern "C" fn(handle: *mut c_void, data: *const u8, len: usize) -> isize,
    pub flush: unsafe extern "C" fn(handle: *mut c_void) -> c_int,
    pub close: unsafe extern "C" fn(handle: *mut c_void),
}

#[cfg(feature = "native-link")]
extern "C" {
    fn pcmp_native_audio_api() -> *const NativeAudioApi;
}

/// Backend used by `NativeSink::with_default_backend`.
///
/// With `native-link` the linked library's table is used when it exports
/// one; otherwise the null device.
pub fn default_api() -> &'static NativeAudioApi {
    #[cfg(feature = "native-link")]
    {
        // SAFETY: the linked backend returns either null or a pointer to a
        // table with static lifetime.
        let api = unsafe { pcmp_native_audio_api() };
        if let Some(api) = unsafe { api.as_ref() } {
            return api;
        }
        tracing::warn!("Native backend exported no API table, using null device");
    }
    &null_device::NULL_DEVICE_API
}

// ============================================================================
// RAII Wrapper
// ============================================================================

/// Error code reported by a backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCode(pub i64);

impl std::fmt::Display for NativeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "native backend returned {}", self.0)
    }
}

/// An open backend stream. Closed exactly once, on drop.
pub struct NativeStream {
    api: &'static NativeAudioApi,
    handle: NonNull<c_void>,
}

// SAFETY: backends must allow a stream to be driven from any single thread
// at a time; NativeStream is never shared (no Sync) and every call takes
// &mut self or self.
unsafe impl Send for NativeStream {}

impl NativeStream {
    /// Open a stream; `None` if the backend refused the format.
    pub fn open(
        api: &'static NativeAudioApi,
        channels: u16,
        sample_rate: u32,
        bit_depth: u32,
        is_float: bool,
    ) -> Option<Self> {
        let sample_rate = c_int::try_from(sample_rate).ok()?;
        let bit_depth = c_int::try_from(bit_depth).ok()?;
        // SAFETY: plain integer arguments; the result is checked for null.
        let raw = unsafe { (api.open)(channels as c_int, sample_rate, bit_depth, is_float) };
        NonNull::new(raw).map(|handle| Self { api, handle })
    }

    pub fn start(&mut self) -> Result<(), NativeCode> {
        // SAFETY: handle is live until drop.
        check(unsafe { (self.api.start)(self.handle.as_ptr()) })
    }

    pub fn pause(&mut self) -> Result<(), NativeCode> {
        // SAFETY: handle is live until drop.
        check(unsafe { (self.api.pause)(self.handle.as_ptr()) })
    }

    pub fn flush(&mut self) -> Result<(), NativeCode> {
        // SAFETY: handle is live until drop.
        check(unsafe { (self.api.flush)(self.handle.as_ptr()) })
    }

    /// Offer `data` to the device; returns how many bytes it took.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, NativeCode> {
        // SAFETY: handle is live; the pointer/len pair describes `data`,
        // which outlives the call.
        let written = unsafe { (self.api.write)(self.handle.as_ptr(), data.as_ptr(), data.len()) };
        if written < 0 {
            Err(NativeCode(written as i64))
        } else {
            Ok((written as usize).min(data.len()))
        }
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        // SAFETY: the handle came from `open` and is closed only here.
        unsafe { (self.api.close)(self.handle.as_ptr()) }
    }
}

fn check(code: c_int) -> Result<(), NativeCode> {
    if code == 0 {
        Ok(())
    } else {
        Err(NativeCode(code as i64))
    }
}
