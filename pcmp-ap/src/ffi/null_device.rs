//! In-process null device exposed through the native C ABI
//!
//! Discards audio at real-time speed: it accepts at most `LEAD` worth of
//! bytes ahead of its virtual play head, so a writer is paced exactly like
//! it would be by hardware. Used when no native backend is linked.

use super::NativeAudioApi;
use std::os::raw::{c_int, c_void};
use std::time::{Duration, Instant};

/// Audio the device buffers ahead of the play head
const LEAD: Duration = Duration::from_millis(200);

pub static NULL_DEVICE_API: NativeAudioApi = NativeAudioApi {
    open: null_open,
    start: null_start,
    pause: null_pause,
    write: null_write,
    flush: null_flush,
    close: null_close,
};

struct NullDevice {
    bytes_per_second: u64,
    lead_bytes: u64,
    written: u64,
    /// Play head at the last time it was sampled
    consumed: u64,
    running_since: Option<Instant>,
}

impl NullDevice {
    /// Advance the virtual play head to now
    fn advance(&mut self) {
        if let Some(since) = self.running_since {
            let now = Instant::now();
            let played = (now.duration_since(since).as_micros() as u64)
                .saturating_mul(self.bytes_per_second)
                / 1_000_000;
            self.consumed = (self.consumed + played).min(self.written);
            self.running_since = Some(now);
        }
    }
}

unsafe extern "C" fn null_open(
    channels: c_int,
    sample_rate: c_int,
    bit_depth: c_int,
    is_float: bool,
) -> *mut c_void {
    if !(1..=8).contains(&channels) || !(8_000..=384_000).contains(&sample_rate) {
        return std::ptr::null_mut();
    }
    let valid_depth = if is_float {
        bit_depth == 32
    } else {
        matches!(bit_depth, 8 | 16 | 24 | 32)
    };
    if !valid_depth {
        return std::ptr::null_mut();
    }

    let bytes_per_second = (channels * sample_rate * bit_depth / 8) as u64;
    let device = NullDevice {
        bytes_per_second,
        lead_bytes: (bytes_per_second * LEAD.as_millis() as u64 / 1000).max(1),
        written: 0,
        consumed: 0,
        running_since: None,
    };
    Box::into_raw(Box::new(device)) as *mut c_void
}

/// # Safety
/// `handle` must come from `null_open` and not be closed.
unsafe fn device<'a>(handle: *mut c_void) -> Option<&'a mut NullDevice> {
    (handle as *mut NullDevice).as_mut()
}

unsafe extern "C" fn null_start(handle: *mut c_void) -> c_int {
    match device(handle) {
        Some(dev) => {
            if dev.running_since.is_none() {
                dev.running_since = Some(Instant::now());
            }
            0
        }
        None => -1,
    }
}

unsafe extern "C" fn null_pause(handle: *mut c_void) -> c_int {
    match device(handle) {
        Some(dev) => {
            dev.advance();
            dev.running_since = None;
            0
        }
        None => -1,
    }
}

unsafe extern "C" fn null_write(handle: *mut c_void, data: *const u8, len: usize) -> isize {
    let Some(dev) = device(handle) else {
        return -1;
    };
    if data.is_null() && len > 0 {
        return -2;
    }
    dev.advance();
    let queued = dev.written - dev.consumed;
    let room = dev.lead_bytes.saturating_sub(queued);
    let accepted = room.min(len as u64);
    dev.written += accepted;
    accepted as isize
}

unsafe extern "C" fn null_flush(handle: *mut c_void) -> c_int {
    match device(handle) {
        Some(dev) => {
            dev.advance();
            dev.consumed = dev.written;
            0
        }
        None => -1,
    }
}

unsafe extern "C" fn null_close(handle: *mut c_void) {
    if !handle.is_null() {
        drop(Box::from_raw(handle as *mut NullDevice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(channels: c_int, rate: c_int, depth: c_int, float: bool) -> *mut c_void {
        unsafe { (NULL_DEVICE_API.open)(channels, rate, depth, float) }
    }

    #[test]
    fn test_open_validates_format() {
        assert!(open(0, 44_100, 16, false).is_null());
        assert!(open(2, 1_000, 16, false).is_null());
        assert!(open(2, 44_100, 12, false).is_null());
        assert!(open(2, 44_100, 16, true).is_null());

        let handle = open(2, 44_100, 32, true);
        assert!(!handle.is_null());
        unsafe { (NULL_DEVICE_API.close)(handle) };
    }

    #[test]
    fn test_write_is_bounded_by_lead() {
        // 8000 Hz mono 8-bit: 8000 bytes/s, 1600 bytes of lead
        let handle = open(1, 8_000, 8, false);
        let data = vec![0u8; 4_000];
        unsafe {
            // Paused: nothing drains, so the second write finds no room
            assert_eq!((NULL_DEVICE_API.write)(handle, data.as_ptr(), data.len()), 1_600);
            assert_eq!((NULL_DEVICE_API.write)(handle, data.as_ptr(), data.len()), 0);

            assert_eq!((NULL_DEVICE_API.flush)(handle), 0);
            assert_eq!((NULL_DEVICE_API.write)(handle, data.as_ptr(), 100), 100);
            (NULL_DEVICE_API.close)(handle);
        }
    }

    #[test]
    fn test_running_device_drains() {
        let handle = open(1, 8_000, 8, false);
        let data = vec![0u8; 1_600];
        unsafe {
            assert_eq!((NULL_DEVICE_API.start)(handle), 0);
            assert_eq!((NULL_DEVICE_API.write)(handle, data.as_ptr(), data.len()), 1_600);
            std::thread::sleep(Duration::from_millis(60));
            assert!((NULL_DEVICE_API.write)(handle, data.as_ptr(), data.len()) > 0);
            (NULL_DEVICE_API.close)(handle);
        }
    }

    #[test]
    fn test_null_handle_is_rejected() {
        unsafe {
            assert_eq!((NULL_DEVICE_API.start)(std::ptr::null_mut()), -1);
            assert_eq!((NULL_DEVICE_API.write)(std::ptr::null_mut(), std::ptr::null(), 0), -1);
            (NULL_DEVICE_API.close)(std::ptr::null_mut());
        }
    }
}
