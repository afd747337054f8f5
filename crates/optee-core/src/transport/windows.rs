//! Win32 device-control transport for the TrEE generic service driver.
//!
//! Each invocation owns a manual-reset event used as the overlapped
//! completion signal; the device handle itself is shared.

use std::ffi::{OsStr, c_void};
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use tracing::{debug, info, instrument, warn};
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_IO_PENDING, GENERIC_READ, GENERIC_WRITE, GetLastError, HANDLE,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::IO::{DeviceIoControl, GetOverlappedResult, OVERLAPPED};
use windows_sys::Win32::System::Threading::{CreateEventW, ResetEvent};

use super::traits::{ResponseEnvelope, ServiceChannel, ServiceRequest, TeeDevice, TransportError};

/// `TR_SERVICE_REQUEST` as laid out by the driver.
#[repr(C)]
struct TrServiceRequest {
    function_code: u32,
    input_buffer: *const c_void,
    input_buffer_size: u32,
    output_buffer: *mut c_void,
    output_buffer_size: u32,
}

fn frame_len(len: usize) -> Result<u32, TransportError> {
    u32::try_from(len).map_err(|_| TransportError::FrameTooLarge { size: len })
}

/// Handle to the TrEE generic service device.
pub struct WindowsDevice {
    handle: HANDLE,
    ioctl_code: u32,
    owned: bool,
}

// The driver contract allows concurrent submissions on one handle; all
// per-request state lives in the channel.
unsafe impl Send for WindowsDevice {}
unsafe impl Sync for WindowsDevice {}

impl WindowsDevice {
    /// Open the device for overlapped I/O.
    #[instrument(level = "info")]
    pub fn open(path: &str, ioctl_code: u32) -> Result<Self, TransportError> {
        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(Some(0)).collect();

        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                FILE_FLAG_OVERLAPPED,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(TransportError::OpenFailed {
                path: path.to_string(),
                message: std::io::Error::last_os_error().to_string(),
            });
        }

        info!(path, ioctl_code = %format!("{:#010X}", ioctl_code), "Device opened");
        Ok(Self {
            handle,
            ioctl_code,
            owned: true,
        })
    }

    /// Wrap a handle owned by the caller. It is not closed on drop.
    ///
    /// # Safety
    ///
    /// `handle` must be a valid device handle opened with
    /// `FILE_FLAG_OVERLAPPED` and must outlive the returned value.
    pub unsafe fn from_raw_handle(handle: HANDLE, ioctl_code: u32) -> Self {
        Self {
            handle,
            ioctl_code,
            owned: false,
        }
    }

    pub fn ioctl_code(&self) -> u32 {
        self.ioctl_code
    }
}

impl Drop for WindowsDevice {
    fn drop(&mut self) {
        if self.owned && unsafe { CloseHandle(self.handle) } == 0 {
            warn!(error = unsafe { GetLastError() }, "CloseHandle failed for device");
        }
    }
}

impl TeeDevice for WindowsDevice {
    type Channel<'a> = WindowsChannel<'a>;

    fn open_channel(&self) -> Result<WindowsChannel<'_>, TransportError> {
        let event = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
        if event.is_null() {
            return Err(TransportError::SignalCreationFailed {
                code: unsafe { GetLastError() },
            });
        }
        Ok(WindowsChannel {
            device: self,
            event,
        })
    }
}

/// Per-invocation channel holding the overlapped completion event.
pub struct WindowsChannel<'a> {
    device: &'a WindowsDevice,
    event: HANDLE,
}

impl ServiceChannel for WindowsChannel<'_> {
    fn execute(
        &mut self,
        request: ServiceRequest<'_>,
        response: &mut ResponseEnvelope,
    ) -> Result<usize, TransportError> {
        let tr_request = TrServiceRequest {
            function_code: request.function_code,
            input_buffer: request.input.as_ptr().cast(),
            input_buffer_size: frame_len(request.input.len())?,
            output_buffer: request.output.as_mut_ptr().cast(),
            output_buffer_size: frame_len(request.output.len())?,
        };

        if unsafe { ResetEvent(self.event) } == 0 {
            return Err(TransportError::SubmitFailed {
                code: unsafe { GetLastError() },
            });
        }

        let mut overlapped: OVERLAPPED = unsafe { mem::zeroed() };
        overlapped.hEvent = self.event;
        let mut returned: u32 = 0;

        // The request, frames and OVERLAPPED all outlive the I/O: we either
        // fail before it is queued or wait for it below.
        let ok = unsafe {
            DeviceIoControl(
                self.device.handle,
                self.device.ioctl_code,
                (&tr_request as *const TrServiceRequest).cast(),
                mem::size_of::<TrServiceRequest>() as u32,
                response.as_mut_ptr().cast(),
                response.len() as u32,
                &mut returned,
                &mut overlapped,
            )
        };

        if ok == 0 {
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                return Err(TransportError::SubmitFailed { code });
            }

            debug!("Waiting for completion");
            let ok = unsafe { GetOverlappedResult(self.device.handle, &overlapped, &mut returned, 1) };
            if ok == 0 {
                return Err(TransportError::WaitFailed {
                    code: unsafe { GetLastError() },
                });
            }
        }

        Ok(returned as usize)
    }
}

impl Drop for WindowsChannel<'_> {
    fn drop(&mut self) {
        if unsafe { CloseHandle(self.event) } == 0 {
            warn!(error = unsafe { GetLastError() }, "CloseHandle failed for completion event");
        }
    }
}
