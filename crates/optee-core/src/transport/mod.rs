//! Transport layer module.

pub mod mock;
pub mod submit;
pub mod traits;
#[cfg(windows)]
pub mod windows;

pub use mock::{MockDevice, MockReply};
pub use submit::submit;
pub use traits::{ResponseEnvelope, ServiceChannel, ServiceRequest, TeeDevice, TransportError};
#[cfg(windows)]
pub use windows::WindowsDevice;
