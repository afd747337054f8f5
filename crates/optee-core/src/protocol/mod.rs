//! Protocol module - TrEE generic service wire definitions.

pub mod constants;
pub mod frame;
pub mod header;

pub use constants::*;
pub use frame::{FrameError, InputFrame, InputType, OutputFrame, OutputType};
pub use header::{HeaderError, InputHeader, OutputHeader};
