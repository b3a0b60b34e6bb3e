//! Remote display geometry: framebuffer snapshots and the scaler that
//! keeps the remote size and the applied scale in step with the host
//! viewport.

pub mod frame;
pub mod scaler;

pub use frame::{PixelFormat, RawFrame};
pub use scaler::DisplayScaler;
