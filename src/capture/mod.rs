pub mod frame;
pub mod pool;
pub mod v4l2;

pub use frame::{DeviceFormat, FrameStats, PixelFormat};
pub use pool::{ActiveSlot, FramePool, FullSlot};
pub use v4l2::V4l2Session;

use crate::Result;

/// Per-frame side of a capture session: hand slots to the driver and take
/// filled ones back.
pub trait FrameSource {
    /// Take the slot handles for initial queueing. Yields each slot once.
    fn take_slots(&mut self) -> Vec<ActiveSlot>;

    /// Give a slot to the driver for filling. Does not wait for the fill.
    fn enqueue(&mut self, slot: ActiveSlot) -> Result<()>;

    /// Block until the driver returns a filled slot.
    fn dequeue(&mut self) -> Result<FullSlot>;

    /// Read-only view of exactly one frame from a filled slot.
    fn frame(&self, slot: &FullSlot) -> &[u8];
}

/// Setup and teardown of a capture session.
pub trait CaptureDevice: FrameSource {
    /// Check capabilities and set the 16-bit format. The returned format is
    /// what the device granted.
    fn negotiate(&mut self, width: u32, height: u32) -> Result<DeviceFormat>;

    /// Request and map `num_buffers` driver buffers.
    fn allocate(&mut self, num_buffers: u32) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    /// Stop streaming and release every slot and the device handle.
    fn stop(self) -> Result<()>
    where
        Self: Sized;
}
