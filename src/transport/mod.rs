pub mod header;
pub mod socket;

pub use header::HeaderRecord;
pub use socket::SocketTransport;

use tracing::info;

use crate::Result;

/// Destination for the stream header and the frames that follow it.
pub trait FrameSink {
    /// Sent once, before any frame.
    fn send_header(&mut self, header: &HeaderRecord) -> Result<()>;

    /// Deliver one whole frame or fail.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn send_header(&mut self, header: &HeaderRecord) -> Result<()> {
        (**self).send_header(header)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send_frame(frame)
    }
}

/// Capture-only sink: counts and discards everything.
#[derive(Debug, Default)]
pub struct DryRun {
    pub frames: u64,
    pub bytes: u64,
}

impl FrameSink for DryRun {
    fn send_header(&mut self, header: &HeaderRecord) -> Result<()> {
        info!(
            "Dry run: not sending, stream would be {}x{} at {} bytes per frame",
            header.res_x, header.res_y, header.frame_size
        );
        Ok(())
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.frames += 1;
        self.bytes += frame.len() as u64;
        Ok(())
    }
}
