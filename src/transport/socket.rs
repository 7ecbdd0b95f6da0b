//! Unix-domain stream transport to the frame consumer

use std::io::{self, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{io_err, Error, Result};
use crate::transport::{FrameSink, HeaderRecord};

/// Writes the header once, then whole frames back to back.
pub struct SocketTransport<W> {
    writer: W,
    frame_size: Option<usize>,
    bytes_sent: u64,
}

impl SocketTransport<UnixStream> {
    /// Connect to the consumer listening on `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| Error::TransportUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Connected to consumer at {}", path.display());
        Ok(Self::new(stream))
    }
}

impl<W: Write> SocketTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frame_size: None,
            bytes_sent: 0,
        }
    }

    /// Header plus frame bytes accepted so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FrameSink for SocketTransport<W> {
    /// A single write; anything short of the whole header is a failure.
    fn send_header(&mut self, header: &HeaderRecord) -> Result<()> {
        let bytes = header.to_bytes();
        let written = self.writer.write(&bytes).map_err(Error::HeaderSendFailed)?;
        if written != bytes.len() {
            return Err(Error::HeaderSendFailed(io_err(
                io::ErrorKind::WriteZero,
                format!("short header write: {} of {} bytes", written, bytes.len()),
            )));
        }

        self.bytes_sent += written as u64;
        self.frame_size = Some(header.frame_size);
        debug!("Sent {} byte stream header", written);
        Ok(())
    }

    /// Keep writing from the first unsent byte until the frame is out.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let len = frame.len();
        let send_err = |sent: usize, source: io::Error| Error::SendFailed { sent, len, source };

        match self.frame_size {
            None => {
                return Err(send_err(
                    0,
                    io_err(io::ErrorKind::NotConnected, "frame sent before header"),
                ))
            }
            Some(expected) if expected != len => {
                return Err(send_err(
                    0,
                    io_err(
                        io::ErrorKind::InvalidInput,
                        format!("frame is {} bytes, header declared {}", len, expected),
                    ),
                ))
            }
            Some(_) => {}
        }

        let started = Instant::now();
        let mut sent = 0;
        while sent < len {
            match self.writer.write(&frame[sent..]) {
                Ok(0) => {
                    return Err(send_err(
                        sent,
                        io_err(io::ErrorKind::WriteZero, "consumer stopped accepting bytes"),
                    ))
                }
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(send_err(sent, e)),
            }
        }

        self.bytes_sent += len as u64;
        metrics::counter!("relay_bytes_total").increment(len as u64);
        metrics::histogram!("relay_send_time_us").record(started.elapsed().as_micros() as f64);
        Ok(())
    }
}
