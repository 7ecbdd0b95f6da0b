//! V4L2 capture session with explicitly managed memory-mapped buffers

use std::io;
use std::mem;
use std::os::fd::BorrowedFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::device::Handle;
use v4l::memory::Memory;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::video::Capture;
use v4l::{Device, Format};

use crate::capture::frame::{DeviceFormat, PixelFormat};
use crate::capture::pool::{ActiveSlot, FramePool, FullSlot};
use crate::capture::{CaptureDevice, FrameSource};
use crate::error::{io_err, Error, Result};

mod ioctl {
    use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};

    nix::ioctl_readwrite!(reqbufs, b'V', 8, v4l2_requestbuffers);
    nix::ioctl_readwrite!(querybuf, b'V', 9, v4l2_buffer);
    nix::ioctl_readwrite!(qbuf, b'V', 15, v4l2_buffer);
    nix::ioctl_readwrite!(dqbuf, b'V', 17, v4l2_buffer);
    nix::ioctl_write_ptr!(streamon, b'V', 18, libc::c_int);
    nix::ioctl_write_ptr!(streamoff, b'V', 19, libc::c_int);
}

const BUF_TYPE: Type = Type::VideoCapture;

/// Capture session over a single V4L2 node.
///
/// Lifecycle: `open` → `negotiate` → `allocate` → `start` → per-frame
/// `enqueue`/`dequeue` → `stop`.
pub struct V4l2Session {
    path: PathBuf,
    device: Device,
    handle: Arc<Handle>,
    format: Option<DeviceFormat>,
    pool: Option<FramePool<MmapMut>>,
    streaming: bool,
    strict_format: bool,
    stall_timeout: PollTimeout,
}

impl V4l2Session {
    /// Open the device node.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening V4L2 device: {}", path.display());

        let device = Device::with_path(&path).map_err(|source| Error::DeviceUnavailable {
            path: path.clone(),
            source,
        })?;
        let handle = device.handle();

        Ok(Self {
            path,
            device,
            handle,
            format: None,
            pool: None,
            streaming: false,
            strict_format: false,
            stall_timeout: PollTimeout::from(2000u16),
        })
    }

    /// Fail negotiation when the device grants a different resolution
    /// instead of adopting the granted one.
    pub fn strict_format(mut self, strict: bool) -> Self {
        self.strict_format = strict;
        self
    }

    /// How long `dequeue` waits before logging that no frame has arrived.
    /// Zero waits without ever warning.
    pub fn stall_warning(mut self, after: Duration) -> Self {
        self.stall_timeout = stall_timeout(after).unwrap_or_else(|| {
            warn!(
                "Stall warning interval {:?} exceeds {} ms, using the maximum",
                after,
                MAX_STALL_WARNING_MS
            );
            PollTimeout::from(u16::MAX)
        });
        self
    }

    fn fd(&self) -> libc::c_int {
        self.handle.fd()
    }

    fn buffer_desc(index: u32) -> v4l2_buffer {
        v4l2_buffer {
            index,
            type_: BUF_TYPE as u32,
            memory: Memory::Mmap as u32,
            ..unsafe { mem::zeroed() }
        }
    }

    fn stream_ioctl(&mut self, on: bool) -> Result<()> {
        let op = if on { "VIDIOC_STREAMON" } else { "VIDIOC_STREAMOFF" };
        let typ = BUF_TYPE as libc::c_int;
        let res = unsafe {
            if on {
                ioctl::streamon(self.fd(), &typ)
            } else {
                ioctl::streamoff(self.fd(), &typ)
            }
        };
        res.map_err(|errno| Error::StreamControlFailed {
            op,
            source: errno.into(),
        })?;
        self.streaming = on;
        Ok(())
    }

    /// Wait until the device has a filled buffer, warning on each stall
    /// interval that passes without one.
    fn wait_readable(&self) -> io::Result<()> {
        let waiting = Instant::now();

        loop {
            // SAFETY: the handle keeps the descriptor open for the session's lifetime
            let fd = unsafe { BorrowedFd::borrow_raw(self.fd()) };
            let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];

            match poll(&mut fds, self.stall_timeout) {
                Ok(0) => warn!(
                    "No frame from {} for {:?}",
                    self.path.display(),
                    waiting.elapsed()
                ),
                Ok(_) => {
                    let revents = fds[0].revents().unwrap_or(PollFlags::empty());
                    if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP) {
                        return Err(io_err(
                            io::ErrorKind::BrokenPipe,
                            format!("device reported {:?}", revents),
                        ));
                    }
                    return Ok(());
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
    }
}

/// Longest stall interval a single poll can wait.
pub const MAX_STALL_WARNING_MS: u64 = u16::MAX as u64;

/// Poll timeout for one stall interval.
///
/// Zero maps to an unbounded wait with no stall warnings. Anything under a
/// millisecond rounds up to one so the wait never degrades into a spin.
/// `None` when the interval is longer than `MAX_STALL_WARNING_MS`.
pub(crate) fn stall_timeout(after: Duration) -> Option<PollTimeout> {
    if after.is_zero() {
        return Some(PollTimeout::NONE);
    }
    u16::try_from(after.as_millis().max(1))
        .ok()
        .map(PollTimeout::from)
}

/// Decide which format the session runs with after `VIDIOC_S_FMT`.
///
/// The granted format is authoritative. A different pixel encoding is always
/// a rejection; a different resolution is a rejection only when `strict`.
pub(crate) fn reconcile_format(
    requested: DeviceFormat,
    granted: &Format,
    strict: bool,
) -> io::Result<DeviceFormat> {
    if granted.fourcc != requested.pixel.fourcc() {
        return Err(io_err(
            io::ErrorKind::Unsupported,
            format!(
                "requested {} but device granted {}",
                requested.pixel.fourcc(),
                granted.fourcc
            ),
        ));
    }

    if granted.width != requested.width || granted.height != requested.height {
        if strict {
            return Err(io_err(
                io::ErrorKind::InvalidData,
                format!(
                    "requested {}x{} but device granted {}x{}",
                    requested.width, requested.height, granted.width, granted.height
                ),
            ));
        }
        warn!(
            "Device granted {}x{} instead of {}x{}, using granted size",
            granted.width, granted.height, requested.width, requested.height
        );
    }

    Ok(DeviceFormat::new(
        granted.width,
        granted.height,
        requested.pixel,
    ))
}

impl CaptureDevice for V4l2Session {
    #[instrument(skip(self), fields(device = %self.path.display()))]
    fn negotiate(&mut self, width: u32, height: u32) -> Result<DeviceFormat> {
        let caps = self
            .device
            .query_caps()
            .map_err(|source| Error::CapabilityMismatch {
                op: "VIDIOC_QUERYCAP",
                source,
            })?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::CapabilityMismatch {
                op: "VIDIOC_QUERYCAP",
                source: io_err(
                    io::ErrorKind::Unsupported,
                    "device does not handle single-planar video capture",
                ),
            });
        }

        let requested = DeviceFormat::new(width, height, PixelFormat::Y16);
        let fmt = Format::new(width, height, requested.pixel.fourcc());
        let granted = self
            .device
            .set_format(&fmt)
            .map_err(|source| Error::FormatRejected {
                op: "VIDIOC_S_FMT",
                source,
            })?;

        let format = reconcile_format(requested, &granted, self.strict_format).map_err(
            |source| Error::FormatRejected {
                op: "VIDIOC_S_FMT",
                source,
            },
        )?;

        info!(
            "Negotiated {}x{} {} ({} bytes per frame)",
            format.width,
            format.height,
            format.pixel.fourcc(),
            format.frame_size()
        );
        self.format = Some(format);
        Ok(format)
    }

    fn allocate(&mut self, num_buffers: u32) -> Result<()> {
        let alloc_err = |op: &'static str, source: io::Error| Error::BufferAllocationFailed {
            op,
            source,
        };

        let format = self.format.ok_or_else(|| {
            alloc_err(
                "VIDIOC_REQBUFS",
                io_err(io::ErrorKind::Other, "format not negotiated"),
            )
        })?;

        let mut request = v4l2_requestbuffers {
            count: num_buffers,
            type_: BUF_TYPE as u32,
            memory: Memory::Mmap as u32,
            ..unsafe { mem::zeroed() }
        };
        unsafe { ioctl::reqbufs(self.fd(), &mut request) }
            .map_err(|errno| alloc_err("VIDIOC_REQBUFS", errno.into()))?;

        if request.count < 2 {
            return Err(alloc_err(
                "VIDIOC_REQBUFS",
                io_err(
                    io::ErrorKind::OutOfMemory,
                    format!(
                        "driver granted {} of {} buffers",
                        request.count, num_buffers
                    ),
                ),
            ));
        }

        let mut maps = Vec::with_capacity(request.count as usize);
        for index in 0..request.count {
            let mut desc = Self::buffer_desc(index);
            unsafe { ioctl::querybuf(self.fd(), &mut desc) }
                .map_err(|errno| alloc_err("VIDIOC_QUERYBUF", errno.into()))?;

            let length = desc.length as usize;
            let offset = unsafe { desc.m.offset } as u64;
            debug!("Buffer {}: length={} offset={:#x}", index, length, offset);

            // SAFETY: the mapping is shared with the driver, which only writes
            // it while the slot is queued; readers go through a `FullSlot`,
            // which a queued slot never is.
            let map = unsafe {
                MmapOptions::new()
                    .offset(offset)
                    .len(length)
                    .map_mut(self.fd())
            }
            .map_err(|source| alloc_err("mmap", source))?;
            maps.push(map);
        }

        let pool = FramePool::new(maps, format.frame_size())
            .map_err(|source| alloc_err("mmap", source))?;
        info!("Mapped {} capture buffers", pool.len());
        self.pool = Some(pool);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.stream_ioctl(true)?;
        info!("Capture stream started");
        Ok(())
    }

    fn stop(mut self) -> Result<()> {
        if self.streaming {
            self.stream_ioctl(false)?;
        }
        drop(self.pool.take());
        info!("Capture stream stopped, {} closed", self.path.display());
        Ok(())
    }
}

impl FrameSource for V4l2Session {
    fn take_slots(&mut self) -> Vec<ActiveSlot> {
        self.pool.as_mut().map(FramePool::take_slots).unwrap_or_default()
    }

    fn enqueue(&mut self, slot: ActiveSlot) -> Result<()> {
        let index = slot.index();
        let fd = self.fd();
        let pool = self.pool.as_mut().ok_or_else(|| Error::EnqueueFailed {
            index,
            source: io_err(io::ErrorKind::Other, "buffers not allocated"),
        })?;

        let mut desc = Self::buffer_desc(index as u32);
        unsafe { ioctl::qbuf(fd, &mut desc) }.map_err(|errno| Error::EnqueueFailed {
            index,
            source: errno.into(),
        })?;
        pool.mark_queued(slot);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<FullSlot> {
        let mut desc;
        loop {
            self.wait_readable().map_err(Error::DequeueFailed)?;
            desc = Self::buffer_desc(0);
            match unsafe { ioctl::dqbuf(self.fd(), &mut desc) } {
                Ok(_) => break,
                Err(Errno::EAGAIN) | Err(Errno::EINTR) => continue,
                Err(errno) => return Err(Error::DequeueFailed(errno.into())),
            }
        }

        let pool = self.pool.as_mut().ok_or_else(|| {
            Error::DequeueFailed(io_err(io::ErrorKind::Other, "buffers not allocated"))
        })?;
        if (desc.bytesused as usize) < pool.frame_size() {
            debug!(
                "Buffer {} reports {} bytes used, frame is {}",
                desc.index,
                desc.bytesused,
                pool.frame_size()
            );
        }
        pool.take_filled(desc.index as usize).map_err(Error::DequeueFailed)
    }

    fn frame(&self, slot: &FullSlot) -> &[u8] {
        match &self.pool {
            Some(pool) => pool.full(slot),
            None => &[],
        }
    }
}

impl Drop for V4l2Session {
    fn drop(&mut self) {
        if self.streaming {
            let _ = self.stream_ioctl(false);
        }
    }
}
