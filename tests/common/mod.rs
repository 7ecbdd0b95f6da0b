//! Scripted in-memory camera and a recording sink shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use boson_relay::capture::{
    ActiveSlot, CaptureDevice, DeviceFormat, FramePool, FrameSource, FullSlot, PixelFormat,
};
use boson_relay::transport::{FrameSink, HeaderRecord};
use boson_relay::{Config, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Enqueue(usize),
    Dequeue(usize),
    /// Start address of the bytes handed to the sink
    Send(usize),
    Start,
    Stop,
}

pub type Log = Rc<RefCell<Vec<Event>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Capability,
    Format,
    Allocate,
    Start,
}

/// Camera whose driver side fills queued slots from a script of frames.
pub struct MockCamera {
    script: VecDeque<Vec<u8>>,
    pool: Option<FramePool<Vec<u8>>>,
    fail_at: Option<FailAt>,
    log: Log,
}

impl MockCamera {
    pub fn new(script: Vec<Vec<u8>>, log: Log) -> Self {
        Self {
            script: script.into(),
            pool: None,
            fail_at: None,
            log,
        }
    }

    pub fn failing(fail_at: FailAt, log: Log) -> Self {
        Self {
            fail_at: Some(fail_at),
            ..Self::new(Vec::new(), log)
        }
    }

    pub fn slot_addrs(&self) -> Vec<usize> {
        self.pool.as_ref().map(FramePool::slot_addrs).unwrap_or_default()
    }

    fn injected(&self, at: FailAt) -> Option<io::Error> {
        (self.fail_at == Some(at)).then(|| io::Error::other(format!("injected {:?} failure", at)))
    }
}

impl FrameSource for MockCamera {
    fn take_slots(&mut self) -> Vec<ActiveSlot> {
        self.pool.as_mut().map(FramePool::take_slots).unwrap_or_default()
    }

    fn enqueue(&mut self, slot: ActiveSlot) -> Result<()> {
        self.log.borrow_mut().push(Event::Enqueue(slot.index()));
        let pool = self.pool.as_mut().ok_or_else(|| Error::EnqueueFailed {
            index: slot.index(),
            source: io::Error::other("not allocated"),
        })?;
        pool.mark_queued(slot);
        Ok(())
    }

    fn dequeue(&mut self) -> Result<FullSlot> {
        let pool = self
            .pool
            .as_mut()
            .ok_or_else(|| Error::DequeueFailed(io::Error::other("not allocated")))?;
        let index = pool
            .oldest_queued()
            .ok_or_else(|| Error::DequeueFailed(io::Error::other("nothing queued")))?;
        let frame = self.script.pop_front().ok_or_else(|| {
            Error::DequeueFailed(io::Error::new(io::ErrorKind::UnexpectedEof, "script done"))
        })?;

        if let Some(buf) = pool.queued_mut(index) {
            buf.copy_from_slice(&frame);
        }
        self.log.borrow_mut().push(Event::Dequeue(index));
        pool.take_filled(index).map_err(Error::DequeueFailed)
    }

    fn frame(&self, slot: &FullSlot) -> &[u8] {
        match &self.pool {
            Some(pool) => pool.full(slot),
            None => &[],
        }
    }
}

impl CaptureDevice for MockCamera {
    fn negotiate(&mut self, width: u32, height: u32) -> Result<DeviceFormat> {
        if let Some(source) = self.injected(FailAt::Capability) {
            return Err(Error::CapabilityMismatch {
                op: "VIDIOC_QUERYCAP",
                source,
            });
        }
        if let Some(source) = self.injected(FailAt::Format) {
            return Err(Error::FormatRejected {
                op: "VIDIOC_S_FMT",
                source,
            });
        }
        Ok(DeviceFormat::new(width, height, PixelFormat::Y16))
    }

    fn allocate(&mut self, num_buffers: u32) -> Result<()> {
        if let Some(source) = self.injected(FailAt::Allocate) {
            return Err(Error::BufferAllocationFailed {
                op: "VIDIOC_REQBUFS",
                source,
            });
        }
        let frame_size = self.script.front().map_or(0, Vec::len);
        let buffers = vec![vec![0xEE; frame_size]; num_buffers as usize];
        let pool = FramePool::new(buffers, frame_size).map_err(|source| {
            Error::BufferAllocationFailed {
                op: "mmap",
                source,
            }
        })?;
        self.pool = Some(pool);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if let Some(source) = self.injected(FailAt::Start) {
            return Err(Error::StreamControlFailed {
                op: "VIDIOC_STREAMON",
                source,
            });
        }
        self.log.borrow_mut().push(Event::Start);
        Ok(())
    }

    fn stop(self) -> Result<()> {
        self.log.borrow_mut().push(Event::Stop);
        Ok(())
    }
}

/// Sink that keeps a copy of everything it is given.
pub struct RecordingSink {
    pub log: Log,
    pub header: Option<HeaderRecord>,
    pub frames: Vec<Vec<u8>>,
}

impl RecordingSink {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            header: None,
            frames: Vec::new(),
        }
    }
}

impl FrameSink for RecordingSink {
    fn send_header(&mut self, header: &HeaderRecord) -> Result<()> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.log
            .borrow_mut()
            .push(Event::Send(frame.as_ptr() as usize));
        self.frames.push(frame.to_vec());
        Ok(())
    }
}

/// `count` distinct frames of `width × height` Y16 pixels.
pub fn script(count: usize, width: u32, height: u32) -> Vec<Vec<u8>> {
    let size = width as usize * height as usize * 2;
    (0..count)
        .map(|i| (0..size).map(|j| (i * 31 + j * 7) as u8).collect())
        .collect()
}

pub fn config(width: u32, height: u32, buffers: u32) -> Config {
    let mut config = Config::default();
    config.capture.width = width;
    config.capture.height = height;
    config.capture.buffer_count = buffers;
    config
}

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}
