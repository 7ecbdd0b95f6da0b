//! Fixed pool of frame buffer slots and the role-tagged handles over them.
//!
//! A slot is always in exactly one role. `ActiveSlot` is held either by the
//! relay (about to be handed to the driver) or by the pool's queued list
//! (owned by the driver). `FullSlot` is returned by a dequeue and is the only
//! handle that gives a read-only view of slot memory. Neither handle can be
//! cloned, and handles are only minted once per slot, so two roles can never
//! name the same slot.

use std::collections::VecDeque;
use std::io;

use crate::error::io_err;

/// Slot that may be queued to the driver for filling.
#[derive(Debug, PartialEq, Eq)]
pub struct ActiveSlot {
    index: usize,
}

/// Slot filled by the driver and eligible for transmission.
#[derive(Debug, PartialEq, Eq)]
pub struct FullSlot {
    index: usize,
}

impl ActiveSlot {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl FullSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Give up the filled contents; the slot may be queued again.
    pub fn recycle(self) -> ActiveSlot {
        ActiveSlot { index: self.index }
    }
}

/// Owned buffers plus driver queue bookkeeping.
///
/// `B` is the backing storage: memory-mapped driver buffers for V4L2, plain
/// vectors for in-memory sources.
pub struct FramePool<B> {
    buffers: Vec<B>,
    frame_size: usize,
    queued: VecDeque<ActiveSlot>,
    minted: bool,
}

impl<B> FramePool<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Every buffer must hold at least one frame.
    pub fn new(mut buffers: Vec<B>, frame_size: usize) -> io::Result<Self> {
        if let Some((index, short)) = buffers
            .iter()
            .enumerate()
            .find(|(_, b)| b.as_ref().len() < frame_size)
        {
            return Err(io_err(
                io::ErrorKind::InvalidInput,
                format!(
                    "slot {} holds {} bytes, frame needs {}",
                    index,
                    short.as_ref().len(),
                    frame_size
                ),
            ));
        }

        for buf in buffers.iter_mut() {
            buf.as_mut().fill(0);
        }

        Ok(Self {
            buffers,
            frame_size,
            queued: VecDeque::new(),
            minted: false,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Hand out one `ActiveSlot` per buffer. Only the first call yields
    /// handles; later calls return an empty list.
    pub fn take_slots(&mut self) -> Vec<ActiveSlot> {
        if self.minted {
            return Vec::new();
        }
        self.minted = true;
        (0..self.buffers.len()).map(|index| ActiveSlot { index }).collect()
    }

    /// Record that the driver now owns `slot`.
    pub fn mark_queued(&mut self, slot: ActiveSlot) {
        self.queued.push_back(slot);
    }

    /// Index of the slot queued longest, i.e. the next the driver fills.
    pub fn oldest_queued(&self) -> Option<usize> {
        self.queued.front().map(ActiveSlot::index)
    }

    fn is_queued(&self, index: usize) -> bool {
        self.queued.iter().any(|s| s.index == index)
    }

    /// Convert the queued slot the driver reported as filled into a `FullSlot`.
    pub fn take_filled(&mut self, index: usize) -> io::Result<FullSlot> {
        let pos = self.queued.iter().position(|s| s.index == index);
        let slot = pos
            .and_then(|pos| self.queued.remove(pos))
            .ok_or_else(|| {
                io_err(
                    io::ErrorKind::InvalidData,
                    format!("driver returned slot {} which was not queued", index),
                )
            })?;

        Ok(FullSlot { index: slot.index })
    }

    /// Writable view of a slot currently owned by the driver. Only the
    /// driver side of a source calls this while filling.
    pub fn queued_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if !self.is_queued(index) {
            return None;
        }
        let frame_size = self.frame_size;
        Some(&mut self.buffers[index].as_mut()[..frame_size])
    }

    /// Read-only view of exactly one frame from a filled slot.
    pub fn full(&self, slot: &FullSlot) -> &[u8] {
        &self.buffers[slot.index].as_ref()[..self.frame_size]
    }

    /// Start address of each slot's memory, for identity checks.
    pub fn slot_addrs(&self) -> Vec<usize> {
        self.buffers
            .iter()
            .map(|b| b.as_ref().as_ptr() as usize)
            .collect()
    }
}
