//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

/// Trait for page replacement algorithms.
///
/// A frame is a victim candidate only between `unpin` and the next `pin`.
pub trait Replacer: Send + Sync {
    /// Selects and removes a victim frame for eviction.
    ///
    /// Returns None if no frames are evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Removes a frame from the victim candidates.
    fn pin(&self, frame_id: FrameId);

    /// Adds a frame to the victim candidates.
    fn unpin(&self, frame_id: FrameId);

    /// Returns the number of victim candidates.
    fn size(&self) -> usize;
}

/// LRU replacement policy.
///
/// The victim is the least-recently-unpinned frame. Unpinning an
/// already-tracked frame does not refresh its position.
pub struct LruReplacer {
    inner: Mutex<LruInner>,
}

struct LruInner {
    /// Frames in unpin order, oldest at the front.
    queue: VecDeque<FrameId>,
    /// Membership set mirroring the queue.
    members: HashSet<FrameId>,
}

impl LruReplacer {
    /// Creates a new LRU replacer for a pool of `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                queue: VecDeque::with_capacity(num_frames),
                members: HashSet::with_capacity(num_frames),
            }),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let frame_id = inner.queue.pop_front()?;
        inner.members.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.members.remove(&frame_id) {
            inner.queue.retain(|f| *f != frame_id);
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.members.insert(frame_id) {
            inner.queue.push_back(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.inner.lock().members.len()
    }
}

/// Status of a slot in the clock replacer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockStatus {
    /// Not a victim candidate.
    Empty,
    /// Candidate that has exhausted its second chance.
    Unused,
    /// Candidate with its second chance remaining.
    Used,
}

/// CLOCK replacement policy.
///
/// Frames sit on a circular dial. The hand skips Empty slots, demotes
/// Used slots to Unused, and evicts the first Unused slot it meets.
pub struct ClockReplacer {
    capacity: usize,
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    status: Vec<ClockStatus>,
    hand: usize,
    size: usize,
}

impl ClockReplacer {
    /// Creates a new clock replacer for a pool of `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            capacity: num_frames,
            inner: Mutex::new(ClockInner {
                status: vec![ClockStatus::Empty; num_frames],
                hand: 0,
                size: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.size == 0 {
            return None;
        }

        // Two full rotations suffice: the first clears every Used bit.
        for _ in 0..2 * self.capacity {
            let hand = inner.hand;
            match inner.status[hand] {
                ClockStatus::Used => inner.status[hand] = ClockStatus::Unused,
                ClockStatus::Unused => {
                    inner.status[hand] = ClockStatus::Empty;
                    inner.size -= 1;
                    inner.hand = (hand + 1) % self.capacity;
                    return Some(FrameId(hand as u32));
                }
                ClockStatus::Empty => {}
            }
            inner.hand = (hand + 1) % self.capacity;
        }
        None
    }

    fn pin(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx >= self.capacity {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.status[idx] != ClockStatus::Empty {
            inner.status[idx] = ClockStatus::Empty;
            inner.size -= 1;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        let idx = frame_id.0 as usize;
        if idx >= self.capacity {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.status[idx] == ClockStatus::Empty {
            inner.status[idx] = ClockStatus::Used;
            inner.size += 1;
        }
    }

    fn size(&self) -> usize {
        self.inner.lock().size
    }
}
