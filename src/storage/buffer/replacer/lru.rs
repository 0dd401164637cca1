use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;
use crate::common::types::FrameId;

/// LRU (Least Recently Used) page replacement policy.
///
/// Tracks the frames that are currently unpinned, in the order they became
/// evictable. The insertion-ordered map gives O(1) membership checks and
/// removal, so `pin` never scans the candidate list.
pub struct LruReplacer {
    frames: Mutex<LinkedHashMap<FrameId, ()>>,
}

impl LruReplacer {
    pub fn new(pool_size: usize) -> Self {
        Self {
            frames: Mutex::new(LinkedHashMap::with_capacity(pool_size)),
        }
    }

    /// Victim selection: remove and return the frame that has been unpinned
    /// the longest, or `None` when every frame is pinned.
    pub fn victim(&self) -> Option<FrameId> {
        let mut frames = self.frames.lock();
        frames.pop_front().map(|(frame_id, ())| frame_id)
    }

    /// A pinned frame is in use and must not be selected as a victim.
    pub fn pin(&self, frame_id: FrameId) {
        self.frames.lock().remove(&frame_id);
    }

    /// Make a frame an eviction candidate. Unpinning a frame that is already
    /// a candidate keeps its original position.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut frames = self.frames.lock();
        if !frames.contains_key(&frame_id) {
            frames.insert(frame_id, ());
        }
    }

    /// Number of frames currently eligible for eviction
    pub fn size(&self) -> usize {
        self.frames.lock().len()
    }
}
