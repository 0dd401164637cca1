use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use parking_lot::RwLock;

use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

const INVALID_PAGE_ID: PageId = 0;

pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<FramePtr>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_list: RwLock<VecDeque<FrameId>>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = i as FrameId;
            let frame = Frame::new(frame_id, Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))));
            frames.push(Arc::new(RwLock::new(frame)));
            free_list.push_back(frame_id);
        }

        Ok(Self {
            pool_size,
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: RwLock::new(free_list),
            replacer: LruReplacer::new(pool_size),
            disk_manager,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Fetch a page from the buffer pool or disk
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation("Cannot fetch invalid page ID".to_string()));
        }

        // Check if page is already in the buffer pool
        if let Some(&frame_id) = self.page_table.read().get(&page_id) {
            let frame = &self.frames[frame_id as usize];

            {
                let mut frame_guard = frame.write();
                frame_guard.pin_count += 1;
            }

            // A pinned frame must not be an eviction candidate
            self.replacer.pin(frame_id);

            let frame_guard = frame.read();
            return Ok(frame_guard.page.clone());
        }

        // Page not in buffer pool, need to allocate a frame and read from disk
        let frame_id = self.allocate_frame()?;
        self.flush_frame_if_dirty(frame_id)?;

        // Read the page from disk into a temporary buffer
        let mut new_page = Page::new(page_id);
        self.disk_manager.read_page(page_id, &mut new_page)?;

        {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();

            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = new_page;
            }

            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
        }

        self.page_table.write().insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        let frame_guard = self.frames[frame_id as usize].read();
        Ok(frame_guard.page.clone())
    }

    /// Create a new page
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        // Allocate a frame before touching disk state, so a full pool fails cleanly
        let frame_id = self.allocate_frame()?;
        self.flush_frame_if_dirty(frame_id)?;

        let page_id = self.disk_manager.allocate_page()?;
        let frame = &self.frames[frame_id as usize];

        {
            let mut frame_guard = frame.write();

            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = Page::new(page_id);
            }

            frame_guard.pin_count = 1;
            frame_guard.is_dirty = true;
        }

        self.page_table.write().insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        let frame_guard = frame.read();
        Ok((frame_guard.page.clone(), page_id))
    }

    /// Unpin a page, potentially marking it as dirty
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation("Cannot unpin invalid page ID".to_string()));
        }

        let frame_id = {
            let page_table = self.page_table.read();
            match page_table.get(&page_id) {
                Some(&id) => id,
                None => return Err(BufferPoolError::PageNotFound(page_id)),
            }
        };

        let pin_count = {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();

            if frame_guard.pin_count > 0 {
                frame_guard.pin_count -= 1;
            }

            if is_dirty {
                frame_guard.is_dirty = true;
            }

            frame_guard.pin_count
        };

        // With the last pin released, the frame becomes an eviction candidate
        if pin_count == 0 {
            self.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Flush a specific page to disk
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation("Cannot flush invalid page ID".to_string()));
        }

        let frame_id = {
            let page_table = self.page_table.read();
            match page_table.get(&page_id) {
                Some(&id) => id,
                None => return Err(BufferPoolError::PageNotFound(page_id)),
            }
        };

        let frame = &self.frames[frame_id as usize];
        let needs_flush;
        let page_copy;

        {
            let frame_guard = frame.read();
            needs_flush = frame_guard.is_dirty;

            if needs_flush {
                page_copy = frame_guard.page.read().clone();
            } else {
                page_copy = Page::new(INVALID_PAGE_ID); // Dummy page, won't be used
            }
        }

        if needs_flush {
            self.disk_manager.write_page(&page_copy)?;

            let mut frame_guard = frame.write();
            frame_guard.is_dirty = false;
        }

        Ok(())
    }

    /// Flush all pages in the buffer pool to disk
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = self.page_table.read().keys().copied().collect();

        for page_id in page_ids {
            self.flush_page(page_id)?;
        }

        Ok(())
    }

    /// Delete a page from the buffer pool
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation("Cannot delete invalid page ID".to_string()));
        }

        let frame_id_opt = {
            let mut page_table = self.page_table.write();
            page_table.remove(&page_id)
        };

        if let Some(frame_id) = frame_id_opt {
            let frame = &self.frames[frame_id as usize];
            let mut frame_guard = frame.write();

            if frame_guard.pin_count > 0 {
                // Reinsert into page table since we can't delete it now.
                // The frame lock is dropped first: the page table is always
                // taken before a frame lock elsewhere.
                drop(frame_guard);
                self.page_table.write().insert(page_id, frame_id);
                return Err(BufferPoolError::PagePinned(page_id));
            }

            {
                let mut page_guard = frame_guard.page.write();
                *page_guard = Page::new(INVALID_PAGE_ID);
            }

            frame_guard.is_dirty = false;
            frame_guard.pin_count = 0;

            drop(frame_guard); // Release lock before modifying free list
            self.replacer.pin(frame_id);
            self.free_list.write().push_back(frame_id);
        }

        // Note: disk metadata is not reclaimed; the page number is simply retired

        Ok(())
    }

    /// Allocate a frame, either from the free list or by page replacement
    fn allocate_frame(&self) -> Result<FrameId, BufferPoolError> {
        // Try to get a frame from the free list first
        if let Some(frame_id) = self.free_list.write().pop_front() {
            return Ok(frame_id);
        }

        // No free frames, evict the least recently used unpinned frame
        if let Some(victim_id) = self.replacer.victim() {
            let frame = &self.frames[victim_id as usize];

            let page_id;
            {
                let frame_guard = frame.read();

                if frame_guard.pin_count > 0 {
                    return Err(BufferPoolError::BufferPoolFull);
                }

                let page_guard = frame_guard.page.read();
                page_id = page_guard.page_id;
            }

            if page_id != INVALID_PAGE_ID {
                self.page_table.write().remove(&page_id);
            }

            return Ok(victim_id);
        }

        // Buffer pool is full (all frames are pinned)
        Err(BufferPoolError::BufferPoolFull)
    }

    /// Write back the victim frame's page if it still carries unflushed changes
    fn flush_frame_if_dirty(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        let frame = &self.frames[frame_id as usize];
        let dirty;
        let page_to_write;

        {
            let frame_guard = frame.read();
            dirty = frame_guard.is_dirty;
            if dirty {
                page_to_write = frame_guard.page.read().clone();
            } else {
                page_to_write = Page::new(INVALID_PAGE_ID); // Dummy page, won't be used
            }
        }

        if dirty {
            self.disk_manager.write_page(&page_to_write)?;
            frame.write().is_dirty = false;
        }

        Ok(())
    }
}
