use std::collections::HashMap;

use crate::buffer::GraphicsBuffer;
use crate::device::KmsDevice;

/// Imported buffers keyed by the producer's resource token.
///
/// Lookups check the most recently used token before the map. Buffers the
/// display may still scan out after their token was destroyed or reused are
/// parked in `retired`, outside any lookup, until a sweep finds their
/// framebuffer off screen.
pub struct BufferCache<D: KmsDevice> {
    entries: HashMap<D::Resource, GraphicsBuffer<D>>,
    recent: Option<(D::Resource, u32)>,
    retired: Vec<(D::Resource, GraphicsBuffer<D>)>,
}

impl<D: KmsDevice> Default for BufferCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: KmsDevice> BufferCache<D> {
    pub fn new() -> Self {
        BufferCache {
            entries: HashMap::new(),
            recent: None,
            retired: Vec::new(),
        }
    }

    /// Framebuffer id of a cached resource, marking it most recent.
    pub fn lookup(&mut self, resource: &D::Resource) -> Option<u32> {
        if let Some((recent, fb_id)) = &self.recent {
            if recent == resource {
                return Some(*fb_id);
            }
        }
        let fb_id = self.entries.get(resource)?.fb_id();
        self.recent = Some((resource.clone(), fb_id));
        Some(fb_id)
    }

    pub fn get_mut(&mut self, resource: &D::Resource) -> Option<&mut GraphicsBuffer<D>> {
        self.entries.get_mut(resource)
    }

    /// Stores `buffer` for `resource`, dropping any previous entry.
    pub fn insert(&mut self, resource: D::Resource, buffer: GraphicsBuffer<D>) -> u32 {
        let fb_id = buffer.fb_id();
        self.recent = Some((resource.clone(), fb_id));
        if let Some(old) = self.entries.insert(resource, buffer) {
            log::debug!("[cache] Replaced framebuffer {}", old.fb_id());
        }
        fb_id
    }

    /// Framebuffer id of a cached buffer, without touching recency.
    pub fn framebuffer(&self, resource: &D::Resource) -> Option<u32> {
        self.entries.get(resource).map(GraphicsBuffer::fb_id)
    }

    pub fn contains(&self, resource: &D::Resource) -> bool {
        self.entries.contains_key(resource)
    }

    fn forget_recent(&mut self, resource: &D::Resource) {
        if matches!(&self.recent, Some((recent, _)) if recent == resource) {
            self.recent = None;
        }
    }

    /// Frees the buffer of `resource` now.
    pub fn evict(&mut self, resource: &D::Resource) -> bool {
        self.forget_recent(resource);
        self.entries.remove(resource).is_some()
    }

    /// Moves the buffer of `resource` out of the lookup path, keeping it alive.
    pub fn retire(&mut self, resource: &D::Resource) -> bool {
        self.forget_recent(resource);
        match self.entries.remove(resource) {
            Some(buffer) => {
                self.retired.push((resource.clone(), buffer));
                true
            }
            None => false,
        }
    }

    pub fn is_retired(&self, resource: &D::Resource) -> bool {
        self.retired.iter().any(|(r, _)| r == resource)
    }

    /// Frees every retired buffer whose framebuffer is not in `keep`.
    ///
    /// Returns how many were freed.
    pub fn sweep_retired(&mut self, keep: &[u32]) -> usize {
        let before = self.retired.len();
        self.retired.retain(|(_, buffer)| keep.contains(&buffer.fb_id()));
        before - self.retired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    pub fn clear(&mut self) {
        self.recent = None;
        self.retired.clear();
        self.entries.clear();
    }
}
