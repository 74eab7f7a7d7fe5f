//! Buffer ownership between the producer and the display.
//!
//! The presenter keeps the buffer that is on screen (`last`), lets the
//! scheduler hold the one in flight, and keeps at most one newer buffer
//! waiting for the flip to finish or for focus to return (`queued`). Every
//! buffer the producer hands over is given back through
//! [`ExportClient::dispatch_release_buffer`] exactly once, and never while it
//! may still be scanned out.

use std::io;
use std::time::Instant;

use crate::buffer::GraphicsBuffer;
use crate::cache::BufferCache;
use crate::device::{DmaBufDescriptor, KmsDevice, ShmBuffer};
use crate::display::Display;
use crate::error::{FrameError, ImportError, ScheduleError};

/// Notifications back to the producer of buffers.
pub trait ExportClient<R> {
    /// `resource` is no longer displayed and may be reused.
    fn dispatch_release_buffer(&mut self, resource: &R);

    /// The producer may render its next frame.
    fn dispatch_frame_complete(&mut self);
}

pub struct Presenter<D: KmsDevice, C: ExportClient<D::Resource>> {
    display: Display<D>,
    cache: BufferCache<D>,
    client: C,
    last: Option<D::Resource>,
    /// Framebuffer the CRTC scans out, valid even after `last` was destroyed.
    scanout_fb: Option<u32>,
    queued: Option<D::Resource>,
    focused: bool,
    torn_down: bool,
}

impl<D: KmsDevice, C: ExportClient<D::Resource>> Presenter<D, C> {
    pub fn new(display: Display<D>, client: C) -> Self {
        Presenter {
            display,
            cache: BufferCache::new(),
            client,
            last: None,
            scanout_fb: None,
            queued: None,
            focused: true,
            torn_down: false,
        }
    }

    pub fn display(&self) -> &Display<D> {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut Display<D> {
        &mut self.display
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// The buffer whose flip completed last.
    pub fn last_resource(&self) -> Option<&D::Resource> {
        self.last.as_ref()
    }

    pub fn queued_resource(&self) -> Option<&D::Resource> {
        self.queued.as_ref()
    }

    pub fn cached_buffers(&self) -> usize {
        self.cache.len()
    }

    /// Presents a buffer the allocator can import directly.
    pub fn export_buffer_resource(&mut self, resource: D::Resource) -> Result<(), FrameError> {
        if self.cache.lookup(&resource).is_none() {
            let device = self.display.device().clone();
            let imported = device
                .import_resource(&resource)
                .and_then(|bo| GraphicsBuffer::from_bo(device.clone(), bo));
            self.store_import(&resource, imported)?;
        }
        self.handle_buffer(resource)
    }

    /// Presents a buffer described by its DMA-BUF planes.
    pub fn export_dmabuf_resource(
        &mut self,
        descriptor: DmaBufDescriptor<D::Resource>,
    ) -> Result<(), FrameError> {
        let resource = descriptor.resource.clone();
        if self.cache.lookup(&resource).is_none() {
            let device = self.display.device().clone();
            let imported = descriptor
                .validate()
                .and_then(|()| device.import_dmabuf(&descriptor))
                .and_then(|bo| GraphicsBuffer::from_bo(device.clone(), bo));
            self.store_import(&resource, imported)?;
        }
        self.handle_buffer(resource)
    }

    /// Copies CPU pixels into a scanout buffer and presents it.
    pub fn export_shm_buffer(
        &mut self,
        resource: D::Resource,
        shm: &ShmBuffer<'_>,
    ) -> Result<(), FrameError> {
        let device = self.display.device().clone();
        let live = self.is_live(&resource);
        let reused = match self.cache.get_mut(&resource) {
            Some(buffer) if buffer.size() == (shm.width, shm.height) => {
                let written = shm.validate().and_then(|()| match buffer.bo_mut() {
                    Some(bo) => device.write_shm(bo, shm),
                    None => Err(ImportError::InvalidDescriptor("buffer already destroyed".into())),
                });
                if let Err(e) = written {
                    self.reject(&resource, e)?;
                }
                true
            }
            // The old buffer may be on screen; store_import retires it once
            // the replacement exists.
            Some(_) if live => {
                log::debug!("[view] Displayed buffer {:?} changed size, replacing", resource);
                false
            }
            Some(_) => {
                log::debug!("[view] Buffer {:?} changed size, reallocating", resource);
                self.cache.evict(&resource);
                false
            }
            None => false,
        };

        if reused {
            self.cache.lookup(&resource);
        } else {
            let imported = shm.validate().and_then(|()| {
                let mut bo = device.create_shm_buffer_object(shm.width, shm.height)?;
                if let Err(e) = device.write_shm(&mut bo, shm) {
                    device.destroy_buffer_object(bo);
                    return Err(e);
                }
                GraphicsBuffer::from_bo(device.clone(), bo)
            });
            self.store_import(&resource, imported)?;
        }
        self.handle_buffer(resource)
    }

    fn store_import(
        &mut self,
        resource: &D::Resource,
        imported: Result<GraphicsBuffer<D>, ImportError>,
    ) -> Result<(), FrameError> {
        match imported {
            Ok(buffer) => {
                if self.is_live(resource) && self.cache.retire(resource) {
                    self.sweep_retired();
                }
                self.cache.insert(resource.clone(), buffer);
                Ok(())
            }
            Err(e) => self.reject(resource, e),
        }
    }

    /// Drops a frame that never reached the display.
    fn reject(&mut self, resource: &D::Resource, error: ImportError) -> Result<(), FrameError> {
        log::warn!("[view] Dropping frame {:?}: {}", resource, error);
        if !self.is_live(resource) {
            self.client.dispatch_release_buffer(resource);
        }
        Err(error.into())
    }

    fn is_live(&self, resource: &D::Resource) -> bool {
        self.last.as_ref() == Some(resource)
            || self.display.in_flight() == Some(resource)
            || self.queued.as_ref() == Some(resource)
    }

    fn handle_buffer(&mut self, resource: D::Resource) -> Result<(), FrameError> {
        if !self.focused {
            self.hold(resource);
            self.client.dispatch_frame_complete();
            return Ok(());
        }

        if self.display.is_flip_pending() {
            self.hold(resource);
            return Ok(());
        }

        self.submit(resource)
    }

    /// Makes `resource` the next frame to show, dropping an older one.
    fn hold(&mut self, resource: D::Resource) {
        if let Some(previous) = self.queued.replace(resource.clone()) {
            if previous != resource {
                log::debug!("[view] Frame {:?} superseded before display", previous);
                self.release(previous);
            }
        }
    }

    fn submit(&mut self, resource: D::Resource) -> Result<(), FrameError> {
        let fb_id = match self.cache.framebuffer(&resource) {
            Some(fb_id) => fb_id,
            None => return Err(ScheduleError::UnknownResource.into()),
        };

        match self.display.commit(resource.clone(), fb_id) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.release(resource);
                Err(e.into())
            }
        }
    }

    /// Gives `resource` back to the producer once nothing holds it.
    ///
    /// Destroyed resources have no cache entry and get no release.
    fn release(&mut self, resource: D::Resource) {
        if self.is_live(&resource) {
            return;
        }
        if !self.cache.contains(&resource) {
            log::debug!("[view] Buffer {:?} was destroyed, not releasing", resource);
            return;
        }
        self.client.dispatch_release_buffer(&resource);
    }

    /// Frees retired buffers that are neither on screen nor in flight.
    fn sweep_retired(&mut self) {
        let keep: Vec<u32> = [self.scanout_fb, self.display.in_flight_fb()]
            .into_iter()
            .flatten()
            .collect();
        let freed = self.cache.sweep_retired(&keep);
        if freed > 0 {
            log::debug!("[view] Freed {} retired buffers", freed);
        }
    }

    /// Reads pending kernel events and retires completed flips.
    pub fn dispatch_events(&mut self) -> io::Result<usize> {
        let events = self.display.device().receive_events()?;
        let mut completed = 0;
        for event in &events {
            let fb_id = self.display.in_flight_fb();
            if let Some(resource) = self.display.complete(event) {
                completed += 1;
                self.on_flip_complete(resource, fb_id);
            }
        }
        Ok(completed)
    }

    fn on_flip_complete(&mut self, completed: D::Resource, fb_id: Option<u32>) {
        let previous = self.last.replace(completed.clone());
        self.scanout_fb = fb_id;
        if let Some(previous) = previous {
            if previous != completed {
                self.release(previous);
            }
        }
        self.sweep_retired();
        self.client.dispatch_frame_complete();

        if !self.focused {
            return;
        }
        if let Some(next) = self.queued.take() {
            if let Err(e) = self.submit(next) {
                log::warn!("[view] Queued frame dropped: {}", e);
            }
        }
    }

    /// The producer destroyed `resource`; its buffer is freed as soon as the
    /// display no longer needs it. No release is sent for it afterwards.
    pub fn resource_destroyed(&mut self, resource: &D::Resource) {
        if self.queued.as_ref() == Some(resource) {
            self.queued = None;
        }
        if self.last.as_ref() == Some(resource) || self.display.in_flight() == Some(resource) {
            if self.cache.retire(resource) {
                log::debug!("[view] Buffer {:?} destroyed while on screen", resource);
            }
        } else if self.cache.evict(resource) {
            log::debug!("[view] Evicted buffer {:?}", resource);
        }
    }

    /// While unfocused frames are held instead of shown. Regaining focus
    /// shows the newest held frame.
    pub fn set_focused(&mut self, focused: bool) {
        if self.focused == focused {
            return;
        }
        self.focused = focused;
        log::debug!("[view] Focus {}", if focused { "gained" } else { "lost" });

        if !focused || self.display.is_flip_pending() {
            return;
        }
        if let Some(next) = self.queued.take() {
            if let Err(e) = self.submit(next) {
                log::warn!("[view] Could not show held frame: {}", e);
            }
        }
    }

    /// Asks the producer for a frame, e.g. after a scheduling failure.
    pub fn request_frame(&mut self) {
        self.client.dispatch_frame_complete();
    }

    /// Flags a flip that outlived the configured timeout.
    pub fn check_stalled(&mut self, now: Instant) -> bool {
        self.display.check_stalled(now)
    }

    /// Returns every held buffer to the producer and frees all framebuffers.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let held = [self.last.take(), self.display.abandon_flip(), self.queued.take()];
        self.scanout_fb = None;

        let mut released: Vec<D::Resource> = Vec::new();
        for resource in held.into_iter().flatten() {
            if !released.contains(&resource) {
                released.push(resource.clone());
                self.release(resource);
            }
        }

        log::debug!("[view] Freeing {} cached buffers", self.cache.len());
        self.cache.clear();
    }
}

impl<D: KmsDevice, C: ExportClient<D::Resource>> Drop for Presenter<D, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
