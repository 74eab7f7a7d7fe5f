use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::device::{FlipEvent, KmsDevice};
use crate::error::{DisplayError, ScheduleError};
use crate::modes::{select_output, ModeInfo, ModePreference};
use crate::scheduler::FlipScheduler;

/// One DRM device driving one connector through one CRTC.
pub struct Display<D: KmsDevice> {
    device: Rc<D>,
    path: PathBuf,
    connector_id: u32,
    connector_name: String,
    crtc_id: u32,
    primary_plane: Option<u32>,
    physical_size: (u32, u32),
    mode_index: usize,
    modes: Vec<ModeInfo>,
    scheduler: FlipScheduler<D::Resource>,
}

impl<D: KmsDevice> Display<D> {
    pub fn new(device: Rc<D>, path: &Path, prefs: &ModePreference) -> Result<Self, DisplayError> {
        let snapshot = device.resources().map_err(|source| DisplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let output = select_output(&snapshot, prefs)
            .map_err(|e| DisplayError::configuration(path, e.to_string()))?;

        log::info!(
            "[drm] Using {} (connector {}, CRTC {}) on {}",
            output.connector_name,
            output.connector_id,
            output.crtc_id,
            path.display()
        );
        log::info!("[drm] Selected mode [{}] {}", output.mode_index, output.mode);
        log::info!(
            "[drm] Physical size: {}x{}mm",
            output.physical_size.0,
            output.physical_size.1
        );

        let scheduler = FlipScheduler::new(output.crtc_id, output.connector_id, output.mode);

        Ok(Display {
            device,
            path: path.to_path_buf(),
            connector_id: output.connector_id,
            connector_name: output.connector_name,
            crtc_id: output.crtc_id,
            primary_plane: output.plane_id,
            physical_size: output.physical_size,
            mode_index: output.mode_index,
            modes: output.modes,
            scheduler,
        })
    }

    /// Switches to atomic commits when the device and output allow it.
    ///
    /// Returns whether atomic is in use. On false the legacy path stays
    /// active. Has no effect once the mode is set.
    pub fn enable_atomic(&mut self) -> bool {
        if self.scheduler.is_atomic() {
            return true;
        }
        if self.scheduler.is_mode_set() {
            log::warn!("[drm] Mode already set, keeping legacy modesetting");
            return false;
        }
        let Some(plane_id) = self.primary_plane else {
            log::warn!(
                "[drm] No primary plane for CRTC {}, using legacy modesetting",
                self.crtc_id
            );
            return false;
        };
        if let Err(e) = self.device.enable_atomic() {
            log::warn!("[drm] Atomic modesetting unavailable, using legacy: {}", e);
            return false;
        }

        log::info!("[drm] Using atomic modesetting on plane {}", plane_id);
        self.scheduler.use_atomic(plane_id);
        true
    }

    pub fn is_atomic(&self) -> bool {
        self.scheduler.is_atomic()
    }

    /// Enables the flip watchdog. `None` or zero disables it.
    pub fn set_flip_timeout(&mut self, timeout: Option<Duration>) {
        self.scheduler.set_timeout(timeout);
    }

    pub fn device(&self) -> &Rc<D> {
        &self.device
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connector_id(&self) -> u32 {
        self.connector_id
    }

    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }

    pub fn crtc_id(&self) -> u32 {
        self.crtc_id
    }

    pub fn physical_size(&self) -> (u32, u32) {
        self.physical_size
    }

    pub fn mode(&self) -> &ModeInfo {
        self.scheduler.mode()
    }

    pub fn mode_index(&self) -> usize {
        self.mode_index
    }

    /// Every mode the connector advertised.
    pub fn modes(&self) -> &[ModeInfo] {
        &self.modes
    }

    pub fn size(&self) -> (u32, u32) {
        let (w, h) = self.mode().size();
        (w as u32, h as u32)
    }

    pub fn is_mode_set(&self) -> bool {
        self.scheduler.is_mode_set()
    }

    pub fn is_flip_pending(&self) -> bool {
        !self.scheduler.is_idle()
    }

    pub fn in_flight(&self) -> Option<&D::Resource> {
        self.scheduler.in_flight()
    }

    pub(crate) fn in_flight_fb(&self) -> Option<u32> {
        self.scheduler.in_flight_fb()
    }

    pub(crate) fn commit(&mut self, resource: D::Resource, fb_id: u32) -> Result<(), ScheduleError> {
        self.scheduler.commit(&*self.device, resource, fb_id)
    }

    pub(crate) fn complete(&mut self, event: &FlipEvent) -> Option<D::Resource> {
        self.scheduler.complete(event)
    }

    pub(crate) fn check_stalled(&mut self, now: Instant) -> bool {
        self.scheduler.check_stalled(now)
    }

    pub(crate) fn abandon_flip(&mut self) -> Option<D::Resource> {
        self.scheduler.abandon()
    }
}
