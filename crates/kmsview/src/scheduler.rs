use std::fmt::Debug;
use std::time::{Duration, Instant};

use crate::device::{AtomicRequest, FlipEvent, KmsDevice};
use crate::error::ScheduleError;
use crate::modes::ModeInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlipState<R> {
    Idle,
    Pending {
        resource: R,
        fb_id: u32,
        submitted: Instant,
    },
    /// Pending for longer than the configured timeout. Still waits for the
    /// kernel event, no new flip is accepted.
    Stalled {
        resource: R,
        fb_id: u32,
        submitted: Instant,
    },
}

/// How frames reach the CRTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPath {
    /// SetCrtc once, then PageFlip per frame.
    Legacy,
    /// One atomic commit per frame on the primary plane.
    Atomic { plane_id: u32 },
}

/// Mode-set and page-flip submission for one CRTC.
///
/// At most one flip is in flight. The in-flight resource is stored here so
/// that a completion event for the CRTC identifies it without any lookup.
#[derive(Debug)]
pub struct FlipScheduler<R> {
    crtc_id: u32,
    connector_id: u32,
    mode: ModeInfo,
    mode_set: bool,
    path: CommitPath,
    state: FlipState<R>,
    timeout: Option<Duration>,
}

impl<R: Clone + PartialEq + Debug> FlipScheduler<R> {
    pub fn new(crtc_id: u32, connector_id: u32, mode: ModeInfo) -> Self {
        FlipScheduler {
            crtc_id,
            connector_id,
            mode,
            mode_set: false,
            path: CommitPath::Legacy,
            state: FlipState::Idle,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// Zero disables the watchdog like `None`.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout.filter(|t| !t.is_zero());
    }

    /// Switches to atomic commits. Only valid before the first commit.
    pub fn use_atomic(&mut self, plane_id: u32) {
        debug_assert!(!self.mode_set);
        self.path = CommitPath::Atomic { plane_id };
    }

    pub fn commit_path(&self) -> CommitPath {
        self.path
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.path, CommitPath::Atomic { .. })
    }

    pub fn crtc_id(&self) -> u32 {
        self.crtc_id
    }

    pub fn mode(&self) -> &ModeInfo {
        &self.mode
    }

    pub fn is_mode_set(&self) -> bool {
        self.mode_set
    }

    pub fn state(&self) -> &FlipState<R> {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, FlipState::Idle)
    }

    pub fn is_stalled(&self) -> bool {
        matches!(self.state, FlipState::Stalled { .. })
    }

    pub fn in_flight(&self) -> Option<&R> {
        match &self.state {
            FlipState::Idle => None,
            FlipState::Pending { resource, .. } | FlipState::Stalled { resource, .. } => {
                Some(resource)
            }
        }
    }

    pub fn in_flight_fb(&self) -> Option<u32> {
        match &self.state {
            FlipState::Idle => None,
            FlipState::Pending { fb_id, .. } | FlipState::Stalled { fb_id, .. } => Some(*fb_id),
        }
    }

    /// Puts `fb_id` on screen, setting the mode on first use.
    pub fn commit<D>(&mut self, device: &D, resource: R, fb_id: u32) -> Result<(), ScheduleError>
    where
        D: KmsDevice<Resource = R>,
    {
        if !self.is_idle() {
            return Err(ScheduleError::Busy);
        }

        match self.path {
            CommitPath::Legacy => self.commit_legacy(device, fb_id)?,
            CommitPath::Atomic { plane_id } => self.commit_atomic(device, plane_id, fb_id)?,
        }

        self.state = FlipState::Pending {
            resource,
            fb_id,
            submitted: Instant::now(),
        };
        Ok(())
    }

    fn commit_atomic<D: KmsDevice>(
        &mut self,
        device: &D,
        plane_id: u32,
        fb_id: u32,
    ) -> Result<(), ScheduleError> {
        let modeset = !self.mode_set;
        let request = AtomicRequest {
            crtc_id: self.crtc_id,
            connector_id: self.connector_id,
            plane_id,
            fb_id,
            mode: &self.mode,
            modeset,
        };

        if let Err(e) = device.atomic_commit(&request) {
            if modeset {
                log::error!(
                    "[flip] Atomic mode set {} on CRTC {} failed: {}",
                    self.mode,
                    self.crtc_id,
                    e
                );
                return Err(ScheduleError::ModeSet(e));
            }
            log::warn!("[flip] Atomic commit of framebuffer {} failed: {}", fb_id, e);
            return Err(ScheduleError::PageFlip(e));
        }

        if modeset {
            log::info!(
                "[flip] Mode {} set on CRTC {} (atomic, plane {})",
                self.mode,
                self.crtc_id,
                plane_id
            );
            self.mode_set = true;
        }
        Ok(())
    }

    fn commit_legacy<D: KmsDevice>(&mut self, device: &D, fb_id: u32) -> Result<(), ScheduleError> {
        if !self.mode_set {
            if let Err(e) = device.set_crtc(self.crtc_id, fb_id, self.connector_id, &self.mode) {
                log::error!(
                    "[flip] Could not set mode {} on CRTC {}: {}",
                    self.mode,
                    self.crtc_id,
                    e
                );
                return Err(ScheduleError::ModeSet(e));
            }
            log::info!("[flip] Mode {} set on CRTC {}", self.mode, self.crtc_id);
            self.mode_set = true;
        }

        if let Err(e) = device.page_flip(self.crtc_id, fb_id) {
            log::warn!(
                "[flip] Page flip to framebuffer {} failed: {}",
                fb_id,
                e
            );
            return Err(ScheduleError::PageFlip(e));
        }
        Ok(())
    }

    /// Retires the in-flight flip if `event` belongs to this CRTC.
    pub fn complete(&mut self, event: &FlipEvent) -> Option<R> {
        if event.crtc_id != self.crtc_id {
            log::debug!(
                "[flip] Ignoring flip event for CRTC {} (driving {})",
                event.crtc_id,
                self.crtc_id
            );
            return None;
        }

        match std::mem::replace(&mut self.state, FlipState::Idle) {
            FlipState::Idle => {
                log::warn!("[flip] Spurious flip event, frame {}", event.frame);
                None
            }
            FlipState::Pending {
                resource, fb_id, ..
            } => {
                log::trace!("[flip] Framebuffer {} on screen, frame {}", fb_id, event.frame);
                Some(resource)
            }
            FlipState::Stalled {
                resource,
                fb_id,
                submitted,
            } => {
                log::warn!(
                    "[flip] Stalled flip to framebuffer {} completed after {:?}",
                    fb_id,
                    submitted.elapsed()
                );
                Some(resource)
            }
        }
    }

    /// Marks the in-flight flip stalled once it outlived the timeout.
    ///
    /// Returns true only on the transition.
    pub fn check_stalled(&mut self, now: Instant) -> bool {
        let Some(timeout) = self.timeout else {
            return false;
        };
        let FlipState::Pending {
            resource,
            fb_id,
            submitted,
        } = &self.state
        else {
            return false;
        };
        if now.saturating_duration_since(*submitted) < timeout {
            return false;
        }

        log::error!(
            "[flip] No completion for framebuffer {} on CRTC {} after {:?}",
            fb_id,
            self.crtc_id,
            timeout
        );
        self.state = FlipState::Stalled {
            resource: resource.clone(),
            fb_id: *fb_id,
            submitted: *submitted,
        };
        true
    }

    /// Forgets the in-flight flip, returning its resource.
    pub fn abandon(&mut self) -> Option<R> {
        match std::mem::replace(&mut self.state, FlipState::Idle) {
            FlipState::Idle => None,
            FlipState::Pending { resource, .. } | FlipState::Stalled { resource, .. } => {
                Some(resource)
            }
        }
    }
}
