//! Output mode and CRTC selection over a [`ResourceSnapshot`].

use std::fmt;

use crate::device::{ConnectorInfo, ResourceSnapshot};
use crate::error::SelectionError;

pub const DRM_MODE_TYPE_PREFERRED: u32 = 1 << 3;

/// One entry of a connector's mode list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeInfo {
    pub name: String,
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub mode_type: u32,
}

impl ModeInfo {
    pub fn size(&self) -> (u16, u16) {
        (self.hdisplay, self.vdisplay)
    }

    pub fn area(&self) -> u32 {
        self.hdisplay as u32 * self.vdisplay as u32
    }

    pub fn is_preferred(&self) -> bool {
        self.mode_type & DRM_MODE_TYPE_PREFERRED != 0
    }

    fn fits(&self, max_size: Option<(u16, u16)>) -> bool {
        match max_size {
            Some((max_w, max_h)) => self.hdisplay <= max_w && self.vdisplay <= max_h,
            None => true,
        }
    }
}

impl fmt::Display for ModeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}@{}Hz{})",
            self.name,
            self.hdisplay,
            self.vdisplay,
            self.vrefresh,
            if self.is_preferred() { ", preferred" } else { "" }
        )
    }
}

/// User constraints on mode selection. Empty means fully automatic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModePreference {
    pub index: Option<usize>,
    pub name: Option<String>,
    pub max_size: Option<(u16, u16)>,
}

impl ModePreference {
    pub fn is_automatic(&self) -> bool {
        self.index.is_none() && self.name.is_none() && self.max_size.is_none()
    }
}

/// Parses a `WxH` size constraint.
pub fn parse_max_size(value: &str) -> Option<(u16, u16)> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    let width: u16 = w.trim().parse().ok()?;
    let height: u16 = h.trim().parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Picks a mode index from `modes`.
///
/// An explicit index wins outright. Otherwise the name and size filters
/// are applied, then the first preferred mode is taken, then the largest
/// area (earliest on ties).
pub fn select_mode(modes: &[ModeInfo], prefs: &ModePreference) -> Result<usize, SelectionError> {
    if let Some(index) = prefs.index {
        let mode = modes.get(index).ok_or(SelectionError::IndexOutOfRange {
            index,
            count: modes.len(),
        })?;
        if let Some((max_width, max_height)) = prefs.max_size {
            if !mode.fits(prefs.max_size) {
                return Err(SelectionError::IndexExceedsMaximum {
                    index,
                    width: mode.hdisplay,
                    height: mode.vdisplay,
                    max_width,
                    max_height,
                });
            }
        }
        return Ok(index);
    }

    let candidates = modes.iter().enumerate().filter(|(_, mode)| {
        prefs.name.as_deref().map_or(true, |name| mode.name == name) && mode.fits(prefs.max_size)
    });

    let mut best: Option<(usize, &ModeInfo)> = None;
    for (index, mode) in candidates {
        if mode.is_preferred() {
            return Ok(index);
        }
        match best {
            Some((_, current)) if current.area() >= mode.area() => {}
            _ => best = Some((index, mode)),
        }
    }

    best.map(|(index, _)| index)
        .ok_or(SelectionError::NoModeMatches)
}

/// The connector, CRTC and mode a display will drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSelection {
    pub connector_id: u32,
    pub connector_name: String,
    pub crtc_id: u32,
    /// Primary plane of the CRTC, needed for atomic commits.
    pub plane_id: Option<u32>,
    pub mode_index: usize,
    pub mode: ModeInfo,
    pub modes: Vec<ModeInfo>,
    pub physical_size: (u32, u32),
}

fn active_connector(snapshot: &ResourceSnapshot) -> Option<&ConnectorInfo> {
    snapshot
        .connectors
        .iter()
        .filter(|c| !c.modes.is_empty())
        .find(|c| c.connected)
}

fn primary_plane(snapshot: &ResourceSnapshot, crtc_id: u32) -> Option<u32> {
    let index = snapshot.crtcs.iter().position(|&id| id == crtc_id)?;
    let mask = 1u32.checked_shl(index as u32)?;
    snapshot
        .planes
        .iter()
        .find(|p| p.primary && p.possible_crtcs & mask != 0)
        .map(|p| p.id)
}

pub fn select_output(
    snapshot: &ResourceSnapshot,
    prefs: &ModePreference,
) -> Result<OutputSelection, SelectionError> {
    let connector = active_connector(snapshot).ok_or(SelectionError::NoConnector)?;

    log::debug!("[drm] Modes on {}:", connector.name);
    for (index, mode) in connector.modes.iter().enumerate() {
        log::debug!("[drm]   [{}] {}", index, mode);
    }

    let mode_index = select_mode(&connector.modes, prefs)?;

    let encoder = connector
        .encoder_id
        .and_then(|id| snapshot.encoders.iter().find(|e| e.id == id))
        .ok_or(SelectionError::NoEncoder)?;
    let crtc_id = encoder.crtc_id.ok_or(SelectionError::NoCrtc(encoder.id))?;
    let plane_id = primary_plane(snapshot, crtc_id);
    if plane_id.is_none() {
        log::debug!("[drm] No primary plane found for CRTC {}", crtc_id);
    }

    Ok(OutputSelection {
        connector_id: connector.id,
        connector_name: connector.name.clone(),
        crtc_id,
        plane_id,
        mode_index,
        mode: connector.modes[mode_index].clone(),
        modes: connector.modes.clone(),
        physical_size: connector.physical_size,
    })
}
