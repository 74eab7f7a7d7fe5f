use std::io;
use std::path::{Path, PathBuf};

use crate::device::ResourceSnapshot;
use crate::error::DisplayError;

/// Enumerates and opens DRM primary nodes.
pub trait DeviceProbe {
    type Device;

    /// Candidate primary nodes, in the order they should be tried.
    fn candidates(&self) -> io::Result<Vec<PathBuf>>;

    fn open(&self, path: &Path) -> io::Result<Self::Device>;

    fn resources(&self, device: &Self::Device) -> io::Result<ResourceSnapshot>;
}

/// Opens `path` and checks that it can drive a display.
pub fn open_devnode<P: DeviceProbe>(probe: &P, path: &Path) -> Result<P::Device, DisplayError> {
    let device = probe.open(path).map_err(|source| DisplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let snapshot = probe.resources(&device).map_err(|source| DisplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if snapshot.crtcs.is_empty() {
        return Err(DisplayError::unavailable(
            Some(path.to_path_buf()),
            "Device does not have any CRTC (render only node?)",
        ));
    }
    if !snapshot.has_connected_output() {
        return Err(DisplayError::unavailable(
            Some(path.to_path_buf()),
            "Device does not have any output connected",
        ));
    }

    Ok(device)
}

/// First primary node with a CRTC and a connected output.
pub fn find_primary_device<P: DeviceProbe>(probe: &P) -> Result<(P::Device, PathBuf), DisplayError> {
    let candidates = probe
        .candidates()
        .map_err(|e| DisplayError::unavailable(None, format!("Cannot list DRM devices: {}", e)))?;

    for path in candidates {
        match open_devnode(probe, &path) {
            Ok(device) => {
                log::info!("[drm] Using device {}", path.display());
                return Ok((device, path));
            }
            Err(e) => log::debug!("[drm] Skipping {}", e),
        }
    }

    Err(DisplayError::unavailable(
        None,
        "Cannot find a DRM device with a connected output",
    ))
}

/// Opens the configured device, or scans for one when `path` is `None`.
pub fn open_device<P: DeviceProbe>(
    probe: &P,
    path: Option<&Path>,
) -> Result<(P::Device, PathBuf), DisplayError> {
    match path {
        Some(path) => {
            let device = open_devnode(probe, path)?;
            log::info!("[drm] Using configured device {}", path.display());
            Ok((device, path.to_path_buf()))
        }
        None => find_primary_device(probe),
    }
}
