//! The kernel and allocator boundary.
//!
//! Everything above this module talks to a [`KmsDevice`]; the hardware
//! implementation lives in [`crate::hardware`] and tests use a recording
//! fake.

use std::fmt::Debug;
use std::hash::Hash;
use std::io;
use std::os::fd::OwnedFd;
use std::time::Duration;

use drm::control::FbCmd2Flags;
use drm_fourcc::{DrmFourcc, DrmModifier};

use crate::error::ImportError;
use crate::modes::ModeInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorInfo {
    pub id: u32,
    pub name: String,
    pub connected: bool,
    pub encoder_id: Option<u32>,
    pub modes: Vec<ModeInfo>,
    pub physical_size: (u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderInfo {
    pub id: u32,
    pub crtc_id: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    pub id: u32,
    /// Bit `i` set when the plane can feed `crtcs[i]`.
    pub possible_crtcs: u32,
    pub primary: bool,
}

/// Connectors, encoders, CRTCs and planes of one device at probe time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub crtcs: Vec<u32>,
    pub connectors: Vec<ConnectorInfo>,
    pub encoders: Vec<EncoderInfo>,
    pub planes: Vec<PlaneInfo>,
}

impl ResourceSnapshot {
    pub fn has_connected_output(&self) -> bool {
        self.connectors.iter().any(|c| c.connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub handle: u32,
    pub stride: u32,
    pub offset: u32,
}

/// What AddFB2 needs to know about a buffer object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferLayout {
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    pub modifier: DrmModifier,
    pub planes: Vec<PlaneLayout>,
}

impl FramebufferLayout {
    /// A modifier that has to be passed to the kernel explicitly.
    pub fn has_explicit_modifier(&self) -> bool {
        !matches!(self.modifier, DrmModifier::Linear | DrmModifier::Invalid)
    }

    pub fn first_plane_only(&self) -> FramebufferLayout {
        FramebufferLayout {
            planes: self.planes.iter().take(1).copied().collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug)]
pub struct DmaBufPlane {
    pub fd: OwnedFd,
    pub stride: u32,
    pub offset: u32,
}

/// A producer buffer described plane by plane.
#[derive(Debug)]
pub struct DmaBufDescriptor<R> {
    pub resource: R,
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    pub planes: Vec<DmaBufPlane>,
    pub modifier: Option<DrmModifier>,
}

pub const MAX_PLANES: usize = 4;

impl<R> DmaBufDescriptor<R> {
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.planes.is_empty() || self.planes.len() > MAX_PLANES {
            return Err(ImportError::InvalidDescriptor(format!(
                "{} planes (expected 1 to {})",
                self.planes.len(),
                MAX_PLANES
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ImportError::InvalidDescriptor(format!(
                "empty size {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// CPU-side pixels handed over by the producer.
#[derive(Debug, Clone, Copy)]
pub struct ShmBuffer<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: DrmFourcc,
    pub data: &'a [u8],
}

impl ShmBuffer<'_> {
    pub fn validate(&self) -> Result<(), ImportError> {
        if !matches!(self.format, DrmFourcc::Argb8888 | DrmFourcc::Xrgb8888) {
            return Err(ImportError::UnsupportedFormat(self.format as u32));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ImportError::InvalidDescriptor(format!(
                "empty size {}x{}",
                self.width, self.height
            )));
        }
        if (self.stride as usize) < self.row_bytes() {
            return Err(ImportError::InvalidDescriptor(format!(
                "stride {} shorter than a row of {} pixels",
                self.stride, self.width
            )));
        }
        let needed = self.stride as usize * (self.height as usize - 1) + self.row_bytes();
        if self.data.len() < needed {
            return Err(ImportError::InvalidDescriptor(format!(
                "{} bytes of pixel data, {} needed",
                self.data.len(),
                needed
            )));
        }
        Ok(())
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * 4
    }
}

/// One atomic commit showing `fb_id` full screen on the primary plane.
///
/// With `modeset` the connector is routed to the CRTC and `mode` is applied
/// in the same commit.
#[derive(Debug, Clone, Copy)]
pub struct AtomicRequest<'a> {
    pub crtc_id: u32,
    pub connector_id: u32,
    pub plane_id: u32,
    pub fb_id: u32,
    pub mode: &'a ModeInfo,
    pub modeset: bool,
}

/// A page-flip completion read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipEvent {
    pub crtc_id: u32,
    pub frame: u32,
    pub time: Duration,
}

pub trait KmsDevice {
    /// Producer-side identity of a buffer.
    type Resource: Clone + Eq + Hash + Debug;
    type BufferObject;

    fn resources(&self) -> io::Result<ResourceSnapshot>;

    fn import_resource(&self, resource: &Self::Resource) -> Result<Self::BufferObject, ImportError>;

    fn import_dmabuf(
        &self,
        descriptor: &DmaBufDescriptor<Self::Resource>,
    ) -> Result<Self::BufferObject, ImportError>;

    fn create_shm_buffer_object(&self, width: u32, height: u32) -> Result<Self::BufferObject, ImportError>;

    fn write_shm(&self, bo: &mut Self::BufferObject, shm: &ShmBuffer<'_>) -> Result<(), ImportError>;

    fn layout(&self, bo: &Self::BufferObject) -> FramebufferLayout;

    fn add_framebuffer(&self, layout: &FramebufferLayout, flags: FbCmd2Flags) -> io::Result<u32>;

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()>;

    fn destroy_buffer_object(&self, bo: Self::BufferObject);

    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, mode: &ModeInfo) -> io::Result<()>;

    fn page_flip(&self, crtc_id: u32, fb_id: u32) -> io::Result<()>;

    /// Switches the device to atomic modesetting. An error means only the
    /// legacy SetCrtc/PageFlip path is usable.
    fn enable_atomic(&self) -> io::Result<()>;

    /// Nonblocking commit that raises a page-flip event on completion.
    fn atomic_commit(&self, request: &AtomicRequest<'_>) -> io::Result<()>;

    fn receive_events(&self) -> io::Result<Vec<FlipEvent>>;
}
