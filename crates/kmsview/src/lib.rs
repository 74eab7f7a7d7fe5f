//! Scanout of externally produced buffers on a DRM/KMS output.
//!
//! A [`Presenter`] takes buffers from a producer, turns them into KMS
//! framebuffers once and caches them, and drives one page flip at a time on
//! the CRTC chosen by [`Display`]. Buffers go back to the producer through
//! [`ExportClient`] once the hardware no longer scans them out.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod device;
pub mod discovery;
pub mod display;
pub mod error;
pub mod hardware;
pub mod modes;
pub mod presenter;
pub mod scheduler;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use device::{DmaBufDescriptor, DmaBufPlane, FlipEvent, KmsDevice, ShmBuffer};
pub use display::Display;
pub use error::{DisplayError, FrameError, ImportError, ScheduleError, SelectionError};
pub use hardware::{open_display, ExportedResource, GbmCard};
pub use modes::{ModeInfo, ModePreference};
pub use presenter::{ExportClient, Presenter};
pub use source::{insert_drm_source, DrmSourceEvent};
