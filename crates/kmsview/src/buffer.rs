use std::fmt;
use std::rc::Rc;

use drm::control::FbCmd2Flags;
use drm_fourcc::DrmFourcc;

use crate::device::{FramebufferLayout, KmsDevice};
use crate::error::ImportError;

/// A buffer object paired with the framebuffer that scans it out.
///
/// Dropping it removes the framebuffer first and then destroys the buffer
/// object. A buffer whose framebuffer was never created only destroys the
/// buffer object.
pub struct GraphicsBuffer<D: KmsDevice> {
    device: Rc<D>,
    bo: Option<D::BufferObject>,
    fb_id: u32,
    width: u32,
    height: u32,
    format: DrmFourcc,
}

impl<D: KmsDevice> GraphicsBuffer<D> {
    /// Takes ownership of `bo` and registers it with the kernel.
    pub fn from_bo(device: Rc<D>, bo: D::BufferObject) -> Result<Self, ImportError> {
        let layout = device.layout(&bo);
        let mut buffer = GraphicsBuffer {
            device,
            bo: Some(bo),
            fb_id: 0,
            width: layout.width,
            height: layout.height,
            format: layout.format,
        };
        buffer.fb_id = create_framebuffer(&*buffer.device, &layout)?;

        log::debug!(
            "[drm] Framebuffer {} for {}x{} {:?} ({} planes)",
            buffer.fb_id,
            buffer.width,
            buffer.height,
            buffer.format,
            layout.planes.len()
        );
        Ok(buffer)
    }

    pub fn fb_id(&self) -> u32 {
        self.fb_id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> DrmFourcc {
        self.format
    }

    pub fn bo_mut(&mut self) -> Option<&mut D::BufferObject> {
        self.bo.as_mut()
    }
}

impl<D: KmsDevice> fmt::Debug for GraphicsBuffer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsBuffer")
            .field("fb_id", &self.fb_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

impl<D: KmsDevice> Drop for GraphicsBuffer<D> {
    fn drop(&mut self) {
        if self.fb_id != 0 {
            if let Err(e) = self.device.remove_framebuffer(self.fb_id) {
                log::warn!("[drm] RmFB {} failed: {}", self.fb_id, e);
            }
        }
        if let Some(bo) = self.bo.take() {
            self.device.destroy_buffer_object(bo);
        }
    }
}

/// Registers `layout` as a framebuffer.
///
/// All planes are passed in one AddFB2 call, carrying the modifier only when
/// it is explicit. If the kernel refuses, plane 0 alone is registered
/// without a modifier.
pub fn create_framebuffer<D: KmsDevice>(
    device: &D,
    layout: &FramebufferLayout,
) -> Result<u32, ImportError> {
    let flags = if layout.has_explicit_modifier() {
        FbCmd2Flags::MODIFIERS
    } else {
        FbCmd2Flags::empty()
    };

    match device.add_framebuffer(layout, flags) {
        Ok(0) => log::debug!("[drm] AddFB2 returned framebuffer 0, retrying with plane 0"),
        Ok(fb_id) => return Ok(fb_id),
        Err(e) => log::debug!(
            "[drm] AddFB2 with {} planes (modifier {:?}) failed: {}, retrying with plane 0",
            layout.planes.len(),
            layout.modifier,
            e
        ),
    }

    match device.add_framebuffer(&layout.first_plane_only(), FbCmd2Flags::empty()) {
        Ok(0) => Err(ImportError::InvalidFramebuffer),
        Ok(fb_id) => Ok(fb_id),
        Err(e) => Err(ImportError::Framebuffer(e)),
    }
}

/// Copies `height` rows of `row_bytes` between buffers of different pitch.
pub fn copy_rows(
    dst: &mut [u8],
    dst_stride: usize,
    src: &[u8],
    src_stride: usize,
    row_bytes: usize,
    height: usize,
) {
    if height == 0 {
        return;
    }
    if dst_stride == src_stride {
        let len = src_stride * (height - 1) + row_bytes;
        dst[..len].copy_from_slice(&src[..len]);
        return;
    }
    for row in 0..height {
        let src_row = &src[row * src_stride..row * src_stride + row_bytes];
        dst[row * dst_stride..row * dst_stride + row_bytes].copy_from_slice(src_row);
    }
}
