//! [`KmsDevice`] on a real DRM node, with GBM for buffer import.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io;
use std::num::NonZeroU32;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use drm::buffer::{Buffer, PlanarBuffer};
use drm::control::atomic::AtomicModeReq;
use drm::control::dumbbuffer::DumbBuffer;
use drm::control::{
    self, connector, crtc, framebuffer, plane, property, AtomicCommitFlags, Device as ControlDevice,
    Event, FbCmd2Flags, Mode, PageFlipFlags, ResourceHandle, ResourceHandles,
};
use drm::{ClientCapability, Device as _};
use drm_fourcc::{DrmFourcc, DrmModifier};
use gbm::{BufferObject, BufferObjectFlags};
use nix::sys::stat::{major, stat, SFlag};
use wayland_server::protocol::wl_buffer::WlBuffer;
use wayland_server::Resource;

use crate::buffer::copy_rows;
use crate::device::{
    AtomicRequest, ConnectorInfo, DmaBufDescriptor, EncoderInfo, FlipEvent, FramebufferLayout,
    KmsDevice, PlaneInfo, PlaneLayout, ResourceSnapshot, ShmBuffer, MAX_PLANES,
};
use crate::discovery::{open_device, DeviceProbe};
use crate::display::Display;
use crate::error::{DisplayError, ImportError};
use crate::modes::{ModeInfo, ModePreference};

const DRM_MAJOR: u64 = 226;
const DRM_PLANE_TYPE_PRIMARY: u64 = 1;

#[derive(Debug)]
pub struct Card(File);

impl Card {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Card(file))
    }
}

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

fn card_index(name: &str) -> Option<u32> {
    name.strip_prefix("card")?.parse().ok()
}

fn is_drm_char_device(path: &Path) -> bool {
    match stat(path) {
        Ok(st) => {
            (st.st_mode & SFlag::S_IFMT.bits()) == SFlag::S_IFCHR.bits()
                && major(st.st_rdev) == DRM_MAJOR
        }
        Err(_) => false,
    }
}

/// Scans a `/dev/dri` style directory for `cardN` primary nodes.
pub struct DriProbe {
    dir: PathBuf,
}

impl Default for DriProbe {
    fn default() -> Self {
        DriProbe::new("/dev/dri")
    }
}

impl DriProbe {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DriProbe { dir: dir.into() }
    }
}

impl DeviceProbe for DriProbe {
    type Device = Card;

    fn candidates(&self) -> io::Result<Vec<PathBuf>> {
        let mut nodes: Vec<(u32, PathBuf)> = std::fs::read_dir(&self.dir)?
            .flatten()
            .filter_map(|entry| {
                let index = card_index(&entry.file_name().to_string_lossy())?;
                Some((index, entry.path()))
            })
            .filter(|(_, path)| is_drm_char_device(path))
            .collect();
        nodes.sort();
        Ok(nodes.into_iter().map(|(_, path)| path).collect())
    }

    fn open(&self, path: &Path) -> io::Result<Card> {
        Card::open(path)
    }

    fn resources(&self, device: &Card) -> io::Result<ResourceSnapshot> {
        snapshot(device)
    }
}

fn mode_info(mode: Mode) -> ModeInfo {
    let name = mode.name().to_string_lossy().into_owned();
    let raw = drm_ffi::drm_mode_modeinfo::from(mode);
    ModeInfo {
        name,
        clock: raw.clock,
        hdisplay: raw.hdisplay,
        hsync_start: raw.hsync_start,
        hsync_end: raw.hsync_end,
        htotal: raw.htotal,
        hskew: raw.hskew,
        vdisplay: raw.vdisplay,
        vsync_start: raw.vsync_start,
        vsync_end: raw.vsync_end,
        vtotal: raw.vtotal,
        vscan: raw.vscan,
        vrefresh: raw.vrefresh,
        flags: raw.flags,
        mode_type: raw.type_,
    }
}

fn find_property<C, H>(card: &C, handle: H, name: &str) -> io::Result<Option<(property::Handle, u64)>>
where
    C: ControlDevice,
    H: ResourceHandle,
{
    let props = card.get_properties(handle)?;
    let (ids, values) = props.as_props_and_values();
    for (&id, &value) in ids.iter().zip(values) {
        let info = card.get_property(id)?;
        if info.name().to_bytes() == name.as_bytes() {
            return Ok(Some((id, value)));
        }
    }
    Ok(None)
}

fn planes<C: ControlDevice>(card: &C, handles: &ResourceHandles) -> Vec<PlaneInfo> {
    if let Err(e) = card.set_client_capability(ClientCapability::UniversalPlanes, true) {
        log::debug!("[drm] Universal planes unavailable: {}", e);
    }
    let plane_handles = match card.plane_handles() {
        Ok(handles) => handles,
        Err(e) => {
            log::debug!("[drm] Cannot list planes: {}", e);
            return Vec::new();
        }
    };

    let crtcs = handles.crtcs();
    plane_handles
        .into_iter()
        .filter_map(|handle| {
            let info = card.get_plane(handle).ok()?;
            let possible_crtcs = handles
                .filter_crtcs(info.possible_crtcs())
                .iter()
                .filter_map(|crtc| crtcs.iter().position(|c| c == crtc))
                .fold(0u32, |mask, index| mask | 1u32.checked_shl(index as u32).unwrap_or(0));
            let primary = matches!(
                find_property(card, handle, "type"),
                Ok(Some((_, DRM_PLANE_TYPE_PRIMARY)))
            );
            Some(PlaneInfo {
                id: u32::from(handle),
                possible_crtcs,
                primary,
            })
        })
        .collect()
}

fn snapshot<C: ControlDevice>(card: &C) -> io::Result<ResourceSnapshot> {
    let handles = card.resource_handles()?;

    let mut connectors = Vec::new();
    for &handle in handles.connectors() {
        let info = match card.get_connector(handle, true) {
            Ok(info) => info,
            Err(e) => {
                log::debug!("[drm] Cannot query connector {:?}: {}", handle, e);
                continue;
            }
        };
        connectors.push(ConnectorInfo {
            id: u32::from(handle),
            name: format!("{}-{}", info.interface().as_str(), info.interface_id()),
            connected: info.state() == connector::State::Connected,
            encoder_id: info.current_encoder().map(u32::from),
            modes: info.modes().iter().map(|&m| mode_info(m)).collect(),
            physical_size: info.size().unwrap_or((0, 0)),
        });
    }

    let encoders = handles
        .encoders()
        .iter()
        .filter_map(|&handle| card.get_encoder(handle).ok())
        .map(|info| EncoderInfo {
            id: u32::from(info.handle()),
            crtc_id: info.crtc().map(u32::from),
        })
        .collect();

    Ok(ResourceSnapshot {
        crtcs: handles.crtcs().iter().map(|&h| u32::from(h)).collect(),
        connectors,
        encoders,
        planes: planes(card, &handles),
    })
}

fn handle<T: ResourceHandle>(id: u32, what: &str) -> io::Result<T> {
    control::from_u32(id).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("invalid {} id {}", what, id))
    })
}

/// Producer buffers reaching the hardware backend.
#[derive(Debug, Clone)]
pub enum ExportedResource {
    /// A client `wl_buffer`, imported through GBM.
    Wayland(WlBuffer),
    /// A buffer owned by this process, identified by an id of its choosing.
    Local(u64),
}

impl PartialEq for ExportedResource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExportedResource::Wayland(a), ExportedResource::Wayland(b)) => a.id() == b.id(),
            (ExportedResource::Local(a), ExportedResource::Local(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ExportedResource {}

impl Hash for ExportedResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ExportedResource::Wayland(buffer) => buffer.id().hash(state),
            ExportedResource::Local(id) => id.hash(state),
        }
    }
}

pub enum ScanoutBo {
    Gbm(BufferObject<()>),
    Dumb(DumbBuffer),
}

/// A [`FramebufferLayout`] as drm-rs sees a buffer.
struct LayoutBuffer<'a> {
    layout: &'a FramebufferLayout,
    with_modifier: bool,
}

impl LayoutBuffer<'_> {
    fn per_plane<T: Copy + Default>(&self, f: impl Fn(&PlaneLayout) -> T) -> [T; 4] {
        let mut values = [T::default(); 4];
        for (value, plane) in values.iter_mut().zip(self.layout.planes.iter().take(MAX_PLANES)) {
            *value = f(plane);
        }
        values
    }
}

impl PlanarBuffer for LayoutBuffer<'_> {
    fn size(&self) -> (u32, u32) {
        (self.layout.width, self.layout.height)
    }

    fn format(&self) -> DrmFourcc {
        self.layout.format
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.with_modifier.then_some(self.layout.modifier)
    }

    fn pitches(&self) -> [u32; 4] {
        self.per_plane(|p| p.stride)
    }

    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        self.per_plane(|p| NonZeroU32::new(p.handle).map(drm::buffer::Handle::from))
    }

    fn offsets(&self) -> [u32; 4] {
        self.per_plane(|p| p.offset)
    }
}

/// A DRM primary node with a GBM allocator on top.
pub struct GbmCard {
    gbm: gbm::Device<Card>,
    /// Property ids by object id and name, filled on first atomic use.
    properties: RefCell<HashMap<u32, HashMap<String, property::Handle>>>,
}

impl GbmCard {
    pub fn new(card: Card) -> io::Result<Self> {
        let gbm = gbm::Device::new(card)?;
        Ok(GbmCard {
            gbm,
            properties: RefCell::new(HashMap::new()),
        })
    }

    fn drm_mode(&self, connector: connector::Handle, mode: &ModeInfo) -> io::Result<Mode> {
        self.gbm
            .get_connector(connector, false)?
            .modes()
            .iter()
            .copied()
            .find(|m| mode_info(*m) == *mode)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "mode {} no longer offered by connector {}",
                        mode,
                        u32::from(connector)
                    ),
                )
            })
    }

    fn property<H: ResourceHandle>(&self, handle: H, name: &str) -> io::Result<property::Handle> {
        let raw: NonZeroU32 = handle.into();
        let object = raw.get();
        let mut cache = self.properties.borrow_mut();
        let props = match cache.entry(object) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let set = self.gbm.get_properties(handle)?;
                let (ids, _) = set.as_props_and_values();
                let mut named = HashMap::new();
                for &id in ids {
                    let info = self.gbm.get_property(id)?;
                    named.insert(info.name().to_string_lossy().into_owned(), id);
                }
                entry.insert(named)
            }
        };
        props.get(name).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("object {} has no {} property", object, name),
            )
        })
    }

    /// A duplicate of the device fd for the event loop.
    pub fn event_fd(&self) -> io::Result<OwnedFd> {
        self.gbm.as_fd().try_clone_to_owned()
    }

    fn log_driver(&self, path: &Path) {
        match self.gbm.get_driver() {
            Ok(driver) => log::info!(
                "[drm] {}: driver {} ({})",
                path.display(),
                driver.name().to_string_lossy(),
                driver.description().to_string_lossy()
            ),
            Err(e) => log::warn!("[drm] {}: cannot query driver: {}", path.display(), e),
        }
        log::info!("[gbm] Backend {}", self.gbm.backend_name());
    }
}

impl KmsDevice for GbmCard {
    type Resource = ExportedResource;
    type BufferObject = ScanoutBo;

    fn resources(&self) -> io::Result<ResourceSnapshot> {
        snapshot(&self.gbm)
    }

    fn import_resource(&self, resource: &ExportedResource) -> Result<ScanoutBo, ImportError> {
        match resource {
            ExportedResource::Wayland(buffer) => self
                .gbm
                .import_buffer_object_from_wayland::<()>(buffer, BufferObjectFlags::SCANOUT)
                .map(ScanoutBo::Gbm)
                .map_err(ImportError::Allocator),
            ExportedResource::Local(id) => Err(ImportError::InvalidDescriptor(format!(
                "local buffer {} has no foreign handle to import",
                id
            ))),
        }
    }

    fn import_dmabuf(
        &self,
        descriptor: &DmaBufDescriptor<ExportedResource>,
    ) -> Result<ScanoutBo, ImportError> {
        let mut fds: [Option<BorrowedFd<'_>>; 4] = [None; 4];
        let mut strides = [0i32; 4];
        let mut offsets = [0i32; 4];
        for (i, plane) in descriptor.planes.iter().take(MAX_PLANES).enumerate() {
            fds[i] = Some(plane.fd.as_fd());
            strides[i] = plane.stride as i32;
            offsets[i] = plane.offset as i32;
        }

        self.gbm
            .import_buffer_object_from_dma_buf_with_modifiers::<()>(
                descriptor.planes.len() as u32,
                fds,
                descriptor.width,
                descriptor.height,
                descriptor.format,
                BufferObjectFlags::SCANOUT,
                strides,
                offsets,
                descriptor.modifier.unwrap_or(DrmModifier::Invalid),
            )
            .map(ScanoutBo::Gbm)
            .map_err(ImportError::Allocator)
    }

    fn create_shm_buffer_object(&self, width: u32, height: u32) -> Result<ScanoutBo, ImportError> {
        self.gbm
            .create_dumb_buffer((width, height), DrmFourcc::Xrgb8888, 32)
            .map(ScanoutBo::Dumb)
            .map_err(ImportError::Allocator)
    }

    fn write_shm(&self, bo: &mut ScanoutBo, shm: &ShmBuffer<'_>) -> Result<(), ImportError> {
        let ScanoutBo::Dumb(dumb) = bo else {
            return Err(ImportError::InvalidDescriptor(
                "pixels can only be written to dumb buffers".to_string(),
            ));
        };
        if Buffer::size(dumb) != (shm.width, shm.height) {
            return Err(ImportError::InvalidDescriptor(format!(
                "{}x{} pixels for a {:?} buffer",
                shm.width,
                shm.height,
                Buffer::size(dumb)
            )));
        }

        let pitch = Buffer::pitch(dumb) as usize;
        let mut mapping = self
            .gbm
            .map_dumb_buffer(dumb)
            .map_err(ImportError::Allocator)?;
        copy_rows(
            AsMut::<[u8]>::as_mut(&mut mapping),
            pitch,
            shm.data,
            shm.stride as usize,
            shm.row_bytes(),
            shm.height as usize,
        );
        Ok(())
    }

    fn layout(&self, bo: &ScanoutBo) -> FramebufferLayout {
        match bo {
            ScanoutBo::Gbm(bo) => {
                let (width, height) = PlanarBuffer::size(bo);
                let handles = PlanarBuffer::handles(bo);
                let pitches = PlanarBuffer::pitches(bo);
                let offsets = PlanarBuffer::offsets(bo);
                let planes = (0..MAX_PLANES)
                    .filter_map(|i| {
                        handles[i].map(|handle| PlaneLayout {
                            handle: u32::from(handle),
                            stride: pitches[i],
                            offset: offsets[i],
                        })
                    })
                    .collect();
                FramebufferLayout {
                    width,
                    height,
                    format: PlanarBuffer::format(bo),
                    modifier: PlanarBuffer::modifier(bo).unwrap_or(DrmModifier::Invalid),
                    planes,
                }
            }
            ScanoutBo::Dumb(dumb) => {
                let (width, height) = Buffer::size(dumb);
                FramebufferLayout {
                    width,
                    height,
                    format: Buffer::format(dumb),
                    modifier: DrmModifier::Linear,
                    planes: vec![PlaneLayout {
                        handle: u32::from(Buffer::handle(dumb)),
                        stride: Buffer::pitch(dumb),
                        offset: 0,
                    }],
                }
            }
        }
    }

    fn add_framebuffer(&self, layout: &FramebufferLayout, flags: FbCmd2Flags) -> io::Result<u32> {
        let buffer = LayoutBuffer {
            layout,
            with_modifier: flags.contains(FbCmd2Flags::MODIFIERS),
        };
        let fb = self.gbm.add_planar_framebuffer(&buffer, flags)?;
        Ok(u32::from(fb))
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        let fb: framebuffer::Handle = handle(fb_id, "framebuffer")?;
        self.gbm.destroy_framebuffer(fb)
    }

    fn destroy_buffer_object(&self, bo: ScanoutBo) {
        match bo {
            ScanoutBo::Gbm(bo) => drop(bo),
            ScanoutBo::Dumb(dumb) => {
                if let Err(e) = self.gbm.destroy_dumb_buffer(dumb) {
                    log::warn!("[drm] Cannot destroy dumb buffer: {}", e);
                }
            }
        }
    }

    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, mode: &ModeInfo) -> io::Result<()> {
        let crtc: crtc::Handle = handle(crtc_id, "CRTC")?;
        let fb: framebuffer::Handle = handle(fb_id, "framebuffer")?;
        let connector: connector::Handle = handle(connector_id, "connector")?;
        let drm_mode = self.drm_mode(connector, mode)?;

        self.gbm
            .set_crtc(crtc, Some(fb), (0, 0), &[connector], Some(drm_mode))
    }

    fn page_flip(&self, crtc_id: u32, fb_id: u32) -> io::Result<()> {
        let crtc: crtc::Handle = handle(crtc_id, "CRTC")?;
        let fb: framebuffer::Handle = handle(fb_id, "framebuffer")?;
        self.gbm.page_flip(crtc, fb, PageFlipFlags::EVENT, None)
    }

    fn enable_atomic(&self) -> io::Result<()> {
        self.gbm.set_client_capability(ClientCapability::Atomic, true)
    }

    fn atomic_commit(&self, request: &AtomicRequest<'_>) -> io::Result<()> {
        let crtc: crtc::Handle = handle(request.crtc_id, "CRTC")?;
        let plane: plane::Handle = handle(request.plane_id, "plane")?;
        let fb: framebuffer::Handle = handle(request.fb_id, "framebuffer")?;
        let (width, height) = request.mode.size();
        let (width, height) = (u64::from(width), u64::from(height));

        let mut req = AtomicModeReq::new();
        let mut flags = AtomicCommitFlags::PAGE_FLIP_EVENT | AtomicCommitFlags::NONBLOCK;
        let mut blob = None;

        if request.modeset {
            let connector: connector::Handle = handle(request.connector_id, "connector")?;
            let drm_mode = self.drm_mode(connector, request.mode)?;
            let mode_blob = self.gbm.create_property_blob(&drm_mode)?;
            if let property::Value::Blob(id) = mode_blob {
                blob = Some(id);
            }

            req.add_property(
                connector,
                self.property(connector, "CRTC_ID")?,
                property::Value::CRTC(Some(crtc)),
            );
            req.add_property(crtc, self.property(crtc, "MODE_ID")?, mode_blob);
            req.add_property(crtc, self.property(crtc, "ACTIVE")?, property::Value::Boolean(true));
            flags |= AtomicCommitFlags::ALLOW_MODESET;
        }

        req.add_property(plane, self.property(plane, "FB_ID")?, property::Value::Framebuffer(Some(fb)));
        req.add_property(plane, self.property(plane, "CRTC_ID")?, property::Value::CRTC(Some(crtc)));
        req.add_property(plane, self.property(plane, "SRC_X")?, property::Value::UnsignedRange(0));
        req.add_property(plane, self.property(plane, "SRC_Y")?, property::Value::UnsignedRange(0));
        req.add_property(
            plane,
            self.property(plane, "SRC_W")?,
            property::Value::UnsignedRange(width << 16),
        );
        req.add_property(
            plane,
            self.property(plane, "SRC_H")?,
            property::Value::UnsignedRange(height << 16),
        );
        req.add_property(plane, self.property(plane, "CRTC_X")?, property::Value::SignedRange(0));
        req.add_property(plane, self.property(plane, "CRTC_Y")?, property::Value::SignedRange(0));
        req.add_property(plane, self.property(plane, "CRTC_W")?, property::Value::UnsignedRange(width));
        req.add_property(plane, self.property(plane, "CRTC_H")?, property::Value::UnsignedRange(height));

        let result = self.gbm.atomic_commit(flags, req);

        // The committed state holds its own reference to the mode blob.
        if let Some(id) = blob {
            if let Err(e) = self.gbm.destroy_property_blob(id) {
                log::debug!("[drm] Cannot destroy mode blob {}: {}", id, e);
            }
        }
        result
    }

    fn receive_events(&self) -> io::Result<Vec<FlipEvent>> {
        let events = self.gbm.receive_events()?;
        Ok(events
            .filter_map(|event| match event {
                Event::PageFlip(flip) => Some(FlipEvent {
                    crtc_id: u32::from(flip.crtc),
                    frame: flip.frame,
                    time: flip.duration,
                }),
                _ => None,
            })
            .collect())
    }
}

/// Finds or opens the DRM device, sets up GBM and selects the output.
///
/// With `atomic` the display uses atomic commits when the driver supports
/// them and legacy modesetting otherwise.
pub fn open_display(
    device: Option<&Path>,
    prefs: &ModePreference,
    atomic: bool,
) -> Result<Display<GbmCard>, DisplayError> {
    let (card, path) = open_device(&DriProbe::default(), device)?;
    let gbm = GbmCard::new(card).map_err(|e| {
        DisplayError::unavailable(Some(path.clone()), format!("Could not initialize GBM: {}", e))
    })?;
    gbm.log_driver(&path);
    let mut display = Display::new(Rc::new(gbm), &path, prefs)?;
    if atomic {
        display.enable_atomic();
    } else {
        log::info!("[drm] Atomic modesetting disabled, using legacy");
    }
    Ok(display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn layout() -> FramebufferLayout {
        FramebufferLayout {
            width: 1920,
            height: 1080,
            format: DrmFourcc::Nv12,
            modifier: DrmModifier::from(0x0100_0000_0000_0001u64),
            planes: vec![
                PlaneLayout {
                    handle: 7,
                    stride: 2048,
                    offset: 0,
                },
                PlaneLayout {
                    handle: 7,
                    stride: 2048,
                    offset: 2048 * 1080,
                },
            ],
        }
    }

    #[test]
    fn test_card_index() {
        assert_eq!(card_index("card0"), Some(0));
        assert_eq!(card_index("card12"), Some(12));
        assert_eq!(card_index("renderD128"), None);
        assert_eq!(card_index("card"), None);
    }

    #[test]
    fn test_probe_ignores_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("card0"), b"").unwrap();
        std::fs::write(dir.path().join("renderD128"), b"").unwrap();

        let probe = DriProbe::new(dir.path());

        assert!(probe.candidates().unwrap().is_empty());
    }

    #[test]
    fn test_probe_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let probe = DriProbe::new(dir.path().join("dri"));
        assert!(probe.candidates().is_err());
    }

    #[test]
    fn test_layout_buffer_modifier_follows_flag() {
        let layout = layout();
        let with = LayoutBuffer {
            layout: &layout,
            with_modifier: true,
        };
        let without = LayoutBuffer {
            layout: &layout,
            with_modifier: false,
        };

        assert_eq!(with.modifier(), Some(layout.modifier));
        assert_eq!(without.modifier(), None);
    }

    #[test]
    fn test_layout_buffer_planes() {
        let layout = layout();
        let buffer = LayoutBuffer {
            layout: &layout,
            with_modifier: true,
        };

        assert_eq!(buffer.pitches(), [2048, 2048, 0, 0]);
        assert_eq!(buffer.offsets(), [0, 2048 * 1080, 0, 0]);
        let handles = buffer.handles();
        assert!(handles[0].is_some() && handles[1].is_some());
        assert!(handles[2].is_none() && handles[3].is_none());
    }

    #[test]
    fn test_local_resources_hash_by_id() {
        let mut set = HashSet::new();
        set.insert(ExportedResource::Local(1));
        set.insert(ExportedResource::Local(1));
        set.insert(ExportedResource::Local(2));

        assert_eq!(set.len(), 2);
        assert_ne!(ExportedResource::Local(1), ExportedResource::Local(2));
    }
}
