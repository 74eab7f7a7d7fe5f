//! Recording fakes for the device, the probe and the producer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use drm::control::FbCmd2Flags;
use drm_fourcc::{DrmFourcc, DrmModifier};

use crate::buffer::copy_rows;
use crate::device::{
    AtomicRequest, ConnectorInfo, DmaBufDescriptor, DmaBufPlane, EncoderInfo, FlipEvent,
    FramebufferLayout, KmsDevice, PlaneInfo, PlaneLayout, ResourceSnapshot, ShmBuffer,
};
use crate::discovery::DeviceProbe;
use crate::display::Display;
use crate::error::ImportError;
use crate::modes::{ModeInfo, ModePreference, DRM_MODE_TYPE_PREFERRED};
use crate::presenter::{ExportClient, Presenter};

pub const CRTC_ID: u32 = 30;
pub const ENCODER_ID: u32 = 20;
pub const CONNECTOR_ID: u32 = 40;
pub const PLANE_ID: u32 = 50;

const SHM_BO_BASE: u32 = 1000;
const FB_BASE: u32 = 100;

pub fn mode(width: u16, height: u16, preferred: bool) -> ModeInfo {
    ModeInfo {
        name: format!("{}x{}", width, height),
        clock: 148_500,
        hdisplay: width,
        hsync_start: width + 88,
        hsync_end: width + 132,
        htotal: width + 280,
        hskew: 0,
        vdisplay: height,
        vsync_start: height + 4,
        vsync_end: height + 9,
        vtotal: height + 45,
        vscan: 0,
        vrefresh: 60,
        flags: 0,
        mode_type: if preferred { DRM_MODE_TYPE_PREFERRED } else { 0 },
    }
}

pub fn connector(id: u32, connected: bool, encoder_id: Option<u32>, modes: Vec<ModeInfo>) -> ConnectorInfo {
    ConnectorInfo {
        id,
        name: format!("HDMI-A-{}", id),
        connected,
        encoder_id,
        modes,
        physical_size: (520, 290),
    }
}

pub fn single_output_snapshot(modes: Vec<ModeInfo>) -> ResourceSnapshot {
    ResourceSnapshot {
        crtcs: vec![CRTC_ID],
        connectors: vec![connector(CONNECTOR_ID, true, Some(ENCODER_ID), modes)],
        encoders: vec![EncoderInfo {
            id: ENCODER_ID,
            crtc_id: Some(CRTC_ID),
        }],
        planes: vec![PlaneInfo {
            id: PLANE_ID,
            possible_crtcs: 1,
            primary: true,
        }],
    }
}

pub fn shm_pixels(width: usize, height: usize, value: u8) -> Vec<u8> {
    vec![value; width * height * 4]
}

pub fn dmabuf(resource: u32, modifier: DrmModifier) -> DmaBufDescriptor<u32> {
    let file = std::fs::File::open("/dev/null").unwrap();
    DmaBufDescriptor {
        resource,
        width: 256,
        height: 128,
        format: DrmFourcc::Xrgb8888,
        planes: vec![DmaBufPlane {
            fd: OwnedFd::from(file),
            stride: 1024,
            offset: 0,
        }],
        modifier: Some(modifier),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ImportResource(u32),
    ImportDmabuf(u32),
    CreateShm { width: u32, height: u32 },
    WriteShm(u32),
    AddFb { modifiers: bool, planes: usize },
    RmFb(u32),
    DestroyBo(u32),
    SetCrtc { crtc: u32, fb: u32, connector: u32 },
    PageFlip { crtc: u32, fb: u32 },
    AtomicCommit { crtc: u32, plane: u32, fb: u32, modeset: bool },
}

#[derive(Debug)]
pub struct FakeBo {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub modifier: DrmModifier,
    pub planes: usize,
    pub pixels: Vec<u8>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    next_fb: u32,
    next_shm_bo: u32,
    fail_modifier_fb: bool,
    fail_all_fb: bool,
    zero_fb: bool,
    fail_page_flip: bool,
    fail_set_crtc: bool,
    fail_import: bool,
    atomic_supported: bool,
    fail_atomic: bool,
    flips: VecDeque<u32>,
    events: Vec<FlipEvent>,
    frame: u32,
    last_shm_first_byte: Option<u8>,
}

/// A [`KmsDevice`] whose resources are plain `u32` tokens.
///
/// Imported buffer objects take the token as their id, so assertions can
/// name them directly.
pub struct FakeDevice {
    snapshot: ResourceSnapshot,
    state: RefCell<FakeState>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::with_snapshot(single_output_snapshot(vec![mode(1920, 1080, true)]))
    }

    pub fn with_snapshot(snapshot: ResourceSnapshot) -> Self {
        FakeDevice {
            snapshot,
            state: RefCell::new(FakeState {
                next_fb: FB_BASE,
                next_shm_bo: SHM_BO_BASE,
                ..Default::default()
            }),
        }
    }

    pub fn fake_bo(&self, id: u32, modifier: DrmModifier, planes: usize) -> FakeBo {
        FakeBo {
            id,
            width: 64,
            height: 64,
            stride: 256,
            modifier,
            planes,
            pixels: Vec::new(),
        }
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn add_fb_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::AddFb { .. }))
            .collect()
    }

    pub fn imports(&self) -> usize {
        self.count(|c| matches!(c, Call::ImportResource(_)))
    }

    pub fn set_crtcs(&self) -> usize {
        self.count(|c| matches!(c, Call::SetCrtc { .. }))
    }

    pub fn page_flips(&self) -> usize {
        self.count(|c| matches!(c, Call::PageFlip { .. }))
    }

    pub fn page_flip_targets(&self) -> Vec<(u32, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::PageFlip { crtc, fb } => Some((crtc, fb)),
                _ => None,
            })
            .collect()
    }

    pub fn shm_allocations(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateShm { .. }))
    }

    pub fn shm_writes(&self) -> usize {
        self.count(|c| matches!(c, Call::WriteShm(_)))
    }

    pub fn last_shm_first_byte(&self) -> Option<u8> {
        self.state.borrow().last_shm_first_byte
    }

    pub fn destroyed_bos(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DestroyBo(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn removed_framebuffers(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::RmFb(fb) => Some(fb),
                _ => None,
            })
            .collect()
    }

    pub fn fail_modifier_framebuffers(&self, fail: bool) {
        self.state.borrow_mut().fail_modifier_fb = fail;
    }

    pub fn fail_all_framebuffers(&self, fail: bool) {
        self.state.borrow_mut().fail_all_fb = fail;
    }

    pub fn return_zero_framebuffers(&self, zero: bool) {
        self.state.borrow_mut().zero_fb = zero;
    }

    pub fn fail_page_flips(&self, fail: bool) {
        self.state.borrow_mut().fail_page_flip = fail;
    }

    pub fn fail_set_crtc(&self, fail: bool) {
        self.state.borrow_mut().fail_set_crtc = fail;
    }

    pub fn fail_imports(&self, fail: bool) {
        self.state.borrow_mut().fail_import = fail;
    }

    pub fn support_atomic(&self, supported: bool) {
        self.state.borrow_mut().atomic_supported = supported;
    }

    pub fn fail_atomic_commits(&self, fail: bool) {
        self.state.borrow_mut().fail_atomic = fail;
    }

    pub fn atomic_commits(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::AtomicCommit { .. }))
            .collect()
    }

    /// Queues the completion event of the oldest submitted flip.
    pub fn complete_flip(&self) {
        let mut state = self.state.borrow_mut();
        let crtc_id = state.flips.pop_front().unwrap_or(CRTC_ID);
        state.frame += 1;
        let frame = state.frame;
        state.events.push(FlipEvent {
            crtc_id,
            frame,
            time: Duration::from_millis(16 * frame as u64),
        });
    }

    pub fn queue_event(&self, event: FlipEvent) {
        self.state.borrow_mut().events.push(event);
    }

    fn injected(&self, what: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what))
    }
}

impl KmsDevice for FakeDevice {
    type Resource = u32;
    type BufferObject = FakeBo;

    fn resources(&self) -> io::Result<ResourceSnapshot> {
        Ok(self.snapshot.clone())
    }

    fn import_resource(&self, resource: &u32) -> Result<FakeBo, ImportError> {
        self.record(Call::ImportResource(*resource));
        if self.state.borrow().fail_import {
            return Err(ImportError::Allocator(self.injected("import")));
        }
        Ok(self.fake_bo(*resource, DrmModifier::Linear, 1))
    }

    fn import_dmabuf(&self, descriptor: &DmaBufDescriptor<u32>) -> Result<FakeBo, ImportError> {
        self.record(Call::ImportDmabuf(descriptor.resource));
        if self.state.borrow().fail_import {
            return Err(ImportError::Allocator(self.injected("import")));
        }
        Ok(FakeBo {
            id: descriptor.resource,
            width: descriptor.width,
            height: descriptor.height,
            stride: descriptor.planes[0].stride,
            modifier: descriptor.modifier.unwrap_or(DrmModifier::Invalid),
            planes: descriptor.planes.len(),
            pixels: Vec::new(),
        })
    }

    fn create_shm_buffer_object(&self, width: u32, height: u32) -> Result<FakeBo, ImportError> {
        self.record(Call::CreateShm { width, height });
        let id = {
            let mut state = self.state.borrow_mut();
            state.next_shm_bo += 1;
            state.next_shm_bo
        };
        let stride = (width * 4).next_multiple_of(256);
        Ok(FakeBo {
            id,
            width,
            height,
            stride,
            modifier: DrmModifier::Linear,
            planes: 1,
            pixels: vec![0; (stride * height) as usize],
        })
    }

    fn write_shm(&self, bo: &mut FakeBo, shm: &ShmBuffer<'_>) -> Result<(), ImportError> {
        self.record(Call::WriteShm(bo.id));
        copy_rows(
            &mut bo.pixels,
            bo.stride as usize,
            shm.data,
            shm.stride as usize,
            shm.row_bytes(),
            shm.height as usize,
        );
        self.state.borrow_mut().last_shm_first_byte = bo.pixels.first().copied();
        Ok(())
    }

    fn layout(&self, bo: &FakeBo) -> FramebufferLayout {
        FramebufferLayout {
            width: bo.width,
            height: bo.height,
            format: DrmFourcc::Xrgb8888,
            modifier: bo.modifier,
            planes: (0..bo.planes as u32)
                .map(|i| PlaneLayout {
                    handle: bo.id * 10 + i,
                    stride: bo.stride,
                    offset: 0,
                })
                .collect(),
        }
    }

    fn add_framebuffer(&self, layout: &FramebufferLayout, flags: FbCmd2Flags) -> io::Result<u32> {
        let modifiers = flags.contains(FbCmd2Flags::MODIFIERS);
        self.record(Call::AddFb {
            modifiers,
            planes: layout.planes.len(),
        });

        let mut state = self.state.borrow_mut();
        if state.fail_all_fb || (modifiers && state.fail_modifier_fb) {
            drop(state);
            return Err(self.injected("AddFB2"));
        }
        if state.zero_fb {
            return Ok(0);
        }
        state.next_fb += 1;
        Ok(state.next_fb)
    }

    fn remove_framebuffer(&self, fb_id: u32) -> io::Result<()> {
        self.record(Call::RmFb(fb_id));
        Ok(())
    }

    fn destroy_buffer_object(&self, bo: FakeBo) {
        self.record(Call::DestroyBo(bo.id));
    }

    fn set_crtc(&self, crtc_id: u32, fb_id: u32, connector_id: u32, _mode: &ModeInfo) -> io::Result<()> {
        self.record(Call::SetCrtc {
            crtc: crtc_id,
            fb: fb_id,
            connector: connector_id,
        });
        if self.state.borrow().fail_set_crtc {
            return Err(self.injected("SetCrtc"));
        }
        Ok(())
    }

    fn page_flip(&self, crtc_id: u32, fb_id: u32) -> io::Result<()> {
        self.record(Call::PageFlip {
            crtc: crtc_id,
            fb: fb_id,
        });
        if self.state.borrow().fail_page_flip {
            return Err(self.injected("PageFlip"));
        }
        self.state.borrow_mut().flips.push_back(crtc_id);
        Ok(())
    }

    fn enable_atomic(&self) -> io::Result<()> {
        if self.state.borrow().atomic_supported {
            Ok(())
        } else {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        }
    }

    fn atomic_commit(&self, request: &AtomicRequest<'_>) -> io::Result<()> {
        self.record(Call::AtomicCommit {
            crtc: request.crtc_id,
            plane: request.plane_id,
            fb: request.fb_id,
            modeset: request.modeset,
        });
        if self.state.borrow().fail_atomic {
            return Err(self.injected("atomic commit"));
        }
        self.state.borrow_mut().flips.push_back(request.crtc_id);
        Ok(())
    }

    fn receive_events(&self) -> io::Result<Vec<FlipEvent>> {
        Ok(std::mem::take(&mut self.state.borrow_mut().events))
    }
}

pub struct FakeNode {
    pub path: PathBuf,
    pub openable: bool,
    pub snapshot: ResourceSnapshot,
}

/// A probe over an in-memory list of device nodes.
pub struct FakeProbe {
    pub nodes: Vec<FakeNode>,
    pub opened: RefCell<Vec<PathBuf>>,
}

impl FakeProbe {
    pub fn new(nodes: Vec<FakeNode>) -> Self {
        FakeProbe {
            nodes,
            opened: RefCell::new(Vec::new()),
        }
    }
}

impl DeviceProbe for FakeProbe {
    type Device = FakeDevice;

    fn candidates(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.nodes.iter().map(|n| n.path.clone()).collect())
    }

    fn open(&self, path: &Path) -> io::Result<FakeDevice> {
        self.opened.borrow_mut().push(path.to_path_buf());
        let node = self
            .nodes
            .iter()
            .find(|n| n.path == path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        if !node.openable {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(FakeDevice::with_snapshot(node.snapshot.clone()))
    }

    fn resources(&self, device: &FakeDevice) -> io::Result<ResourceSnapshot> {
        device.resources()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Release(u32),
    FrameComplete,
}

/// Shared view of what a [`RecordingClient`] received.
#[derive(Clone, Default)]
pub struct ClientLog(Rc<RefCell<Vec<ClientEvent>>>);

impl ClientLog {
    pub fn take(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn releases(&self) -> Vec<u32> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ClientEvent::Release(r) => Some(*r),
                ClientEvent::FrameComplete => None,
            })
            .collect()
    }
}

pub struct RecordingClient {
    log: ClientLog,
}

impl ExportClient<u32> for RecordingClient {
    fn dispatch_release_buffer(&mut self, resource: &u32) {
        self.log.0.borrow_mut().push(ClientEvent::Release(*resource));
    }

    fn dispatch_frame_complete(&mut self) {
        self.log.0.borrow_mut().push(ClientEvent::FrameComplete);
    }
}

pub type FakePresenter = Presenter<FakeDevice, RecordingClient>;

fn presenter_on(device: FakeDevice, atomic: bool) -> (FakePresenter, ClientLog) {
    let mut display = Display::new(
        Rc::new(device),
        Path::new("/dev/dri/card0"),
        &ModePreference::default(),
    )
    .unwrap();
    if atomic {
        assert!(display.enable_atomic());
    }
    let log = ClientLog::default();
    let client = RecordingClient { log: log.clone() };
    (Presenter::new(display, client), log)
}

pub fn fake_presenter() -> (FakePresenter, ClientLog) {
    presenter_on(FakeDevice::new(), false)
}

/// Like [`fake_presenter`] with atomic commits on the primary plane.
pub fn fake_atomic_presenter() -> (FakePresenter, ClientLog) {
    let device = FakeDevice::new();
    device.support_atomic(true);
    presenter_on(device, true)
}
