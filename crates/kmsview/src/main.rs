use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopSignal};
use clap::Parser;
use drm_fourcc::DrmFourcc;
use log::LevelFilter;

use kmsview::modes::parse_max_size;
use kmsview::{
    insert_drm_source, open_display, Config, DisplayError, DrmSourceEvent, ExportClient,
    ExportedResource, GbmCard, Presenter, ShmBuffer,
};
use kmsview_common::FileLogger;

const PATTERN_SLOTS: usize = 3;
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const MAX_READ_FAILURES: u32 = 3;

#[derive(Parser, Debug)]
#[command(name = "kmsview", version, about = "Show a test pattern on a DRM/KMS output")]
struct Args {
    /// Configuration file to use instead of the default locations
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// DRM primary node, e.g. /dev/dri/card0
    #[arg(long, value_name = "PATH")]
    device: Option<PathBuf>,

    /// Mode name as listed by --list-modes
    #[arg(long, value_name = "NAME")]
    mode: Option<String>,

    #[arg(long, value_name = "N")]
    mode_index: Option<usize>,

    /// Largest acceptable mode
    #[arg(long, value_name = "WxH")]
    mode_max: Option<String>,

    /// Print the connector's modes and exit
    #[arg(long)]
    list_modes: bool,

    /// Use SetCrtc/PageFlip even if the driver supports atomic commits
    #[arg(long)]
    legacy: bool,

    /// Stop after this many presented frames
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Default)]
struct PatternFeedback {
    free: VecDeque<usize>,
    frame_requested: bool,
}

struct PatternClient(Rc<RefCell<PatternFeedback>>);

impl ExportClient<ExportedResource> for PatternClient {
    fn dispatch_release_buffer(&mut self, resource: &ExportedResource) {
        if let ExportedResource::Local(id) = resource {
            let slot = *id as usize;
            let mut feedback = self.0.borrow_mut();
            if slot < PATTERN_SLOTS && !feedback.free.contains(&slot) {
                feedback.free.push_back(slot);
            }
        }
    }

    fn dispatch_frame_complete(&mut self) {
        self.0.borrow_mut().frame_requested = true;
    }
}

/// Three XRGB8888 frames with a bar sweeping across a gradient.
struct TestPattern {
    width: u32,
    height: u32,
    stride: u32,
    slots: Vec<Vec<u8>>,
    frame: u64,
}

impl TestPattern {
    fn new(width: u32, height: u32) -> Self {
        let stride = width * 4;
        let size = stride as usize * height as usize;
        TestPattern {
            width,
            height,
            stride,
            slots: vec![vec![0; size]; PATTERN_SLOTS],
            frame: 0,
        }
    }

    fn render(&mut self, slot: usize) -> ShmBuffer<'_> {
        let (width, height) = (self.width, self.height);
        let bar = ((self.frame * 8) % u64::from(width)) as u32;
        let bar_width = (width / 16).max(1);
        self.frame += 1;

        let pixels = &mut self.slots[slot];
        for (y, row) in pixels.chunks_exact_mut(self.stride as usize).enumerate() {
            let green = (y as u32 * 255 / height) as u8;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let x = x as u32;
                if (x + width - bar) % width < bar_width {
                    px.copy_from_slice(&[0xff, 0xff, 0xff, 0xff]);
                } else {
                    let red = (x * 255 / width) as u8;
                    px.copy_from_slice(&[(slot as u8) * 0x50, green, red, 0xff]);
                }
            }
        }

        ShmBuffer {
            width,
            height,
            stride: self.stride,
            format: DrmFourcc::Xrgb8888,
            data: &self.slots[slot],
        }
    }
}

struct LoopData {
    presenter: Presenter<GbmCard, PatternClient>,
    pattern: TestPattern,
    feedback: Rc<RefCell<PatternFeedback>>,
    presented: u64,
    frames: Option<u64>,
    signal: LoopSignal,
    read_failures: u32,
    failure: Option<String>,
}

impl LoopData {
    fn fail(&mut self, reason: String) {
        log::error!("{}", reason);
        self.failure = Some(reason);
        self.signal.stop();
    }
}

fn present_next_frame(data: &mut LoopData) {
    let slot = {
        let mut feedback = data.feedback.borrow_mut();
        feedback.frame_requested = false;
        match feedback.free.pop_front() {
            Some(slot) => slot,
            None => {
                log::debug!("No free pattern slot");
                return;
            }
        }
    };

    let shm = data.pattern.render(slot);
    match data
        .presenter
        .export_shm_buffer(ExportedResource::Local(slot as u64), &shm)
    {
        Ok(()) => {}
        Err(e) if e.is_fatal() => data.fail(format!("Could not present frame: {}", e)),
        // The slot came back through the release callback.
        Err(e) => {
            log::warn!("Frame dropped: {}", e);
            data.presenter.request_frame();
        }
    }
}

fn on_drm_event(event: DrmSourceEvent, data: &mut LoopData) {
    match event {
        DrmSourceEvent::Ready => match data.presenter.dispatch_events() {
            Ok(completed) => {
                data.read_failures = 0;
                data.presented += completed as u64;
                if data.frames.is_some_and(|limit| data.presented >= limit) {
                    log::info!("Presented {} frames", data.presented);
                    data.signal.stop();
                }
            }
            Err(e) if e.raw_os_error() == Some(nix::libc::ENODEV) => {
                data.fail(format!("DRM device removed: {}", e));
            }
            Err(e) => {
                data.read_failures += 1;
                log::warn!("[drm] Failed to read events: {}", e);
                if data.read_failures >= MAX_READ_FAILURES {
                    data.fail(format!("Cannot read DRM events: {}", e));
                }
            }
        },
        DrmSourceEvent::Lost => data.fail("DRM device lost".to_string()),
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path)
            .map_err(|e| DisplayError::configuration(path.clone(), e))?,
        None => Config::load(),
    };

    let mut prefs = config.display.mode_preference().from_process_env();
    if let Some(index) = args.mode_index {
        prefs.index = Some(index);
    }
    if let Some(name) = args.mode {
        prefs.name = Some(name);
    }
    if let Some(value) = &args.mode_max {
        let size = parse_max_size(value)
            .ok_or_else(|| format!("Invalid --mode-max '{}' (expected WxH)", value))?;
        prefs.max_size = Some(size);
    }

    let device = args.device.or_else(|| config.display.drm_device_path());
    let atomic = config.display.atomic && !args.legacy;
    let mut display = open_display(device.as_deref(), &prefs, atomic)?;

    if args.list_modes {
        println!("{} on {}:", display.connector_name(), display.path().display());
        for (i, mode) in display.modes().iter().enumerate() {
            let marker = if i == display.mode_index() { '*' } else { ' ' };
            println!("{} [{}] {}", marker, i, mode);
        }
        return Ok(());
    }

    display.set_flip_timeout(config.display.flip_timeout());
    let event_fd = display.device().event_fd()?;
    let (width, height) = display.size();

    let feedback = Rc::new(RefCell::new(PatternFeedback {
        free: (0..PATTERN_SLOTS).collect(),
        frame_requested: true,
    }));
    let mut presenter = Presenter::new(display, PatternClient(feedback.clone()));
    presenter.set_focused(config.display.focused);

    let mut event_loop: EventLoop<LoopData> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    insert_drm_source(&handle, event_fd, on_drm_event)?;

    if let Some(timeout) = config.display.flip_timeout() {
        handle
            .insert_source(Timer::from_duration(timeout), move |_, _, data| {
                if data.presenter.check_stalled(Instant::now()) {
                    data.fail(format!("Page flip did not complete within {:?}", timeout));
                }
                TimeoutAction::ToDuration(timeout)
            })
            .map_err(|e| e.error)?;
    }

    let mut data = LoopData {
        presenter,
        pattern: TestPattern::new(width, height),
        feedback,
        presented: 0,
        frames: args.frames,
        signal: event_loop.get_signal(),
        read_failures: 0,
        failure: None,
    };

    log::info!("Presenting {}x{} test pattern", width, height);
    present_next_frame(&mut data);

    event_loop.run(Some(FRAME_INTERVAL), &mut data, |data| {
        if data.failure.is_none() && data.feedback.borrow().frame_requested {
            present_next_frame(data);
        }
    })?;

    data.presenter.teardown();
    log::info!(
        "Finished at {} after {} frames",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        data.presented
    );

    match data.failure {
        Some(reason) => Err(reason.into()),
        None => Ok(()),
    }
}

fn main() {
    let args = Args::parse();

    let stderr_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(e) = FileLogger::init_with_stderr_level(stderr_level) {
        eprintln!("kmsview: file logging unavailable: {}", e);
    }

    if let Err(e) = run(args) {
        log::error!("{}", e);
        eprintln!("kmsview: {}", e);
        std::process::exit(1);
    }
}
