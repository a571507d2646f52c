//! Frame orchestrator.
//!
//! Owns the platform, the GPU backend, the renderer, and the optional UI
//! overlay, and sequences one frame per iteration: events, timing, resize,
//! slot reuse wait, acquire, record, compose, overlay, submit, present.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, error, info, trace, warn};
use vkviz_gpu::{AcquireOutcome, FrameTimeline};
use vkviz_platform::{Platform, PlatformEvent};

use crate::backend::{FrameTargets, RenderBackend};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::frame::{FrameClock, FrameContext};
use crate::renderer::{PresentationMode, Renderer, RendererCaps, RendererStats};
use crate::state::EngineState;
use crate::ui::{OverlayTarget, UiOverlay, UiPanel};

/// How long a minimized engine blocks on the event queue per iteration.
pub const IDLE_WAIT: Duration = Duration::from_millis(100);

/// What one iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Exit was requested; the loop should stop.
    Exit,
    /// Minimized: waited on events, no GPU work.
    Idle,
    /// The swapchain was rebuilt; nothing was drawn.
    Recreated,
    /// Acquire reported an outdated swapchain; nothing was drawn and the
    /// frame counter did not advance.
    Skipped,
    /// A frame was submitted and presented.
    Presented { frame_number: u64 },
}

/// Cloneable handle that asks the loop to stop at the next iteration.
#[derive(Debug, Clone)]
pub struct ExitHandle(Arc<AtomicBool>);

impl ExitHandle {
    pub fn request_exit(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The frame engine.
pub struct Engine<P: Platform, B: RenderBackend<P>> {
    config: EngineConfig,
    state: EngineState,
    caps: RendererCaps,
    renderer: Option<Box<dyn Renderer<B::Device>>>,
    renderer_ready: bool,
    ui: Option<Box<dyn UiOverlay<B::Device>>>,
    ui_active: bool,
    // Dropped in declaration order: backend before the platform that owns
    // the window its surface was made from.
    backend: Option<B>,
    platform: Option<P>,
    timeline: FrameTimeline,
    clock: FrameClock,
    last_frame: Option<FrameContext>,
    events: Vec<PlatformEvent>,
    exit: ExitHandle,
}

impl<P: Platform, B: RenderBackend<P>> Engine<P, B> {
    pub fn new(config: EngineConfig) -> Self {
        let state = EngineState::new(&config);
        let timeline = FrameTimeline::new(config.slot_count());
        Self {
            config,
            state,
            caps: RendererCaps::default(),
            renderer: None,
            renderer_ready: false,
            ui: None,
            ui_active: false,
            backend: None,
            platform: None,
            timeline,
            clock: FrameClock::new(),
            last_frame: None,
            events: Vec::new(),
            exit: ExitHandle(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Install the renderer. Only valid before `init`.
    pub fn set_renderer<R>(&mut self, renderer: R) -> EngineResult<()>
    where
        R: Renderer<B::Device> + 'static,
    {
        if self.state.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        self.renderer = Some(Box::new(renderer));
        Ok(())
    }

    /// Install the UI overlay. Only valid before `init`.
    pub fn set_ui<U>(&mut self, ui: U) -> EngineResult<()>
    where
        U: UiOverlay<B::Device> + 'static,
    {
        if self.state.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        self.ui = Some(Box::new(ui));
        Ok(())
    }

    /// Change window size and title. Only valid before `init`.
    pub fn configure_window(
        &mut self,
        width: u32,
        height: u32,
        title: impl Into<String>,
    ) -> EngineResult<()> {
        if self.state.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        self.config.configure_window(width, height, title);
        self.state = EngineState::new(&self.config);
        Ok(())
    }

    /// Open the window, bootstrap the device, and build the swapchain,
    /// offscreen targets, and frame slots. Does not start the loop.
    pub fn init(&mut self) -> EngineResult<()> {
        if self.state.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return Err(EngineError::RendererNotSet);
        };

        let mut caps = RendererCaps::default();
        renderer.negotiate_capabilities(None, &mut caps);

        // Stored as soon as they exist so cleanup can release a partial init.
        let platform = self
            .platform
            .insert(P::create(&self.config.platform_config())?);
        let (width, height) = clamped_size(platform.pixel_size());
        let backend = self.backend.insert(B::create(platform, &self.config)?);

        renderer.negotiate_capabilities(Some(backend.device()), &mut caps);
        caps.validate().map_err(EngineError::Capabilities)?;

        let extent = backend.create_swapchain(width, height)?;
        backend.create_offscreen(extent, &caps)?;
        backend.create_frames(self.config.slot_count())?;
        self.timeline = FrameTimeline::new(self.config.slot_count());

        renderer
            .initialize(backend.device(), &caps, extent)
            .map_err(EngineError::Renderer)?;
        self.renderer_ready = true;
        renderer
            .on_swapchain_ready(backend.device(), extent)
            .map_err(EngineError::Renderer)?;

        if caps.enable_ui {
            match self.ui.as_mut() {
                Some(ui) => {
                    ui.attach(
                        backend.device(),
                        backend.swapchain_format(),
                        backend.swapchain_image_count(),
                    )
                    .map_err(EngineError::UiInit)?;
                    self.ui_active = true;
                }
                None => debug!("UI requested but no overlay attached"),
            }
        }

        self.caps = caps;
        self.state.width = extent.width;
        self.state.height = extent.height;
        self.state.initialized = true;
        self.state.should_render = true;
        self.state.resize_requested = false;
        self.clock = FrameClock::new();

        info!(
            "Engine initialized: {}x{}, {} frame slots, {:?}",
            extent.width,
            extent.height,
            self.config.slot_count(),
            self.caps.presentation_mode
        );
        Ok(())
    }

    /// Run iterations until exit is requested or an error occurs.
    ///
    /// Errors leave the engine as-is; call [`Engine::cleanup`] afterwards.
    pub fn run(&mut self) -> EngineResult<()> {
        if !self.state.initialized {
            return Err(EngineError::NotInitialized);
        }
        if self.state.running {
            return Err(EngineError::RunLoopActive);
        }

        self.state.running = true;
        let result = loop {
            match self.run_iteration() {
                Ok(IterationOutcome::Exit) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        self.state.running = false;

        info!("Run loop exited after {} frames", self.state.frame_number);
        result
    }

    /// Run a single iteration of the frame loop.
    pub fn run_iteration(&mut self) -> EngineResult<IterationOutcome> {
        if !self.state.initialized {
            return Err(EngineError::NotInitialized);
        }

        self.process_events()?;
        if self.exit.is_requested() {
            self.state.running = false;
            return Ok(IterationOutcome::Exit);
        }

        let (delta_time, elapsed) = self.clock.tick();
        self.state.delta_time = delta_time;
        self.state.elapsed = elapsed;

        if !self.state.should_render {
            let platform = self.platform.as_mut().ok_or(EngineError::NotInitialized)?;
            platform.wait_events(IDLE_WAIT, &mut self.events)?;
            return Ok(IterationOutcome::Idle);
        }

        if self.state.resize_requested {
            self.recreate_swapchain()?;
            return Ok(IterationOutcome::Recreated);
        }

        self.render_frame()
    }

    fn process_events(&mut self) -> EngineResult<()> {
        let mut events = std::mem::take(&mut self.events);
        if let Some(platform) = self.platform.as_mut() {
            platform.poll_events(&mut events)?;
        }

        let device = self.backend.as_ref().map(RenderBackend::device);
        for event in events.drain(..) {
            if let (Some(renderer), Some(device)) = (self.renderer.as_mut(), device) {
                renderer.on_event(device, &event, self.last_frame.as_ref());
            }
            if self.ui_active {
                if let Some(ui) = self.ui.as_mut() {
                    ui.process_event(&event);
                }
            }
            if let Some(signal) = event.signal() {
                trace!("Window signal: {:?}", signal);
                if self.state.apply_signal(signal) {
                    info!("Quit requested");
                    self.exit.request_exit();
                }
            }
        }

        // Keep the allocation for the next drain.
        self.events = events;
        Ok(())
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> EngineResult<IterationOutcome> {
        let Self {
            state,
            caps,
            renderer,
            ui,
            ui_active,
            backend,
            timeline,
            last_frame,
            ..
        } = self;
        let backend = backend.as_mut().ok_or(EngineError::NotInitialized)?;
        let renderer = renderer.as_mut().ok_or(EngineError::RendererNotSet)?;

        let frame_number = state.frame_number;
        let slot = timeline.slot_for_frame(frame_number);

        timeline.wait_for_slot_reuse(slot, |value| backend.wait_timeline(value))?;

        let image_index = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired(index) => index,
            outcome => {
                debug!("Acquire returned {:?}, recreating swapchain", outcome);
                state.resize_requested = true;
                return Ok(IterationOutcome::Skipped);
            }
        };

        let backend = &*backend;
        let cmd = backend.begin_commands(slot)?;
        let frame = FrameContext::new(
            frame_number,
            slot,
            image_index,
            (state.delta_time, state.elapsed),
            backend.frame_targets(image_index)?,
        );
        *last_frame = Some(frame.clone());

        backend.prepare_attachments(cmd)?;
        if caps.presentation_mode == PresentationMode::DirectToSwapchain {
            backend.transition_for_compose(cmd, image_index)?;
        }

        let device = backend.device();
        renderer.update(device, &frame).map_err(EngineError::Renderer)?;
        if caps.uses_compute {
            renderer
                .record_compute(cmd, device, &frame)
                .map_err(EngineError::Renderer)?;
        }
        renderer
            .record_graphics(cmd, device, &frame)
            .map_err(EngineError::Renderer)?;

        match caps.presentation_mode {
            PresentationMode::EngineBlit => backend.blit_to_swapchain(cmd, image_index)?,
            PresentationMode::RendererComposite => {
                backend.transition_for_compose(cmd, image_index)?;
                renderer
                    .compose(cmd, device, &frame)
                    .map_err(EngineError::Renderer)?;
            }
            PresentationMode::DirectToSwapchain => {}
        }

        match ui.as_mut().filter(|_| *ui_active) {
            Some(ui) => {
                ui.begin_frame(&frame);
                renderer.on_ui(device, &frame);
                let target = OverlayTarget {
                    image: frame.swapchain_image,
                    view: frame.swapchain_view,
                    extent: frame.extent,
                    layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                };
                ui.render_overlay(cmd, device, &target)
                    .map_err(EngineError::Renderer)?;
            }
            None => backend.finish_for_present(cmd, image_index)?,
        }

        let value = timeline.submit(slot, |value| backend.submit(slot, cmd, value))?;
        trace!("Frame {} submitted on slot {} at {}", frame_number, slot, value);

        let presented = backend.present(slot, image_index)?;
        // The frame was submitted, so it counts even if presentation was not clean.
        state.frame_number += 1;
        if presented.needs_recreate() {
            debug!("Present returned {:?}, recreating swapchain", presented);
            state.resize_requested = true;
        }

        Ok(IterationOutcome::Presented { frame_number })
    }

    /// Rebuild the swapchain and offscreen targets at the window's current size.
    pub fn recreate_swapchain(&mut self) -> EngineResult<()> {
        let Self {
            state,
            caps,
            renderer,
            ui,
            ui_active,
            backend,
            platform,
            timeline,
            last_frame,
            ..
        } = self;
        let backend = backend.as_mut().ok_or(EngineError::NotInitialized)?;
        let platform = platform.as_ref().ok_or(EngineError::NotInitialized)?;

        if let Some(renderer) = renderer.as_mut() {
            renderer.on_swapchain_destroy(backend.device());
        }
        backend.wait_idle()?;
        backend.destroy_swapchain()?;
        backend.destroy_offscreen()?;

        let (width, height) = clamped_size(platform.pixel_size());
        let extent = backend.create_swapchain(width, height)?;
        backend.create_offscreen(extent, caps)?;

        if let Some(renderer) = renderer.as_mut() {
            renderer
                .on_swapchain_ready(backend.device(), extent)
                .map_err(EngineError::Renderer)?;
        }
        if *ui_active {
            if let Some(ui) = ui.as_mut() {
                ui.set_min_image_count(backend.swapchain_image_count());
            }
        }

        // The old snapshot names destroyed images; keep only the new extent.
        *last_frame = Some(FrameContext::new(
            state.frame_number,
            timeline.slot_for_frame(state.frame_number),
            0,
            (state.delta_time, state.elapsed),
            FrameTargets {
                extent,
                swapchain_format: backend.swapchain_format(),
                ..FrameTargets::default()
            },
        ));

        state.width = extent.width;
        state.height = extent.height;
        state.resize_requested = false;
        info!("Swapchain recreated: {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Tear everything down. Safe to call more than once; also runs on drop.
    pub fn cleanup(&mut self) {
        let Some(mut backend) = self.backend.take() else {
            self.platform = None;
            return;
        };
        info!("Starting cleanup...");
        self.state.shutting_down = true;

        if let Err(e) = backend.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        if self.ui_active {
            if let Some(ui) = self.ui.as_mut() {
                ui.shutdown(backend.device());
            }
            self.ui_active = false;
        }

        if self.renderer_ready {
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.on_swapchain_destroy(backend.device());
            }
        }

        backend.destroy_frames();

        if self.renderer_ready {
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.destroy(backend.device());
            }
            self.renderer_ready = false;
        }

        if let Err(e) = backend.destroy_offscreen() {
            error!("Failed to destroy offscreen targets: {e}");
        }
        if let Err(e) = backend.destroy_swapchain() {
            error!("Failed to destroy swapchain: {e}");
        }

        drop(backend);
        self.platform = None;
        self.last_frame = None;

        self.state.initialized = false;
        self.state.running = false;
        self.state.should_render = false;
        self.state.shutting_down = false;
        info!("Cleanup complete");
    }

    /// Handle that stops the loop at the next iteration.
    pub fn exit_handle(&self) -> ExitHandle {
        self.exit.clone()
    }

    pub fn request_exit(&self) {
        self.exit.request_exit();
    }

    /// Wait for the device to finish all submitted work.
    pub fn device_wait_idle(&self) -> EngineResult<()> {
        self.backend
            .as_ref()
            .ok_or(EngineError::NotInitialized)?
            .wait_idle()
    }

    /// Wait for the device, then let the renderer reload its assets.
    pub fn reload_assets(&mut self) -> EngineResult<()> {
        let backend = self.backend.as_ref().ok_or(EngineError::NotInitialized)?;
        let renderer = self.renderer.as_mut().ok_or(EngineError::RendererNotSet)?;
        backend.wait_idle()?;
        renderer
            .reload_assets(backend.device())
            .map_err(EngineError::Renderer)?;
        info!("Assets reloaded");
        Ok(())
    }

    /// Register a persistent UI panel. Dropped with a warning if no overlay is set.
    pub fn add_ui_panel(&mut self, panel: UiPanel) {
        match self.ui.as_mut() {
            Some(ui) => ui.add_panel(panel),
            None => warn!("No UI overlay attached, panel ignored"),
        }
    }

    pub fn renderer_stats(&self) -> RendererStats {
        self.renderer
            .as_ref()
            .map(|renderer| renderer.stats())
            .unwrap_or_default()
    }

    pub fn last_frame_context(&self) -> Option<&FrameContext> {
        self.last_frame.as_ref()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Capabilities negotiated during `init`.
    pub fn caps(&self) -> &RendererCaps {
        &self.caps
    }

    pub fn frame_number(&self) -> u64 {
        self.state.frame_number
    }

    pub fn timeline(&self) -> &FrameTimeline {
        &self.timeline
    }

    pub fn device(&self) -> Option<&B::Device> {
        self.backend.as_ref().map(RenderBackend::device)
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut B> {
        self.backend.as_mut()
    }

    pub fn platform(&self) -> Option<&P> {
        self.platform.as_ref()
    }

    pub fn platform_mut(&mut self) -> Option<&mut P> {
        self.platform.as_mut()
    }
}

impl<P: Platform, B: RenderBackend<P>> Drop for Engine<P, B> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn clamped_size((width, height): (u32, u32)) -> (u32, u32) {
    (width.max(1), height.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        clear_journal, journal, Call, ClearRenderer, MockBackend, MockPlatform, MockUi,
    };
    use approx::assert_abs_diff_eq;
    use vkviz_gpu::{AttachmentRequest, PresentOutcome};
    use vkviz_platform::WindowEvent;
    use winit::dpi::PhysicalSize;

    type TestEngine = Engine<MockPlatform, MockBackend>;

    const CLEAR: [f32; 4] = [0.25, 0.5, 0.75, 1.0];

    fn config() -> EngineConfig {
        EngineConfig::new("test")
            .with_size(800, 600)
            .with_frames_in_flight(2)
    }

    fn engine_with(renderer: ClearRenderer) -> TestEngine {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine.set_renderer(renderer).expect("set renderer");
        engine.init().expect("init");
        clear_journal();
        engine
    }

    fn engine() -> TestEngine {
        engine_with(ClearRenderer::new(CLEAR))
    }

    fn with_caps(caps: RendererCaps) -> ClearRenderer {
        let mut renderer = ClearRenderer::new(CLEAR);
        renderer.caps = Some(caps);
        renderer
    }

    fn resized(width: u32, height: u32) -> PlatformEvent {
        PlatformEvent::Window(WindowEvent::Resized(PhysicalSize::new(width, height)))
    }

    fn push_event(engine: &mut TestEngine, event: PlatformEvent) {
        engine.platform_mut().expect("platform").push_event(event);
    }

    fn set_window_size(engine: &mut TestEngine, width: u32, height: u32) {
        engine.platform_mut().expect("platform").size = (width, height);
    }

    fn step(engine: &mut TestEngine) -> IterationOutcome {
        engine.run_iteration().expect("iteration")
    }

    fn position(calls: &[Call], call: &Call) -> usize {
        calls
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("{call:?} not recorded in {calls:?}"))
    }

    #[test]
    fn init_builds_resources_in_order() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine.set_renderer(ClearRenderer::new(CLEAR)).unwrap();
        engine.init().unwrap();

        assert_eq!(
            journal(),
            vec![
                Call::Renderer("negotiate"),
                Call::PlatformCreate {
                    width: 800,
                    height: 600
                },
                Call::BackendCreate,
                Call::Renderer("negotiate_with_device"),
                Call::CreateSwapchain {
                    width: 800,
                    height: 600
                },
                Call::CreateOffscreen {
                    width: 800,
                    height: 600
                },
                Call::CreateFrames(2),
                Call::Renderer("initialize"),
                Call::Renderer("on_swapchain_ready"),
            ]
        );
        assert!(engine.state().initialized);
        assert!(engine.state().should_render);
        assert!(!engine.state().running);
        assert_eq!(engine.backend().unwrap().slot_count(), 2);
    }

    #[test]
    fn slot_reuse_waits_for_previous_submission_of_that_slot() {
        let mut engine = engine();
        for _ in 0..5 {
            step(&mut engine);
        }

        let sync: Vec<Call> = journal()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::WaitTimeline(_) | Call::BeginCommands { .. } | Call::Submit { .. }
                )
            })
            .collect();
        assert_eq!(
            sync,
            vec![
                Call::BeginCommands { slot: 0 },
                Call::Submit { slot: 0, value: 1 },
                Call::BeginCommands { slot: 1 },
                Call::Submit { slot: 1, value: 2 },
                Call::WaitTimeline(1),
                Call::BeginCommands { slot: 0 },
                Call::Submit { slot: 0, value: 3 },
                Call::WaitTimeline(2),
                Call::BeginCommands { slot: 1 },
                Call::Submit { slot: 1, value: 4 },
                Call::WaitTimeline(3),
                Call::BeginCommands { slot: 0 },
                Call::Submit { slot: 0, value: 5 },
            ]
        );
        assert_eq!(engine.timeline().value(), 5);
    }

    #[test]
    fn slot_wait_precedes_acquire() {
        let mut engine = engine();
        for _ in 0..3 {
            step(&mut engine);
        }
        let calls = journal();
        let wait = position(&calls, &Call::WaitTimeline(1));
        let acquires: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Call::Acquire { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(acquires.len(), 3);
        assert!(acquires[1] < wait && wait < acquires[2]);
    }

    #[test]
    fn recreated_offscreen_matches_swapchain_extent() {
        let mut engine = engine();
        let sizes = [(640, 480), (0, 0), (1920, 1080), (0, 300), (1, 1)];
        for (width, height) in sizes {
            set_window_size(&mut engine, width, height);
            engine.recreate_swapchain().unwrap();

            let expected = vk::Extent2D {
                width: width.max(1),
                height: height.max(1),
            };
            let backend = engine.backend().unwrap();
            assert_eq!(backend.swapchain_extent(), Some(expected));
            assert_eq!(backend.offscreen_extent(), Some(expected));
            assert_eq!(
                (engine.state().width, engine.state().height),
                (expected.width, expected.height)
            );
            assert!(!engine.state().resize_requested);
        }
    }

    #[test]
    fn recreate_follows_teardown_then_rebuild_order() {
        let ui = MockUi::default();
        let min_images = ui.min_image_count.clone();

        clear_journal();
        let mut engine = TestEngine::new(config());
        engine.set_renderer(ClearRenderer::new(CLEAR)).unwrap();
        engine.set_ui(ui).unwrap();
        engine.init().unwrap();
        *min_images.borrow_mut() = 0;
        clear_journal();

        set_window_size(&mut engine, 1024, 768);
        engine.recreate_swapchain().unwrap();
        assert_eq!(
            journal(),
            vec![
                Call::Renderer("on_swapchain_destroy"),
                Call::WaitIdle,
                Call::DestroySwapchain,
                Call::DestroyOffscreen,
                Call::CreateSwapchain {
                    width: 1024,
                    height: 768
                },
                Call::CreateOffscreen {
                    width: 1024,
                    height: 768
                },
                Call::Renderer("on_swapchain_ready"),
                Call::Ui("set_min_image_count"),
            ]
        );
        assert_eq!(*min_images.borrow(), crate::mock::SWAPCHAIN_IMAGES);
    }

    #[test]
    fn outdated_acquire_keeps_frame_counter() {
        let mut engine = engine();
        assert_eq!(step(&mut engine), IterationOutcome::Presented { frame_number: 0 });
        assert_eq!(step(&mut engine), IterationOutcome::Presented { frame_number: 1 });

        engine
            .backend_mut()
            .unwrap()
            .acquire_results
            .push_back(AcquireOutcome::OutOfDate);
        clear_journal();
        assert_eq!(step(&mut engine), IterationOutcome::Skipped);
        assert_eq!(engine.frame_number(), 2);
        assert!(engine.state().resize_requested);
        assert!(!journal().iter().any(|c| matches!(
            c,
            Call::BeginCommands { .. } | Call::Submit { .. } | Call::Present { .. }
        )));

        assert_eq!(step(&mut engine), IterationOutcome::Recreated);
        assert!(!engine.state().resize_requested);
        assert_eq!(step(&mut engine), IterationOutcome::Presented { frame_number: 2 });
        assert_eq!(engine.frame_number(), 3);
    }

    #[test]
    fn suboptimal_acquire_skips_the_frame() {
        let mut engine = engine();
        engine
            .backend_mut()
            .unwrap()
            .acquire_results
            .push_back(AcquireOutcome::Suboptimal(1));
        assert_eq!(step(&mut engine), IterationOutcome::Skipped);
        assert_eq!(engine.frame_number(), 0);
        assert!(engine.state().resize_requested);
    }

    #[test]
    fn outdated_present_still_counts_the_frame() {
        let mut engine = engine();
        engine
            .backend_mut()
            .unwrap()
            .present_results
            .borrow_mut()
            .push_back(PresentOutcome::OutOfDate);
        assert_eq!(step(&mut engine), IterationOutcome::Presented { frame_number: 0 });
        assert_eq!(engine.frame_number(), 1);
        assert!(engine.state().resize_requested);
        assert_eq!(step(&mut engine), IterationOutcome::Recreated);
    }

    #[test]
    fn minimized_engine_does_no_gpu_work() {
        let mut engine = engine();
        step(&mut engine);

        push_event(&mut engine, resized(0, 0));
        clear_journal();
        for _ in 0..10 {
            assert_eq!(step(&mut engine), IterationOutcome::Idle);
        }
        let calls = journal();
        assert!(!calls.iter().any(Call::is_frame_gpu_work), "{calls:?}");
        assert_eq!(calls.iter().filter(|c| **c == Call::WaitEvents).count(), 10);
        assert!(engine.state().minimized);
        assert_eq!(engine.frame_number(), 1);

        push_event(&mut engine, resized(800, 600));
        assert_eq!(step(&mut engine), IterationOutcome::Recreated);
        assert_eq!(step(&mut engine), IterationOutcome::Presented { frame_number: 1 });
    }

    #[test]
    fn occluded_window_idles_until_visible() {
        let mut engine = engine();
        push_event(&mut engine, PlatformEvent::Window(WindowEvent::Occluded(true)));
        assert_eq!(step(&mut engine), IterationOutcome::Idle);
        push_event(&mut engine, PlatformEvent::Window(WindowEvent::Occluded(false)));
        assert_eq!(step(&mut engine), IterationOutcome::Recreated);
    }

    #[test]
    fn five_frames_present_the_clear_color() {
        let renderer = ClearRenderer::new(CLEAR);
        let extents = renderer.extents.clone();
        let mut engine = engine_with(renderer);

        for expected in 0..5 {
            assert_eq!(
                step(&mut engine),
                IterationOutcome::Presented {
                    frame_number: expected
                }
            );
        }

        assert_eq!(engine.frame_number(), 5);
        assert!(!engine.state().resize_requested);
        let calls = journal();
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Present { .. })).count(),
            5
        );
        assert!(!calls
            .iter()
            .any(|c| matches!(c, Call::CreateSwapchain { .. } | Call::DestroySwapchain)));
        assert!(extents
            .borrow()
            .iter()
            .all(|e| (e.width, e.height) == (800, 600)));

        let presented = engine.device().unwrap().presented();
        assert_eq!(presented.len(), 5);
        let last = presented.last().copied().unwrap();
        for (channel, expected) in last.iter().zip(CLEAR) {
            assert_abs_diff_eq!(*channel, expected, epsilon = 1.0 / 255.0);
        }
    }

    #[test]
    fn frame_context_tracks_slot_and_image() {
        let mut engine = engine();
        for _ in 0..4 {
            step(&mut engine);
        }
        let frame = engine.last_frame_context().expect("frame");
        assert_eq!(frame.frame_number, 3);
        assert_eq!(frame.slot, 1);
        assert_eq!(frame.image_index, 0);
        assert_eq!(frame.extent.width, 800);
        assert!(frame.color.is_some());
        assert!(frame.depth.is_some());
        assert!(frame.attachment("hdr_color").is_some());
    }

    #[test]
    fn resize_mid_stream_rebuilds_without_drawing() {
        let renderer = ClearRenderer::new(CLEAR);
        let extents = renderer.extents.clone();
        let mut engine = engine_with(renderer);
        step(&mut engine);
        step(&mut engine);

        set_window_size(&mut engine, 400, 300);
        push_event(&mut engine, resized(400, 300));
        clear_journal();

        assert_eq!(step(&mut engine), IterationOutcome::Recreated);
        let calls = journal();
        let destroy_chain = position(&calls, &Call::DestroySwapchain);
        let destroy_offscreen = position(&calls, &Call::DestroyOffscreen);
        let create_chain = position(
            &calls,
            &Call::CreateSwapchain {
                width: 400,
                height: 300,
            },
        );
        let create_offscreen = position(
            &calls,
            &Call::CreateOffscreen {
                width: 400,
                height: 300,
            },
        );
        assert!(destroy_chain < destroy_offscreen);
        assert!(destroy_offscreen < create_chain);
        assert!(create_chain < create_offscreen);
        assert!(!calls.contains(&Call::Renderer("record_graphics")));
        assert!(!calls.iter().any(|c| matches!(c, Call::Present { .. })));

        assert_eq!(step(&mut engine), IterationOutcome::Presented { frame_number: 2 });
        let last = *extents.borrow().last().unwrap();
        assert_eq!((last.width, last.height), (400, 300));
        assert_eq!(engine.frame_number(), 3);
    }

    #[test]
    fn recreate_replaces_stale_frame_context() {
        let renderer = ClearRenderer::new(CLEAR);
        let event_frames = renderer.event_frames.clone();
        let mut engine = engine_with(renderer);
        step(&mut engine);
        let before = engine.last_frame_context().unwrap().clone();
        assert!(before.color.is_some());

        set_window_size(&mut engine, 400, 300);
        push_event(&mut engine, resized(400, 300));
        assert_eq!(step(&mut engine), IterationOutcome::Recreated);

        let after = engine.last_frame_context().unwrap();
        assert_eq!((after.extent.width, after.extent.height), (400, 300));
        assert_eq!(after.swapchain_image, vk::Image::null());
        assert_eq!(after.swapchain_view, vk::ImageView::null());
        assert!(after.color.is_none());
        assert!(after.depth.is_none());
        assert!(after.attachments.is_empty());
        assert_eq!(after.frame_number, 1);

        // Input between the rebuild and the next frame sees the new snapshot.
        push_event(&mut engine, PlatformEvent::Window(WindowEvent::Focused(true)));
        step(&mut engine);
        let seen = event_frames.borrow().last().cloned().flatten().unwrap();
        assert_eq!((seen.extent.width, seen.extent.height), (400, 300));
        assert!(seen.color.is_none());
        assert_ne!(
            engine.last_frame_context().unwrap().color.as_ref().unwrap().view,
            before.color.unwrap().view
        );
    }

    #[test]
    fn per_frame_hooks_receive_the_device() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine.set_renderer(ClearRenderer::new(CLEAR)).unwrap();
        engine.set_ui(MockUi::default()).unwrap();
        engine.init().unwrap();

        push_event(&mut engine, PlatformEvent::Window(WindowEvent::Focused(false)));
        step(&mut engine);
        assert_eq!(
            engine.device().unwrap().hooks(),
            vec!["on_event", "update", "on_ui"]
        );
    }

    #[test]
    fn lifecycle_calls_are_rejected_out_of_order() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        assert!(matches!(engine.run(), Err(EngineError::NotInitialized)));
        assert!(matches!(
            engine.run_iteration(),
            Err(EngineError::NotInitialized)
        ));
        assert!(matches!(engine.init(), Err(EngineError::RendererNotSet)));

        engine.set_renderer(ClearRenderer::new(CLEAR)).unwrap();
        engine.init().unwrap();
        assert!(matches!(
            engine.set_renderer(ClearRenderer::new(CLEAR)),
            Err(EngineError::AlreadyInitialized)
        ));
        assert!(matches!(
            engine.set_ui(MockUi::default()),
            Err(EngineError::AlreadyInitialized)
        ));
        assert!(matches!(
            engine.configure_window(10, 10, "late"),
            Err(EngineError::AlreadyInitialized)
        ));
        assert!(matches!(engine.init(), Err(EngineError::AlreadyInitialized)));
    }

    #[test]
    fn configure_window_sizes_the_platform() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine.configure_window(320, 200, "small").unwrap();
        engine.set_renderer(ClearRenderer::new(CLEAR)).unwrap();
        engine.init().unwrap();
        assert!(journal().contains(&Call::CreateSwapchain {
            width: 320,
            height: 200
        }));
        assert_eq!(engine.state().title, "small");
    }

    #[test]
    fn cleanup_is_ordered_and_idempotent() {
        let mut engine = engine();
        step(&mut engine);
        clear_journal();

        engine.cleanup();
        assert_eq!(
            journal(),
            vec![
                Call::WaitIdle,
                Call::Renderer("on_swapchain_destroy"),
                Call::DestroyFrames,
                Call::Renderer("destroy"),
                Call::DestroyOffscreen,
                Call::DestroySwapchain,
            ]
        );
        assert!(!engine.state().initialized);
        assert!(engine.backend().is_none());
        assert!(engine.platform().is_none());

        clear_journal();
        engine.cleanup();
        drop(engine);
        assert!(journal().is_empty());
    }

    #[test]
    fn cleanup_shuts_the_overlay_down_first() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine.set_renderer(ClearRenderer::new(CLEAR)).unwrap();
        engine.set_ui(MockUi::default()).unwrap();
        engine.init().unwrap();
        clear_journal();

        engine.cleanup();
        let calls = journal();
        assert_eq!(&calls[..2], &[Call::WaitIdle, Call::Ui("shutdown")]);
    }

    #[test]
    fn overlay_is_recorded_after_blit_and_before_submit() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine.set_renderer(ClearRenderer::new(CLEAR)).unwrap();
        engine.set_ui(MockUi::default()).unwrap();
        engine.init().unwrap();
        assert!(journal().contains(&Call::Ui("attach")));
        clear_journal();

        push_event(&mut engine, PlatformEvent::Window(WindowEvent::Focused(true)));
        step(&mut engine);
        let calls = journal();
        let order = [
            Call::Ui("process_event"),
            Call::Renderer("record_graphics"),
            Call::Blit { image_index: 0 },
            Call::Ui("begin_frame"),
            Call::Renderer("on_ui"),
            Call::Ui("render_overlay"),
            Call::Submit { slot: 0, value: 1 },
            Call::Present {
                slot: 0,
                image_index: 0,
            },
        ];
        let positions: Vec<usize> = order.iter().map(|c| position(&calls, c)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{calls:?}");
        assert!(!calls.iter().any(|c| matches!(c, Call::FinishForPresent { .. })));
        assert!(engine.state().focused);

        engine.add_ui_panel(Box::new(|_frame: &FrameContext| {}));
        assert!(journal().contains(&Call::Ui("add_panel")));
    }

    #[test]
    fn disabled_ui_is_never_attached() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine
            .set_renderer(with_caps(RendererCaps {
                enable_ui: false,
                ..RendererCaps::default()
            }))
            .unwrap();
        engine.set_ui(MockUi::default()).unwrap();
        engine.init().unwrap();
        step(&mut engine);

        let calls = journal();
        assert!(!calls.iter().any(|c| matches!(c, Call::Ui(_))));
        assert!(calls.contains(&Call::FinishForPresent { image_index: 0 }));
    }

    #[test]
    fn composite_mode_hands_swapchain_to_renderer() {
        let mut engine = engine_with(with_caps(RendererCaps {
            presentation_mode: PresentationMode::RendererComposite,
            ..RendererCaps::default()
        }));
        step(&mut engine);

        let calls = journal();
        let graphics = position(&calls, &Call::Renderer("record_graphics"));
        let transition = position(&calls, &Call::TransitionForCompose { image_index: 0 });
        let compose = position(&calls, &Call::Renderer("compose"));
        assert!(graphics < transition && transition < compose);
        assert!(!calls.iter().any(|c| matches!(c, Call::Blit { .. })));

        let presented = engine.device().unwrap().presented();
        assert_eq!(presented, vec![CLEAR]);
    }

    #[test]
    fn direct_mode_skips_offscreen_targets() {
        let mut engine = engine_with(with_caps(RendererCaps {
            presentation_mode: PresentationMode::DirectToSwapchain,
            color_attachments: Vec::new(),
            depth_attachment: None,
            ..RendererCaps::default()
        }));
        assert_eq!(engine.backend().unwrap().offscreen_extent(), None);

        step(&mut engine);
        let calls = journal();
        let transition = position(&calls, &Call::TransitionForCompose { image_index: 0 });
        let graphics = position(&calls, &Call::Renderer("record_graphics"));
        assert!(transition < graphics);
        assert!(!calls.iter().any(|c| matches!(c, Call::Blit { .. })));
        assert!(engine.last_frame_context().unwrap().color.is_none());
    }

    #[test]
    fn compute_is_recorded_before_graphics_when_requested() {
        let mut engine = engine_with(with_caps(RendererCaps {
            uses_compute: true,
            ..RendererCaps::default()
        }));
        step(&mut engine);
        let calls = journal();
        let update = position(&calls, &Call::Renderer("update"));
        let compute = position(&calls, &Call::Renderer("record_compute"));
        let graphics = position(&calls, &Call::Renderer("record_graphics"));
        assert!(update < compute && compute < graphics);

        let mut plain = engine_with(ClearRenderer::new(CLEAR));
        step(&mut plain);
        assert!(!journal().contains(&Call::Renderer("record_compute")));
    }

    #[test]
    fn presentation_attachment_is_chosen_by_name() {
        let mut engine = engine_with(with_caps(RendererCaps {
            color_attachments: vec![
                AttachmentRequest::hdr_color("normals"),
                AttachmentRequest::hdr_color("final"),
            ],
            presentation_attachment: "final".to_string(),
            ..RendererCaps::default()
        }));
        step(&mut engine);
        let frame = engine.last_frame_context().unwrap();
        assert_eq!(frame.color.as_ref().unwrap().name, "final");
        assert_eq!(frame.attachments.len(), 2);
    }

    #[test]
    fn blit_without_color_attachment_fails_init() {
        clear_journal();
        let mut engine = TestEngine::new(config());
        engine
            .set_renderer(with_caps(RendererCaps {
                color_attachments: Vec::new(),
                ..RendererCaps::default()
            }))
            .unwrap();
        assert!(matches!(engine.init(), Err(EngineError::Capabilities(_))));
        assert!(!engine.state().initialized);
        assert!(!journal().iter().any(|c| matches!(c, Call::CreateSwapchain { .. })));

        // Partial init is still released.
        engine.cleanup();
        assert!(engine.backend().is_none());
    }

    #[test]
    fn renderer_errors_stop_the_iteration() {
        let mut renderer = ClearRenderer::new(CLEAR);
        renderer.fail_at = Some(1);
        let mut engine = engine_with(renderer);

        step(&mut engine);
        clear_journal();
        let err = engine.run_iteration().unwrap_err();
        assert!(matches!(err, EngineError::Renderer(_)));
        assert!(err.to_string().contains("pipeline missing"));
        assert!(!journal().iter().any(|c| matches!(c, Call::Submit { .. })));
        assert_eq!(engine.frame_number(), 1);
    }

    #[test]
    fn close_request_ends_the_loop() {
        let mut engine = engine();
        step(&mut engine);
        push_event(&mut engine, PlatformEvent::Window(WindowEvent::CloseRequested));
        assert_eq!(step(&mut engine), IterationOutcome::Exit);
        assert!(!engine.state().running);
        assert!(journal().contains(&Call::Renderer("on_event")));
    }

    #[test]
    fn run_returns_after_quit_event() {
        let mut engine = engine();
        push_event(&mut engine, PlatformEvent::Quit);
        engine.run().unwrap();
        assert!(!engine.state().running);
        assert_eq!(engine.frame_number(), 0);
    }

    #[test]
    fn exit_handle_stops_run_from_outside() {
        let mut engine = engine();
        let handle = engine.exit_handle();
        assert!(!handle.is_requested());
        handle.request_exit();
        assert!(engine.exit_handle().is_requested());
        engine.run().unwrap();
        assert!(!journal().iter().any(Call::is_frame_gpu_work));
    }

    #[test]
    fn reload_assets_waits_for_idle_first() {
        let mut engine = engine();
        engine.reload_assets().unwrap();
        assert_eq!(
            journal(),
            vec![Call::WaitIdle, Call::Renderer("reload_assets")]
        );
        assert_eq!(engine.renderer_stats().draw_calls, 1);
        engine.device_wait_idle().unwrap();
    }
}
