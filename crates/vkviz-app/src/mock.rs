//! Journaling test doubles for the platform, backend, renderer, and UI seams.
//!
//! Every call lands in a thread-local journal, so each test (one thread per
//! test) sees only its own calls. The backend also simulates image
//! contents: clears write a color into an image, blits copy it, and present
//! records what reached the screen.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use ash::vk::{self, Handle};
use vkviz_gpu::{AcquireOutcome, AttachmentView, PresentOutcome};
use vkviz_platform::{Platform, PlatformConfig, PlatformEvent};

use crate::backend::{FrameTargets, RenderBackend};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::frame::FrameContext;
use crate::renderer::{Renderer, RendererCaps, RendererStats};
use crate::ui::{OverlayTarget, UiOverlay, UiPanel};

pub const SWAPCHAIN_IMAGES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PlatformCreate { width: u32, height: u32 },
    WaitEvents,
    BackendCreate,
    CreateSwapchain { width: u32, height: u32 },
    DestroySwapchain,
    CreateOffscreen { width: u32, height: u32 },
    DestroyOffscreen,
    CreateFrames(usize),
    DestroyFrames,
    WaitIdle,
    WaitTimeline(u64),
    Acquire { slot: usize },
    BeginCommands { slot: usize },
    PrepareAttachments,
    Blit { image_index: u32 },
    TransitionForCompose { image_index: u32 },
    FinishForPresent { image_index: u32 },
    Submit { slot: usize, value: u64 },
    Present { slot: usize, image_index: u32 },
    Renderer(&'static str),
    Ui(&'static str),
}

impl Call {
    /// Calls that touch the GPU queue or swapchain during a frame.
    pub fn is_frame_gpu_work(&self) -> bool {
        matches!(
            self,
            Self::WaitTimeline(_)
                | Self::Acquire { .. }
                | Self::BeginCommands { .. }
                | Self::PrepareAttachments
                | Self::Blit { .. }
                | Self::TransitionForCompose { .. }
                | Self::FinishForPresent { .. }
                | Self::Submit { .. }
                | Self::Present { .. }
        )
    }
}

thread_local! {
    static JOURNAL: RefCell<Vec<Call>> = const { RefCell::new(Vec::new()) };
}

pub fn record(call: Call) {
    JOURNAL.with(|journal| journal.borrow_mut().push(call));
}

pub fn journal() -> Vec<Call> {
    JOURNAL.with(|journal| journal.borrow().clone())
}

pub fn clear_journal() {
    JOURNAL.with(|journal| journal.borrow_mut().clear());
}

/// Platform with a scripted event queue and a settable window size.
pub struct MockPlatform {
    pub size: (u32, u32),
    pub pending: VecDeque<PlatformEvent>,
}

impl MockPlatform {
    pub fn push_event(&mut self, event: PlatformEvent) {
        self.pending.push_back(event);
    }
}

impl Platform for MockPlatform {
    fn create(config: &PlatformConfig) -> vkviz_platform::Result<Self> {
        record(Call::PlatformCreate {
            width: config.width,
            height: config.height,
        });
        Ok(Self {
            size: (config.width, config.height),
            pending: VecDeque::new(),
        })
    }

    fn poll_events(&mut self, events: &mut Vec<PlatformEvent>) -> vkviz_platform::Result<()> {
        events.extend(self.pending.drain(..));
        Ok(())
    }

    fn wait_events(
        &mut self,
        _timeout: Duration,
        events: &mut Vec<PlatformEvent>,
    ) -> vkviz_platform::Result<()> {
        record(Call::WaitEvents);
        events.extend(self.pending.drain(..));
        Ok(())
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.size
    }
}

/// Device double holding simulated image contents.
#[derive(Default)]
pub struct MockDevice {
    contents: RefCell<HashMap<u64, [f32; 4]>>,
    presented: RefCell<Vec<[f32; 4]>>,
    hooks: RefCell<Vec<&'static str>>,
}

impl MockDevice {
    /// Simulated `vkCmdClearColorImage`.
    pub fn clear_image(&self, image: vk::Image, color: [f32; 4]) {
        self.contents.borrow_mut().insert(image.as_raw(), color);
    }

    pub fn contents(&self, image: vk::Image) -> Option<[f32; 4]> {
        self.contents.borrow().get(&image.as_raw()).copied()
    }

    /// Record that a renderer hook reached the device.
    pub fn note_hook(&self, hook: &'static str) {
        self.hooks.borrow_mut().push(hook);
    }

    pub fn hooks(&self) -> Vec<&'static str> {
        self.hooks.borrow().clone()
    }

    /// Contents of every presented image, in present order.
    pub fn presented(&self) -> Vec<[f32; 4]> {
        self.presented.borrow().clone()
    }
}

fn swapchain_image(index: u32) -> vk::Image {
    vk::Image::from_raw(0x1000 + u64::from(index))
}

fn swapchain_view(index: u32) -> vk::ImageView {
    vk::ImageView::from_raw(0x2000 + u64::from(index))
}

struct MockOffscreen {
    extent: vk::Extent2D,
    color: Vec<AttachmentView>,
    presentation: Option<usize>,
    depth: Option<AttachmentView>,
}

/// Backend double. Swapchain images and views get fixed fake handles;
/// offscreen images get fresh handles on every creation.
pub struct MockBackend {
    device: MockDevice,
    swapchain: Option<vk::Extent2D>,
    offscreen: Option<MockOffscreen>,
    next_handle: u64,
    next_image: u32,
    slot_count: usize,
    /// Results returned by the next acquires, before falling back to success.
    pub acquire_results: VecDeque<AcquireOutcome>,
    /// Results returned by the next presents, before falling back to success.
    pub present_results: RefCell<VecDeque<PresentOutcome>>,
    /// Pending images acquired but not yet presented, by slot.
    acquired: RefCell<HashMap<usize, u32>>,
}

impl MockBackend {
    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.swapchain
    }

    pub fn offscreen_extent(&self) -> Option<vk::Extent2D> {
        self.offscreen.as_ref().map(|o| o.extent)
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn fresh_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn attachment(&mut self, name: &str, layout: vk::ImageLayout) -> AttachmentView {
        let handle = self.fresh_handle();
        AttachmentView {
            name: name.to_string(),
            image: vk::Image::from_raw(handle),
            view: vk::ImageView::from_raw(handle),
            format: vk::Format::R16G16B16A16_SFLOAT,
            aspect: vk::ImageAspectFlags::COLOR,
            layout,
        }
    }
}

impl RenderBackend<MockPlatform> for MockBackend {
    type Device = MockDevice;

    fn create(_platform: &MockPlatform, _config: &EngineConfig) -> EngineResult<Self> {
        record(Call::BackendCreate);
        Ok(Self {
            device: MockDevice::default(),
            swapchain: None,
            offscreen: None,
            next_handle: 0,
            next_image: 0,
            slot_count: 0,
            acquire_results: VecDeque::new(),
            present_results: RefCell::new(VecDeque::new()),
            acquired: RefCell::new(HashMap::new()),
        })
    }

    fn device(&self) -> &MockDevice {
        &self.device
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> EngineResult<vk::Extent2D> {
        record(Call::CreateSwapchain { width, height });
        let extent = vk::Extent2D { width, height };
        self.swapchain = Some(extent);
        Ok(extent)
    }

    fn destroy_swapchain(&mut self) -> EngineResult<()> {
        if self.swapchain.take().is_some() {
            record(Call::DestroySwapchain);
        }
        Ok(())
    }

    fn create_offscreen(&mut self, extent: vk::Extent2D, caps: &RendererCaps) -> EngineResult<()> {
        record(Call::CreateOffscreen {
            width: extent.width,
            height: extent.height,
        });
        if !caps.uses_offscreen() {
            return Ok(());
        }
        let color: Vec<AttachmentView> = caps
            .color_attachments
            .iter()
            .map(|request| self.attachment(&request.name, request.initial_layout))
            .collect();
        let presentation = vkviz_gpu::offscreen::resolve_presentation(
            &caps.color_attachments,
            &caps.presentation_attachment,
        );
        let depth = caps
            .depth_attachment
            .as_ref()
            .map(|request| self.attachment(&request.name, request.initial_layout));
        self.offscreen = Some(MockOffscreen {
            extent,
            color,
            presentation,
            depth,
        });
        Ok(())
    }

    fn destroy_offscreen(&mut self) -> EngineResult<()> {
        if self.offscreen.take().is_some() {
            record(Call::DestroyOffscreen);
        }
        Ok(())
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.unwrap_or_default()
    }

    fn swapchain_image_count(&self) -> u32 {
        SWAPCHAIN_IMAGES
    }

    fn swapchain_format(&self) -> vk::Format {
        vk::Format::B8G8R8A8_UNORM
    }

    fn create_frames(&mut self, slot_count: usize) -> EngineResult<()> {
        record(Call::CreateFrames(slot_count));
        self.slot_count = slot_count;
        Ok(())
    }

    fn destroy_frames(&mut self) {
        if self.slot_count > 0 {
            record(Call::DestroyFrames);
            self.slot_count = 0;
        }
    }

    fn wait_idle(&self) -> EngineResult<()> {
        record(Call::WaitIdle);
        Ok(())
    }

    fn wait_timeline(&self, value: u64) -> EngineResult<()> {
        record(Call::WaitTimeline(value));
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> EngineResult<AcquireOutcome> {
        record(Call::Acquire { slot });
        if let Some(outcome) = self.acquire_results.pop_front() {
            return Ok(outcome);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % SWAPCHAIN_IMAGES;
        self.acquired.borrow_mut().insert(slot, index);
        Ok(AcquireOutcome::Acquired(index))
    }

    fn begin_commands(&self, slot: usize) -> EngineResult<vk::CommandBuffer> {
        record(Call::BeginCommands { slot });
        Ok(vk::CommandBuffer::from_raw(0x3000 + slot as u64))
    }

    fn frame_targets(&self, image_index: u32) -> EngineResult<FrameTargets> {
        let mut targets = FrameTargets {
            extent: self.extent(),
            swapchain_image: swapchain_image(image_index),
            swapchain_view: swapchain_view(image_index),
            swapchain_format: self.swapchain_format(),
            ..FrameTargets::default()
        };
        if let Some(offscreen) = &self.offscreen {
            targets.color = offscreen.color.clone();
            targets.presentation = offscreen
                .presentation
                .and_then(|i| offscreen.color.get(i).cloned());
            targets.depth = offscreen.depth.clone();
        }
        Ok(targets)
    }

    fn prepare_attachments(&self, _cmd: vk::CommandBuffer) -> EngineResult<()> {
        record(Call::PrepareAttachments);
        Ok(())
    }

    fn blit_to_swapchain(&self, _cmd: vk::CommandBuffer, image_index: u32) -> EngineResult<()> {
        record(Call::Blit { image_index });
        let source = self
            .offscreen
            .as_ref()
            .and_then(|o| o.presentation.and_then(|i| o.color.get(i)))
            .and_then(|a| self.device.contents(a.image));
        if let Some(color) = source {
            self.device.clear_image(swapchain_image(image_index), color);
        }
        Ok(())
    }

    fn transition_for_compose(
        &self,
        _cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> EngineResult<()> {
        record(Call::TransitionForCompose { image_index });
        Ok(())
    }

    fn finish_for_present(&self, _cmd: vk::CommandBuffer, image_index: u32) -> EngineResult<()> {
        record(Call::FinishForPresent { image_index });
        Ok(())
    }

    fn submit(&self, slot: usize, _cmd: vk::CommandBuffer, signal_value: u64) -> EngineResult<()> {
        record(Call::Submit {
            slot,
            value: signal_value,
        });
        Ok(())
    }

    fn present(&self, slot: usize, image_index: u32) -> EngineResult<PresentOutcome> {
        record(Call::Present { slot, image_index });
        self.acquired.borrow_mut().remove(&slot);
        let content = self
            .device
            .contents(swapchain_image(image_index))
            .unwrap_or_default();
        self.device.presented.borrow_mut().push(content);
        Ok(self
            .present_results
            .borrow_mut()
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }
}

/// Renderer double that clears the presentation attachment to a fixed color.
pub struct ClearRenderer {
    pub clear: [f32; 4],
    pub caps: Option<RendererCaps>,
    /// Extent of every frame context seen by `record_graphics`.
    pub extents: Rc<RefCell<Vec<vk::Extent2D>>>,
    /// Frame context handed to each `on_event` call.
    pub event_frames: Rc<RefCell<Vec<Option<FrameContext>>>>,
    /// Fail `record_graphics` at this frame number.
    pub fail_at: Option<u64>,
}

impl ClearRenderer {
    pub fn new(clear: [f32; 4]) -> Self {
        Self {
            clear,
            caps: None,
            extents: Rc::new(RefCell::new(Vec::new())),
            event_frames: Rc::new(RefCell::new(Vec::new())),
            fail_at: None,
        }
    }
}

impl Renderer<MockDevice> for ClearRenderer {
    fn negotiate_capabilities(&mut self, device: Option<&MockDevice>, caps: &mut RendererCaps) {
        record(Call::Renderer(if device.is_some() {
            "negotiate_with_device"
        } else {
            "negotiate"
        }));
        if let Some(requested) = &self.caps {
            *caps = requested.clone();
        }
    }

    fn initialize(
        &mut self,
        _device: &MockDevice,
        _caps: &RendererCaps,
        _extent: vk::Extent2D,
    ) -> anyhow::Result<()> {
        record(Call::Renderer("initialize"));
        Ok(())
    }

    fn destroy(&mut self, _device: &MockDevice) {
        record(Call::Renderer("destroy"));
    }

    fn on_swapchain_ready(&mut self, _device: &MockDevice, _extent: vk::Extent2D) -> anyhow::Result<()> {
        record(Call::Renderer("on_swapchain_ready"));
        Ok(())
    }

    fn on_swapchain_destroy(&mut self, _device: &MockDevice) {
        record(Call::Renderer("on_swapchain_destroy"));
    }

    fn update(&mut self, device: &MockDevice, _frame: &FrameContext) -> anyhow::Result<()> {
        record(Call::Renderer("update"));
        device.note_hook("update");
        Ok(())
    }

    fn record_compute(
        &mut self,
        _cmd: vk::CommandBuffer,
        _device: &MockDevice,
        _frame: &FrameContext,
    ) -> anyhow::Result<()> {
        record(Call::Renderer("record_compute"));
        Ok(())
    }

    fn record_graphics(
        &mut self,
        _cmd: vk::CommandBuffer,
        device: &MockDevice,
        frame: &FrameContext,
    ) -> anyhow::Result<()> {
        record(Call::Renderer("record_graphics"));
        if self.fail_at == Some(frame.frame_number) {
            anyhow::bail!("pipeline missing");
        }
        self.extents.borrow_mut().push(frame.extent);
        if let Some(color) = &frame.color {
            device.clear_image(color.image, self.clear);
        }
        Ok(())
    }

    fn compose(
        &mut self,
        _cmd: vk::CommandBuffer,
        device: &MockDevice,
        frame: &FrameContext,
    ) -> anyhow::Result<()> {
        record(Call::Renderer("compose"));
        device.clear_image(frame.swapchain_image, self.clear);
        Ok(())
    }

    fn on_event(&mut self, device: &MockDevice, _event: &PlatformEvent, frame: Option<&FrameContext>) {
        record(Call::Renderer("on_event"));
        device.note_hook("on_event");
        self.event_frames.borrow_mut().push(frame.cloned());
    }

    fn on_ui(&mut self, device: &MockDevice, _frame: &FrameContext) {
        record(Call::Renderer("on_ui"));
        device.note_hook("on_ui");
    }

    fn reload_assets(&mut self, _device: &MockDevice) -> anyhow::Result<()> {
        record(Call::Renderer("reload_assets"));
        Ok(())
    }

    fn stats(&self) -> RendererStats {
        RendererStats {
            draw_calls: 1,
            ..RendererStats::default()
        }
    }
}

/// UI double.
#[derive(Default)]
pub struct MockUi {
    pub panels: usize,
    pub min_image_count: Rc<RefCell<u32>>,
}

impl UiOverlay<MockDevice> for MockUi {
    fn attach(&mut self, _device: &MockDevice, _format: vk::Format, image_count: u32) -> anyhow::Result<()> {
        record(Call::Ui("attach"));
        *self.min_image_count.borrow_mut() = image_count;
        Ok(())
    }

    fn begin_frame(&mut self, _frame: &FrameContext) {
        record(Call::Ui("begin_frame"));
    }

    fn process_event(&mut self, _event: &PlatformEvent) {
        record(Call::Ui("process_event"));
    }

    fn add_panel(&mut self, _panel: UiPanel) {
        record(Call::Ui("add_panel"));
        self.panels += 1;
    }

    fn render_overlay(
        &mut self,
        _cmd: vk::CommandBuffer,
        _device: &MockDevice,
        target: &OverlayTarget,
    ) -> anyhow::Result<()> {
        assert_eq!(target.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        record(Call::Ui("render_overlay"));
        Ok(())
    }

    fn set_min_image_count(&mut self, count: u32) {
        record(Call::Ui("set_min_image_count"));
        *self.min_image_count.borrow_mut() = count;
    }

    fn shutdown(&mut self, _device: &MockDevice) {
        record(Call::Ui("shutdown"));
    }
}
