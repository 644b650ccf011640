//! Demo window backed by winit.
//!
//! Drives an [`InteropRing`] over the wgpu backend: every frame maps the
//! current slot, runs the [`PatternKernel`] on each partition, unmaps,
//! swaps and presents the slot just produced. The ring is resized with the
//! window.
//!
//! ```no_run
//! # use interop_ring::Viewer;
//! Viewer::builder().with_title("Interop Ring").build().run().unwrap();
//! ```

use std::{sync::Arc, time::Duration};

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::{
    error::InteropError,
    gpu::{
        GpuContextError, GpuDevices, PatternKernel, WgpuCompute, WgpuDisplay,
        WgpuError, WgpuStream,
    },
    options::InteropOptions,
    pipeline::DeviceId,
    ring::{InteropRing, PresentError},
    util::frame_timing::FrameTiming,
};

// ── Builder ──────────────────────────────────────────────────────────────

/// Fluent builder for [`Viewer`].
pub struct ViewerBuilder {
    options: Option<InteropOptions>,
    title: String,
}

impl ViewerBuilder {
    fn new() -> Self {
        Self {
            options: None,
            title: "Interop Ring".into(),
        }
    }

    /// Override the default options.
    #[must_use]
    pub fn with_options(mut self, options: InteropOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the window title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Consume the builder and produce a [`Viewer`].
    #[must_use]
    pub fn build(self) -> Viewer {
        Viewer {
            options: self.options.unwrap_or_default(),
            title: self.title,
        }
    }
}

// ── Viewer ───────────────────────────────────────────────────────────────

/// A window that shows the ring's output.
///
/// Construct via [`Viewer::builder`], then call [`run`](Self::run) to
/// enter the event loop.
pub struct Viewer {
    options: InteropOptions,
    title: String,
}

impl Viewer {
    /// Start a new builder.
    #[must_use]
    pub fn builder() -> ViewerBuilder {
        ViewerBuilder::new()
    }

    /// Open the window and run the event loop. Blocks until the window is
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`InteropError::Viewer`] if the event loop fails.
    pub fn run(self) -> Result<(), InteropError> {
        let event_loop =
            EventLoop::new().map_err(|e| InteropError::Viewer(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = ViewerApp {
            window: None,
            demo: None,
            options: self.options,
            title: self.title,
            timing: FrameTiming::new(0, Duration::from_secs(2)),
        };

        event_loop
            .run_app(&mut app)
            .map_err(|e| InteropError::Viewer(e.to_string()))
    }
}

// ── Demo state ───────────────────────────────────────────────────────────

type WgpuRing = InteropRing<WgpuDisplay, WgpuCompute>;

struct Demo {
    ring: WgpuRing,
    kernel: PatternKernel,
    devices: GpuDevices,
    frame: u32,
}

fn viewer_error(e: impl std::fmt::Display) -> InteropError {
    InteropError::Viewer(e.to_string())
}

impl Demo {
    fn new(
        window: Arc<Window>,
        options: &InteropOptions,
    ) -> Result<Self, InteropError> {
        let (width, height) = viewport_size(window.inner_size());

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(GpuContextError::SurfaceCreation)?;
        let devices = pollster::block_on(GpuDevices::open(
            &instance,
            &options.devices,
            Some(&surface),
        ))?;
        for gpu in devices.iter() {
            log::info!("{}: {} ({:?})", gpu.id, gpu.info.name, gpu.info.backend);
        }

        let ring_devices = if options.ring.multi_gpu {
            devices.ids()
        } else {
            vec![DeviceId(0)]
        };
        let display =
            WgpuDisplay::with_surface(devices.clone(), surface, (width, height))
                .map_err(viewer_error)?;
        let compute = WgpuCompute::new(devices.clone());
        let kernel = PatternKernel::new(&compute, options.compute.access);
        let ring =
            InteropRing::with_options(display, compute, ring_devices, options)?;

        let mut demo = Self {
            ring,
            kernel,
            devices,
            frame: 0,
        };
        demo.resize(width, height)?;
        Ok(demo)
    }

    /// Resize the surface and the ring, then clear every slot.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), InteropError> {
        self.ring.display_mut().resize_surface(width, height);
        self.ring.resize(width, height)?;
        for _ in 0..self.ring.slot_count() {
            self.ring.clear()?;
            self.ring.swap()?;
        }
        Ok(())
    }

    fn dispatch(&self) -> Result<(), InteropError> {
        let (width, _) = self.ring.get_size();
        for part in self.ring.array_get()? {
            self.kernel
                .dispatch(&self.devices, &part, width, self.frame)
                .map_err(viewer_error)?;
        }
        Ok(())
    }

    /// map → kernel → unmap → swap → blit.
    fn render(&mut self) -> Result<(), InteropError> {
        self.ring.map(&WgpuStream)?;
        let dispatched = self.dispatch();
        self.ring.unmap(&WgpuStream)?;
        dispatched?;
        self.ring.swap()?;
        self.ring.blit()?;
        self.frame = self.frame.wrapping_add(1);
        Ok(())
    }
}

/// Whether `err` means the surface must be reconfigured.
fn surface_lost(err: &InteropError) -> bool {
    let InteropError::Present(PresentError::Blit { source, .. }) = err else {
        return false;
    };
    matches!(
        source.downcast_ref::<WgpuError>(),
        Some(WgpuError::Surface(
            wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost
        ))
    )
}

/// The ring covers the whole window.
fn viewport_size(inner: winit::dpi::PhysicalSize<u32>) -> (u32, u32) {
    (inner.width.max(1), inner.height.max(1))
}

// ── Winit app ────────────────────────────────────────────────────────────

/// Internal winit application handler.
struct ViewerApp {
    window: Option<Arc<Window>>,
    demo: Option<Demo>,
    options: InteropOptions,
    title: String,
    timing: FrameTiming,
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(winit::dpi::LogicalSize::new(960, 540));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match Demo::new(Arc::clone(&window), &self.options) {
            Ok(demo) => self.demo = Some(demo),
            Err(e) => {
                log::error!("Failed to initialize interop ring: {e}");
                event_loop.exit();
                return;
            }
        }

        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        if matches!(event, WindowEvent::CloseRequested) {
            log::info!("closing after {} frame(s)", self.timing.frames());
            // Release the ring before the surface's window goes away.
            self.demo = None;
            event_loop.exit();
            return;
        }

        let (Some(window), Some(demo)) = (&self.window, &mut self.demo) else {
            return;
        };

        match event {
            WindowEvent::Resized(size) => {
                let (w, h) = viewport_size(size);
                if let Err(e) = demo.resize(w, h) {
                    log::warn!("resize to {w}x{h} failed: {e}");
                }
            }
            WindowEvent::RedrawRequested => {
                if self.timing.should_render() {
                    match demo.render() {
                        Ok(()) => {
                            if let Some(fps) = self.timing.end_frame() {
                                log::info!("{fps:.1} fps");
                            }
                        }
                        Err(e) if surface_lost(&e) => {
                            let (w, h) = viewport_size(window.inner_size());
                            demo.ring.display_mut().resize_surface(w, h);
                        }
                        Err(e) => log::error!("render error: {e}"),
                    }
                }
                window.request_redraw();
            }
            _ => (),
        }
    }
}
