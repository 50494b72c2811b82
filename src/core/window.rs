// Window - presentation target collaborator
//
// The renderer only ever asks a window four things: which instance
// extensions it needs, to create a surface, whether it should close, and
// its size. `DesktopWindow` answers them with winit, pumping events on
// `update` instead of handing control to an event loop.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Fullscreen, WindowAttributes, WindowId},
};

use crate::backend::surface;
use crate::config::WindowConfig;

pub trait Window {
    /// Instance extensions without which no presentable surface exists.
    fn required_extensions(&self) -> Result<Vec<String>>;

    /// Create a surface on `instance`. `Ok(None)` when the window cannot
    /// present (e.g. headless).
    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<Option<vk::SurfaceKHR>>;

    fn should_close(&self) -> bool;

    /// Process pending platform events.
    fn update(&mut self);

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// winit-side state; receives events while `DesktopWindow` pumps.
struct WindowState {
    attributes: WindowAttributes,
    window: Option<winit::window::Window>,
    size: PhysicalSize<u32>,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                self.size = window.inner_size();
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.close_requested = true;
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.size = size;
            }
            _ => {}
        }
    }
}

/// Desktop window backed by winit.
pub struct DesktopWindow {
    // The window must go before the event loop that owns its connection
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl DesktopWindow {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        log::info!(
            "Creating window: {}, {}x{}",
            config.title,
            config.width,
            config.height
        );

        let mut attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let event_loop = EventLoop::new().context("Failed to create event loop")?;
        let mut window = Self {
            state: WindowState {
                attributes,
                window: None,
                size: PhysicalSize::new(config.width, config.height),
                close_requested: false,
            },
            event_loop,
        };

        // The platform hands out the window on the first resume
        while window.state.window.is_none() && !window.state.close_requested {
            window.update();
        }

        if window.state.window.is_none() {
            anyhow::bail!("Failed to create window");
        }
        Ok(window)
    }

    fn handle(&self) -> Result<&winit::window::Window> {
        self.state.window.as_ref().context("Window not created")
    }
}

impl Window for DesktopWindow {
    fn required_extensions(&self) -> Result<Vec<String>> {
        let display = self
            .handle()?
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        Ok(surface::required_extensions(display)?
            .into_iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<Option<vk::SurfaceKHR>> {
        let window = self.handle()?;
        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        // The window lives in `self`, which outlives the renderer's use of it
        let surface = unsafe { surface::create_surface(entry, instance, display, handle) }?;
        Ok(Some(surface))
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn update(&mut self) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);
        if let PumpStatus::Exit(code) = status {
            log::info!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
    }

    fn width(&self) -> u32 {
        self.state.size.width
    }

    fn height(&self) -> u32 {
        self.state.size.height
    }
}
