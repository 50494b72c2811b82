// Application - window + renderer lifecycle
//
// The window is lent to the renderer only while it is being built; after
// that the application owns both and drives them once per frame.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};

use super::{DesktopWindow, Ref, Window};
use crate::config::Config;
use crate::gfx::{CommandList, CommandQueue, GraphicsDevice, QueueFlags, Renderer, RendererBackend};

pub struct Application {
    // Renderer first: its surface must go before the window
    renderer: Ref<Renderer>,
    window: DesktopWindow,
    config: Config,
    frame_count: u32,
    last_fps_time: Instant,
}

impl Application {
    pub fn new(config: Config) -> Result<Self> {
        let window = DesktopWindow::new(&config.window)?;
        let renderer =
            Renderer::create_by_name(&config.renderer.api, Some(&window as &dyn Window), &config)?
                .with_context(|| format!("Unknown renderer API '{}'", config.renderer.api))?;

        Ok(Self {
            renderer,
            window,
            config,
            frame_count: 0,
            last_fps_time: Instant::now(),
        })
    }

    /// Run until the window asks to close.
    pub fn run(&mut self) -> Result<()> {
        log::info!(
            "Running {} ({}x{})",
            self.renderer.info(),
            self.window.width(),
            self.window.height()
        );

        while !self.window.should_close() {
            self.window.update();

            match &*self.renderer {
                Renderer::Vulkan(renderer) => frame(renderer)?,
            }

            self.update_fps();
        }

        log::info!("Window closed, draining queues...");
        self.shutdown()
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let elapsed = self.last_fps_time.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frame_count as f64 / elapsed.as_secs_f64();
            log::info!("FPS: {:.1}", fps);
            self.frame_count = 0;
            self.last_fps_time = Instant::now();
        }
    }

    fn shutdown(&self) -> Result<()> {
        match &*self.renderer {
            Renderer::Vulkan(renderer) => {
                drain(renderer)?;
                for queue in renderer.device().queues() {
                    log::debug!("Queue family {}: {:?}", queue.family(), queue.stats());
                }
            }
        }
        self.renderer.wait_idle()
    }
}

/// Record and submit one empty list on the graphics queue.
fn frame<R: RendererBackend>(renderer: &R) -> Result<()> {
    let device = renderer.device();
    if !device.has_queue(QueueFlags::GRAPHICS) {
        return Ok(());
    }

    let queue = device.queue(QueueFlags::GRAPHICS)?;
    let mut list = queue.release()?;
    list.begin()?;
    list.end()?;
    queue.submit(list, false)
}

fn drain<R: RendererBackend>(renderer: &R) -> Result<()> {
    renderer
        .device()
        .queues()
        .iter()
        .try_for_each(|queue| queue.wait())
}
