// =============================================================================
// VULKAN TRIANGLE - ordered bring-up and teardown of a minimal Vulkan context
// =============================================================================
//
// The whole program is one fixed sequence:
//
//   window -> instance (+ debug messenger) -> surface -> physical device
//   -> logical device -> swapchain -> image views -> render pass
//   -> graphics pipeline -> framebuffers -> command pool -> command buffers
//
// then a poll-only event loop, then teardown in exact reverse order. The
// command buffers are recorded once and never submitted; there is no frame
// loop and no synchronization. Each step's post-condition is the next step's
// precondition, so the first failure aborts the remainder and unwinds
// whatever already exists.
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use backend::{pick_physical_device, pipeline, Device, InitError, Instance, Surface, Swapchain};
use config::Config;
use std::process::ExitCode;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    init_logging();

    // Load configuration from config.toml
    let config = Config::load();
    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{} (\"{}\")",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {:?}", e);
            return ExitCode::FAILURE;
        }
    };
    // Poll continuously; every iteration services events and checks for close
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {:?}", e);
        return ExitCode::FAILURE;
    }

    // Initialization failures surface here so the process exits non-zero
    match app.init_error.take() {
        Some(error) => {
            log::error!("{:#}", error);
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding all Vulkan resources.
///
/// IMPORTANT: Field order matters for Drop! The raw handles are destroyed
/// explicitly in drop(); after that the wrappers go down in declaration
/// order, and the Arc chain (swapchain -> device/surface -> instance) turns
/// that into the required reverse-of-creation order. The window is declared
/// last so it outlives the surface.
struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    device: Option<Arc<Device>>,
    swapchain: Option<Swapchain>,

    // ─────────────────────────────────────────────────────────────────────────
    // PIPELINE
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: Option<vk::RenderPass>,
    pipeline_layout: Option<vk::PipelineLayout>,
    pipeline: Option<vk::Pipeline>,
    framebuffers: Vec<vk::Framebuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // COMMANDS
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: Option<vk::CommandPool>,
    /// One pre-recorded command buffer per framebuffer
    command_buffers: Vec<vk::CommandBuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW & EXIT STATE
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    /// First initialization failure, drained by main for the exit status
    init_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            device: None,
            swapchain: None,
            render_pass: None,
            pipeline_layout: None,
            pipeline: None,
            framebuffers: Vec::new(),
            command_pool: None,
            command_buffers: Vec::new(),
            window: None,
            init_error: None,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Build the whole Vulkan context in dependency order.
    ///
    /// Every resource is committed into `self` (or held alive by the Arc
    /// chain) the moment it exists, so a failure at any later step still
    /// releases everything already acquired when the App drops.
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        // Validation is a debug-build concern; release builds never touch it
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation;
        let layers = &self.config.debug.validation_layers;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance (+ debug messenger when validating)
        // ─────────────────────────────────────────────────────────────────────
        let instance = Arc::new(Instance::new(
            window.as_ref(),
            &self.config.window.title,
            layers,
            enable_validation,
        )?);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Surface
        // ─────────────────────────────────────────────────────────────────────
        let surface = Arc::new(Surface::new(instance.clone(), window.as_ref())?);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Physical device + queue families
        // ─────────────────────────────────────────────────────────────────────
        let (physical_device, families) = pick_physical_device(&instance, &surface)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Logical device + queues
        // ─────────────────────────────────────────────────────────────────────
        let device = Device::new(
            instance,
            physical_device,
            families,
            layers,
            enable_validation,
        )?;
        self.device = Some(device.clone());

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Swapchain + image views
        // ─────────────────────────────────────────────────────────────────────
        let size = window.inner_size();
        let swapchain = Swapchain::new(device.clone(), surface, size.width, size.height)?;
        let format = swapchain.format;
        let extent = swapchain.extent;
        let image_views = swapchain.image_views.clone();
        self.swapchain = Some(swapchain);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Render pass
        // ─────────────────────────────────────────────────────────────────────
        let render_pass = pipeline::create_render_pass(&device, format)?;
        self.render_pass = Some(render_pass);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 7: Pipeline layout, then the pipeline itself
        // ─────────────────────────────────────────────────────────────────────
        let pipeline_layout = pipeline::create_pipeline_layout(&device)?;
        self.pipeline_layout = Some(pipeline_layout);

        let graphics_pipeline = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            pipeline_layout,
            extent,
            &self.config.graphics.vertex_shader,
            &self.config.graphics.fragment_shader,
        )?;
        self.pipeline = Some(graphics_pipeline);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 8: Framebuffers, committed one at a time
        // ─────────────────────────────────────────────────────────────────────
        for &view in &image_views {
            let framebuffer = pipeline::create_framebuffer(&device, render_pass, view, extent)?;
            self.framebuffers.push(framebuffer);
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 9: Command pool + pre-recorded command buffers
        // ─────────────────────────────────────────────────────────────────────
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.families.graphics);
        let command_pool = unsafe { device.handle.create_command_pool(&pool_info, None) }
            .map_err(InitError::vulkan("creating the command pool"))?;
        self.command_pool = Some(command_pool);

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(self.framebuffers.len() as u32);
        self.command_buffers = unsafe { device.handle.allocate_command_buffers(&alloc_info) }
            .map_err(InitError::vulkan("allocating command buffers"))?;

        self.record_command_buffers(&device, extent)?;

        log::info!("Vulkan initialized successfully");
        Ok(())
    }

    // =========================================================================
    // COMMAND RECORDING
    // =========================================================================

    /// Record every command buffer exactly once, at startup.
    ///
    /// One buffer per framebuffer: begin the render pass with the configured
    /// clear color, bind the pipeline, set the dynamic viewport and line
    /// width, draw the three vertices, end. Nothing ever re-records these.
    fn record_command_buffers(&self, device: &Device, extent: vk::Extent2D) -> Result<()> {
        let render_pass = self.render_pass.context("Render pass not initialized")?;
        let graphics_pipeline = self.pipeline.context("Pipeline not initialized")?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.config.graphics.clear_color,
            },
        }];

        let viewports = [vk::Viewport::default()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)];

        for (i, &cmd) in self.command_buffers.iter().enumerate() {
            let framebuffer = self.framebuffers[i];

            unsafe {
                let begin_info = vk::CommandBufferBeginInfo::default();
                device
                    .handle
                    .begin_command_buffer(cmd, &begin_info)
                    .map_err(InitError::vulkan("beginning a command buffer"))?;

                let render_pass_info = vk::RenderPassBeginInfo::default()
                    .render_pass(render_pass)
                    .framebuffer(framebuffer)
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent,
                    })
                    .clear_values(&clear_values);

                device
                    .handle
                    .cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device
                    .handle
                    .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, graphics_pipeline);

                // Dynamic state is set here once and never re-specified
                device.handle.cmd_set_viewport(cmd, 0, &viewports);
                device.handle.cmd_set_line_width(cmd, 1.0);

                device.handle.cmd_draw(cmd, 3, 1, 0, 0);
                device.handle.cmd_end_render_pass(cmd);
                device
                    .handle
                    .end_command_buffer(cmd)
                    .map_err(InitError::vulkan("ending a command buffer"))?;
            }
        }

        log::info!("Recorded {} command buffers", self.command_buffers.len());
        Ok(())
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Fixed-size window: nothing reacts to a resize, so don't allow one
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.init_error = Some(anyhow::Error::new(e).context("creating the window"));
                event_loop.exit();
                return;
            }
        };

        // Commit the window before any Vulkan object exists. The surface must
        // be destroyed before the window it was created from, and field drop
        // order only guarantees that once the window actually lives in
        // `self`, including when initialization fails partway through.
        self.window = Some(window.clone());

        if let Err(e) = self.init_vulkan(window) {
            log::error!("Failed to initialize Vulkan: {:#}", e);
            self.init_error = Some(e);
            event_loop.exit();
        }
    }

    /// Handle window events. The close request is the only way out.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            // The command buffers sit recorded but are never submitted, and
            // nothing is presented: a redraw request has nothing to do, so
            // the window stays blank until it is closed.
            WindowEvent::RedrawRequested => {}

            _ => {}
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(device) = &self.device {
            // Nothing was ever submitted, but the guard belongs in front of
            // destruction regardless
            let _ = device.wait_idle();

            unsafe {
                // Destroy in reverse order of creation!

                // 1. Command pool (also frees its command buffers)
                if let Some(pool) = self.command_pool.take() {
                    device.handle.destroy_command_pool(pool, None);
                }

                // 2. Framebuffers
                for framebuffer in self.framebuffers.drain(..) {
                    device.handle.destroy_framebuffer(framebuffer, None);
                }

                // 3. Pipeline, then its layout
                if let Some(graphics_pipeline) = self.pipeline.take() {
                    device.handle.destroy_pipeline(graphics_pipeline, None);
                }
                if let Some(layout) = self.pipeline_layout.take() {
                    device.handle.destroy_pipeline_layout(layout, None);
                }

                // 4. Render pass
                if let Some(render_pass) = self.render_pass.take() {
                    device.handle.destroy_render_pass(render_pass, None);
                }
            }
        }

        // 5. Image views, swapchain, logical device, surface, debug messenger
        //    and instance follow from field drop order and the Arc chain; the
        //    window goes last.

        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_starts_with_nothing_committed() {
        let app = App::new(Config::default());
        assert!(app.window.is_none());
        assert!(app.device.is_none());
        assert!(app.swapchain.is_none());
        assert!(app.render_pass.is_none());
        assert!(app.pipeline_layout.is_none());
        assert!(app.pipeline.is_none());
        assert!(app.framebuffers.is_empty());
        assert!(app.command_pool.is_none());
        assert!(app.command_buffers.is_empty());
        assert!(app.init_error.is_none());
    }

    #[test]
    fn dropping_an_uninitialized_app_is_inert() {
        // The state a failed window creation leaves behind: nothing committed,
        // so teardown must not touch any handle.
        let app = App::new(Config::default());
        drop(app);
    }

    #[test]
    fn stored_error_survives_until_drained() {
        let mut app = App::new(Config::default());
        app.init_error = Some(anyhow::anyhow!("no suitable GPU found"));

        let drained = app.init_error.take();
        assert!(drained.is_some());
        assert!(app.init_error.is_none());
        assert!(drained
            .map(|e| e.to_string().contains("no suitable GPU"))
            .unwrap_or(false));
    }
}
