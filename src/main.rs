// =============================================================================
// SIERPINSKI RENDERER - Vulkan triangle subdivision demo
// =============================================================================
//
// Renders a triangle and keeps subdividing it into its three corner
// triangles on a timer, converging on a Sierpinski triangle.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, input, FPS title)                       │
// │    ├── Scene (mesh + subdivision schedule, CPU only)            │
// │    └── Gpu                                                      │
// │          ├── GameObjects (shared scene model, offset, colour)   │
// │          ├── SimpleRenderSystem (pipeline layout + pipeline)    │
// │          ├── Renderer (swapchain, per-frame command buffers)    │
// │          └── VulkanDevice                                       │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Advance the scene; rebuild the model if the mesh changed
// 2. Acquire swapchain image, re-record this frame's command buffer
// 3. Submit and present
//
// =============================================================================

mod backend;
mod config;
mod game_object;
mod mesh;
mod model;
mod render_system;
mod renderer;
mod scene;
mod shader_watch;

use anyhow::{Context, Result};
use ash::vk;
use backend::VulkanDevice;
use config::Config;
use game_object::{load_game_objects, replace_model, GameObject};
use mesh::Xorshift32;
use model::Model;
use render_system::SimpleRenderSystem;
use renderer::Renderer;
use scene::Scene;
use shader_watch::ShaderWatcher;
use std::fs::File;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, status) = Config::load();

    init_logging(&config)?;
    log::info!("Starting Sierpinski renderer");
    status.log(&config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Subdividing every {:.1}s up to depth {}",
        config.demo.step_interval_secs,
        config.demo.max_depth
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.into_result()
}

/// Initialize logging, optionally redirected to a file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if config.debug.log_to_file {
        let file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {:?}", config.debug.log_file))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// GPU-side state, created once the window exists.
///
/// Field order matters for Drop: everything holding the device goes first.
struct Gpu {
    game_objects: Vec<GameObject>,
    render_system: SimpleRenderSystem,
    renderer: Renderer,
    device: Arc<VulkanDevice>,
}

pub struct App {
    config: Config,
    scene: Scene,
    rng: Xorshift32,

    gpu: Option<Gpu>,
    shader_watcher: Option<ShaderWatcher>,
    /// Set when the scene mesh changed and the vertex buffer is stale
    mesh_dirty: bool,

    // Window outlives the surface owned by the device
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    /// First fatal error, reported once the event loop exits
    fatal_error: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            scene: Scene::new(&config.demo, now),
            rng: Xorshift32::from_time(),
            gpu: None,
            shader_watcher: None,
            mesh_dirty: false,
            window: None,
            is_fullscreen: config.window.fullscreen,
            fatal_error: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
            config,
        }
    }

    fn into_result(mut self) -> Result<()> {
        match self.fatal_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let device = VulkanDevice::new(&self.config.window.title, enable_validation, window)?;

        let renderer = Renderer::new(device.clone(), window_extent(window), &self.config)?;
        let render_system = SimpleRenderSystem::new(
            &device,
            renderer.swapchain_render_pass(),
            &self.config.demo.shader_dir,
        )?;

        // Restart the schedule so device setup time does not count as waiting
        self.scene = Scene::new(&self.config.demo, Instant::now());
        let model = Rc::new(Model::from_mesh(&device, self.scene.mesh())?);
        let game_objects = load_game_objects(&model, &self.config.demo.objects);

        self.gpu = Some(Gpu {
            game_objects,
            render_system,
            renderer,
            device,
        });

        if self.config.demo.hot_reload_shaders {
            match ShaderWatcher::new(&self.config.demo.shader_dir) {
                Ok(watcher) => self.shader_watcher = Some(watcher),
                Err(e) => log::warn!("Shader hot-reload disabled: {:#}", e),
            }
        }

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. Returns false when nothing was drawn.
    fn draw_frame(&mut self) -> Result<bool> {
        let Some(window) = self.window.clone() else {
            return Ok(false);
        };
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(false);
        };

        if self.scene.update(Instant::now()) {
            self.mesh_dirty = true;
        }
        if self.mesh_dirty {
            // The old vertex buffer may still be read by frames in flight
            gpu.device.wait_idle()?;
            let model = Rc::new(Model::from_mesh(&gpu.device, self.scene.mesh())?);
            replace_model(&mut gpu.game_objects, &model);
            self.mesh_dirty = false;
        }

        if self.shader_watcher.as_ref().is_some_and(|w| w.poll()) {
            log::info!("Shader change detected, rebuilding pipeline");
            rebuild_render_system(gpu, &self.config, PipelineRebuild::ShaderChange)?;
        }

        let extent = window_extent(&window);
        let Some(cmd) = gpu.renderer.begin_frame(extent)? else {
            return Ok(false);
        };

        if gpu.renderer.take_render_pass_changed() {
            rebuild_render_system(gpu, &self.config, PipelineRebuild::RenderPassChange)?;
        }

        gpu.renderer.begin_render_pass(cmd)?;
        gpu.render_system.render_game_objects(cmd, &gpu.game_objects);
        gpu.renderer.end_render_pass(cmd)?;
        gpu.renderer.end_frame(extent)?;

        Ok(true)
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    fn handle_key(&mut self, key: KeyCode, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        match key {
            KeyCode::Escape => {
                log::info!("ESC pressed, exiting...");
                event_loop.exit();
            }
            KeyCode::Space => {
                self.mesh_dirty |= self.scene.step(now);
            }
            KeyCode::KeyP => {
                let running = self.scene.toggle_auto_step(now);
                log::info!("Automatic subdivision {}", if running { "resumed" } else { "paused" });
            }
            KeyCode::KeyR => {
                self.scene.randomize(&mut self.rng, now);
                self.mesh_dirty = true;
            }
            KeyCode::Backspace => {
                self.scene.reset(now);
                self.mesh_dirty = true;
            }
            KeyCode::F11 => self.toggle_fullscreen(),
            _ => {}
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(gpu) = self.gpu.as_mut() {
                gpu.renderer.mark_resized();
            }
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let (Some(window), Some(gpu)) = (&self.window, &self.gpu) {
                let mesh = self.scene.mesh();
                let extent = gpu.renderer.extent();
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) - depth {} ({} triangles) [{}x{}]{}",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mesh.depth(),
                    mesh.triangle_count(),
                    extent.width,
                    extent.height,
                    if self.scene.auto_step() { "" } else { " paused" },
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:?}", error);
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error);
        }
        event_loop.exit();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineRebuild {
    ShaderChange,
    RenderPassChange,
}

impl PipelineRebuild {
    /// The old pipeline only stays valid while its render pass does
    fn old_pipeline_usable(self) -> bool {
        matches!(self, PipelineRebuild::ShaderChange)
    }
}

/// Replace the render system. A failed shader reload keeps the old pipeline;
/// a failure after a render pass change is fatal.
fn rebuild_render_system(gpu: &mut Gpu, config: &Config, reason: PipelineRebuild) -> Result<()> {
    gpu.device.wait_idle()?;
    match SimpleRenderSystem::new(
        &gpu.device,
        gpu.renderer.swapchain_render_pass(),
        &config.demo.shader_dir,
    ) {
        Ok(render_system) => gpu.render_system = render_system,
        Err(e) if reason.old_pipeline_usable() => {
            log::error!("Failed to rebuild pipeline, keeping the old one: {:#}", e);
        }
        Err(e) => return Err(e.context("Failed to rebuild pipeline for the new render pass")),
    }
    Ok(())
}

fn window_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
            return;
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref gpu) = self.gpu {
                    if let Err(e) = gpu.device.wait_idle() {
                        log::warn!("Failed to wait for device idle: {:#}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.renderer.mark_resized();
                }
            }

            WindowEvent::RedrawRequested => match self.draw_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => self.fail(event_loop, e.context("Render error")),
            },

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && !event.repeat {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        self.handle_key(key, event_loop);
                    }
                }
            }

            _ => {}
        }
    }

    /// Continuous redraw; the scene decides when the mesh changes.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(gpu) = self.gpu.take() {
            if let Err(e) = gpu.device.wait_idle() {
                log::warn!("Failed to wait for device idle: {:#}", e);
            }
            // Game objects, render system and renderer release their handles before the device
            drop(gpu);
        }
        self.shader_watcher = None;

        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_shader_reloads_may_keep_the_old_pipeline() {
        assert!(PipelineRebuild::ShaderChange.old_pipeline_usable());
        assert!(!PipelineRebuild::RenderPassChange.old_pipeline_usable());
    }
}
