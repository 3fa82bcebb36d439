//! Orbit viewer
//!
//! Displays an OBJ model (or a cube) that can be orbited by dragging with the
//! left mouse button.
//!
//! ```text
//! orbit_viewer [--config viewer.toml] [model.obj] [texture.png]
//! ```

mod assets;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use glfw::{Action, Key, WindowEvent};
use orbit_render::foundation::logging::init_logging;
use orbit_render::prelude::*;

const DEFAULT_CONFIG_PATH: &str = "orbit_viewer.toml";
const FPS_LOG_INTERVAL: Duration = Duration::from_secs(1);
/// Loaded models are scaled to fit a cube of this side
const MODEL_EXTENT: f32 = 2.0;

/// Command line arguments
#[derive(Debug, Default)]
struct ViewerArgs {
    config: Option<PathBuf>,
    model: Option<PathBuf>,
    texture: Option<PathBuf>,
}

impl ViewerArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--config" {
                let path = args.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            } else if parsed.model.is_none() {
                parsed.model = Some(PathBuf::from(arg));
            } else if parsed.texture.is_none() {
                parsed.texture = Some(PathBuf::from(arg));
            } else {
                return Err(format!("Unexpected argument: {arg}"));
            }
        }
        Ok(parsed)
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RendererConfig, ConfigError> {
    match path {
        Some(path) => RendererConfig::load_from_file(path),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => RendererConfig::load_from_file(DEFAULT_CONFIG_PATH),
        None => {
            log::info!("No {} found, using default configuration", DEFAULT_CONFIG_PATH);
            Ok(RendererConfig::default())
        }
    }
}

struct ViewerApp {
    renderer: Renderer,
    window: Window,
    last_fps_log: Instant,
}

impl ViewerApp {
    fn new(config: &RendererConfig, args: &ViewerArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
        let mut renderer = Renderer::on_create(&mut window, config)?;

        let meshes = match &args.model {
            Some(path) => match assets::load_obj(path) {
                Ok(meshes) => meshes,
                Err(e) => {
                    log::warn!("{}; showing a cube instead", e);
                    vec![MeshData::cube()]
                }
            },
            None => vec![MeshData::cube()],
        };
        let scale = assets::fit_scale(&meshes, MODEL_EXTENT);
        let index = renderer.load_model(&meshes)?;
        if let Some(model) = renderer.model_mut(index) {
            model.transform = Mat4::new_scaling(scale);
        }

        if let Some(path) = &args.texture {
            let image = assets::load_rgba(path)?;
            renderer.set_texture_rgba8(image.width, image.height, &image.pixels)?;
        }

        Ok(Self {
            renderer,
            window,
            last_fps_log: Instant::now(),
        })
    }

    fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Entering main loop");

        while !self.window.should_close() {
            self.window.poll_events();

            let mut resized = false;
            for event in self.window.flush_events() {
                match event {
                    WindowEvent::Key(Key::Escape, _, Action::Press, _) => self.window.set_should_close(true),
                    WindowEvent::FramebufferSize(..) => resized = true,
                    other => self.renderer.handle_window_event(&other),
                }
            }

            if resized {
                self.renderer.on_resize(&mut self.window)?;
                continue;
            }

            if self.renderer.on_draw()? == FrameStatus::SwapchainOutOfDate {
                self.renderer.on_resize(&mut self.window)?;
                continue;
            }

            self.log_fps();
        }

        let Self { renderer, window, .. } = self;
        renderer.on_destroy();
        drop(window);
        log::info!("Viewer closed");
        Ok(())
    }

    fn log_fps(&mut self) {
        if self.last_fps_log.elapsed() < FPS_LOG_INTERVAL {
            return;
        }
        self.last_fps_log = Instant::now();

        let timer = self.renderer.timer();
        let fps = timer.smoothed_fps();
        log::info!(
            "FPS: {:.1} (last frame {:.2} ms, {} frames)",
            fps,
            timer.last_frame_time().as_secs_f64() * 1000.0,
            timer.frame_count()
        );
        self.window.set_title(&format!("Orbit Viewer - {fps:.0} FPS"));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args = ViewerArgs::parse(std::env::args().skip(1))?;
    let config = load_config(args.config.as_ref())?;
    log::info!("Starting {}", config.application_name);

    let app = ViewerApp::new(&config, &args).map_err(|e| {
        log::error!("Failed to start: {}", e);
        e
    })?;

    app.run().map_err(|e| {
        log::error!("Fatal error: {}", e);
        e
    })
}
