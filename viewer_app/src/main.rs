//! Demo viewer: loads an OBJ model and renders it with the deferred engine.

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;

use nalgebra::{Matrix4, Vector3};

use deferred_engine::assets::{image_loader, model_loader};
use deferred_engine::config::RendererConfig;
use deferred_engine::foundation::logging;
use deferred_engine::foundation::profiling::Profiler;
use deferred_engine::foundation::time::Timer;
use deferred_engine::render::vulkan::{VulkanRenderer, Window};

const DEFAULT_MODEL: &str = "viking_room.obj";
const TRACE_FILE: &str = "frame_trace.json";

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => RendererConfig::from_file(path)?,
        None => RendererConfig::default(),
    };

    let mut profiler = Profiler::new("viewer");

    let mut window = Window::new(
        &config.application_name,
        config.window_width,
        config.window_height,
    )?;

    let model_dir = config.model_dir.clone();
    let texture_dir = config.texture_dir.clone();

    let mut renderer = {
        let _span = profiler.span("renderer init");
        VulkanRenderer::new(&mut window, config)?
    };

    let model_index = {
        let _span = profiler.span("model load");
        load_model(&mut renderer, &model_dir, &texture_dir, DEFAULT_MODEL)?
    };

    let mut timer = Timer::new();
    while !window.should_close() {
        window.poll_events();
        timer.update();

        // Spin the model so frame pipelining is visible
        if let Some(model) = renderer.model_mut(model_index) {
            let angle = timer.total_time() * 0.5;
            model.set_transform(Matrix4::new_rotation(Vector3::y() * angle));
        }

        {
            let _span = profiler.span("draw");
            renderer.draw(&mut window)?;
        }
    }

    renderer.wait_idle()?;

    profiler.write_trace(TRACE_FILE)?;
    log::info!(
        "Rendered {} frames (avg {:.1} fps), trace written to {}",
        timer.frame_count(),
        timer.average_fps(),
        TRACE_FILE
    );

    Ok(())
}

/// Load an OBJ model, upload its diffuse textures, and hand the meshes to
/// the renderer.
fn load_model(
    renderer: &mut VulkanRenderer,
    model_dir: &str,
    texture_dir: &str,
    file_name: &str,
) -> Result<usize, Box<dyn std::error::Error>> {
    let obj = model_loader::load_obj(Path::new(model_dir).join(file_name))?;

    // Upload each distinct texture once
    let mut uploaded: HashMap<String, usize> = HashMap::new();
    let mut material_textures = Vec::with_capacity(obj.diffuse_textures.len());
    for name in &obj.diffuse_textures {
        let texture_id = match name {
            Some(name) => match uploaded.get(name) {
                Some(&id) => id,
                None => {
                    let image = image_loader::load_rgba8(Path::new(texture_dir).join(name))?;
                    let id = renderer.load_texture(image.width, image.height, &image.pixels)?;
                    uploaded.insert(name.clone(), id);
                    id
                }
            },
            None => 0,
        };
        material_textures.push(texture_id);
    }

    let mesh_data = model_loader::resolve_texture_ids(obj.meshes, &material_textures);
    Ok(renderer.add_model(&mesh_data)?)
}
