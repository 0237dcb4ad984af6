//! Renders a small generated scene headlessly against the null device and
//! prints per-frame statistics. Useful for poking at the frame graph
//! without a window or GPU.

use std::sync::Arc;

use glam::{vec3, Quat, Vec3};
use helio_core::{JobSystem, RuntimeOptions};
use helio_ecs::{systems, EcsContext, LightFlags};
use helio_gpu::null::NullDevice;
use helio_gpu::{DeviceLimits, ShaderManifest};
use helio_model::{load_model, MeshSource, ModelDocument, NodeSource};
use helio_renderer::{Camera, Renderer, Scene, SceneDesc};

const MANIFEST: &str = r#"{
    "shaders": [
        {"name": "gbuffer_fill", "stages": [
            {"stage": "vertex", "path": "gbuffer_fill.vert"},
            {"stage": "fragment", "path": "gbuffer_fill.frag"}
        ]},
        {"name": "deferred_lighting", "stages": [
            {"stage": "vertex", "path": "fullscreen.vert"},
            {"stage": "fragment", "path": "deferred_lighting.frag"}
        ]},
        {"name": "forward", "stages": [
            {"stage": "vertex", "path": "forward.vert"},
            {"stage": "fragment", "path": "forward.frag"}
        ]},
        {"name": "shadow", "stages": [
            {"stage": "vertex", "path": "shadow.vert"},
            {"stage": "fragment", "path": "shadow.frag"}
        ]},
        {"name": "picking", "stages": [
            {"stage": "vertex", "path": "picking.vert"},
            {"stage": "fragment", "path": "picking.frag"}
        ]},
        {"name": "post_process", "stages": [
            {"stage": "vertex", "path": "fullscreen.vert"},
            {"stage": "fragment", "path": "post_process.frag"}
        ]},
        {"name": "debug_lines", "stages": [
            {"stage": "vertex", "path": "debug_lines.vert"},
            {"stage": "fragment", "path": "debug_lines.frag"}
        ]},
        {"name": "skybox", "stages": [
            {"stage": "vertex", "path": "skybox.vert"},
            {"stage": "fragment", "path": "skybox.frag"}
        ]},
        {"name": "uvmap", "stages": [{"stage": "compute", "path": "uvmap.comp"}]},
        {"name": "jumpfloodalgo", "stages": [{"stage": "compute", "path": "jumpfloodalgo.comp"}]},
        {"name": "skinning", "stages": [{"stage": "compute", "path": "skinning.comp"}]},
        {"name": "environment_filter", "stages": [{"stage": "compute", "path": "environment_filter.comp"}]},
        {"name": "brdf_lut", "stages": [{"stage": "compute", "path": "brdf_lut.comp"}]}
    ]
}"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let device = Arc::new(NullDevice::new(DeviceLimits::default()));
    let manifest = ShaderManifest::from_json(MANIFEST.as_bytes())?;
    let mut renderer = Renderer::new(device.clone(), manifest)?;

    let mut ctx = EcsContext::new();
    ctx.finalize();
    let mut library = ctx.create_library()?;

    // a floor plane and a ring of pyramids, as one parsed document
    let mut document = ModelDocument {
        name: "headless".into(),
        ..Default::default()
    };
    document.meshes.push(MeshSource::from_triangles(
        "floor",
        vec![
            vec3(-20.0, 0.0, -20.0),
            vec3(20.0, 0.0, -20.0),
            vec3(20.0, 0.0, 20.0),
            vec3(-20.0, 0.0, -20.0),
            vec3(20.0, 0.0, 20.0),
            vec3(-20.0, 0.0, 20.0),
        ],
    ));
    document.meshes.push(MeshSource::from_triangles(
        "pyramid",
        vec![
            vec3(-1.0, 0.0, -1.0),
            vec3(1.0, 0.0, -1.0),
            vec3(0.0, 2.0, 0.0),
            vec3(1.0, 0.0, -1.0),
            vec3(1.0, 0.0, 1.0),
            vec3(0.0, 2.0, 0.0),
            vec3(1.0, 0.0, 1.0),
            vec3(-1.0, 0.0, 1.0),
            vec3(0.0, 2.0, 0.0),
            vec3(-1.0, 0.0, 1.0),
            vec3(-1.0, 0.0, -1.0),
            vec3(0.0, 2.0, 0.0),
        ],
    ));
    document.nodes.push(NodeSource {
        name: "floor".into(),
        mesh: Some(0),
        ..Default::default()
    });
    document.roots.push(0);
    for i in 0..8 {
        let angle = i as f32 / 8.0 * std::f32::consts::TAU;
        document.nodes.push(NodeSource {
            name: format!("pyramid_{i}"),
            mesh: Some(1),
            translation: vec3(angle.cos() * 8.0, 0.0, angle.sin() * 8.0),
            rotation: Quat::from_rotation_y(-angle),
            ..Default::default()
        });
        document.roots.push(i + 1);
    }
    let loaded = load_model(&mut library, &document);

    let sun = library.create_directional_light(Some("sun"), vec3(0.3, -1.0, 0.2));
    let light_key = library.keys().light;
    if let Some(light) = library.get_component_mut(light_key, sun) {
        light.flags |= LightFlags::CAST_SHADOW;
        light.cascade_count = 4;
        light.shadow_resolution = 2048;
    }

    let jobs = JobSystem::new(0);
    systems::run_transform_update_system(&mut library);
    systems::run_hierarchy_update_system(&mut library);
    systems::run_object_update_system(&mut library, &jobs);
    systems::run_light_update_system(&mut library);

    let mut scene = Scene::new(device.clone(), library, SceneDesc::default())?;
    scene.add_drawable_objects(&loaded.objects);
    scene.finalize(&mut renderer.variants)?;
    renderer.prepare_scene(&mut scene)?;

    let mut camera =
        Camera::perspective_reverse_z(vec3(0.0, 6.0, 18.0), std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.1, 200.0);
    camera.look_at(vec3(0.0, 6.0, 18.0), Vec3::ZERO);
    let view = renderer.create_view(&mut scene, camera, 1280, 720)?;

    let options = RuntimeOptions::default();
    for frame in 0..8u32 {
        systems::run_transform_update_system(&mut scene.library);
        systems::run_object_update_system(&mut scene.library, &jobs);
        renderer.render_frame(&mut scene, &jobs, &options)?;
        let stats = device.stats();
        tracing::info!(
            "frame {frame}: {} draws, {} dispatches, {} visible",
            stats.draws,
            stats.dispatches,
            scene.views[view].visible_deferred.len()
        );
    }
    Ok(())
}
