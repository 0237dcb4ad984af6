//! End-to-end frame tests against the null device: stage a small scene,
//! finalize it, render frames, and check the retained state the passes
//! produce.

use std::sync::Arc;

use glam::{vec3, Vec3};
use helio_core::{JobSystem, RuntimeOptions};
use helio_ecs::{
    systems, ComponentLibrary, EcsContext, Entity, LightFlags, LightKind, VertexStreamMask,
};
use helio_gpu::null::NullDevice;
use helio_gpu::{Device, DeviceLimits, ShaderManifest};
use helio_renderer::{Camera, Renderer, Scene, SceneDesc};

fn manifest() -> ShaderManifest {
    let names = [
        ("gbuffer_fill", false),
        ("deferred_lighting", false),
        ("forward", false),
        ("shadow", false),
        ("skybox", false),
        ("picking", false),
        ("post_process", false),
        ("debug_lines", false),
        ("uvmap", true),
        ("jumpfloodalgo", true),
        ("skinning", true),
        ("environment_filter", true),
        ("brdf_lut", true),
        ("panorama_to_cubemap", true),
    ];
    let shaders = names
        .iter()
        .map(|(name, compute)| {
            let stages = if *compute {
                format!(r#"[{{"stage": "compute", "path": "{name}.comp"}}]"#)
            } else {
                format!(
                    r#"[{{"stage": "vertex", "path": "{name}.vert"}},
                        {{"stage": "fragment", "path": "{name}.frag"}}]"#
                )
            };
            format!(r#"{{"name": "{name}", "stages": {stages}}}"#)
        })
        .collect::<Vec<_>>()
        .join(",");
    match ShaderManifest::from_json(format!(r#"{{"shaders": [{}]}}"#, shaders).as_bytes()) {
        Ok(manifest) => manifest,
        Err(e) => panic!("{e}"),
    }
}

fn library() -> ComponentLibrary {
    let mut ctx = EcsContext::new();
    ctx.finalize();
    match ctx.create_library() {
        Ok(lib) => lib,
        Err(e) => panic!("{e}"),
    }
}

fn add_cube_object(library: &mut ComponentLibrary, name: &str, position: Vec3, mesh: Entity) -> Entity {
    let keys = *library.keys();
    let entity = library.create_object(Some(name));
    if let Some(t) = library.get_component_mut(keys.transform, entity) {
        t.translation = position;
    }
    if let Some(o) = library.get_component_mut(keys.object, entity) {
        o.mesh = mesh;
    }
    entity
}

fn cube_mesh(library: &mut ComponentLibrary, material: Entity) -> Entity {
    let keys = *library.keys();
    let entity = library.create_mesh(Some("cube"));
    if let Some(mesh) = library.get_component_mut(keys.mesh, entity) {
        mesh.positions = vec![
            vec3(-1.0, -1.0, -1.0),
            vec3(1.0, -1.0, -1.0),
            vec3(1.0, 1.0, -1.0),
            vec3(-1.0, 1.0, -1.0),
            vec3(-1.0, -1.0, 1.0),
            vec3(1.0, -1.0, 1.0),
            vec3(1.0, 1.0, 1.0),
            vec3(-1.0, 1.0, 1.0),
        ];
        mesh.normals = vec![vec3(0.0, 1.0, 0.0); 8];
        mesh.indices = vec![
            0, 1, 2, 0, 2, 3, 4, 6, 5, 4, 7, 6, 0, 4, 5, 0, 5, 1, 3, 2, 6, 3, 6, 7, 0, 3, 7, 0,
            7, 4, 1, 5, 6, 1, 6, 2,
        ];
        mesh.vertex_stream_mask = VertexStreamMask::POSITION | VertexStreamMask::NORMAL;
        mesh.compute_aabb();
        mesh.material = material;
    }
    entity
}

struct Fixture {
    device: Arc<NullDevice>,
    renderer: Renderer,
    scene: Scene,
    jobs: JobSystem,
    view: usize,
}

fn fixture() -> Fixture {
    let device = Arc::new(NullDevice::new(DeviceLimits::default()));
    let mut renderer = match Renderer::new(device.clone(), manifest()) {
        Ok(renderer) => renderer,
        Err(e) => panic!("{e}"),
    };
    let mut library = library();

    let material = library.create_material(Some("gray"));
    let mesh = cube_mesh(&mut library, material);
    let a = add_cube_object(&mut library, "cube_a", vec3(0.0, 0.0, -5.0), mesh);
    let b = add_cube_object(&mut library, "cube_b", vec3(3.0, 0.0, -5.0), mesh);
    let c = add_cube_object(&mut library, "cube_c", vec3(-3.0, 0.0, -5.0), mesh);

    let sun = library.create_directional_light(Some("sun"), vec3(0.0, -1.0, 0.0));
    let light_key = library.keys().light;
    if let Some(light) = library.get_component_mut(light_key, sun) {
        light.flags |= LightFlags::CAST_SHADOW;
        light.cascade_count = 4;
        light.shadow_resolution = 1024;
    }
    let lamp = library.create_point_light(Some("lamp"), vec3(0.0, 4.0, -5.0));
    if let Some(light) = library.get_component_mut(light_key, lamp) {
        light.flags |= LightFlags::CAST_SHADOW;
        light.shadow_resolution = 512;
        light.kind = LightKind::Point;
    }

    let jobs = JobSystem::new(2);
    systems::run_transform_update_system(&mut library);
    systems::run_hierarchy_update_system(&mut library);
    systems::run_object_update_system(&mut library, &jobs);
    systems::run_light_update_system(&mut library);

    let mut scene = match Scene::new(device.clone(), library, SceneDesc::default()) {
        Ok(scene) => scene,
        Err(e) => panic!("{e}"),
    };
    scene.add_drawable_objects(&[a, b, c]);
    if let Err(e) = scene.finalize(&mut renderer.variants) {
        panic!("{e}");
    }
    if let Err(e) = renderer.prepare_scene(&mut scene) {
        panic!("{e}");
    }

    let camera = Camera::perspective_reverse_z(
        Vec3::ZERO,
        std::f32::consts::FRAC_PI_2,
        16.0 / 9.0,
        0.1,
        100.0,
    );
    let view = match renderer.create_view(&mut scene, camera, 1280, 720) {
        Ok(view) => view,
        Err(e) => panic!("{e}"),
    };
    // aim down -Z where the cubes are
    scene.views[view].camera.look_at(Vec3::ZERO, vec3(0.0, 0.0, -5.0));

    Fixture {
        device,
        renderer,
        scene,
        jobs,
        view,
    }
}

#[test]
fn instances_of_one_mesh_coalesce() {
    let fixture = fixture();
    let drawables = fixture.scene.drawables();
    assert_eq!(drawables.len(), 1);
    assert_eq!(drawables[0].instance_count, 3);
    assert_eq!(drawables[0].index_count, 36);
    assert!(!drawables[0].forward);
}

#[test]
fn material_hashmap_round_trips_to_slots() {
    let fixture = fixture();
    let drawables = fixture.scene.drawables();
    let keys = *fixture.scene.library.keys();
    for drawable in drawables {
        let mesh = fixture
            .scene
            .library
            .get_component(keys.mesh, drawable.mesh)
            .expect("mesh");
        assert_eq!(
            fixture.scene.material_slot(mesh.material),
            Some(drawable.material_slot)
        );
    }
}

#[test]
fn frames_render_and_present() {
    let mut fixture = fixture();
    let options = RuntimeOptions::default();
    for _ in 0..3 {
        if let Err(e) =
            fixture
                .renderer
                .render_frame(&mut fixture.scene, &fixture.jobs, &options)
        {
            panic!("{e}");
        }
    }
    let stats = fixture.device.stats();
    assert_eq!(stats.presents, 3);
    assert!(stats.draws > 0, "no draws were submitted");
    assert!(stats.render_passes > 0);

    // the cubes in front of the camera survived culling
    let view = &fixture.scene.views[fixture.view];
    assert_eq!(view.visible_deferred.len(), 1);

    // directional (one per view) + point rects all packed
    assert_eq!(fixture.scene.shadow_rects().len(), 2);
    assert!(fixture.scene.shadow_rects().iter().all(|r| r.packed));
    assert_eq!(view.dir_shadow_data.len(), 1);
    let shadow = &view.dir_shadow_data[0];
    assert!(shadow.cascade_splits[0] > 0.0);
    assert!(shadow.cascade_splits[3] <= 100.0 + 1e-3);
}

#[test]
fn pick_requests_resolve_after_frames_in_flight() {
    let mut fixture = fixture();
    let options = RuntimeOptions::default();
    fixture.scene.views[fixture.view].picking.request_pick(640, 360);

    let frames = fixture.device.frames_in_flight() as usize;
    for _ in 0..frames + 2 {
        if let Err(e) =
            fixture
                .renderer
                .render_frame(&mut fixture.scene, &fixture.jobs, &options)
        {
            panic!("{e}");
        }
    }
    // the null device rasterizes nothing, so the id stays zero: no hit,
    // but the request was consumed without error
    assert!(fixture.scene.views[fixture.view].picking.hovered().is_null());
    assert!(!fixture.scene.views[fixture.view].picking.has_request());
}

#[test]
fn cleanup_releases_views_and_scene() {
    let mut fixture = fixture();
    let options = RuntimeOptions::default();
    if let Err(e) = fixture
        .renderer
        .render_frame(&mut fixture.scene, &fixture.jobs, &options)
    {
        panic!("{e}");
    }
    fixture.renderer.cleanup_scene(&mut fixture.scene);
    assert!(fixture.scene.views.is_empty());
    assert!(!fixture.scene.is_finalized());
}
