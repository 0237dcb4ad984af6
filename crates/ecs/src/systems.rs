use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use helio_core::{BatchOutput, JobSystem};

use crate::aabb::Aabb;
use crate::components::*;
use crate::entity::Entity;
use crate::library::ComponentLibrary;

/// Recomposes `world = T·R·S` for every dirty transform and clears the flag.
#[profiling::function]
pub fn run_transform_update_system(library: &mut ComponentLibrary) {
    let key = library.keys().transform;
    let (transforms, _) = library.get_components_mut(key);
    for transform in transforms {
        if transform.flags.contains(TransformFlags::DIRTY) {
            transform.world = transform.local_matrix();
            transform.flags.remove(TransformFlags::DIRTY);
        }
    }
}

/// Folds ancestor transforms into every child with a hierarchy component.
/// The ancestor chain is walked per child, so chains resolve regardless of
/// manager iteration order. Children are re-marked dirty so the next
/// transform update restores their local world before this runs again.
#[profiling::function]
pub fn run_hierarchy_update_system(library: &mut ComponentLibrary) {
    let hierarchy_key = library.keys().hierarchy;
    let transform_key = library.keys().transform;
    let children: Vec<Entity> = {
        let (_, entities) = library.get_components(hierarchy_key);
        entities.to_vec()
    };
    for child in children {
        let parent_world = library.compute_parent_transform(child);
        if let Some(transform) = library.get_component_mut(transform_key, child) {
            transform.world = parent_world * transform.world;
            transform.flags.insert(TransformFlags::DIRTY);
        }
    }
}

/// Rebuilds every skin's joint matrices and texture data:
/// `joint = world⁻¹ · joint_world · inverse_bind`, stored as
/// `(joint, transpose(inverse(joint)))` pairs, and accumulates the skin
/// bounds from joint positions.
#[profiling::function]
pub fn run_skin_update_system(library: &mut ComponentLibrary) {
    const BONE_RADIUS: f32 = 1.0;

    let skin_key = library.keys().skin;
    let transform_key = library.keys().transform;
    let owners: Vec<Entity> = {
        let (_, entities) = library.get_components(skin_key);
        entities.to_vec()
    };

    for owner in owners {
        let Some(world) = library.get_component(transform_key, owner).map(|t| t.world) else {
            continue;
        };
        let inverse_world = world.inverse();

        let joints: Vec<Entity> = match library.get_component(skin_key, owner) {
            Some(skin) => skin.joints.clone(),
            None => continue,
        };
        let joint_worlds: Vec<Mat4> = joints
            .iter()
            .map(|joint| {
                library
                    .get_component(transform_key, *joint)
                    .map(|t| t.world)
                    .unwrap_or(Mat4::IDENTITY)
            })
            .collect();

        if let Some(skin) = library.get_component_mut(skin_key, owner) {
            if skin.texture_data.len() < joints.len() * 2 {
                skin.texture_data.resize(joints.len() * 2, Mat4::IDENTITY);
            }
            skin.aabb = Aabb::EMPTY;
            for (j, joint_world) in joint_worlds.iter().enumerate() {
                let inverse_bind = skin
                    .inverse_bind_matrices
                    .get(j)
                    .copied()
                    .unwrap_or(Mat4::IDENTITY);
                let joint_matrix = inverse_world * *joint_world * inverse_bind;
                skin.texture_data[j * 2] = joint_matrix;
                skin.texture_data[j * 2 + 1] = joint_matrix.inverse().transpose();

                let bone_position = joint_world.w_axis.truncate();
                skin.aabb
                    .merge(&Aabb::from_center_radius(bone_position, BONE_RADIUS));
            }
        }
    }
}

/// Produces every object's world AABB: mesh bounds through the transform's
/// world matrix, merged with the skin bounds when the mesh is skinned.
/// Each object is independent, so the work fans out over the job system.
#[profiling::function]
pub fn run_object_update_system(library: &mut ComponentLibrary, jobs: &JobSystem) {
    struct ObjectInput {
        mesh_aabb: Aabb,
        world: Mat4,
        skin_aabb: Option<Aabb>,
    }

    let keys = *library.keys();
    let inputs: Vec<ObjectInput> = {
        let (objects, _) = library.get_components(keys.object);
        objects
            .iter()
            .map(|object| {
                let mesh = library.get_component(keys.mesh, object.mesh);
                let skin_aabb = mesh
                    .and_then(|m| library.get_component(keys.skin, m.skin))
                    .map(|s| s.aabb);
                ObjectInput {
                    mesh_aabb: mesh.map(|m| m.aabb).unwrap_or(Aabb::EMPTY),
                    world: library
                        .get_component(keys.transform, object.transform)
                        .map(|t| t.world)
                        .unwrap_or(Mat4::IDENTITY),
                    skin_aabb,
                }
            })
            .collect()
    };

    let count = inputs.len();
    let inputs = Arc::new(inputs);
    let output = BatchOutput::new(count, Aabb::EMPTY);
    let task_output = output.clone();
    let counter = jobs.dispatch_batch(count as u32, 0, move |i| {
        let input = &inputs[i as usize];
        let mut aabb = if input.mesh_aabb.is_empty() {
            Aabb::EMPTY
        } else {
            input.mesh_aabb.transformed(&input.world)
        };
        if let Some(skin_aabb) = input.skin_aabb {
            aabb.merge(&skin_aabb);
        }
        // SAFETY: invocation i writes only element i
        unsafe { task_output.write(i as usize, aabb) };
    });
    jobs.wait_for_counter(&counter);

    let results = output.take();
    let (objects, _) = library.get_components_mut(keys.object);
    for (object, aabb) in objects.iter_mut().zip(results) {
        object.world_aabb = aabb;
    }
}

/// Copies world translation into lights that sit on a transform.
#[profiling::function]
pub fn run_light_update_system(library: &mut ComponentLibrary) {
    let light_key = library.keys().light;
    let transform_key = library.keys().transform;
    let owners: Vec<Entity> = {
        let (_, entities) = library.get_components(light_key);
        entities.to_vec()
    };
    for owner in owners {
        let Some(position) = library
            .get_component(transform_key, owner)
            .map(|t| t.world.w_axis.truncate())
        else {
            continue;
        };
        if let Some(light) = library.get_component_mut(light_key, owner) {
            light.position = position;
        }
    }
}

/// Runs every playing script through its resolved interface, clearing the
/// flags of play-once scripts afterwards.
#[profiling::function]
pub fn run_script_update_system(library: &mut ComponentLibrary) {
    let script_key = library.keys().script;
    let playing: Vec<(Entity, ScriptApi, bool)> = {
        let (scripts, entities) = library.get_components(script_key);
        scripts
            .iter()
            .zip(entities)
            .filter(|(script, _)| script.flags.contains(ScriptFlags::PLAYING))
            .filter_map(|(script, entity)| {
                script
                    .api
                    .map(|api| (*entity, api, script.flags.contains(ScriptFlags::PLAY_ONCE)))
            })
            .collect()
    };
    for (entity, api, play_once) in playing {
        (api.run)(library, entity);
        if play_once {
            if let Some(script) = library.get_component_mut(script_key, entity) {
                script.flags = ScriptFlags::empty();
            }
        }
    }
}

/// Advances playing animations and samples their channels into the target
/// transforms.
#[profiling::function]
pub fn run_animation_update_system(library: &mut ComponentLibrary, delta_time: f32) {
    let animation_key = library.keys().animation;
    let data_key = library.keys().animation_data;
    let transform_key = library.keys().transform;

    let owners: Vec<Entity> = {
        let (_, entities) = library.get_components(animation_key);
        entities.to_vec()
    };

    for owner in owners {
        let (channels, samplers, time) = {
            let Some(animation) = library.get_component_mut(animation_key, owner) else {
                continue;
            };
            if !animation.flags.contains(AnimationFlags::PLAYING) {
                continue;
            }
            animation.timer += delta_time * animation.speed;
            if animation.timer > animation.end {
                if animation.flags.contains(AnimationFlags::LOOPED) {
                    animation.timer = animation.start + (animation.timer - animation.end);
                } else {
                    animation.timer = animation.end;
                    animation.flags.remove(AnimationFlags::PLAYING);
                }
            }
            (
                animation.channels.clone(),
                animation.samplers.clone(),
                animation.timer,
            )
        };

        for channel in &channels {
            let Some(sampler) = samplers.get(channel.sampler as usize) else {
                continue;
            };
            let Some(data) = library.get_component(data_key, sampler.data) else {
                continue;
            };
            let Some(sample) = sample_keys(data, time, sampler.interpolation, channel.path)
            else {
                continue;
            };
            if let Some(transform) = library.get_component_mut(transform_key, channel.target) {
                match sample {
                    ChannelSample::Translation(v) => transform.translation = v,
                    ChannelSample::Rotation(q) => transform.rotation = q,
                    ChannelSample::Scale(v) => transform.scale = v,
                }
                transform.flags.insert(TransformFlags::DIRTY);
            }
        }
    }
}

enum ChannelSample {
    Translation(Vec3),
    Rotation(Quat),
    Scale(Vec3),
}

fn sample_keys(
    data: &AnimationData,
    time: f32,
    interpolation: AnimationInterpolation,
    path: AnimationPath,
) -> Option<ChannelSample> {
    let stride = match path {
        AnimationPath::Translation | AnimationPath::Scale => 3,
        AnimationPath::Rotation => 4,
        AnimationPath::Weights => return None,
    };
    let key_count = data.key_times.len();
    if key_count == 0 || data.key_values.len() < key_count * stride {
        return None;
    }

    let next = data
        .key_times
        .iter()
        .position(|t| *t >= time)
        .unwrap_or(key_count - 1);
    let prev = next.saturating_sub(1);
    let span = data.key_times[next] - data.key_times[prev];
    let t = match interpolation {
        AnimationInterpolation::Step => 0.0,
        _ if span <= 0.0 => 0.0,
        _ => ((time - data.key_times[prev]) / span).clamp(0.0, 1.0),
    };

    let value = |index: usize| -> &[f32] {
        &data.key_values[index * stride..(index + 1) * stride]
    };
    let (a, b) = (value(prev), value(next));
    Some(match path {
        AnimationPath::Translation | AnimationPath::Scale => {
            let from = Vec3::from_slice(a);
            let to = Vec3::from_slice(b);
            let v = from.lerp(to, t);
            if path == AnimationPath::Translation {
                ChannelSample::Translation(v)
            } else {
                ChannelSample::Scale(v)
            }
        }
        AnimationPath::Rotation => {
            let from = Quat::from_slice(a);
            let to = Quat::from_slice(b);
            ChannelSample::Rotation(from.slerp(to, t).normalize())
        }
        AnimationPath::Weights => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::EcsContext;
    use glam::vec3;

    fn library() -> ComponentLibrary {
        let mut ctx = EcsContext::new();
        ctx.finalize();
        match ctx.create_library() {
            Ok(lib) => lib,
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn transform_update_recomposes_dirty_only() {
        let mut lib = library();
        let e = lib.create_transform(None);
        let key = lib.keys().transform;
        if let Some(t) = lib.get_component_mut(key, e) {
            t.translation = vec3(1.0, 2.0, 3.0);
        }
        run_transform_update_system(&mut lib);
        let world = lib.get_component(key, e).map(|t| t.world).unwrap_or_default();
        assert_eq!(world.w_axis.truncate(), vec3(1.0, 2.0, 3.0));

        // clean transforms keep a stale world until re-marked dirty
        if let Some(t) = lib.get_component_mut(key, e) {
            t.translation = vec3(9.0, 9.0, 9.0);
            t.flags.remove(TransformFlags::DIRTY);
        }
        run_transform_update_system(&mut lib);
        let world = lib.get_component(key, e).map(|t| t.world).unwrap_or_default();
        assert_eq!(world.w_axis.truncate(), vec3(1.0, 2.0, 3.0));
    }

    #[test]
    fn hierarchy_chains_accumulate_through_grandparents() {
        let mut lib = library();
        let key = lib.keys().transform;
        let root = lib.create_transform(Some("root"));
        let mid = lib.create_transform(Some("mid"));
        let leaf = lib.create_transform(Some("leaf"));
        for (e, x) in [(root, 1.0f32), (mid, 10.0), (leaf, 100.0)] {
            if let Some(t) = lib.get_component_mut(key, e) {
                t.translation = vec3(x, 0.0, 0.0);
            }
        }
        lib.attach_component(mid, root);
        lib.attach_component(leaf, mid);

        run_transform_update_system(&mut lib);
        run_hierarchy_update_system(&mut lib);

        let world = lib.get_component(key, leaf).map(|t| t.world).unwrap_or_default();
        assert_eq!(world.w_axis.truncate(), vec3(111.0, 0.0, 0.0));
    }

    #[test]
    fn skin_update_applies_inverse_bind_and_world() {
        let mut lib = library();
        let tkey = lib.keys().transform;
        let skey = lib.keys().skin;

        let joint0 = lib.create_transform(Some("joint0"));
        let joint1 = lib.create_transform(Some("joint1"));
        if let Some(t) = lib.get_component_mut(tkey, joint1) {
            t.translation = vec3(10.0, 0.0, 0.0);
        }
        run_transform_update_system(&mut lib);

        let skinned = lib.create_transform(Some("skinned"));
        if let Some(skin) = lib.add_component(skey, skinned) {
            skin.joints = vec![joint0, joint1];
            skin.inverse_bind_matrices = vec![Mat4::IDENTITY; 2];
        }
        run_transform_update_system(&mut lib);
        run_skin_update_system(&mut lib);

        let skin = lib.get_component(skey, skinned).unwrap();
        assert_eq!(skin.texture_data.len(), 4);
        assert_eq!(skin.texture_data[0], Mat4::IDENTITY);
        assert_eq!(
            skin.texture_data[2].w_axis.truncate(),
            vec3(10.0, 0.0, 0.0)
        );
        // joint radius of 1 around both bones
        assert_eq!(skin.aabb.min, vec3(-1.0, -1.0, -1.0));
        assert_eq!(skin.aabb.max, vec3(11.0, 1.0, 1.0));
    }

    #[test]
    fn object_update_transforms_and_merges_skin_bounds() {
        let mut lib = library();
        let jobs = JobSystem::new(2);
        let keys = *lib.keys();

        let mesh_entity = lib.create_mesh(Some("mesh"));
        if let Some(mesh) = lib.get_component_mut(keys.mesh, mesh_entity) {
            mesh.positions = vec![vec3(-1.0, -1.0, -1.0), vec3(1.0, 1.0, 1.0)];
            mesh.compute_aabb();
        }

        let object = lib.create_object(Some("object"));
        if let Some(t) = lib.get_component_mut(keys.transform, object) {
            t.translation = vec3(5.0, 0.0, 0.0);
        }
        if let Some(o) = lib.get_component_mut(keys.object, object) {
            o.mesh = mesh_entity;
        }

        run_transform_update_system(&mut lib);
        run_object_update_system(&mut lib, &jobs);

        let aabb = lib
            .get_component(keys.object, object)
            .map(|o| o.world_aabb)
            .unwrap_or_default();
        assert_eq!(aabb.min, vec3(4.0, -1.0, -1.0));
        assert_eq!(aabb.max, vec3(6.0, 1.0, 1.0));
    }

    #[test]
    fn light_update_copies_world_position() {
        let mut lib = library();
        let light = lib.create_point_light(Some("light"), vec3(0.0, 0.0, 0.0));
        let tkey = lib.keys().transform;
        lib.add_component(tkey, light);
        if let Some(t) = lib.get_component_mut(tkey, light) {
            t.translation = vec3(3.0, 4.0, 5.0);
        }
        run_transform_update_system(&mut lib);
        run_light_update_system(&mut lib);
        let key = lib.keys().light;
        let position = lib.get_component(key, light).map(|l| l.position);
        assert_eq!(position, Some(vec3(3.0, 4.0, 5.0)));
    }

    fn bump_scale(library: &mut ComponentLibrary, entity: Entity) {
        let key = library.keys().transform;
        if let Some(t) = library.get_component_mut(key, entity) {
            t.scale *= 2.0;
        }
    }

    #[test]
    fn play_once_scripts_run_exactly_once() {
        let mut lib = library();
        let entity = lib.create_transform(None);
        lib.attach_script(
            "scripts/grow.hs",
            ScriptFlags::PLAYING | ScriptFlags::PLAY_ONCE,
            entity,
        );
        let skey = lib.keys().script;
        if let Some(script) = lib.get_component_mut(skey, entity) {
            script.api = Some(ScriptApi { run: bump_scale });
        }

        run_script_update_system(&mut lib);
        run_script_update_system(&mut lib);

        let tkey = lib.keys().transform;
        let scale = lib.get_component(tkey, entity).map(|t| t.scale.x);
        assert_eq!(scale, Some(2.0));
        let flags = lib.get_component(skey, entity).map(|s| s.flags);
        assert_eq!(flags, Some(ScriptFlags::empty()));
    }

    #[test]
    fn animation_samples_translation_linearly() {
        let mut lib = library();
        let keys = *lib.keys();
        let target = lib.create_transform(Some("animated"));

        let data_entity = lib.create_entity(Some("clip data"));
        if let Some(data) = lib.add_component(keys.animation_data, data_entity) {
            data.key_times = vec![0.0, 1.0];
            data.key_values = vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0];
        }

        let clip = lib.create_entity(Some("clip"));
        if let Some(animation) = lib.add_component(keys.animation, clip) {
            animation.channels = vec![AnimationChannel {
                target,
                path: AnimationPath::Translation,
                sampler: 0,
            }];
            animation.samplers = vec![AnimationSampler {
                data: data_entity,
                interpolation: AnimationInterpolation::Linear,
            }];
            animation.end = 1.0;
            animation.speed = 1.0;
            animation.flags = AnimationFlags::PLAYING;
        }

        run_animation_update_system(&mut lib, 0.5);
        let translation = lib
            .get_component(keys.transform, target)
            .map(|t| t.translation);
        assert_eq!(translation, Some(vec3(5.0, 0.0, 0.0)));
    }
}
