//! Shadow-map math: cascade splits and light cameras for directional
//! lights, and the six-face camera set for point-light omni shadows.
//! Draw submission happens in the frame graph; everything here is pure.

use glam::{Mat4, Vec3};
use helio_ecs::Light;

use crate::camera::Camera;
use crate::gpu_types::{gpu_mat4, GpuLightShadowData, GpuOmniShadowData, MAX_SHADOW_CASCADES};
use crate::shadow_atlas::PackedRect;

/// Default practical-split interpolation factor between logarithmic and
/// uniform cascade splits.
pub const DEFAULT_SPLIT_LAMBDA: f32 = 0.95;

/// Margin pulled back along the light direction so geometry slightly
/// behind the frustum still lands in the map.
const CASTER_MARGIN: f32 = 50.0;

#[derive(Clone, Copy, Debug)]
pub struct CascadeSetup {
    pub view_projections: [Mat4; MAX_SHADOW_CASCADES],
    /// World-depth split distances from the camera.
    pub splits: [f32; MAX_SHADOW_CASCADES],
    pub count: u32,
}

/// Practical split scheme: for each cascade, the split interpolates between
/// the logarithmic and uniform distributions by `lambda`. Explicit splits
/// on the light win when `lambda` is zero.
pub fn cascade_split_distances(
    near: f32,
    far: f32,
    cascade_count: u32,
    lambda: f32,
    explicit: &[f32; MAX_SHADOW_CASCADES],
) -> [f32; MAX_SHADOW_CASCADES] {
    let mut splits = [0.0f32; MAX_SHADOW_CASCADES];
    let count = cascade_count.clamp(1, MAX_SHADOW_CASCADES as u32);
    let clip_range = far - near;
    let ratio = far / near;
    for cascade in 0..count as usize {
        if lambda > 0.0 {
            let p = (cascade + 1) as f32 / count as f32;
            let log = near * ratio.powf(p);
            let uniform = near + clip_range * p;
            splits[cascade] = lambda * (log - uniform) + uniform;
        } else {
            splits[cascade] = explicit[cascade];
        }
    }
    splits
}

/// Builds the per-cascade light cameras for a directional light against the
/// given view camera. The frustum corners come from the inverse
/// view-projection at reverse-Z NDC depths (near = 1, far = 0), each
/// cascade slice gets a bounding sphere, and the light camera looks down
/// the light direction at it with a fixed caster margin.
pub fn compute_directional_cascades(
    camera: &Camera,
    light: &Light,
    lambda: f32,
) -> CascadeSetup {
    let near = camera.near;
    let far = camera.far;
    let clip_range = far - near;
    let count = light.cascade_count.clamp(1, MAX_SHADOW_CASCADES as u32);
    let splits = cascade_split_distances(near, far, count, lambda, &light.cascade_splits);

    let inverse_view_projection = camera.view_projection().inverse();
    let mut setup = CascadeSetup {
        view_projections: [Mat4::IDENTITY; MAX_SHADOW_CASCADES],
        splits,
        count,
    };

    let mut last_split = 0.0f32;
    for cascade in 0..count as usize {
        let split = (splits[cascade] - near) / clip_range;

        // reverse-Z: NDC depth 1 is the near plane, 0 the far plane
        let mut corners = [
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        for corner in &mut corners {
            let unprojected = inverse_view_projection * corner.extend(1.0);
            *corner = unprojected.truncate() / unprojected.w;
        }
        for i in 0..4 {
            let distance = corners[i + 4] - corners[i];
            corners[i + 4] = corners[i] + distance * split;
            corners[i] += distance * last_split;
        }

        let mut center = Vec3::ZERO;
        for corner in &corners {
            center += *corner;
        }
        center /= 8.0;

        let mut radius = 0.0f32;
        for corner in &corners {
            radius = radius.max(corner.distance(center));
        }
        radius = (radius * 16.0).ceil() / 16.0;

        let direction = light.direction.normalize_or_zero();
        let eye = center - direction * (radius + CASTER_MARGIN);
        let mut shadow_camera =
            Camera::orthographic(eye, radius * 2.0, radius * 2.0, 0.01, radius * 2.0 + CASTER_MARGIN);
        shadow_camera.look_at(eye, center);
        shadow_camera.update();

        setup.view_projections[cascade] = shadow_camera.view_projection();
        last_split = split;
    }
    setup
}

/// Shadow-table entry for a directional light packed at `rect`.
pub fn directional_shadow_data(
    camera: &Camera,
    light: &Light,
    rect: &PackedRect,
    atlas_resolution: u32,
    atlas_slot: i32,
    lambda: f32,
) -> (GpuLightShadowData, CascadeSetup) {
    let setup = compute_directional_cascades(camera, light, lambda);
    let mut data = GpuLightShadowData {
        factor: light.shadow_resolution as f32 / atlas_resolution as f32,
        x_offset: rect.x as f32 / atlas_resolution as f32,
        y_offset: rect.y as f32 / atlas_resolution as f32,
        shadow_map_tex_idx: atlas_slot,
        ..Default::default()
    };
    for cascade in 0..setup.count as usize {
        data.cascade_view_proj[cascade] = gpu_mat4(setup.view_projections[cascade]);
        data.cascade_splits[cascade] = setup.splits[cascade];
    }
    (data, setup)
}

/// Face orientations covering the cube in the 2×3 atlas layout:
/// +Z, -Z, +X, -X, up, down.
pub const OMNI_FACE_PITCH_YAW: [(f32, f32); 6] = [
    (0.0, 0.0),
    (0.0, std::f32::consts::PI),
    (0.0, std::f32::consts::FRAC_PI_2),
    (0.0, -std::f32::consts::FRAC_PI_2),
    (std::f32::consts::FRAC_PI_2, 0.0),
    (-std::f32::consts::FRAC_PI_2, 0.0),
];

/// Shadow-table entry plus the six face cameras for a point light. The
/// backend's cube convention flag decides whether the ±X faces swap.
pub fn point_shadow_data(
    light: &Light,
    rect: &PackedRect,
    atlas_resolution: u32,
    atlas_slot: i32,
    cube_face_left_handed: bool,
) -> (GpuOmniShadowData, [Camera; 6]) {
    let mut camera = Camera::perspective_reverse_z(
        light.position,
        std::f32::consts::FRAC_PI_2,
        1.0,
        light.radius,
        light.range,
    );
    let mut data = GpuOmniShadowData {
        factor: light.shadow_resolution as f32 / atlas_resolution as f32,
        x_offset: rect.x as f32 / atlas_resolution as f32,
        y_offset: rect.y as f32 / atlas_resolution as f32,
        shadow_map_tex_idx: atlas_slot,
        ..Default::default()
    };
    let mut cameras = [camera; 6];
    for (face, (pitch, yaw)) in OMNI_FACE_PITCH_YAW.iter().enumerate() {
        let slot = if cube_face_left_handed {
            face
        } else {
            // mirrored convention swaps the ±X faces
            match face {
                2 => 3,
                3 => 2,
                other => other,
            }
        };
        camera.set_pitch_yaw(*pitch, *yaw);
        camera.update();
        data.view_proj[slot] = gpu_mat4(camera.view_projection());
        cameras[slot] = camera;
    }
    (data, cameras)
}

/// Viewport origin of an omni face inside the light's 2×3 packed rect.
pub fn omni_face_viewport(rect: &PackedRect, resolution: u32, face: usize) -> (u32, u32) {
    let column = (face % 2) as u32;
    let row = (face / 2) as u32;
    (rect.x + column * resolution, rect.y + row * resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;
    use helio_ecs::{LightFlags, LightKind};

    fn view_camera() -> Camera {
        let mut camera = Camera::perspective_reverse_z(
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        );
        camera.look_at(Vec3::ZERO, vec3(0.0, 0.0, -10.0));
        camera.update();
        camera
    }

    fn sun() -> Light {
        Light {
            kind: LightKind::Directional,
            direction: vec3(0.0, -1.0, 0.0),
            cascade_count: 4,
            shadow_resolution: 2048,
            flags: LightFlags::CAST_SHADOW,
            ..Default::default()
        }
    }

    #[test]
    fn practical_splits_match_the_split_scheme() {
        let splits = cascade_split_distances(0.1, 100.0, 4, 0.5, &[0.0; 4]);
        // lambda 0.5 midpoints between the logarithmic and uniform schemes
        let expected = [12.8187, 26.606, 46.404, 100.0];
        for (split, expected) in splits.iter().zip(expected) {
            assert!(
                (split - expected).abs() / expected < 0.01,
                "{split} vs {expected}"
            );
        }
    }

    #[test]
    fn splits_are_strictly_monotonic_within_range() {
        for lambda in [0.1, 0.5, 0.95] {
            let splits = cascade_split_distances(0.1, 100.0, 4, lambda, &[0.0; 4]);
            assert!(splits[0] > 0.0);
            for i in 1..4 {
                assert!(splits[i] > splits[i - 1], "lambda {lambda}: {splits:?}");
            }
            assert!(splits[3] <= 100.0 + 1e-3);
        }
    }

    #[test]
    fn explicit_splits_bypass_the_scheme() {
        let light_splits = [5.0, 15.0, 45.0, 90.0];
        let splits = cascade_split_distances(0.1, 100.0, 4, 0.0, &light_splits);
        assert_eq!(splits, light_splits);
    }

    #[test]
    fn cascade_projections_contain_their_subfrustum_corners() {
        let camera = view_camera();
        let light = sun();
        let setup = compute_directional_cascades(&camera, &light, 0.5);
        assert_eq!(setup.count, 4);

        let inverse_view_projection = camera.view_projection().inverse();
        let mut last_split = 0.0f32;
        for cascade in 0..4 {
            let split = (setup.splits[cascade] - camera.near) / (camera.far - camera.near);
            let mut corners = [
                vec3(-1.0, 1.0, 1.0),
                vec3(-1.0, -1.0, 1.0),
                vec3(1.0, -1.0, 1.0),
                vec3(1.0, 1.0, 1.0),
                vec3(-1.0, 1.0, 0.0),
                vec3(-1.0, -1.0, 0.0),
                vec3(1.0, -1.0, 0.0),
                vec3(1.0, 1.0, 0.0),
            ];
            for corner in &mut corners {
                let unprojected = inverse_view_projection * corner.extend(1.0);
                *corner = unprojected.truncate() / unprojected.w;
            }
            for i in 0..4 {
                let distance = corners[i + 4] - corners[i];
                corners[i + 4] = corners[i] + distance * split;
                corners[i] += distance * last_split;
            }

            let view_projection = setup.view_projections[cascade];
            for corner in corners {
                let clip = view_projection * corner.extend(1.0);
                let ndc = clip.truncate() / clip.w;
                assert!(
                    ndc.x.abs() <= 1.0 + 1e-3 && ndc.y.abs() <= 1.0 + 1e-3,
                    "cascade {cascade}: xy {ndc:?}"
                );
                assert!(
                    (-1e-3..=1.0 + 1e-3).contains(&ndc.z),
                    "cascade {cascade}: z {ndc:?}"
                );
            }
            last_split = split;
        }
    }

    #[test]
    fn omni_faces_cover_all_directions() {
        let light = Light {
            kind: LightKind::Point,
            position: vec3(1.0, 2.0, 3.0),
            radius: 0.1,
            range: 50.0,
            shadow_resolution: 1024,
            flags: LightFlags::CAST_SHADOW,
            ..Default::default()
        };
        let rect = PackedRect {
            id: 0,
            x: 2048,
            y: 0,
            width: 2048,
            height: 3072,
            packed: true,
        };
        let (data, cameras) = point_shadow_data(&light, &rect, 8192, 7, true);
        assert_eq!(data.shadow_map_tex_idx, 7);
        assert!((data.factor - 1024.0 / 8192.0).abs() < 1e-6);

        // every axis direction lands inside exactly one face's frustum
        for direction in [
            Vec3::X,
            -Vec3::X,
            Vec3::Y,
            -Vec3::Y,
            Vec3::Z,
            -Vec3::Z,
        ] {
            let point = light.position + direction * 10.0;
            let mut hits = 0;
            for camera in &cameras {
                let clip = camera.view_projection() * point.extend(1.0);
                if clip.w > 0.0 {
                    let ndc = clip.truncate() / clip.w;
                    if ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0 && (0.0..=1.0).contains(&ndc.z) {
                        hits += 1;
                    }
                }
            }
            assert_eq!(hits, 1, "direction {direction:?}");
        }

        // faces tile the rect in a 2x3 grid
        assert_eq!(omni_face_viewport(&rect, 1024, 0), (2048, 0));
        assert_eq!(omni_face_viewport(&rect, 1024, 1), (3072, 0));
        assert_eq!(omni_face_viewport(&rect, 1024, 5), (3072, 2048));
    }
}
