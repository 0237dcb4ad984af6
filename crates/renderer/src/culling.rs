//! Frustum culling. The per-drawable test is a separating-axis test
//! between the view-space OBB of the drawable's world AABB and the camera
//! frustum, which rejects the large diagonal boxes a plane-only test lets
//! through. Work fans out over the job system, one drawable per invocation.

use std::sync::Arc;

use glam::Vec3;
use helio_core::{BatchOutput, JobSystem};
use helio_ecs::Aabb;

use crate::camera::{Camera, CameraKind};

struct Obb {
    center: Vec3,
    extents: Vec3,
    axes: [Vec3; 3],
}

/// Exact frustum/AABB intersection for a reverse-Z perspective camera.
pub fn sat_visibility_test(camera: &Camera, aabb: &Aabb) -> bool {
    debug_assert_eq!(camera.kind, CameraKind::PerspectiveReverseZ);
    if aabb.is_empty() {
        return false;
    }

    let tan_fov = (0.5 * camera.fov_y).tan();
    let z_near = camera.near;
    let z_far = camera.far;
    let x_near = camera.aspect * z_near * tan_fov;
    let y_near = z_near * tan_fov;

    // four adjacent corners of the AABB, moved into view space. The view
    // matrix is right-handed, so flip Z to keep the frustum along +Z the
    // way the projections below expect.
    let view = camera.view();
    let to_view = |p: Vec3| {
        let v = view.transform_point3(p);
        Vec3::new(v.x, v.y, -v.z)
    };
    let corners = [
        to_view(Vec3::new(aabb.min.x, aabb.min.y, aabb.min.z)),
        to_view(Vec3::new(aabb.max.x, aabb.min.y, aabb.min.z)),
        to_view(Vec3::new(aabb.min.x, aabb.max.y, aabb.min.z)),
        to_view(Vec3::new(aabb.min.x, aabb.min.y, aabb.max.z)),
    ];

    let mut axes = [
        corners[1] - corners[0],
        corners[2] - corners[0],
        corners[3] - corners[0],
    ];
    let center = corners[0] + 0.5 * (axes[0] + axes[1] + axes[2]);
    let lengths = Vec3::new(axes[0].length(), axes[1].length(), axes[2].length());
    for (axis, length) in axes.iter_mut().zip([lengths.x, lengths.y, lengths.z]) {
        *axis /= length.max(1e-20);
    }
    let obb = Obb {
        center,
        extents: lengths * 0.5,
        axes,
    };

    // axis along the frustum
    {
        let center_z = obb.center.z;
        let mut radius = 0.0;
        for i in 0..3 {
            radius += obb.axes[i].z.abs() * obb.extents[i];
        }
        if center_z - radius > z_far || center_z + radius < z_near {
            return false;
        }
    }

    let project = |m: Vec3, obb: &Obb| -> bool {
        let m_x = m.x.abs();
        let m_y = m.y.abs();
        let m_z = m.z;
        let center = m.dot(obb.center);

        let mut radius = 0.0;
        for i in 0..3 {
            radius += m.dot(obb.axes[i]).abs() * obb.extents[i];
        }
        let obb_min = center - radius;
        let obb_max = center + radius;

        let p = x_near * m_x + y_near * m_y;
        let mut tau_0 = z_near * m_z - p;
        let mut tau_1 = z_near * m_z + p;
        if tau_0 < 0.0 {
            tau_0 *= z_far / z_near;
        }
        if tau_1 > 0.0 {
            tau_1 *= z_far / z_near;
        }
        obb_min > tau_1 || obb_max < tau_0
    };

    // frustum side planes
    let side_normals = [
        Vec3::new(z_near, 0.0, x_near),
        Vec3::new(-z_near, 0.0, x_near),
        Vec3::new(0.0, -z_near, y_near),
        Vec3::new(0.0, z_near, y_near),
    ];
    for normal in side_normals {
        if project(normal, &obb) {
            return false;
        }
    }

    // OBB axes
    for i in 0..3 {
        if project(obb.axes[i], &obb) {
            return false;
        }
    }

    // R × A_i and U × A_i edge cross products
    for i in 0..3 {
        let m = Vec3::new(0.0, -obb.axes[i].z, obb.axes[i].y);
        if project(m, &obb) {
            return false;
        }
        let m = Vec3::new(obb.axes[i].z, 0.0, -obb.axes[i].x);
        if project(m, &obb) {
            return false;
        }
    }

    // frustum edges × A_i
    for i in 0..3 {
        let edge_axes = [
            Vec3::new(-x_near, 0.0, z_near).cross(obb.axes[i]),
            Vec3::new(x_near, 0.0, z_near).cross(obb.axes[i]),
            Vec3::new(0.0, y_near, z_near).cross(obb.axes[i]),
            Vec3::new(0.0, -y_near, z_near).cross(obb.axes[i]),
        ];
        for m in edge_axes {
            const EPSILON: f32 = 1e-4;
            if m.x.abs() < EPSILON && m.y.abs() < EPSILON && m.z.abs() < EPSILON {
                continue;
            }
            if project(m, &obb) {
                return false;
            }
        }
    }

    true
}

/// Conservative plane test: invisible only when all eight corners fall
/// outside one frustum plane. Kept as the reference the SAT is validated
/// against.
pub fn plane_visibility_test(camera: &Camera, aabb: &Aabb) -> bool {
    if aabb.is_empty() {
        return false;
    }
    let view_projection = camera.view_projection();
    let corners = aabb.corners();
    // clip-space planes: -w <= x <= w, -w <= y <= w, 0 <= z <= w
    let mut outside = [0u32; 6];
    for corner in corners {
        let clip = view_projection * corner.extend(1.0);
        if clip.x < -clip.w {
            outside[0] += 1;
        }
        if clip.x > clip.w {
            outside[1] += 1;
        }
        if clip.y < -clip.w {
            outside[2] += 1;
        }
        if clip.y > clip.w {
            outside[3] += 1;
        }
        if clip.z < 0.0 {
            outside[4] += 1;
        }
        if clip.z > clip.w {
            outside[5] += 1;
        }
    }
    outside.iter().all(|count| *count < 8)
}

/// Culls every drawable AABB against the camera in parallel, returning one
/// visibility bit per input.
#[profiling::function]
pub fn cull_aabbs(jobs: &JobSystem, camera: &Camera, aabbs: Arc<Vec<Aabb>>) -> Vec<bool> {
    let count = aabbs.len();
    let camera = *camera;
    let output = BatchOutput::new(count, false);
    let task_output = output.clone();
    let counter = jobs.dispatch_batch(count as u32, 0, move |i| {
        let visible = sat_visibility_test(&camera, &aabbs[i as usize]);
        // SAFETY: invocation i writes only element i
        unsafe { task_output.write(i as usize, visible) };
    });
    jobs.wait_for_counter(&counter);
    output.take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn camera() -> Camera {
        Camera::perspective_reverse_z(Vec3::ZERO, std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0)
    }

    #[test]
    fn boxes_in_front_are_visible() {
        let camera = camera();
        // forward is +Z at yaw 0
        let aabb = Aabb::new(vec3(-1.0, -1.0, 9.0), vec3(1.0, 1.0, 11.0));
        assert!(sat_visibility_test(&camera, &aabb));
        assert!(plane_visibility_test(&camera, &aabb));
    }

    #[test]
    fn boxes_behind_are_invisible() {
        let camera = camera();
        let aabb = Aabb::new(vec3(-1.0, -1.0, -11.0), vec3(1.0, 1.0, -9.0));
        assert!(!sat_visibility_test(&camera, &aabb));
        assert!(!plane_visibility_test(&camera, &aabb));
    }

    #[test]
    fn sat_agrees_with_plane_reference() {
        let camera = camera();
        let mut rng = Pcg64::seed_from_u64(99);
        let mut checked_inside = 0;
        for _ in 0..2000 {
            let center = vec3(
                rng.gen_range(-150.0..150.0),
                rng.gen_range(-150.0..150.0),
                rng.gen_range(-150.0..150.0),
            );
            let half = vec3(
                rng.gen_range(0.1..20.0),
                rng.gen_range(0.1..20.0),
                rng.gen_range(0.1..20.0),
            );
            let aabb = Aabb::new(center - half, center + half);

            let sat = sat_visibility_test(&camera, &aabb);
            let plane = plane_visibility_test(&camera, &aabb);
            // SAT is exact, the plane test conservative: SAT-visible boxes
            // must never be plane-rejected
            if sat {
                assert!(plane, "SAT visible but plane-rejected: {aabb:?}");
            }
            // a box whose center is inside the frustum intersects it
            let clip = camera.view_projection() * center.extend(1.0);
            let inside = clip.w > 0.0
                && clip.x.abs() <= clip.w
                && clip.y.abs() <= clip.w
                && clip.z >= 0.0
                && clip.z <= clip.w;
            if inside {
                checked_inside += 1;
                assert!(sat, "center inside frustum but SAT-rejected: {aabb:?}");
            }
        }
        assert!(checked_inside > 20);
    }

    #[test]
    fn parallel_culling_matches_serial(){
        let jobs = JobSystem::new(4);
        let camera = camera();
        let mut rng = Pcg64::seed_from_u64(3);
        let aabbs: Vec<Aabb> = (0..500)
            .map(|_| {
                let center = vec3(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                );
                Aabb::from_center_radius(center, rng.gen_range(0.1..5.0))
            })
            .collect();
        let expected: Vec<bool> = aabbs
            .iter()
            .map(|aabb| sat_visibility_test(&camera, aabb))
            .collect();
        let actual = cull_aabbs(&jobs, &camera, Arc::new(aabbs));
        assert_eq!(expected, actual);
    }
}
