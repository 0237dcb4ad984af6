//! Shadow-atlas rectangle packing. Every shadow-casting light contributes
//! one rectangle per shadowed view (directional: all cascades side by side;
//! point: six faces in a 2×3 layout; spot: a single square) and all of them
//! are packed into the scene's atlas texture each time the light set
//! changes.

use helio_ecs::{Light, LightFlags, LightKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedRect {
    /// Index of the light this rect belongs to (dense light index).
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub packed: bool,
}

impl PackedRect {
    pub fn new(id: u32, width: u32, height: u32) -> Self {
        Self {
            id,
            x: 0,
            y: 0,
            width,
            height,
            packed: false,
        }
    }
}

/// The atlas footprint a light requests, by light type.
pub fn light_shadow_rect(id: u32, light: &Light) -> PackedRect {
    let resolution = light.shadow_resolution;
    match light.kind {
        LightKind::Directional => {
            PackedRect::new(id, resolution * light.cascade_count.max(1), resolution)
        }
        LightKind::Point => PackedRect::new(id, resolution * 2, resolution * 3),
        LightKind::Spot => PackedRect::new(id, resolution, resolution),
    }
}

/// Builds the rect list for a light table: one rect per view for
/// directional lights, one for point and spot lights. Lights that do not
/// cast shadows contribute nothing.
pub fn collect_shadow_rects(lights: &[Light], view_count: u32) -> Vec<PackedRect> {
    let mut rects = Vec::new();
    for (index, light) in lights.iter().enumerate() {
        if !light.flags.contains(LightFlags::CAST_SHADOW) {
            continue;
        }
        match light.kind {
            LightKind::Directional => {
                for _ in 0..view_count {
                    rects.push(light_shadow_rect(index as u32, light));
                }
            }
            LightKind::Point | LightKind::Spot => {
                rects.push(light_shadow_rect(index as u32, light));
            }
        }
    }
    rects
}

/// Skyline bottom-left packer. Rects are placed in the order given; the
/// position chosen is the lowest (then leftmost) spot the rect fits.
/// Returns false if any rect failed to pack; failed rects keep
/// `packed == false` so callers can drop just those shadows.
pub fn pack_rects(atlas_width: u32, atlas_height: u32, rects: &mut [PackedRect]) -> bool {
    // (x, y, width) spans covering [0, atlas_width)
    let mut skyline: Vec<(u32, u32, u32)> = vec![(0, 0, atlas_width)];
    let mut all_packed = true;

    for rect in rects.iter_mut() {
        rect.packed = false;
        if rect.width == 0 || rect.height == 0 || rect.width > atlas_width {
            all_packed = false;
            continue;
        }

        let mut best: Option<(u32, u32)> = None; // (x, y)
        for start in 0..skyline.len() {
            let x = skyline[start].0;
            if x + rect.width > atlas_width {
                break;
            }
            // the rect spans every segment under [x, x + width)
            let mut y = 0;
            let mut covered = 0;
            for segment in &skyline[start..] {
                if segment.0 >= x + rect.width {
                    break;
                }
                y = y.max(segment.1);
                covered = segment.0 + segment.2;
                if covered >= x + rect.width {
                    break;
                }
            }
            if covered < x + rect.width || y + rect.height > atlas_height {
                continue;
            }
            let better = match best {
                None => true,
                Some((bx, by)) => y < by || (y == by && x < bx),
            };
            if better {
                best = Some((x, y));
            }
        }

        let Some((x, y)) = best else {
            all_packed = false;
            continue;
        };
        rect.x = x;
        rect.y = y;
        rect.packed = true;

        // splice the new top into the skyline
        let top = y + rect.height;
        let mut updated: Vec<(u32, u32, u32)> = Vec::with_capacity(skyline.len() + 2);
        for &(sx, sy, sw) in &skyline {
            let s_end = sx + sw;
            let r_end = x + rect.width;
            if s_end <= x || sx >= r_end {
                updated.push((sx, sy, sw));
                continue;
            }
            if sx < x {
                updated.push((sx, sy, x - sx));
            }
            if s_end > r_end {
                updated.push((r_end, sy, s_end - r_end));
            }
        }
        updated.push((x, top, rect.width));
        updated.sort_by_key(|segment| segment.0);
        // merge adjacent segments at equal height
        let mut merged: Vec<(u32, u32, u32)> = Vec::with_capacity(updated.len());
        for segment in updated {
            match merged.last_mut() {
                Some(last) if last.1 == segment.1 && last.0 + last.2 == segment.0 => {
                    last.2 += segment.2;
                }
                _ => merged.push(segment),
            }
        }
        skyline = merged;
    }

    all_packed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: &PackedRect, b: &PackedRect) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    #[test]
    fn directional_point_and_spot_pack_into_8k_atlas() {
        let mut directional = Light {
            kind: LightKind::Directional,
            cascade_count: 4,
            shadow_resolution: 2048,
            flags: LightFlags::CAST_SHADOW,
            ..Default::default()
        };
        directional.cascade_splits = [0.0; 4];
        let point = Light {
            kind: LightKind::Point,
            shadow_resolution: 1024,
            flags: LightFlags::CAST_SHADOW,
            ..Default::default()
        };
        let spot = Light {
            kind: LightKind::Spot,
            shadow_resolution: 512,
            flags: LightFlags::CAST_SHADOW,
            ..Default::default()
        };

        let lights = vec![directional, point, spot];
        let mut rects = collect_shadow_rects(&lights, 1);
        assert_eq!(rects.len(), 3);
        assert_eq!((rects[0].width, rects[0].height), (8192, 2048));
        assert_eq!((rects[1].width, rects[1].height), (2048, 3072));
        assert_eq!((rects[2].width, rects[2].height), (512, 512));

        assert!(pack_rects(8192, 8192, &mut rects));
        assert!(rects.iter().all(|r| r.packed));
        // the directional strip sits flush against an atlas edge
        assert_eq!((rects[0].x, rects[0].y), (0, 0));
        for i in 0..rects.len() {
            for j in i + 1..rects.len() {
                assert!(!overlaps(&rects[i], &rects[j]), "{i} overlaps {j}");
            }
            assert!(rects[i].x + rects[i].width <= 8192);
            assert!(rects[i].y + rects[i].height <= 8192);
        }
    }

    #[test]
    fn overflow_marks_only_the_failing_rect() {
        let mut rects = vec![
            PackedRect::new(0, 1024, 1024),
            PackedRect::new(1, 1024, 1024),
            PackedRect::new(2, 1024, 1024),
        ];
        assert!(!pack_rects(1024, 2048, &mut rects));
        assert!(rects[0].packed);
        assert!(rects[1].packed);
        assert!(!rects[2].packed);
    }

    #[test]
    fn packing_is_disjoint_and_in_bounds_for_many_sizes() {
        let sizes = [256u32, 512, 128, 1024, 256, 512, 384, 640, 768, 128];
        let mut rects: Vec<PackedRect> = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| PackedRect::new(i as u32, *s, *s))
            .collect();
        assert!(pack_rects(2048, 2048, &mut rects));
        for i in 0..rects.len() {
            assert!(rects[i].packed);
            assert!(rects[i].x + rects[i].width <= 2048);
            assert!(rects[i].y + rects[i].height <= 2048);
            for j in i + 1..rects.len() {
                assert!(!overlaps(&rects[i], &rects[j]));
            }
        }
    }
}
