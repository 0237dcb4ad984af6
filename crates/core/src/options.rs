/// Renderer toggles and tunables read once per frame.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeOptions {
    pub show_selected_bbox: bool,
    pub show_probes: bool,
    pub show_origin: bool,
    pub shadow_const_depth_bias: f32,
    pub shadow_slope_depth_bias: f32,
    pub outline_width: f32,
    pub wireframe: bool,
    pub image_based_lighting: bool,
    pub punctual_lighting: bool,
    pub multi_viewport_shadows: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            show_selected_bbox: true,
            show_probes: false,
            show_origin: false,
            shadow_const_depth_bias: -1.25,
            shadow_slope_depth_bias: -10.75,
            outline_width: 4.0,
            wireframe: false,
            image_based_lighting: true,
            punctual_lighting: true,
            multi_viewport_shadows: false,
        }
    }
}
