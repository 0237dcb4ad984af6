use glam::Vec2;

pub const MOUSE_BUTTON_COUNT: usize = 5;
pub const KEY_COUNT: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Extra1,
    Extra2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorHint {
    #[default]
    Arrow,
    TextInput,
    Hand,
    ResizeEw,
    ResizeNs,
    Hidden,
}

#[derive(Clone, Copy, Debug)]
pub struct KeyEvent {
    pub key: u32,
    pub down: bool,
}

/// Per-frame input and timing state the host's input backend fills in and
/// the engine reads. Events are cleared at the start of every frame.
pub struct IoContext {
    pub delta_time: f32,
    pub viewport_size: Vec2,
    pub viewport_scale: f32,
    pub viewport_resized: bool,

    pub mouse_position: Vec2,
    pub mouse_wheel: f32,
    mouse_down: [bool; MOUSE_BUTTON_COUNT],
    mouse_clicked: [bool; MOUSE_BUTTON_COUNT],
    mouse_released: [bool; MOUSE_BUTTON_COUNT],

    keys_down: [bool; KEY_COUNT],
    key_events: Vec<KeyEvent>,
    text_events: Vec<char>,

    pub cursor_hint: CursorHint,
    frame_count: u64,
}

impl Default for IoContext {
    fn default() -> Self {
        Self::new()
    }
}

impl IoContext {
    pub fn new() -> Self {
        Self {
            delta_time: 0.0,
            viewport_size: Vec2::new(1280.0, 720.0),
            viewport_scale: 1.0,
            viewport_resized: false,
            mouse_position: Vec2::ZERO,
            mouse_wheel: 0.0,
            mouse_down: [false; MOUSE_BUTTON_COUNT],
            mouse_clicked: [false; MOUSE_BUTTON_COUNT],
            mouse_released: [false; MOUSE_BUTTON_COUNT],
            keys_down: [false; KEY_COUNT],
            key_events: Vec::new(),
            text_events: Vec::new(),
            cursor_hint: CursorHint::Arrow,
            frame_count: 0,
        }
    }

    /// Rolls the context into a new frame: clears edge-triggered state and
    /// advances the frame counter.
    pub fn new_frame(&mut self, delta_time: f32) {
        self.delta_time = delta_time;
        self.mouse_wheel = 0.0;
        self.mouse_clicked = [false; MOUSE_BUTTON_COUNT];
        self.mouse_released = [false; MOUSE_BUTTON_COUNT];
        self.key_events.clear();
        self.text_events.clear();
        self.viewport_resized = false;
        self.cursor_hint = CursorHint::Arrow;
        self.frame_count += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn set_viewport_size(&mut self, size: Vec2, scale: f32) {
        if size != self.viewport_size || scale != self.viewport_scale {
            self.viewport_resized = true;
        }
        self.viewport_size = size;
        self.viewport_scale = scale;
    }

    pub fn add_mouse_button_event(&mut self, button: MouseButton, down: bool) {
        let index = button as usize;
        if down && !self.mouse_down[index] {
            self.mouse_clicked[index] = true;
        }
        if !down && self.mouse_down[index] {
            self.mouse_released[index] = true;
        }
        self.mouse_down[index] = down;
    }

    pub fn is_mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_down[button as usize]
    }

    pub fn was_mouse_clicked(&self, button: MouseButton) -> bool {
        self.mouse_clicked[button as usize]
    }

    pub fn was_mouse_released(&self, button: MouseButton) -> bool {
        self.mouse_released[button as usize]
    }

    pub fn add_key_event(&mut self, key: u32, down: bool) {
        if (key as usize) < KEY_COUNT {
            self.keys_down[key as usize] = down;
        }
        self.key_events.push(KeyEvent { key, down });
    }

    pub fn is_key_down(&self, key: u32) -> bool {
        (key as usize) < KEY_COUNT && self.keys_down[key as usize]
    }

    pub fn key_events(&self) -> &[KeyEvent] {
        &self.key_events
    }

    pub fn add_text_event(&mut self, character: char) {
        self.text_events.push(character);
    }

    pub fn text_events(&self) -> &[char] {
        &self.text_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clicks_are_edge_triggered() {
        let mut io = IoContext::new();
        io.add_mouse_button_event(MouseButton::Left, true);
        assert!(io.was_mouse_clicked(MouseButton::Left));
        io.new_frame(0.016);
        assert!(!io.was_mouse_clicked(MouseButton::Left));
        assert!(io.is_mouse_down(MouseButton::Left));
        io.add_mouse_button_event(MouseButton::Left, false);
        assert!(io.was_mouse_released(MouseButton::Left));
    }

    #[test]
    fn resize_flag_lasts_one_frame() {
        let mut io = IoContext::new();
        io.set_viewport_size(Vec2::new(800.0, 600.0), 1.0);
        assert!(io.viewport_resized);
        io.new_frame(0.016);
        assert!(!io.viewport_resized);
        assert_eq!(io.frame_count(), 1);
    }
}
