use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::Engine;

/// Key the persistent app state is published under in the data registry so
/// it survives a hot reload of the app library.
pub const APP_DATA_KEY: &str = "app";

/// The application entry points the host drives. `load` runs on first load
/// and again on every reload of the app library, receiving the prior state
/// when there is one; the other callbacks run at the documented times, with
/// `shutdown` guaranteed last.
pub trait App: Send {
    fn load(
        &mut self,
        engine: &mut Engine,
        prior: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Arc<dyn Any + Send + Sync>;
    fn setup(&mut self, engine: &mut Engine);
    fn resize(&mut self, engine: &mut Engine) {
        let _ = engine;
    }
    fn update(&mut self, engine: &mut Engine);
    fn shutdown(&mut self, engine: &mut Engine);
}

/// Minimal frame driver: reload poll, input frame roll, app update. The
/// windowing layer calls `resize` itself when the swapchain changes.
pub struct Host {
    engine: Engine,
    last_frame: Instant,
}

impl Host {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            last_frame: Instant::now(),
        }
    }

    pub fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn start(&mut self, app: &mut dyn App) {
        let prior = self.engine.data.get_data(APP_DATA_KEY);
        let state = app.load(&mut self.engine, prior);
        self.engine.data.set_data(APP_DATA_KEY, state);
        app.setup(&mut self.engine);
        self.last_frame = Instant::now();
    }

    pub fn run_frame(&mut self, app: &mut dyn App) {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.engine.handle_extension_reloads();
        let resized = self.engine.io.viewport_resized;
        self.engine.io.new_frame(delta);
        if resized {
            app.resize(&mut self.engine);
        }
        app.update(&mut self.engine);
    }

    pub fn stop(&mut self, app: &mut dyn App) {
        app.shutdown(&mut self.engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingApp {
        loads: u32,
        updates: u32,
        resizes: u32,
        shutdowns: u32,
    }

    impl App for CountingApp {
        fn load(
            &mut self,
            _engine: &mut Engine,
            prior: Option<Arc<dyn Any + Send + Sync>>,
        ) -> Arc<dyn Any + Send + Sync> {
            self.loads += 1;
            // reload path: prior state survives through the data registry
            prior.unwrap_or_else(|| Arc::new(42u64))
        }
        fn setup(&mut self, _engine: &mut Engine) {}
        fn resize(&mut self, _engine: &mut Engine) {
            self.resizes += 1;
        }
        fn update(&mut self, _engine: &mut Engine) {
            self.updates += 1;
        }
        fn shutdown(&mut self, _engine: &mut Engine) {
            self.shutdowns += 1;
        }
    }

    #[test]
    fn host_drives_the_app_lifecycle() {
        let mut host = Host::new(Engine::new());
        let mut app = CountingApp::default();

        host.start(&mut app);
        host.run_frame(&mut app);
        host.run_frame(&mut app);
        host.engine().io.set_viewport_size(glam::Vec2::new(640.0, 480.0), 1.0);
        host.run_frame(&mut app);
        host.stop(&mut app);

        assert_eq!(app.loads, 1);
        assert_eq!(app.updates, 3);
        assert_eq!(app.resizes, 1);
        assert_eq!(app.shutdowns, 1);
        assert_eq!(host.engine().io.frame_count(), 3);

        // app state survives in the data registry for the next load
        let state = host.engine().data.get_as::<u64>(APP_DATA_KEY);
        assert_eq!(state.as_deref(), Some(&42));
    }
}
