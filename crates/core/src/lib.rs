//! Host-side plumbing: the [`Engine`] value that roots every cross-module
//! singleton, the worker-thread job system, per-frame IO state, runtime
//! options and the application entry points.

mod app;
mod engine;
mod io;
mod jobs;
mod options;
mod vfs;

pub use app::{App, Host, APP_DATA_KEY};
pub use engine::Engine;
pub use io::{CursorHint, IoContext, KeyEvent, MouseButton};
pub use jobs::{BatchOutput, JobCounter, JobSystem};
pub use options::RuntimeOptions;
pub use vfs::{FileHandle, FileMode, FileSystem, StdFileSystem};
