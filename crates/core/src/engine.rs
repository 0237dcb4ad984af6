use std::sync::Arc;

use helio_registry::{ApiRegistry, DataRegistry, ExtensionRegistry};

use crate::io::IoContext;
use crate::jobs::JobSystem;
use crate::options::RuntimeOptions;
use crate::vfs::{FileSystem, StdFileSystem};

/// The engine value the host owns. Everything that used to be a cross-module
/// global (registries, job system, IO, options) hangs off this so hot
/// reloads have one survivable root.
pub struct Engine {
    pub apis: ApiRegistry,
    pub data: DataRegistry,
    pub extensions: ExtensionRegistry,
    pub jobs: JobSystem,
    pub io: IoContext,
    pub options: RuntimeOptions,
    pub files: Arc<dyn FileSystem>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            apis: ApiRegistry::new(),
            data: DataRegistry::new(),
            extensions: ExtensionRegistry::new(),
            jobs: JobSystem::new(0),
            io: IoContext::new(),
            options: RuntimeOptions::default(),
            files: Arc::new(StdFileSystem::new()),
        }
    }

    pub fn with_file_system(files: Arc<dyn FileSystem>) -> Self {
        Self {
            files,
            ..Self::new()
        }
    }

    /// Polls loaded extension libraries for on-disk changes and hot-swaps
    /// the ones that changed. Called between frames.
    pub fn handle_extension_reloads(&mut self) {
        self.extensions.handle_reloads(&mut self.apis);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
