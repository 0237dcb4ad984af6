use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use libloading::Library;

use crate::api::{ApiHandle, ApiRegistry};

/// Entry points every extension library exports. `reloading` is false on the
/// initial load/unload pair and true across a hot swap, where `load` is
/// expected to call [`ApiRegistry::replace`] for each of its interfaces.
pub type ExtensionEntry = unsafe extern "C" fn(&mut ApiRegistry, &mut Extension, bool);

/// How to locate and drive one extension shared library.
#[derive(Debug, Clone)]
pub struct ExtensionDesc {
    pub name: String,
    pub lib_path: PathBuf,
    /// Directory the library is copied into before opening, so the original
    /// stays writable for rebuilds.
    pub transient_dir: PathBuf,
    pub lock_path: PathBuf,
    pub load_symbol: String,
    pub unload_symbol: String,
}

impl ExtensionDesc {
    pub fn new(name: impl Into<String>, lib_path: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            lib_path: lib_path.into(),
            transient_dir: std::env::temp_dir(),
            lock_path: PathBuf::from("./lock.tmp"),
            load_symbol: format!("{name}_load"),
            unload_symbol: format!("{name}_unload"),
            name,
        }
    }
}

/// A loaded extension. Handed to the extension's own entry points so it can
/// record the interfaces it published and find them again on unload.
pub struct Extension {
    pub desc: ExtensionDesc,
    apis: Vec<(String, ApiHandle)>,
}

impl Extension {
    fn new(desc: ExtensionDesc) -> Self {
        Self {
            desc,
            apis: Vec::new(),
        }
    }

    /// Remembers an interface this extension registered, for later lookup
    /// and for removal on unload.
    pub fn record_api(&mut self, name: impl Into<String>, interface: ApiHandle) {
        self.apis.push((name.into(), interface));
    }

    pub fn take_recorded_api(&mut self, name: &str) -> Option<ApiHandle> {
        let pos = self.apis.iter().position(|(n, _)| n == name)?;
        Some(self.apis.swap_remove(pos).1)
    }

    pub fn get_api(&self, name: &str) -> Option<ApiHandle> {
        self.apis
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, api)| api.clone())
    }

    pub fn api_count(&self) -> usize {
        self.apis.len()
    }
}

enum ExtensionCode {
    /// Compiled into the host; used by tests and statically linked builds.
    Static {
        load: ExtensionEntry,
        unload: ExtensionEntry,
    },
    /// A shared library opened from a transient copy.
    Dynamic {
        library: Library,
        transient_path: PathBuf,
        modified: SystemTime,
        reload_count: u32,
    },
}

struct LoadedExtension {
    extension: Extension,
    code: ExtensionCode,
}

/// Tracks loaded extension libraries and hot-swaps them when their file on
/// disk changes.
#[derive(Default)]
pub struct ExtensionRegistry {
    loaded: Vec<LoadedExtension>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the library described by `desc` and runs its load entry point.
    /// Loading a path that is already resident is a no-op.
    pub fn load(&mut self, api: &mut ApiRegistry, desc: ExtensionDesc) -> anyhow::Result<()> {
        if self
            .loaded
            .iter()
            .any(|l| l.extension.desc.lib_path == desc.lib_path)
        {
            return Ok(());
        }

        let modified = file_modified(&desc.lib_path)
            .with_context(|| format!("extension library {:?} not found", desc.lib_path))?;
        let transient_path = transient_copy(&desc, 0)?;

        // SAFETY: the extension contract is that load/unload symbols have the
        // ExtensionEntry ABI and the library stays resident while its
        // interfaces are registered.
        let library = unsafe { Library::new(&transient_path) }
            .with_context(|| format!("failed to open {transient_path:?}"))?;
        let (load, _) = resolve_entries(&library, &desc)?;

        let mut extension = Extension::new(desc);
        unsafe { load(api, &mut extension, false) };
        tracing::info!(
            "loaded extension '{}' ({} apis)",
            extension.desc.name,
            extension.api_count()
        );

        self.loaded.push(LoadedExtension {
            extension,
            code: ExtensionCode::Dynamic {
                library,
                transient_path,
                modified,
                reload_count: 0,
            },
        });
        Ok(())
    }

    /// Registers an extension whose entry points are compiled into the host.
    pub fn load_static(
        &mut self,
        api: &mut ApiRegistry,
        desc: ExtensionDesc,
        load: ExtensionEntry,
        unload: ExtensionEntry,
    ) {
        if self
            .loaded
            .iter()
            .any(|l| l.extension.desc.lib_path == desc.lib_path)
        {
            return;
        }
        let mut extension = Extension::new(desc);
        unsafe { load(api, &mut extension, false) };
        self.loaded.push(LoadedExtension {
            extension,
            code: ExtensionCode::Static { load, unload },
        });
    }

    /// Runs the extension's unload entry point and closes its library.
    pub fn unload(&mut self, api: &mut ApiRegistry, name: &str) -> anyhow::Result<()> {
        let pos = self
            .loaded
            .iter()
            .position(|l| l.extension.desc.name == name)
            .with_context(|| format!("extension '{name}' not loaded"))?;
        let mut loaded = self.loaded.swap_remove(pos);
        let unload = match &loaded.code {
            ExtensionCode::Static { unload, .. } => *unload,
            ExtensionCode::Dynamic { library, .. } => {
                resolve_entries(library, &loaded.extension.desc)?.1
            }
        };
        unsafe { unload(api, &mut loaded.extension, false) };
        tracing::info!("unloaded extension '{name}'");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.loaded
            .iter()
            .map(|l| &l.extension)
            .find(|e| e.desc.name == name)
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    /// Polls the on-disk timestamps of every loaded library and hot-swaps
    /// those that changed. A swap that fails at any step keeps the previous
    /// library and its interfaces.
    pub fn handle_reloads(&mut self, api: &mut ApiRegistry) {
        for loaded in &mut self.loaded {
            let ExtensionCode::Dynamic {
                library,
                transient_path,
                modified,
                reload_count,
            } = &mut loaded.code
            else {
                continue;
            };

            let desc = &loaded.extension.desc;
            let Ok(current) = file_modified(&desc.lib_path) else {
                continue;
            };
            if current <= *modified {
                continue;
            }
            *modified = current;

            match reload_one(api, &mut loaded.extension, *reload_count + 1) {
                Ok((new_library, new_transient)) => {
                    // release the old handle only after the swap completed
                    let old = std::mem::replace(library, new_library);
                    if let Ok((_, unload)) = resolve_entries(&old, &loaded.extension.desc) {
                        unsafe { unload(api, &mut loaded.extension, true) };
                    }
                    drop(old);
                    *transient_path = new_transient;
                    *reload_count += 1;
                    tracing::info!("reloaded extension '{}'", loaded.extension.desc.name);
                }
                Err(err) => {
                    tracing::error!(
                        "reload of extension '{}' failed, keeping previous: {err:#}",
                        loaded.extension.desc.name
                    );
                }
            }
        }
    }
}

fn reload_one(
    api: &mut ApiRegistry,
    extension: &mut Extension,
    generation: u32,
) -> anyhow::Result<(Library, PathBuf)> {
    let transient_path = transient_copy(&extension.desc, generation)?;
    // SAFETY: same contract as the initial load.
    let library = unsafe { Library::new(&transient_path) }
        .with_context(|| format!("failed to open {transient_path:?}"))?;
    let (load, _) = resolve_entries(&library, &extension.desc)?;
    unsafe { load(api, extension, true) };
    Ok((library, transient_path))
}

fn resolve_entries(
    library: &Library,
    desc: &ExtensionDesc,
) -> anyhow::Result<(ExtensionEntry, ExtensionEntry)> {
    // SAFETY: symbol types are fixed by the extension ABI.
    let load = unsafe {
        *library
            .get::<ExtensionEntry>(desc.load_symbol.as_bytes())
            .with_context(|| format!("missing symbol '{}'", desc.load_symbol))?
    };
    let unload = unsafe {
        *library
            .get::<ExtensionEntry>(desc.unload_symbol.as_bytes())
            .with_context(|| format!("missing symbol '{}'", desc.unload_symbol))?
    };
    Ok((load, unload))
}

fn transient_copy(desc: &ExtensionDesc, generation: u32) -> anyhow::Result<PathBuf> {
    let file_name = desc
        .lib_path
        .file_name()
        .with_context(|| format!("bad extension path {:?}", desc.lib_path))?
        .to_string_lossy()
        .into_owned();
    let transient = desc
        .transient_dir
        .join(format!("{}_{generation}_{file_name}", desc.name));
    std::fs::copy(&desc.lib_path, &transient)
        .with_context(|| format!("failed to copy {:?} to {transient:?}", desc.lib_path))?;
    Ok(transient)
}

fn file_modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct DrawApi;

    unsafe extern "C" fn test_load(api: &mut ApiRegistry, ext: &mut Extension, reloading: bool) {
        let interface: ApiHandle = Arc::new(DrawApi);
        if reloading {
            if let Some(old) = ext.take_recorded_api("draw") {
                api.replace(&old, interface.clone());
            }
        } else {
            api.add("draw", interface.clone());
        }
        ext.record_api("draw", interface);
    }

    unsafe extern "C" fn test_unload(api: &mut ApiRegistry, ext: &mut Extension, _reloading: bool) {
        if let Some(interface) = ext.take_recorded_api("draw") {
            api.remove(&interface);
        }
    }

    fn desc(name: &str) -> ExtensionDesc {
        ExtensionDesc::new(name, format!("lib{name}.so"))
    }

    #[test]
    fn load_then_unload_restores_counts() {
        let mut api = ApiRegistry::new();
        let mut extensions = ExtensionRegistry::new();
        let before = api.len();

        extensions.load_static(&mut api, desc("draw"), test_load, test_unload);
        assert_eq!(api.count("draw"), 1);
        assert_eq!(extensions.get("draw").unwrap().api_count(), 1);

        extensions.unload(&mut api, "draw").unwrap();
        assert_eq!(api.len(), before);
        assert!(extensions.is_empty());
    }

    #[test]
    fn loading_same_path_twice_is_idempotent() {
        let mut api = ApiRegistry::new();
        let mut extensions = ExtensionRegistry::new();
        extensions.load_static(&mut api, desc("draw"), test_load, test_unload);
        extensions.load_static(&mut api, desc("draw"), test_load, test_unload);
        assert_eq!(extensions.len(), 1);
        assert_eq!(api.count("draw"), 1);
    }

    #[test]
    fn missing_library_is_an_error() {
        let mut api = ApiRegistry::new();
        let mut extensions = ExtensionRegistry::new();
        let result = extensions.load(&mut api, desc("does_not_exist"));
        assert!(result.is_err());
        assert!(extensions.is_empty());
    }
}
