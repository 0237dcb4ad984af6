//! Interface plumbing for the engine: named interface publication and
//! lookup, the process-wide data registry that survives hot reloads, and the
//! extension registry that loads, unloads and hot-swaps shared libraries.

mod api;
mod data;
mod extension;

pub use api::{ApiHandle, ApiRegistry, SwapCallback};
pub use data::DataRegistry;
pub use extension::{Extension, ExtensionDesc, ExtensionEntry, ExtensionRegistry};
