use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::backend::{Device, GpuError};
use crate::types::{
    ComputeShaderDesc, ComputeShaderHandle, GraphicsState, RenderPassLayoutHandle, ShaderDesc,
    ShaderHandle,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStage {
    Vertex,
    Fragment,
    Compute,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestStageDesc {
    pub stage: ManifestStage,
    pub path: String,
    #[serde(default = "default_entry")]
    pub entry: String,
}

fn default_entry() -> String {
    "main".to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstantType {
    Int,
    Uint,
    Float,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpecializationSlot {
    pub id: u32,
    pub ty: ConstantType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShaderManifestEntry {
    pub name: String,
    pub stages: Vec<ManifestStageDesc>,
    #[serde(default)]
    pub constants: Vec<SpecializationSlot>,
}

/// The shader manifest: the text file naming every graphics/compute entry
/// the renderer may request, with its stages and specialization slots.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShaderManifest {
    pub shaders: Vec<ShaderManifestEntry>,
}

impl ShaderManifest {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn get(&self, name: &str) -> Option<&ShaderManifestEntry> {
        self.shaders.iter().find(|s| s.name == name)
    }

    pub fn is_compute(&self, name: &str) -> bool {
        self.get(name)
            .map(|e| e.stages.iter().any(|s| s.stage == ManifestStage::Compute))
            .unwrap_or(false)
    }
}

/// Caches shader variants by a 64-bit hash of `(name, graphics state,
/// specialization bytes, render-pass layout, subpass)`. Creation goes
/// through the device once per distinct key.
pub struct ShaderVariantCache {
    manifest: ShaderManifest,
    graphics: HashMap<u64, ShaderHandle>,
    compute: HashMap<u64, ComputeShaderHandle>,
}

impl ShaderVariantCache {
    pub fn new(manifest: ShaderManifest) -> Self {
        Self {
            manifest,
            graphics: HashMap::new(),
            compute: HashMap::new(),
        }
    }

    pub fn manifest(&self) -> &ShaderManifest {
        &self.manifest
    }

    pub fn get_variant(
        &mut self,
        device: &dyn Device,
        name: &str,
        state: GraphicsState,
        constants: &[u8],
        pass_layout: Option<RenderPassLayoutHandle>,
        subpass: u32,
    ) -> Result<ShaderHandle, GpuError> {
        if self.manifest.get(name).is_none() {
            return Err(GpuError::ShaderVariantNotFound(name.to_string()));
        }
        let key = variant_key(name, Some(state), constants, pass_layout, subpass);
        if let Some(handle) = self.graphics.get(&key) {
            return Ok(*handle);
        }
        tracing::debug!("creating shader variant '{name}' ({key:016x})");
        let handle = device.create_shader(&ShaderDesc {
            name: name.to_string(),
            state,
            constants: constants.to_vec(),
            pass_layout,
            subpass,
        })?;
        self.graphics.insert(key, handle);
        Ok(handle)
    }

    pub fn get_compute_variant(
        &mut self,
        device: &dyn Device,
        name: &str,
        constants: &[u8],
    ) -> Result<ComputeShaderHandle, GpuError> {
        if !self.manifest.is_compute(name) {
            return Err(GpuError::ShaderVariantNotFound(name.to_string()));
        }
        let key = variant_key(name, None, constants, None, 0);
        if let Some(handle) = self.compute.get(&key) {
            return Ok(*handle);
        }
        let handle = device.create_compute_shader(&ComputeShaderDesc {
            name: name.to_string(),
            constants: constants.to_vec(),
        })?;
        self.compute.insert(key, handle);
        Ok(handle)
    }

    /// Drops every cached variant; used when a toggle that is baked into
    /// shaders (wireframe, lighting model) flips.
    pub fn clear(&mut self) {
        self.graphics.clear();
        self.compute.clear();
    }

    pub fn variant_count(&self) -> usize {
        self.graphics.len() + self.compute.len()
    }
}

fn variant_key(
    name: &str,
    state: Option<GraphicsState>,
    constants: &[u8],
    pass_layout: Option<RenderPassLayoutHandle>,
    subpass: u32,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    state.map(GraphicsState::to_bits).hash(&mut hasher);
    constants.hash(&mut hasher);
    pass_layout.map(|l| (l.index, l.generation)).hash(&mut hasher);
    subpass.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::NullDevice;

    fn manifest() -> ShaderManifest {
        let json = r#"{
            "shaders": [
                {
                    "name": "gbuffer_fill",
                    "stages": [
                        {"stage": "vertex", "path": "gbuffer_fill.vert"},
                        {"stage": "fragment", "path": "gbuffer_fill.frag"}
                    ],
                    "constants": [
                        {"id": 0, "ty": "int"},
                        {"id": 1, "ty": "int"}
                    ]
                },
                {
                    "name": "skinning",
                    "stages": [{"stage": "compute", "path": "skinning.comp"}]
                }
            ]
        }"#;
        match ShaderManifest::from_json(json.as_bytes()) {
            Ok(m) => m,
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn variants_are_cached_by_constants_and_state() {
        let device = NullDevice::new(Default::default());
        let mut cache = ShaderVariantCache::new(manifest());
        let state = GraphicsState::default();

        let a = cache
            .get_variant(&device, "gbuffer_fill", state, &[1, 0, 0, 0], None, 0)
            .ok();
        let b = cache
            .get_variant(&device, "gbuffer_fill", state, &[1, 0, 0, 0], None, 0)
            .ok();
        let c = cache
            .get_variant(&device, "gbuffer_fill", state, &[2, 0, 0, 0], None, 0)
            .ok();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.variant_count(), 2);
    }

    #[test]
    fn unknown_names_fail() {
        let device = NullDevice::new(Default::default());
        let mut cache = ShaderVariantCache::new(manifest());
        let err = cache
            .get_variant(
                &device,
                "does_not_exist",
                GraphicsState::default(),
                &[],
                None,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, GpuError::ShaderVariantNotFound(_)));
        // a graphics request against a compute-only entry still resolves the
        // entry; a compute request against a graphics entry does not
        assert!(cache
            .get_compute_variant(&device, "gbuffer_fill", &[])
            .is_err());
        assert!(cache.get_compute_variant(&device, "skinning", &[]).is_ok());
    }
}
