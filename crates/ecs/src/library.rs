use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::components::*;
use crate::entity::Entity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EcsError {
    #[error("component type '{0}' registered after finalize")]
    TypeRegistrationAfterFinalize(&'static str),
    #[error("component library created before finalize")]
    LibraryBeforeFinalize,
}

/// Anything storable as a component.
pub trait ComponentValue: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> ComponentValue for T {}

/// Key for a registered component type. A small integer; indexing a library
/// with it is O(1).
pub struct TypeKey<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypeKey<T> {
    fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

impl<T> Clone for TypeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for TypeKey<T> {}

impl<T> fmt::Debug for TypeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.index)
    }
}

/// Per-library, per-type payload a system can stash (staging caches, GPU
/// side data). Owned by the manager, survives entity churn.
pub type InternalData = Option<Box<dyn Any + Send + Sync>>;

/// Optional per-library lifecycle hooks for a component type.
#[derive(Clone, Copy, Default)]
pub struct TypeHooks {
    pub init: Option<fn(&mut InternalData)>,
    pub reset: Option<fn(&mut InternalData)>,
    pub cleanup: Option<fn(&mut InternalData)>,
}

/// Describes a component type at registration: name, the template cloned
/// into fresh slots, and lifecycle hooks.
pub struct ComponentDesc<T> {
    pub name: &'static str,
    pub template: T,
    pub hooks: TypeHooks,
}

impl<T> ComponentDesc<T> {
    pub fn new(name: &'static str, template: T) -> Self {
        Self {
            name,
            template,
            hooks: TypeHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: TypeHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

trait AnyStorage: Send + Sync {
    fn push_template(&mut self);
    fn swap_remove(&mut self, index: usize);
    fn len(&self) -> usize;
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct VecStorage<T: ComponentValue> {
    data: Vec<T>,
    template: T,
}

impl<T: ComponentValue> AnyStorage for VecStorage<T> {
    fn push_template(&mut self) {
        self.data.push(self.template.clone());
    }
    fn swap_remove(&mut self, index: usize) {
        self.data.swap_remove(index);
    }
    fn len(&self) -> usize {
        self.data.len()
    }
    fn clear(&mut self) {
        self.data.clear();
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct RegisteredType {
    name: &'static str,
    make_storage: Arc<dyn Fn() -> Box<dyn AnyStorage> + Send + Sync>,
    hooks: TypeHooks,
}

/// Type keys for the component types every library carries.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinKeys {
    pub tag: TypeKey<Tag>,
    pub layer: TypeKey<Layer>,
    pub transform: TypeKey<Transform>,
    pub hierarchy: TypeKey<Hierarchy>,
    pub script: TypeKey<Script>,
    pub object: TypeKey<Object>,
    pub mesh: TypeKey<Mesh>,
    pub material: TypeKey<Material>,
    pub skin: TypeKey<Skin>,
    pub light: TypeKey<Light>,
    pub environment_probe: TypeKey<EnvironmentProbe>,
    pub humanoid: TypeKey<Humanoid>,
    pub animation: TypeKey<Animation>,
    pub animation_data: TypeKey<AnimationData>,
}

/// Registry of component types. Types are registered up front, the context
/// is finalized, and only then can libraries be created; after finalize no
/// new types may be added.
pub struct EcsContext {
    types: Vec<RegisteredType>,
    finalized: bool,
    keys: BuiltinKeys,
}

impl Default for EcsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EcsContext {
    pub fn new() -> Self {
        let mut ctx = Self {
            types: Vec::new(),
            finalized: false,
            // placeholder, overwritten below once the real keys exist
            keys: BuiltinKeys {
                tag: TypeKey::new(0),
                layer: TypeKey::new(0),
                transform: TypeKey::new(0),
                hierarchy: TypeKey::new(0),
                script: TypeKey::new(0),
                object: TypeKey::new(0),
                mesh: TypeKey::new(0),
                material: TypeKey::new(0),
                skin: TypeKey::new(0),
                light: TypeKey::new(0),
                environment_probe: TypeKey::new(0),
                humanoid: TypeKey::new(0),
                animation: TypeKey::new(0),
                animation_data: TypeKey::new(0),
            },
        };
        ctx.keys = BuiltinKeys {
            tag: ctx.register_infallible(ComponentDesc::new("Tag", Tag::default())),
            layer: ctx.register_infallible(ComponentDesc::new("Layer", Layer::default())),
            transform: ctx
                .register_infallible(ComponentDesc::new("Transform", Transform::default())),
            hierarchy: ctx
                .register_infallible(ComponentDesc::new("Hierarchy", Hierarchy::default())),
            script: ctx.register_infallible(ComponentDesc::new("Script", Script::default())),
            object: ctx.register_infallible(ComponentDesc::new("Object", Object::default())),
            mesh: ctx.register_infallible(ComponentDesc::new("Mesh", Mesh::default())),
            material: ctx.register_infallible(ComponentDesc::new("Material", Material::default())),
            skin: ctx.register_infallible(ComponentDesc::new("Skin", Skin::default())),
            light: ctx.register_infallible(ComponentDesc::new("Light", Light::default())),
            environment_probe: ctx.register_infallible(ComponentDesc::new(
                "Environment Probe",
                EnvironmentProbe::default(),
            )),
            humanoid: ctx.register_infallible(ComponentDesc::new("Humanoid", Humanoid::default())),
            animation: ctx
                .register_infallible(ComponentDesc::new("Animation", Animation::default())),
            animation_data: ctx.register_infallible(ComponentDesc::new(
                "Animation Data",
                AnimationData::default(),
            )),
        };
        ctx
    }

    fn register_infallible<T: ComponentValue>(&mut self, desc: ComponentDesc<T>) -> TypeKey<T> {
        match self.register_type(desc) {
            Ok(key) => key,
            Err(_) => unreachable!("builtin registration happens before finalize"),
        }
    }

    pub fn register_type<T: ComponentValue>(
        &mut self,
        desc: ComponentDesc<T>,
    ) -> Result<TypeKey<T>, EcsError> {
        if self.finalized {
            tracing::error!("component type '{}' registered after finalize", desc.name);
            return Err(EcsError::TypeRegistrationAfterFinalize(desc.name));
        }
        let index = self.types.len() as u32;
        let template = desc.template;
        self.types.push(RegisteredType {
            name: desc.name,
            make_storage: Arc::new(move || {
                Box::new(VecStorage {
                    data: Vec::new(),
                    template: template.clone(),
                })
            }),
            hooks: desc.hooks,
        });
        tracing::debug!("registered component type '{}' ({index})", desc.name);
        Ok(TypeKey::new(index))
    }

    /// Freezes the type set. Calling it again is a no-op.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn keys(&self) -> &BuiltinKeys {
        &self.keys
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn create_library(&self) -> Result<ComponentLibrary, EcsError> {
        if !self.finalized {
            return Err(EcsError::LibraryBeforeFinalize);
        }
        let mut managers: Vec<Manager> = self
            .types
            .iter()
            .map(|ty| Manager {
                name: ty.name,
                storage: (ty.make_storage)(),
                entities: Vec::new(),
                sparse: Vec::new(),
                internal: None,
                hooks: ty.hooks,
            })
            .collect();
        for manager in &mut managers {
            if let Some(init) = manager.hooks.init {
                init(&mut manager.internal);
            }
        }
        Ok(ComponentLibrary {
            managers,
            generations: Vec::new(),
            free_indices: Vec::new(),
            names: HashMap::new(),
            keys: self.keys,
        })
    }
}

const INVALID_DENSE: u32 = u32::MAX;

struct Manager {
    name: &'static str,
    storage: Box<dyn AnyStorage>,
    entities: Vec<Entity>,
    /// entity index -> dense index
    sparse: Vec<u32>,
    internal: InternalData,
    hooks: TypeHooks,
}

impl Manager {
    fn dense_index(&self, entity: Entity) -> Option<usize> {
        let dense = *self.sparse.get(entity.index as usize)?;
        if dense == INVALID_DENSE {
            return None;
        }
        let dense = dense as usize;
        (self.entities[dense] == entity).then_some(dense)
    }

    fn storage<T: ComponentValue>(&self) -> &VecStorage<T> {
        self.storage
            .as_any()
            .downcast_ref::<VecStorage<T>>()
            .expect("component type key does not match its library")
    }

    fn storage_mut<T: ComponentValue>(&mut self) -> &mut VecStorage<T> {
        self.storage
            .as_any_mut()
            .downcast_mut::<VecStorage<T>>()
            .expect("component type key does not match its library")
    }

    fn get<T: ComponentValue>(&self, entity: Entity) -> Option<&T> {
        let dense = self.dense_index(entity)?;
        Some(&self.storage::<T>().data[dense])
    }

    fn get_mut<T: ComponentValue>(&mut self, entity: Entity) -> Option<&mut T> {
        let dense = self.dense_index(entity)?;
        Some(&mut self.storage_mut::<T>().data[dense])
    }

    fn add<T: ComponentValue>(&mut self, entity: Entity) -> &mut T {
        if let Some(dense) = self.dense_index(entity) {
            return &mut self.storage_mut::<T>().data[dense];
        }
        let dense = self.storage.len();
        self.storage.push_template();
        self.entities.push(entity);
        if self.sparse.len() <= entity.index as usize {
            self.sparse.resize(entity.index as usize + 1, INVALID_DENSE);
        }
        self.sparse[entity.index as usize] = dense as u32;
        &mut self.storage_mut::<T>().data[dense]
    }

    /// Swap-removes the entity's component, patching the sparse map for the
    /// element that moved into the freed slot.
    fn remove(&mut self, entity: Entity) {
        let Some(dense) = self.dense_index(entity) else {
            return;
        };
        self.storage.swap_remove(dense);
        self.entities.swap_remove(dense);
        self.sparse[entity.index as usize] = INVALID_DENSE;
        if dense < self.entities.len() {
            let moved = self.entities[dense];
            self.sparse[moved.index as usize] = dense as u32;
        }
    }

    fn components<T: ComponentValue>(&self) -> (&[T], &[Entity]) {
        (&self.storage::<T>().data, &self.entities)
    }

    fn reset(&mut self) {
        self.storage.clear();
        self.entities.clear();
        self.sparse.clear();
        if let Some(reset) = self.hooks.reset {
            reset(&mut self.internal);
        }
    }
}

/// A set of entities and their components. Owns one dense manager per
/// registered type plus the entity slot table and name index.
pub struct ComponentLibrary {
    managers: Vec<Manager>,
    generations: Vec<u32>,
    free_indices: Vec<u32>,
    names: HashMap<String, u32>,
    keys: BuiltinKeys,
}

impl ComponentLibrary {
    pub fn keys(&self) -> &BuiltinKeys {
        &self.keys
    }

    /// Creates an entity, reusing a freed slot when one exists, and attaches
    /// a [`Tag`]. A provided name is also inserted into the name index.
    pub fn create_entity(&mut self, name: Option<&str>) -> Entity {
        let index = match self.free_indices.pop() {
            Some(index) => index,
            None => {
                self.generations.push(0);
                (self.generations.len() - 1) as u32
            }
        };
        let entity = Entity::new(index, self.generations[index as usize]);
        let tag_key = self.keys.tag;
        if let Some(tag) = self.add_component(tag_key, entity) {
            if let Some(name) = name {
                tag.name = name.to_string();
            }
        }
        if let Some(name) = name {
            self.names.insert(name.to_string(), index);
        }
        entity
    }

    /// Frees the entity: its index goes on the free list, the slot
    /// generation is bumped so stale handles die, and every component the
    /// entity has is swap-removed.
    pub fn remove_entity(&mut self, entity: Entity) {
        if !self.is_valid(entity) {
            return;
        }
        let tag_key = self.keys.tag;
        if let Some(tag) = self.get_component(tag_key, entity) {
            let name = tag.name.clone();
            if self.names.get(&name) == Some(&entity.index) {
                self.names.remove(&name);
            }
        }
        for manager in &mut self.managers {
            manager.remove(entity);
        }
        self.generations[entity.index as usize] += 1;
        self.free_indices.push(entity.index);
    }

    pub fn is_valid(&self, entity: Entity) -> bool {
        !entity.is_null()
            && self
                .generations
                .get(entity.index as usize)
                .is_some_and(|g| *g == entity.generation)
    }

    /// Looks up an entity by the name it was created with.
    pub fn get_entity(&self, name: &str) -> Option<Entity> {
        let index = *self.names.get(name)?;
        Some(Entity::new(index, self.generations[index as usize]))
    }

    /// Refreshes a possibly stale handle to whatever currently lives at its
    /// index.
    pub fn get_current_entity(&self, entity: Entity) -> Entity {
        match self.generations.get(entity.index as usize) {
            Some(generation) => Entity::new(entity.index, *generation),
            None => Entity::NULL,
        }
    }

    /// Attaches a component of the keyed type, initialized from the type's
    /// template. Attaching to an entity that already has the component
    /// returns the existing slot. Null or stale entities return `None`.
    pub fn add_component<T: ComponentValue>(
        &mut self,
        key: TypeKey<T>,
        entity: Entity,
    ) -> Option<&mut T> {
        if !self.is_valid(entity) {
            return None;
        }
        Some(self.managers[key.index as usize].add(entity))
    }

    pub fn get_component<T: ComponentValue>(&self, key: TypeKey<T>, entity: Entity) -> Option<&T> {
        if !self.is_valid(entity) {
            return None;
        }
        self.managers[key.index as usize].get(entity)
    }

    pub fn get_component_mut<T: ComponentValue>(
        &mut self,
        key: TypeKey<T>,
        entity: Entity,
    ) -> Option<&mut T> {
        if !self.is_valid(entity) {
            return None;
        }
        self.managers[key.index as usize].get_mut(entity)
    }

    pub fn has_component<T: ComponentValue>(&self, key: TypeKey<T>, entity: Entity) -> bool {
        self.get_component(key, entity).is_some()
    }

    /// Dense views for batch iteration; `components[i]` belongs to
    /// `entities[i]`. Order is not stable across removals.
    pub fn get_components<T: ComponentValue>(&self, key: TypeKey<T>) -> (&[T], &[Entity]) {
        self.managers[key.index as usize].components()
    }

    pub fn get_components_mut<T: ComponentValue>(
        &mut self,
        key: TypeKey<T>,
    ) -> (&mut [T], &[Entity]) {
        let Manager {
            storage, entities, ..
        } = &mut self.managers[key.index as usize];
        let data = &mut storage
            .as_any_mut()
            .downcast_mut::<VecStorage<T>>()
            .expect("component type key does not match its library")
            .data;
        (data, entities)
    }

    /// Number of live components of the keyed type.
    pub fn component_count<T: ComponentValue>(&self, key: TypeKey<T>) -> usize {
        self.managers[key.index as usize].storage.len()
    }

    pub fn entity_count(&self) -> usize {
        self.generations.len() - self.free_indices.len()
    }

    pub fn type_name(&self, index: u32) -> &'static str {
        self.managers[index as usize].name
    }

    pub fn set_internal_data<T: ComponentValue>(
        &mut self,
        key: TypeKey<T>,
        data: Box<dyn Any + Send + Sync>,
    ) {
        self.managers[key.index as usize].internal = Some(data);
    }

    pub fn get_internal_data<T: ComponentValue, D: 'static>(&self, key: TypeKey<T>) -> Option<&D> {
        self.managers[key.index as usize]
            .internal
            .as_ref()?
            .downcast_ref::<D>()
    }

    pub fn get_internal_data_mut<T: ComponentValue, D: 'static>(
        &mut self,
        key: TypeKey<T>,
    ) -> Option<&mut D> {
        self.managers[key.index as usize]
            .internal
            .as_mut()?
            .downcast_mut::<D>()
    }

    /// Drops every entity and component, runs the per-type reset hooks, and
    /// keeps the registered type set.
    pub fn reset(&mut self) {
        for manager in &mut self.managers {
            manager.reset();
        }
        self.generations.clear();
        self.free_indices.clear();
        self.names.clear();
    }

    /// Runs the per-type cleanup hooks. The library is unusable afterwards
    /// apart from being dropped.
    pub fn cleanup(&mut self) {
        for manager in &mut self.managers {
            manager.reset();
            if let Some(cleanup) = manager.hooks.cleanup {
                cleanup(&mut manager.internal);
            }
            manager.internal = None;
        }
    }

    /// Local matrices of the entity's ancestors, composed root-first. Used
    /// by the hierarchy update so chains resolve no matter the iteration
    /// order of the hierarchy manager.
    pub fn compute_parent_transform(&self, child: Entity) -> glam::Mat4 {
        let mut result = glam::Mat4::IDENTITY;
        let mut cursor = match self.get_component(self.keys.hierarchy, child) {
            Some(h) => h.parent,
            None => return result,
        };
        while !cursor.is_null() {
            if let Some(parent_transform) = self.get_component(self.keys.transform, cursor) {
                result = parent_transform.local_matrix() * result;
            }
            cursor = match self.get_component(self.keys.hierarchy, cursor) {
                Some(h) => h.parent,
                None => break,
            };
        }
        result
    }

    // convenience constructors

    pub fn create_transform(&mut self, name: Option<&str>) -> Entity {
        let entity = self.create_entity(name);
        let key = self.keys.transform;
        self.add_component(key, entity);
        entity
    }

    /// Creates an object entity carrying both an [`Object`] and its own
    /// [`Transform`].
    pub fn create_object(&mut self, name: Option<&str>) -> Entity {
        let entity = self.create_entity(name);
        let (object_key, transform_key) = (self.keys.object, self.keys.transform);
        self.add_component(transform_key, entity);
        if let Some(object) = self.add_component(object_key, entity) {
            object.transform = entity;
        }
        entity
    }

    pub fn create_material(&mut self, name: Option<&str>) -> Entity {
        let entity = self.create_entity(name);
        let key = self.keys.material;
        self.add_component(key, entity);
        entity
    }

    pub fn create_mesh(&mut self, name: Option<&str>) -> Entity {
        let entity = self.create_entity(name);
        let key = self.keys.mesh;
        self.add_component(key, entity);
        entity
    }

    pub fn create_script(&mut self, file: &str, flags: ScriptFlags) -> Entity {
        let entity = self.create_entity(Some(file));
        self.attach_script(file, flags, entity);
        entity
    }

    pub fn attach_script(&mut self, file: &str, flags: ScriptFlags, entity: Entity) {
        let key = self.keys.script;
        if let Some(script) = self.add_component(key, entity) {
            script.file = file.to_string();
            script.flags = flags;
        }
    }

    pub fn create_directional_light(&mut self, name: Option<&str>, direction: glam::Vec3) -> Entity {
        let entity = self.create_entity(name);
        let key = self.keys.light;
        if let Some(light) = self.add_component(key, entity) {
            light.kind = LightKind::Directional;
            light.direction = direction.normalize_or_zero();
        }
        entity
    }

    pub fn create_point_light(&mut self, name: Option<&str>, position: glam::Vec3) -> Entity {
        let entity = self.create_entity(name);
        let key = self.keys.light;
        if let Some(light) = self.add_component(key, entity) {
            light.kind = LightKind::Point;
            light.position = position;
        }
        entity
    }

    pub fn create_spot_light(
        &mut self,
        name: Option<&str>,
        position: glam::Vec3,
        direction: glam::Vec3,
    ) -> Entity {
        let entity = self.create_entity(name);
        let key = self.keys.light;
        if let Some(light) = self.add_component(key, entity) {
            light.kind = LightKind::Spot;
            light.position = position;
            light.direction = direction.normalize_or_zero();
        }
        entity
    }

    pub fn create_environment_probe(&mut self, name: Option<&str>) -> Entity {
        let entity = self.create_entity(name);
        let (probe_key, transform_key) = (self.keys.environment_probe, self.keys.transform);
        self.add_component(transform_key, entity);
        self.add_component(probe_key, entity);
        entity
    }

    /// Parents `entity` under `parent`, adding the hierarchy component when
    /// missing.
    pub fn attach_component(&mut self, entity: Entity, parent: Entity) {
        let key = self.keys.hierarchy;
        if let Some(hierarchy) = self.add_component(key, entity) {
            hierarchy.parent = parent;
        }
    }

    pub fn deattach_component(&mut self, entity: Entity) {
        let key = self.keys.hierarchy;
        if let Some(hierarchy) = self.add_component(key, entity) {
            hierarchy.parent = Entity::NULL;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> ComponentLibrary {
        let mut ctx = EcsContext::new();
        ctx.finalize();
        match ctx.create_library() {
            Ok(lib) => lib,
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn registration_after_finalize_fails() {
        let mut ctx = EcsContext::new();
        ctx.finalize();
        ctx.finalize(); // idempotent
        let err = ctx
            .register_type(ComponentDesc::new("Late", 0u32))
            .unwrap_err();
        assert_eq!(err, EcsError::TypeRegistrationAfterFinalize("Late"));
    }

    #[test]
    fn create_library_requires_finalize() {
        let ctx = EcsContext::new();
        assert!(matches!(
            ctx.create_library(),
            Err(EcsError::LibraryBeforeFinalize)
        ));
    }

    #[test]
    fn entities_get_tags_and_names() {
        let mut lib = library();
        let named = lib.create_entity(Some("camera"));
        let anonymous = lib.create_entity(None);

        let tag_key = lib.keys().tag;
        assert_eq!(lib.get_component(tag_key, named).unwrap().name, "camera");
        assert_eq!(
            lib.get_component(tag_key, anonymous).unwrap().name,
            "unnamed"
        );
        assert_eq!(lib.get_entity("camera"), Some(named));
        assert_eq!(lib.get_entity("unnamed"), None);
    }

    #[test]
    fn add_component_twice_returns_same_slot() {
        let mut lib = library();
        let e = lib.create_entity(None);
        let key = lib.keys().transform;
        if let Some(t) = lib.add_component(key, e) {
            t.translation.x = 5.0;
        }
        let again = lib.add_component(key, e).map(|t| t.translation.x);
        assert_eq!(again, Some(5.0));
        assert_eq!(lib.component_count(key), 1);
    }

    #[test]
    fn null_entity_operations_are_noops() {
        let mut lib = library();
        let key = lib.keys().transform;
        assert!(lib.add_component(key, Entity::NULL).is_none());
        assert!(lib.get_component(key, Entity::NULL).is_none());
        lib.remove_entity(Entity::NULL);
    }

    #[test]
    fn swap_remove_preserves_density_and_alignment() {
        let mut lib = library();
        let key = lib.keys().transform;
        let entities: Vec<Entity> = (0..10)
            .map(|i| {
                let e = lib.create_entity(None);
                if let Some(t) = lib.add_component(key, e) {
                    t.translation.x = i as f32;
                }
                e
            })
            .collect();

        lib.remove_entity(entities[3]);
        lib.remove_entity(entities[7]);

        let (components, owners) = lib.get_components(key);
        assert_eq!(components.len(), owners.len());
        assert_eq!(components.len(), 8);
        for (i, owner) in owners.iter().enumerate() {
            assert!(lib.is_valid(*owner));
            let via_lookup = lib.get_component(key, *owner);
            assert_eq!(via_lookup.map(|t| t.translation.x), Some(components[i].translation.x));
        }
        assert!(lib.get_component(key, entities[3]).is_none());
    }

    #[test]
    fn stale_handles_after_index_reuse() {
        let mut lib = library();
        let first = lib.create_entity(Some("a"));
        lib.remove_entity(first);
        let second = lib.create_entity(Some("b"));

        assert_eq!(second.index, first.index);
        assert_eq!(second.generation, first.generation + 1);
        assert!(!lib.is_valid(first));
        assert!(lib.is_valid(second));
        assert_eq!(lib.get_current_entity(first), second);
    }

    #[test]
    fn internal_data_round_trip() {
        let mut lib = library();
        let key = lib.keys().skin;
        lib.set_internal_data(key, Box::new(vec![1u32, 2, 3]));
        let data = lib.get_internal_data::<Skin, Vec<u32>>(key);
        assert_eq!(data, Some(&vec![1u32, 2, 3]));
    }

    #[test]
    fn reset_clears_everything() {
        let mut lib = library();
        lib.create_entity(Some("a"));
        lib.create_entity(None);
        lib.reset();
        assert_eq!(lib.entity_count(), 0);
        assert_eq!(lib.get_entity("a"), None);
        let e = lib.create_entity(None);
        assert_eq!(e.generation, 0);
    }
}
