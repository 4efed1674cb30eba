// world.rs - Runtime object world
//
// The host runtime's object model: a generation-checked arena of named
// objects, a class registry, deferred (pending-kill) destruction and a
// tiny loader used by locators that ask for `ResolveFlags::Load`.

use crate::handle::Slots;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

crate::define_handle!(ObjectHandle, "Handle to an object living in a `World`.");

/// Name of an object class.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectClass(String);

impl ObjectClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectClass {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

bitflags! {
    /// Markers carried by runtime objects.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ObjectTags: u32 {
        /// Spawned and owned by a sequence.
        const SEQUENCER_OWNED = 1 << 0;
        /// Spawned for an editor preview of a replaceable binding.
        const PREVIEW_ACTOR = 1 << 1;
        /// Never persisted with the world.
        const TRANSIENT = 1 << 2;
        const HIDDEN = 1 << 3;
        /// Destroyed but not yet collected; still occupies its name.
        const PENDING_KILL = 1 << 4;
    }
}

/// Whether the world is a live game world or an editor (preview) world.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldKind {
    #[default]
    Game,
    Editor,
}

/// A single object in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeObject {
    pub name: String,
    pub class: ObjectClass,
    pub outer: Option<ObjectHandle>,
    pub tags: ObjectTags,
    /// Bound-object proxy: when set, resolution surfaces this object instead.
    pub proxy_target: Option<ObjectHandle>,
    pub properties: BTreeMap<String, f32>,
}

impl RuntimeObject {
    pub fn is_hidden(&self) -> bool {
        self.tags.contains(ObjectTags::HIDDEN)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("class '{class}' is not registered")]
    UnknownClass { class: ObjectClass },

    #[error("class '{class}' is abstract and cannot be instantiated")]
    AbstractClass { class: ObjectClass },

    #[error("an object named '{name}' already exists in this scope")]
    NameTaken { name: String },

    #[error("object {handle} no longer exists")]
    DeadHandle { handle: ObjectHandle },
}

#[derive(Debug, Clone, Copy)]
struct ClassInfo {
    is_abstract: bool,
}

/// The object world sequences bind to and spawn into.
pub struct World {
    kind: WorldKind,
    classes: HashMap<ObjectClass, ClassInfo>,
    objects: Slots<RuntimeObject>,
    names: HashMap<(Option<ObjectHandle>, String), ObjectHandle>,
    loadable: HashMap<String, ObjectClass>,
    pending_loads: Vec<String>,
}

impl World {
    pub fn new(kind: WorldKind) -> Self {
        Self {
            kind,
            classes: HashMap::new(),
            objects: Slots::new(),
            names: HashMap::new(),
            loadable: HashMap::new(),
            pending_loads: Vec::new(),
        }
    }

    pub fn kind(&self) -> WorldKind {
        self.kind
    }

    /// Editor worlds are preview contexts.
    pub fn is_preview(&self) -> bool {
        self.kind == WorldKind::Editor
    }

    pub fn register_class(&mut self, class: impl Into<ObjectClass>) {
        self.classes
            .insert(class.into(), ClassInfo { is_abstract: false });
    }

    pub fn register_abstract_class(&mut self, class: impl Into<ObjectClass>) {
        self.classes
            .insert(class.into(), ClassInfo { is_abstract: true });
    }

    /// Whether objects of `class` can be instantiated.
    pub fn is_instantiable(&self, class: &ObjectClass) -> bool {
        self.classes
            .get(class)
            .map_or(false, |info| !info.is_abstract)
    }

    /// Create an object named `name` under `outer`.
    pub fn create_object(
        &mut self,
        class: &ObjectClass,
        name: &str,
        outer: Option<ObjectHandle>,
    ) -> Result<ObjectHandle, WorldError> {
        match self.classes.get(class) {
            None => {
                return Err(WorldError::UnknownClass {
                    class: class.clone(),
                })
            }
            Some(info) if info.is_abstract => {
                return Err(WorldError::AbstractClass {
                    class: class.clone(),
                })
            }
            Some(_) => {}
        }

        let name_key = (outer, name.to_string());
        if self.names.contains_key(&name_key) {
            return Err(WorldError::NameTaken {
                name: name.to_string(),
            });
        }

        let (index, generation) = self.objects.insert(RuntimeObject {
            name: name.to_string(),
            class: class.clone(),
            outer,
            tags: ObjectTags::empty(),
            proxy_target: None,
            properties: BTreeMap::new(),
        });
        let handle = ObjectHandle::new(index, generation);
        self.names.insert(name_key, handle);
        Ok(handle)
    }

    /// Destroy an object immediately, freeing its name.
    ///
    /// Returns false if the handle is stale.
    pub fn destroy_object(&mut self, handle: ObjectHandle) -> bool {
        match self.objects.remove(handle.index(), handle.generation()) {
            Some(object) => {
                self.names.remove(&(object.outer, object.name));
                true
            }
            None => false,
        }
    }

    /// Flag an object for destruction at the next `collect_garbage`.
    pub fn mark_pending_kill(&mut self, handle: ObjectHandle) -> bool {
        match self.get_mut(handle) {
            Some(object) => {
                object.tags.insert(ObjectTags::PENDING_KILL);
                true
            }
            None => false,
        }
    }

    /// Destroy every pending-kill object. Returns the number collected.
    pub fn collect_garbage(&mut self) -> usize {
        let doomed: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|(_, _, object)| object.tags.contains(ObjectTags::PENDING_KILL))
            .map(|(index, generation, _)| ObjectHandle::new(index, generation))
            .collect();
        for handle in &doomed {
            self.destroy_object(*handle);
        }
        doomed.len()
    }

    /// The object exists (it may be pending kill).
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.objects.get(handle.index(), handle.generation()).is_some()
    }

    /// The object exists and is not pending kill.
    pub fn is_valid(&self, handle: ObjectHandle) -> bool {
        self.get(handle)
            .map_or(false, |object| !object.tags.contains(ObjectTags::PENDING_KILL))
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&RuntimeObject> {
        self.objects.get(handle.index(), handle.generation())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut RuntimeObject> {
        self.objects.get_mut(handle.index(), handle.generation())
    }

    /// Find an object by name within `outer` (top level when `None`).
    pub fn find(&self, outer: Option<ObjectHandle>, name: &str) -> Option<ObjectHandle> {
        self.names.get(&(outer, name.to_string())).copied()
    }

    pub fn rename(&mut self, handle: ObjectHandle, new_name: &str) -> Result<(), WorldError> {
        let (outer, old_name) = match self.get(handle) {
            Some(object) => (object.outer, object.name.clone()),
            None => return Err(WorldError::DeadHandle { handle }),
        };
        if old_name == new_name {
            return Ok(());
        }
        let new_key = (outer, new_name.to_string());
        if self.names.contains_key(&new_key) {
            return Err(WorldError::NameTaken {
                name: new_name.to_string(),
            });
        }
        self.names.remove(&(outer, old_name));
        self.names.insert(new_key, handle);
        if let Some(object) = self.get_mut(handle) {
            object.name = new_name.to_string();
        }
        Ok(())
    }

    /// `base` if free, otherwise `base_1`, `base_2`, ...
    pub fn make_unique_name(&self, outer: Option<ObjectHandle>, base: &str) -> String {
        if self.find(outer, base).is_none() {
            return base.to_string();
        }
        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if self.find(outer, &candidate).is_none() {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn set_proxy_target(&mut self, handle: ObjectHandle, target: Option<ObjectHandle>) -> bool {
        match self.get_mut(handle) {
            Some(object) => {
                object.proxy_target = target;
                true
            }
            None => false,
        }
    }

    /// Declare a top-level object that can be loaded on demand.
    pub fn register_loadable(&mut self, path: impl Into<String>, class: impl Into<ObjectClass>) {
        self.loadable.insert(path.into(), class.into());
    }

    /// Queue an asynchronous load; the object appears after
    /// `process_pending_loads`. Returns false if nothing loadable has that path.
    pub fn request_load(&mut self, path: &str) -> bool {
        if !self.loadable.contains_key(path) {
            return false;
        }
        if !self.pending_loads.iter().any(|pending| pending == path) {
            self.pending_loads.push(path.to_string());
        }
        true
    }

    pub fn pending_loads(&self) -> &[String] {
        &self.pending_loads
    }

    /// Complete every queued load.
    pub fn process_pending_loads(&mut self) -> Vec<ObjectHandle> {
        let pending = std::mem::take(&mut self.pending_loads);
        pending
            .iter()
            .filter_map(|path| self.load_now(path))
            .collect()
    }

    /// Load synchronously. Already-present objects are returned as-is.
    pub fn load_now(&mut self, path: &str) -> Option<ObjectHandle> {
        if let Some(existing) = self.find(None, path) {
            return Some(existing);
        }
        let class = self.loadable.get(path)?.clone();
        match self.create_object(&class, path, None) {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(path, %err, "failed to load object");
                None
            }
        }
    }

    /// Iterate live objects in slot order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectHandle, &RuntimeObject)> {
        self.objects
            .iter()
            .map(|(index, generation, object)| (ObjectHandle::new(index, generation), object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldKind::Game)
    }
}
