//! Custom bindings
//!
//! A custom binding replaces locator lookup with its own resolution strategy.
//! The set of kinds is closed: spawnables create and own their object,
//! replaceables preview as a spawnable and defer to the runtime otherwise.

mod replaceable;
mod spawnable;

pub use replaceable::ReplaceableBinding;
pub use spawnable::SpawnableBinding;

use crate::binding::{BindingKind, BindingResolveParams};
use crate::ids::BindingIndex;
use crate::playback::PlaybackState;
use crate::sequence::Sequence;
use crate::spawn::SpawnRegister;
use crate::world::{ObjectClass, ObjectHandle, World};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to construct a spawned object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnTemplate {
    pub class: ObjectClass,
    /// Requested object name. Defaults to the class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Property values applied after construction.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, f32>,
    #[serde(default)]
    pub hidden: bool,
}

impl SpawnTemplate {
    pub fn new(class: impl Into<ObjectClass>) -> Self {
        Self {
            class: class.into(),
            name: None,
            defaults: BTreeMap::new(),
            hidden: false,
        }
    }
}

/// Kinds a custom binding can be created as.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CustomBindingKind {
    Spawnable,
    Replaceable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomBinding {
    Spawnable(SpawnableBinding),
    Replaceable(ReplaceableBinding),
}

impl CustomBinding {
    pub fn kind(&self) -> BindingKind {
        match self {
            Self::Spawnable(_) => BindingKind::Spawnable,
            Self::Replaceable(_) => BindingKind::Replaceable,
        }
    }

    pub fn resolve_binding(
        &self,
        params: &BindingResolveParams,
        index: BindingIndex,
        register: &mut dyn SpawnRegister,
        state: &mut PlaybackState<'_>,
    ) -> Option<ObjectHandle> {
        match self {
            Self::Spawnable(spawnable) => spawnable.resolve_binding(params, index, register, state),
            Self::Replaceable(replaceable) => {
                replaceable.resolve_binding(params, index, register, state)
            }
        }
    }

    /// Whether `object` can be turned into a binding of `kind`.
    pub fn supports_binding_creation_from_object(
        kind: CustomBindingKind,
        world: &World,
        object: ObjectHandle,
    ) -> bool {
        let Some(source) = world.get(object) else {
            return false;
        };
        match kind {
            CustomBindingKind::Spawnable => world.is_instantiable(&source.class),
            // Any object can stand in as the preview of a replaceable.
            CustomBindingKind::Replaceable => true,
        }
    }

    /// Build a binding of `kind` from a live object.
    ///
    /// The template name is made unique among the spawnables `sequence`
    /// already declares.
    pub fn create_new_custom_binding(
        kind: CustomBindingKind,
        world: &World,
        object: ObjectHandle,
        sequence: &Sequence,
    ) -> Option<Self> {
        if !Self::supports_binding_creation_from_object(kind, world, object) {
            return None;
        }
        let mut spawnable = SpawnableBinding::from_object(world, object)?;
        let base = spawnable.spawn_name();
        spawnable.template.name = Some(sequence.unique_spawnable_name(&base));

        Some(match kind {
            CustomBindingKind::Spawnable => Self::Spawnable(spawnable),
            CustomBindingKind::Replaceable => {
                let class = spawnable.template.class.clone();
                Self::Replaceable(ReplaceableBinding::new(class).with_preview(spawnable))
            }
        })
    }

    pub fn bound_object_class(&self) -> Option<&ObjectClass> {
        match self {
            Self::Spawnable(spawnable) => Some(spawnable.bound_object_class()),
            Self::Replaceable(replaceable) => replaceable.bound_object_class(),
        }
    }

    pub fn will_spawn_object(&self, state: &PlaybackState<'_>) -> bool {
        match self {
            Self::Spawnable(_) => true,
            Self::Replaceable(replaceable) => replaceable.will_spawn_object(state),
        }
    }

    /// The spawnable this binding behaves as in `state`, if any.
    pub fn as_spawnable(&self, state: &PlaybackState<'_>) -> Option<&SpawnableBinding> {
        self.spawnable_in(state.is_preview())
    }

    pub(crate) fn spawnable_in(&self, preview: bool) -> Option<&SpawnableBinding> {
        match self {
            Self::Spawnable(spawnable) => Some(spawnable),
            Self::Replaceable(replaceable) => replaceable.as_spawnable(preview),
        }
    }

    pub(crate) fn spawnable_in_mut(&mut self, preview: bool) -> Option<&mut SpawnableBinding> {
        match self {
            Self::Spawnable(spawnable) => Some(spawnable),
            Self::Replaceable(replaceable) => replaceable.preview_mut().filter(|_| preview),
        }
    }
}
