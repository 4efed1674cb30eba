// spawnable.rs - Bindings that create and own their object
//
// The spawnable holds only the template. Live state (which object exists for
// which key) belongs to the spawn register, which calls back into the hooks
// below in this order:
//
//   spawn:   spawn_object_internal -> post_spawn_object
//   destroy: pre_destroy_object    -> destroy_spawned_object_internal

use super::SpawnTemplate;
use crate::binding::BindingResolveParams;
use crate::ids::BindingIndex;
use crate::playback::PlaybackState;
use crate::spawn::spawner::find_spawner;
use crate::spawn::{ObjectSpawner, SpawnKey, SpawnOwnership, SpawnRegister};
use crate::world::{ObjectClass, ObjectHandle, ObjectTags, World};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnableBinding {
    pub template: SpawnTemplate,
    #[serde(default)]
    pub ownership: SpawnOwnership,
    /// Respawn on the next resolution when the object disappeared outside the
    /// register.
    #[serde(default)]
    pub continuously_respawn: bool,
    /// Editor-only spawn (the preview half of a replaceable binding).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preview: bool,
}

impl SpawnableBinding {
    pub fn new(class: impl Into<ObjectClass>) -> Self {
        Self {
            template: SpawnTemplate::new(class),
            ownership: SpawnOwnership::InnerSequence,
            continuously_respawn: false,
            preview: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.template.name = Some(name.into());
        self
    }

    pub fn with_ownership(mut self, ownership: SpawnOwnership) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn with_continuous_respawn(mut self, respawn: bool) -> Self {
        self.continuously_respawn = respawn;
        self
    }

    pub fn with_default(mut self, property: impl Into<String>, value: f32) -> Self {
        self.template.defaults.insert(property.into(), value);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.template.hidden = true;
        self
    }

    /// Template copied from a live object.
    pub fn from_object(world: &World, object: ObjectHandle) -> Option<Self> {
        let source = world.get(object)?;
        let mut spawnable = Self::new(source.class.clone()).with_name(source.name.clone());
        spawnable.template.defaults = source.properties.clone();
        spawnable.template.hidden = source.is_hidden();
        Some(spawnable)
    }

    pub fn bound_object_class(&self) -> &ObjectClass {
        &self.template.class
    }

    /// Name a fresh spawn asks for: the template name, else the class name.
    pub fn spawn_name(&self) -> String {
        self.template
            .name
            .clone()
            .unwrap_or_else(|| self.template.class.name().to_string())
    }

    /// Spawn (or find) the object for `(params.binding_id, params.instance,
    /// index)` through `register`.
    pub fn resolve_binding(
        &self,
        params: &BindingResolveParams,
        index: BindingIndex,
        register: &mut dyn SpawnRegister,
        state: &mut PlaybackState<'_>,
    ) -> Option<ObjectHandle> {
        register.spawn_object(params.binding_id, params.sequence, params.instance, index, state)
    }

    /// Construct the object. Registers call this once per live key.
    pub fn spawn_object_internal(
        &self,
        key: &SpawnKey,
        world: &mut World,
        spawners: &[Box<dyn ObjectSpawner>],
    ) -> Option<ObjectHandle> {
        let class = &self.template.class;
        let Some(spawner) = find_spawner(spawners, class) else {
            tracing::warn!(
                %class,
                %key,
                "no spawner found for object of class {class} during spawn"
            );
            return None;
        };

        let name = self.claim_name(world);
        let handle = spawner.spawn(&self.template, &name, world)?;
        tracing::trace!(%key, %handle, spawner = spawner.name(), name, "constructed spawnable");
        Some(handle)
    }

    // A valid occupant of the spawn name pushes us to a unique name. A
    // pending-kill occupant left over from an earlier teardown is renamed out
    // of the way so the new object gets the deterministic name.
    fn claim_name(&self, world: &mut World) -> String {
        let base = self.spawn_name();
        let Some(occupant) = world.find(None, &base) else {
            return base;
        };
        if world.is_valid(occupant) {
            return world.make_unique_name(None, &base);
        }

        let stale_name = world.make_unique_name(None, &format!("{base}_stale"));
        match world.rename(occupant, &stale_name) {
            Ok(()) => {
                tracing::debug!(%occupant, from = %base, to = %stale_name, "renamed stale object");
                base
            }
            Err(err) => {
                tracing::warn!(%occupant, %err, "failed to rename stale object");
                world.make_unique_name(None, &base)
            }
        }
    }

    /// Tag the new object as sequencer owned and apply template defaults.
    pub fn post_spawn_object(&self, handle: ObjectHandle, world: &mut World) {
        let Some(object) = world.get_mut(handle) else {
            return;
        };
        object.tags.insert(ObjectTags::SEQUENCER_OWNED);
        if self.preview {
            object.tags.insert(ObjectTags::PREVIEW_ACTOR | ObjectTags::TRANSIENT);
        }
        object.tags.set(ObjectTags::HIDDEN, self.template.hidden);
        object.properties.extend(
            self.template
                .defaults
                .iter()
                .map(|(property, value)| (property.clone(), *value)),
        );
    }

    /// Detach the object from the sequencer before teardown.
    pub fn pre_destroy_object(&self, handle: ObjectHandle, world: &mut World) {
        if let Some(object) = world.get_mut(handle) {
            object
                .tags
                .remove(ObjectTags::SEQUENCER_OWNED | ObjectTags::PREVIEW_ACTOR);
            object.proxy_target = None;
        }
    }

    /// Tear the object down with the spawner that handles its class.
    pub fn destroy_spawned_object_internal(
        &self,
        handle: ObjectHandle,
        world: &mut World,
        spawners: &[Box<dyn ObjectSpawner>],
    ) -> bool {
        let class = match world.get(handle) {
            Some(object) => object.class.clone(),
            None => {
                tracing::trace!(%handle, "spawned object already gone");
                return false;
            }
        };
        match find_spawner(spawners, &class) {
            Some(spawner) => spawner.destroy(handle, world),
            None => {
                tracing::warn!(
                    %handle,
                    "no spawner found for object of class {class} during destroy"
                );
                false
            }
        }
    }

    /// Copy the live object's state back into the template.
    pub fn save_default_state(&mut self, world: &World, handle: ObjectHandle) -> bool {
        let Some(object) = world.get(handle) else {
            return false;
        };
        self.template.defaults = object.properties.clone();
        self.template.hidden = object.is_hidden();
        true
    }
}
