// register.rs - Ownership ledger for spawned objects
//
// The register is the only thing allowed to construct or tear down spawned
// objects. Every live object has exactly one entry keyed by
// (binding, instance, index); the entry is removed before the object is
// destroyed so nothing can look up a half-torn-down object.

use super::key::{SpawnKey, SpawnOwnership, SpawnRegisterEntry};
use super::observer::{SpawnEvent, SpawnObserver};
use super::preanimated::PreAnimatedStateStore;
use super::spawner::{find_spawner, ObjectSpawner, WorldSpawner};
use crate::custom::SpawnableBinding;
use crate::ids::{BindingId, BindingIndex, SequenceId, SequenceInstanceId};
use crate::playback::PlaybackState;
use crate::sequence::SequenceLibrary;
use crate::stats::RegisterStats;
use crate::world::{ObjectClass, ObjectHandle, ObjectTags, World};
use std::collections::HashMap;

pub trait SpawnRegister {
    fn entry(&self, key: &SpawnKey) -> Option<&SpawnRegisterEntry>;

    /// The registered object for `key`, which may have died since. Never
    /// spawns.
    fn find_spawned_object(&self, key: &SpawnKey) -> Option<ObjectHandle> {
        self.entry(key).map(|entry| entry.handle)
    }

    /// Every live entry, ordered by key.
    fn entries(&self) -> Vec<SpawnRegisterEntry>;

    /// Keys registered for one binding in one instance, ordered by index.
    fn keys_for(&self, binding_id: BindingId, instance: SequenceInstanceId) -> Vec<SpawnKey> {
        self.entries()
            .into_iter()
            .map(|entry| entry.key)
            .filter(|key| key.binding_id == binding_id && key.instance == instance)
            .collect()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any spawner handles `class`.
    fn can_spawn_object(&self, class: &ObjectClass) -> bool;

    /// Spawn the object for `(binding_id, instance, index)`, or return the one
    /// already registered.
    fn spawn_object(
        &mut self,
        binding_id: BindingId,
        sequence: SequenceId,
        instance: SequenceInstanceId,
        index: BindingIndex,
        state: &mut PlaybackState<'_>,
    ) -> Option<ObjectHandle>;

    /// Release the object registered for `key`. False when nothing was.
    fn destroy_spawned_object(&mut self, key: &SpawnKey, state: &mut PlaybackState<'_>) -> bool;

    /// Destroy an object the register may no longer track.
    fn destroy_object_directly(
        &mut self,
        handle: ObjectHandle,
        owner: Option<&SpawnableBinding>,
        state: &mut PlaybackState<'_>,
    ) -> bool;

    /// Stop tracking `key` without touching the object.
    fn forget_spawned_object(&mut self, key: &SpawnKey) -> Option<SpawnRegisterEntry>;

    /// Forget every externally owned object. Called when a player stops.
    fn forget_externally_owned_spawned_objects(&mut self) -> usize {
        let external: Vec<SpawnKey> = self
            .entries()
            .into_iter()
            .filter(|entry| entry.ownership == SpawnOwnership::External)
            .map(|entry| entry.key)
            .collect();
        let mut forgotten = 0;
        for key in &external {
            if self.forget_spawned_object(key).is_some() {
                forgotten += 1;
            }
        }
        forgotten
    }

    /// Release every inner-sequence object spawned by an expired instance.
    fn cleanup_sequence(
        &mut self,
        instance: SequenceInstanceId,
        state: &mut PlaybackState<'_>,
    ) -> usize {
        let expired: Vec<SpawnKey> = self
            .entries()
            .into_iter()
            .filter(|entry| {
                entry.key.instance == instance && entry.ownership == SpawnOwnership::InnerSequence
            })
            .map(|entry| entry.key)
            .collect();
        let mut released = 0;
        for key in &expired {
            if self.destroy_spawned_object(key, state) {
                released += 1;
            }
        }
        released
    }

    /// Release everything. External objects are forgotten instead.
    fn cleanup(&mut self, state: &mut PlaybackState<'_>) -> usize {
        self.forget_externally_owned_spawned_objects();
        let keys: Vec<SpawnKey> = self.entries().into_iter().map(|entry| entry.key).collect();
        let mut released = 0;
        for key in &keys {
            if self.destroy_spawned_object(key, state) {
                released += 1;
            }
        }
        released
    }

    /// Write the live object's state back into the spawnable that made it.
    fn save_default_spawnable_state(
        &self,
        key: &SpawnKey,
        sequences: &mut SequenceLibrary,
        world: &World,
    ) -> bool {
        let Some(entry) = self.entry(key) else {
            return false;
        };
        let preview = world.is_preview();
        let spawnable = sequences
            .get_mut(entry.sequence)
            .and_then(|sequence| sequence.spawnable_in_mut(key.binding_id, key.index, preview));
        match spawnable {
            Some(spawnable) => spawnable.save_default_state(world, entry.handle),
            None => false,
        }
    }

    fn add_observer(&mut self, observer: Box<dyn SpawnObserver>);

    fn stats(&self) -> RegisterStats;
}

/// The default register: one object per key, destroyed on release.
pub struct StandardSpawnRegister {
    entries: HashMap<SpawnKey, SpawnRegisterEntry>,
    spawners: Vec<Box<dyn ObjectSpawner>>,
    observers: Vec<Box<dyn SpawnObserver>>,
    pre_animated: PreAnimatedStateStore,
    stats: RegisterStats,
}

impl StandardSpawnRegister {
    /// Register with a single spawner that accepts every class.
    pub fn new() -> Self {
        Self::with_spawners(vec![Box::new(WorldSpawner::any())])
    }

    pub fn with_spawners(spawners: Vec<Box<dyn ObjectSpawner>>) -> Self {
        Self {
            entries: HashMap::new(),
            spawners,
            observers: Vec::new(),
            pre_animated: PreAnimatedStateStore::new(),
            stats: RegisterStats::default(),
        }
    }

    /// Spawners are consulted in insertion order.
    pub fn add_spawner(&mut self, spawner: Box<dyn ObjectSpawner>) {
        self.spawners.push(spawner);
    }

    pub fn pre_animated(&self) -> &PreAnimatedStateStore {
        &self.pre_animated
    }

    pub(crate) fn pre_animated_mut(&mut self) -> &mut PreAnimatedStateStore {
        &mut self.pre_animated
    }

    pub(crate) fn stats_mut(&mut self) -> &mut RegisterStats {
        &mut self.stats
    }

    pub(crate) fn notify(&mut self, event: SpawnEvent) {
        for observer in &mut self.observers {
            observer.on_spawn_event(&event);
        }
    }

    /// Remove the entry for `key` and run the pre-destroy hook. The object
    /// itself is left for the caller.
    pub(crate) fn release<'s>(
        &mut self,
        key: &SpawnKey,
        state: &mut PlaybackState<'s>,
    ) -> Option<(SpawnRegisterEntry, Option<&'s SpawnableBinding>)> {
        let entry = self.entries.remove(key)?;
        let sequences = state.sequences;
        let spawnable = sequences
            .get(entry.sequence)
            .and_then(|sequence| sequence.find_spawnable(key.binding_id, key.index, state));
        if let Some(spawnable) = spawnable {
            spawnable.pre_destroy_object(entry.handle, state.world);
        }
        Some((entry, spawnable))
    }

    /// Register an existing object under a new key, as if freshly spawned.
    pub(crate) fn adopt(
        &mut self,
        entry: SpawnRegisterEntry,
        spawnable: &SpawnableBinding,
        world: &mut World,
    ) {
        if let Some(object) = world.get_mut(entry.handle) {
            object.tags.remove(ObjectTags::HIDDEN);
        }
        self.pre_animated.capture(entry.handle, world);
        spawnable.post_spawn_object(entry.handle, world);
        self.entries.insert(entry.key, entry);
        self.stats.reused += 1;
        tracing::debug!(key = %entry.key, object = %entry.handle, "reused spawned object");
        self.notify(SpawnEvent::Reused {
            key: entry.key,
            object: entry.handle,
        });
    }

    fn destroy_with_spawners(&self, handle: ObjectHandle, world: &mut World) -> bool {
        let class = match world.get(handle) {
            Some(object) => object.class.clone(),
            None => return false,
        };
        match find_spawner(&self.spawners, &class) {
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
}

impl Default for StandardSpawnRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl SpawnRegister for StandardSpawnRegister {
    fn entry(&self, key: &SpawnKey) -> Option<&SpawnRegisterEntry> {
        self.entries.get(key)
    }

    fn entries(&self) -> Vec<SpawnRegisterEntry> {
        let mut entries: Vec<_> = self.entries.values().copied().collect();
        entries.sort_by_key(|entry| entry.key);
        entries
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn can_spawn_object(&self, class: &ObjectClass) -> bool {
        find_spawner(&self.spawners, class).is_some()
    }

    fn spawn_object(
        &mut self,
        binding_id: BindingId,
        sequence: SequenceId,
        instance: SequenceInstanceId,
        index: BindingIndex,
        state: &mut PlaybackState<'_>,
    ) -> Option<ObjectHandle> {
        let key = SpawnKey::new(binding_id, instance, index);
        let sequences = state.sequences;
        let spawnable = sequences
            .get(sequence)
            .and_then(|sequence| sequence.find_spawnable(binding_id, index, state));

        if let Some(existing) = self.entries.get(&key).map(|entry| entry.handle) {
            if state.world.is_valid(existing) {
                return Some(existing);
            }
            // Dangling entries wait for an explicit unlink unless the binding
            // asks to be respawned.
            if !spawnable.is_some_and(|spawnable| spawnable.continuously_respawn) {
                tracing::trace!(%key, object = %existing, "spawned object is gone");
                return None;
            }
            self.entries.remove(&key);
            self.pre_animated.discard(existing);
            tracing::debug!(%key, stale = %existing, "respawning missing object");
        }

        let Some(spawnable) = spawnable else {
            tracing::trace!(%key, "binding has nothing to spawn");
            return None;
        };
        let Some(handle) = spawnable.spawn_object_internal(&key, state.world, &self.spawners) else {
            self.stats.failed += 1;
            return None;
        };

        self.pre_animated.capture(handle, state.world);
        spawnable.post_spawn_object(handle, state.world);
        let entry = SpawnRegisterEntry {
            key,
            handle,
            ownership: spawnable.ownership,
            sequence,
        };
        self.entries.insert(key, entry);
        self.stats.spawned += 1;
        tracing::debug!(%key, object = %handle, ownership = ?entry.ownership, "spawned object");
        self.notify(SpawnEvent::Spawned {
            key,
            object: handle,
        });
        Some(handle)
    }

    fn destroy_spawned_object(&mut self, key: &SpawnKey, state: &mut PlaybackState<'_>) -> bool {
        let Some((entry, spawnable)) = self.release(key, state) else {
            return false;
        };
        let destroyed = match spawnable {
            Some(spawnable) => {
                spawnable.destroy_spawned_object_internal(entry.handle, state.world, &self.spawners)
            }
            None => self.destroy_with_spawners(entry.handle, state.world),
        };
        self.pre_animated.discard(entry.handle);
        if destroyed {
            self.stats.destroyed += 1;
        }
        tracing::debug!(%key, object = %entry.handle, destroyed, "released spawned object");
        self.notify(SpawnEvent::Destroyed {
            key: *key,
            object: entry.handle,
        });
        true
    }

    fn destroy_object_directly(
        &mut self,
        handle: ObjectHandle,
        owner: Option<&SpawnableBinding>,
        state: &mut PlaybackState<'_>,
    ) -> bool {
        let mut untracked: Vec<SpawnKey> = self
            .entries
            .values()
            .filter(|entry| entry.handle == handle)
            .map(|entry| entry.key)
            .collect();
        untracked.sort();
        for key in untracked {
            self.entries.remove(&key);
            self.stats.forgotten += 1;
            tracing::debug!(%key, object = %handle, "untracked object destroyed directly");
            self.notify(SpawnEvent::Forgotten {
                key,
                object: handle,
            });
        }

        let destroyed = match owner {
            Some(spawnable) => {
                spawnable.pre_destroy_object(handle, state.world);
                spawnable.destroy_spawned_object_internal(handle, state.world, &self.spawners)
            }
            None => self.destroy_with_spawners(handle, state.world),
        };
        self.pre_animated.discard(handle);
        if destroyed {
            self.stats.destroyed += 1;
            tracing::debug!(object = %handle, "destroyed object directly");
        }
        destroyed
    }

    fn forget_spawned_object(&mut self, key: &SpawnKey) -> Option<SpawnRegisterEntry> {
        let entry = self.entries.remove(key)?;
        self.pre_animated.discard(entry.handle);
        self.stats.forgotten += 1;
        tracing::debug!(%key, object = %entry.handle, "forgot spawned object");
        self.notify(SpawnEvent::Forgotten {
            key: *key,
            object: entry.handle,
        });
        Some(entry)
    }

    fn add_observer(&mut self, observer: Box<dyn SpawnObserver>) {
        self.observers.push(observer);
    }

    fn stats(&self) -> RegisterStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom::{CustomBinding, ReplaceableBinding};
    use crate::sequence::{Sequence, SequenceInstances};
    use crate::spawn::SpawnEventLog;
    use crate::world::{ObjectTags, WorldKind};

    const SEQ: SequenceId = SequenceId(1);
    const CAMERA: BindingId = BindingId::from_u128(0xca);
    const CREW: BindingId = BindingId::from_u128(0xc4);
    const ROOT: SequenceInstanceId = SequenceInstanceId::ROOT;

    fn fixture(world_kind: WorldKind) -> (World, SequenceLibrary, SequenceInstances) {
        let mut world = World::new(world_kind);
        world.register_class("Camera");
        world.register_class("Grip");

        let mut sequence = Sequence::new(SEQ, "Shot");
        sequence.add_spawnable(CAMERA, SpawnableBinding::new("Camera").with_default("fov", 40.0));
        sequence.bindings.add_custom_binding(
            CREW,
            CustomBinding::Replaceable(
                ReplaceableBinding::new("Grip").with_preview(SpawnableBinding::new("Grip")),
            ),
        );
        let mut sequences = SequenceLibrary::new();
        sequences.insert(sequence);
        (world, sequences, SequenceInstances::new(SEQ))
    }

    #[test]
    fn second_spawn_returns_registered_object() {
        let (mut world, sequences, instances) = fixture(WorldKind::Game);
        let mut register = StandardSpawnRegister::new();
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);

        let first = register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap();
        let second = register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap();
        assert_eq!(first, second);
        assert_eq!(register.stats().spawned, 1);

        let object = state.world.get(first).unwrap();
        assert!(object.tags.contains(ObjectTags::SEQUENCER_OWNED));
        assert_eq!(object.properties.get("fov"), Some(&40.0));
        // Snapshot predates sequencer tagging.
        let snapshot = register.pre_animated().get(first).unwrap();
        assert!(!snapshot.tags.contains(ObjectTags::SEQUENCER_OWNED));
    }

    #[test]
    fn preview_spawns_only_in_editor_worlds() {
        let (mut game, sequences, instances) = fixture(WorldKind::Game);
        let mut register = StandardSpawnRegister::new();
        let mut state = PlaybackState::new(&mut game, &sequences, &instances);
        assert_eq!(register.spawn_object(CREW, SEQ, ROOT, 0, &mut state), None);
        assert!(register.is_empty());

        let (mut editor, sequences, instances) = fixture(WorldKind::Editor);
        let mut state = PlaybackState::new(&mut editor, &sequences, &instances);
        let grip = register.spawn_object(CREW, SEQ, ROOT, 0, &mut state).unwrap();
        assert!(state
            .world
            .get(grip)
            .unwrap()
            .tags
            .contains(ObjectTags::PREVIEW_ACTOR | ObjectTags::TRANSIENT));
    }

    #[test]
    fn failed_spawn_registers_nothing() {
        let (mut world, sequences, instances) = fixture(WorldKind::Game);
        let mut register = StandardSpawnRegister::with_spawners(vec![Box::new(
            WorldSpawner::for_classes(["Grip"]),
        )]);
        assert!(!register.can_spawn_object(&"Camera".into()));

        let mut state = PlaybackState::new(&mut world, &sequences, &instances);
        assert_eq!(register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state), None);
        assert!(register.is_empty());
        assert_eq!(register.stats().failed, 1);
    }

    #[test]
    fn continuous_respawn_replaces_dead_object() {
        let (mut world, mut sequences, instances) = fixture(WorldKind::Game);
        sequences
            .get_mut(SEQ)
            .unwrap()
            .add_spawnable(CAMERA, SpawnableBinding::new("Camera").with_continuous_respawn(true));
        let mut register = StandardSpawnRegister::new();
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);

        let first = register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap();
        state.world.destroy_object(first);
        let second = register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap();
        assert_ne!(first, second);
        assert_eq!(register.len(), 1);
    }

    #[test]
    fn destroy_without_owner_uses_class_spawner() {
        let (mut world, sequences, instances) = fixture(WorldKind::Game);
        let stray = world.create_object(&"Grip".into(), "Stray", None).unwrap();
        let mut register = StandardSpawnRegister::with_spawners(Vec::new());
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);

        // No spawner: warned and left alone.
        assert!(!register.destroy_object_directly(stray, None, &mut state));
        assert!(state.world.contains(stray));

        register.add_spawner(Box::new(WorldSpawner::any()));
        assert!(register.destroy_object_directly(stray, None, &mut state));
        assert!(!state.world.contains(stray));
    }

    #[test]
    fn observers_see_lifecycle_in_order() {
        let (mut world, sequences, instances) = fixture(WorldKind::Game);
        let log = SpawnEventLog::new();
        let mut register = StandardSpawnRegister::new();
        register.add_observer(Box::new(log.clone()));
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);

        let camera = register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap();
        let key = SpawnKey::new(CAMERA, ROOT, 0);
        assert!(register.destroy_spawned_object(&key, &mut state));

        assert_eq!(
            log.events(),
            [
                SpawnEvent::Spawned { key, object: camera },
                SpawnEvent::Destroyed { key, object: camera },
            ]
        );
    }

    #[test]
    fn direct_destroy_reports_untracked_keys() {
        let (mut world, sequences, instances) = fixture(WorldKind::Game);
        let log = SpawnEventLog::new();
        let mut register = StandardSpawnRegister::new();
        register.add_observer(Box::new(log.clone()));
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);

        let camera = register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap();
        log.take();
        assert!(register.destroy_object_directly(camera, None, &mut state));

        let key = SpawnKey::new(CAMERA, ROOT, 0);
        assert_eq!(log.events(), [SpawnEvent::Forgotten { key, object: camera }]);
        assert!(register.is_empty());
        assert_eq!(register.stats().forgotten, 1);
        assert_eq!(register.stats().destroyed, 1);
        assert!(!state.world.contains(camera));
    }

    #[test]
    fn cleanup_sequence_releases_only_inner_spawns_of_that_instance() {
        const PROP: BindingId = BindingId::from_u128(0x91);
        const LIGHT: BindingId = BindingId::from_u128(0x92);
        const EXTRA: BindingId = BindingId::from_u128(0x93);
        let (mut world, mut sequences, mut instances) = fixture(WorldKind::Game);
        let sequence = sequences.get_mut(SEQ).unwrap();
        sequence.add_spawnable(PROP, SpawnableBinding::new("Camera"));
        sequence.add_spawnable(
            LIGHT,
            SpawnableBinding::new("Camera").with_ownership(SpawnOwnership::RootSequence),
        );
        sequence.add_spawnable(
            EXTRA,
            SpawnableBinding::new("Camera").with_ownership(SpawnOwnership::External),
        );
        let (first, _) = instances.add_sub_sequence(ROOT, SEQ).unwrap();
        let (second, _) = instances.add_sub_sequence(ROOT, SEQ).unwrap();
        let mut register = StandardSpawnRegister::new();
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);
        for instance in [first, second] {
            for binding in [PROP, LIGHT, EXTRA] {
                assert!(register.spawn_object(binding, SEQ, instance, 0, &mut state).is_some());
            }
        }
        let doomed = register.find_spawned_object(&SpawnKey::new(PROP, first, 0)).unwrap();

        assert_eq!(register.cleanup_sequence(first, &mut state), 1);
        assert!(!state.world.contains(doomed));
        assert_eq!(register.len(), 5);
        assert!(register.find_spawned_object(&SpawnKey::new(PROP, first, 0)).is_none());
        for key in [
            SpawnKey::new(LIGHT, first, 0),
            SpawnKey::new(EXTRA, first, 0),
            SpawnKey::new(PROP, second, 0),
        ] {
            let object = register.find_spawned_object(&key).unwrap();
            assert!(state.world.is_valid(object));
        }
    }

    #[test]
    fn cleanup_forgets_external_objects() {
        let (mut world, mut sequences, instances) = fixture(WorldKind::Game);
        sequences.get_mut(SEQ).unwrap().add_spawnable(
            CAMERA,
            SpawnableBinding::new("Camera").with_ownership(SpawnOwnership::External),
        );
        let mut register = StandardSpawnRegister::new();
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);

        let camera = register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap();
        assert_eq!(register.cleanup(&mut state), 0);
        assert!(register.is_empty());
        assert!(state.world.is_valid(camera));
        assert_eq!(register.stats().forgotten, 1);
    }

    #[test]
    fn saved_state_flows_back_into_template() {
        let (mut world, mut sequences, instances) = fixture(WorldKind::Game);
        let mut register = StandardSpawnRegister::new();
        let camera = {
            let mut state = PlaybackState::new(&mut world, &sequences, &instances);
            register.spawn_object(CAMERA, SEQ, ROOT, 0, &mut state).unwrap()
        };
        world.get_mut(camera).unwrap().properties.insert("fov".into(), 65.0);

        let key = SpawnKey::new(CAMERA, ROOT, 0);
        assert!(register.save_default_spawnable_state(&key, &mut sequences, &world));
        let template = &sequences.get(SEQ).unwrap().spawnable(CAMERA).unwrap().template;
        assert_eq!(template.defaults.get("fov"), Some(&65.0));
    }
}
