// reuse.rs - Register that hides released objects and hands them out again
//
// Used by bake/export style playback where a looping sub-sequence would
// otherwise spawn a fresh object for every iteration. Objects are pooled per
// (binding, index). Claims remember which pool slot each sequence instance
// got, scoped by root sequence.
//
// Slot selection for a key with no live entry:
//   1. the slot this instance already claimed
//   2. slot 0 when instances share objects
//   3. the lowest slot no other instance has claimed
//   4. a fresh spawn appended to the pool

use super::key::{SpawnKey, SpawnRegisterEntry};
use super::observer::{SpawnEvent, SpawnObserver};
use super::register::{SpawnRegister, StandardSpawnRegister};
use crate::custom::SpawnableBinding;
use crate::ids::{BindingId, BindingIndex, SequenceId, SequenceInstanceId};
use crate::playback::PlaybackState;
use crate::stats::RegisterStats;
use crate::world::{ObjectClass, ObjectHandle, ObjectTags};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseSettings {
    /// Give every sequence instance its own object. When false, all instances
    /// of a binding share the first pooled object.
    pub separate_instance_per_sequence_instance: bool,
    /// Release hides the object instead of destroying it.
    pub destroying_just_hides: bool,
    /// Classes this register refuses to spawn.
    pub excluded_classes: HashSet<ObjectClass>,
}

impl Default for ReuseSettings {
    fn default() -> Self {
        Self {
            separate_instance_per_sequence_instance: true,
            destroying_just_hides: true,
            excluded_classes: HashSet::new(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    binding_id: BindingId,
    index: BindingIndex,
}

type InstanceClaims = HashMap<SequenceInstanceId, HashMap<PoolKey, usize>>;

pub struct ReusingSpawnRegister {
    inner: StandardSpawnRegister,
    settings: ReuseSettings,
    pools: HashMap<PoolKey, Vec<ObjectHandle>>,
    claims: HashMap<SequenceId, InstanceClaims>,
}

impl ReusingSpawnRegister {
    pub fn new(settings: ReuseSettings) -> Self {
        Self::wrapping(StandardSpawnRegister::new(), settings)
    }

    /// Pool on top of an existing register (and its spawners).
    pub fn wrapping(inner: StandardSpawnRegister, settings: ReuseSettings) -> Self {
        Self {
            inner,
            settings,
            pools: HashMap::new(),
            claims: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &ReuseSettings {
        &self.settings
    }

    /// Whether anything was ever spawned for `(binding_id, index)`, live or
    /// hidden.
    pub fn has_spawned_object(&self, binding_id: BindingId, index: BindingIndex) -> bool {
        !self.pooled(binding_id, index).is_empty()
    }

    pub fn pooled(&self, binding_id: BindingId, index: BindingIndex) -> &[ObjectHandle] {
        self.pools
            .get(&PoolKey { binding_id, index })
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Destroy for real: every live entry, then every pooled object left
    /// hidden. External objects are forgotten as usual.
    pub fn delete_spawns(&mut self, state: &mut PlaybackState<'_>) -> usize {
        self.settings.destroying_just_hides = false;
        let mut destroyed = self.cleanup(state);

        let abandoned: Vec<ObjectHandle> = self.pools.drain().flat_map(|(_, pool)| pool).collect();
        self.claims.clear();
        for handle in abandoned {
            if state.world.contains(handle)
                && self.inner.destroy_object_directly(handle, None, state)
            {
                destroyed += 1;
            }
        }
        tracing::debug!(destroyed, "deleted pooled spawns");
        destroyed
    }

    // Drop `handle` from its pool. Claims on later slots shift down with it.
    fn forget_pooled(&mut self, handle: ObjectHandle) {
        for (pool_key, pool) in self.pools.iter_mut() {
            let Some(slot) = pool.iter().position(|pooled| *pooled == handle) else {
                continue;
            };
            pool.remove(slot);
            for instance_claims in self.claims.values_mut().flat_map(|claims| claims.values_mut()) {
                match instance_claims.get(pool_key).copied() {
                    Some(claimed) if claimed == slot => {
                        instance_claims.remove(pool_key);
                    }
                    Some(claimed) if claimed > slot => {
                        instance_claims.insert(*pool_key, claimed - 1);
                    }
                    _ => {}
                }
            }
        }
        self.pools.retain(|_, pool| !pool.is_empty());
    }
}

fn pick_slot(
    pool_len: usize,
    claims: &InstanceClaims,
    instance: SequenceInstanceId,
    pool_key: PoolKey,
    separate: bool,
) -> Option<usize> {
    if let Some(&slot) = claims.get(&instance).and_then(|claimed| claimed.get(&pool_key)) {
        if slot < pool_len {
            return Some(slot);
        }
    }
    if pool_len == 0 {
        return None;
    }
    if !separate {
        return Some(0);
    }
    let mut taken = vec![false; pool_len];
    for claimed in claims.values() {
        if let Some(&slot) = claimed.get(&pool_key) {
            if let Some(flag) = taken.get_mut(slot) {
                *flag = true;
            }
        }
    }
    taken.iter().position(|taken| !taken)
}

impl SpawnRegister for ReusingSpawnRegister {
    fn entry(&self, key: &SpawnKey) -> Option<&SpawnRegisterEntry> {
        self.inner.entry(key)
    }

    fn entries(&self) -> Vec<SpawnRegisterEntry> {
        self.inner.entries()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn can_spawn_object(&self, class: &ObjectClass) -> bool {
        !self.settings.excluded_classes.contains(class) && self.inner.can_spawn_object(class)
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
        if self.inner.entry(&key).is_some() {
            return self.inner.spawn_object(binding_id, sequence, instance, index, state);
        }

        let sequences = state.sequences;
        let spawnable = sequences
            .get(sequence)
            .and_then(|found| found.find_spawnable(binding_id, index, state))?;
        let class = &spawnable.template.class;
        if self.settings.excluded_classes.contains(class) {
            tracing::warn!(%key, %class, "class is excluded from spawning");
            return None;
        }

        let root = state.root_sequence();
        let pool_key = PoolKey { binding_id, index };
        let pool = self.pools.entry(pool_key).or_default();
        let claims = self.claims.entry(root).or_default();
        let picked = pick_slot(
            pool.len(),
            claims,
            instance,
            pool_key,
            self.settings.separate_instance_per_sequence_instance,
        );

        let (slot, handle) = match picked {
            Some(slot) if state.world.is_valid(pool[slot]) => {
                let handle = pool[slot];
                let entry = SpawnRegisterEntry {
                    key,
                    handle,
                    ownership: spawnable.ownership,
                    sequence,
                };
                self.inner.adopt(entry, spawnable, state.world);
                (slot, handle)
            }
            Some(slot) => {
                // The pooled object died outside the register; refill its slot.
                let handle = self
                    .inner
                    .spawn_object(binding_id, sequence, instance, index, state)?;
                pool[slot] = handle;
                (slot, handle)
            }
            None => {
                let handle = self
                    .inner
                    .spawn_object(binding_id, sequence, instance, index, state)?;
                pool.push(handle);
                (pool.len() - 1, handle)
            }
        };
        claims.entry(instance).or_default().insert(pool_key, slot);
        Some(handle)
    }

    fn destroy_spawned_object(&mut self, key: &SpawnKey, state: &mut PlaybackState<'_>) -> bool {
        if !self.settings.destroying_just_hides {
            if let Some(handle) = self.inner.find_spawned_object(key) {
                self.forget_pooled(handle);
            }
            return self.inner.destroy_spawned_object(key, state);
        }

        let Some((entry, _)) = self.inner.release(key, state) else {
            return false;
        };
        self.inner
            .pre_animated_mut()
            .restore(entry.handle, state.world);
        if let Some(object) = state.world.get_mut(entry.handle) {
            object.tags.insert(ObjectTags::HIDDEN);
        }
        self.inner.stats_mut().hidden += 1;
        tracing::debug!(%key, object = %entry.handle, "hid spawned object");
        self.inner.notify(SpawnEvent::Hidden {
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
        self.forget_pooled(handle);
        self.inner.destroy_object_directly(handle, owner, state)
    }

    fn forget_spawned_object(&mut self, key: &SpawnKey) -> Option<SpawnRegisterEntry> {
        let entry = self.inner.forget_spawned_object(key)?;
        self.forget_pooled(entry.handle);
        Some(entry)
    }

    fn add_observer(&mut self, observer: Box<dyn SpawnObserver>) {
        self.inner.add_observer(observer);
    }

    fn stats(&self) -> RegisterStats {
        self.inner.stats()
    }
}
