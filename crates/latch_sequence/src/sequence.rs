//! Sequence assets and their runtime activations

use crate::binding::BindingReferenceTable;
use crate::custom::SpawnableBinding;
use crate::handle::Slots;
use crate::ids::{BindingId, BindingIndex, SequenceId, SequenceInstanceId};
use crate::playback::PlaybackState;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A sequence asset: its binding table plus legacy spawnables.
///
/// Legacy spawnables predate multi-reference bindings; each one is a single
/// spawnable at binding index 0 and has no entry in the reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub name: String,
    #[serde(default)]
    pub bindings: BindingReferenceTable,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spawnables: BTreeMap<BindingId, SpawnableBinding>,
}

impl Sequence {
    pub fn new(id: SequenceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            bindings: BindingReferenceTable::new(),
            spawnables: BTreeMap::new(),
        }
    }

    /// Declare a legacy spawnable, replacing any previous one for `id`.
    pub fn add_spawnable(
        &mut self,
        id: BindingId,
        spawnable: SpawnableBinding,
    ) -> Option<SpawnableBinding> {
        self.spawnables.insert(id, spawnable)
    }

    /// The legacy spawnable for `id`.
    pub fn spawnable(&self, id: BindingId) -> Option<&SpawnableBinding> {
        self.spawnables.get(&id)
    }

    /// The spawnable `(id, index)` behaves as in `state`.
    pub fn find_spawnable(
        &self,
        id: BindingId,
        index: BindingIndex,
        state: &PlaybackState<'_>,
    ) -> Option<&SpawnableBinding> {
        self.spawnable_in(id, index, state.is_preview())
    }

    pub(crate) fn spawnable_in(
        &self,
        id: BindingId,
        index: BindingIndex,
        preview: bool,
    ) -> Option<&SpawnableBinding> {
        if self.bindings.has_binding(id) {
            self.bindings.custom_binding(id, index)?.spawnable_in(preview)
        } else if index == 0 {
            self.spawnables.get(&id)
        } else {
            None
        }
    }

    pub(crate) fn spawnable_in_mut(
        &mut self,
        id: BindingId,
        index: BindingIndex,
        preview: bool,
    ) -> Option<&mut SpawnableBinding> {
        if self.bindings.has_binding(id) {
            self.bindings
                .custom_binding_mut(id, index)?
                .spawnable_in_mut(preview)
        } else if index == 0 {
            self.spawnables.get_mut(&id)
        } else {
            None
        }
    }

    /// Every binding index of `id` that spawns in `state`.
    pub fn spawnable_indices(
        &self,
        id: BindingId,
        state: &PlaybackState<'_>,
    ) -> SmallVec<[BindingIndex; 4]> {
        let preview = state.is_preview();
        if self.bindings.has_binding(id) {
            self.bindings
                .references(id)
                .iter()
                .enumerate()
                .filter(|(_, reference)| {
                    reference
                        .custom_binding
                        .as_ref()
                        .is_some_and(|custom| custom.spawnable_in(preview).is_some())
                })
                .map(|(index, _)| index)
                .collect()
        } else if self.spawnables.contains_key(&id) {
            smallvec::smallvec![0]
        } else {
            SmallVec::new()
        }
    }

    /// Every binding id declared by this sequence, in order.
    pub fn binding_ids(&self) -> BTreeSet<BindingId> {
        self.bindings
            .binding_ids()
            .chain(self.spawnables.keys().copied())
            .collect()
    }

    /// `base`, or `base_N` if a spawnable of this sequence already uses it.
    pub fn unique_spawnable_name(&self, base: &str) -> String {
        let taken: BTreeSet<String> = self
            .spawnables
            .values()
            .chain(self.bindings.iter().filter_map(|reference| {
                reference.custom_binding.as_ref()?.spawnable_in(true)
            }))
            .map(SpawnableBinding::spawn_name)
            .collect();
        if !taken.contains(base) {
            return base.to_string();
        }
        (1u32..)
            .map(|suffix| format!("{base}_{suffix}"))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// Every sequence a playback session can evaluate.
#[derive(Debug, Clone, Default)]
pub struct SequenceLibrary {
    sequences: BTreeMap<SequenceId, Sequence>,
}

impl SequenceLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sequence: Sequence) -> Option<Sequence> {
        self.sequences.insert(sequence.id, sequence)
    }

    pub fn get(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    pub fn get_mut(&mut self, id: SequenceId) -> Option<&mut Sequence> {
        self.sequences.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.values()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

crate::define_handle!(
    InstanceHandle,
    "Handle to a live sequence instance; stops resolving once the instance is removed."
);

/// One activation of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInstance {
    pub id: SequenceInstanceId,
    pub sequence: SequenceId,
    pub parent: Option<SequenceInstanceId>,
    pub finished: bool,
}

impl SequenceInstance {
    pub fn is_sub_sequence(&self) -> bool {
        self.parent.is_some()
    }

    /// A finished sub-sequence hands lifetime decisions to its ancestors.
    pub fn is_finished_sub_sequence(&self) -> bool {
        self.finished && self.is_sub_sequence()
    }
}

/// The activation hierarchy of one playback session.
pub struct SequenceInstances {
    slots: Slots<SequenceInstance>,
    by_id: HashMap<SequenceInstanceId, InstanceHandle>,
    next_id: u32,
    root_sequence: SequenceId,
}

impl SequenceInstances {
    /// Hierarchy with the root instance of `root_sequence` already active.
    pub fn new(root_sequence: SequenceId) -> Self {
        let mut instances = Self {
            slots: Slots::new(),
            by_id: HashMap::new(),
            next_id: SequenceInstanceId::ROOT.0,
            root_sequence,
        };
        instances.activate(root_sequence, None);
        instances
    }

    fn activate(
        &mut self,
        sequence: SequenceId,
        parent: Option<SequenceInstanceId>,
    ) -> (SequenceInstanceId, InstanceHandle) {
        let id = SequenceInstanceId(self.next_id);
        self.next_id += 1;
        let (index, generation) = self.slots.insert(SequenceInstance {
            id,
            sequence,
            parent,
            finished: false,
        });
        let handle = InstanceHandle::new(index, generation);
        self.by_id.insert(id, handle);
        (id, handle)
    }

    pub fn root_sequence(&self) -> SequenceId {
        self.root_sequence
    }

    /// Activate `sequence` under `parent`. Every call is a new activation,
    /// so each loop iteration gets its own id.
    pub fn add_sub_sequence(
        &mut self,
        parent: SequenceInstanceId,
        sequence: SequenceId,
    ) -> Option<(SequenceInstanceId, InstanceHandle)> {
        if !self.by_id.contains_key(&parent) {
            return None;
        }
        Some(self.activate(sequence, Some(parent)))
    }

    pub fn finish(&mut self, id: SequenceInstanceId) -> bool {
        match self.get_by_id_mut(id) {
            Some(instance) => {
                instance.finished = true;
                true
            }
            None => false,
        }
    }

    /// Drop an activation; its handle stops resolving.
    pub fn remove(&mut self, id: SequenceInstanceId) -> Option<SequenceInstance> {
        let handle = self.by_id.remove(&id)?;
        self.slots.remove(handle.index(), handle.generation())
    }

    pub fn get(&self, handle: InstanceHandle) -> Option<&SequenceInstance> {
        self.slots.get(handle.index(), handle.generation())
    }

    pub fn get_by_id(&self, id: SequenceInstanceId) -> Option<&SequenceInstance> {
        self.get(*self.by_id.get(&id)?)
    }

    fn get_by_id_mut(&mut self, id: SequenceInstanceId) -> Option<&mut SequenceInstance> {
        let handle = *self.by_id.get(&id)?;
        self.slots.get_mut(handle.index(), handle.generation())
    }

    pub fn handle_of(&self, id: SequenceInstanceId) -> Option<InstanceHandle> {
        self.by_id.get(&id).copied()
    }

    pub fn root(&self) -> Option<InstanceHandle> {
        self.handle_of(SequenceInstanceId::ROOT)
    }

    pub fn sequence_of(&self, id: SequenceInstanceId) -> Option<SequenceId> {
        self.get_by_id(id).map(|instance| instance.sequence)
    }

    pub fn children_of(&self, id: SequenceInstanceId) -> Vec<SequenceInstanceId> {
        let mut children: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, _, instance)| instance.parent == Some(id))
            .map(|(_, _, instance)| instance.id)
            .collect();
        children.sort();
        children
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
