//! Per-session playback context
//!
//! Everything binding resolution needs is passed explicitly through
//! `PlaybackState`. The spawn register is not part of it: it is handed
//! to resolution alongside the state as `&mut dyn SpawnRegister`.

use crate::binding::BindingResolveParams;
use crate::ids::{BindingId, BindingIndex, SequenceId, SequenceInstanceId};
use crate::sequence::{SequenceInstances, SequenceLibrary};
use crate::world::{ObjectHandle, World};
use std::collections::HashMap;

/// Runtime resolution hook for replaceable bindings outside preview worlds.
pub trait RuntimeBindingResolver {
    fn resolve_runtime_binding(
        &self,
        params: &BindingResolveParams,
        index: BindingIndex,
        world: &World,
    ) -> Option<ObjectHandle>;
}

/// Objects supplied from outside for specific (binding, instance) pairs.
///
/// A claimed pair is never spawned by the evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct BindingOverrides {
    claims: HashMap<(BindingId, SequenceInstanceId), Vec<ObjectHandle>>,
}

impl BindingOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        binding_id: BindingId,
        instance: SequenceInstanceId,
        objects: Vec<ObjectHandle>,
    ) {
        self.claims.insert((binding_id, instance), objects);
    }

    pub fn clear(&mut self, binding_id: BindingId, instance: SequenceInstanceId) -> bool {
        self.claims.remove(&(binding_id, instance)).is_some()
    }

    pub fn claims(&self, binding_id: BindingId, instance: SequenceInstanceId) -> bool {
        self.claims.contains_key(&(binding_id, instance))
    }

    pub fn objects(&self, binding_id: BindingId, instance: SequenceInstanceId) -> &[ObjectHandle] {
        self.claims
            .get(&(binding_id, instance))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub struct PlaybackState<'a> {
    pub world: &'a mut World,
    pub sequences: &'a SequenceLibrary,
    pub instances: &'a SequenceInstances,
    pub overrides: Option<&'a BindingOverrides>,
    pub runtime_resolver: Option<&'a dyn RuntimeBindingResolver>,
}

impl<'a> PlaybackState<'a> {
    pub fn new(
        world: &'a mut World,
        sequences: &'a SequenceLibrary,
        instances: &'a SequenceInstances,
    ) -> Self {
        Self {
            world,
            sequences,
            instances,
            overrides: None,
            runtime_resolver: None,
        }
    }

    pub fn with_overrides(mut self, overrides: &'a BindingOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn with_runtime_resolver(mut self, resolver: &'a dyn RuntimeBindingResolver) -> Self {
        self.runtime_resolver = Some(resolver);
        self
    }

    /// Resolving into an editor world.
    pub fn is_preview(&self) -> bool {
        self.world.is_preview()
    }

    pub fn root_sequence(&self) -> SequenceId {
        self.instances.root_sequence()
    }

    pub fn is_overridden(&self, binding_id: BindingId, instance: SequenceInstanceId) -> bool {
        self.overrides
            .is_some_and(|overrides| overrides.claims(binding_id, instance))
    }
}
