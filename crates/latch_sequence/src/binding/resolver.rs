// resolver.rs - (binding, index) -> object
//
// Order of precedence for one reference:
//   1. custom binding (locator ignored even when it would resolve)
//   2. locator, queueing a load when the reference asks for one
// followed by proxy substitution on whatever came out.
//
// Bindings with no reference at all may still be legacy spawnables; those
// resolve to whatever the register already spawned for them.

use super::reference::{BindingKind, BindingReference};
use crate::ids::{BindingId, BindingIndex, SequenceId, SequenceInstanceId};
use crate::locator::{ResolveContext, ResolveFlags};
use crate::playback::PlaybackState;
use crate::sequence::SequenceLibrary;
use crate::spawn::{SpawnKey, SpawnRegister};
use crate::world::{ObjectHandle, World};

/// Which binding to resolve, and where.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BindingResolveParams {
    pub sequence: SequenceId,
    pub binding_id: BindingId,
    pub instance: SequenceInstanceId,
    /// Scope locators are resolved in.
    pub outer: Option<ObjectHandle>,
}

impl BindingResolveParams {
    pub fn new(sequence: SequenceId, binding_id: BindingId, instance: SequenceInstanceId) -> Self {
        Self {
            sequence,
            binding_id,
            instance,
            outer: None,
        }
    }

    pub fn with_outer(mut self, outer: ObjectHandle) -> Self {
        self.outer = Some(outer);
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct BindingResolveResult {
    pub object: Option<ObjectHandle>,
    /// Kind of the reference that produced the result; `None` when there was
    /// no reference.
    pub kind: Option<BindingKind>,
    /// A load was queued; the object may resolve on a later tick.
    pub load_requested: bool,
}

impl BindingResolveResult {
    pub fn is_resolved(&self) -> bool {
        self.object.is_some()
    }
}

#[derive(Debug, Copy, Clone)]
pub struct BindingResolver {
    follow_proxies: bool,
}

impl Default for BindingResolver {
    fn default() -> Self {
        Self {
            follow_proxies: true,
        }
    }
}

impl BindingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface proxies as themselves instead of their targets.
    pub fn without_proxies() -> Self {
        Self {
            follow_proxies: false,
        }
    }

    pub fn resolve(
        &self,
        params: &BindingResolveParams,
        index: BindingIndex,
        register: &mut dyn SpawnRegister,
        state: &mut PlaybackState<'_>,
    ) -> BindingResolveResult {
        let sequences = state.sequences;
        let Some(sequence) = sequences.get(params.sequence) else {
            tracing::trace!(sequence = %params.sequence, "unknown sequence");
            return BindingResolveResult::default();
        };

        let mut result = match sequence.bindings.reference(params.binding_id, index) {
            Some(reference) => match &reference.custom_binding {
                Some(custom) => BindingResolveResult {
                    object: custom.resolve_binding(params, index, register, state),
                    kind: Some(custom.kind()),
                    load_requested: false,
                },
                None => resolve_locator(reference, params, state.world),
            },
            None if index == 0 && sequence.spawnable(params.binding_id).is_some() => {
                let key = SpawnKey::new(params.binding_id, params.instance, index);
                BindingResolveResult {
                    object: register
                        .find_spawned_object(&key)
                        .filter(|handle| state.world.is_valid(*handle)),
                    kind: Some(BindingKind::Spawnable),
                    load_requested: false,
                }
            }
            None => {
                tracing::trace!(binding = %params.binding_id, index, "no binding reference");
                return BindingResolveResult::default();
            }
        };

        if self.follow_proxies {
            result.object = result.object.map(|handle| proxy_target(state.world, handle));
        }
        tracing::trace!(
            binding = %params.binding_id,
            index,
            object = ?result.object,
            "resolved binding"
        );
        result
    }

    /// Resolve without a playback session.
    ///
    /// Custom bindings need a session and a register, so only locator
    /// references resolve here. Loads are never queued.
    pub fn resolve_static(
        &self,
        params: &BindingResolveParams,
        index: BindingIndex,
        sequences: &SequenceLibrary,
        world: &World,
    ) -> Option<ObjectHandle> {
        let reference = sequences
            .get(params.sequence)?
            .bindings
            .reference(params.binding_id, index)?;
        if reference.custom_binding.is_some() {
            return None;
        }
        let object = reference
            .locator
            .resolve(&ResolveContext::with_outer(world, params.outer))?;
        Some(if self.follow_proxies {
            proxy_target(world, object)
        } else {
            object
        })
    }
}

fn resolve_locator(
    reference: &BindingReference,
    params: &BindingResolveParams,
    world: &mut World,
) -> BindingResolveResult {
    let object = reference
        .locator
        .resolve(&ResolveContext::with_outer(world, params.outer));
    let load_requested = object.is_none()
        && reference.resolve_flags == ResolveFlags::Load
        && params.outer.is_none()
        && reference
            .locator
            .path()
            .map_or(false, |path| world.request_load(path));
    if load_requested {
        tracing::debug!(
            binding = %params.binding_id,
            path = ?reference.locator.path(),
            "queued load"
        );
    }
    BindingResolveResult {
        object,
        kind: Some(BindingKind::StaticLocator),
        load_requested,
    }
}

fn proxy_target(world: &World, handle: ObjectHandle) -> ObjectHandle {
    world
        .get(handle)
        .and_then(|object| object.proxy_target)
        .filter(|target| world.is_valid(*target))
        .unwrap_or(handle)
}
