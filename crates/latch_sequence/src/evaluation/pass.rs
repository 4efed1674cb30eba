// pass.rs - Per-tick link/unlink of spawnable bindings
//
// A tick runs in fixed phases:
//   1. invalidation: changed or removed entities, and everything below them,
//      are queued for unlink; survivors are queued for relink
//   2. unlink: collect releases, then release them in a second loop
//   3. link: spawn every applicable index; disabled bindings queue releases
//   4. flush the releases queued by step 3
// Releases are always collected before any runs, so destruction never
// happens while entities are being walked.

use super::entity::{BindingEntities, EntityHandle, EntityTags};
use crate::ids::BindingId;
use crate::playback::PlaybackState;
use crate::sequence::{InstanceHandle, SequenceInstance};
use crate::spawn::{SpawnKey, SpawnOwnership, SpawnRegister};
use crate::time::EvaluationClock;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ReleaseAction {
    Destroy,
    Forget,
}

#[derive(Debug, Copy, Clone)]
struct PendingRelease {
    key: SpawnKey,
    instance: InstanceHandle,
    action: ReleaseAction,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub tick: u64,
    /// Entities unlinked.
    pub unlinked: usize,
    /// Entities linked.
    pub linked: usize,
    /// Keys holding a live object after linking.
    pub spawned: Vec<SpawnKey>,
    /// Keys that could not get an object this tick.
    pub failed: Vec<SpawnKey>,
    pub destroyed: Vec<SpawnKey>,
    pub forgotten: Vec<SpawnKey>,
    /// Keys left alone because an ancestor owns their lifetime.
    pub kept: Vec<SpawnKey>,
    pub overridden: usize,
    pub disabled: usize,
    /// Work dropped because its sequence instance was gone.
    pub dropped: usize,
    /// Entities removed at the end of the tick.
    pub removed: usize,
}

#[derive(Debug, Default)]
pub struct SpawnablesPass {
    clock: EvaluationClock,
    pending: Vec<PendingRelease>,
}

impl SpawnablesPass {
    pub fn new(clock: EvaluationClock) -> Self {
        Self {
            clock,
            pending: Vec::new(),
        }
    }

    pub fn clock(&self) -> &EvaluationClock {
        &self.clock
    }

    pub fn run(
        &mut self,
        entities: &mut BindingEntities,
        register: &mut dyn SpawnRegister,
        state: &mut PlaybackState<'_>,
    ) -> PassReport {
        let tick = self.clock.advance_tick();
        let span = tracing::info_span!("spawnables_pass", tick);
        let _enter = span.enter();

        let mut report = PassReport {
            tick,
            ..PassReport::default()
        };
        let (to_unlink, to_link) = invalidate(entities);

        for handle in to_unlink {
            self.unlink(handle, entities, &*register, state, &mut report);
        }
        self.flush(register, state, &mut report);

        for handle in to_link {
            self.link(handle, entities, register, state, &mut report);
        }
        self.flush(register, state, &mut report);

        entities.clear_transient_tags();
        report.removed = entities.remove_pending().len();

        tracing::debug!(
            unlinked = report.unlinked,
            linked = report.linked,
            destroyed = report.destroyed.len(),
            kept = report.kept.len(),
            "spawnables pass complete"
        );
        report
    }

    fn unlink(
        &mut self,
        handle: EntityHandle,
        entities: &BindingEntities,
        register: &dyn SpawnRegister,
        state: &PlaybackState<'_>,
        report: &mut PassReport,
    ) {
        let Some(entity) = entities.get(handle) else {
            return;
        };
        let Some(instance) = state.instances.get(entity.instance) else {
            tracing::trace!(entity = %handle, "sequence instance gone; dropping unlink");
            report.dropped += 1;
            return;
        };
        report.unlinked += 1;
        self.queue_releases(entity.binding_id, entity.instance, instance, register, report);
    }

    fn link(
        &mut self,
        handle: EntityHandle,
        entities: &mut BindingEntities,
        register: &mut dyn SpawnRegister,
        state: &mut PlaybackState<'_>,
        report: &mut PassReport,
    ) {
        let Some(entity) = entities.get(handle) else {
            return;
        };
        let (binding_id, instance_handle, active) =
            (entity.binding_id, entity.instance, entity.active);
        let instances = state.instances;
        let Some(instance) = instances.get(instance_handle) else {
            tracing::trace!(entity = %handle, "sequence instance gone; dropping link");
            report.dropped += 1;
            return;
        };

        if state.is_overridden(binding_id, instance.id) {
            tracing::trace!(binding = %binding_id, instance = %instance.id, "binding overridden");
            report.overridden += 1;
            return;
        }
        if !active {
            report.disabled += 1;
            self.queue_releases(binding_id, instance_handle, instance, &*register, report);
            return;
        }

        let sequences = state.sequences;
        let Some(sequence) = sequences.get(instance.sequence) else {
            tracing::trace!(sequence = %instance.sequence, "unknown sequence");
            return;
        };
        let mut resolved_any = false;
        for index in sequence.spawnable_indices(binding_id, state) {
            let key = SpawnKey::new(binding_id, instance.id, index);
            match register.spawn_object(binding_id, instance.sequence, instance.id, index, state) {
                Some(_) => {
                    report.spawned.push(key);
                    resolved_any = true;
                }
                None => report.failed.push(key),
            }
        }
        report.linked += 1;

        if resolved_any {
            if let Some(entity) = entities.get_mut(handle) {
                entity.tags.insert(EntityTags::RESOLUTION_STALE);
            }
        }
    }

    // Registered keys cover legacy and multi-reference bindings alike,
    // including indices whose reference has since been removed.
    fn queue_releases(
        &mut self,
        binding_id: BindingId,
        instance_handle: InstanceHandle,
        instance: &SequenceInstance,
        register: &dyn SpawnRegister,
        report: &mut PassReport,
    ) {
        for key in register.keys_for(binding_id, instance.id) {
            let ownership = register
                .entry(&key)
                .map(|entry| entry.ownership)
                .unwrap_or_default();
            if instance.is_finished_sub_sequence() && ownership != SpawnOwnership::InnerSequence {
                tracing::trace!(%key, ?ownership, "kept by ancestor");
                report.kept.push(key);
                continue;
            }
            let action = match ownership {
                SpawnOwnership::External => ReleaseAction::Forget,
                _ => ReleaseAction::Destroy,
            };
            self.pending.push(PendingRelease {
                key,
                instance: instance_handle,
                action,
            });
        }
    }

    fn flush(
        &mut self,
        register: &mut dyn SpawnRegister,
        state: &mut PlaybackState<'_>,
        report: &mut PassReport,
    ) {
        for release in self.pending.drain(..) {
            if state.instances.get(release.instance).is_none() {
                tracing::trace!(key = %release.key, "sequence instance gone; dropping release");
                report.dropped += 1;
                continue;
            }
            match release.action {
                ReleaseAction::Destroy => {
                    if register.destroy_spawned_object(&release.key, state) {
                        report.destroyed.push(release.key);
                    }
                }
                ReleaseAction::Forget => {
                    if register.forget_spawned_object(&release.key).is_some() {
                        report.forgotten.push(release.key);
                    }
                }
            }
        }
    }
}

/// Tag changed and removed entities plus their descendants, then build the
/// unlink and link queues in slot order.
fn invalidate(entities: &mut BindingEntities) -> (Vec<EntityHandle>, Vec<EntityHandle>) {
    let handles = entities.handles();
    for &handle in &handles {
        let Some(tags) = entities.get(handle).map(|entity| entity.tags) else {
            continue;
        };
        if !tags.intersects(EntityTags::DATA_CHANGED | EntityTags::PENDING_REMOVAL) {
            continue;
        }
        let removing = tags.contains(EntityTags::PENDING_REMOVAL);
        let follow_up = if removing {
            EntityTags::PENDING_REMOVAL
        } else {
            EntityTags::NEEDS_LINK
        };
        if let Some(entity) = entities.get_mut(handle) {
            entity.tags.insert(EntityTags::NEEDS_UNLINK);
            if !removing {
                entity.tags.insert(EntityTags::NEEDS_LINK);
            }
        }
        for child in entities.descendants(handle) {
            if let Some(entity) = entities.get_mut(child) {
                entity.tags.insert(EntityTags::NEEDS_UNLINK | follow_up);
            }
        }
    }

    let mut to_unlink = Vec::new();
    let mut to_link = Vec::new();
    for handle in handles {
        let Some(tags) = entities.get(handle).map(|entity| entity.tags) else {
            continue;
        };
        if !tags.contains(EntityTags::SPAWNABLE) {
            continue;
        }
        if tags.contains(EntityTags::NEEDS_UNLINK) {
            to_unlink.push(handle);
        }
        if tags.contains(EntityTags::NEEDS_LINK) && !tags.contains(EntityTags::PENDING_REMOVAL) {
            to_link.push(handle);
        }
    }
    (to_unlink, to_link)
}
