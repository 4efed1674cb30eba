//! Latch Sequence Runtime
//!
//! Plays a demo sequence through the spawn lifecycle and reports what the
//! register did.

use anyhow::{Context, Result};
use latch_sequence::{
    BindingEntities, BindingId, BindingIndex, BindingResolveParams, BindingResolver,
    CustomBinding, EntityHandle, Locator, ObjectHandle, PlaybackState, ReplaceableBinding,
    RuntimeBindingResolver, Sequence, SequenceId, SequenceInstanceId, SequenceInstances,
    SequenceLibrary, SequencerSettings, SpawnOwnership, SpawnableBinding, SpawnablesPass, World,
    WorldKind,
};
use tracing::{debug, info};

const ROOT_SEQ: SequenceId = SequenceId(1);
const LOOP_SEQ: SequenceId = SequenceId(2);

const CAMERA: BindingId = BindingId::from_u128(0x01);
const CROWD: BindingId = BindingId::from_u128(0x02);
const HERO: BindingId = BindingId::from_u128(0x03);
const STAGE: BindingId = BindingId::from_u128(0x04);
const PROP: BindingId = BindingId::from_u128(0x11);
const LIGHT: BindingId = BindingId::from_u128(0x12);

/// Ticks per loop iteration of the sub-sequence.
const LOOP_TICKS: u64 = 3;

/// Stands the player in for the hero outside the editor.
struct PlayerResolver {
    player: ObjectHandle,
}

impl RuntimeBindingResolver for PlayerResolver {
    fn resolve_runtime_binding(
        &self,
        params: &BindingResolveParams,
        _index: BindingIndex,
        world: &World,
    ) -> Option<ObjectHandle> {
        (params.binding_id == HERO && world.is_valid(self.player)).then_some(self.player)
    }
}

struct Iteration {
    id: SequenceInstanceId,
    entities: Vec<EntityHandle>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Latch Sequence v{}", latch_sequence::VERSION);
    let settings = match std::env::args().nth(1) {
        Some(path) => SequencerSettings::load(&path)
            .with_context(|| format!("failed to load settings from {path}"))?,
        None => SequencerSettings::default(),
    };

    let (mut world, player) = build_world(settings.world_kind())?;
    let sequences = build_library();
    let mut instances = SequenceInstances::new(ROOT_SEQ);
    let root = instances.root().context("root sequence instance missing")?;

    let mut entities = BindingEntities::new();
    for (binding, spawnable) in [(CAMERA, true), (CROWD, true), (HERO, true), (STAGE, false)] {
        entities.add(binding, root, spawnable);
    }
    let mut iteration = start_iteration(&mut instances, &mut entities)?;
    let mut retired: Option<SequenceInstanceId> = None;

    let resolver = PlayerResolver { player };
    let mut register = settings.build_register();
    let mut pass = SpawnablesPass::new(settings.clock());
    info!(
        world = ?settings.world_kind(),
        ticks = settings.playback.ticks,
        reuse = settings.spawning.reuse_spawned_objects,
        "playback started"
    );

    for _ in 0..settings.playback.ticks {
        let mut state = PlaybackState::new(&mut world, &sequences, &instances)
            .with_runtime_resolver(&resolver);
        let report = pass.run(&mut entities, register.as_mut(), &mut state);
        info!(
            tick = report.tick,
            linked = report.linked,
            spawned = report.spawned.len(),
            destroyed = report.destroyed.len(),
            kept = report.kept.len(),
            failed = report.failed.len(),
            "tick evaluated"
        );

        for binding in [HERO, STAGE] {
            let params = BindingResolveParams::new(ROOT_SEQ, binding, SequenceInstanceId::ROOT);
            let result = BindingResolver::new().resolve(&params, 0, register.as_mut(), &mut state);
            debug!(%binding, object = ?result.object, kind = ?result.kind, "resolved");
        }

        if let Some(id) = retired.take() {
            let swept = register.cleanup_sequence(id, &mut state);
            debug!(instance = %id, swept, "loop iteration retired");
            instances.remove(id);
        }
        if report.tick % LOOP_TICKS == 0 {
            instances.finish(iteration.id);
            for entity in &iteration.entities {
                entities.mark_for_removal(*entity);
            }
            retired = Some(iteration.id);
            iteration = start_iteration(&mut instances, &mut entities)?;
        }
    }

    let mut state = PlaybackState::new(&mut world, &sequences, &instances);
    let forgotten = register.forget_externally_owned_spawned_objects();
    let released = register.cleanup(&mut state);
    let collected = world.collect_garbage();
    info!(forgotten, released, collected, remaining = world.len(), "playback stopped");
    info!(stats = %register.stats(), "register stats");

    Ok(())
}

fn build_world(kind: WorldKind) -> Result<(World, ObjectHandle)> {
    let mut world = World::new(kind);
    for class in ["Camera", "Extra", "Hero", "Mannequin", "Set", "Prop", "Light"] {
        world.register_class(class);
    }
    world.create_object(&"Set".into(), "Stage", None)?;
    let player = world.create_object(&"Hero".into(), "Player", None)?;
    Ok((world, player))
}

fn build_library() -> SequenceLibrary {
    let mut root = Sequence::new(ROOT_SEQ, "Opening");
    root.add_spawnable(
        CAMERA,
        SpawnableBinding::new("Camera")
            .with_name("ShotCam")
            .with_ownership(SpawnOwnership::RootSequence),
    );
    for ownership in [
        SpawnOwnership::InnerSequence,
        SpawnOwnership::InnerSequence,
        SpawnOwnership::External,
    ] {
        root.bindings.add_custom_binding(
            CROWD,
            CustomBinding::Spawnable(
                SpawnableBinding::new("Extra")
                    .with_ownership(ownership)
                    .with_default("walk_speed", 1.4),
            ),
        );
    }
    root.bindings.add_custom_binding(
        HERO,
        CustomBinding::Replaceable(
            ReplaceableBinding::new("Hero").with_preview(SpawnableBinding::new("Mannequin")),
        ),
    );
    root.bindings.add_locator(STAGE, Locator::from_path("Stage"));

    let mut shot = Sequence::new(LOOP_SEQ, "Loop");
    shot.add_spawnable(PROP, SpawnableBinding::new("Prop").with_name("Crate"));
    shot.add_spawnable(
        LIGHT,
        SpawnableBinding::new("Light").with_ownership(SpawnOwnership::RootSequence),
    );

    let mut library = SequenceLibrary::new();
    library.insert(root);
    library.insert(shot);
    library
}

fn start_iteration(
    instances: &mut SequenceInstances,
    entities: &mut BindingEntities,
) -> Result<Iteration> {
    let (id, handle) = instances
        .add_sub_sequence(SequenceInstanceId::ROOT, LOOP_SEQ)
        .context("root sequence instance missing")?;
    let entities = [PROP, LIGHT]
        .into_iter()
        .map(|binding| entities.add(binding, handle, true))
        .collect();
    debug!(instance = %id, "loop iteration started");
    Ok(Iteration { id, entities })
}
