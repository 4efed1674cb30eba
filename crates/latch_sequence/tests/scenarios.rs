//! End-to-end binding and spawn lifecycle scenarios

use latch_sequence::{
    BindingEntities, BindingId, BindingIndex, BindingResolveParams, BindingResolver,
    CustomBinding, Locator, ObjectClass, ObjectHandle, ObjectSpawner, PlaybackState,
    ReplaceableBinding, ReuseSettings, ReusingSpawnRegister, RuntimeBindingResolver, Sequence,
    SequenceId, SequenceInstanceId, SequenceInstances, SequenceLibrary, SpawnEvent,
    SpawnEventLog, SpawnKey, SpawnOwnership, SpawnRegister, SpawnTemplate, SpawnableBinding,
    SpawnablesPass, StandardSpawnRegister, World, WorldKind, WorldSpawner,
};
use std::cell::Cell;
use std::rc::Rc;

const ROOT_SEQ: SequenceId = SequenceId(1);
const SUB_SEQ: SequenceId = SequenceId(2);
const ROOT: SequenceInstanceId = SequenceInstanceId::ROOT;

const CAMERA: BindingId = BindingId::from_u128(0x100);
const LAMP: BindingId = BindingId::from_u128(0x200);
const PROP: BindingId = BindingId::from_u128(0x300);
const SUN: BindingId = BindingId::from_u128(0x400);
const HERO: BindingId = BindingId::from_u128(0x500);

/// Spawner that counts constructions.
struct CountingSpawner {
    inner: WorldSpawner,
    spawned: Rc<Cell<usize>>,
}

impl ObjectSpawner for CountingSpawner {
    fn name(&self) -> &str {
        "counting"
    }

    fn can_spawn(&self, class: &ObjectClass) -> bool {
        self.inner.can_spawn(class)
    }

    fn spawn(
        &self,
        template: &SpawnTemplate,
        name: &str,
        world: &mut World,
    ) -> Option<ObjectHandle> {
        self.spawned.set(self.spawned.get() + 1);
        self.inner.spawn(template, name, world)
    }

    fn destroy(&self, handle: ObjectHandle, world: &mut World) -> bool {
        self.inner.destroy(handle, world)
    }
}

fn counting_register() -> (StandardSpawnRegister, Rc<Cell<usize>>) {
    let spawned = Rc::new(Cell::new(0));
    let register = StandardSpawnRegister::with_spawners(vec![Box::new(CountingSpawner {
        inner: WorldSpawner::any(),
        spawned: spawned.clone(),
    })]);
    (register, spawned)
}

fn world(kind: WorldKind) -> World {
    let mut world = World::new(kind);
    for class in ["Camera", "Lamp", "Prop", "Light", "Hero", "Mannequin"] {
        world.register_class(class);
    }
    world
}

fn library(root: Sequence, sub: Option<Sequence>) -> SequenceLibrary {
    let mut library = SequenceLibrary::new();
    library.insert(root);
    if let Some(sub) = sub {
        library.insert(sub);
    }
    library
}

#[test]
fn spawn_constructs_at_most_once_per_live_key() {
    let mut root = Sequence::new(ROOT_SEQ, "Root");
    root.add_spawnable(CAMERA, SpawnableBinding::new("Camera"));
    let sequences = library(root, None);
    let instances = SequenceInstances::new(ROOT_SEQ);
    let mut world = world(WorldKind::Game);
    let (mut register, spawned) = counting_register();
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);

    let first = register.spawn_object(CAMERA, ROOT_SEQ, ROOT, 0, &mut state);
    for _ in 0..4 {
        assert_eq!(register.spawn_object(CAMERA, ROOT_SEQ, ROOT, 0, &mut state), first);
    }
    assert!(first.is_some());
    assert_eq!(spawned.get(), 1);

    // Resolution goes through the same entry.
    let params = BindingResolveParams::new(ROOT_SEQ, CAMERA, ROOT);
    let resolved = BindingResolver::new().resolve(&params, 0, &mut register, &mut state);
    assert_eq!(resolved.object, first);
    assert_eq!(spawned.get(), 1);
}

#[test]
fn relink_destroys_before_spawning_again() {
    let mut root = Sequence::new(ROOT_SEQ, "Root");
    root.add_spawnable(CAMERA, SpawnableBinding::new("Camera").with_name("ShotCam"));
    let sequences = library(root, None);
    let instances = SequenceInstances::new(ROOT_SEQ);
    let mut world = world(WorldKind::Game);
    let log = SpawnEventLog::new();
    let mut register = StandardSpawnRegister::new();
    register.add_observer(Box::new(log.clone()));

    let mut entities = BindingEntities::new();
    let camera = entities.add(CAMERA, instances.root().unwrap(), true);
    let mut pass = SpawnablesPass::default();
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);
    pass.run(&mut entities, &mut register, &mut state);
    let key = SpawnKey::new(CAMERA, ROOT, 0);
    let before = register.find_spawned_object(&key).unwrap();
    log.take();

    entities.mark_changed(camera);
    let report = pass.run(&mut entities, &mut register, &mut state);
    let after = register.find_spawned_object(&key).unwrap();

    assert_ne!(before, after);
    assert_eq!(report.destroyed, [key]);
    assert_eq!(report.spawned, [key]);
    assert_eq!(
        log.events(),
        [
            SpawnEvent::Destroyed { key, object: before },
            SpawnEvent::Spawned { key, object: after },
        ]
    );
    // The old object freed its name before the new one asked for it.
    assert_eq!(state.world.get(after).unwrap().name, "ShotCam");
}

#[test]
fn destroy_is_idempotent() {
    let mut root = Sequence::new(ROOT_SEQ, "Root");
    root.add_spawnable(CAMERA, SpawnableBinding::new("Camera"));
    let sequences = library(root, None);
    let instances = SequenceInstances::new(ROOT_SEQ);
    let mut world = world(WorldKind::Game);
    let mut register = StandardSpawnRegister::new();
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);

    let camera = register.spawn_object(CAMERA, ROOT_SEQ, ROOT, 0, &mut state).unwrap();
    let key = SpawnKey::new(CAMERA, ROOT, 0);
    assert!(register.destroy_spawned_object(&key, &mut state));
    assert!(!state.world.contains(camera));
    assert!(!register.destroy_spawned_object(&key, &mut state));
    assert_eq!(register.stats().destroyed, 1);
}

#[test]
fn custom_binding_wins_over_locator() {
    let mut world = world(WorldKind::Game);
    let desk = world.create_object(&"Lamp".into(), "Desk", None).unwrap();

    let mut root = Sequence::new(ROOT_SEQ, "Root");
    root.bindings.add_locator(LAMP, Locator::from_path("Desk")).custom_binding = Some(
        CustomBinding::Spawnable(SpawnableBinding::new("Lamp").with_name("Spawned")),
    );
    let sequences = library(root, None);
    let instances = SequenceInstances::new(ROOT_SEQ);
    let mut register = StandardSpawnRegister::new();
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);

    let params = BindingResolveParams::new(ROOT_SEQ, LAMP, ROOT);
    let resolved = BindingResolver::new()
        .resolve(&params, 0, &mut register, &mut state)
        .object
        .unwrap();
    assert_ne!(resolved, desk);
    assert_eq!(state.world.get(resolved).unwrap().name, "Spawned");
}

#[test]
fn finished_sub_sequence_keeps_root_owned_spawns() {
    let mut sub = Sequence::new(SUB_SEQ, "Sub");
    sub.add_spawnable(
        SUN,
        SpawnableBinding::new("Light").with_ownership(SpawnOwnership::RootSequence),
    );
    sub.add_spawnable(PROP, SpawnableBinding::new("Prop"));
    let sequences = library(Sequence::new(ROOT_SEQ, "Root"), Some(sub));
    let mut instances = SequenceInstances::new(ROOT_SEQ);
    let (shot, shot_handle) = instances.add_sub_sequence(ROOT, SUB_SEQ).unwrap();

    let mut world = world(WorldKind::Game);
    let mut register = StandardSpawnRegister::new();
    let mut entities = BindingEntities::new();
    let sun = entities.add(SUN, shot_handle, true);
    let prop = entities.add(PROP, shot_handle, true);
    let mut pass = SpawnablesPass::default();
    {
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);
        pass.run(&mut entities, &mut register, &mut state);
    }
    assert_eq!(register.len(), 2);

    instances.finish(shot);
    entities.mark_for_removal(sun);
    entities.mark_for_removal(prop);
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);
    let report = pass.run(&mut entities, &mut register, &mut state);

    let sun_key = SpawnKey::new(SUN, shot, 0);
    let prop_key = SpawnKey::new(PROP, shot, 0);
    assert_eq!(report.kept, [sun_key]);
    assert_eq!(report.destroyed, [prop_key]);
    assert!(register.find_spawned_object(&sun_key).is_some());
    assert!(register.find_spawned_object(&prop_key).is_none());

    // The root tears the survivor down when playback stops.
    assert_eq!(register.cleanup(&mut state), 1);
    assert!(state.world.is_empty());
}

#[test]
fn replacing_locator_with_custom_binding_changes_resolution() {
    let mut world = world(WorldKind::Game);
    let desk = world.create_object(&"Lamp".into(), "Desk", None).unwrap();
    let mut root = Sequence::new(ROOT_SEQ, "Root");
    root.bindings.add_locator(LAMP, Locator::from_path("Desk"));
    let mut sequences = library(root, None);
    let instances = SequenceInstances::new(ROOT_SEQ);
    let mut register = StandardSpawnRegister::new();
    let params = BindingResolveParams::new(ROOT_SEQ, LAMP, ROOT);

    {
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);
        let resolved = BindingResolver::new().resolve(&params, 0, &mut register, &mut state);
        assert_eq!(resolved.object, Some(desk));
    }

    sequences.get_mut(ROOT_SEQ).unwrap().bindings.add_or_replace_binding(
        LAMP,
        CustomBinding::Spawnable(SpawnableBinding::new("Lamp")),
        0,
    );
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);
    let resolved = BindingResolver::new().resolve(&params, 0, &mut register, &mut state);
    let spawned = register.find_spawned_object(&SpawnKey::new(LAMP, ROOT, 0));
    assert!(spawned.is_some());
    assert_eq!(resolved.object, spawned);
    assert_ne!(resolved.object, Some(desk));
}

#[test]
fn externally_destroyed_spawn_waits_for_unlink() {
    let mut root = Sequence::new(ROOT_SEQ, "Root");
    root.add_spawnable(CAMERA, SpawnableBinding::new("Camera"));
    let sequences = library(root, None);
    let instances = SequenceInstances::new(ROOT_SEQ);
    let mut world = world(WorldKind::Game);
    let (mut register, spawned) = counting_register();
    let mut entities = BindingEntities::new();
    let camera = entities.add(CAMERA, instances.root().unwrap(), true);
    let mut pass = SpawnablesPass::default();
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);
    pass.run(&mut entities, &mut register, &mut state);

    let key = SpawnKey::new(CAMERA, ROOT, 0);
    let original = register.find_spawned_object(&key).unwrap();
    assert!(state.world.destroy_object(original));

    // The dangling entry stays and nothing respawns.
    assert_eq!(register.find_spawned_object(&key), Some(original));
    assert_eq!(register.spawn_object(CAMERA, ROOT_SEQ, ROOT, 0, &mut state), None);
    let params = BindingResolveParams::new(ROOT_SEQ, CAMERA, ROOT);
    assert!(!BindingResolver::new()
        .resolve(&params, 0, &mut register, &mut state)
        .is_resolved());
    pass.run(&mut entities, &mut register, &mut state);
    assert_eq!(spawned.get(), 1);

    // An explicit unlink clears it.
    entities.mark_changed(camera);
    pass.run(&mut entities, &mut register, &mut state);
    let replacement = register.find_spawned_object(&key).unwrap();
    assert_ne!(replacement, original);
    assert!(state.world.is_valid(replacement));
    assert_eq!(spawned.get(), 2);
}

#[test]
fn looped_sub_sequence_reuses_pooled_object() {
    let mut sub = Sequence::new(SUB_SEQ, "Loop");
    sub.add_spawnable(PROP, SpawnableBinding::new("Prop"));
    let sequences = library(Sequence::new(ROOT_SEQ, "Root"), Some(sub));
    let mut instances = SequenceInstances::new(ROOT_SEQ);
    let mut world = world(WorldKind::Game);
    let mut register = ReusingSpawnRegister::new(ReuseSettings {
        separate_instance_per_sequence_instance: false,
        ..ReuseSettings::default()
    });
    let mut entities = BindingEntities::new();
    let mut pass = SpawnablesPass::default();

    let mut spawned_per_iteration = Vec::new();
    for _ in 0..2 {
        let (iteration, handle) = instances.add_sub_sequence(ROOT, SUB_SEQ).unwrap();
        let entity = entities.add(PROP, handle, true);
        {
            let mut state = PlaybackState::new(&mut world, &sequences, &instances);
            pass.run(&mut entities, &mut register, &mut state);
        }
        let key = SpawnKey::new(PROP, iteration, 0);
        spawned_per_iteration.push(register.find_spawned_object(&key));

        instances.finish(iteration);
        entities.mark_for_removal(entity);
        let mut state = PlaybackState::new(&mut world, &sequences, &instances);
        let report = pass.run(&mut entities, &mut register, &mut state);
        assert_eq!(report.destroyed.len(), 1);
    }

    assert!(spawned_per_iteration[0].is_some());
    assert_eq!(spawned_per_iteration[0], spawned_per_iteration[1]);
    assert_eq!(register.stats().spawned, 1);
    assert_eq!(register.stats().reused, 1);
    assert_eq!(register.stats().hidden, 2);
    assert_eq!(register.pooled(PROP, 0).len(), 1);
}

#[test]
fn separate_instances_spawn_per_iteration() {
    let mut sub = Sequence::new(SUB_SEQ, "Loop");
    sub.add_spawnable(PROP, SpawnableBinding::new("Prop"));
    let sequences = library(Sequence::new(ROOT_SEQ, "Root"), Some(sub));
    let mut instances = SequenceInstances::new(ROOT_SEQ);
    let (first, _) = instances.add_sub_sequence(ROOT, SUB_SEQ).unwrap();
    let (second, _) = instances.add_sub_sequence(ROOT, SUB_SEQ).unwrap();
    let mut world = world(WorldKind::Game);
    let mut register = ReusingSpawnRegister::new(ReuseSettings::default());
    let mut state = PlaybackState::new(&mut world, &sequences, &instances);

    let a = register.spawn_object(PROP, SUB_SEQ, first, 0, &mut state).unwrap();
    register.destroy_spawned_object(&SpawnKey::new(PROP, first, 0), &mut state);
    let b = register.spawn_object(PROP, SUB_SEQ, second, 0, &mut state).unwrap();
    assert_ne!(a, b);
    assert_eq!(register.pooled(PROP, 0), [a, b]);
}

#[test]
fn remove_invalid_bindings_keeps_valid_ranges_sorted() {
    let a = BindingId::from_u128(0xa);
    let b = BindingId::from_u128(0xb);
    let c = BindingId::from_u128(0xc);
    let mut table = latch_sequence::BindingReferenceTable::new();
    table.add_locator(c, Locator::from_path("c0"));
    table.add_locator(b, Locator::from_path("b0"));
    table.add_locator(a, Locator::from_path("a0"));
    table.add_locator(b, Locator::from_path("b1"));
    table.add_locator(a, Locator::from_path("a1"));

    let removed = table.remove_invalid_bindings(&[a, c].into_iter().collect());
    assert_eq!(removed, 2);
    assert!(table.references(b).is_empty());
    let paths = |id| -> Vec<Option<String>> {
        table
            .references(id)
            .iter()
            .map(|reference| reference.locator.path().map(str::to_string))
            .collect()
    };
    assert_eq!(paths(a), [Some("a0".to_string()), Some("a1".to_string())]);
    assert_eq!(paths(c), [Some("c0".to_string())]);
    let ids: Vec<BindingId> = table.iter().map(|reference| reference.id).collect();
    assert!(ids.windows(2).all(|pair| pair[0] <= pair[1]));
}

struct StandIn(ObjectHandle);

impl RuntimeBindingResolver for StandIn {
    fn resolve_runtime_binding(
        &self,
        params: &BindingResolveParams,
        _index: BindingIndex,
        world: &World,
    ) -> Option<ObjectHandle> {
        (params.binding_id == HERO && world.is_valid(self.0)).then_some(self.0)
    }
}

#[test]
fn replaceable_previews_in_editor_and_defers_at_runtime() {
    let mut root = Sequence::new(ROOT_SEQ, "Root");
    root.bindings.add_custom_binding(
        HERO,
        CustomBinding::Replaceable(
            ReplaceableBinding::new("Hero").with_preview(SpawnableBinding::new("Mannequin")),
        ),
    );
    let sequences = library(root, None);
    let instances = SequenceInstances::new(ROOT_SEQ);
    let params = BindingResolveParams::new(ROOT_SEQ, HERO, ROOT);

    let mut editor = world(WorldKind::Editor);
    let mut register = StandardSpawnRegister::new();
    let mut state = PlaybackState::new(&mut editor, &sequences, &instances);
    let preview = BindingResolver::new()
        .resolve(&params, 0, &mut register, &mut state)
        .object
        .unwrap();
    let object = state.world.get(preview).unwrap();
    assert_eq!(object.class, ObjectClass::new("Mannequin"));
    assert!(object.tags.contains(latch_sequence::ObjectTags::PREVIEW_ACTOR));

    let mut game = world(WorldKind::Game);
    let player = game.create_object(&"Hero".into(), "Player", None).unwrap();
    let stand_in = StandIn(player);
    let mut register = StandardSpawnRegister::new();
    let mut state =
        PlaybackState::new(&mut game, &sequences, &instances).with_runtime_resolver(&stand_in);
    let resolved = BindingResolver::new().resolve(&params, 0, &mut register, &mut state);
    assert_eq!(resolved.object, Some(player));
    assert!(register.is_empty());
}
