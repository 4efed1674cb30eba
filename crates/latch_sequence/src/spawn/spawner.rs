//! Object spawners
//!
//! Spawners perform the actual construction and destruction of spawned
//! objects. Registers own them; bindings pick the first spawner that
//! accepts the class they want.

use crate::custom::SpawnTemplate;
use crate::world::{ObjectClass, ObjectHandle, World};
use std::collections::HashSet;

pub trait ObjectSpawner {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn can_spawn(&self, class: &ObjectClass) -> bool;

    /// Construct an object from `template` named `name`.
    fn spawn(
        &self,
        template: &SpawnTemplate,
        name: &str,
        world: &mut World,
    ) -> Option<ObjectHandle>;

    /// Tear the object down. Returns false if it was already gone.
    fn destroy(&self, handle: ObjectHandle, world: &mut World) -> bool;
}

/// Spawns objects straight into the world, optionally limited to a set of
/// classes.
#[derive(Debug, Clone, Default)]
pub struct WorldSpawner {
    classes: Option<HashSet<ObjectClass>>,
}

impl WorldSpawner {
    /// Spawner that accepts every class.
    pub fn any() -> Self {
        Self { classes: None }
    }

    pub fn for_classes<I>(classes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ObjectClass>,
    {
        Self {
            classes: Some(classes.into_iter().map(Into::into).collect()),
        }
    }
}

impl ObjectSpawner for WorldSpawner {
    fn name(&self) -> &str {
        "world"
    }

    fn can_spawn(&self, class: &ObjectClass) -> bool {
        self.classes
            .as_ref()
            .map_or(true, |classes| classes.contains(class))
    }

    fn spawn(
        &self,
        template: &SpawnTemplate,
        name: &str,
        world: &mut World,
    ) -> Option<ObjectHandle> {
        match world.create_object(&template.class, name, None) {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(class = %template.class, name, %err, "spawn failed");
                None
            }
        }
    }

    fn destroy(&self, handle: ObjectHandle, world: &mut World) -> bool {
        world.destroy_object(handle)
    }
}

/// First spawner in `spawners` that accepts `class`.
pub(crate) fn find_spawner<'s>(
    spawners: &'s [Box<dyn ObjectSpawner>],
    class: &ObjectClass,
) -> Option<&'s dyn ObjectSpawner> {
    spawners
        .iter()
        .find(|spawner| spawner.can_spawn(class))
        .map(|spawner| spawner.as_ref())
}
