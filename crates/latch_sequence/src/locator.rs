//! Static object locators
//!
//! A locator is the serializable half of a static binding: a path that finds
//! (or loads) a live object relative to a resolve context.

use crate::world::{ObjectHandle, World};
use serde::{Deserialize, Serialize};

/// How hard a locator should try when its object is not present.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveFlags {
    #[default]
    None,
    /// Queue a load for missing objects; resolution stays empty until it lands.
    Load,
}

/// Where a locator is resolved.
#[derive(Clone, Copy)]
pub struct ResolveContext<'w> {
    pub world: &'w World,
    /// Scope object names are looked up in; top level when `None`.
    pub outer: Option<ObjectHandle>,
}

impl<'w> ResolveContext<'w> {
    pub fn new(world: &'w World) -> Self {
        Self { world, outer: None }
    }

    pub fn with_outer(world: &'w World, outer: Option<ObjectHandle>) -> Self {
        Self { world, outer }
    }
}

/// Path to an object. An empty locator never resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator {
    path: Option<String>,
}

impl Locator {
    pub fn empty() -> Self {
        Self { path: None }
    }

    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Locator that finds `object` again from its outer.
    pub fn from_object(world: &World, object: ObjectHandle) -> Self {
        match world.get(object) {
            Some(runtime_object) => Self::from_path(runtime_object.name.clone()),
            None => Self::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Find the live object this locator points at.
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<ObjectHandle> {
        let path = self.path.as_deref()?;
        ctx.world
            .find(ctx.outer, path)
            .filter(|handle| ctx.world.is_valid(*handle))
    }

    /// Resolve, loading the object synchronously when it is missing.
    ///
    /// Loading only applies to top-level paths.
    pub fn sync_find(
        &self,
        world: &mut World,
        outer: Option<ObjectHandle>,
    ) -> Option<ObjectHandle> {
        if let Some(found) = self.resolve(&ResolveContext::with_outer(world, outer)) {
            return Some(found);
        }
        match (outer, self.path.as_deref()) {
            (None, Some(path)) => world.load_now(path).filter(|handle| world.is_valid(*handle)),
            _ => None,
        }
    }
}
