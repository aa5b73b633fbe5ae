use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use supplyline_auth::{Actor, Role};
use supplyline_core::UserId;

/// Registry of known actors.
///
/// Authentication lives elsewhere; the engine only needs to answer "is this
/// user id a registered supplier?" when an order is approved.
pub trait ActorDirectory: Send + Sync {
    fn get(&self, id: UserId) -> Option<Actor>;
    /// Insert or replace the actor's role.
    fn register(&self, actor: Actor);
    fn list(&self) -> Vec<Actor>;

    fn list_by_role(&self, role: Role) -> Vec<Actor> {
        self.list().into_iter().filter(|a| a.role == role).collect()
    }
}

impl<D> ActorDirectory for Arc<D>
where
    D: ActorDirectory + ?Sized,
{
    fn get(&self, id: UserId) -> Option<Actor> {
        (**self).get(id)
    }

    fn register(&self, actor: Actor) {
        (**self).register(actor)
    }

    fn list(&self) -> Vec<Actor> {
        (**self).list()
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryActorDirectory {
    inner: RwLock<HashMap<UserId, Actor>>,
}

impl InMemoryActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actors(actors: impl IntoIterator<Item = Actor>) -> Self {
        let directory = Self::new();
        for actor in actors {
            directory.register(actor);
        }
        directory
    }
}

impl ActorDirectory for InMemoryActorDirectory {
    fn get(&self, id: UserId) -> Option<Actor> {
        let map = self.inner.read().ok()?;
        map.get(&id).copied()
    }

    fn register(&self, actor: Actor) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(actor.id, actor);
        }
    }

    fn list(&self) -> Vec<Actor> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        let mut actors: Vec<Actor> = map.values().copied().collect();
        actors.sort_by_key(|a| *a.id.as_uuid());
        actors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_replaces_role() {
        let id = UserId::new();
        let directory = InMemoryActorDirectory::with_actors([Actor::healthcare(id)]);
        directory.register(Actor::supplier(id));

        assert_eq!(directory.get(id), Some(Actor::supplier(id)));
        assert_eq!(directory.list().len(), 1);
    }

    #[test]
    fn filters_by_role() {
        let directory = InMemoryActorDirectory::with_actors([
            Actor::supplier(UserId::new()),
            Actor::supplier(UserId::new()),
            Actor::warehouse(UserId::new()),
        ]);

        assert_eq!(directory.list_by_role(Role::Supplier).len(), 2);
        assert!(directory.list_by_role(Role::Healthcare).is_empty());
        assert!(directory.get(UserId::new()).is_none());
    }
}
