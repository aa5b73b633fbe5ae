use serde::{Deserialize, Serialize};

use supplyline_core::{Entity, UserId};

use crate::Role;

/// An authenticated actor attempting an engine operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn procurement(id: UserId) -> Self {
        Self::new(id, Role::Procurement)
    }

    pub fn warehouse(id: UserId) -> Self {
        Self::new(id, Role::Warehouse)
    }

    pub fn supplier(id: UserId) -> Self {
        Self::new(id, Role::Supplier)
    }

    pub fn healthcare(id: UserId) -> Self {
        Self::new(id, Role::Healthcare)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

impl Entity for Actor {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
