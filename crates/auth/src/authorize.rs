use thiserror::Error;

use supplyline_core::DomainError;

use crate::{Actor, Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: Role, permission: String },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Static role → permission policy.
pub fn role_permissions(role: Role) -> &'static [Permission] {
    const PROCUREMENT: &[Permission] = &[
        Permission::INVENTORY_MANAGE,
        Permission::WAREHOUSE_MANAGE,
        Permission::PROCUREMENT_REQUEST,
        Permission::PROCUREMENT_ORDER,
        Permission::DIRECTORY_MANAGE,
    ];
    const WAREHOUSE: &[Permission] = &[Permission::INVENTORY_MANAGE, Permission::WAREHOUSE_MANAGE];
    const HEALTHCARE: &[Permission] = &[Permission::PROCUREMENT_REQUEST];

    match role {
        Role::Procurement => PROCUREMENT,
        Role::Warehouse => WAREHOUSE,
        Role::Healthcare => HEALTHCARE,
        Role::Supplier => &[],
    }
}

/// Authorize an actor for a permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: &Permission) -> Result<(), AuthzError> {
    if role_permissions(actor.role).contains(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: actor.role,
            permission: required.as_str().to_string(),
        })
    }
}
