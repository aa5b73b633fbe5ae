use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "inventory.manage"). Order status
/// transitions are not gated here: the order state machine checks roles
/// against its own transition table. These cover everything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Create items, replenish stock.
    pub const INVENTORY_MANAGE: Permission = Permission(Cow::Borrowed("inventory.manage"));
    /// Create and delete warehouses.
    pub const WAREHOUSE_MANAGE: Permission = Permission(Cow::Borrowed("warehouse.manage"));
    /// Raise procurement requests.
    pub const PROCUREMENT_REQUEST: Permission = Permission(Cow::Borrowed("procurement.request"));
    /// Turn an approved procurement request into an order.
    pub const PROCUREMENT_ORDER: Permission = Permission(Cow::Borrowed("procurement.order"));
    /// Register actors in the directory.
    pub const DIRECTORY_MANAGE: Permission = Permission(Cow::Borrowed("directory.manage"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
