use core::str::FromStr;

use serde::{Deserialize, Serialize};

use supplyline_core::DomainError;

/// Actor role. A closed set; every authorization decision keys off it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Reviews requests and orders, assigns suppliers and warehouses.
    Procurement,
    /// Manages stock and receives deliveries.
    Warehouse,
    /// Fulfills orders assigned to it.
    Supplier,
    /// Clinical staff raising demand.
    Healthcare,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Procurement,
        Role::Warehouse,
        Role::Supplier,
        Role::Healthcare,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Procurement => "procurement",
            Role::Warehouse => "warehouse",
            Role::Supplier => "supplier",
            Role::Healthcare => "healthcare",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::invalid_payload(format!("unknown role '{s}'")))
    }
}
