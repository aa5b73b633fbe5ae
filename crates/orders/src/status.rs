use core::str::FromStr;

use serde::{Deserialize, Serialize};

use supplyline_auth::Role;
use supplyline_core::DomainError;

/// Order status lifecycle.
///
/// ```text
/// placed → approved → accepted → shipped → delivered
///    └────────┴───────────┴─────────┴──→ canceled
/// ```
///
/// `pending_approval` is read as `placed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[serde(alias = "pending_approval")]
    Placed,
    Approved,
    Accepted,
    Shipped,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Placed,
        OrderStatus::Approved,
        OrderStatus::Accepted,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Approved => "approved",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Canceled)
    }

    /// Stock is reserved against the order in this state.
    pub fn holds_stock(&self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::Shipped)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placed" | "pending_approval" => Ok(OrderStatus::Placed),
            "approved" => Ok(OrderStatus::Approved),
            "accepted" => Ok(OrderStatus::Accepted),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "canceled" | "cancelled" => Ok(OrderStatus::Canceled),
            other => Err(DomainError::invalid_payload(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// One edge of the order state machine and the roles allowed to drive it.
///
/// Identity constraints on top of the role (assigned supplier, original
/// requester) are enforced by `Order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub roles: &'static [Role],
}

/// Roles allowed to place a new order.
pub const PLACING_ROLES: &[Role] = &[Role::Healthcare, Role::Procurement];

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: OrderStatus::Placed,
        to: OrderStatus::Approved,
        roles: &[Role::Procurement],
    },
    Transition {
        from: OrderStatus::Placed,
        to: OrderStatus::Canceled,
        // The order's own requester may also cancel while placed.
        roles: &[Role::Procurement],
    },
    Transition {
        from: OrderStatus::Approved,
        to: OrderStatus::Accepted,
        roles: &[Role::Supplier],
    },
    Transition {
        from: OrderStatus::Approved,
        to: OrderStatus::Canceled,
        roles: &[Role::Procurement],
    },
    Transition {
        from: OrderStatus::Accepted,
        to: OrderStatus::Shipped,
        roles: &[Role::Warehouse, Role::Supplier],
    },
    Transition {
        from: OrderStatus::Accepted,
        to: OrderStatus::Canceled,
        roles: &[Role::Procurement],
    },
    Transition {
        from: OrderStatus::Shipped,
        to: OrderStatus::Delivered,
        roles: &[Role::Warehouse],
    },
    Transition {
        from: OrderStatus::Shipped,
        to: OrderStatus::Canceled,
        roles: &[Role::Procurement],
    },
];

impl Transition {
    /// Look up the edge `from → to`, if the table has one.
    pub fn find(from: OrderStatus, to: OrderStatus) -> Option<&'static Transition> {
        TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
    }

    pub fn allows_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
