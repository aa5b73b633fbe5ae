use serde::{Deserialize, Serialize};

use supplyline_core::{AggregateId, ValueObject};

use crate::InventoryItemId;

/// Identifier of a stock reservation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub AggregateId);

impl ReservationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stock committed to one order.
///
/// Handed back by the ledger on a successful reserve; the holder passes it to
/// release (cancellation) or consume (delivery).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item_id: InventoryItemId,
    /// Stream id of the order holding the stock.
    pub order_id: AggregateId,
    pub quantity: i64,
}

impl ValueObject for Reservation {}
