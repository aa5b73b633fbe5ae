use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use supplyline_core::UserId;
use supplyline_events::{Event, EventEnvelope};
use supplyline_orders::{OrderEvent, OrderId, OrderStatus};

use crate::engine::ORDER_AGGREGATE_TYPE;

/// One audited step in an order's life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub sequence_number: u64,
    pub event_type: String,
    /// Status after the event; `None` for annotations.
    pub status: Option<OrderStatus>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineProjectionError {
    #[error("failed to deserialize order event: {0}")]
    Deserialize(String),

    #[error("event order_id does not match envelope aggregate_id")]
    StreamMismatch,

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,
}

/// Audit trail of order events, built from published envelopes.
///
/// Envelopes of other aggregate types are ignored. Redelivered envelopes
/// (sequence ≤ cursor) are skipped, so at-least-once delivery is safe.
#[derive(Debug, Default)]
pub struct OrderTimelineProjection {
    timelines: RwLock<HashMap<OrderId, Vec<TimelineEntry>>>,
}

impl OrderTimelineProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeline(&self, order_id: OrderId) -> Vec<TimelineEntry> {
        self.timelines
            .read()
            .ok()
            .and_then(|t| t.get(&order_id).cloned())
            .unwrap_or_default()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), TimelineProjectionError> {
        if envelope.aggregate_type() != ORDER_AGGREGATE_TYPE {
            return Ok(());
        }

        let seq = envelope.sequence_number();
        let order_id = OrderId::new(envelope.aggregate_id());

        let mut timelines = self
            .timelines
            .write()
            .map_err(|_| TimelineProjectionError::Poisoned)?;
        let timeline = timelines.entry(order_id).or_default();
        let last = timeline.last().map(|e| e.sequence_number).unwrap_or(0);

        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if seq != last + 1 {
            return Err(TimelineProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| TimelineProjectionError::Deserialize(e.to_string()))?;

        let (event_order_id, status, actor_id) = match &event {
            OrderEvent::OrderPlaced(e) => (e.order_id, Some(OrderStatus::Placed), e.requester_id),
            OrderEvent::OrderApproved(e) => (e.order_id, Some(OrderStatus::Approved), e.approved_by),
            OrderEvent::OrderAccepted(e) => (e.order_id, Some(OrderStatus::Accepted), e.accepted_by),
            OrderEvent::OrderShipped(e) => (e.order_id, Some(OrderStatus::Shipped), e.shipped_by),
            OrderEvent::OrderDelivered(e) => (e.order_id, Some(OrderStatus::Delivered), e.delivered_by),
            OrderEvent::OrderCanceled(e) => (e.order_id, Some(OrderStatus::Canceled), e.canceled_by),
            OrderEvent::FeedbackAttached(e) => (e.order_id, None, e.author_id),
        };
        if event_order_id != order_id {
            return Err(TimelineProjectionError::StreamMismatch);
        }

        timeline.push(TimelineEntry {
            sequence_number: seq,
            event_type: event.event_type().to_string(),
            status,
            actor_id,
            occurred_at: event.occurred_at(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supplyline_core::AggregateId;
    use supplyline_inventory::InventoryItemId;
    use supplyline_orders::{OrderPlaced, OrderShipped};
    use uuid::Uuid;

    fn envelope(order_id: OrderId, seq: u64, event: &OrderEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            seq,
            event.event_type(),
            serde_json::to_value(event).unwrap(),
        )
    }

    fn placed(order_id: OrderId) -> OrderEvent {
        OrderEvent::OrderPlaced(OrderPlaced {
            order_id,
            item_id: InventoryItemId::new(AggregateId::new()),
            quantity_ordered: 2,
            requester_id: UserId::new(),
            procurement_request_id: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn redelivery_is_idempotent() {
        let projection = OrderTimelineProjection::new();
        let order_id = OrderId::new(AggregateId::new());
        let env = envelope(order_id, 1, &placed(order_id));

        projection.apply_envelope(&env).unwrap();
        projection.apply_envelope(&env).unwrap();

        let timeline = projection.timeline(order_id);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].status, Some(OrderStatus::Placed));
        assert_eq!(timeline[0].event_type, "orders.order.placed");
    }

    #[test]
    fn gaps_are_rejected() {
        let projection = OrderTimelineProjection::new();
        let order_id = OrderId::new(AggregateId::new());
        projection
            .apply_envelope(&envelope(order_id, 1, &placed(order_id)))
            .unwrap();

        let shipped = OrderEvent::OrderShipped(OrderShipped {
            order_id,
            shipped_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        let err = projection
            .apply_envelope(&envelope(order_id, 3, &shipped))
            .unwrap_err();
        assert_eq!(err, TimelineProjectionError::NonMonotonicSequence { last: 1, found: 3 });
    }

    #[test]
    fn other_streams_are_ignored() {
        let projection = OrderTimelineProjection::new();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::new(),
            "inventory.item",
            1,
            "inventory.item.created",
            serde_json::json!({}),
        );
        assert!(projection.apply_envelope(&env).is_ok());
    }
}
