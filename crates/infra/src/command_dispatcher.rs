//! Command execution pipeline (application-level orchestration).
//!
//! The `CommandDispatcher` implements this pipeline for any event-sourced
//! aggregate:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (audit trails, read models)
//! ```
//!
//! Steps 1–2 (`load`) and 4–5 (`commit`) are also exposed separately so the
//! engine can interleave a second aggregate between deciding and committing
//! (order acceptance reserves stock on the item stream in between).
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use supplyline_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use supplyline_events::{EventBus, EventEnvelope};

use crate::error::EngineError;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Reusable command execution engine for event-sourced aggregates.
///
/// ## Execution Guarantees
///
/// - Events are persisted before publication (if append fails, nothing is published)
/// - Optimistic concurrency: the append expects the version the decision was made against
/// - Each command operates on a single aggregate instance
///
/// If publication fails after a successful append the error is returned, but
/// the events are already persisted (at-least-once delivery).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate.
    ///
    /// The returned aggregate's `version()` equals the stream version and is
    /// what a later `commit` must expect.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce() -> A,
    ) -> Result<A, EngineError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate();
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Persist decided events, then publish them.
    pub fn commit<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected_version: ExpectedVersion,
        decided: &[A::Event],
    ) -> Result<Vec<StoredEvent>, EngineError>
    where
        A: Aggregate,
        A::Event: supplyline_events::Event + Serialize,
    {
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected_version)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| EngineError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Dispatch a command through the full pipeline and return the aggregate
    /// with the new events applied.
    ///
    /// A version conflict surfaces as `EventStoreError::Concurrency`; callers
    /// retry by dispatching again (the ledger does) or report a conflict.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce() -> A,
    ) -> Result<A, EngineError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: supplyline_events::Event + Serialize + DeserializeOwned,
    {
        let mut aggregate = self.load(aggregate_id, make_aggregate)?;
        let expected = ExpectedVersion::Exact(aggregate.version());

        let decided = aggregate.handle(command)?;
        self.commit::<A>(aggregate_id, aggregate_type, expected, &decided)?;

        for ev in &decided {
            aggregate.apply(ev);
        }
        Ok(aggregate)
    }

    /// Rehydrate every aggregate of one type.
    pub fn load_all<A>(
        &self,
        aggregate_type: &str,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<A>, EngineError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.store
            .list_aggregate_ids(aggregate_type)?
            .into_iter()
            .map(|id| self.load(id, || make_aggregate(id)))
            .collect()
    }
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), EngineError> {
    // A buggy backend must not leak another stream into this aggregate, and
    // sequence numbers must be strictly increasing.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(EngineError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(EngineError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), EngineError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| EngineError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number)))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use supplyline_core::AggregateRoot;
    use supplyline_events::InMemoryEventBus;
    use supplyline_inventory::{
        CreateItem, InventoryCommand, InventoryItem, InventoryItemId, Replenish, WarehouseId,
    };

    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn dispatcher() -> CommandDispatcher<InMemoryEventStore, Bus> {
        CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()))
    }

    fn create(item_id: InventoryItemId) -> InventoryCommand {
        InventoryCommand::CreateItem(CreateItem {
            item_id,
            warehouse_id: WarehouseId::new(AggregateId::new()),
            name: "Saline 500ml".to_string(),
            description: String::new(),
            initial_quantity: 10,
            reorder_threshold: 5,
            expiration_date: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_publishes_and_rehydrates() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let item_id = InventoryItemId::new(AggregateId::new());

        let item = d
            .dispatch(item_id.0, "inventory.item", &create(item_id), || InventoryItem::empty(item_id))
            .unwrap();
        assert_eq!(item.quantity(), 10);
        assert_eq!(item.version(), 1);

        let reloaded: InventoryItem = d.load(item_id.0, || InventoryItem::empty(item_id)).unwrap();
        assert_eq!(reloaded, item);

        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type(), "inventory.item.created");
        assert_eq!(published[0].sequence_number(), 1);
    }

    #[test]
    fn rejected_command_writes_nothing() {
        let d = dispatcher();
        let item_id = InventoryItemId::new(AggregateId::new());
        d.dispatch(item_id.0, "inventory.item", &create(item_id), || InventoryItem::empty(item_id))
            .unwrap();

        let err = d
            .dispatch(
                item_id.0,
                "inventory.item",
                &InventoryCommand::Replenish(Replenish {
                    item_id,
                    quantity: -5,
                    occurred_at: Utc::now(),
                }),
                || InventoryItem::empty(item_id),
            )
            .unwrap_err();

        assert_eq!(err, EngineError::Domain(DomainError::InvalidQuantity(-5)));
        assert_eq!(d.store().event_count(), 1);
    }

    #[test]
    fn stale_commit_is_a_concurrency_error() {
        let d = dispatcher();
        let item_id = InventoryItemId::new(AggregateId::new());
        let item: InventoryItem = d.load(item_id.0, || InventoryItem::empty(item_id)).unwrap();
        let decided = item.handle(&create(item_id)).unwrap();

        d.dispatch(item_id.0, "inventory.item", &create(item_id), || InventoryItem::empty(item_id))
            .unwrap();

        let err = d
            .commit::<InventoryItem>(item_id.0, "inventory.item", ExpectedVersion::Exact(0), &decided)
            .unwrap_err();
        assert!(err.is_concurrency());
    }
}
