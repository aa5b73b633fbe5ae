//! Inventory ledger: quantity-on-hand bookkeeping over item event streams.
//!
//! Every mutation is a check-and-append: the item is rehydrated, the command
//! is decided against that state, and the resulting events are appended with
//! `ExpectedVersion::Exact(version)`. If another writer got there first the
//! append is refused and the whole decision is re-taken against fresh state,
//! so a reserve can never commit on a stale quantity.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use supplyline_core::{AggregateId, Clock, DomainError};
use supplyline_events::{EventBus, EventEnvelope};
use supplyline_inventory::{
    ConsumeReservation, CreateItem, InventoryCommand, InventoryItem, InventoryItemId,
    ReleaseReservation, Replenish, Reservation, ReservationId, ReserveStock, UpdateItemDetails,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::EngineError;
use crate::event_store::EventStore;

pub const ITEM_AGGREGATE_TYPE: &str = "inventory.item";

/// Borrowed view over the dispatcher that performs ledger operations.
pub struct InventoryLedger<'a, S, B> {
    dispatcher: &'a CommandDispatcher<S, B>,
    clock: &'a dyn Clock,
    max_retries: u32,
}

impl<'a, S, B> InventoryLedger<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: &'a CommandDispatcher<S, B>, clock: &'a dyn Clock, max_retries: u32) -> Self {
        Self {
            dispatcher,
            clock,
            max_retries,
        }
    }

    pub fn get_item(&self, item_id: InventoryItemId) -> Result<InventoryItem, EngineError> {
        let item: InventoryItem = self.dispatcher.load(item_id.0, || InventoryItem::empty(item_id))?;
        if !item.exists() {
            return Err(DomainError::not_found(format!("inventory item {item_id}")).into());
        }
        Ok(item)
    }

    pub fn list_items(&self) -> Result<Vec<InventoryItem>, EngineError> {
        self.dispatcher
            .load_all(ITEM_AGGREGATE_TYPE, |id| InventoryItem::empty(InventoryItemId::new(id)))
    }

    pub fn create_item(&self, command: CreateItem) -> Result<InventoryItem, EngineError> {
        let item_id = command.item_id;
        let result = self.dispatcher.dispatch(
            item_id.0,
            ITEM_AGGREGATE_TYPE,
            &InventoryCommand::CreateItem(command),
            || InventoryItem::empty(item_id),
        );
        let item = self
            .settle_unpublished(item_id, "create", result)
            .map_err(EngineError::into_conflict)?;

        tracing::info!(
            item_id = %item_id,
            quantity = item.quantity(),
            reorder_threshold = item.reorder_threshold(),
            "inventory item created"
        );
        Ok(item)
    }

    /// Atomically add stock.
    pub fn replenish(&self, item_id: InventoryItemId, quantity: i64) -> Result<InventoryItem, EngineError> {
        let item = self.execute(item_id, "replenish", |occurred_at| {
            InventoryCommand::Replenish(Replenish {
                item_id,
                quantity,
                occurred_at,
            })
        })?;

        tracing::info!(item_id = %item_id, added = quantity, quantity = item.quantity(), "stock replenished");
        Ok(item)
    }

    /// Atomically check and take `quantity` units for `order_id`.
    ///
    /// On `InsufficientStock` nothing is written.
    pub fn reserve(
        &self,
        item_id: InventoryItemId,
        quantity: i64,
        order_id: AggregateId,
        reservation_id: ReservationId,
    ) -> Result<Reservation, EngineError> {
        let result = self.execute(item_id, "reserve", |occurred_at| {
            InventoryCommand::ReserveStock(ReserveStock {
                item_id,
                reservation_id,
                order_id,
                quantity,
                occurred_at,
            })
        });

        match result {
            Ok(item) => {
                tracing::info!(
                    item_id = %item_id,
                    order_id = %order_id,
                    reservation_id = %reservation_id,
                    reserved = quantity,
                    quantity = item.quantity(),
                    "stock reserved"
                );
                Ok(Reservation {
                    id: reservation_id,
                    item_id,
                    order_id,
                    quantity,
                })
            }
            Err(EngineError::Domain(DomainError::InsufficientStock {
                requested,
                available,
                shortfall,
            })) => {
                tracing::warn!(
                    item_id = %item_id,
                    order_id = %order_id,
                    requested,
                    available,
                    shortfall,
                    "reservation refused: insufficient stock"
                );
                Err(DomainError::InsufficientStock {
                    requested,
                    available,
                    shortfall,
                }
                .into())
            }
            Err(err) => Err(err),
        }
    }

    /// Return reserved stock. Releasing an already settled reservation is a no-op.
    pub fn release(&self, reservation: &Reservation) -> Result<InventoryItem, EngineError> {
        let item_id = reservation.item_id;
        let reservation_id = reservation.id;
        let item = self.execute(item_id, "release", |occurred_at| {
            InventoryCommand::ReleaseReservation(ReleaseReservation {
                item_id,
                reservation_id,
                occurred_at,
            })
        })?;

        tracing::info!(
            item_id = %item_id,
            reservation_id = %reservation_id,
            quantity = item.quantity(),
            "reservation released"
        );
        Ok(item)
    }

    /// Settle a reservation on delivery; afterwards it can no longer be released.
    pub fn consume(&self, reservation: &Reservation) -> Result<InventoryItem, EngineError> {
        let item_id = reservation.item_id;
        let reservation_id = reservation.id;
        let item = self.execute(item_id, "consume", |occurred_at| {
            InventoryCommand::ConsumeReservation(ConsumeReservation {
                item_id,
                reservation_id,
                occurred_at,
            })
        })?;

        tracing::info!(item_id = %item_id, reservation_id = %reservation_id, "reservation consumed");
        Ok(item)
    }

    pub fn update_details(&self, command: UpdateItemDetails) -> Result<InventoryItem, EngineError> {
        let item_id = command.item_id;
        self.execute(item_id, "update_details", |occurred_at| {
            InventoryCommand::UpdateItemDetails(UpdateItemDetails {
                occurred_at,
                ..command.clone()
            })
        })
    }

    fn execute(
        &self,
        item_id: InventoryItemId,
        op: &'static str,
        command: impl Fn(DateTime<Utc>) -> InventoryCommand,
    ) -> Result<InventoryItem, EngineError> {
        let mut attempt = 0u32;
        loop {
            let cmd = command(self.clock.now());
            match self
                .dispatcher
                .dispatch(item_id.0, ITEM_AGGREGATE_TYPE, &cmd, || InventoryItem::empty(item_id))
            {
                Err(err) if err.is_concurrency() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(item_id = %item_id, op, attempt, "item stream moved, re-deciding");
                    std::thread::yield_now();
                }
                Err(err) if err.is_concurrency() => {
                    tracing::warn!(item_id = %item_id, op, attempts = attempt + 1, "ledger retries exhausted");
                    return Err(err.into_conflict());
                }
                other => return self.settle_unpublished(item_id, op, other),
            }
        }
    }

    /// A publish failure comes after the append, so the item already moved:
    /// report the stored state instead of an error the caller would undo.
    fn settle_unpublished(
        &self,
        item_id: InventoryItemId,
        op: &'static str,
        result: Result<InventoryItem, EngineError>,
    ) -> Result<InventoryItem, EngineError> {
        match result {
            Err(err) if err.is_unpublished() => {
                tracing::error!(item_id = %item_id, op, error = %err, "item event stored but not published");
                self.get_item(item_id)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use supplyline_core::{AggregateRoot, FixedClock};
    use supplyline_events::InMemoryEventBus;
    use supplyline_inventory::WarehouseId;

    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
    type Dispatcher = CommandDispatcher<InMemoryEventStore, Bus>;

    fn clock() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2026, 3, 1)
                .and_then(|d| d.and_hms_opt(9, 0, 0))
                .map(|dt| dt.and_utc())
                .unwrap(),
        )
    }

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()))
    }

    fn seed(ledger: &InventoryLedger<'_, InMemoryEventStore, Bus>, quantity: i64) -> InventoryItemId {
        let item_id = InventoryItemId::new(AggregateId::new());
        ledger
            .create_item(CreateItem {
                item_id,
                warehouse_id: WarehouseId::new(AggregateId::new()),
                name: "Nitrile gloves (M)".to_string(),
                description: "box of 100".to_string(),
                initial_quantity: quantity,
                reorder_threshold: 5,
                expiration_date: None,
                occurred_at: clock().0,
            })
            .unwrap();
        item_id
    }

    #[test]
    fn reserve_takes_stock_and_release_restores_it() {
        let d = dispatcher();
        let clock = clock();
        let ledger = InventoryLedger::new(&d, &clock, 4);
        let item_id = seed(&ledger, 10);

        let reservation = ledger
            .reserve(item_id, 3, AggregateId::new(), ReservationId::generate())
            .unwrap();
        assert_eq!(ledger.get_item(item_id).unwrap().quantity(), 7);

        ledger.release(&reservation).unwrap();
        let item = ledger.release(&reservation).unwrap();
        assert_eq!(item.quantity(), 10);
        assert_eq!(item.version(), 3);
    }

    #[test]
    fn insufficient_stock_leaves_item_untouched() {
        let d = dispatcher();
        let clock = clock();
        let ledger = InventoryLedger::new(&d, &clock, 4);
        let item_id = seed(&ledger, 2);
        let before = ledger.get_item(item_id).unwrap();

        let err = ledger
            .reserve(item_id, 4, AggregateId::new(), ReservationId::generate())
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::Domain(DomainError::InsufficientStock {
                requested: 4,
                available: 2,
                shortfall: 2
            })
        );
        assert_eq!(ledger.get_item(item_id).unwrap(), before);
    }

    #[test]
    fn consumed_reservation_cannot_be_released() {
        let d = dispatcher();
        let clock = clock();
        let ledger = InventoryLedger::new(&d, &clock, 4);
        let item_id = seed(&ledger, 5);

        let reservation = ledger
            .reserve(item_id, 5, AggregateId::new(), ReservationId::generate())
            .unwrap();
        ledger.consume(&reservation).unwrap();
        let item = ledger.release(&reservation).unwrap();

        assert_eq!(item.quantity(), 0);
        assert_eq!(item.reserved_quantity(), 0);
    }

    #[test]
    fn replenish_rejects_non_positive_amounts() {
        let d = dispatcher();
        let clock = clock();
        let ledger = InventoryLedger::new(&d, &clock, 4);
        let item_id = seed(&ledger, 10);

        let err = ledger.replenish(item_id, -5).unwrap_err();
        assert_eq!(err, EngineError::Domain(DomainError::InvalidQuantity(-5)));
        assert_eq!(ledger.get_item(item_id).unwrap().quantity(), 10);

        let item = ledger.replenish(item_id, 15).unwrap();
        assert_eq!(item.quantity(), 25);
        assert_eq!(item.last_updated(), Some(clock.0));
    }

    #[test]
    fn overflowing_replenish_is_refused_and_item_stays_loadable() {
        let d = dispatcher();
        let clock = clock();
        let ledger = InventoryLedger::new(&d, &clock, 4);
        let item_id = seed(&ledger, 10);

        let err = ledger.replenish(item_id, i64::MAX).unwrap_err();
        assert_eq!(err, EngineError::Domain(DomainError::InvalidQuantity(i64::MAX)));

        let item = ledger.get_item(item_id).unwrap();
        assert_eq!(item.quantity(), 10);
        assert_eq!(item.version(), 1);
        assert_eq!(ledger.replenish(item_id, 5).unwrap().quantity(), 15);
    }

    #[test]
    fn unknown_item_is_not_found() {
        let d = dispatcher();
        let clock = clock();
        let ledger = InventoryLedger::new(&d, &clock, 4);
        let missing = InventoryItemId::new(AggregateId::new());

        assert!(matches!(
            ledger.get_item(missing),
            Err(EngineError::Domain(DomainError::NotFound(_)))
        ));
        assert!(matches!(
            ledger.replenish(missing, 1),
            Err(EngineError::Domain(DomainError::NotFound(_)))
        ));
    }
}
