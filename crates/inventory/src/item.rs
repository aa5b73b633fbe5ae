use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use supplyline_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use supplyline_events::Event;

use crate::reservation::{Reservation, ReservationId};
use crate::warehouse::WarehouseId;

/// Default look-ahead for near-expiration alerts.
pub const DEFAULT_EXPIRATION_WINDOW_DAYS: i64 = 30;

/// Inventory item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stock held against one order, inside the item's stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct HeldStock {
    order_id: AggregateId,
    quantity: i64,
}

/// Aggregate root: InventoryItem.
///
/// Invariant: `quantity` never goes below zero. Only quantity-changing events
/// move `last_updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    warehouse_id: Option<WarehouseId>,
    name: String,
    description: String,
    quantity: i64,
    reorder_threshold: i64,
    expiration_date: Option<NaiveDate>,
    last_updated: Option<DateTime<Utc>>,
    version: u64,
    #[serde(skip)]
    held: HashMap<ReservationId, HeldStock>,
    #[serde(skip)]
    settled: HashSet<ReservationId>,
    #[serde(skip)]
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            warehouse_id: None,
            name: String::new(),
            description: String::new(),
            quantity: 0,
            reorder_threshold: 0,
            expiration_date: None,
            last_updated: None,
            version: 0,
            held: HashMap::new(),
            settled: HashSet::new(),
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Quantity on hand (reserved stock already deducted).
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reorder_threshold(&self) -> i64 {
        self.reorder_threshold
    }

    pub fn expiration_date(&self) -> Option<NaiveDate> {
        self.expiration_date
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Stock currently held by open reservations.
    pub fn reserved_quantity(&self) -> i64 {
        self.held.values().map(|h| h.quantity).sum()
    }

    /// The active reservation with this id, if any.
    pub fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.held.get(&id).map(|h| Reservation {
            id,
            item_id: self.id,
            order_id: h.order_id,
            quantity: h.quantity,
        })
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_threshold
    }

    /// Expired strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiration_date.is_some_and(|d| d < today)
    }

    /// Not yet expired, but expiring within `window_days` of `today` (inclusive).
    pub fn is_near_expiration(&self, today: NaiveDate, window_days: i64) -> bool {
        match self.expiration_date {
            Some(d) => d >= today && d <= today + Duration::days(window_days),
            None => false,
        }
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub item_id: InventoryItemId,
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub description: String,
    pub initial_quantity: i64,
    pub reorder_threshold: i64,
    pub expiration_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Replenish (add stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replenish {
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub item_id: InventoryItemId,
    pub reservation_id: ReservationId,
    pub order_id: AggregateId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseReservation (return held stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReservation {
    pub item_id: InventoryItemId,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeReservation (stock left the building for good).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeReservation {
    pub item_id: InventoryItemId,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItemDetails. Descriptive fields only; never touches quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemDetails {
    pub item_id: InventoryItemId,
    pub name: String,
    pub description: String,
    pub reorder_threshold: i64,
    pub expiration_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    Replenish(Replenish),
    ReserveStock(ReserveStock),
    ReleaseReservation(ReleaseReservation),
    ConsumeReservation(ConsumeReservation),
    UpdateItemDetails(UpdateItemDetails),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: InventoryItemId,
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub description: String,
    pub quantity: i64,
    pub reorder_threshold: i64,
    pub expiration_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReplenished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReplenished {
    pub item_id: InventoryItemId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub item_id: InventoryItemId,
    pub reservation_id: ReservationId,
    pub order_id: AggregateId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationReleased (stock returned to on-hand).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReleased {
    pub item_id: InventoryItemId,
    pub reservation_id: ReservationId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationConsumed (delivered; can no longer be released).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationConsumed {
    pub item_id: InventoryItemId,
    pub reservation_id: ReservationId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetailsUpdated {
    pub item_id: InventoryItemId,
    pub name: String,
    pub description: String,
    pub reorder_threshold: i64,
    pub expiration_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    StockReplenished(StockReplenished),
    StockReserved(StockReserved),
    ReservationReleased(ReservationReleased),
    ReservationConsumed(ReservationConsumed),
    ItemDetailsUpdated(ItemDetailsUpdated),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::StockReplenished(_) => "inventory.item.stock_replenished",
            InventoryEvent::StockReserved(_) => "inventory.item.stock_reserved",
            InventoryEvent::ReservationReleased(_) => "inventory.item.reservation_released",
            InventoryEvent::ReservationConsumed(_) => "inventory.item.reservation_consumed",
            InventoryEvent::ItemDetailsUpdated(_) => "inventory.item.details_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::StockReplenished(e) => e.occurred_at,
            InventoryEvent::StockReserved(e) => e.occurred_at,
            InventoryEvent::ReservationReleased(e) => e.occurred_at,
            InventoryEvent::ReservationConsumed(e) => e.occurred_at,
            InventoryEvent::ItemDetailsUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.quantity = e.quantity;
                self.reorder_threshold = e.reorder_threshold;
                self.expiration_date = e.expiration_date;
                self.last_updated = Some(e.occurred_at);
                self.created = true;
            }
            InventoryEvent::StockReplenished(e) => {
                self.quantity += e.quantity;
                self.last_updated = Some(e.occurred_at);
            }
            InventoryEvent::StockReserved(e) => {
                self.quantity -= e.quantity;
                self.held.insert(
                    e.reservation_id,
                    HeldStock {
                        order_id: e.order_id,
                        quantity: e.quantity,
                    },
                );
                self.last_updated = Some(e.occurred_at);
            }
            InventoryEvent::ReservationReleased(e) => {
                self.quantity += e.quantity;
                self.held.remove(&e.reservation_id);
                self.settled.insert(e.reservation_id);
                self.last_updated = Some(e.occurred_at);
            }
            InventoryEvent::ReservationConsumed(e) => {
                self.held.remove(&e.reservation_id);
                self.settled.insert(e.reservation_id);
            }
            InventoryEvent::ItemDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.reorder_threshold = e.reorder_threshold;
                self.expiration_date = e.expiration_date;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::Replenish(cmd) => self.handle_replenish(cmd),
            InventoryCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            InventoryCommand::ReleaseReservation(cmd) => self.handle_release(cmd),
            InventoryCommand::ConsumeReservation(cmd) => self.handle_consume(cmd),
            InventoryCommand::UpdateItemDetails(cmd) => self.handle_update_details(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_exists(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("inventory item {item_id}")));
        }
        if self.id != item_id {
            return Err(DomainError::invalid_id("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::invalid_payload("name cannot be empty"));
        }
        if cmd.initial_quantity < 0 {
            return Err(DomainError::InvalidQuantity(cmd.initial_quantity));
        }
        if cmd.reorder_threshold < 0 {
            return Err(DomainError::invalid_payload(
                "reorder_threshold cannot be negative",
            ));
        }

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            item_id: cmd.item_id,
            warehouse_id: cmd.warehouse_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            quantity: cmd.initial_quantity,
            reorder_threshold: cmd.reorder_threshold,
            expiration_date: cmd.expiration_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_replenish(&self, cmd: &Replenish) -> Result<Vec<InventoryEvent>, DomainError> {
        if cmd.quantity <= 0 {
            return Err(DomainError::InvalidQuantity(cmd.quantity));
        }
        self.ensure_exists(cmd.item_id)?;

        // On-hand plus held stock must stay representable so releases cannot overflow either.
        let total = self
            .quantity
            .checked_add(self.reserved_quantity())
            .and_then(|t| t.checked_add(cmd.quantity));
        if total.is_none() {
            return Err(DomainError::InvalidQuantity(cmd.quantity));
        }

        Ok(vec![InventoryEvent::StockReplenished(StockReplenished {
            item_id: cmd.item_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<InventoryEvent>, DomainError> {
        if cmd.quantity <= 0 {
            return Err(DomainError::InvalidQuantity(cmd.quantity));
        }
        self.ensure_exists(cmd.item_id)?;

        if self.held.contains_key(&cmd.reservation_id) || self.settled.contains(&cmd.reservation_id)
        {
            return Err(DomainError::conflict(format!(
                "reservation {} already recorded",
                cmd.reservation_id
            )));
        }

        // Fail closed: no partial reservations.
        if self.quantity < cmd.quantity {
            return Err(DomainError::insufficient_stock(cmd.quantity, self.quantity));
        }

        Ok(vec![InventoryEvent::StockReserved(StockReserved {
            item_id: cmd.item_id,
            reservation_id: cmd.reservation_id,
            order_id: cmd.order_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(
        &self,
        cmd: &ReleaseReservation,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(cmd.item_id)?;

        match self.held.get(&cmd.reservation_id) {
            Some(held) => Ok(vec![InventoryEvent::ReservationReleased(ReservationReleased {
                item_id: cmd.item_id,
                reservation_id: cmd.reservation_id,
                quantity: held.quantity,
                occurred_at: cmd.occurred_at,
            })]),
            // Already released or consumed: idempotent no-op.
            None if self.settled.contains(&cmd.reservation_id) => Ok(vec![]),
            None => Err(DomainError::not_found(format!(
                "reservation {}",
                cmd.reservation_id
            ))),
        }
    }

    fn handle_consume(
        &self,
        cmd: &ConsumeReservation,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(cmd.item_id)?;

        match self.held.get(&cmd.reservation_id) {
            Some(held) => Ok(vec![InventoryEvent::ReservationConsumed(ReservationConsumed {
                item_id: cmd.item_id,
                reservation_id: cmd.reservation_id,
                quantity: held.quantity,
                occurred_at: cmd.occurred_at,
            })]),
            None if self.settled.contains(&cmd.reservation_id) => Ok(vec![]),
            None => Err(DomainError::not_found(format!(
                "reservation {}",
                cmd.reservation_id
            ))),
        }
    }

    fn handle_update_details(
        &self,
        cmd: &UpdateItemDetails,
    ) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_exists(cmd.item_id)?;

        if cmd.name.trim().is_empty() {
            return Err(DomainError::invalid_payload("name cannot be empty"));
        }
        if cmd.reorder_threshold < 0 {
            return Err(DomainError::invalid_payload(
                "reorder_threshold cannot be negative",
            ));
        }

        Ok(vec![InventoryEvent::ItemDetailsUpdated(ItemDetailsUpdated {
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            reorder_threshold: cmd.reorder_threshold,
            expiration_date: cmd.expiration_date,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_item_id() -> InventoryItemId {
        InventoryItemId::new(AggregateId::new())
    }

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn execute(item: &mut InventoryItem, cmd: InventoryCommand) -> Result<Vec<InventoryEvent>, DomainError> {
        let events = item.handle(&cmd)?;
        for e in &events {
            item.apply(e);
        }
        Ok(events)
    }

    fn stocked_item(quantity: i64, reorder_threshold: i64) -> InventoryItem {
        let item_id = test_item_id();
        let mut item = InventoryItem::empty(item_id);
        execute(
            &mut item,
            InventoryCommand::CreateItem(CreateItem {
                item_id,
                warehouse_id: test_warehouse_id(),
                name: "Nitrile gloves".to_string(),
                description: "Box of 100".to_string(),
                initial_quantity: quantity,
                reorder_threshold,
                expiration_date: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        item
    }

    fn reserve_cmd(item_id: InventoryItemId, quantity: i64) -> (ReservationId, InventoryCommand) {
        let reservation_id = ReservationId::generate();
        (
            reservation_id,
            InventoryCommand::ReserveStock(ReserveStock {
                item_id,
                reservation_id,
                order_id: AggregateId::new(),
                quantity,
                occurred_at: test_time(),
            }),
        )
    }

    fn release_cmd(item_id: InventoryItemId, reservation_id: ReservationId) -> InventoryCommand {
        InventoryCommand::ReleaseReservation(ReleaseReservation {
            item_id,
            reservation_id,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_rejects_empty_name() {
        let item_id = test_item_id();
        let item = InventoryItem::empty(item_id);
        let err = item
            .handle(&InventoryCommand::CreateItem(CreateItem {
                item_id,
                warehouse_id: test_warehouse_id(),
                name: "   ".to_string(),
                description: String::new(),
                initial_quantity: 0,
                reorder_threshold: 0,
                expiration_date: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload(_)));
    }

    #[test]
    fn replenish_increments_quantity() {
        let mut item = stocked_item(10, 5);
        let item_id = item.id_typed();
        execute(
            &mut item,
            InventoryCommand::Replenish(Replenish {
                item_id,
                quantity: 5,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(item.quantity(), 15);
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn replenish_with_negative_quantity_is_rejected_and_leaves_quantity() {
        let mut item = stocked_item(10, 5);
        let item_id = item.id_typed();
        let err = execute(
            &mut item,
            InventoryCommand::Replenish(Replenish {
                item_id,
                quantity: -5,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::InvalidQuantity(-5));
        assert_eq!(item.quantity(), 10);
    }

    #[test]
    fn replenish_that_would_overflow_is_rejected() {
        let mut item = stocked_item(10, 5);
        let item_id = item.id_typed();
        let (_, cmd) = reserve_cmd(item_id, 4);
        execute(&mut item, cmd).unwrap();

        let err = execute(
            &mut item,
            InventoryCommand::Replenish(Replenish {
                item_id,
                quantity: i64::MAX,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::InvalidQuantity(i64::MAX));
        assert_eq!(item.quantity(), 6);
        assert_eq!(item.version(), 2);

        // The largest amount that still fits is accepted.
        execute(
            &mut item,
            InventoryCommand::Replenish(Replenish {
                item_id,
                quantity: i64::MAX - 10,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(item.quantity() + item.reserved_quantity(), i64::MAX);
    }

    #[test]
    fn replenish_on_missing_item_is_not_found() {
        let item_id = test_item_id();
        let item = InventoryItem::empty(item_id);
        let err = item
            .handle(&InventoryCommand::Replenish(Replenish {
                item_id,
                quantity: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn reserve_decrements_and_records_hold() {
        let mut item = stocked_item(10, 5);
        let item_id = item.id_typed();
        let (reservation_id, cmd) = reserve_cmd(item.id_typed(), 3);
        execute(&mut item, cmd).unwrap();

        assert_eq!(item.quantity(), 7);
        assert_eq!(item.reserved_quantity(), 3);
        assert_eq!(item.reservation(reservation_id).map(|r| r.quantity), Some(3));
        assert!(!item.is_low_stock());
    }

    #[test]
    fn reserve_beyond_stock_reports_shortfall_and_changes_nothing() {
        let mut item = stocked_item(2, 0);
        let item_id = item.id_typed();
        let (_, cmd) = reserve_cmd(item.id_typed(), 4);
        let err = execute(&mut item, cmd).unwrap_err();

        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: 4,
                available: 2,
                shortfall: 2
            }
        );
        assert_eq!(item.quantity(), 2);
        assert_eq!(item.version(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let mut item = stocked_item(10, 5);
        let item_id = item.id_typed();
        let (reservation_id, cmd) = reserve_cmd(item.id_typed(), 4);
        execute(&mut item, cmd).unwrap();

        let first = execute(&mut item, release_cmd(item_id, reservation_id)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(item.quantity(), 10);

        let second = execute(&mut item, release_cmd(item_id, reservation_id)).unwrap();
        assert!(second.is_empty());
        assert_eq!(item.quantity(), 10);
    }

    #[test]
    fn consumed_reservation_cannot_be_released() {
        let mut item = stocked_item(10, 5);
        let item_id = item.id_typed();
        let (reservation_id, cmd) = reserve_cmd(item.id_typed(), 4);
        execute(&mut item, cmd).unwrap();
        execute(
            &mut item,
            InventoryCommand::ConsumeReservation(ConsumeReservation {
                item_id,
                reservation_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let events = execute(&mut item, release_cmd(item_id, reservation_id)).unwrap();
        assert!(events.is_empty());
        assert_eq!(item.quantity(), 6);
        assert_eq!(item.reserved_quantity(), 0);
    }

    #[test]
    fn releasing_unknown_reservation_is_not_found() {
        let item = stocked_item(10, 5);
        let err = item
            .handle(&release_cmd(item.id_typed(), ReservationId::generate()))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn details_update_does_not_touch_last_updated() {
        let mut item = stocked_item(10, 5);
        let item_id = item.id_typed();
        let before = item.last_updated();
        execute(
            &mut item,
            InventoryCommand::UpdateItemDetails(UpdateItemDetails {
                item_id,
                name: "Gloves (L)".to_string(),
                description: String::new(),
                reorder_threshold: 20,
                expiration_date: Some(date(2030, 1, 1)),
                occurred_at: test_time() + Duration::hours(1),
            }),
        )
        .unwrap();
        assert_eq!(item.last_updated(), before);
        assert_eq!(item.name(), "Gloves (L)");
        assert!(item.is_low_stock());
    }

    #[test]
    fn low_stock_is_inclusive_of_threshold() {
        assert!(stocked_item(5, 5).is_low_stock());
        assert!(!stocked_item(6, 5).is_low_stock());
    }

    #[test]
    fn expiration_predicates() {
        let today = date(2026, 3, 1);
        let mut item = stocked_item(1, 0);
        let item_id = item.id_typed();
        item.expiration_date = Some(date(2026, 2, 28));
        assert!(item.is_expired(today));
        assert!(!item.is_near_expiration(today, 30));

        item.expiration_date = Some(date(2026, 3, 31));
        assert!(!item.is_expired(today));
        assert!(item.is_near_expiration(today, 30));

        item.expiration_date = Some(date(2026, 4, 1));
        assert!(!item.is_near_expiration(today, 30));

        item.expiration_date = None;
        assert!(!item.is_expired(today) && !item.is_near_expiration(today, 30));
    }

    #[test]
    fn events_round_trip_through_json() {
        let mut item = stocked_item(3, 1);
        let item_id = item.id_typed();
        let (_, cmd) = reserve_cmd(item.id_typed(), 1);
        let events = execute(&mut item, cmd).unwrap();
        let json = serde_json::to_value(&events[0]).unwrap();
        let back: InventoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, events[0]);
        assert_eq!(back.event_type(), "inventory.item.stock_reserved");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Replenish(i64),
        Reserve(i64),
        ReleaseOldest,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-5i64..20).prop_map(Op::Replenish),
            (-2i64..15).prop_map(Op::Reserve),
            Just(Op::ReleaseOldest),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of stock commands drives quantity negative, and
        /// on-hand plus held stock always equals everything ever added.
        #[test]
        fn quantity_never_negative(
            initial in 0i64..20,
            ops in prop::collection::vec(op_strategy(), 1..40)
        ) {
            let mut item = stocked_item(initial, 0);
            let item_id = item.id_typed();
            let mut added = initial;
            let mut open: Vec<ReservationId> = Vec::new();

            for op in ops {
                match op {
                    Op::Replenish(q) => {
                        let cmd = InventoryCommand::Replenish(Replenish {
                            item_id,
                            quantity: q,
                            occurred_at: test_time(),
                        });
                        if execute(&mut item, cmd).is_ok() {
                            added += q;
                        }
                    }
                    Op::Reserve(q) => {
                        let (id, cmd) = reserve_cmd(item_id, q);
                        if execute(&mut item, cmd).is_ok() {
                            open.push(id);
                        }
                    }
                    Op::ReleaseOldest => {
                        if !open.is_empty() {
                            let id = open.remove(0);
                            execute(&mut item, release_cmd(item_id, id)).unwrap();
                        }
                    }
                }

                prop_assert!(item.quantity() >= 0);
                prop_assert_eq!(item.quantity() + item.reserved_quantity(), added);
            }
        }
    }
}
