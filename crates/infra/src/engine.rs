//! `FulfillmentEngine`: the single entry point for every supply-chain operation.
//!
//! The engine loads aggregates through the `CommandDispatcher`, lets them
//! decide, and commits the result. Cross-aggregate effects are sequenced here:
//!
//! - **accept**: decide the order transition, reserve stock on the item
//!   stream, then append the order events. If that last append loses a race
//!   the reservation is released before the conflict is returned.
//! - **cancel**: append the cancellation, then release any held reservation
//!   (release is idempotent and retried on version races).
//! - **deliver**: append the delivery, then consume the reservation.
//!
//! A terminal order remembers the reservation it settled. If the ledger step
//! fails after the order was stored, issuing the same cancel or deliver again
//! finishes it. Events that were stored but could not be broadcast count as
//! committed: the failure is logged and the stored state is returned.
//!
//! Every call takes an explicit `Actor`; the engine never reads ambient identity.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use supplyline_auth::{Actor, Permission, Role, authorize};
use supplyline_core::{
    Aggregate, AggregateId, AggregateRoot, Clock, DomainError, ExpectedVersion, SystemClock,
    UserId,
};
use supplyline_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use supplyline_inventory::{
    CreateItem, CreateWarehouse, InventoryCommand, InventoryItem, InventoryItemId, RegisterItem,
    RemoveWarehouse, Reservation, ReservationId, UpdateItemDetails, Warehouse, WarehouseCommand,
    WarehouseId,
};
use supplyline_orders::{
    AcceptOrder, ApproveOrder, AttachFeedback, CancelOrder, DeliverOrder, Order, OrderCommand,
    OrderEvent, OrderId, OrderStatus, PlaceOrder, ShipOrder,
};
use supplyline_procurement::{
    ChangeRequestStatus, CreateProcurementRequest, MarkRequestOrdered, ProcurementCommand,
    ProcurementRequest, ProcurementRequestId, ProcurementStatus,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::config::EngineConfig;
use crate::directory::{ActorDirectory, InMemoryActorDirectory};
use crate::error::EngineError;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::ledger::InventoryLedger;
use crate::projections::dashboard::{self, Dashboard};

pub const WAREHOUSE_AGGREGATE_TYPE: &str = "inventory.warehouse";
pub const REQUEST_AGGREGATE_TYPE: &str = "procurement.request";
pub const ORDER_AGGREGATE_TYPE: &str = "orders.order";

pub type JsonEventBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

/// Input for `create_item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub description: String,
    pub initial_quantity: i64,
    pub reorder_threshold: i64,
    pub expiration_date: Option<NaiveDate>,
}

/// Input for `update_item`. Quantity is only changed through the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetails {
    pub name: String,
    pub description: String,
    pub reorder_threshold: i64,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InventoryFilter {
    #[default]
    All,
    LowStock,
    NearExpiration,
    Expired,
    Warehouse(WarehouseId),
}

/// Conjunctive order filter; `None` fields match everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub item_id: Option<InventoryItemId>,
    pub requester_id: Option<UserId>,
    pub supplier_id: Option<UserId>,
    pub warehouse_id: Option<WarehouseId>,
}

impl OrderFilter {
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_item(mut self, item_id: InventoryItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn with_requester(mut self, requester_id: UserId) -> Self {
        self.requester_id = Some(requester_id);
        self
    }

    pub fn with_supplier(mut self, supplier_id: UserId) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn with_warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| order.status() == s)
            && self.item_id.is_none_or(|i| order.item_id() == Some(i))
            && self.requester_id.is_none_or(|r| order.requester_id() == Some(r))
            && self.supplier_id.is_none_or(|s| order.supplier_id() == Some(s))
            && self.warehouse_id.is_none_or(|w| order.warehouse_id() == Some(w))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcurementFilter {
    pub status: Option<ProcurementStatus>,
    pub item_id: Option<InventoryItemId>,
}

impl ProcurementFilter {
    pub fn with_status(mut self, status: ProcurementStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_item(mut self, item_id: InventoryItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn matches(&self, request: &ProcurementRequest) -> bool {
        self.status.is_none_or(|s| request.status() == s)
            && self.item_id.is_none_or(|i| request.item_id() == Some(i))
    }
}

/// Order fulfillment and inventory reservation engine.
///
/// Synchronous and thread-safe: share it by reference (or `Arc`) across
/// threads. Consistency comes from per-stream optimistic concurrency in the
/// event store, not from engine-level locks.
pub struct FulfillmentEngine<S = InMemoryEventStore, B = Arc<JsonEventBus>, D = InMemoryActorDirectory> {
    dispatcher: CommandDispatcher<S, B>,
    directory: D,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl FulfillmentEngine {
    /// Engine over in-memory store, bus and directory.
    pub fn in_memory(clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self::new(
            InMemoryEventStore::new(),
            Arc::new(InMemoryEventBus::new()),
            InMemoryActorDirectory::new(),
            clock,
            config,
        )
    }
}

impl Default for FulfillmentEngine {
    fn default() -> Self {
        Self::in_memory(Arc::new(SystemClock), EngineConfig::default())
    }
}

impl<S, B, D> FulfillmentEngine<S, B, D> {
    pub fn new(store: S, bus: B, directory: D, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            directory,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }
}

impl<S, B, D> FulfillmentEngine<S, B, D>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    D: ActorDirectory,
{
    pub fn ledger(&self) -> InventoryLedger<'_, S, B> {
        InventoryLedger::new(&self.dispatcher, self.clock.as_ref(), self.config.max_concurrency_retries)
    }

    /// Receive every event committed from now on.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    // ---------------------------------------------------------------------
    // Directory
    // ---------------------------------------------------------------------

    pub fn register_actor(&self, by: &Actor, actor: Actor) -> Result<(), EngineError> {
        authorize(by, &Permission::DIRECTORY_MANAGE)?;
        self.directory.register(actor);
        tracing::info!(user_id = %actor.id, role = %actor.role, "actor registered");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Warehouses
    // ---------------------------------------------------------------------

    pub fn create_warehouse(
        &self,
        actor: &Actor,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Result<Warehouse, EngineError> {
        authorize(actor, &Permission::WAREHOUSE_MANAGE)?;

        let warehouse_id = WarehouseId::new(AggregateId::new());
        let warehouse = self.run(
            warehouse_id.0,
            WAREHOUSE_AGGREGATE_TYPE,
            &WarehouseCommand::CreateWarehouse(CreateWarehouse {
                warehouse_id,
                name: name.into(),
                location: location.into(),
                occurred_at: self.clock.now(),
            }),
            || Warehouse::empty(warehouse_id),
        )?;

        tracing::info!(warehouse_id = %warehouse_id, name = warehouse.name(), "warehouse created");
        Ok(warehouse)
    }

    /// Remove a warehouse. Refused while any of its items still holds stock.
    ///
    /// Items are registered on the warehouse stream before they are created,
    /// and the removal is appended against the version the count was taken
    /// at. A registration racing the removal makes one of the two fail.
    /// A registered item whose stream does not exist yet counts as stocked.
    pub fn delete_warehouse(&self, actor: &Actor, warehouse_id: WarehouseId) -> Result<Warehouse, EngineError> {
        authorize(actor, &Permission::WAREHOUSE_MANAGE)?;

        let mut warehouse: Warehouse = self
            .dispatcher
            .load(warehouse_id.0, || Warehouse::empty(warehouse_id))?;

        let ledger = self.ledger();
        let mut stocked_items = 0;
        for item_id in warehouse.items() {
            match ledger.get_item(*item_id) {
                Ok(item) if item.quantity() == 0 && item.reserved_quantity() == 0 => {}
                Ok(_) => stocked_items += 1,
                Err(EngineError::Domain(DomainError::NotFound(_))) => stocked_items += 1,
                Err(err) => return Err(err),
            }
        }

        let events = warehouse
            .handle(&WarehouseCommand::RemoveWarehouse(RemoveWarehouse {
                warehouse_id,
                stocked_items,
                occurred_at: self.clock.now(),
            }))
            .map_err(EngineError::from)
            .and_then(|events| {
                self.commit_settled::<Warehouse>(
                    warehouse_id.0,
                    WAREHOUSE_AGGREGATE_TYPE,
                    ExpectedVersion::Exact(warehouse.version()),
                    &events,
                )?;
                Ok(events)
            })
            .inspect_err(|err| {
                tracing::warn!(warehouse_id = %warehouse_id, stocked_items, error = %err, "warehouse deletion refused");
            })?;
        for e in &events {
            warehouse.apply(e);
        }

        tracing::info!(warehouse_id = %warehouse_id, "warehouse deleted");
        Ok(warehouse)
    }

    pub fn get_warehouse(&self, warehouse_id: WarehouseId) -> Result<Warehouse, EngineError> {
        let warehouse: Warehouse = self
            .dispatcher
            .load(warehouse_id.0, || Warehouse::empty(warehouse_id))?;
        if !warehouse.is_active() {
            return Err(DomainError::not_found(format!("warehouse {warehouse_id}")).into());
        }
        Ok(warehouse)
    }

    /// Active (not deleted) warehouses.
    pub fn list_warehouses(&self) -> Result<Vec<Warehouse>, EngineError> {
        let all = self
            .dispatcher
            .load_all(WAREHOUSE_AGGREGATE_TYPE, |id| Warehouse::empty(WarehouseId::new(id)))?;
        Ok(all.into_iter().filter(Warehouse::is_active).collect())
    }

    // ---------------------------------------------------------------------
    // Inventory
    // ---------------------------------------------------------------------

    pub fn create_item(&self, actor: &Actor, new: NewItem) -> Result<InventoryItem, EngineError> {
        authorize(actor, &Permission::INVENTORY_MANAGE)?;

        let item_id = InventoryItemId::new(AggregateId::new());
        let command = CreateItem {
            item_id,
            warehouse_id: new.warehouse_id,
            name: new.name,
            description: new.description,
            initial_quantity: new.initial_quantity,
            reorder_threshold: new.reorder_threshold,
            expiration_date: new.expiration_date,
            occurred_at: self.clock.now(),
        };
        // Validate first so a rejected payload leaves no registration behind.
        InventoryItem::empty(item_id).handle(&InventoryCommand::CreateItem(command.clone()))?;

        self.run(
            new.warehouse_id.0,
            WAREHOUSE_AGGREGATE_TYPE,
            &WarehouseCommand::RegisterItem(RegisterItem {
                warehouse_id: new.warehouse_id,
                item_id,
                occurred_at: command.occurred_at,
            }),
            || Warehouse::empty(new.warehouse_id),
        )?;

        self.ledger().create_item(command)
    }

    /// Change descriptive fields. Does not touch quantity or `last_updated`.
    pub fn update_item(
        &self,
        actor: &Actor,
        item_id: InventoryItemId,
        details: ItemDetails,
    ) -> Result<InventoryItem, EngineError> {
        authorize(actor, &Permission::INVENTORY_MANAGE)?;

        self.ledger().update_details(UpdateItemDetails {
            item_id,
            name: details.name,
            description: details.description,
            reorder_threshold: details.reorder_threshold,
            expiration_date: details.expiration_date,
            occurred_at: self.clock.now(),
        })
    }

    pub fn get_item(&self, item_id: InventoryItemId) -> Result<InventoryItem, EngineError> {
        self.ledger().get_item(item_id)
    }

    pub fn replenish(
        &self,
        actor: &Actor,
        item_id: InventoryItemId,
        quantity: i64,
    ) -> Result<InventoryItem, EngineError> {
        authorize(actor, &Permission::INVENTORY_MANAGE)?;
        self.ledger().replenish(item_id, quantity)
    }

    pub fn list_inventory(&self, filter: InventoryFilter) -> Result<Vec<InventoryItem>, EngineError> {
        let today = self.clock.today();
        let window = self.config.expiration_window_days;

        let items = self.ledger().list_items()?;
        Ok(items
            .into_iter()
            .filter(|item| match filter {
                InventoryFilter::All => true,
                InventoryFilter::LowStock => item.is_low_stock(),
                InventoryFilter::NearExpiration => item.is_near_expiration(today, window),
                InventoryFilter::Expired => item.is_expired(today),
                InventoryFilter::Warehouse(w) => item.warehouse_id() == Some(w),
            })
            .collect())
    }

    // ---------------------------------------------------------------------
    // Procurement requests
    // ---------------------------------------------------------------------

    pub fn create_procurement_request(
        &self,
        actor: &Actor,
        item_id: InventoryItemId,
        requested_quantity: i64,
    ) -> Result<ProcurementRequest, EngineError> {
        authorize(actor, &Permission::PROCUREMENT_REQUEST)?;
        self.get_item(item_id)?;

        let request_id = ProcurementRequestId::new(AggregateId::new());
        let request = self.run(
            request_id.0,
            REQUEST_AGGREGATE_TYPE,
            &ProcurementCommand::Create(CreateProcurementRequest {
                request_id,
                item_id,
                requested_quantity,
                requester: *actor,
                occurred_at: self.clock.now(),
            }),
            || ProcurementRequest::empty(request_id),
        )?;

        tracing::info!(
            request_id = %request_id,
            item_id = %item_id,
            requested_quantity,
            requester_id = %actor.id,
            "procurement request created"
        );
        Ok(request)
    }

    pub fn set_procurement_status(
        &self,
        actor: &Actor,
        request_id: ProcurementRequestId,
        new_status: ProcurementStatus,
    ) -> Result<ProcurementRequest, EngineError> {
        let request = self.run(
            request_id.0,
            REQUEST_AGGREGATE_TYPE,
            &ProcurementCommand::ChangeStatus(ChangeRequestStatus {
                request_id,
                new_status,
                actor: *actor,
                occurred_at: self.clock.now(),
            }),
            || ProcurementRequest::empty(request_id),
        )?;

        tracing::info!(request_id = %request_id, status = %request.status(), actor_id = %actor.id, "procurement request reviewed");
        Ok(request)
    }

    /// Turn an approved request into a placed order and link the two.
    ///
    /// The request is marked `ordered` first under its version guard, so two
    /// concurrent calls cannot both create an order for it.
    pub fn place_order_for_request(
        &self,
        actor: &Actor,
        request_id: ProcurementRequestId,
    ) -> Result<Order, EngineError> {
        authorize(actor, &Permission::PROCUREMENT_ORDER)?;

        let request = self.get_procurement_request(request_id)?;
        let order_id = OrderId::new(AggregateId::new());
        let now = self.clock.now();

        let request_events = request.handle(&ProcurementCommand::MarkOrdered(MarkRequestOrdered {
            request_id,
            order_id: order_id.0,
            occurred_at: now,
        }))?;

        let item_id = request
            .item_id()
            .ok_or_else(|| DomainError::not_found(format!("item of procurement request {request_id}")))?;
        let order = Order::empty(order_id);
        let order_events = order.handle(&OrderCommand::Place(PlaceOrder {
            order_id,
            item_id,
            quantity_ordered: request.requested_quantity(),
            actor: *actor,
            procurement_request_id: Some(request_id),
            occurred_at: now,
        }))?;

        self.commit_settled::<ProcurementRequest>(
            request_id.0,
            REQUEST_AGGREGATE_TYPE,
            ExpectedVersion::Exact(request.version()),
            &request_events,
        )?;

        let order = self.commit_order(order, order_events).inspect_err(|err| {
            tracing::error!(request_id = %request_id, order_id = %order_id, error = %err, "request marked ordered but order was not stored");
        })?;

        tracing::info!(request_id = %request_id, order_id = %order_id, "order placed for procurement request");
        Ok(order)
    }

    pub fn get_procurement_request(&self, request_id: ProcurementRequestId) -> Result<ProcurementRequest, EngineError> {
        let request: ProcurementRequest = self
            .dispatcher
            .load(request_id.0, || ProcurementRequest::empty(request_id))?;
        if !request.exists() {
            return Err(DomainError::not_found(format!("procurement request {request_id}")).into());
        }
        Ok(request)
    }

    pub fn list_procurement_requests(
        &self,
        filter: ProcurementFilter,
    ) -> Result<Vec<ProcurementRequest>, EngineError> {
        let all = self.dispatcher.load_all(REQUEST_AGGREGATE_TYPE, |id| {
            ProcurementRequest::empty(ProcurementRequestId::new(id))
        })?;
        Ok(all.into_iter().filter(|r| filter.matches(r)).collect())
    }

    // ---------------------------------------------------------------------
    // Orders
    // ---------------------------------------------------------------------

    /// Place a new order against an existing item.
    pub fn place_order(
        &self,
        actor: &Actor,
        item_id: InventoryItemId,
        quantity_ordered: i64,
    ) -> Result<Order, EngineError> {
        self.get_item(item_id)?;

        let order_id = OrderId::new(AggregateId::new());
        let order = Order::empty(order_id);
        let events = order.handle(&OrderCommand::Place(PlaceOrder {
            order_id,
            item_id,
            quantity_ordered,
            actor: *actor,
            procurement_request_id: None,
            occurred_at: self.clock.now(),
        }))?;

        let order = self.commit_order(order, events)?;
        tracing::info!(
            order_id = %order_id,
            item_id = %item_id,
            quantity_ordered,
            requester_id = %actor.id,
            actor_role = %actor.role,
            "order placed"
        );
        Ok(order)
    }

    /// Assign a registered supplier and an active warehouse.
    pub fn approve_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        supplier_id: Option<UserId>,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Order, EngineError> {
        let (order, events) = self.decide_order(
            order_id,
            OrderCommand::Approve(ApproveOrder {
                order_id,
                actor: *actor,
                supplier_id,
                warehouse_id,
                occurred_at: self.clock.now(),
            }),
        )?;

        // The aggregate has already rejected missing ids.
        if let Some(supplier_id) = supplier_id {
            match self.directory.get(supplier_id) {
                None => return Err(DomainError::not_found(format!("supplier {supplier_id}")).into()),
                Some(found) if found.role != Role::Supplier => {
                    return Err(DomainError::invalid_payload(format!(
                        "user {supplier_id} is a {} actor, not a supplier",
                        found.role
                    ))
                    .into());
                }
                Some(_) => {}
            }
        }
        if let Some(warehouse_id) = warehouse_id {
            self.get_warehouse(warehouse_id)?;
        }

        let order = self.commit_order(order, events)?;
        tracing::info!(
            order_id = %order_id,
            supplier_id = ?order.supplier_id().map(|s| s.to_string()),
            warehouse_id = ?order.warehouse_id().map(|w| w.to_string()),
            "order approved"
        );
        Ok(order)
    }

    /// Assigned supplier accepts; stock is reserved for the order.
    ///
    /// `InsufficientStock` leaves the order `approved` and the ledger untouched.
    pub fn accept_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        estimated_delivery: Option<NaiveDate>,
    ) -> Result<Order, EngineError> {
        let reservation_id = ReservationId::generate();
        let (order, events) = self.decide_order(
            order_id,
            OrderCommand::Accept(AcceptOrder {
                order_id,
                actor: *actor,
                estimated_delivery,
                reservation_id,
                occurred_at: self.clock.now(),
            }),
        )?;

        let item_id = order
            .item_id()
            .ok_or_else(|| DomainError::not_found(format!("item of order {order_id}")))?;
        let reservation = self
            .ledger()
            .reserve(item_id, order.quantity_ordered(), order_id.0, reservation_id)
            .inspect_err(|err| {
                tracing::warn!(order_id = %order_id, error = %err, "order acceptance aborted");
            })?;

        match self.commit_order(order, events) {
            Ok(order) => {
                tracing::info!(
                    order_id = %order_id,
                    reservation_id = %reservation_id,
                    estimated_delivery = ?order.estimated_delivery(),
                    "order accepted"
                );
                Ok(order)
            }
            Err(err) => {
                // Undo the reservation so a lost race leaves no stock held.
                if let Err(release_err) = self.ledger().release(&reservation) {
                    tracing::error!(
                        order_id = %order_id,
                        reservation_id = %reservation_id,
                        error = %release_err,
                        "failed to release reservation after rejected acceptance"
                    );
                }
                Err(err)
            }
        }
    }

    pub fn ship_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order, EngineError> {
        let order = self.transition(
            order_id,
            OrderCommand::Ship(ShipOrder {
                order_id,
                actor: *actor,
                occurred_at: self.clock.now(),
            }),
        )?;
        tracing::info!(order_id = %order_id, actor_role = %actor.role, "order shipped");
        Ok(order)
    }

    /// Mark delivered and settle the reservation.
    ///
    /// Delivering an order that is already delivered but whose reservation is
    /// still held consumes it instead of failing the transition.
    pub fn deliver_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order, EngineError> {
        let order = self.load_order(order_id)?;
        if let Some(reservation) = self.unsettled_reservation(&order, OrderStatus::Delivered)? {
            if actor.role != Role::Warehouse {
                return Err(DomainError::illegal_transition(format!(
                    "{} actor cannot deliver order {order_id}",
                    actor.role
                ))
                .into());
            }
            self.ledger().consume(&reservation)?;
            tracing::info!(order_id = %order_id, reservation_id = %reservation.id, "delivered order settled");
            return Ok(order);
        }

        let (order, events) = self.decide(
            order,
            OrderCommand::Deliver(DeliverOrder {
                order_id,
                actor: *actor,
                occurred_at: self.clock.now(),
            }),
        )?;
        let order = self.commit_order(order, events)?;

        if let Some(reservation) = self.reservation_of(&order, order.settled_reservation()) {
            self.ledger().consume(&reservation).inspect_err(|err| {
                tracing::error!(
                    order_id = %order_id,
                    reservation_id = %reservation.id,
                    error = %err,
                    "order delivered but reservation not consumed; deliver again to settle"
                );
            })?;
        }
        tracing::info!(order_id = %order_id, "order delivered");
        Ok(order)
    }

    /// Cancel from any non-terminal state; held stock goes back to the ledger.
    pub fn cancel_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Order, EngineError> {
        let order = self.load_order(order_id)?;
        // Only stock-holding orders release anything, and only procurement cancels those.
        if let Some(reservation) = self.unsettled_reservation(&order, OrderStatus::Canceled)? {
            if actor.role != Role::Procurement {
                return Err(DomainError::illegal_transition(format!(
                    "{} actor cannot cancel order {order_id}",
                    actor.role
                ))
                .into());
            }
            self.ledger().release(&reservation)?;
            tracing::info!(order_id = %order_id, reservation_id = %reservation.id, "canceled order settled");
            return Ok(order);
        }

        let (order, events) = self.decide(
            order,
            OrderCommand::Cancel(CancelOrder {
                order_id,
                actor: *actor,
                reason,
                occurred_at: self.clock.now(),
            }),
        )?;
        let order = self.commit_order(order, events)?;

        let reservation = self.reservation_of(&order, order.settled_reservation());
        if let Some(reservation) = &reservation {
            self.ledger().release(reservation).inspect_err(|err| {
                tracing::error!(
                    order_id = %order_id,
                    reservation_id = %reservation.id,
                    error = %err,
                    "order canceled but reservation still held; cancel again to release"
                );
            })?;
        }

        tracing::info!(order_id = %order_id, released = reservation.is_some(), "order canceled");
        Ok(order)
    }

    pub fn attach_feedback(
        &self,
        actor: &Actor,
        order_id: OrderId,
        message: impl Into<String>,
    ) -> Result<Order, EngineError> {
        let order = self.transition(
            order_id,
            OrderCommand::AttachFeedback(AttachFeedback {
                order_id,
                actor: *actor,
                message: message.into(),
                occurred_at: self.clock.now(),
            }),
        )?;
        tracing::info!(order_id = %order_id, author_id = %actor.id, "feedback attached");
        Ok(order)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order, EngineError> {
        let order = self.load_order(order_id)?;
        if !order.exists() {
            return Err(DomainError::not_found(format!("order {order_id}")).into());
        }
        Ok(order)
    }

    pub fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, EngineError> {
        let all = self
            .dispatcher
            .load_all(ORDER_AGGREGATE_TYPE, |id| Order::empty(OrderId::new(id)))?;
        Ok(all.into_iter().filter(|o| filter.matches(o)).collect())
    }

    // ---------------------------------------------------------------------
    // Derived views
    // ---------------------------------------------------------------------

    pub fn dashboard(&self) -> Result<Dashboard, EngineError> {
        let orders = self.list_orders(OrderFilter::default())?;
        let items = self.ledger().list_items()?;
        let warehouses = self.list_warehouses()?;

        Ok(dashboard::build(
            &orders,
            &items,
            &warehouses,
            self.clock.today(),
            self.config.expiration_window_days,
            self.config.dashboard_top_n,
        ))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Single-stream command; a lost version race is reported as `Conflict`.
    fn run<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn() -> A,
    ) -> Result<A, EngineError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: supplyline_events::Event + Serialize + DeserializeOwned,
    {
        match self
            .dispatcher
            .dispatch(aggregate_id, aggregate_type, command, &make_aggregate)
        {
            Err(err) if err.is_unpublished() => {
                tracing::error!(aggregate_id = %aggregate_id, aggregate_type, error = %err, "event stored but not published");
                self.dispatcher.load(aggregate_id, &make_aggregate)
            }
            other => other.map_err(EngineError::into_conflict),
        }
    }

    /// Append under `expected`; a publish failure after the append is logged, not returned.
    fn commit_settled<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        expected: ExpectedVersion,
        events: &[A::Event],
    ) -> Result<(), EngineError>
    where
        A: Aggregate,
        A::Event: supplyline_events::Event + Serialize,
    {
        match self
            .dispatcher
            .commit::<A>(aggregate_id, aggregate_type, expected, events)
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_unpublished() => {
                tracing::error!(aggregate_id = %aggregate_id, aggregate_type, error = %err, "event stored but not published");
                Ok(())
            }
            Err(err) => Err(err.into_conflict()),
        }
    }

    fn load_order(&self, order_id: OrderId) -> Result<Order, EngineError> {
        self.dispatcher.load(order_id.0, || Order::empty(order_id))
    }

    fn decide_order(
        &self,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<(Order, Vec<OrderEvent>), EngineError> {
        let order = self.load_order(order_id)?;
        self.decide(order, command)
    }

    fn decide(&self, order: Order, command: OrderCommand) -> Result<(Order, Vec<OrderEvent>), EngineError> {
        let events = order.handle(&command).inspect_err(|err| {
            tracing::debug!(order_id = %order.id_typed(), status = %order.status(), error = %err, "order command rejected");
        })?;
        Ok((order, events))
    }

    fn commit_order(&self, mut order: Order, events: Vec<OrderEvent>) -> Result<Order, EngineError> {
        let expected = ExpectedVersion::Exact(order.version());
        self.commit_settled::<Order>(order.id_typed().0, ORDER_AGGREGATE_TYPE, expected, &events)?;
        for e in &events {
            order.apply(e);
        }
        Ok(order)
    }

    fn transition(&self, order_id: OrderId, command: OrderCommand) -> Result<Order, EngineError> {
        let (order, events) = self.decide_order(order_id, command)?;
        self.commit_order(order, events)
    }

    /// The reservation a terminal order settled, if the item still holds it.
    fn unsettled_reservation(&self, order: &Order, status: OrderStatus) -> Result<Option<Reservation>, EngineError> {
        if order.status() != status {
            return Ok(None);
        }
        let (Some(reservation_id), Some(item_id)) = (order.settled_reservation(), order.item_id()) else {
            return Ok(None);
        };
        Ok(self.get_item(item_id)?.reservation(reservation_id))
    }

    fn reservation_of(&self, order: &Order, reservation_id: Option<ReservationId>) -> Option<Reservation> {
        Some(Reservation {
            id: reservation_id?,
            item_id: order.item_id()?,
            order_id: order.id_typed().0,
            quantity: order.quantity_ordered(),
        })
    }
}
