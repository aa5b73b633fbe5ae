use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use supplyline_auth::{Actor, Role};
use supplyline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use supplyline_events::Event;
use supplyline_inventory::{InventoryItemId, ReservationId, WarehouseId};
use supplyline_procurement::ProcurementRequestId;

use crate::status::{OrderStatus, PLACING_ROLES, Transition};

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    item_id: Option<InventoryItemId>,
    quantity_ordered: i64,
    requester_id: Option<UserId>,
    supplier_id: Option<UserId>,
    warehouse_id: Option<WarehouseId>,
    status: OrderStatus,
    status_history: Vec<OrderStatus>,
    order_date: Option<DateTime<Utc>>,
    estimated_delivery: Option<NaiveDate>,
    message: Option<String>,
    procurement_request_id: Option<ProcurementRequestId>,
    reservation_id: Option<ReservationId>,
    /// Reservation the terminal transition handed back to (or drew from) the ledger.
    settled_reservation: Option<ReservationId>,
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            item_id: None,
            quantity_ordered: 0,
            requester_id: None,
            supplier_id: None,
            warehouse_id: None,
            status: OrderStatus::Placed,
            status_history: Vec::new(),
            order_date: None,
            estimated_delivery: None,
            message: None,
            procurement_request_id: None,
            reservation_id: None,
            settled_reservation: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn item_id(&self) -> Option<InventoryItemId> {
        self.item_id
    }

    pub fn quantity_ordered(&self) -> i64 {
        self.quantity_ordered
    }

    pub fn requester_id(&self) -> Option<UserId> {
        self.requester_id
    }

    pub fn supplier_id(&self) -> Option<UserId> {
        self.supplier_id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Every status the order has been in, oldest first.
    pub fn status_history(&self) -> &[OrderStatus] {
        &self.status_history
    }

    pub fn order_date(&self) -> Option<DateTime<Utc>> {
        self.order_date
    }

    pub fn estimated_delivery(&self) -> Option<NaiveDate> {
        self.estimated_delivery
    }

    /// Latest feedback message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn procurement_request_id(&self) -> Option<ProcurementRequestId> {
        self.procurement_request_id
    }

    /// Reservation held while the order is accepted or shipped.
    pub fn reservation_id(&self) -> Option<ReservationId> {
        self.reservation_id
    }

    /// Set once the order is delivered or canceled while holding stock: the
    /// reservation the engine must consume or release on the item's stream.
    pub fn settled_reservation(&self) -> Option<ReservationId> {
        self.settled_reservation
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder. Item existence is checked by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub item_id: InventoryItemId,
    pub quantity_ordered: i64,
    pub actor: Actor,
    pub procurement_request_id: Option<ProcurementRequestId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveOrder (assign supplier and warehouse).
///
/// Both are optional so a missing assignment surfaces as `InvalidPayload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub supplier_id: Option<UserId>,
    pub warehouse_id: Option<WarehouseId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptOrder (assigned supplier commits a delivery date).
///
/// `reservation_id` names the ledger reservation the engine makes alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub estimated_delivery: Option<NaiveDate>,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub actor: Actor,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachFeedback (annotation, no status change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachFeedback {
    pub order_id: OrderId,
    pub actor: Actor,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Place(PlaceOrder),
    Approve(ApproveOrder),
    Accept(AcceptOrder),
    Ship(ShipOrder),
    Deliver(DeliverOrder),
    Cancel(CancelOrder),
    AttachFeedback(AttachFeedback),
}

impl OrderCommand {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderCommand::Place(c) => c.order_id,
            OrderCommand::Approve(c) => c.order_id,
            OrderCommand::Accept(c) => c.order_id,
            OrderCommand::Ship(c) => c.order_id,
            OrderCommand::Deliver(c) => c.order_id,
            OrderCommand::Cancel(c) => c.order_id,
            OrderCommand::AttachFeedback(c) => c.order_id,
        }
    }
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub item_id: InventoryItemId,
    pub quantity_ordered: i64,
    pub requester_id: UserId,
    pub procurement_request_id: Option<ProcurementRequestId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: OrderId,
    pub supplier_id: UserId,
    pub warehouse_id: WarehouseId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderAccepted. Stock was reserved under `reservation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: OrderId,
    pub estimated_delivery: NaiveDate,
    pub reservation_id: ReservationId,
    pub accepted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub shipped_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: OrderId,
    pub reservation_id: Option<ReservationId>,
    pub delivered_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCanceled. `released_reservation` must be returned to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub order_id: OrderId,
    pub previous_status: OrderStatus,
    pub released_reservation: Option<ReservationId>,
    pub reason: Option<String>,
    pub canceled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FeedbackAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAttached {
    pub order_id: OrderId,
    pub message: String,
    pub author_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderApproved(OrderApproved),
    OrderAccepted(OrderAccepted),
    OrderShipped(OrderShipped),
    OrderDelivered(OrderDelivered),
    OrderCanceled(OrderCanceled),
    FeedbackAttached(FeedbackAttached),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderApproved(_) => "orders.order.approved",
            OrderEvent::OrderAccepted(_) => "orders.order.accepted",
            OrderEvent::OrderShipped(_) => "orders.order.shipped",
            OrderEvent::OrderDelivered(_) => "orders.order.delivered",
            OrderEvent::OrderCanceled(_) => "orders.order.canceled",
            OrderEvent::FeedbackAttached(_) => "orders.order.feedback_attached",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderApproved(e) => e.occurred_at,
            OrderEvent::OrderAccepted(e) => e.occurred_at,
            OrderEvent::OrderShipped(e) => e.occurred_at,
            OrderEvent::OrderDelivered(e) => e.occurred_at,
            OrderEvent::OrderCanceled(e) => e.occurred_at,
            OrderEvent::FeedbackAttached(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.item_id = Some(e.item_id);
                self.quantity_ordered = e.quantity_ordered;
                self.requester_id = Some(e.requester_id);
                self.procurement_request_id = e.procurement_request_id;
                self.order_date = Some(e.occurred_at);
                self.created = true;
                self.set_status(OrderStatus::Placed);
            }
            OrderEvent::OrderApproved(e) => {
                self.supplier_id = Some(e.supplier_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.set_status(OrderStatus::Approved);
            }
            OrderEvent::OrderAccepted(e) => {
                self.estimated_delivery = Some(e.estimated_delivery);
                self.reservation_id = Some(e.reservation_id);
                self.set_status(OrderStatus::Accepted);
            }
            OrderEvent::OrderShipped(_) => {
                self.set_status(OrderStatus::Shipped);
            }
            OrderEvent::OrderDelivered(e) => {
                self.settled_reservation = e.reservation_id;
                self.set_status(OrderStatus::Delivered);
            }
            OrderEvent::OrderCanceled(e) => {
                if e.released_reservation.is_some() {
                    self.reservation_id = None;
                    self.settled_reservation = e.released_reservation;
                }
                self.set_status(OrderStatus::Canceled);
            }
            OrderEvent::FeedbackAttached(e) => {
                self.message = Some(e.message.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::Place(cmd) => self.handle_place(cmd),
            OrderCommand::Approve(cmd) => self.handle_approve(cmd),
            OrderCommand::Accept(cmd) => self.handle_accept(cmd),
            OrderCommand::Ship(cmd) => self.handle_ship(cmd),
            OrderCommand::Deliver(cmd) => self.handle_deliver(cmd),
            OrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
            OrderCommand::AttachFeedback(cmd) => self.handle_feedback(cmd),
        }
    }
}

impl Order {
    fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.status_history.push(status);
    }

    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {order_id}")));
        }
        if self.id != order_id {
            return Err(DomainError::invalid_id("order_id mismatch"));
        }
        Ok(())
    }

    /// Check the edge `self.status → to` against the transition table and the
    /// identity rules layered on top of it. Runs before any payload check.
    fn authorize_transition(&self, to: OrderStatus, actor: &Actor) -> Result<(), DomainError> {
        let Some(edge) = Transition::find(self.status, to) else {
            return Err(DomainError::illegal_transition(format!(
                "order cannot move from {} to {}",
                self.status, to
            )));
        };

        let is_requester = self.requester_id == Some(actor.id);
        let is_assigned_supplier =
            actor.role == Role::Supplier && self.supplier_id == Some(actor.id);

        let allowed = match (edge.from, edge.to) {
            (OrderStatus::Placed, OrderStatus::Canceled) => {
                edge.allows_role(actor.role) || is_requester
            }
            (_, OrderStatus::Accepted) => is_assigned_supplier,
            (_, OrderStatus::Shipped) if actor.role == Role::Supplier => is_assigned_supplier,
            _ => edge.allows_role(actor.role),
        };

        if allowed {
            Ok(())
        } else {
            Err(DomainError::illegal_transition(format!(
                "{} {} may not move order from {} to {}",
                actor.role, actor.id, self.status, to
            )))
        }
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if !PLACING_ROLES.contains(&cmd.actor.role) {
            return Err(DomainError::illegal_transition(format!(
                "role '{}' cannot place orders",
                cmd.actor.role
            )));
        }
        if cmd.quantity_ordered <= 0 {
            return Err(DomainError::invalid_payload(
                "quantity_ordered must be positive",
            ));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            item_id: cmd.item_id,
            quantity_ordered: cmd.quantity_ordered,
            requester_id: cmd.actor.id,
            procurement_request_id: cmd.procurement_request_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.authorize_transition(OrderStatus::Approved, &cmd.actor)?;

        let supplier_id = cmd
            .supplier_id
            .ok_or_else(|| DomainError::invalid_payload("supplier must be assigned"))?;
        let warehouse_id = cmd
            .warehouse_id
            .ok_or_else(|| DomainError::invalid_payload("warehouse must be assigned"))?;

        Ok(vec![OrderEvent::OrderApproved(OrderApproved {
            order_id: cmd.order_id,
            supplier_id,
            warehouse_id,
            approved_by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.authorize_transition(OrderStatus::Accepted, &cmd.actor)?;

        let estimated_delivery = cmd
            .estimated_delivery
            .ok_or_else(|| DomainError::invalid_payload("estimated_delivery is required"))?;
        let today = cmd.occurred_at.date_naive();
        if estimated_delivery < today {
            return Err(DomainError::invalid_payload(format!(
                "estimated_delivery {estimated_delivery} is before today ({today})"
            )));
        }

        Ok(vec![OrderEvent::OrderAccepted(OrderAccepted {
            order_id: cmd.order_id,
            estimated_delivery,
            reservation_id: cmd.reservation_id,
            accepted_by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ShipOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.authorize_transition(OrderStatus::Shipped, &cmd.actor)?;

        Ok(vec![OrderEvent::OrderShipped(OrderShipped {
            order_id: cmd.order_id,
            shipped_by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &DeliverOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.authorize_transition(OrderStatus::Delivered, &cmd.actor)?;

        Ok(vec![OrderEvent::OrderDelivered(OrderDelivered {
            order_id: cmd.order_id,
            reservation_id: self.reservation_id,
            delivered_by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;
        self.authorize_transition(OrderStatus::Canceled, &cmd.actor)?;

        let released_reservation = if self.status.holds_stock() {
            self.reservation_id
        } else {
            None
        };

        Ok(vec![OrderEvent::OrderCanceled(OrderCanceled {
            order_id: cmd.order_id,
            previous_status: self.status,
            released_reservation,
            reason: cmd.reason.clone(),
            canceled_by: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_feedback(&self, cmd: &AttachFeedback) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.order_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::illegal_transition(format!(
                "cannot annotate a {} order",
                self.status
            )));
        }
        if cmd.actor.role != Role::Procurement {
            return Err(DomainError::illegal_transition(format!(
                "role '{}' cannot attach feedback",
                cmd.actor.role
            )));
        }
        let message = cmd.message.trim();
        if message.is_empty() {
            return Err(DomainError::invalid_payload("feedback message cannot be empty"));
        }

        Ok(vec![OrderEvent::FeedbackAttached(FeedbackAttached {
            order_id: cmd.order_id,
            message: message.to_string(),
            author_id: cmd.actor.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    use crate::status::TRANSITIONS;

    fn test_order_id() -> OrderId {
        OrderId::new(AggregateId::new())
    }

    fn test_item_id() -> InventoryItemId {
        InventoryItemId::new(AggregateId::new())
    }

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn tomorrow() -> NaiveDate {
        (test_time() + Duration::days(1)).date_naive()
    }

    struct Cast {
        requester: Actor,
        officer: Actor,
        supplier: Actor,
        warehouse: Actor,
    }

    fn cast() -> Cast {
        Cast {
            requester: Actor::healthcare(UserId::new()),
            officer: Actor::procurement(UserId::new()),
            supplier: Actor::supplier(UserId::new()),
            warehouse: Actor::warehouse(UserId::new()),
        }
    }

    fn execute(order: &mut Order, cmd: OrderCommand) -> Result<Vec<OrderEvent>, DomainError> {
        let events = order.handle(&cmd)?;
        for e in &events {
            order.apply(e);
        }
        Ok(events)
    }

    fn placed(c: &Cast, quantity: i64) -> Order {
        let order_id = test_order_id();
        let mut order = Order::empty(order_id);
        execute(
            &mut order,
            OrderCommand::Place(PlaceOrder {
                order_id,
                item_id: test_item_id(),
                quantity_ordered: quantity,
                actor: c.requester,
                procurement_request_id: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        order
    }

    fn approve_cmd(order: &Order, actor: Actor, supplier: UserId) -> OrderCommand {
        OrderCommand::Approve(ApproveOrder {
            order_id: order.id_typed(),
            actor,
            supplier_id: Some(supplier),
            warehouse_id: Some(test_warehouse_id()),
            occurred_at: test_time(),
        })
    }

    fn accept_cmd(order: &Order, actor: Actor, date: Option<NaiveDate>) -> OrderCommand {
        OrderCommand::Accept(AcceptOrder {
            order_id: order.id_typed(),
            actor,
            estimated_delivery: date,
            reservation_id: ReservationId::generate(),
            occurred_at: test_time(),
        })
    }

    fn ship_cmd(order: &Order, actor: Actor) -> OrderCommand {
        OrderCommand::Ship(ShipOrder {
            order_id: order.id_typed(),
            actor,
            occurred_at: test_time(),
        })
    }

    fn deliver_cmd(order: &Order, actor: Actor) -> OrderCommand {
        OrderCommand::Deliver(DeliverOrder {
            order_id: order.id_typed(),
            actor,
            occurred_at: test_time(),
        })
    }

    fn cancel_cmd(order: &Order, actor: Actor) -> OrderCommand {
        OrderCommand::Cancel(CancelOrder {
            order_id: order.id_typed(),
            actor,
            reason: None,
            occurred_at: test_time(),
        })
    }

    fn approved(c: &Cast) -> Order {
        let mut order = placed(c, 3);
        let cmd = approve_cmd(&order, c.officer, c.supplier.id);
        execute(&mut order, cmd).unwrap();
        order
    }

    fn accepted(c: &Cast) -> Order {
        let mut order = approved(c);
        let cmd = accept_cmd(&order, c.supplier, Some(tomorrow()));
        execute(&mut order, cmd).unwrap();
        order
    }

    #[test]
    fn place_sets_initial_state() {
        let c = cast();
        let order = placed(&c, 3);
        assert_eq!(order.status(), OrderStatus::Placed);
        assert_eq!(order.requester_id(), Some(c.requester.id));
        assert!(order.supplier_id().is_none() && order.warehouse_id().is_none());
        assert!(order.order_date().is_some());
    }

    #[test]
    fn place_rejects_supplier_role_and_non_positive_quantity() {
        let order_id = test_order_id();
        let order = Order::empty(order_id);
        let mut cmd = PlaceOrder {
            order_id,
            item_id: test_item_id(),
            quantity_ordered: 0,
            actor: Actor::healthcare(UserId::new()),
            procurement_request_id: None,
            occurred_at: test_time(),
        };
        assert!(matches!(
            order.handle(&OrderCommand::Place(cmd.clone())),
            Err(DomainError::InvalidPayload(_))
        ));

        cmd.quantity_ordered = 1;
        cmd.actor = Actor::supplier(UserId::new());
        assert!(matches!(
            order.handle(&OrderCommand::Place(cmd)),
            Err(DomainError::IllegalTransition(_))
        ));
    }

    #[test]
    fn approve_assigns_supplier_and_warehouse() {
        let c = cast();
        let order = approved(&c);
        assert_eq!(order.status(), OrderStatus::Approved);
        assert_eq!(order.supplier_id(), Some(c.supplier.id));
        assert!(order.warehouse_id().is_some());
    }

    #[test]
    fn approve_requires_procurement_and_both_assignments() {
        let c = cast();
        let order = placed(&c, 3);

        let err = order
            .handle(&approve_cmd(&order, c.warehouse, c.supplier.id))
            .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition(_)));

        let err = order
            .handle(&OrderCommand::Approve(ApproveOrder {
                order_id: order.id_typed(),
                actor: c.officer,
                supplier_id: Some(c.supplier.id),
                warehouse_id: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload(_)));
    }

    #[test]
    fn accept_by_assigned_supplier_records_delivery_and_reservation() {
        let c = cast();
        let order = accepted(&c);
        assert_eq!(order.status(), OrderStatus::Accepted);
        assert_eq!(order.estimated_delivery(), Some(tomorrow()));
        assert!(order.reservation_id().is_some());
    }

    #[test]
    fn other_supplier_is_rejected_even_with_valid_payload() {
        let c = cast();
        let order = approved(&c);
        let intruder = Actor::supplier(UserId::new());

        for date in [Some(tomorrow()), None] {
            let err = order.handle(&accept_cmd(&order, intruder, date)).unwrap_err();
            assert!(matches!(err, DomainError::IllegalTransition(_)));
        }
    }

    #[test]
    fn accept_rejects_missing_or_past_delivery_date() {
        let c = cast();
        let order = approved(&c);

        let err = order.handle(&accept_cmd(&order, c.supplier, None)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload(_)));

        let yesterday = (test_time() - Duration::days(1)).date_naive();
        let err = order
            .handle(&accept_cmd(&order, c.supplier, Some(yesterday)))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload(_)));
    }

    #[test]
    fn accept_today_is_allowed() {
        let c = cast();
        let order = approved(&c);
        let today = test_time().date_naive();
        assert!(order.handle(&accept_cmd(&order, c.supplier, Some(today))).is_ok());
    }

    #[test]
    fn full_lifecycle_reaches_delivered() {
        let c = cast();
        let mut order = accepted(&c);
        let cmd = ship_cmd(&order, c.supplier);
        execute(&mut order, cmd).unwrap();
        let cmd = deliver_cmd(&order, c.warehouse);
        let events = execute(&mut order, cmd).unwrap();

        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(
            order.status_history(),
            &[
                OrderStatus::Placed,
                OrderStatus::Approved,
                OrderStatus::Accepted,
                OrderStatus::Shipped,
                OrderStatus::Delivered
            ]
        );
        match &events[0] {
            OrderEvent::OrderDelivered(e) => assert_eq!(e.reservation_id, order.reservation_id()),
            _ => panic!("Expected OrderDelivered event"),
        }
        assert_eq!(order.settled_reservation(), order.reservation_id());
    }

    #[test]
    fn unassigned_supplier_cannot_ship() {
        let c = cast();
        let order = accepted(&c);
        let err = order
            .handle(&ship_cmd(&order, Actor::supplier(UserId::new())))
            .unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition(_)));
        assert!(order.handle(&ship_cmd(&order, c.warehouse)).is_ok());
    }

    #[test]
    fn supplier_cannot_deliver() {
        let c = cast();
        let mut order = accepted(&c);
        let cmd = ship_cmd(&order, c.warehouse);
        execute(&mut order, cmd).unwrap();
        assert!(matches!(
            order.handle(&deliver_cmd(&order, c.supplier)),
            Err(DomainError::IllegalTransition(_))
        ));
    }

    #[test]
    fn requester_may_cancel_only_while_placed() {
        let c = cast();
        let order = placed(&c, 2);
        assert!(order.handle(&cancel_cmd(&order, c.requester)).is_ok());

        let order = approved(&c);
        assert!(matches!(
            order.handle(&cancel_cmd(&order, c.requester)),
            Err(DomainError::IllegalTransition(_))
        ));
    }

    #[test]
    fn cancel_before_acceptance_releases_nothing() {
        let c = cast();
        let mut order = approved(&c);
        let cmd = cancel_cmd(&order, c.officer);
        let events = execute(&mut order, cmd).unwrap();
        match &events[0] {
            OrderEvent::OrderCanceled(e) => {
                assert_eq!(e.previous_status, OrderStatus::Approved);
                assert!(e.released_reservation.is_none());
            }
            _ => panic!("Expected OrderCanceled event"),
        }
        assert_eq!(order.status(), OrderStatus::Canceled);
        assert!(order.settled_reservation().is_none());
    }

    #[test]
    fn cancel_after_acceptance_hands_back_reservation() {
        let c = cast();
        let mut order = accepted(&c);
        let held = order.reservation_id();
        let cmd = cancel_cmd(&order, c.officer);
        let events = execute(&mut order, cmd).unwrap();
        match &events[0] {
            OrderEvent::OrderCanceled(e) => assert_eq!(e.released_reservation, held),
            _ => panic!("Expected OrderCanceled event"),
        }
        assert!(order.reservation_id().is_none());
        assert_eq!(order.settled_reservation(), held);
    }

    #[test]
    fn terminal_orders_cannot_be_canceled_or_annotated() {
        let c = cast();
        let mut order = placed(&c, 1);
        let cmd = cancel_cmd(&order, c.officer);
        execute(&mut order, cmd).unwrap();

        assert!(matches!(
            order.handle(&cancel_cmd(&order, c.officer)),
            Err(DomainError::IllegalTransition(_))
        ));
        assert!(matches!(
            order.handle(&OrderCommand::AttachFeedback(AttachFeedback {
                order_id: order.id_typed(),
                actor: c.officer,
                message: "late".to_string(),
                occurred_at: test_time(),
            })),
            Err(DomainError::IllegalTransition(_))
        ));
    }

    #[test]
    fn feedback_does_not_change_status() {
        let c = cast();
        let mut order = approved(&c);
        let cmd = OrderCommand::AttachFeedback(AttachFeedback {
            order_id: order.id_typed(),
            actor: c.officer,
            message: "  please confirm lot numbers ".to_string(),
            occurred_at: test_time(),
        });
        execute(&mut order, cmd).unwrap();
        assert_eq!(order.status(), OrderStatus::Approved);
        assert_eq!(order.message(), Some("please confirm lot numbers"));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let c = cast();
        let order = approved(&c);
        let before = order.clone();
        let _ = order.handle(&accept_cmd(&order, c.supplier, Some(tomorrow())));
        let _ = order.handle(&cancel_cmd(&order, c.officer));
        assert_eq!(order, before);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let c = cast();
        let order = Order::empty(test_order_id());
        assert!(matches!(
            order.handle(&ship_cmd(&order, c.warehouse)),
            Err(DomainError::NotFound(_))
        ));
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Approve,
        Accept,
        Ship,
        Deliver,
        Cancel,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Approve),
            Just(Step::Accept),
            Just(Step::Ship),
            Just(Step::Deliver),
            Just(Step::Cancel),
        ]
    }

    proptest! {
        /// Property: whatever sequence of commands and actors is thrown at an
        /// order, every status change follows an edge of the table and
        /// `delivered` is never reached without passing `accepted`.
        #[test]
        fn status_only_follows_table_edges(
            steps in prop::collection::vec((step_strategy(), 0usize..4), 1..20)
        ) {
            let c = cast();
            let actors = [c.requester, c.officer, c.supplier, c.warehouse];
            let mut order = placed(&c, 1);

            for (step, who) in steps {
                let actor = actors[who];
                let cmd = match step {
                    Step::Approve => approve_cmd(&order, actor, c.supplier.id),
                    Step::Accept => accept_cmd(&order, actor, Some(tomorrow())),
                    Step::Ship => ship_cmd(&order, actor),
                    Step::Deliver => deliver_cmd(&order, actor),
                    Step::Cancel => cancel_cmd(&order, actor),
                };
                let before = order.status();
                if execute(&mut order, cmd).is_ok() {
                    let after = order.status();
                    prop_assert!(TRANSITIONS.iter().any(|t| t.from == before && t.to == after));
                }
            }

            let history = order.status_history();
            if history.contains(&OrderStatus::Delivered) {
                prop_assert!(history.contains(&OrderStatus::Accepted));
            }
        }
    }
}
