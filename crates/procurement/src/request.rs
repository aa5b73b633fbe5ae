use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyline_auth::{Actor, Role};
use supplyline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use supplyline_events::Event;
use supplyline_inventory::InventoryItemId;

/// Procurement request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcurementRequestId(pub AggregateId);

impl ProcurementRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProcurementRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Procurement request status lifecycle.
///
/// `pending → approved | rejected`, `approved → ordered`. `rejected` and
/// `ordered` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcurementStatus {
    Pending,
    Approved,
    Rejected,
    Ordered,
}

impl ProcurementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcurementStatus::Pending => "pending",
            ProcurementStatus::Approved => "approved",
            ProcurementStatus::Rejected => "rejected",
            ProcurementStatus::Ordered => "ordered",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcurementStatus::Rejected | ProcurementStatus::Ordered)
    }
}

impl core::fmt::Display for ProcurementStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcurementStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ProcurementStatus::Pending),
            "approved" => Ok(ProcurementStatus::Approved),
            "rejected" => Ok(ProcurementStatus::Rejected),
            "ordered" => Ok(ProcurementStatus::Ordered),
            other => Err(DomainError::invalid_payload(format!(
                "unknown procurement status '{other}'"
            ))),
        }
    }
}

/// Aggregate root: ProcurementRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcurementRequest {
    id: ProcurementRequestId,
    item_id: Option<InventoryItemId>,
    requested_quantity: i64,
    status: ProcurementStatus,
    requested_date: Option<DateTime<Utc>>,
    requester_id: Option<UserId>,
    reviewed_by: Option<UserId>,
    order_id: Option<AggregateId>,
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl ProcurementRequest {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProcurementRequestId) -> Self {
        Self {
            id,
            item_id: None,
            requested_quantity: 0,
            status: ProcurementStatus::Pending,
            requested_date: None,
            requester_id: None,
            reviewed_by: None,
            order_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProcurementRequestId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn item_id(&self) -> Option<InventoryItemId> {
        self.item_id
    }

    pub fn requested_quantity(&self) -> i64 {
        self.requested_quantity
    }

    pub fn status(&self) -> ProcurementStatus {
        self.status
    }

    pub fn requested_date(&self) -> Option<DateTime<Utc>> {
        self.requested_date
    }

    pub fn requester_id(&self) -> Option<UserId> {
        self.requester_id
    }

    pub fn reviewed_by(&self) -> Option<UserId> {
        self.reviewed_by
    }

    /// Stream id of the order placed for this request.
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }
}

impl AggregateRoot for ProcurementRequest {
    type Id = ProcurementRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProcurementRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProcurementRequest {
    pub request_id: ProcurementRequestId,
    pub item_id: InventoryItemId,
    pub requested_quantity: i64,
    pub requester: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeRequestStatus (review decision by an actor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestStatus {
    pub request_id: ProcurementRequestId,
    pub new_status: ProcurementStatus,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkRequestOrdered (system-driven, when an order is placed for it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRequestOrdered {
    pub request_id: ProcurementRequestId,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcurementCommand {
    Create(CreateProcurementRequest),
    ChangeStatus(ChangeRequestStatus),
    MarkOrdered(MarkRequestOrdered),
}

/// Event: ProcurementRequestCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementRequestCreated {
    pub request_id: ProcurementRequestId,
    pub item_id: InventoryItemId,
    pub requested_quantity: i64,
    pub requester_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestStatusChanged (approved or rejected).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatusChanged {
    pub request_id: ProcurementRequestId,
    pub from: ProcurementStatus,
    pub to: ProcurementStatus,
    pub reviewed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestOrdered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrdered {
    pub request_id: ProcurementRequestId,
    pub order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcurementEvent {
    ProcurementRequestCreated(ProcurementRequestCreated),
    RequestStatusChanged(RequestStatusChanged),
    RequestOrdered(RequestOrdered),
}

impl Event for ProcurementEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProcurementEvent::ProcurementRequestCreated(_) => "procurement.request.created",
            ProcurementEvent::RequestStatusChanged(_) => "procurement.request.status_changed",
            ProcurementEvent::RequestOrdered(_) => "procurement.request.ordered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProcurementEvent::ProcurementRequestCreated(e) => e.occurred_at,
            ProcurementEvent::RequestStatusChanged(e) => e.occurred_at,
            ProcurementEvent::RequestOrdered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ProcurementRequest {
    type Command = ProcurementCommand;
    type Event = ProcurementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProcurementEvent::ProcurementRequestCreated(e) => {
                self.id = e.request_id;
                self.item_id = Some(e.item_id);
                self.requested_quantity = e.requested_quantity;
                self.requester_id = Some(e.requester_id);
                self.requested_date = Some(e.occurred_at);
                self.status = ProcurementStatus::Pending;
                self.created = true;
            }
            ProcurementEvent::RequestStatusChanged(e) => {
                self.status = e.to;
                self.reviewed_by = Some(e.reviewed_by);
            }
            ProcurementEvent::RequestOrdered(e) => {
                self.status = ProcurementStatus::Ordered;
                self.order_id = Some(e.order_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProcurementCommand::Create(cmd) => self.handle_create(cmd),
            ProcurementCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            ProcurementCommand::MarkOrdered(cmd) => self.handle_mark_ordered(cmd),
        }
    }
}

impl ProcurementRequest {
    fn ensure_exists(&self, request_id: ProcurementRequestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!(
                "procurement request {request_id}"
            )));
        }
        if self.id != request_id {
            return Err(DomainError::invalid_id("request_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreateProcurementRequest,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("procurement request already exists"));
        }
        if cmd.requested_quantity <= 0 {
            return Err(DomainError::invalid_payload(
                "requested_quantity must be positive",
            ));
        }

        Ok(vec![ProcurementEvent::ProcurementRequestCreated(
            ProcurementRequestCreated {
                request_id: cmd.request_id,
                item_id: cmd.item_id,
                requested_quantity: cmd.requested_quantity,
                requester_id: cmd.requester.id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeRequestStatus,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;

        let legal = matches!(
            (self.status, cmd.new_status),
            (ProcurementStatus::Pending, ProcurementStatus::Approved)
                | (ProcurementStatus::Pending, ProcurementStatus::Rejected)
        );
        if !legal {
            return Err(DomainError::illegal_transition(format!(
                "procurement request cannot move from {} to {}",
                self.status, cmd.new_status
            )));
        }

        if cmd.actor.role != Role::Procurement {
            return Err(DomainError::illegal_transition(format!(
                "role '{}' cannot review procurement requests",
                cmd.actor.role
            )));
        }

        Ok(vec![ProcurementEvent::RequestStatusChanged(
            RequestStatusChanged {
                request_id: cmd.request_id,
                from: self.status,
                to: cmd.new_status,
                reviewed_by: cmd.actor.id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_mark_ordered(
        &self,
        cmd: &MarkRequestOrdered,
    ) -> Result<Vec<ProcurementEvent>, DomainError> {
        self.ensure_exists(cmd.request_id)?;

        // One order per request.
        if self.status != ProcurementStatus::Approved {
            return Err(DomainError::illegal_transition(format!(
                "only approved requests can be ordered (current: {})",
                self.status
            )));
        }

        Ok(vec![ProcurementEvent::RequestOrdered(RequestOrdered {
            request_id: cmd.request_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
