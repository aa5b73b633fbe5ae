//! Order fulfillment domain module (event-sourced state machine).
//!
//! The `Order` aggregate owns the single authoritative transition table
//! (`status::TRANSITIONS`). It decides whether an actor may move an order
//! along an edge; stock effects are carried out by the engine in `infra`.

pub mod order;
pub mod status;

pub use order::{
    AcceptOrder, ApproveOrder, AttachFeedback, CancelOrder, DeliverOrder, FeedbackAttached,
    Order, OrderAccepted, OrderApproved, OrderCanceled, OrderCommand, OrderDelivered,
    OrderEvent, OrderId, OrderPlaced, OrderShipped, PlaceOrder, ShipOrder,
};
pub use status::{OrderStatus, Transition, PLACING_ROLES, TRANSITIONS};
