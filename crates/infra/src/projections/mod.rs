//! Read-side views.
//!
//! `dashboard` derives alerting and distribution views from a snapshot;
//! `order_timeline` consumes published envelopes into an audit trail.

pub mod dashboard;
pub mod order_timeline;

pub use dashboard::{Dashboard, ItemOrderCount, ItemSummary, WarehouseRollup};
pub use order_timeline::{OrderTimelineProjection, TimelineEntry, TimelineProjectionError};
