//! Procurement domain module (procurement requests, event-sourced).
//!
//! A procurement request is the demand signal raised before an order exists.
//! Business rules only: no IO, no storage.

pub mod request;

pub use request::{
    ChangeRequestStatus, CreateProcurementRequest, MarkRequestOrdered, ProcurementCommand,
    ProcurementEvent, ProcurementRequest, ProcurementRequestCreated, ProcurementRequestId,
    ProcurementStatus, RequestOrdered, RequestStatusChanged,
};
