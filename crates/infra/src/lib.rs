//! Infrastructure layer: event store, command dispatch, the inventory ledger
//! and the `FulfillmentEngine` that sequences cross-aggregate operations.

pub mod command_dispatcher;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod event_store;
pub mod ledger;
pub mod projections;


pub use command_dispatcher::CommandDispatcher;
pub use config::{ConfigError, EngineConfig};
pub use directory::{ActorDirectory, InMemoryActorDirectory};
pub use engine::{
    FulfillmentEngine, InventoryFilter, ItemDetails, NewItem, OrderFilter, ProcurementFilter,
};
pub use error::EngineError;
pub use ledger::InventoryLedger;
