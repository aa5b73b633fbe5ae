//! Inventory domain module (event-sourced).
//!
//! Business rules for stocked items, warehouses and stock reservations,
//! implemented purely as deterministic domain logic (no IO, no storage).
//! Atomicity across concurrent callers is provided by the event store's
//! optimistic version check, not here.

pub mod item;
pub mod reservation;
pub mod warehouse;

pub use item::{
    CreateItem, ConsumeReservation, InventoryCommand, InventoryEvent, InventoryItem,
    InventoryItemId, ItemCreated, ItemDetailsUpdated, ReleaseReservation, Replenish,
    ReservationConsumed, ReservationReleased, ReserveStock, StockReplenished, StockReserved,
    UpdateItemDetails, DEFAULT_EXPIRATION_WINDOW_DAYS,
};
pub use reservation::{Reservation, ReservationId};
pub use warehouse::{
    CreateWarehouse, ItemRegistered, RegisterItem, RemoveWarehouse, Warehouse, WarehouseCommand,
    WarehouseCreated, WarehouseEvent, WarehouseId, WarehouseRemoved,
};
