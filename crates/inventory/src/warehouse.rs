use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplyline_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use supplyline_events::Event;

use crate::item::InventoryItemId;

/// Warehouse identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(pub AggregateId);

impl WarehouseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warehouse {
    id: WarehouseId,
    name: String,
    location: String,
    /// Items registered here, in registration order.
    items: Vec<InventoryItemId>,
    removed: bool,
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Warehouse {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: WarehouseId) -> Self {
        Self {
            id,
            name: String::new(),
            location: String::new(),
            items: Vec::new(),
            removed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> WarehouseId {
        self.id
    }

    /// Created and not removed.
    pub fn is_active(&self) -> bool {
        self.created && !self.removed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn items(&self) -> &[InventoryItemId] {
        &self.items
    }
}

impl AggregateRoot for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateWarehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWarehouse {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub location: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveWarehouse.
///
/// The caller supplies how many items in this warehouse still hold stock; the
/// aggregate refuses removal unless that count is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveWarehouse {
    pub warehouse_id: WarehouseId,
    pub stocked_items: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterItem. Recorded before the item's own stream is created,
/// so a removal decided on an older version of this stream is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub warehouse_id: WarehouseId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseCommand {
    CreateWarehouse(CreateWarehouse),
    RegisterItem(RegisterItem),
    RemoveWarehouse(RemoveWarehouse),
}

/// Event: WarehouseCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseCreated {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub location: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WarehouseRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRemoved {
    pub warehouse_id: WarehouseId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub warehouse_id: WarehouseId,
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    WarehouseCreated(WarehouseCreated),
    ItemRegistered(ItemRegistered),
    WarehouseRemoved(WarehouseRemoved),
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::WarehouseCreated(_) => "inventory.warehouse.created",
            WarehouseEvent::ItemRegistered(_) => "inventory.warehouse.item_registered",
            WarehouseEvent::WarehouseRemoved(_) => "inventory.warehouse.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::WarehouseCreated(e) => e.occurred_at,
            WarehouseEvent::ItemRegistered(e) => e.occurred_at,
            WarehouseEvent::WarehouseRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Warehouse {
    type Command = WarehouseCommand;
    type Event = WarehouseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WarehouseEvent::WarehouseCreated(e) => {
                self.id = e.warehouse_id;
                self.name = e.name.clone();
                self.location = e.location.clone();
                self.created = true;
            }
            WarehouseEvent::ItemRegistered(e) => {
                self.items.push(e.item_id);
            }
            WarehouseEvent::WarehouseRemoved(_) => {
                self.removed = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WarehouseCommand::CreateWarehouse(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("warehouse already exists"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::invalid_payload("name cannot be empty"));
                }
                Ok(vec![WarehouseEvent::WarehouseCreated(WarehouseCreated {
                    warehouse_id: cmd.warehouse_id,
                    name: cmd.name.trim().to_string(),
                    location: cmd.location.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            WarehouseCommand::RegisterItem(cmd) => {
                if !self.is_active() {
                    return Err(DomainError::not_found(format!(
                        "warehouse {}",
                        cmd.warehouse_id
                    )));
                }
                if self.items.contains(&cmd.item_id) {
                    return Err(DomainError::conflict(format!(
                        "item {} already registered",
                        cmd.item_id
                    )));
                }
                Ok(vec![WarehouseEvent::ItemRegistered(ItemRegistered {
                    warehouse_id: cmd.warehouse_id,
                    item_id: cmd.item_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            WarehouseCommand::RemoveWarehouse(cmd) => {
                if !self.is_active() {
                    return Err(DomainError::not_found(format!(
                        "warehouse {}",
                        cmd.warehouse_id
                    )));
                }
                if cmd.stocked_items > 0 {
                    return Err(DomainError::conflict(format!(
                        "warehouse {} still holds stock in {} item(s)",
                        cmd.warehouse_id, cmd.stocked_items
                    )));
                }
                Ok(vec![WarehouseEvent::WarehouseRemoved(WarehouseRemoved {
                    warehouse_id: cmd.warehouse_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
