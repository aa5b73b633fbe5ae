//! Derived, read-only views over a snapshot of orders, items and warehouses.
//!
//! Everything here is a pure function of its inputs; the engine loads the
//! snapshot and calls `build`.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use supplyline_inventory::{InventoryItem, InventoryItemId, Warehouse, WarehouseId};
use supplyline_orders::{Order, OrderStatus};

/// Flat view of one inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub item_id: InventoryItemId,
    pub warehouse_id: Option<WarehouseId>,
    pub name: String,
    pub quantity: i64,
    pub reorder_threshold: i64,
    pub expiration_date: Option<NaiveDate>,
}

impl From<&InventoryItem> for ItemSummary {
    fn from(item: &InventoryItem) -> Self {
        Self {
            item_id: item.id_typed(),
            warehouse_id: item.warehouse_id(),
            name: item.name().to_string(),
            quantity: item.quantity(),
            reorder_threshold: item.reorder_threshold(),
            expiration_date: item.expiration_date(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOrderCount {
    pub item_id: InventoryItemId,
    pub name: String,
    pub order_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseRollup {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub item_count: usize,
    pub total_quantity: i64,
    pub low_stock_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub today: NaiveDate,
    pub status_distribution: BTreeMap<OrderStatus, usize>,
    pub top_items_by_quantity: Vec<ItemSummary>,
    pub top_items_by_order_count: Vec<ItemOrderCount>,
    pub low_stock: Vec<ItemSummary>,
    pub near_expiration: Vec<ItemSummary>,
    pub expired: Vec<ItemSummary>,
    pub warehouses: Vec<WarehouseRollup>,
}

/// Order count per status. Every status is present, zero included.
pub fn status_distribution(orders: &[Order]) -> BTreeMap<OrderStatus, usize> {
    let mut counts: BTreeMap<OrderStatus, usize> =
        OrderStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    for order in orders.iter().filter(|o| o.exists()) {
        *counts.entry(order.status()).or_default() += 1;
    }
    counts
}

pub fn top_items_by_quantity(items: &[InventoryItem], n: usize) -> Vec<ItemSummary> {
    let mut summaries: Vec<ItemSummary> = items.iter().map(ItemSummary::from).collect();
    summaries.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));
    summaries.truncate(n);
    summaries
}

/// Items ranked by how many orders (any status) were placed against them.
pub fn top_items_by_order_count(
    orders: &[Order],
    items: &[InventoryItem],
    n: usize,
) -> Vec<ItemOrderCount> {
    let mut counts: HashMap<InventoryItemId, usize> = HashMap::new();
    for item_id in orders.iter().filter_map(Order::item_id) {
        *counts.entry(item_id).or_default() += 1;
    }

    let names: HashMap<InventoryItemId, &str> =
        items.iter().map(|i| (i.id_typed(), i.name())).collect();

    let mut ranked: Vec<ItemOrderCount> = counts
        .into_iter()
        .map(|(item_id, order_count)| ItemOrderCount {
            item_id,
            name: names.get(&item_id).copied().unwrap_or_default().to_string(),
            order_count,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.order_count
            .cmp(&a.order_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(n);
    ranked
}

pub fn low_stock(items: &[InventoryItem]) -> Vec<ItemSummary> {
    items
        .iter()
        .filter(|i| i.is_low_stock())
        .map(ItemSummary::from)
        .collect()
}

pub fn near_expiration(items: &[InventoryItem], today: NaiveDate, window_days: i64) -> Vec<ItemSummary> {
    let mut soon: Vec<ItemSummary> = items
        .iter()
        .filter(|i| i.is_near_expiration(today, window_days))
        .map(ItemSummary::from)
        .collect();
    soon.sort_by_key(|s| s.expiration_date);
    soon
}

pub fn expired(items: &[InventoryItem], today: NaiveDate) -> Vec<ItemSummary> {
    items
        .iter()
        .filter(|i| i.is_expired(today))
        .map(ItemSummary::from)
        .collect()
}

/// Per-warehouse totals. Warehouses without items still appear.
pub fn warehouse_rollups(warehouses: &[Warehouse], items: &[InventoryItem]) -> Vec<WarehouseRollup> {
    warehouses
        .iter()
        .map(|w| {
            let stocked: Vec<&InventoryItem> = items
                .iter()
                .filter(|i| i.warehouse_id() == Some(w.id_typed()))
                .collect();
            WarehouseRollup {
                warehouse_id: w.id_typed(),
                name: w.name().to_string(),
                item_count: stocked.len(),
                total_quantity: stocked.iter().map(|i| i.quantity()).sum(),
                low_stock_count: stocked.iter().filter(|i| i.is_low_stock()).count(),
            }
        })
        .collect()
}

pub fn build(
    orders: &[Order],
    items: &[InventoryItem],
    warehouses: &[Warehouse],
    today: NaiveDate,
    window_days: i64,
    top_n: usize,
) -> Dashboard {
    Dashboard {
        today,
        status_distribution: status_distribution(orders),
        top_items_by_quantity: top_items_by_quantity(items, top_n),
        top_items_by_order_count: top_items_by_order_count(orders, items, top_n),
        low_stock: low_stock(items),
        near_expiration: near_expiration(items, today, window_days),
        expired: expired(items, today),
        warehouses: warehouse_rollups(warehouses, items),
    }
}
