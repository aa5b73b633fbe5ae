//! Walks one order through its lifecycle against an in-memory engine and
//! prints the resulting dashboard.

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;

use supplyline_auth::Actor;
use supplyline_core::{Clock, SystemClock, UserId};
use supplyline_infra::{EngineConfig, FulfillmentEngine, NewItem};

fn main() -> anyhow::Result<()> {
    supplyline_observability::init();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = FulfillmentEngine::in_memory(clock.clone(), config);

    let admin = Actor::procurement(UserId::new());
    let stores = Actor::warehouse(UserId::new());
    let supplier = Actor::supplier(UserId::new());
    let nurse = Actor::healthcare(UserId::new());

    for actor in [admin, stores, supplier, nurse] {
        engine.register_actor(&admin, actor)?;
    }

    let warehouse = engine.create_warehouse(&stores, "Central Stores", "Building B")?;
    let item = engine.create_item(
        &stores,
        NewItem {
            warehouse_id: warehouse.id_typed(),
            name: "Nitrile gloves (M)".to_string(),
            description: "Box of 100".to_string(),
            initial_quantity: 40,
            reorder_threshold: 10,
            expiration_date: Some(clock.today() + Duration::days(20)),
        },
    )?;

    let order = engine.place_order(&nurse, item.id_typed(), 12)?;
    let order_id = order.id_typed();
    engine.approve_order(&admin, order_id, Some(supplier.id), Some(warehouse.id_typed()))?;
    engine.accept_order(&supplier, order_id, Some(clock.today() + Duration::days(3)))?;
    engine.ship_order(&supplier, order_id)?;
    let order = engine.deliver_order(&stores, order_id)?;

    tracing::info!(order_id = %order_id, status = %order.status(), "demo order finished");

    let dashboard = engine.dashboard()?;
    println!("{}", serde_json::to_string_pretty(&dashboard)?);
    Ok(())
}
