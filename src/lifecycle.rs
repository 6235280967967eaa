//! Status changes on placed orders.

use log::{error, info};

use crate::error::AppError;
use crate::models::{Order, OrderStatus};
use crate::store::{CatalogStore, OrderStore};

/// Cancels a Processing order and puts its stock back. The record is kept.
pub async fn cancel_order(
    catalog: &dyn CatalogStore,
    orders: &dyn OrderStore,
    id: &str,
) -> Result<Order, AppError> {
    let order = move_order(orders, id, OrderStatus::Cancelled).await?;
    for item in &order.items {
        if let Err(e) = catalog.release_stock(&item.product, item.qty).await {
            error!("Failed to restock {} unit(s) of {} for order {}: {}", item.qty, item.product, id, e);
        }
    }
    info!("Order {} cancelled", id);
    Ok(order)
}

/// Administrative Processing -> Shipped -> Delivered moves.
pub async fn advance_order(orders: &dyn OrderStore, id: &str, to: OrderStatus) -> Result<Order, AppError> {
    if matches!(to, OrderStatus::Processing | OrderStatus::Cancelled) {
        return Err(AppError::Validation(format!(
            "Orders can only be advanced to Shipped or Delivered, not {to}"
        )));
    }
    let order = move_order(orders, id, to).await?;
    info!("Order {} moved to {}", id, to);
    Ok(order)
}

async fn move_order(orders: &dyn OrderStore, id: &str, to: OrderStatus) -> Result<Order, AppError> {
    if let Some(order) = orders.transition(id, to.reachable_from(), to).await? {
        return Ok(order);
    }
    match orders.find_by_id(id).await? {
        Some(order) if order.status != OrderStatus::Cancelled => Err(AppError::InvalidTransition {
            from: order.status,
            to,
        }),
        _ => Err(AppError::NotFound("Order not found".to_string())),
    }
}
