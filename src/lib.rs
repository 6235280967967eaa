//! Polymart storefront backend and checkout client.
//!
//! The server side exposes the catalog, order placement, order history and
//! payment authorization over REST on MongoDB. The [`checkout`] module is the
//! buyer-side cart and checkout flow that drives those endpoints.

use std::sync::Arc;

use actix_web::web;

pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod payment;
pub mod placement;
pub mod pricing;
pub mod store;

use crate::error::AppError;
use crate::middleware::AdminAuth;
use crate::payment::PaymentGateway;
use crate::placement::PlacementPolicy;
use crate::store::{CatalogStore, OrderStore};

/// Shared by every handler.
pub struct AppState {
    pub catalog: Arc<dyn CatalogStore>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentGateway>,
    pub policy: PlacementPolicy,
}

/// Mounts the `/api/v1` routes. Staff tokens are checked against `jwt_secret`.
pub fn routes(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let err: actix_web::Error = AppError::Validation(err.to_string()).into();
        err
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let err: actix_web::Error = AppError::Validation(err.to_string()).into();
        err
    }))
    .service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health))
            .route("/products", web::get().to(handlers::get_products))
            .route("/product/{id}", web::get().to(handlers::get_product))
            .route("/order", web::post().to(handlers::place_order))
            .route("/order", web::get().to(handlers::list_orders))
            .route("/order/{id}", web::delete().to(handlers::cancel))
            .service(
                web::resource("/order/{id}/status")
                    .wrap(AdminAuth::new(jwt_secret))
                    .route(web::patch().to(handlers::update_order_status)),
            )
            .route("/payment", web::post().to(handlers::create_payment)),
    );
}
