use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use log::{info, warn};
use serde_json::json;

use crate::error::AppError;
use crate::lifecycle::{advance_order, cancel_order};
use crate::middleware::StaffClaims;
use crate::models::{
    Envelope, ListOrdersParams, OrderOutcome, OrderPage, OrderView, Pagination, PaymentRequest,
    PlaceOrderRequest, ProductDetail, ProductList, ProductSearch, StatusUpdate,
};
use crate::placement::OrderPlacement;
use crate::store::OrderQuery;
use crate::AppState;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "status": "ok" }))
}

pub async fn get_products(
    state: web::Data<AppState>,
    query: web::Query<ProductSearch>,
) -> Result<HttpResponse, AppError> {
    let products = state.catalog.find_all(query.keyword.as_deref()).await?;
    Ok(HttpResponse::Ok().json(Envelope::ok(ProductList { products })))
}

pub async fn get_product(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse, AppError> {
    match state.catalog.find_by_id(&id).await? {
        Some(product) => Ok(HttpResponse::Ok().json(Envelope::ok(ProductDetail { product }))),
        None => Err(AppError::NotFound("Unable to get product with that id".to_string())),
    }
}

pub async fn place_order(
    state: web::Data<AppState>,
    body: web::Json<PlaceOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let placement = OrderPlacement::new(
        state.catalog.as_ref(),
        state.orders.as_ref(),
        state.payments.as_ref(),
        &state.policy,
    );
    let order = placement.place(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(Envelope::ok(OrderOutcome {
        order: order.into(),
        message: "Order placed successfully. Stock updated.".to_string(),
    })))
}

pub async fn list_orders(
    state: web::Data<AppState>,
    params: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let query = OrderQuery::from_params(&params)?;
    let (orders, total) = state.orders.list(&query).await?;
    let page = OrderPage {
        data: orders.into_iter().map(OrderView::from).collect(),
        pagination: Pagination {
            total_pages: query.total_pages(total),
            current_page: query.page,
            total_orders: total,
            limit: query.limit,
        },
    };
    Ok(HttpResponse::Ok().json(Envelope::ok(page)))
}

pub async fn cancel(state: web::Data<AppState>, id: web::Path<String>) -> Result<HttpResponse, AppError> {
    let order = cancel_order(state.catalog.as_ref(), state.orders.as_ref(), &id).await?;
    Ok(HttpResponse::Ok().json(Envelope::ok(OrderOutcome {
        order: order.into(),
        message: "Order cancelled".to_string(),
    })))
}

pub async fn update_order_status(
    state: web::Data<AppState>,
    req: HttpRequest,
    id: web::Path<String>,
    body: web::Json<StatusUpdate>,
) -> Result<HttpResponse, AppError> {
    let staff = req
        .extensions()
        .get::<StaffClaims>()
        .map(|c| c.sub.clone())
        .unwrap_or_default();
    let order = advance_order(state.orders.as_ref(), &id, body.status).await?;
    info!("Staff {} set order {} to {}", staff, order.id, order.status);
    Ok(HttpResponse::Ok().json(Envelope::ok(OrderOutcome {
        order: order.into(),
        message: format!("Order marked {}", body.status),
    })))
}

pub async fn create_payment(
    state: web::Data<AppState>,
    body: web::Json<PaymentRequest>,
) -> Result<HttpResponse, AppError> {
    if body.amount <= 0 {
        return Err(AppError::Validation(
            "amount must be a positive number of minor currency units".to_string(),
        ));
    }
    let currency = body
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| state.policy.currency.clone());

    let authorization = state.payments.authorize(body.amount, &currency).await.map_err(|e| {
        warn!("Payment authorization for {} {} failed: {}", body.amount, currency, e);
        AppError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(Envelope::ok(authorization)))
}
