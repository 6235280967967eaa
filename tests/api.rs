use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

use polymart::middleware::{StaffClaims, ADMIN_ROLE};
use polymart::models::Product;
use polymart::payment::FakeGateway;
use polymart::placement::PlacementPolicy;
use polymart::store::memory::{MemoryCatalog, MemoryOrders};
use polymart::{routes, AppState};

const SECRET: &str = "integration-secret";
const CHIPS: &str = "65f1c0ffee0000000000000a";
const GRANULES: &str = "65f1c0ffee0000000000000b";

fn product(id: &str, name: &str, price: f64, stock: u32) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        price,
        description: Some("Recycled plastic".to_string()),
        category: "Plastic".to_string(),
        seller: "Polymart".to_string(),
        stock,
        images: Vec::new(),
        ratings: 4.5,
        num_of_reviews: 2,
    }
}

struct Backend {
    catalog: Arc<MemoryCatalog>,
    orders: Arc<MemoryOrders>,
    gateway: Arc<FakeGateway>,
    require_payment: bool,
}

impl Backend {
    fn new(require_payment: bool) -> Self {
        Backend {
            catalog: Arc::new(MemoryCatalog::new(vec![
                product(CHIPS, "PET chips", 1000.0, 5),
                product(GRANULES, "HDPE granules", 400.0, 50),
            ])),
            orders: Arc::new(MemoryOrders::new()),
            gateway: Arc::new(FakeGateway::new()),
            require_payment,
        }
    }

    fn state(&self) -> web::Data<AppState> {
        web::Data::new(AppState {
            catalog: self.catalog.clone(),
            orders: self.orders.clone(),
            payments: self.gateway.clone(),
            policy: PlacementPolicy {
                require_payment: self.require_payment,
                ..PlacementPolicy::default()
            },
        })
    }
}

macro_rules! app {
    ($backend:expr) => {
        test::init_service(
            App::new()
                .app_data($backend.state())
                .configure(|cfg| routes(cfg, SECRET)),
        )
        .await
    };
}

async fn json_of<B: MessageBody>(resp: ServiceResponse<B>) -> Value {
    let bytes = test::read_body(resp).await;
    serde_json::from_slice(&bytes).unwrap()
}

fn order_body(product_id: &str, quantity: u32, intent: Option<&str>) -> Value {
    let subtotal = if product_id == CHIPS { 1000.0 } else { 400.0 } * f64::from(quantity);
    let shipping = if subtotal > 2500.0 { 0.0 } else { 250.0 };
    let tax = subtotal * 0.05;
    let mut body = json!({
        "cartItems": [{ "productId": product_id, "quantity": quantity }],
        "formData": {
            "fullName": "Nimal Perera",
            "email": "nimal@example.com",
            "phone": "0771234567",
            "address": "12 Galle Road",
            "city": "Colombo"
        },
        "subtotal": subtotal,
        "shipping": shipping,
        "tax": tax,
        "total": subtotal + shipping + tax
    });
    if let Some(intent) = intent {
        body["paymentIntentId"] = json!(intent);
    }
    body
}

fn staff_token(role: &str) -> String {
    let claims = StaffClaims {
        sub: "staff-7".to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

#[actix_web::test]
async fn products_can_be_searched_by_keyword() {
    let backend = Backend::new(false);
    let app = app!(backend);

    let req = test::TestRequest::get().uri("/api/v1/products?keyword=pet").to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["products"].as_array().unwrap().len(), 1);
    assert_eq!(body["products"][0]["_id"], CHIPS);
    assert_eq!(body["products"][0]["stock"], 5);

    let req = test::TestRequest::get().uri("/api/v1/products").to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["products"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn unknown_product_is_not_found() {
    let backend = Backend::new(false);
    let app = app!(backend);

    let req = test::TestRequest::get()
        .uri("/api/v1/product/65f1c0ffee00000000000999")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_of(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unable to get product with that id");
}

#[actix_web::test]
async fn paid_order_is_placed_and_stock_taken() {
    let backend = Backend::new(true);
    let app = app!(backend);

    let req = test::TestRequest::post()
        .uri("/api/v1/payment")
        .set_json(json!({ "amount": 315000 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let payment = json_of(resp).await;
    assert_eq!(payment["success"], true);
    let intent = payment["paymentIntentId"].as_str().unwrap().to_string();
    let secret = payment["clientSecret"].as_str().unwrap();
    backend.gateway.confirm(secret).await.unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/order")
        .set_json(order_body(CHIPS, 3, Some(&intent)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_of(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Order placed successfully. Stock updated.");
    assert_eq!(body["order"]["total"], 3150.0);
    assert_eq!(body["order"]["status"], "Processing");
    assert_eq!(body["order"]["items"][0]["qty"], 3);
    assert_eq!(body["order"]["payment"]["intentId"], intent.as_str());
    assert_eq!(backend.catalog.stock_of(CHIPS).await, Some(2));

    // The same payment cannot pay for a second order.
    let req = test::TestRequest::post()
        .uri("/api/v1/order")
        .set_json(order_body(CHIPS, 2, Some(&intent)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(backend.catalog.stock_of(CHIPS).await, Some(2));
}

#[actix_web::test]
async fn unpaid_order_is_refused_when_payment_required() {
    let backend = Backend::new(true);
    let app = app!(backend);

    let req = test::TestRequest::post()
        .uri("/api/v1/order")
        .set_json(order_body(CHIPS, 1, None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(backend.orders.is_empty().await);
    assert_eq!(backend.catalog.stock_of(CHIPS).await, Some(5));
}

#[actix_web::test]
async fn stock_conflict_reports_every_issue() {
    let backend = Backend::new(false);
    let app = app!(backend);

    let mut body = order_body(CHIPS, 6, None);
    body["cartItems"] = json!([
        { "productId": CHIPS, "quantity": 6 },
        { "product": { "_id": "65f1c0ffee00000000000999" }, "qty": 1 }
    ]);
    let req = test::TestRequest::post().uri("/api/v1/order").set_json(body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = json_of(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Stock issues found");
    let issues = body["stockIssues"].as_array().unwrap();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0]["productId"], CHIPS);
    assert_eq!(issues[0]["available"], 5);
    assert_eq!(issues[0]["requested"], 6);
    assert_eq!(issues[1]["error"], "Product not found");
    assert_eq!(backend.catalog.stock_of(CHIPS).await, Some(5));
}

#[actix_web::test]
async fn malformed_body_gets_error_envelope() {
    let backend = Backend::new(false);
    let app = app!(backend);

    let req = test::TestRequest::post()
        .uri("/api/v1/order")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"cartItems\": [")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(resp).await["success"], false);
}

#[actix_web::test]
async fn order_list_is_paged_and_clamped() {
    let backend = Backend::new(false);
    let app = app!(backend);

    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/v1/order")
            .set_json(order_body(GRANULES, 1, None))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::get().uri("/api/v1/order?page=2&limit=2").to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({ "totalPages": 2, "currentPage": 2, "totalOrders": 3, "limit": 2 })
    );

    let req = test::TestRequest::get().uri("/api/v1/order?page=0&limit=500").to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["pagination"]["currentPage"], 1);
    assert_eq!(body["pagination"]["limit"], 100);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let req = test::TestRequest::get()
        .uri("/api/v1/order?customerEmail=someone-else@example.com")
        .to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["pagination"]["totalOrders"], 0);

    let req = test::TestRequest::get().uri("/api/v1/order?status=Lost").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn out_of_range_page_is_a_bad_request() {
    let backend = Backend::new(false);
    let app = app!(backend);

    let req = test::TestRequest::get()
        .uri("/api/v1/order?page=9223372036854775807&limit=100")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_of(resp).await;
    assert_eq!(body["success"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/order?page=9223372036854775807&limit=1")
        .to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["success"], true);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn cancel_restocks_and_cannot_repeat() {
    let backend = Backend::new(false);
    let app = app!(backend);

    let req = test::TestRequest::post()
        .uri("/api/v1/order")
        .set_json(order_body(CHIPS, 2, None))
        .to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    let id = body["order"]["_id"].as_str().unwrap().to_string();
    assert_eq!(backend.catalog.stock_of(CHIPS).await, Some(3));

    let req = test::TestRequest::delete().uri(&format!("/api/v1/order/{id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_of(resp).await;
    assert_eq!(body["order"]["status"], "Cancelled");
    assert_eq!(backend.catalog.stock_of(CHIPS).await, Some(5));

    let req = test::TestRequest::get().uri("/api/v1/order").to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    assert_eq!(body["pagination"]["totalOrders"], 0);

    let req = test::TestRequest::delete().uri(&format!("/api/v1/order/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(backend.catalog.stock_of(CHIPS).await, Some(5));
}

#[actix_web::test]
async fn payment_endpoint_validates_and_reports_processor_errors() {
    let backend = Backend::new(true);
    let app = app!(backend);

    let req = test::TestRequest::post()
        .uri("/api/v1/payment")
        .set_json(json!({ "amount": 0 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    backend.gateway.fail_with("Amount must convert to at least 50 cents").await;
    let req = test::TestRequest::post()
        .uri("/api/v1/payment")
        .set_json(json!({ "amount": 10, "currency": "usd" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_of(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Amount must convert to at least 50 cents");
}

#[actix_web::test]
async fn status_updates_need_an_admin_token() {
    let backend = Backend::new(false);
    let app = app!(backend);

    let req = test::TestRequest::post()
        .uri("/api/v1/order")
        .set_json(order_body(GRANULES, 1, None))
        .to_request();
    let body = json_of(test::call_service(&app, req).await).await;
    let id = body["order"]["_id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/order/{id}/status");

    let req = test::TestRequest::patch()
        .uri(&uri)
        .set_json(json!({ "status": "Shipped" }))
        .to_request();
    let status = match app.call(req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::patch()
        .uri(&uri)
        .insert_header(("Authorization", format!("Bearer {}", staff_token(ADMIN_ROLE))))
        .set_json(json!({ "status": "Shipped" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_of(resp).await["order"]["status"], "Shipped");

    // Shipped orders are past cancelling.
    let req = test::TestRequest::delete().uri(&format!("/api/v1/order/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
}
