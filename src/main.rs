use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use log::{error, info};

use polymart::config::Config;
use polymart::payment::StripeGateway;
use polymart::placement::PlacementPolicy;
use polymart::store::mongo::{MongoCatalog, MongoOrders};
use polymart::{db, routes, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let database = match db::connect(&config).await {
        Ok(database) => database,
        Err(e) => {
            error!("Failed to connect to MongoDB: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = db::prepare(&database).await {
        error!("Failed to prepare collections: {}", e);
        std::process::exit(1);
    }

    let state = web::Data::new(AppState {
        catalog: Arc::new(MongoCatalog::new(&database)),
        orders: Arc::new(MongoOrders::new(&database)),
        payments: Arc::new(StripeGateway::new(
            config.stripe_api_base.clone(),
            config.stripe_secret_key.clone(),
        )),
        policy: PlacementPolicy {
            require_payment: config.require_payment,
            currency: config.currency.clone(),
            pricing: config.pricing,
        },
    });
    if !config.require_payment {
        info!("REQUIRE_PAYMENT is off: orders are accepted without a payment reference");
    }

    let jwt_secret = config.jwt_secret.clone();
    info!("Listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(|cfg| routes(cfg, &jwt_secret))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
