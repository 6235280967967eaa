use log::info;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};

use crate::config::Config;
use crate::models::{Order, Product};

pub const PRODUCTS: &str = "products";
pub const ORDERS: &str = "orders";

pub async fn connect(config: &Config) -> Result<Database, mongodb::error::Error> {
    let mut client_options = ClientOptions::parse(&config.database_url).await?;
    client_options.app_name = Some("polymart".to_string());

    let client = Client::with_options(client_options)?;
    let database = client.database(&config.database_name);
    database.run_command(doc! { "ping": 1 }, None).await?;
    info!("Connected to MongoDB database {}", config.database_name);
    Ok(database)
}

/// Creates indexes and converts numbers that older documents stored as text.
pub async fn prepare(database: &Database) -> Result<(), mongodb::error::Error> {
    let orders = database.collection::<Order>(ORDERS);
    let order_indexes = vec![
        IndexModel::builder().keys(doc! { "createdAt": -1 }).build(),
        IndexModel::builder().keys(doc! { "customerInfo.email": 1 }).build(),
        IndexModel::builder().keys(doc! { "status": 1 }).build(),
        IndexModel::builder()
            .keys(doc! { "payment.intentId": 1 })
            .options(IndexOptions::builder().unique(true).sparse(true).build())
            .build(),
    ];
    orders.create_indexes(order_indexes, None).await?;

    let products = database.collection::<Product>(PRODUCTS);
    products
        .create_index(IndexModel::builder().keys(doc! { "name": 1 }).build(), None)
        .await?;

    let migrated = database
        .collection::<Document>(PRODUCTS)
        .update_many(legacy_number_filter(), legacy_number_pipeline(), None)
        .await?;
    if migrated.modified_count > 0 {
        info!("Converted text numbers on {} product(s)", migrated.modified_count);
    }
    Ok(())
}

const NUMERIC_FIELDS: [(&str, &str); 4] = [
    ("price", "double"),
    ("stock", "int"),
    ("ratings", "double"),
    ("numOfReviews", "int"),
];

fn legacy_number_filter() -> Document {
    let clauses: Vec<Document> = NUMERIC_FIELDS
        .iter()
        .map(|(field, _)| {
            let mut clause = Document::new();
            clause.insert(*field, doc! { "$type": "string" });
            clause
        })
        .collect();
    doc! { "$or": clauses }
}

// Values that do not convert are left as they are and fail loudly on read.
fn legacy_number_pipeline() -> Vec<Document> {
    let mut set = Document::new();
    for (field, to) in NUMERIC_FIELDS {
        let input = format!("${field}");
        set.insert(
            field,
            doc! {
                "$convert": {
                    "input": input.clone(),
                    "to": to,
                    "onError": input.clone(),
                    "onNull": input,
                }
            },
        );
    }
    vec![doc! { "$set": set }]
}
