//! E-commerce catalog: operational order and product tables copied to bronze,
//! cleaned and joined in silver, summarized in gold and loaded into the
//! warehouse schema `ecom`.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Int64Array};
use arrow::datatypes::DataType;
use chrono::{NaiveDate, NaiveDateTime};
use medallion_utils::error::Error;
use medallion_utils::{MedallionResult, Table};

use crate::asset::definition::{AdapterRef, WarehouseTarget};
use crate::asset::key::{AssetKey, Layer};
use crate::builder::{AssetBuilder, BuildError};
use crate::dag::registry::AssetRegistry;
use crate::engine::Adapters;
use crate::transforms::relational::{self, Aggregate, Fill};
use crate::transforms::traits::{AssetInputs, FnTransform, Passthrough};

pub const DOMAIN: &str = "ecom";

pub const ORDERS: &str = "olist_orders_dataset";
pub const ORDER_ITEMS: &str = "olist_order_items_dataset";
pub const ORDER_PAYMENTS: &str = "olist_order_payments_dataset";
pub const ORDER_REVIEWS: &str = "olist_order_reviews_dataset";
pub const PRODUCTS: &str = "olist_products_dataset";
pub const CATEGORY_TRANSLATION: &str = "product_category_name_translation";

pub const SOURCE_TABLES: [&str; 6] = [
    ORDER_ITEMS,
    ORDERS,
    PRODUCTS,
    CATEGORY_TRANSLATION,
    ORDER_REVIEWS,
    ORDER_PAYMENTS,
];

pub const SILVER_ORDERS: &str = "silver_olist_orders";
pub const SILVER_REVIEWS: &str = "silver_olist_reviews";
pub const SILVER_CUSTOMERS: &str = "silver_olist_customers";
pub const SILVER_PRODUCTS: &str = "silver_olist_products";
pub const SILVER_PRODUCTS_SALES: &str = "silver_olist_products_sales";
pub const SILVER_LAST_PURCHASE: &str = "silver_customer_last_purchase";

pub const GOLD_REVIEW_SUMMARY: &str = "gold_customer_review_summary";
pub const GOLD_TRANSACTIONS: &str = "gold_transactions_with_order_items";
pub const GOLD_MONTHLY_SALES: &str = "gold_monthly_product_sales_summary";
pub const GOLD_CHURN: &str = "gold_customer_churn";

pub const WAREHOUSE_REVIEW_SUMMARY: &str = "warehouse_customer_review_summary";
pub const WAREHOUSE_TRANSACTIONS: &str = "warehouse_transactions_with_order_items";
pub const WAREHOUSE_MONTHLY_SALES: &str = "warehouse_monthly_product_sales_summary";
pub const WAREHOUSE_CHURN: &str = "warehouse_customer_churn";

pub const SUMMARY_TABLE: &str = "warehouse_customer_review_summary";
pub const SUMMARY_COLUMNS: [&str; 5] = [
    "customer_id",
    "total_orders",
    "total_reviews",
    "average_review_score",
    "total_spent",
];

pub const TRANSACTIONS_TABLE: &str = "transactions_with_order_items";
pub const TRANSACTIONS_COLUMNS: [&str; 2] = ["order_id", "list_of_products"];

pub const MONTHLY_SALES_TABLE: &str = "monthly_product_sales_summary";
pub const MONTHLY_SALES_COLUMNS: [&str; 4] = [
    "sales_month",
    "product_category",
    "total_sales_value",
    "total_products_sold",
];

pub const CHURN_TABLE: &str = "warehouse_customer_churn";
pub const CHURN_COLUMNS: [&str; 7] = [
    "customer_id",
    "total_orders",
    "total_spent",
    "average_review_score",
    "last_purchase_timestamp",
    "days_since_last_purchase",
    "churn",
];

/// Customers idle for more than this many days before the latest purchase churned.
pub const CHURN_AFTER_DAYS: f64 = 180.0;

const WHITESPACE: &str = " \t\r\n";

pub fn source_key(table: &str) -> AssetKey {
    AssetKey::layered(Layer::Source, DOMAIN, table)
}

/// Raw copy of an operational table, e.g. `bronze/ecom/olist_orders_dataset_asset`.
pub fn bronze_key(table: &str) -> AssetKey {
    AssetKey::layered(Layer::Bronze, DOMAIN, format!("{table}_asset"))
}

pub fn silver_key(name: &str) -> AssetKey {
    AssetKey::layered(Layer::Silver, DOMAIN, name)
}

pub fn gold_key(name: &str) -> AssetKey {
    AssetKey::layered(Layer::Gold, DOMAIN, name)
}

pub fn warehouse_key(name: &str) -> AssetKey {
    AssetKey::layered(Layer::Warehouse, DOMAIN, name)
}

type TransformFn = fn(&AssetInputs) -> MedallionResult<Table>;

/// Register every asset of the catalog against `adapters`.
pub fn register_all(registry: &mut AssetRegistry, adapters: &Adapters) -> Result<(), BuildError> {
    for table in SOURCE_TABLES {
        registry.register(
            AssetBuilder::new(source_key(table))
                .layer(Layer::Source)
                .adapter(AdapterRef::source(adapters.source.clone(), format!("SELECT * FROM {table}")))
                .description(format!("Operational table {table}"))
                .build()?,
        )?;
        registry.register(
            AssetBuilder::new(bronze_key(table))
                .layer(Layer::Bronze)
                .upstream(source_key(table))
                .transform(Passthrough)
                .adapter(AdapterRef::object(adapters.objects.clone()))
                .description(format!("Raw copy of {table}"))
                .build()?,
        )?;
    }

    let silver: [(&str, Vec<AssetKey>, TransformFn, &str); 6] = [
        (
            SILVER_ORDERS,
            vec![bronze_key(ORDER_ITEMS), bronze_key(ORDERS), bronze_key(ORDER_PAYMENTS)],
            silver_orders,
            "Ordered items with their order and payment",
        ),
        (
            SILVER_REVIEWS,
            vec![bronze_key(ORDER_REVIEWS)],
            silver_reviews,
            "Reviews with a comment, deduplicated",
        ),
        (
            SILVER_CUSTOMERS,
            vec![bronze_key(ORDERS)],
            silver_customers,
            "Dimension table for customers",
        ),
        (
            SILVER_PRODUCTS,
            vec![bronze_key(PRODUCTS), bronze_key(CATEGORY_TRANSLATION)],
            silver_products,
            "Products with their English category name",
        ),
        (
            SILVER_PRODUCTS_SALES,
            vec![
                bronze_key(ORDER_ITEMS),
                bronze_key(PRODUCTS),
                bronze_key(CATEGORY_TRANSLATION),
                bronze_key(ORDERS),
            ],
            silver_products_sales,
            "Sold items with category, order status and sales value",
        ),
        (
            SILVER_LAST_PURCHASE,
            vec![bronze_key(ORDERS)],
            silver_last_purchase,
            "Latest purchase per customer",
        ),
    ];
    for (name, upstreams, transform, description) in silver {
        register_object(registry, adapters, silver_key(name), Layer::Silver, upstreams, transform, description)?;
    }

    let gold: [(&str, Vec<AssetKey>, TransformFn, &str); 4] = [
        (
            GOLD_REVIEW_SUMMARY,
            vec![silver_key(SILVER_ORDERS), silver_key(SILVER_REVIEWS)],
            gold_review_summary,
            "Orders, reviews and spend per customer",
        ),
        (
            GOLD_TRANSACTIONS,
            vec![silver_key(SILVER_ORDERS), silver_key(SILVER_PRODUCTS)],
            gold_transactions,
            "Product categories bought in each order",
        ),
        (
            GOLD_MONTHLY_SALES,
            vec![silver_key(SILVER_PRODUCTS_SALES), silver_key(SILVER_PRODUCTS)],
            gold_monthly_sales,
            "Sales per month and product category",
        ),
        (
            GOLD_CHURN,
            vec![gold_key(GOLD_REVIEW_SUMMARY), silver_key(SILVER_LAST_PURCHASE)],
            gold_churn,
            "Review summary with purchase recency and churn flag",
        ),
    ];
    for (name, upstreams, transform, description) in gold {
        register_object(registry, adapters, gold_key(name), Layer::Gold, upstreams, transform, description)?;
    }

    let loads: [(&str, &str, &str, &[&str], &str); 4] = [
        (
            WAREHOUSE_REVIEW_SUMMARY,
            GOLD_REVIEW_SUMMARY,
            SUMMARY_TABLE,
            &SUMMARY_COLUMNS[..],
            "Customer review summary for reporting",
        ),
        (
            WAREHOUSE_TRANSACTIONS,
            GOLD_TRANSACTIONS,
            TRANSACTIONS_TABLE,
            &TRANSACTIONS_COLUMNS[..],
            "Order contents for reporting",
        ),
        (
            WAREHOUSE_MONTHLY_SALES,
            GOLD_MONTHLY_SALES,
            MONTHLY_SALES_TABLE,
            &MONTHLY_SALES_COLUMNS[..],
            "Monthly sales for reporting",
        ),
        (
            WAREHOUSE_CHURN,
            GOLD_CHURN,
            CHURN_TABLE,
            &CHURN_COLUMNS[..],
            "Customer churn for reporting",
        ),
    ];
    for (name, gold, table, columns, description) in loads {
        registry.register(
            AssetBuilder::new(warehouse_key(name))
                .layer(Layer::Warehouse)
                .upstream(gold_key(gold))
                .transform(Passthrough)
                .adapter(AdapterRef::warehouse(
                    adapters.warehouse.clone(),
                    WarehouseTarget::new(DOMAIN, table, columns.iter().copied()),
                ))
                .description(description)
                .build()?,
        )?;
    }
    Ok(())
}

fn register_object(
    registry: &mut AssetRegistry,
    adapters: &Adapters,
    key: AssetKey,
    layer: Layer,
    upstreams: Vec<AssetKey>,
    transform: TransformFn,
    description: &str,
) -> Result<(), BuildError> {
    registry.register(
        AssetBuilder::new(key)
            .layer(layer)
            .upstreams(upstreams)
            .transform(FnTransform::new(transform))
            .adapter(AdapterRef::object(adapters.objects.clone()))
            .description(description)
            .build()?,
    )?;
    Ok(())
}

fn silver_orders(inputs: &AssetInputs) -> MedallionResult<Table> {
    let items = inputs.get(&bronze_key(ORDER_ITEMS))?;
    let orders = inputs.get(&bronze_key(ORDERS))?;
    let payments = inputs.get(&bronze_key(ORDER_PAYMENTS))?;

    let merged = relational::inner_join(items, orders, &["order_id"])?;
    let merged = relational::inner_join(&merged, payments, &["order_id"])?;
    relational::project(
        &merged,
        &[
            "order_id",
            "customer_id",
            "order_purchase_timestamp",
            "product_id",
            "payment_value",
            "order_status",
        ],
    )
}

fn silver_reviews(inputs: &AssetInputs) -> MedallionResult<Table> {
    let reviews = inputs.get(&bronze_key(ORDER_REVIEWS))?;
    let reviews = relational::drop_columns(reviews, &["review_creation_date", "review_answer_timestamp"])?;
    let reviews = relational::drop_nulls(&reviews, Some(&["review_comment_message"][..]))?;
    let reviews = relational::distinct(&reviews)?;
    relational::rename(
        &reviews,
        &[
            ("review_score", "score"),
            ("review_comment_title", "title"),
            ("review_comment_message", "comment"),
        ],
    )
}

fn silver_customers(inputs: &AssetInputs) -> MedallionResult<Table> {
    let orders = inputs.get(&bronze_key(ORDERS))?;
    relational::distinct(&relational::project(orders, &["customer_id"])?)
}

fn gold_review_summary(inputs: &AssetInputs) -> MedallionResult<Table> {
    let orders = inputs.get(&silver_key(SILVER_ORDERS))?;
    let reviews = inputs.get(&silver_key(SILVER_REVIEWS))?;

    let joined = relational::inner_join(orders, reviews, &["order_id"])?;
    let summary = relational::group_by(
        &joined,
        &["customer_id"],
        &[
            Aggregate::count_distinct("order_id", "total_orders"),
            Aggregate::count("review_id", "total_reviews"),
            Aggregate::avg("score", "average_review_score"),
            Aggregate::sum("payment_value", "total_spent"),
        ],
    )?;
    let summary = relational::sort_by(&summary, &[("customer_id", true)])?;
    let summary = relational::fill_nulls(&summary, "average_review_score", Fill::Float(0.0))?;
    relational::strip_chars(&summary, "customer_id", "\"")
}

fn silver_products(inputs: &AssetInputs) -> MedallionResult<Table> {
    let products = inputs.get(&bronze_key(PRODUCTS))?;
    let translation = inputs.get(&bronze_key(CATEGORY_TRANSLATION))?;

    let merged = relational::inner_join(products, translation, &["product_category_name"])?;
    relational::project(&merged, &["product_id", "product_category_name_english"])
}

fn silver_products_sales(inputs: &AssetInputs) -> MedallionResult<Table> {
    let items = inputs.get(&bronze_key(ORDER_ITEMS))?;
    let products = inputs.get(&bronze_key(PRODUCTS))?;
    let translation = inputs.get(&bronze_key(CATEGORY_TRANSLATION))?;
    let orders = inputs.get(&bronze_key(ORDERS))?;

    let merged = relational::inner_join(items, products, &["product_id"])?;
    let merged = relational::inner_join(&merged, translation, &["product_category_name"])?;
    let merged = relational::inner_join(&merged, orders, &["order_id"])?;
    let sales = relational::project(
        &merged,
        &[
            "order_id",
            "product_id",
            "product_category_name_english",
            "price",
            "freight_value",
            "order_purchase_timestamp",
            "order_status",
        ],
    )?;
    let sales = relational::add_columns(&sales, "price", "freight_value", "total_sales_value")?;
    relational::strip_chars(&sales, "product_id", "\"")
}

fn silver_last_purchase(inputs: &AssetInputs) -> MedallionResult<Table> {
    let orders = inputs.get(&bronze_key(ORDERS))?;
    let last = relational::group_by(
        orders,
        &["customer_id"],
        &[Aggregate::max("order_purchase_timestamp", "last_purchase_timestamp")],
    )?;
    relational::sort_by(&last, &[("customer_id", true)])
}

fn gold_transactions(inputs: &AssetInputs) -> MedallionResult<Table> {
    let orders = inputs.get(&silver_key(SILVER_ORDERS))?;
    let products = inputs.get(&silver_key(SILVER_PRODUCTS))?;

    let joined = relational::inner_join(orders, products, &["product_id"])?;
    let contents = relational::group_by(
        &joined,
        &["order_id"],
        &[Aggregate::group_concat("product_category_name_english", ",", "list_of_products")],
    )?;
    let contents = relational::sort_by(&contents, &[("order_id", true)])?;
    relational::strip_chars(&contents, "list_of_products", WHITESPACE)
}

fn gold_monthly_sales(inputs: &AssetInputs) -> MedallionResult<Table> {
    let sales = inputs.get(&silver_key(SILVER_PRODUCTS_SALES))?;
    let products = inputs.get(&silver_key(SILVER_PRODUCTS))?;

    let sales = relational::project(
        sales,
        &["product_id", "order_purchase_timestamp", "total_sales_value", "price"],
    )?;
    let joined = relational::inner_join(&sales, products, &["product_id"])?;
    let joined = relational::substring(&joined, "order_purchase_timestamp", 0, 7, "sales_month")?;
    let joined = relational::rename(&joined, &[("product_category_name_english", "product_category")])?;
    let summary = relational::group_by(
        &joined,
        &["sales_month", "product_category"],
        &[
            Aggregate::sum("total_sales_value", "total_sales_value"),
            Aggregate::sum("price", "total_products_sold"),
        ],
    )?;
    let summary = relational::sort_by(&summary, &[("sales_month", true), ("product_category", true)])?;
    relational::strip_chars(&summary, "product_category", WHITESPACE)
}

fn gold_churn(inputs: &AssetInputs) -> MedallionResult<Table> {
    let summary = inputs.get(&gold_key(GOLD_REVIEW_SUMMARY))?;
    let last = inputs.get(&silver_key(SILVER_LAST_PURCHASE))?;
    // Summary ids are already unquoted.
    let last = relational::strip_chars(last, "customer_id", "\"")?;

    let latest = parse_timestamps(&last.column("last_purchase_timestamp")?)?
        .into_iter()
        .flatten()
        .max();
    let joined = relational::inner_join(summary, &last, &["customer_id"])?;
    let purchases = parse_timestamps(&joined.column("last_purchase_timestamp")?)?;

    let mut idle_days = Vec::with_capacity(purchases.len());
    let mut churned = Vec::with_capacity(purchases.len());
    for purchase in purchases {
        match (purchase, latest) {
            (Some(purchase), Some(latest)) => {
                let idle = (latest - purchase).num_seconds() as f64 / 86_400.0;
                idle_days.push(Some(idle.trunc() as i64));
                churned.push(Some(i64::from(idle > CHURN_AFTER_DAYS)));
            }
            _ => {
                idle_days.push(None);
                churned.push(Some(0));
            }
        }
    }
    let idle_days: ArrayRef = Arc::new(Int64Array::from(idle_days));
    let joined = relational::with_column(&joined, "days_since_last_purchase", idle_days)?;
    let joined = relational::with_column(&joined, "churn", Arc::new(Int64Array::from(churned)))?;
    relational::project(&joined, &CHURN_COLUMNS)
}

fn parse_timestamps(values: &ArrayRef) -> MedallionResult<Vec<Option<NaiveDateTime>>> {
    if values.data_type() != &DataType::Utf8 {
        return Err(Error::Transformation(format!(
            "expected text timestamps, got {}",
            values.data_type()
        )));
    }
    values
        .as_string::<i32>()
        .iter()
        .map(|v| v.map(parse_timestamp).transpose())
        .collect()
}

fn parse_timestamp(value: &str) -> MedallionResult<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| Error::Transformation(format!("invalid timestamp '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Float64Type, Int64Type, Schema};
    use arrow::record_batch::RecordBatch;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn table(columns: Vec<(&str, ArrayRef)>) -> Table {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, a)| Field::new(*name, a.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, a)| a).collect();
        Table::from_batch(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap())
    }

    fn text(values: &[Option<&str>]) -> ArrayRef {
        Arc::new(StringArray::from(values.to_vec()))
    }

    #[test]
    fn gold_summary_strips_quotes_and_fills_missing_scores() {
        let orders = table(vec![
            ("order_id", text(&[Some("o1"), Some("o2"), Some("o3")])),
            ("customer_id", text(&[Some("\"c2\""), Some("\"c1\""), Some("\"c2\"")])),
            ("payment_value", Arc::new(Float64Array::from(vec![10.0, 20.0, 5.0]))),
        ]);
        let reviews = table(vec![
            ("review_id", text(&[Some("r1"), Some("r2"), Some("r3")])),
            ("order_id", text(&[Some("o1"), Some("o2"), Some("o3")])),
            ("score", Arc::new(Int64Array::from(vec![Some(4), None, Some(2)]))),
        ]);
        let mut inputs = HashMap::new();
        inputs.insert(silver_key(SILVER_ORDERS), orders);
        inputs.insert(silver_key(SILVER_REVIEWS), reviews);

        let summary = gold_review_summary(&AssetInputs::new(inputs)).unwrap();

        assert_eq!(summary.column_names(), SUMMARY_COLUMNS.to_vec());
        let ids = summary.column("customer_id").unwrap();
        let ids: Vec<&str> = ids.as_string::<i32>().iter().flatten().collect();
        assert_eq!(ids, vec!["c1", "c2"]);

        let avg = summary.column("average_review_score").unwrap();
        let avg = avg.as_primitive::<Float64Type>();
        assert_eq!(avg.value(0), 0.0);
        assert_eq!(avg.value(1), 3.0);

        let spent = summary.column("total_spent").unwrap();
        assert_eq!(spent.as_primitive::<Float64Type>().value(1), 15.0);
    }

    #[test]
    fn silver_reviews_drops_uncommented_and_duplicate_rows() {
        let reviews = table(vec![
            ("review_id", text(&[Some("r1"), Some("r1"), Some("r2")])),
            ("order_id", text(&[Some("o1"), Some("o1"), Some("o2")])),
            ("review_score", Arc::new(Int64Array::from(vec![5, 5, 1]))),
            ("review_comment_title", text(&[None, None, Some("meh")])),
            ("review_comment_message", text(&[Some("great"), Some("great"), None])),
            ("review_creation_date", text(&[Some("2018-01-01"), Some("2018-01-01"), Some("2018-01-02")])),
            ("review_answer_timestamp", text(&[Some("2018-01-03"), Some("2018-01-03"), Some("2018-01-04")])),
        ]);
        let mut inputs = HashMap::new();
        inputs.insert(bronze_key(ORDER_REVIEWS), reviews);

        let cleaned = silver_reviews(&AssetInputs::new(inputs)).unwrap();
        assert_eq!(cleaned.num_rows(), 1);
        assert_eq!(cleaned.column_names(), vec!["review_id", "order_id", "score", "title", "comment"]);
    }

    fn floats(values: &[f64]) -> ArrayRef {
        Arc::new(Float64Array::from(values.to_vec()))
    }

    #[test]
    fn churn_measures_idle_days_against_the_latest_purchase() {
        let summary = table(vec![
            ("customer_id", text(&[Some("c1"), Some("c2"), Some("c3")])),
            ("total_orders", Arc::new(Int64Array::from(vec![2, 1, 1]))),
            ("total_reviews", Arc::new(Int64Array::from(vec![2, 1, 1]))),
            ("average_review_score", floats(&[4.5, 1.0, 3.0])),
            ("total_spent", floats(&[30.0, 20.0, 5.0])),
        ]);
        // c4 has no summary row but still sets the latest purchase.
        let last = table(vec![
            ("customer_id", text(&[Some("\"c1\""), Some("\"c2\""), Some("\"c3\""), Some("\"c4\"")])),
            (
                "last_purchase_timestamp",
                text(&[
                    Some("2018-07-01 12:00:00"),
                    Some("2018-01-02 11:00:00"),
                    None,
                    Some("2018-07-15 12:00:00"),
                ]),
            ),
        ]);
        let mut inputs = HashMap::new();
        inputs.insert(gold_key(GOLD_REVIEW_SUMMARY), summary);
        inputs.insert(silver_key(SILVER_LAST_PURCHASE), last);

        let churn = gold_churn(&AssetInputs::new(inputs)).unwrap();
        assert_eq!(churn.column_names(), CHURN_COLUMNS.to_vec());
        let days = churn.column("days_since_last_purchase").unwrap();
        let days: Vec<Option<i64>> = days.as_primitive::<Int64Type>().iter().collect();
        assert_eq!(days, vec![Some(14), Some(194), None]);
        let flags = churn.column("churn").unwrap();
        assert_eq!(flags.as_primitive::<Int64Type>().values().to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn churn_rejects_unparseable_timestamps() {
        let summary = table(vec![("customer_id", text(&[Some("c1")]))]);
        let last = table(vec![
            ("customer_id", text(&[Some("c1")])),
            ("last_purchase_timestamp", text(&[Some("yesterday")])),
        ]);
        let mut inputs = HashMap::new();
        inputs.insert(gold_key(GOLD_REVIEW_SUMMARY), summary);
        inputs.insert(silver_key(SILVER_LAST_PURCHASE), last);
        assert!(gold_churn(&AssetInputs::new(inputs)).is_err());
    }

    #[test]
    fn products_sales_adds_freight_and_drops_untranslated_categories() {
        let items = table(vec![
            ("order_id", text(&[Some("o1"), Some("o1"), Some("o2")])),
            ("product_id", text(&[Some("\"p1\""), Some("p9"), Some("\"p1\"")])),
            ("price", floats(&[10.0, 3.0, 10.0])),
            ("freight_value", floats(&[2.0, 1.0, 2.5])),
        ]);
        let products = table(vec![
            ("product_id", text(&[Some("\"p1\""), Some("p9")])),
            ("product_category_name", text(&[Some("beleza_saude"), Some("sem_traducao")])),
        ]);
        let translation = table(vec![
            ("product_category_name", text(&[Some("beleza_saude")])),
            ("product_category_name_english", text(&[Some("health_beauty")])),
        ]);
        let orders = table(vec![
            ("order_id", text(&[Some("o1"), Some("o2")])),
            ("order_status", text(&[Some("delivered"), Some("shipped")])),
            ("order_purchase_timestamp", text(&[Some("2018-01-01 10:00:00"), Some("2018-02-01 10:00:00")])),
        ]);
        let mut inputs = HashMap::new();
        inputs.insert(bronze_key(ORDER_ITEMS), items);
        inputs.insert(bronze_key(PRODUCTS), products);
        inputs.insert(bronze_key(CATEGORY_TRANSLATION), translation);
        inputs.insert(bronze_key(ORDERS), orders);

        let sales = silver_products_sales(&AssetInputs::new(inputs)).unwrap();
        assert_eq!(sales.num_rows(), 2);
        let ids = sales.column("product_id").unwrap();
        let ids: Vec<&str> = ids.as_string::<i32>().iter().flatten().collect();
        assert_eq!(ids, vec!["p1", "p1"]);
        let totals = sales.column("total_sales_value").unwrap();
        assert_eq!(totals.as_primitive::<Float64Type>().values().to_vec(), vec![12.0, 12.5]);
    }

    #[test]
    fn monthly_sales_group_by_month_and_category() {
        let sales = table(vec![
            ("product_id", text(&[Some("p1"), Some("p2"), Some("p1")])),
            (
                "order_purchase_timestamp",
                text(&[Some("2018-02-03 10:00:00"), Some("2018-01-09 08:00:00"), Some("2018-02-20 09:30:00")]),
            ),
            ("total_sales_value", floats(&[12.0, 23.0, 11.0])),
            ("price", floats(&[10.0, 20.0, 9.0])),
        ]);
        let products = table(vec![
            ("product_id", text(&[Some("p1"), Some("p2")])),
            ("product_category_name_english", text(&[Some("health_beauty "), Some("sports_leisure")])),
        ]);
        let mut inputs = HashMap::new();
        inputs.insert(silver_key(SILVER_PRODUCTS_SALES), sales);
        inputs.insert(silver_key(SILVER_PRODUCTS), products);

        let summary = gold_monthly_sales(&AssetInputs::new(inputs)).unwrap();
        assert_eq!(summary.column_names(), MONTHLY_SALES_COLUMNS.to_vec());
        let months = summary.column("sales_month").unwrap();
        let months: Vec<&str> = months.as_string::<i32>().iter().flatten().collect();
        assert_eq!(months, vec!["2018-01", "2018-02"]);
        let categories = summary.column("product_category").unwrap();
        let categories: Vec<&str> = categories.as_string::<i32>().iter().flatten().collect();
        assert_eq!(categories, vec!["sports_leisure", "health_beauty"]);
        let sold = summary.column("total_products_sold").unwrap();
        assert_eq!(sold.as_primitive::<Float64Type>().values().to_vec(), vec![20.0, 19.0]);
    }
}
