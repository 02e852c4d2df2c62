//! Pipeline integration tests

use std::sync::Arc;

use async_trait::async_trait;
use data_normalization_sdk::llm::SchemaProposer;
use data_normalization_sdk::pipeline::{
    IngestMode, LAST_RUN_CONFIG, PipelineConfig, PipelineError, PipelineExecutor, RunStatus,
};
use data_normalization_sdk::source::CsvRowSource;
use data_normalization_sdk::{
    MemoryStorageBackend, Row, SchemaPlan, SchemaPlanError, StorageBackend, StorageError,
    TableSchema,
};
use serde_json::{Value, json};

const ORDERS_CSV: &str = "\
OrderID,Customer,Product,Quantity,Price
1,Ann,Pen,2,1.5
1,Ann,Book,1,10
2,Bob,Pen,5,1.5
3,Ann,Pen,1,1.5
";

/// customers <- orders <- order_items -> products, declared children first
fn orders_plan() -> SchemaPlan {
    SchemaPlan::new()
        .with_table(
            TableSchema::new("order_items")
                .with_columns(["OrderID", "Product", "Quantity", "generated_id"])
                .with_natural_key(["OrderID", "Product"])
                .with_foreign_key("OrderID", "orders", "generated_id")
                .with_foreign_key("Product", "products", "generated_id"),
        )
        .with_table(
            TableSchema::new("orders")
                .with_columns(["OrderID", "Customer", "generated_id"])
                .with_natural_key(["OrderID"])
                .with_foreign_key("Customer", "customers", "generated_id"),
        )
        .with_table(
            TableSchema::new("products")
                .with_columns(["Product", "Price", "generated_id"])
                .with_natural_key(["Product"]),
        )
        .with_table(
            TableSchema::new("customers")
                .with_columns(["Customer", "generated_id"])
                .with_natural_key(["Customer"]),
        )
}

fn orders_source() -> CsvRowSource {
    CsvRowSource::from_bytes("orders", ORDERS_CSV)
}

fn executor(storage: Arc<dyn StorageBackend>, config: PipelineConfig) -> PipelineExecutor {
    PipelineExecutor::new(config, storage)
        .unwrap()
        .with_schema_plan(orders_plan())
}

fn column(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter().map(|r| r[name].clone()).collect()
}

#[tokio::test]
async fn test_end_to_end_normalization() {
    let storage = Arc::new(MemoryStorageBackend::new());
    let report = executor(storage.clone(), PipelineConfig::default())
        .run(&orders_source())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.rows_parsed, 4);
    assert_eq!(report.headers, vec!["OrderID", "Customer", "Product", "Quantity", "Price"]);

    let order = &report.table_order;
    let pos = |name: &str| order.iter().position(|t| t == name).unwrap();
    assert!(pos("customers") < pos("orders"));
    assert!(pos("orders") < pos("order_items"));
    assert!(pos("products") < pos("order_items"));

    let customers = storage.load_rows("customers").await.unwrap();
    assert_eq!(column(&customers, "Customer"), vec![json!("Ann"), json!("Bob")]);
    assert_eq!(
        column(&customers, "generated_id"),
        vec![json!("customers_1"), json!("customers_2")]
    );

    let orders = storage.load_rows("orders").await.unwrap();
    assert_eq!(
        column(&orders, "Customer"),
        vec![json!("customers_1"), json!("customers_2"), json!("customers_1")]
    );

    let products = storage.load_rows("products").await.unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[1]["Price"], json!(10));

    let items = storage.load_rows("order_items").await.unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[0]["OrderID"], json!("orders_1"));
    assert_eq!(items[1]["Product"], json!("products_2"));
    assert_eq!(items[2]["OrderID"], json!("orders_2"));
    assert_eq!(items[2]["Quantity"], json!(5));
    for item in &items {
        let keys: Vec<&String> = item.keys().collect();
        assert_eq!(keys, vec!["OrderID", "Product", "Quantity", "generated_id"]);
    }

    let plan = storage.load_schema_plan().await.unwrap().unwrap();
    assert_eq!(plan.len(), 4);
    assert_eq!(report.table_stats("order_items").unwrap().unresolved_foreign_keys, 0);
}

#[tokio::test]
async fn test_second_append_run_adds_nothing() {
    let storage = Arc::new(MemoryStorageBackend::new());
    let exec = executor(storage.clone(), PipelineConfig::default());

    exec.run(&orders_source()).await.unwrap();
    let second = exec.run(&orders_source()).await.unwrap();

    for stats in &second.tables {
        assert_eq!(stats.unique_rows, 0, "{} gained rows", stats.table);
        assert_eq!(stats.already_stored + stats.duplicates_dropped, stats.input_rows);
    }
    assert_eq!(storage.load_rows("customers").await.unwrap().len(), 2);
    assert_eq!(storage.load_rows("order_items").await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_append_continues_ids() {
    let storage = Arc::new(MemoryStorageBackend::new());
    let exec = executor(storage.clone(), PipelineConfig::default());
    exec.run(&orders_source()).await.unwrap();

    let more = CsvRowSource::from_bytes(
        "more_orders",
        "OrderID,Customer,Product,Quantity,Price\n4,Cara,Pen,3,1.5\n",
    );
    exec.run(&more).await.unwrap();

    let customers = storage.load_rows("customers").await.unwrap();
    assert_eq!(customers.len(), 3);
    assert_eq!(customers[2]["generated_id"], json!("customers_3"));

    let items = storage.load_rows("order_items").await.unwrap();
    let last = items.last().unwrap();
    assert_eq!(last["OrderID"], json!("orders_4"));
    // Existing product resolves through the rebuilt lookup map
    assert_eq!(last["Product"], json!("products_1"));
}

#[tokio::test]
async fn test_replace_mode_rewrites_tables() {
    let storage = Arc::new(MemoryStorageBackend::new());
    let config = PipelineConfig::default().with_ingest_mode(IngestMode::Replace);
    let exec = executor(storage.clone(), config);

    exec.run(&orders_source()).await.unwrap();
    let second = exec.run(&orders_source()).await.unwrap();

    assert_eq!(second.table_stats("customers").unwrap().unique_rows, 2);
    let customers = storage.load_rows("customers").await.unwrap();
    assert_eq!(
        column(&customers, "generated_id"),
        vec![json!("customers_1"), json!("customers_2")]
    );
}

struct UnavailableProposer;

#[async_trait]
impl SchemaProposer for UnavailableProposer {
    async fn propose(&self, _headers: &[String]) -> Result<SchemaPlan, SchemaPlanError> {
        Err(SchemaPlanError::ProposalFailed("model unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_fallback_single_table() {
    let storage = Arc::new(MemoryStorageBackend::new());
    let config = PipelineConfig::default().with_fallback_table("imported");
    let exec = PipelineExecutor::new(config, storage.clone())
        .unwrap()
        .with_proposer(Arc::new(UnavailableProposer));

    let report = exec.run(&orders_source()).await.unwrap();

    assert_eq!(report.fallback_table.as_deref(), Some("imported"));
    assert_eq!(storage.list_tables().await.unwrap(), vec!["imported"]);
    let rows = storage.load_rows("imported").await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["Customer"], json!("Ann"));
    assert!(storage.load_schema_plan().await.unwrap().is_none());
    assert!(report.states.iter().any(|s| s.name() == "manual_single_table"));
}

#[tokio::test]
async fn test_invalid_plan_does_not_fall_back() {
    let storage = Arc::new(MemoryStorageBackend::new());
    let config = PipelineConfig::default().with_fallback_table("imported");
    let cyclic = SchemaPlan::new()
        .with_table(
            TableSchema::new("a")
                .with_columns(["key", "b_id", "generated_id"])
                .with_natural_key(["key"])
                .with_foreign_key("b_id", "b", "generated_id"),
        )
        .with_table(
            TableSchema::new("b")
                .with_columns(["key", "a_id", "generated_id"])
                .with_natural_key(["key"])
                .with_foreign_key("a_id", "a", "generated_id"),
        );
    let exec = PipelineExecutor::new(config, storage.clone())
        .unwrap()
        .with_schema_plan(cyclic);

    let err = exec.run(&orders_source()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SchemaPlan(SchemaPlanError::Cycle(_))));
    assert!(storage.list_tables().await.unwrap().is_empty());
}

/// Memory storage that refuses writes to one table
struct RejectingStorage {
    inner: MemoryStorageBackend,
    reject: &'static str,
}

#[async_trait]
impl StorageBackend for RejectingStorage {
    async fn list_tables(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list_tables().await
    }

    async fn save_rows(&self, table: &str, rows: &[Row]) -> Result<(), StorageError> {
        if table == self.reject {
            return Err(StorageError::IoError(format!("disk full writing {table}")));
        }
        self.inner.save_rows(table, rows).await
    }

    async fn load_rows(&self, table: &str) -> Result<Vec<Row>, StorageError> {
        self.inner.load_rows(table).await
    }

    async fn delete_table(&self, table: &str) -> Result<(), StorageError> {
        self.inner.delete_table(table).await
    }

    async fn save_schema_plan(&self, plan: &SchemaPlan) -> Result<(), StorageError> {
        self.inner.save_schema_plan(plan).await
    }

    async fn load_schema_plan(&self) -> Result<Option<SchemaPlan>, StorageError> {
        self.inner.load_schema_plan().await
    }

    async fn save_config(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.inner.save_config(key, value).await
    }

    async fn load_config(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.load_config(key).await
    }
}

#[tokio::test]
async fn test_failure_keeps_completed_tables() {
    let storage = Arc::new(RejectingStorage {
        inner: MemoryStorageBackend::new(),
        reject: "orders",
    });
    let exec = executor(storage.clone(), PipelineConfig::default());

    let err = exec.run(&orders_source()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));

    let tables = storage.list_tables().await.unwrap();
    assert!(tables.contains(&"customers".to_string()));
    assert!(!tables.contains(&"order_items".to_string()));
    assert!(storage.load_schema_plan().await.unwrap().is_none());

    let last_run = storage.load_config(LAST_RUN_CONFIG).await.unwrap().unwrap();
    assert_eq!(last_run["status"], json!("failed"));
    assert!(last_run["error"].as_str().unwrap().contains("disk full"));
}

#[tokio::test]
async fn test_last_run_recorded_on_success() {
    let storage = Arc::new(MemoryStorageBackend::new());
    let report = executor(storage.clone(), PipelineConfig::default())
        .run(&orders_source())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    let last_run = storage.load_config(LAST_RUN_CONFIG).await.unwrap().unwrap();
    assert_eq!(last_run["run_id"], json!(report.run_id));
    assert_eq!(last_run["status"], json!("completed"));
}

#[tokio::test]
async fn test_csv_file_through_pipeline() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("orders.csv");
    std::fs::write(&path, ORDERS_CSV.replace(',', ";")).unwrap();

    let storage = Arc::new(MemoryStorageBackend::new());
    let source = CsvRowSource::from_path(&path).with_delimiter(b';');
    let report = executor(storage.clone(), PipelineConfig::default())
        .run(&source)
        .await
        .unwrap();

    assert_eq!(report.source, "orders");
    assert_eq!(storage.load_rows("order_items").await.unwrap().len(), 4);
}
