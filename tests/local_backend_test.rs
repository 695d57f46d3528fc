use httpmock::prelude::*;
use newstore_integrations::config::LocalParameters;
use newstore_integrations::domain::model::{S3Event, S3EventRecord};
use newstore_integrations::domain::ports::Storage;
use newstore_integrations::domain::testing::MemoryWorkflows;
use newstore_integrations::integrations::{csv_split, import_queue, price_import};
use newstore_integrations::{InvocationContext, LocalStorage, NewStoreClient, ParamStore};
use serde_json::json;
use std::io::Read;
use tempfile::TempDir;

fn local_storage(dir: &TempDir) -> LocalStorage {
    LocalStorage::new(dir.path().to_string_lossy().into_owned())
}

#[tokio::test]
async fn test_price_import_on_local_storage() {
    let dir = TempDir::new().unwrap();
    let storage = local_storage(&dir);
    storage
        .write_file("prices", "drop/FAONSPRC_USD_RET_20210428.csv", b"ProductSKU,Price\nSKU1,10\n")
        .await
        .unwrap();
    storage
        .write_file("prices", "drop/FAONSPRC_USD_SAL_20210428.csv", b"ProductSKU,Price\nSKU1,8\n")
        .await
        .unwrap();

    let settings = price_import::Settings {
        bucket: "prices".to_string(),
        s3_prefix: "queued/".to_string(),
        chunk_size: 1000,
        secs_between_chunks: 1,
    };
    let event = S3Event {
        records: vec![S3EventRecord::new(
            "ObjectCreated:Put",
            "prices",
            "drop/FAONSPRC_USD_RET_20210428.csv",
        )],
    };
    let workflows = MemoryWorkflows::new();

    let mut input = price_import::handle(&storage, &workflows, &settings, &event)
        .await
        .unwrap()
        .remove(0);

    // USD has no French catalog: one chunk per file
    let chunks = storage.list_keys("prices", &input.prefix, 10).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(dir
        .path()
        .join("prices/archive/drop/FAONSPRC_USD_SAL_20210428.csv")
        .is_file());

    let file = std::fs::File::open(dir.path().join("prices").join(&chunks[1])).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut json = String::new();
    archive.by_name("prices.json").unwrap().read_to_string(&mut json).unwrap();
    let book: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(book["head"]["pricebook"], "usd-prices");
    assert_eq!(book["items"][0]["value"], 8.0);

    input = import_queue::handle(&storage, input).await;
    assert_eq!(input.continue_, Some(true));
    let released = storage.list_keys("prices", "import_files/", 10).await.unwrap();
    assert_eq!(released.len(), 1);

    let url = storage.presigned_url("prices", &released[0]).await.unwrap();
    assert!(url.starts_with("file://"));
}

#[tokio::test]
async fn test_csv_split_on_local_storage() {
    let dir = TempDir::new().unwrap();
    let storage = local_storage(&dir);
    let csv = "Name,Lineitem sku\n#1,A\n#1,B\n#2,C\n#3,D\n#3,E\n";
    storage
        .write_file("uploads", "orders.csv", csv.as_bytes())
        .await
        .unwrap();

    let settings = csv_split::Settings {
        bucket: "split".to_string(),
        output_location: "pieces/".to_string(),
        row_limit: 2,
        delimiter: b',',
        group_column: Some("Name".to_string()),
    };
    let event = S3Event {
        records: vec![S3EventRecord::new("ObjectCreated:Put", "uploads", "orders.csv")],
    };

    let outcome = csv_split::handle(&storage, &settings, &event).await;
    assert!(outcome.success);

    let pieces = storage.list_keys("split", "pieces/", 10).await.unwrap();
    assert_eq!(pieces, vec!["pieces/001-orders.csv".to_string(), "pieces/002-orders.csv".to_string()]);

    // #1 stays together, the cut moves past row 2 only when the name changes
    let first = String::from_utf8(storage.read_file("split", &pieces[0]).await.unwrap()).unwrap();
    assert_eq!(first.lines().collect::<Vec<_>>(), vec!["Name,Lineitem sku", "#1,A", "#1,B"]);
    let second = String::from_utf8(storage.read_file("split", &pieces[1]).await.unwrap()).unwrap();
    assert_eq!(second.lines().collect::<Vec<_>>(), vec!["Name,Lineitem sku", "#2,C", "#3,D", "#3,E"]);

    assert!(!storage.exists("uploads", "orders.csv").await.unwrap());
    assert!(storage.exists("uploads", "archive/orders.csv").await.unwrap());
}

#[tokio::test]
async fn test_local_parameters_feed_newstore_client() {
    let server = MockServer::start();
    let token = server.mock(|when, then| {
        when.method(POST)
            .path("/v0/token")
            .body_contains("password=from-env");
        then.status(200)
            .json_body(json!({"access_token": "tok", "expires_in": 3600}));
    });

    std::env::set_var("LOCAL_BACKEND_TEST_PASSWORD", "from-env");
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("params.toml");
    std::fs::write(
        &file,
        format!(
            "[parameters]\n\"/frankandoak/x/newstore\" = '{{\"host\": \"{}\", \"username\": \"u\", \"password\": \"${{LOCAL_BACKEND_TEST_PASSWORD}}\"}}'\n",
            server.base_url()
        ),
    )
    .unwrap();

    let params = ParamStore::new(LocalParameters::from_file(&file).unwrap(), "frankandoak", "x");
    let config = params.newstore_config().await.unwrap();
    assert_eq!(config.tenant, "frankandoak");

    let response = NewStoreClient::new(config, InvocationContext::default())
        .auth_request()
        .await
        .unwrap();

    token.assert();
    assert_eq!(response.access_token, "tok");
}
