use httpmock::prelude::*;
use newstore_integrations::config::param_store::NewStoreConfig;
use newstore_integrations::domain::model::{S3Event, S3EventRecord, StepInput};
use newstore_integrations::domain::testing::{MemoryStorage, MemoryWorkflows};
use newstore_integrations::integrations::{import_queue, newstore_import, price_import};
use newstore_integrations::{InvocationContext, NewStoreClient};
use serde_json::{json, Value};
use std::io::Read;

const BUCKET: &str = "frankandoak-imports";
const RETAIL_KEY: &str = "incoming/FAONSPRC_CAD_RET_20210428123211.csv";
const SALE_KEY: &str = "incoming/FAONSPRC_CAD_SAL_20210428123211.csv";

fn settings() -> price_import::Settings {
    price_import::Settings {
        bucket: BUCKET.to_string(),
        s3_prefix: "queued/".to_string(),
        chunk_size: 1,
        secs_between_chunks: 5,
    }
}

fn created(key: &str) -> S3Event {
    S3Event {
        records: vec![S3EventRecord::new("ObjectCreated:Put", BUCKET, key)],
    }
}

fn unzip(data: &[u8]) -> (String, Value) {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
    let mut entry = archive.by_index(0).unwrap();
    let name = entry.name().to_string();
    let mut json = String::new();
    entry.read_to_string(&mut json).unwrap();
    (name, serde_json::from_str(&json).unwrap())
}

async fn seed_price_pair(storage: &MemoryStorage) {
    storage
        .put(BUCKET, RETAIL_KEY, "ProductSKU,Price\nSKU1,49.99\nSKU2,20\n")
        .await;
    storage
        .put(BUCKET, SALE_KEY, "ProductSKU,Price\nSKU1,39.99\nSKU2,0\n")
        .await;
}

#[tokio::test]
async fn test_end_to_end_price_pair_to_queued_chunks() {
    let storage = MemoryStorage::new();
    let workflows = MemoryWorkflows::new();
    seed_price_pair(&storage).await;

    let started = price_import::handle(&storage, &workflows, &settings(), &created(SALE_KEY))
        .await
        .unwrap();
    assert_eq!(started.len(), 1);

    let input = &started[0];
    assert!(input.prefix.starts_with("queued/prices/msrp/"));
    assert_eq!(input.chunk_prefix, "queued/");
    assert_eq!(input.dest_bucket, BUCKET);
    assert_eq!(input.dest_prefix, "import_files/");
    assert_eq!(input.secs_between_chunks, 5);

    // RET: 2 items in en and fr, SAL: 1 item in en and fr
    let keys = storage.keys(BUCKET).await;
    let chunks: Vec<&String> = keys.iter().filter(|k| k.starts_with(&input.prefix)).collect();
    assert_eq!(chunks.len(), 6);
    assert_eq!(*chunks[0], format!("{}-001.zip", input.prefix));
    assert_eq!(*chunks[5], format!("{}-006.zip", input.prefix));

    let (entry, first) = unzip(&storage.get(BUCKET, chunks[0]).await.unwrap());
    assert_eq!(entry, "prices.json");
    assert_eq!(first["head"]["pricebook"], "default");
    assert_eq!(first["head"]["catalog"], "storefront-catalog-en");
    assert_eq!(first["items"], json!([{"product_id": "SKU1", "value": 49.99}]));

    let (_, last) = unzip(&storage.get(BUCKET, chunks[5]).await.unwrap());
    assert_eq!(last["head"]["catalog"], "storefront-catalog-fr");
    assert_eq!(last["items"], json!([{"product_id": "SKU1", "value": 39.99}]));

    assert!(storage.get(BUCKET, RETAIL_KEY).await.is_none());
    assert!(storage.get(BUCKET, &format!("archive/{}", RETAIL_KEY)).await.is_some());
    assert!(storage.get(BUCKET, &format!("archive/{}", SALE_KEY)).await.is_some());

    let executions = workflows.executions().await;
    assert_eq!(executions.len(), 1);
    let queued: StepInput = serde_json::from_str(&executions[0]).unwrap();
    assert_eq!(&queued, input);
}

#[tokio::test]
async fn test_half_a_pair_waits_for_its_sibling() {
    let storage = MemoryStorage::new();
    let workflows = MemoryWorkflows::new();
    storage
        .put(BUCKET, RETAIL_KEY, "ProductSKU,Price\nSKU1,49.99\n")
        .await;

    let started = price_import::handle(&storage, &workflows, &settings(), &created(RETAIL_KEY))
        .await
        .unwrap();

    assert!(started.is_empty());
    assert!(workflows.executions().await.is_empty());
    assert_eq!(storage.keys(BUCKET).await, vec![RETAIL_KEY.to_string()]);
}

#[tokio::test]
async fn test_import_queue_releases_chunks_in_order() {
    let storage = MemoryStorage::new();
    let workflows = MemoryWorkflows::new();
    seed_price_pair(&storage).await;

    let mut input = price_import::handle(&storage, &workflows, &settings(), &created(RETAIL_KEY))
        .await
        .unwrap()
        .remove(0);
    let suffix = input.prefix.trim_start_matches("queued/").to_string();

    let mut rounds = 0;
    loop {
        input = import_queue::handle(&storage, input).await;
        rounds += 1;
        if input.continue_ != Some(true) {
            break;
        }
        let released = format!("import_files/{}-{:03}.zip", suffix, rounds);
        assert!(storage.get(BUCKET, &released).await.is_some(), "missing {}", released);
    }

    // six moves plus the round that finds nothing left
    assert_eq!(rounds, 7);
    assert_eq!(input.continue_, Some(false));
    let keys = storage.keys(BUCKET).await;
    assert!(!keys.iter().any(|k| k.starts_with("queued/")));
    assert_eq!(keys.iter().filter(|k| k.starts_with("import_files/")).count(), 6);
}

#[tokio::test]
async fn test_released_chunk_becomes_newstore_import() {
    let server = MockServer::start();
    let token = server.mock(|when, then| {
        when.method(POST).path("/v0/token");
        then.status(200)
            .json_body(json!({"access_token": "tok", "expires_in": 3600}));
    });
    let received = server.mock(|when, then| {
        when.method(GET)
            .path("/v0/d/import")
            .query_param("state", "received");
        then.status(200).json_body(json!({"items": []}));
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/v0/d/import")
            .header("authorization", "Bearer tok")
            .body_contains(r#""provider":"netsuite""#)
            .body_contains(r#""entities":["prices"]"#);
        then.status(201).json_body(json!({"id": "imp-1"}));
    });
    let start = server.mock(|when, then| {
        when.method(POST)
            .path("/v0/d/import/imp-1/start")
            .body_contains("import_files/prices/msrp/chunk-001.zip");
        then.status(200).json_body(json!({"state": "started"}));
    });

    let storage = MemoryStorage::new();
    let key = "import_files/prices/msrp/chunk-001.zip";
    storage.put(BUCKET, key, vec![0u8; 4]).await;

    let client = NewStoreClient::new(
        NewStoreConfig {
            host: server.base_url(),
            tenant: "frankandoak".to_string(),
            username: "integrations@frankandoak.com".to_string(),
            password: "secret".to_string(),
        },
        InvocationContext::default(),
    );
    let settings = newstore_import::Settings {
        provider: "netsuite".to_string(),
        entities: vec!["prices".to_string()],
    };
    let event = S3Event {
        records: vec![
            S3EventRecord::new("ObjectCreated:Copy", BUCKET, key),
            S3EventRecord::new("ObjectRemoved:Delete", BUCKET, key),
        ],
    };

    let imports = newstore_import::handle(&storage, &client, &settings, &event)
        .await
        .unwrap();

    assert_eq!(imports, vec!["imp-1".to_string()]);
    token.assert_hits(1);
    received.assert();
    create.assert();
    start.assert();
}
