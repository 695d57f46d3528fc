use super::BackfillTransformer;
use crate::clients::NewStoreClient;
use crate::utils::error::{IntegrationError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const VALID_RETURN_CODES: [i64; 6] = [2864, 392, 395, 398, 401, 404];
pub const FALLBACK_RETURN_CODE: i64 = 99;
pub const RETURNED_FROM: &str = "MTLDC1";

const ORDER_BY_EXTERNAL_ID: &str = r#"
query OrderByExternalId($externalId: String!) {
    orders(first: 1, filter: {externalId: {equalTo: $externalId}}) {
        edges {
            node {
                id
            }
        }
    }
}
"#;

/// Codes arrive as numbers or numeric strings; anything unknown maps to 99.
pub fn return_code(raw: &Value) -> i64 {
    let code = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    code.filter(|c| VALID_RETURN_CODES.contains(c))
        .unwrap_or(FALLBACK_RETURN_CODE)
}

/// `2021-02-01 12:30:00` becomes `2021-02-01T12:30:00.000Z`.
pub fn format_date(date: &str) -> String {
    format!("{}.000Z", date.replace(' ', "T"))
}

fn quantity(raw: &Value) -> Result<u64> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| IntegrationError::processing(format!("invalid qtyReturning: {}", raw)))
}

/// One entry per returned unit.
pub fn return_items(items: &Value) -> Result<Vec<Value>> {
    let items = items
        .as_array()
        .ok_or_else(|| IntegrationError::processing("return items must be a list"))?;

    let mut ns_items = Vec::new();
    for item in items {
        let reason = item["reason_comment"].as_str().filter(|r| !r.is_empty());
        let returned = json!({
            "product_id": item["sku"],
            "return_reason": reason.unwrap_or("historical return"),
            "return_code": return_code(&item["return_code"]),
        });
        for _ in 0..quantity(&item["qtyReturning"])? {
            ns_items.push(returned.clone());
        }
    }
    Ok(ns_items)
}

pub struct ReturnTransformer {
    newstore: NewStoreClient,
}

impl ReturnTransformer {
    pub fn new(newstore: NewStoreClient) -> Self {
        Self { newstore }
    }

    pub async fn order_id(&self, external_id: &str) -> Result<String> {
        let data = self
            .newstore
            .graphql(ORDER_BY_EXTERNAL_ID, json!({ "externalId": external_id }))
            .await?;

        data["orders"]["edges"][0]["node"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| IntegrationError::processing(format!("Cannot find order {}", external_id)))
    }

    pub async fn transform_return(&self, staged: &Value) -> Result<Value> {
        let field = |name: &str| {
            staged[name]
                .as_str()
                .ok_or_else(|| IntegrationError::processing(format!("return is missing '{}'", name)))
        };
        let order_id = self.order_id(field("order_increment_id")?).await?;

        let ns_return = json!({
            "rma_id": field("rma_id")?,
            "order_id": order_id,
            "return": {
                "is_historical": true,
                "returned_at": format_date(field("date_requested")?),
                "returned_from": RETURNED_FROM,
                "items": return_items(&staged["items"])?,
            },
        });
        tracing::info!("{}", ns_return);
        Ok(ns_return)
    }
}

#[async_trait]
impl BackfillTransformer for ReturnTransformer {
    async fn transform(&self, payload: &Value) -> Result<Value> {
        self.transform_return(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::InvocationContext;
    use crate::config::param_store::NewStoreConfig;
    use httpmock::prelude::*;

    fn transformer(server: &MockServer) -> ReturnTransformer {
        server.mock(|when, then| {
            when.method(POST).path("/v0/token");
            then.status(200)
                .json_body(json!({"access_token": "abc", "expires_in": 3600}));
        });
        ReturnTransformer::new(NewStoreClient::new(
            NewStoreConfig {
                host: server.base_url(),
                tenant: "frankandoak".to_string(),
                username: "user".to_string(),
                password: "secret".to_string(),
            },
            InvocationContext::default(),
        ))
    }

    #[test]
    fn test_return_codes() {
        assert_eq!(return_code(&json!(392)), 392);
        assert_eq!(return_code(&json!("2864")), 2864);
        assert_eq!(return_code(&json!(7)), 99);
        assert_eq!(return_code(&json!("")), 99);
        assert_eq!(return_code(&Value::Null), 99);
    }

    #[test]
    fn test_items_repeat_per_quantity() {
        let items = return_items(&json!([
            {"sku": "SKU1", "reason_comment": "", "return_code": "395", "qtyReturning": 2},
            {"sku": "SKU2", "reason_comment": "too small", "return_code": null, "qtyReturning": 1},
        ]))
        .unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0], items[1]);
        assert_eq!(items[0]["return_reason"], "historical return");
        assert_eq!(items[0]["return_code"], 395);
        assert_eq!(items[2]["return_reason"], "too small");
        assert_eq!(items[2]["return_code"], 99);
    }

    #[tokio::test]
    async fn test_transform_return_looks_up_order() {
        let server = MockServer::start();
        let transformer = transformer(&server);
        let lookup = server.mock(|when, then| {
            when.method(POST).path("/api/v1/org/data/query").body_contains("#1001");
            then.status(200).json_body(json!({
                "data": {"orders": {"edges": [{"node": {"id": "ns-order-1"}}]}}
            }));
        });

        let ns_return = transformer
            .transform_return(&json!({
                "rma_id": "R1",
                "order_increment_id": "#1001",
                "date_requested": "2021-02-01 12:30:00",
                "items": [{"sku": "SKU1", "reason_comment": "", "return_code": 392, "qtyReturning": 1}],
            }))
            .await
            .unwrap();

        lookup.assert();
        assert_eq!(ns_return["order_id"], "ns-order-1");
        assert_eq!(ns_return["return"]["returned_at"], "2021-02-01T12:30:00.000Z");
        assert_eq!(ns_return["return"]["returned_from"], "MTLDC1");
    }

    #[tokio::test]
    async fn test_unknown_order_is_an_error() {
        let server = MockServer::start();
        let transformer = transformer(&server);
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/org/data/query");
            then.status(200).json_body(json!({"data": {"orders": {"edges": []}}}));
        });

        let err = transformer.order_id("#404").await.unwrap_err();
        assert!(err.to_string().contains("#404"));
    }
}
