use std::{collections::BTreeMap, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

/// What `/echo` saw, sent back as JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Requests received per path.
pub type Hits = Arc<RwLock<BTreeMap<String, usize>>>;

pub fn app() -> Router {
    let hits: Hits = Arc::default();
    Router::new()
        .route("/echo", any(echo))
        .route("/echo/{*rest}", any(echo))
        .route("/status/{code}", any(status))
        .route("/delay/{ms}", any(delay))
        .route("/bytes/{len}", get(bytes))
        .route("/hits", get(list_hits))
        .with_state(hits)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn record(hits: &Hits, uri: &Uri) {
    *hits.write().await.entry(uri.path().to_string()).or_default() += 1;
}

async fn echo(
    State(hits): State<Hits>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Echo> {
    record(&hits, &uri).await;
    let headers = headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_string(), value)
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(
    State(hits): State<Hits>,
    uri: Uri,
    Path(code): Path<u16>,
) -> (StatusCode, Json<serde_json::Value>) {
    record(&hits, &uri).await;
    match StatusCode::from_u16(code) {
        Ok(status) => (status, Json(serde_json::json!({ "status": code }))),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("no such status: {code}") })),
        ),
    }
}

async fn delay(
    State(hits): State<Hits>,
    uri: Uri,
    Path(ms): Path<u64>,
) -> Json<serde_json::Value> {
    record(&hits, &uri).await;
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(serde_json::json!({ "delayed_ms": ms }))
}

async fn bytes(State(hits): State<Hits>, uri: Uri, Path(len): Path<usize>) -> Vec<u8> {
    record(&hits, &uri).await;
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn list_hits(State(hits): State<Hits>) -> Json<BTreeMap<String, usize>> {
    Json(hits.read().await.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_to_json() {
        let echo = Echo {
            method: "GET".to_string(),
            path: "/echo".to_string(),
            query: Some("a=1".to_string()),
            headers: BTreeMap::from([("accept".to_string(), "*/*".to_string())]),
            body: String::new(),
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["query"], "a=1");
        assert_eq!(json["headers"]["accept"], "*/*");
        assert_eq!(json["body"], "");
    }

    #[test]
    fn echo_without_query_serializes_null() {
        let echo: Echo = serde_json::from_str(
            r#"{"method":"POST","path":"/echo","query":null,"headers":{},"body":"x"}"#,
        )
        .unwrap();
        assert!(echo.query.is_none());
        assert_eq!(echo.body, "x");
    }
}
