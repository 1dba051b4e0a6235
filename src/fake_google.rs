//! Local stand-ins for the Google token and Sheets endpoints.

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use crate::auth::{DEFAULT_SCOPE, ServiceAccount, ServiceAccountKey};

pub const PRIVATE_KEY: &str = include_str!("../tests/fixtures/service_account_key.pem");
pub const SPREADSHEET_ID: &str = "sheet-id";

/// What the fake endpoints saw and what they answer with.
#[derive(Default)]
pub struct Recorded {
    pub token_requests: AtomicUsize,
    pub grants: Mutex<Vec<String>>,
    pub reads: Mutex<Vec<Read>>,
    /// Answer the token endpoint with this status instead of a token.
    pub reject_tokens: Option<StatusCode>,
    /// Range -> response body. Unknown ranges get a 400.
    pub ranges: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub range: String,
    pub major_dimension: String,
    pub authorization: String,
}

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    assertion: String,
}

#[derive(Deserialize)]
struct ValuesQuery {
    #[serde(rename = "majorDimension", default)]
    major_dimension: String,
}

async fn token(State(recorded): State<Arc<Recorded>>, Form(form): Form<TokenForm>) -> Response {
    let count = recorded.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    recorded.grants.lock().unwrap().push(form.grant_type);
    if let Some(status) = recorded.reject_tokens {
        return (status, r#"{"error":"invalid_grant"}"#).into_response();
    }
    // header.claims.signature
    if form.assertion.split('.').count() != 3 {
        return (StatusCode::BAD_REQUEST, "malformed assertion").into_response();
    }
    Json(json!({ "access_token": format!("token-{count}"), "expires_in": 3600 })).into_response()
}

async fn values(
    State(recorded): State<Arc<Recorded>>,
    Path((spreadsheet, range)): Path<(String, String)>,
    Query(query): Query<ValuesQuery>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    recorded.reads.lock().unwrap().push(Read {
        range: range.clone(),
        major_dimension: query.major_dimension,
        authorization,
    });

    if spreadsheet != SPREADSHEET_ID {
        return (StatusCode::NOT_FOUND, "Requested entity was not found.").into_response();
    }
    match recorded.ranges.get(&range) {
        Some(body) => Json(body.clone()).into_response(),
        None => (StatusCode::BAD_REQUEST, format!("Unable to parse range: {range}")).into_response(),
    }
}

/// Serve the fake endpoints on an ephemeral port and return their base URL.
pub async fn serve(recorded: Arc<Recorded>) -> String {
    let app = Router::new()
        .route("/token", post(token))
        .route("/v4/spreadsheets/:spreadsheet/values/:range", get(values))
        .with_state(recorded);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn service_account(base_url: &str) -> ServiceAccount {
    let key = ServiceAccountKey {
        client_email: "svc@example.iam.gserviceaccount.com".into(),
        private_key: PRIVATE_KEY.into(),
        private_key_id: Some("test-key".into()),
        token_uri: format!("{base_url}/token"),
    };
    ServiceAccount::new(key, DEFAULT_SCOPE, reqwest::Client::new())
}
