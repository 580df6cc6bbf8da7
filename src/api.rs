//! Hosted table API client.
//!
//! Wraps the cloud backend's per-table select/upsert/update/delete
//! operations (PostgREST dialect, as served by Supabase). The sync layer
//! talks to a [`CloudBackend`] so it can run against an in-memory table set
//! in tests.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{PosError, PosResult};

/// Default timeout for table requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout used for the reachability probe.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-table operations of the hosted backend.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    /// All rows of `table`, ordered by `order_column`.
    async fn select(&self, table: &str, order_column: &str, ascending: bool)
        -> PosResult<Vec<Value>>;

    /// Insert-or-update `rows` keyed by their primary key.
    async fn upsert(&self, table: &str, rows: Vec<Value>) -> PosResult<()>;

    /// Patch every row where `column == value`.
    async fn update_eq(&self, table: &str, column: &str, value: &str, patch: Value)
        -> PosResult<()>;

    /// Delete every row where `column == value`.
    async fn delete_eq(&self, table: &str, column: &str, value: &str) -> PosResult<()>;

    /// Whether the backend answers at all.
    async fn ping(&self) -> bool;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend project URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
pub fn normalize_backend_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - "/rest/v1".len());
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach cloud backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid cloud backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Cloud API key is invalid or expired".to_string(),
        403 => "Cloud API key is not allowed to access this table".to_string(),
        404 => "Cloud table not found".to_string(),
        409 => "Cloud row conflicts with an existing record".to_string(),
        s if s >= 500 => format!("Cloud backend server error (HTTP {s})"),
        s => format!("Unexpected response from cloud backend (HTTP {s})"),
    }
}

/// Build the error message for a failed table request, keeping the
/// PostgREST `message`/`details` when the body carries them.
fn error_detail(status: StatusCode, body_text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        let message = json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| status_error(status));
        match json.get("details").and_then(Value::as_str) {
            Some(details) if !details.trim().is_empty() => {
                format!("{message} (HTTP {}): {details}", status.as_u16())
            }
            _ => format!("{message} (HTTP {})", status.as_u16()),
        }
    } else if !body_text.trim().is_empty() {
        format!(
            "{} (HTTP {}): {}",
            status_error(status),
            status.as_u16(),
            body_text.trim()
        )
    } else {
        format!("{} (HTTP {})", status_error(status), status.as_u16())
    }
}

// ---------------------------------------------------------------------------
// REST implementation
// ---------------------------------------------------------------------------

/// [`CloudBackend`] over the hosted REST endpoint `{url}/rest/v1/{table}`.
#[derive(Clone)]
pub struct SupabaseRest {
    base_url: String,
    anon_key: String,
    client: Client,
}

impl SupabaseRest {
    pub fn new(url: &str, anon_key: &str) -> PosResult<Self> {
        let base_url = normalize_backend_url(url);
        if base_url.is_empty() {
            return Err(PosError::NotConfigured("missing backend URL"));
        }
        if anon_key.trim().is_empty() {
            return Err(PosError::NotConfigured("missing anon key"));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| PosError::Remote(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            anon_key: anon_key.trim().to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> PosResult<Url> {
        let mut url = Url::parse(&format!("{}/rest/v1/{table}", self.base_url))
            .map_err(|e| PosError::Remote(format!("Invalid cloud backend URL: {e}")))?;
        {
            let mut qp = url.query_pairs_mut();
            for (k, v) in query {
                qp.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        prefer: Option<&str>,
        body: Option<&Value>,
    ) -> PosResult<String> {
        debug!(method = %method, url = %url, "cloud request");
        let mut req = self
            .client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .header("Content-Type", "application/json");
        if let Some(prefer) = prefer {
            req = req.header("Prefer", prefer);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PosError::Remote(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PosError::Remote(error_detail(status, &body_text)));
        }
        Ok(body_text)
    }
}

#[async_trait]
impl CloudBackend for SupabaseRest {
    async fn select(
        &self,
        table: &str,
        order_column: &str,
        ascending: bool,
    ) -> PosResult<Vec<Value>> {
        let direction = if ascending { "asc" } else { "desc" };
        let url = self.table_url(
            table,
            &[
                ("select", "*".to_string()),
                ("order", format!("{order_column}.{direction}")),
            ],
        )?;
        let body = self.send(Method::GET, url, None, None).await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body)
            .map_err(|e| PosError::Remote(format!("Invalid JSON from cloud backend: {e}")))?
        {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(PosError::Remote(format!(
                "Expected an array of rows from {table}, got {other}"
            ))),
        }
    }

    async fn upsert(&self, table: &str, rows: Vec<Value>) -> PosResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.table_url(table, &[])?;
        self.send(
            Method::POST,
            url,
            Some("resolution=merge-duplicates,return=minimal"),
            Some(&Value::Array(rows)),
        )
        .await?;
        Ok(())
    }

    async fn update_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
        patch: Value,
    ) -> PosResult<()> {
        let url = self.table_url(table, &[(column, format!("eq.{value}"))])?;
        self.send(Method::PATCH, url, Some("return=minimal"), Some(&patch))
            .await?;
        Ok(())
    }

    async fn delete_eq(&self, table: &str, column: &str, value: &str) -> PosResult<()> {
        let url = self.table_url(table, &[(column, format!("eq.{value}"))])?;
        self.send(Method::DELETE, url, None, None).await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        test_connectivity(self).await.success
    }
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probe the REST root. Any answer below 500 counts as reachable; an
/// authentication failure still means the network is up.
pub async fn test_connectivity(backend: &SupabaseRest) -> ConnectivityResult {
    let url = format!("{}/rest/v1/", backend.base_url);
    let start = Instant::now();

    let resp = match backend
        .client
        .get(&url)
        .timeout(CONNECTIVITY_TIMEOUT)
        .header("apikey", &backend.anon_key)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(friendly_error(&backend.base_url, &e)),
            };
        }
    };

    let latency = start.elapsed().as_millis() as u64;
    let status = resp.status();

    if status.as_u16() < 500 {
        debug!(latency_ms = latency, status = status.as_u16(), "cloud backend reachable");
        ConnectivityResult {
            success: true,
            latency_ms: Some(latency),
            error: None,
        }
    } else {
        info!(status = status.as_u16(), "cloud backend answered with a server error");
        ConnectivityResult {
            success: false,
            latency_ms: Some(latency),
            error: Some(status_error(status)),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory backend for tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Table set keyed by `id`, recording every call it receives.
    #[derive(Default)]
    pub struct MemoryBackend {
        pub tables: Mutex<HashMap<String, Vec<Value>>>,
        pub calls: Mutex<Vec<String>>,
        pub offline: AtomicBool,
        pub fail_table: Mutex<Option<String>>,
    }

    impl MemoryBackend {
        pub fn rows(&self, table: &str) -> Vec<Value> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }

        pub fn seed(&self, table: &str, rows: Vec<Value>) {
            self.tables.lock().unwrap().insert(table.to_string(), rows);
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        pub fn fail_on(&self, table: &str) {
            *self.fail_table.lock().unwrap() = Some(table.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, call: String, table: &str) -> PosResult<()> {
            self.calls.lock().unwrap().push(call);
            if self.offline.load(Ordering::SeqCst) {
                return Err(PosError::Remote("Cannot reach cloud backend".into()));
            }
            if self.fail_table.lock().unwrap().as_deref() == Some(table) {
                return Err(PosError::Remote(format!(
                    "Cloud backend server error (HTTP 500) on {table}"
                )));
            }
            Ok(())
        }
    }

    fn matches(row: &Value, column: &str, value: &str) -> bool {
        match row.get(column) {
            Some(Value::String(s)) => s == value,
            Some(other) => other.to_string() == value,
            None => false,
        }
    }

    #[async_trait]
    impl CloudBackend for MemoryBackend {
        async fn select(
            &self,
            table: &str,
            order_column: &str,
            ascending: bool,
        ) -> PosResult<Vec<Value>> {
            self.check(format!("select {table}"), table)?;
            let mut rows = self.rows(table);
            rows.sort_by(|a, b| {
                let ka = a.get(order_column).map(|v| v.to_string()).unwrap_or_default();
                let kb = b.get(order_column).map(|v| v.to_string()).unwrap_or_default();
                if ascending {
                    ka.cmp(&kb)
                } else {
                    kb.cmp(&ka)
                }
            });
            Ok(rows)
        }

        async fn upsert(&self, table: &str, rows: Vec<Value>) -> PosResult<()> {
            self.check(format!("upsert {table} x{}", rows.len()), table)?;
            let mut tables = self.tables.lock().unwrap();
            let existing = tables.entry(table.to_string()).or_default();
            for row in rows {
                let id = row.get("id").cloned();
                match existing.iter_mut().find(|r| r.get("id").cloned() == id) {
                    Some(slot) => *slot = row,
                    None => existing.push(row),
                }
            }
            Ok(())
        }

        async fn update_eq(
            &self,
            table: &str,
            column: &str,
            value: &str,
            patch: Value,
        ) -> PosResult<()> {
            self.check(format!("update {table} {column}={value}"), table)?;
            let mut tables = self.tables.lock().unwrap();
            if let Some(rows) = tables.get_mut(table) {
                for row in rows.iter_mut().filter(|r| matches(r, column, value)) {
                    if let (Value::Object(target), Value::Object(fields)) = (row, &patch) {
                        for (k, v) in fields {
                            target.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
            Ok(())
        }

        async fn delete_eq(&self, table: &str, column: &str, value: &str) -> PosResult<()> {
            self.check(format!("delete {table} {column}={value}"), table)?;
            let mut tables = self.tables.lock().unwrap();
            if let Some(rows) = tables.get_mut(table) {
                rows.retain(|r| !matches(r, column, value));
            }
            Ok(())
        }

        async fn ping(&self) -> bool {
            !self.offline.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backend_url() {
        assert_eq!(
            normalize_backend_url("demo.supabase.co/"),
            "https://demo.supabase.co"
        );
        assert_eq!(
            normalize_backend_url("https://demo.supabase.co/rest/v1/"),
            "https://demo.supabase.co"
        );
        assert_eq!(
            normalize_backend_url("localhost:54321"),
            "http://localhost:54321"
        );
        assert_eq!(normalize_backend_url("   "), "");
    }

    #[test]
    fn test_error_detail_prefers_postgrest_message() {
        let detail = error_detail(
            StatusCode::CONFLICT,
            r#"{"code":"23505","message":"duplicate key value","details":"Key (id)=(1) already exists."}"#,
        );
        assert_eq!(
            detail,
            "duplicate key value (HTTP 409): Key (id)=(1) already exists."
        );

        let plain = error_detail(StatusCode::UNAUTHORIZED, "");
        assert_eq!(plain, "Cloud API key is invalid or expired (HTTP 401)");

        let text = error_detail(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(text.contains("HTTP 502"));
        assert!(text.ends_with("upstream down"));
    }

    #[test]
    fn test_rest_client_requires_configuration() {
        assert!(matches!(
            SupabaseRest::new("", "key"),
            Err(PosError::NotConfigured(_))
        ));
        assert!(matches!(
            SupabaseRest::new("https://demo.supabase.co", " "),
            Err(PosError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_table_url_encodes_filters() {
        let client = SupabaseRest::new("https://demo.supabase.co", "anon").unwrap();
        let url = client
            .table_url("orders", &[("id", "eq.17 30".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://demo.supabase.co/rest/v1/orders?id=eq.17+30"
        );
    }

    #[tokio::test]
    async fn test_memory_backend_upsert_is_keyed_by_id() {
        let backend = memory::MemoryBackend::default();
        backend
            .upsert(
                "drinks",
                vec![
                    serde_json::json!({"id": "a", "price": 1}),
                    serde_json::json!({"id": "b", "price": 2}),
                ],
            )
            .await
            .unwrap();
        backend
            .upsert("drinks", vec![serde_json::json!({"id": "a", "price": 5})])
            .await
            .unwrap();
        let rows = backend.rows("drinks");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["price"], 5);
    }
}
