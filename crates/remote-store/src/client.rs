//! REST client for the hosted record store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use clientfolio_core::entities::{RecordType, RemoteKey, RemoteRecord};
use clientfolio_core::secrets::{SecretStore, ACCOUNT_ACCESS_TOKEN_KEY};
use clientfolio_core::sync::{
    Availability, PerRecordResult, RecordQuery, RemoteError, RemoteStore, UnavailableReason,
    SYNC_REQUEST_TIMEOUT_SECS,
};

use crate::error::{RecordStoreError, Result};
use crate::types::*;

const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the record store REST API.
///
/// The bearer token is read from the secret store on every call, so signing
/// in or out takes effect without rebuilding the client.
#[derive(Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
    secrets: Arc<dyn SecretStore>,
}

impl HttpRecordStore {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[RecordStore] API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[RecordStore] API response error ({}): {}", status, preview);
    }

    /// Create a new record store client with the default request timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the record store API (e.g., "https://api.example.com")
    /// * `secrets` - Where the account access token lives
    pub fn new(base_url: &str, secrets: Arc<dyn SecretStore>) -> Self {
        Self::with_timeout(
            base_url,
            secrets,
            Duration::from_secs(SYNC_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(base_url: &str, secrets: Arc<dyn SecretStore>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secrets,
        }
    }

    fn access_token(&self) -> Result<String> {
        self.secrets
            .get_secret(ACCOUNT_ACCESS_TOKEN_KEY)
            .map_err(|e| RecordStoreError::auth(format!("Failed to get access token: {}", e)))?
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| RecordStoreError::auth("No access token configured"))
    }

    /// Create headers for an API request.
    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| RecordStoreError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    fn api_error(status: reqwest::StatusCode, body: &str) -> RecordStoreError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            return RecordStoreError::api(
                status.as_u16(),
                Some(error.code.clone()),
                format!("{}: {}", error.code, error.message),
            );
        }
        RecordStoreError::api(status.as_u16(), None, format!("Request failed: {}", body))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "[RecordStore] Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            RecordStoreError::from(e)
        })
    }

    /// Accept any 2xx response, ignoring its body.
    async fn parse_ack(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Account
    // ─────────────────────────────────────────────────────────────────────────

    /// Probe whether the signed-in account may use the record store.
    ///
    /// GET /api/v1/account/status
    pub async fn account_status(&self, token: &str) -> Result<AccountStatusResponse> {
        let url = format!("{}/api/v1/account/status", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// List records of one type, optionally narrowed to one client.
    ///
    /// GET /api/v1/records/{recordType}?clientId={clientId}
    pub async fn list_records(
        &self,
        token: &str,
        record_type: RecordType,
        query: Option<&RecordQuery>,
    ) -> Result<Vec<RemoteRecord>> {
        let mut url = format!("{}/api/v1/records/{}", self.base_url, record_type.as_str());
        if let Some(client_id) = query.and_then(|q| q.client_id) {
            url = format!(
                "{}?clientId={}",
                url,
                urlencoding::encode(&client_id.to_string())
            );
        }

        debug!("[RecordStore] list_records URL: {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        let list: RecordListResponse = Self::parse_response(response).await?;
        Ok(list.into_records(record_type))
    }

    /// Create or replace a record.
    ///
    /// PUT /api/v1/records/{recordType}/{remoteKey}
    pub async fn put_record(&self, token: &str, record: &RemoteRecord) -> Result<()> {
        let url = format!(
            "{}/api/v1/records/{}/{}",
            self.base_url,
            record.record_type.as_str(),
            urlencoding::encode(record.remote_key.as_str())
        );

        let response = self
            .client
            .put(&url)
            .headers(self.headers(token)?)
            .json(record)
            .send()
            .await?;

        Self::parse_ack(response).await
    }

    /// Delete a record.
    ///
    /// DELETE /api/v1/records/{remoteKey}
    pub async fn delete_record(&self, token: &str, remote_key: &RemoteKey) -> Result<()> {
        let url = format!(
            "{}/api/v1/records/{}",
            self.base_url,
            urlencoding::encode(remote_key.as_str())
        );

        let response = self
            .client
            .delete(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        Self::parse_ack(response).await
    }

    /// Create or replace several records in one request.
    ///
    /// POST /api/v1/records/batch
    pub async fn batch_put(
        &self,
        token: &str,
        records: &[RemoteRecord],
    ) -> Result<BatchSaveResponse> {
        let url = format!("{}/api/v1/records/batch", self.base_url);
        let request = BatchSaveRequest {
            records: records.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(&request)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

fn item_result(item: &BatchItemResult) -> std::result::Result<(), RemoteError> {
    if (200..300).contains(&item.status) {
        return Ok(());
    }
    let message = item.message.clone().unwrap_or_default();
    Err(RecordStoreError::api(item.status, item.code.clone(), message)
        .into_remote(Some(&item.remote_key)))
}

#[async_trait]
impl RemoteStore for HttpRecordStore {
    async fn check_availability(&self) -> Availability {
        let token = match self.access_token() {
            Ok(token) => token,
            Err(_) => return Availability::Unavailable(UnavailableReason::NoAccount),
        };

        match self.account_status(&token).await {
            Ok(status) => status.to_availability(),
            Err(err) => {
                warn!("[RecordStore] Account status probe failed: {}", err);
                let reason = match err.status_code() {
                    Some(401) => UnavailableReason::NoAccount,
                    Some(403) => UnavailableReason::Restricted,
                    Some(503) => UnavailableReason::TemporarilyUnavailable,
                    _ => UnavailableReason::CouldNotDetermine,
                };
                Availability::Unavailable(reason)
            }
        }
    }

    async fn fetch(
        &self,
        record_type: RecordType,
        query: Option<&RecordQuery>,
    ) -> std::result::Result<Vec<RemoteRecord>, RemoteError> {
        let token = self.access_token().map_err(|e| e.into_remote(None))?;
        self.list_records(&token, record_type, query)
            .await
            .map_err(|e| e.into_remote(None))
    }

    async fn save(&self, record: &RemoteRecord) -> std::result::Result<(), RemoteError> {
        let token = self.access_token().map_err(|e| e.into_remote(None))?;
        self.put_record(&token, record)
            .await
            .map_err(|e| e.into_remote(Some(&record.remote_key)))
    }

    async fn delete(&self, remote_key: &RemoteKey) -> std::result::Result<(), RemoteError> {
        let token = self.access_token().map_err(|e| e.into_remote(None))?;
        self.delete_record(&token, remote_key)
            .await
            .map_err(|e| e.into_remote(Some(remote_key)))
    }

    async fn batch_save(&self, records: &[RemoteRecord]) -> Vec<PerRecordResult> {
        let response = match self.access_token() {
            Ok(token) => self.batch_put(&token, records).await,
            Err(err) => Err(err),
        };

        match response {
            Ok(response) => records
                .iter()
                .map(|record| {
                    let result = response
                        .results
                        .iter()
                        .find(|item| item.remote_key == record.remote_key)
                        .map(item_result)
                        .unwrap_or_else(|| {
                            Err(RemoteError::unknown(format!(
                                "no batch result for {}",
                                record.remote_key
                            )))
                        });
                    PerRecordResult {
                        remote_key: record.remote_key.clone(),
                        result,
                    }
                })
                .collect(),
            Err(err) => {
                let error = err.into_remote(None);
                records
                    .iter()
                    .map(|record| PerRecordResult {
                        remote_key: record.remote_key.clone(),
                        result: Err(error.clone()),
                    })
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientfolio_core::entities::{ClientProfile, SyncableEntity};
    use clientfolio_core::secrets::MemorySecretStore;
    use std::collections::{HashMap, VecDeque};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        authorization: Option<String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    fn respond(status: u16, body: impl Into<String>) -> MockResponse {
        MockResponse {
            status,
            body: body.into(),
        }
    }

    fn api_error_body(code: &str, message: &str) -> String {
        format!(
            r#"{{"error":"error","code":"{}","message":"{}"}}"#,
            code, message
        )
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            authorization: headers.get("authorization").cloned(),
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            204 => "No Content",
            401 => "Unauthorized",
            404 => "Not Found",
            429 => "Too Many Requests",
            503 => "Service Unavailable",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let Some(request) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_clone.lock().await.push(request);
                let response = scripted
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| respond(500, api_error_body("INTERNAL", "unexpected")));
                let _ = write_http_response(&mut stream, response.status, &response.body).await;
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    fn signed_in() -> Arc<dyn SecretStore> {
        Arc::new(MemorySecretStore::with_secret(
            ACCOUNT_ACCESS_TOKEN_KEY,
            "token-123",
        ))
    }

    fn profile_record() -> RemoteRecord {
        ClientProfile::new("Alice", "alice@example.com").to_record()
    }

    #[tokio::test]
    async fn fetch_sends_bearer_token_and_client_filter() {
        let record = profile_record();
        let body = serde_json::to_string(&RecordListResponse {
            records: vec![serde_json::to_value(&record).expect("encode record")],
        })
        .expect("encode list");
        let (base_url, captured, server) = start_mock_server(vec![respond(200, body)]).await;
        let store = HttpRecordStore::new(&base_url, signed_in());
        let client_id = Uuid::new_v4();

        let records = store
            .fetch(
                RecordType::MonthlyAssetRecord,
                Some(&RecordQuery::for_client(client_id)),
            )
            .await
            .expect("fetch records");

        assert_eq!(records, vec![record]);
        let requests = captured.lock().await;
        assert_eq!(
            requests[0].request_line,
            format!(
                "GET /api/v1/records/MonthlyAssetRecord?clientId={} HTTP/1.1",
                client_id
            )
        );
        assert_eq!(
            requests[0].authorization.as_deref(),
            Some("Bearer token-123")
        );
        server.abort();
    }

    #[tokio::test]
    async fn save_puts_record_under_its_key() {
        let record = profile_record();
        let (base_url, captured, server) = start_mock_server(vec![respond(204, "")]).await;
        let store = HttpRecordStore::new(&base_url, signed_in());

        store.save(&record).await.expect("save record");

        let requests = captured.lock().await;
        assert_eq!(
            requests[0].request_line,
            format!(
                "PUT /api/v1/records/ClientProfile/{} HTTP/1.1",
                record.remote_key
            )
        );
        let sent: RemoteRecord = serde_json::from_str(&requests[0].body).expect("decode body");
        assert_eq!(sent, record);
        server.abort();
    }

    #[tokio::test]
    async fn delete_of_missing_record_is_not_found() {
        let key = RemoteKey::from_id(Uuid::new_v4());
        let (base_url, captured, server) =
            start_mock_server(vec![respond(404, api_error_body("NOT_FOUND", "no record"))]).await;
        let store = HttpRecordStore::new(&base_url, signed_in());

        let err = store.delete(&key).await.expect_err("missing record");

        assert_eq!(err, RemoteError::RecordNotFound(key.clone()));
        assert_eq!(
            captured.lock().await[0].request_line,
            format!("DELETE /api/v1/records/{} HTTP/1.1", key)
        );
        server.abort();
    }

    #[tokio::test]
    async fn status_codes_classify_into_sync_errors() {
        let (base_url, _captured, server) = start_mock_server(vec![
            respond(429, api_error_body("RATE_LIMITED", "slow down")),
            respond(503, api_error_body("UNAVAILABLE", "maintenance")),
            respond(422, api_error_body("INVALID", "bad field")),
            respond(400, api_error_body("QUOTA_EXCEEDED", "storage full")),
        ])
        .await;
        let store = HttpRecordStore::new(&base_url, signed_in());
        let record = profile_record();

        let kinds: Vec<_> = [
            store.save(&record).await,
            store.save(&record).await,
            store.save(&record).await,
            store.save(&record).await,
        ]
        .into_iter()
        .map(|result| result.expect_err("scripted failure").kind())
        .collect();

        use clientfolio_core::sync::SyncErrorKind::*;
        assert_eq!(
            kinds,
            vec![QuotaExceeded, NetworkUnavailable, Malformed, QuotaExceeded]
        );
        server.abort();
    }

    #[tokio::test]
    async fn missing_token_fails_without_a_request() {
        let (base_url, captured, server) = start_mock_server(vec![]).await;
        let store = HttpRecordStore::new(&base_url, Arc::new(MemorySecretStore::new()));

        let err = store
            .fetch(RecordType::ClientProfile, None)
            .await
            .expect_err("signed out");

        assert_eq!(
            err,
            RemoteError::AccountUnavailable(UnavailableReason::NoAccount)
        );
        assert_eq!(
            store.check_availability().await,
            Availability::Unavailable(UnavailableReason::NoAccount)
        );
        assert!(captured.lock().await.is_empty());
        server.abort();
    }

    #[tokio::test]
    async fn fetch_skips_malformed_records_in_a_list() {
        let good = profile_record();
        let bad = format!(
            r#"{{"recordType":"ClientProfile","remoteKey":"{}","fields":{{"name":{{"type":"currency","value":"EUR"}}}}}}"#,
            Uuid::new_v4()
        );
        let body = format!(
            r#"{{"records":[{},{}]}}"#,
            serde_json::to_string(&good).expect("encode record"),
            bad
        );
        let (base_url, _captured, server) = start_mock_server(vec![respond(200, body)]).await;
        let store = HttpRecordStore::new(&base_url, signed_in());

        let records = store
            .fetch(RecordType::ClientProfile, None)
            .await
            .expect("fetch survives a bad record");

        assert_eq!(records, vec![good]);
        server.abort();
    }

    #[tokio::test]
    async fn availability_follows_account_status() {
        let (base_url, _captured, server) = start_mock_server(vec![
            respond(200, r#"{"status":"available"}"#),
            respond(200, r#"{"status":"unavailable","reason":"restricted"}"#),
            respond(401, api_error_body("UNAUTHORIZED", "expired")),
        ])
        .await;
        let store = HttpRecordStore::new(&base_url, signed_in());

        assert_eq!(store.check_availability().await, Availability::Available);
        assert_eq!(
            store.check_availability().await,
            Availability::Unavailable(UnavailableReason::Restricted)
        );
        assert_eq!(
            store.check_availability().await,
            Availability::Unavailable(UnavailableReason::NoAccount)
        );
        server.abort();
    }

    #[tokio::test]
    async fn batch_results_follow_input_order() {
        let (first, second, third) = (profile_record(), profile_record(), profile_record());
        let body = format!(
            r#"{{"results":[
                {{"remoteKey":"{}","status":409,"code":"CONFLICT","message":"stale"}},
                {{"remoteKey":"{}","status":200}}
            ]}}"#,
            second.remote_key, first.remote_key
        );
        let (base_url, captured, server) = start_mock_server(vec![respond(200, body)]).await;
        let store = HttpRecordStore::new(&base_url, signed_in());

        let results = store
            .batch_save(&[first.clone(), second.clone(), third.clone()])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].remote_key, first.remote_key);
        assert_eq!(results[0].result, Ok(()));
        assert_eq!(
            results[1].result.as_ref().map_err(RemoteError::kind),
            Err(clientfolio_core::sync::SyncErrorKind::Malformed)
        );
        assert!(matches!(results[2].result, Err(RemoteError::Unknown(_))));
        let sent: BatchSaveRequest =
            serde_json::from_str(&captured.lock().await[0].body).expect("decode batch");
        assert_eq!(sent.records.len(), 3);
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_network_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        drop(listener);
        let store = HttpRecordStore::new(&format!("http://{}", addr), signed_in());

        let err = store
            .fetch(RecordType::BondHolding, None)
            .await
            .expect_err("nothing listening");

        assert_eq!(
            err.kind(),
            clientfolio_core::sync::SyncErrorKind::NetworkUnavailable
        );
    }
}
