//! Upstream postal code lookup client
//!
//! One [`AddressLookup`] handle is built per worker at run start and reused for
//! that worker's lifetime. The HTTP implementation checks the status before the
//! body, classifies every failure into a [`FetchError`] variant, and maps the
//! upstream payload onto an [`AddressRecord`].

use crate::config::IngestConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use pcr_common::AddressRecord;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Transport variant for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Secure,
    Insecure,
}

impl Transport {
    fn scheme(self) -> &'static str {
        match self {
            Transport::Secure => "https",
            Transport::Insecure => "http",
        }
    }
}

/// Resolves one postal code against the upstream service
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn lookup(&self, code: &str, transport: Transport) -> Result<AddressRecord, FetchError>;
}

/// Builds one lookup handle per worker
pub trait LookupFactory: Send + Sync {
    fn build(&self) -> Result<Box<dyn AddressLookup>, FetchError>;
}

/// Upstream JSON payload (field names as served)
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpstreamPayload {
    #[serde(deserialize_with = "string_or_number")]
    logradouro: String,
    #[serde(deserialize_with = "string_or_number")]
    complemento: String,
    #[serde(deserialize_with = "string_or_number")]
    unidade: String,
    #[serde(deserialize_with = "string_or_number")]
    bairro: String,
    #[serde(deserialize_with = "string_or_number")]
    localidade: String,
    #[serde(deserialize_with = "string_or_number")]
    uf: String,
    #[serde(deserialize_with = "string_or_number")]
    estado: String,
    #[serde(deserialize_with = "string_or_number")]
    regiao: String,
    #[serde(deserialize_with = "string_or_number")]
    ibge: String,
    #[serde(deserialize_with = "string_or_number")]
    gia: String,
    #[serde(deserialize_with = "string_or_number")]
    ddd: String,
    #[serde(deserialize_with = "string_or_number")]
    siafi: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Interpret an upstream body for `code`.
///
/// The `erro` marker (boolean `true` or string `"true"`) is a terminal
/// not-found. The returned record always carries the requested code.
pub fn parse_lookup_body(code: &str, body: &str) -> Result<AddressRecord, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        if e.is_eof() {
            FetchError::Truncated(e.to_string())
        } else {
            FetchError::Malformed(e.to_string())
        }
    })?;

    let object = value
        .as_object()
        .ok_or_else(|| FetchError::Malformed("expected a JSON object".to_string()))?;

    let not_found = match object.get("erro") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
        _ => false,
    };
    if not_found {
        return Err(FetchError::NotFound);
    }

    let payload: UpstreamPayload =
        serde_json::from_value(value).map_err(|e| FetchError::Malformed(e.to_string()))?;

    Ok(AddressRecord {
        code: code.to_string(),
        street: payload.logradouro,
        complement: payload.complemento,
        unit: payload.unidade,
        neighborhood: payload.bairro,
        locality: payload.localidade,
        state_code: payload.uf,
        state_name: payload.estado,
        region: payload.regiao,
        administrative_code: payload.ibge,
        fiscal_zone_code: payload.gia,
        area_code: payload.ddd,
        financial_system_code: payload.siafi,
    })
}

/// Classify a transport-level reqwest failure
pub fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    let detail = error_chain(err);
    if err.is_timeout() {
        return FetchError::Timeout(detail);
    }
    if mentions_tls(&detail) {
        return FetchError::SecureTransport(detail);
    }
    if err.is_connect() || err.is_request() {
        return FetchError::Connection(detail);
    }
    if err.is_body() || err.is_decode() {
        return FetchError::Truncated(detail);
    }
    FetchError::Unclassified(detail)
}

/// Flatten an error and its sources into one message
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn mentions_tls(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// HTTP lookup handle owned by one worker
pub struct HttpLookupClient {
    http_client: reqwest::Client,
    host: String,
    retry_statuses: Arc<HashSet<u16>>,
}

impl HttpLookupClient {
    pub fn new(config: &IngestConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| FetchError::Unclassified(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http_client,
            host: config.lookup_host.clone(),
            retry_statuses: Arc::new(config.retry_statuses.iter().copied().collect()),
        })
    }

    pub fn url_for(&self, code: &str, transport: Transport) -> String {
        format!("{}://{}/ws/{}/json/", transport.scheme(), self.host, code)
    }
}

#[async_trait]
impl AddressLookup for HttpLookupClient {
    async fn lookup(&self, code: &str, transport: Transport) -> Result<AddressRecord, FetchError> {
        let url = self.url_for(code, transport);
        tracing::debug!(code = %code, url = %url, "Querying lookup service");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(FetchError::Status {
                status: status.as_u16(),
                retry_after,
                retryable: self.retry_statuses.contains(&status.as_u16()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        parse_lookup_body(code, &body)
    }
}

/// Factory for [`HttpLookupClient`] handles
pub struct HttpLookupFactory {
    config: IngestConfig,
}

impl HttpLookupFactory {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }
}

impl LookupFactory for HttpLookupFactory {
    fn build(&self) -> Result<Box<dyn AddressLookup>, FetchError> {
        Ok(Box::new(HttpLookupClient::new(&self.config)?))
    }
}
