// =============================================================================
// Exchange REST API Client: HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: The secret key is never logged or serialized. Private requests
// carry API-KEY / API-TIMESTAMP / API-SIGN headers, where the signature is
// HMAC-SHA256(secret, timestamp + METHOD + path + body) in lowercase hex.
//
// Every response is an envelope `{ "status": 0, "data": ..., "messages": [...] }`.
// A non-2xx HTTP status, a non-zero envelope status, or an unparsable body is
// an error.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::market_data::Candle;
use crate::types::Side;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_PUBLIC_URL: &str = "https://api.coin.z.com/public";
pub const DEFAULT_PRIVATE_URL: &str = "https://api.coin.z.com/private";

// ---------------------------------------------------------------------------
// Parsed response types
// ---------------------------------------------------------------------------

/// A single fill reported for an order.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub price: f64,
    pub size: f64,
}

/// One open lot of a margin position.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenLot {
    pub position_id: u64,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KlineWire {
    open_time: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickerWire {
    last: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarginWire {
    available_amount: String,
}

#[derive(Debug, Deserialize)]
struct ListWire<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ExecutionWire {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPositionWire {
    position_id: u64,
    side: Side,
    size: String,
    price: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Exchange REST client with HMAC-SHA256 request signing.
#[derive(Clone)]
pub struct ExchangeClient {
    api_key: String,
    secret: String,
    public_url: String,
    private_url: String,
    client: reqwest::Client,
}

impl ExchangeClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a client against the given public/private base URLs.
    ///
    /// * `api_key`: sent as the `API-KEY` header on private calls.
    /// * `secret` : used exclusively for HMAC signing.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        public_url: impl Into<String>,
        private_url: impl Into<String>,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        let public_url = public_url.into();
        let private_url = private_url.into();
        debug!(public_url = %public_url, private_url = %private_url, "ExchangeClient initialised");

        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            public_url,
            private_url,
            client,
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret.is_empty()
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// HMAC-SHA256 hex signature of `timestamp + method + path + body`.
    pub fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .context("invalid HMAC key")?;
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Current UNIX timestamp in milliseconds.
    pub fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn auth_headers(&self, method: &Method, path: &str, body: &str) -> Result<HeaderMap> {
        let timestamp = Self::timestamp_ms().to_string();
        let sign = self.sign(&timestamp, method.as_str(), path, body)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(&self.api_key).context("API key is not a valid header value")?,
        );
        headers.insert("api-timestamp", HeaderValue::from_str(&timestamp)?);
        headers.insert("api-sign", HeaderValue::from_str(&sign)?);
        Ok(headers)
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    async fn public_get(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.public_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;
        Self::read_envelope(resp, "GET", path).await
    }

    async fn private_get(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let headers = self.auth_headers(&Method::GET, path, "")?;
        let url = format!("{}{}", self.private_url, path);
        let resp = self
            .client
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;
        Self::read_envelope(resp, "GET", path).await
    }

    async fn private_post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::to_string(body).context("failed to serialise request body")?;
        let headers = self.auth_headers(&Method::POST, path, &body)?;
        let url = format!("{}{}", self.private_url, path);
        let resp = self
            .client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {path} request failed"))?;
        Self::read_envelope(resp, "POST", path).await
    }

    async fn read_envelope(
        resp: reqwest::Response,
        method: &str,
        path: &str,
    ) -> Result<serde_json::Value> {
        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("failed to read {method} {path} response"))?;
        Self::parse_envelope(status, &text, method, path)
    }

    /// Unwrap the `data` member of a response envelope.
    fn parse_envelope(
        status: reqwest::StatusCode,
        text: &str,
        method: &str,
        path: &str,
    ) -> Result<serde_json::Value> {
        let mut body: serde_json::Value = serde_json::from_str(text)
            .with_context(|| format!("failed to parse {method} {path} response"))?;

        if !status.is_success() {
            anyhow::bail!("{method} {path} returned {status}: {body}");
        }

        let api_status = body["status"]
            .as_i64()
            .with_context(|| format!("{method} {path} response missing 'status'"))?;
        if api_status != 0 {
            anyhow::bail!(
                "{method} {path} returned status {api_status}: {}",
                body["messages"]
            );
        }

        Ok(body["data"].take())
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /v1/klines: candles for one trading day (`YYYYMMDD`) or, for
    /// hourly candles, one year (`YYYY`).
    #[instrument(skip(self), name = "exchange::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, date: &str) -> Result<Vec<Candle>> {
        let data = self
            .public_get(
                "/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("date", date.to_string()),
                ],
            )
            .await?;
        let raw: Vec<KlineWire> =
            serde_json::from_value(data).context("klines response is not a candle list")?;

        let mut candles = Vec::with_capacity(raw.len());
        for k in raw {
            let millis: i64 = k
                .open_time
                .parse()
                .with_context(|| format!("failed to parse openTime '{}'", k.open_time))?;
            let Some(time) = Utc.timestamp_millis_opt(millis).single() else {
                warn!(millis, "skipping kline with unrepresentable openTime");
                continue;
            };
            let mut candle = Candle::new(
                time,
                parse_decimal(&k.open, "open")?,
                parse_decimal(&k.high, "high")?,
                parse_decimal(&k.low, "low")?,
                parse_decimal(&k.close, "close")?,
            );
            if let Some(v) = k.volume.as_deref() {
                candle = candle.with_volume(parse_decimal(v, "volume")?);
            }
            candles.push(candle);
        }

        debug!(symbol, interval, date, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /v1/ticker: last traded price.
    #[instrument(skip(self), name = "exchange::get_ticker")]
    pub async fn get_ticker(&self, symbol: &str) -> Result<f64> {
        let data = self
            .public_get("/v1/ticker", &[("symbol", symbol.to_string())])
            .await?;
        let tickers: Vec<TickerWire> =
            serde_json::from_value(data).context("ticker response is not a list")?;
        let ticker = tickers.first().context("ticker response is empty")?;
        parse_decimal(&ticker.last, "last")
    }

    // -------------------------------------------------------------------------
    // Account
    // -------------------------------------------------------------------------

    /// GET /v1/account/margin: margin available for new orders.
    #[instrument(skip(self), name = "exchange::get_available_amount")]
    pub async fn get_available_amount(&self) -> Result<f64> {
        let data = self.private_get("/v1/account/margin", &[]).await?;
        let margin: MarginWire =
            serde_json::from_value(data).context("malformed margin response")?;
        let available = parse_decimal(&margin.available_amount, "availableAmount")?;
        debug!(available, "available amount retrieved");
        Ok(available)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /v1/order: market order, returns the order id.
    #[instrument(skip(self), name = "exchange::place_market_order")]
    pub async fn place_market_order(&self, symbol: &str, side: Side, size: f64) -> Result<String> {
        let body = serde_json::json!({
            "symbol": symbol,
            "side": side.as_str(),
            "executionType": "MARKET",
            "size": format_size(size),
        });
        let data = self.private_post("/v1/order", &body).await?;
        let order_id = data
            .as_str()
            .context("order response missing order id")?
            .to_string();
        debug!(symbol, %side, size, order_id = %order_id, "order placed");
        Ok(order_id)
    }

    /// POST /v1/closeBulkOrder: close every open lot on one side.
    #[instrument(skip(self), name = "exchange::close_bulk")]
    pub async fn close_bulk(&self, symbol: &str, side: Side, size: f64) -> Result<String> {
        let body = serde_json::json!({
            "symbol": symbol,
            "side": side.as_str(),
            "executionType": "MARKET",
            "size": format_size(size),
        });
        let data = self.private_post("/v1/closeBulkOrder", &body).await?;
        let order_id = data
            .as_str()
            .context("closeBulkOrder response missing order id")?
            .to_string();
        debug!(symbol, %side, size, order_id = %order_id, "bulk close placed");
        Ok(order_id)
    }

    /// GET /v1/executions: fills for one order.
    #[instrument(skip(self), name = "exchange::get_executions")]
    pub async fn get_executions(&self, order_id: &str) -> Result<Vec<Execution>> {
        let data = self
            .private_get("/v1/executions", &[("orderId", order_id.to_string())])
            .await?;
        let wire: ListWire<ExecutionWire> =
            serde_json::from_value(data).context("malformed executions response")?;
        wire.list
            .iter()
            .map(|e| {
                Ok(Execution {
                    price: parse_decimal(&e.price, "price")?,
                    size: parse_decimal(&e.size, "size")?,
                })
            })
            .collect()
    }

    /// GET /v1/openPositions: open lots for `symbol`.
    #[instrument(skip(self), name = "exchange::get_open_positions")]
    pub async fn get_open_positions(&self, symbol: &str) -> Result<Vec<OpenLot>> {
        let data = self
            .private_get("/v1/openPositions", &[("symbol", symbol.to_string())])
            .await?;
        let wire: ListWire<OpenPositionWire> =
            serde_json::from_value(data).context("malformed openPositions response")?;
        let lots: Vec<OpenLot> = wire
            .list
            .iter()
            .map(|p| {
                Ok(OpenLot {
                    position_id: p.position_id,
                    side: p.side,
                    price: parse_decimal(&p.price, "price")?,
                    size: parse_decimal(&p.size, "size")?,
                })
            })
            .collect::<Result<_>>()?;
        debug!(symbol, count = lots.len(), "open positions retrieved");
        Ok(lots)
    }
}

/// The exchange sends numbers as JSON strings.
fn parse_decimal(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("failed to parse {field} '{raw}' as f64"))
}

fn format_size(size: f64) -> String {
    let s = format!("{size:.8}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Kline `date` parameter for a given day: hourly candles are paged by year.
pub fn kline_date(interval: &str, day: DateTime<Utc>) -> String {
    if interval == "1hour" {
        day.format("%Y").to_string()
    } else {
        day.format("%Y%m%d").to_string()
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("public_url", &self.public_url)
            .field("private_url", &self.private_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn client() -> ExchangeClient {
        ExchangeClient::new("key", "secret", DEFAULT_PUBLIC_URL, DEFAULT_PRIVATE_URL).unwrap()
    }

    #[test]
    fn signature_covers_timestamp_method_path_body() {
        let c = client();
        let a = c.sign("1700000000000", "POST", "/v1/order", "{}").unwrap();
        let b = c.sign("1700000000000", "POST", "/v1/order", "{\"size\":\"1\"}").unwrap();
        let again = c.sign("1700000000000", "POST", "/v1/order", "{}").unwrap();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, again);
    }

    #[test]
    fn signature_matches_concatenated_message() {
        let c = client();
        let split = c.sign("1", "GET", "/v1/account/margin", "").unwrap();
        let joined = c.sign("1GET/v1/account/margin", "", "", "").unwrap();
        assert_eq!(split, joined);
    }

    #[test]
    fn envelope_data_is_unwrapped() {
        let data = ExchangeClient::parse_envelope(
            StatusCode::OK,
            r#"{"status":0,"data":{"availableAmount":"1000"},"responsetime":"x"}"#,
            "GET",
            "/v1/account/margin",
        )
        .unwrap();
        assert_eq!(data["availableAmount"], "1000");
    }

    #[test]
    fn non_zero_status_is_error() {
        let err = ExchangeClient::parse_envelope(
            StatusCode::OK,
            r#"{"status":1,"messages":[{"message_code":"ERR-201"}]}"#,
            "POST",
            "/v1/order",
        )
        .unwrap_err();
        assert!(err.to_string().contains("status 1"));
    }

    #[test]
    fn non_2xx_is_error() {
        let result = ExchangeClient::parse_envelope(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"status":5}"#,
            "GET",
            "/v1/ticker",
        );
        assert!(result.is_err());
    }

    #[test]
    fn malformed_json_is_error() {
        let result =
            ExchangeClient::parse_envelope(StatusCode::OK, "<html>", "GET", "/v1/ticker");
        assert!(result.is_err());
    }

    #[test]
    fn size_formatting_trims_zeros() {
        assert_eq!(format_size(0.01), "0.01");
        assert_eq!(format_size(2.0), "2");
    }

    #[test]
    fn kline_date_pages_by_day_or_year() {
        let day = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(kline_date("1min", day), "20240307");
        assert_eq!(kline_date("1hour", day), "2024");
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ExchangeClient::new("my-key", "topsecretvalue", DEFAULT_PUBLIC_URL, DEFAULT_PRIVATE_URL)
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("topsecretvalue"));
        assert!(!dbg.contains("my-key"));
        assert!(dbg.contains("<redacted>"));
    }
}
