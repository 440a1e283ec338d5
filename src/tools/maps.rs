//! 地图 HTTP 客户端：Google Maps Web Service（Directions / Places）共用
//!
//! GET 请求带超时；API Key 缺失时直接返回错误而不发请求；
//! 响应体中的 status 非 OK / ZERO_RESULTS 时视为失败。

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

pub const DEFAULT_MAPS_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// 经纬度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn from_value(v: &Value) -> Option<Self> {
        Some(Self {
            lat: v.get("lat")?.as_f64()?,
            lng: v.get("lng")?.as_f64()?,
        })
    }
}

/// 地图服务客户端
#[derive(Debug, Clone)]
pub struct MapsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl MapsClient {
    /// HTTP 客户端构建失败（如 TLS 后端不可用）时返回 ConfigError
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::ConfigError(format!("maps HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_MAPS_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// GET {base_url}/{path}/json?params&key=...
    pub async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "Maps API key is not configured".to_string())?;
        let url = format!("{}/{}/json", self.base_url, path.trim_matches('/'));

        let mut query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        query.push(("key", key));

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e.without_url()))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid JSON response: {e}"))?;
        check_status(&body)?;
        Ok(body)
    }
}

/// Maps API 的业务状态：OK / ZERO_RESULTS 为成功
pub fn check_status(body: &Value) -> Result<(), String> {
    match body.get("status").and_then(Value::as_str) {
        None | Some("OK") | Some("ZERO_RESULTS") => Ok(()),
        Some(status) => {
            let detail = body
                .get("error_message")
                .and_then(Value::as_str)
                .unwrap_or("no details");
            Err(format!("{status}: {detail}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_status() {
        assert!(check_status(&json!({"status": "OK"})).is_ok());
        assert!(check_status(&json!({"status": "ZERO_RESULTS"})).is_ok());
        let err = check_status(&json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        }))
        .unwrap_err();
        assert_eq!(err, "REQUEST_DENIED: The provided API key is invalid.");
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast() {
        let maps = MapsClient::new(None, Some("  ".to_string()), 1).unwrap();
        assert!(!maps.has_api_key());
        let err = maps.get_json("directions", &[]).await.unwrap_err();
        assert!(err.contains("not configured"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let maps = MapsClient::new(Some("http://localhost:9/maps/"), None, 5).unwrap();
        assert_eq!(maps.base_url, "http://localhost:9/maps");
    }

    #[test]
    fn test_latlng_from_value() {
        let v = json!({"lat": 47.5, "lng": 19.04});
        assert_eq!(LatLng::from_value(&v), Some(LatLng { lat: 47.5, lng: 19.04 }));
        assert_eq!(LatLng::from_value(&json!({"lat": 1.0})), None);
    }
}
