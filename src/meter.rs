// src/meter.rs - Power meter access over HTTP
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::sample::MeterReading;

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("request to {host} failed: {source}")]
    Http {
        host: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{host} answered with status {status}")]
    Status { host: String, status: u16 },
    #[error("missing power value from {host}")]
    MissingPower { host: String },
}

/// Anything that can report the current power draw of one device.
#[async_trait]
pub trait PowerMeter: Send + Sync {
    async fn read(&self) -> Result<MeterReading, MeterError>;
}

/// Body of `GET /data.json` on the meter. Other fields are ignored.
#[derive(Debug, Deserialize)]
struct MeterPayload {
    power: Option<f64>,
    energy: Option<f64>,
}

/// Meter reachable as `http://<host>/data.json`.
#[derive(Debug, Clone)]
pub struct HttpMeter {
    host: String,
    url: String,
    client: reqwest::Client,
}

impl HttpMeter {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, MeterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| MeterError::Http { host: host.to_string(), source })?;
        Ok(Self::with_client(host, client))
    }

    pub fn with_client(host: &str, client: reqwest::Client) -> Self {
        Self {
            host: host.to_string(),
            url: format!("http://{host}/data.json"),
            client,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl PowerMeter for HttpMeter {
    async fn read(&self) -> Result<MeterReading, MeterError> {
        let http = |source: reqwest::Error| MeterError::Http { host: self.host.clone(), source };

        let response = self.client.get(&self.url).send().await.map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MeterError::Status { host: self.host.clone(), status: status.as_u16() });
        }
        let payload: MeterPayload = response.json().await.map_err(http)?;
        tracing::trace!(host = %self.host, ?payload, "meter payload");

        match payload.power {
            Some(power) => Ok(MeterReading { power, energy: payload.energy }),
            None => Err(MeterError::MissingPower { host: self.host.clone() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_host() {
        let meter = HttpMeter::new("condenser.lan", Duration::from_secs(2)).unwrap();
        assert_eq!(meter.host(), "condenser.lan");
        assert_eq!(meter.url, "http://condenser.lan/data.json");
    }

    #[test]
    fn test_payload_fields_optional() {
        let payload: MeterPayload =
            serde_json::from_str(r#"{"voltage": 121.3, "power": 1843.2, "energy": 5521.07}"#).unwrap();
        assert_eq!(payload.power, Some(1843.2));
        assert_eq!(payload.energy, Some(5521.07));

        let payload: MeterPayload = serde_json::from_str(r#"{"voltage": 121.3}"#).unwrap();
        assert_eq!(payload.power, None);
    }
}
