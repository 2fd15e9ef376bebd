//! HTTP JSON collectors — each one GETs a URL and hands back the JSON body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vigil_core::config::CollectorConfig;
use vigil_core::error::{Result, VigilError};
use vigil_core::traits::Collector;

/// A collector backed by an HTTP endpoint that returns JSON.
pub struct HttpCollector {
    name: String,
    url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpCollector {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            timeout: Duration::from_secs(20),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        let mut headers: Vec<(String, String)> = config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();
        Self {
            headers,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            ..Self::new(&config.name, &config.url)
        }
    }

    fn error(&self, reason: String) -> VigilError {
        VigilError::Collector {
            name: self.name.clone(),
            reason,
        }
    }
}

#[async_trait]
impl Collector for HttpCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self) -> Result<serde_json::Value> {
        let mut req = self.client.get(&self.url).timeout(self.timeout);
        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| self.error(format!("request to {} failed: {e}", self.url)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(self.error(format!("{} returned {status}", self.url)));
        }

        let value: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| self.error(format!("invalid JSON: {e}")))?;
        tracing::debug!("📡 Collector '{}' fetched {}", self.name, self.url);
        Ok(value)
    }
}

/// Build one collector per `[[collectors]]` entry.
pub fn collectors_from_config(configs: &[CollectorConfig]) -> Vec<Arc<dyn Collector>> {
    configs
        .iter()
        .map(|c| Arc::new(HttpCollector::from_config(c)) as Arc<dyn Collector>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_config() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let config = CollectorConfig {
            name: "goals".into(),
            url: "http://localhost:8080/goals".into(),
            headers,
            timeout_secs: 0,
        };
        let collector = HttpCollector::from_config(&config);
        assert_eq!(collector.name(), "goals");
        assert_eq!(collector.headers.len(), 1);
        // Zero is bumped so requests can't time out instantly.
        assert_eq!(collector.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_collectors_from_config_keeps_order() {
        let configs = vec![
            CollectorConfig {
                name: "calendar".into(),
                url: "http://a".into(),
                headers: HashMap::new(),
                timeout_secs: 5,
            },
            CollectorConfig {
                name: "mail".into(),
                url: "http://b".into(),
                headers: HashMap::new(),
                timeout_secs: 5,
            },
        ];
        let names: Vec<String> = collectors_from_config(&configs)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["calendar", "mail"]);
    }

    #[test]
    fn test_collector_error_names_source() {
        let collector = HttpCollector::new("vault", "http://x");
        let err = collector.error("boom".into());
        assert_eq!(err.to_string(), "Collector 'vault' failed: boom");
    }
}
