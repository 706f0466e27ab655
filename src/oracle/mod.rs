use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::{GraylistEntry, GraylistRule, VersionRecord, normalize_graylist};

pub trait RemoteOracle: Send + Sync {
    fn latest_version(&self, product: &str) -> Option<VersionRecord>;
    fn graylist(&self) -> Option<Vec<GraylistRule>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl RemoteOracle for Offline {
    fn latest_version(&self, _product: &str) -> Option<VersionRecord> {
        None
    }

    fn graylist(&self) -> Option<Vec<GraylistRule>> {
        None
    }
}

pub fn connect(base_url: &str, timeout: Duration) -> Arc<dyn RemoteOracle> {
    or_offline(HttpOracle::new(base_url, timeout))
}

fn or_offline(client: Result<HttpOracle>) -> Arc<dyn RemoteOracle> {
    match client {
        Ok(oracle) => Arc::new(oracle),
        Err(err) => {
            tracing::warn!(error = %err, "remote lookups disabled for this run");
            Arc::new(Offline)
        }
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("リモートへの接続に失敗しました: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP ステータスが不正です: {0}")]
    Status(u16),
    #[error("JSON の解析に失敗しました: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct HttpOracle {
    base_url: String,
    client: Client,
}

impl HttpOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("rebel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("HTTP クライアントの初期化に失敗しました")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn version_url(&self, product: &str) -> String {
        format!("{}/latest/{product}.json", self.base_url)
    }

    pub fn graylist_url(&self) -> String {
        format!("{}/latest/graylist.json", self.base_url)
    }

    fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, OracleError> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }
        let body = resp.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub fn try_latest_version(&self, product: &str) -> Result<VersionRecord, OracleError> {
        self.fetch_json(&self.version_url(product))
    }

    pub fn try_graylist(&self) -> Result<Vec<GraylistRule>, OracleError> {
        let entries: Vec<GraylistEntry> = self.fetch_json(&self.graylist_url())?;
        Ok(normalize_graylist(entries))
    }
}

fn log_failure(what: &str, err: &OracleError) {
    match err {
        OracleError::Network(_) => tracing::warn!(what, error = %err, "remote unavailable"),
        _ => tracing::warn!(what, error = %err, "remote data rejected"),
    }
}

impl RemoteOracle for HttpOracle {
    fn latest_version(&self, product: &str) -> Option<VersionRecord> {
        self.try_latest_version(product)
            .inspect_err(|err| log_failure(product, err))
            .ok()
    }

    fn graylist(&self) -> Option<Vec<GraylistRule>> {
        self.try_graylist()
            .inspect_err(|err| log_failure("graylist", err))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn client_build_failure_falls_back_to_offline() {
        let oracle = or_offline(Err(anyhow::anyhow!("tls backend unavailable")));
        assert!(oracle.latest_version("java").is_none());
        assert!(oracle.graylist().is_none());
    }

    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                let resp = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    fn oracle(base: &str) -> HttpOracle {
        HttpOracle::new(base, Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn builds_well_known_urls() {
        let o = oracle("http://example.test/");
        assert_eq!(o.version_url("java"), "http://example.test/latest/java.json");
        assert_eq!(o.graylist_url(), "http://example.test/latest/graylist.json");
    }

    #[test]
    fn fetches_version_record() {
        let base = serve_once("200 OK", r#"{"name":"1.7.0_80"}"#);
        assert_eq!(
            oracle(&base).latest_version("java"),
            Some(VersionRecord::new("1.7.0_80"))
        );
    }

    #[test]
    fn fetches_legacy_graylist() {
        let base = serve_once("200 OK", r#"["toolbar"]"#);
        assert_eq!(
            oracle(&base).graylist(),
            Some(vec![GraylistRule::contains("toolbar")])
        );
    }

    #[test]
    fn non_success_status_is_absent() {
        let base = serve_once("404 Not Found", "{}");
        let o = oracle(&base);
        assert!(matches!(
            o.try_latest_version("flash"),
            Err(OracleError::Status(404))
        ));
    }

    #[test]
    fn malformed_body_is_absent() {
        let base = serve_once("200 OK", "not json");
        assert_eq!(oracle(&base).latest_version("reader"), None);
    }

    #[test]
    fn unreachable_endpoint_is_absent() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let o = oracle(&format!("http://{addr}"));
        assert_eq!(o.latest_version("java"), None);
        assert_eq!(o.graylist(), None);
    }
}
