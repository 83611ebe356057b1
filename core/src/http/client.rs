use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Proxy, Response};
use url::Url;

use super::{classify, parse_target, RequestIssuer};
use crate::core::Outcome;
use crate::error::Result;
use crate::GeneratorConfig;

const USER_AGENT: &str = concat!("loadgen/", env!("CARGO_PKG_VERSION"));

/// Issues plain GET requests against a single target.
pub struct HttpIssuer {
    inner: Client,
    target: Url,
    default_headers: HeaderMap,
}

impl HttpIssuer {
    pub fn new(
        target: &str,
        timeout: Duration,
        proxy_url: Option<&str>,
        custom_headers: &[(String, String)],
    ) -> Result<Self> {
        let target = parse_target(target)?;

        let mut builder = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT);

        if let Some(proxy) = proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        let inner = builder.build()?;

        let mut default_headers = HeaderMap::new();
        for (key, val) in custom_headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(val),
            ) {
                (Ok(name), Ok(value)) => {
                    default_headers.insert(name, value);
                }
                _ => warn!("Skipping invalid header '{}: {}'", key, val),
            }
        }

        Ok(Self {
            inner,
            target,
            default_headers,
        })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        Self::new(
            &config.target,
            Duration::from_secs(config.timeout),
            config.proxy_ref(),
            &config.parsed_headers(),
        )
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub async fn get(&self) -> std::result::Result<Response, reqwest::Error> {
        self.inner
            .get(self.target.as_str())
            .headers(self.default_headers.clone())
            .send()
            .await
    }
}

#[async_trait]
impl RequestIssuer for HttpIssuer {
    async fn issue(&self) -> Outcome {
        let response = match self.get().await {
            Ok(response) => response,
            Err(e) => return classify(&e),
        };

        let status = response.status().as_u16();
        // Read the body so the connection goes back to the pool.
        match response.bytes().await {
            Ok(_) => Outcome::Completed(status),
            Err(e) => classify(&e),
        }
    }
}
