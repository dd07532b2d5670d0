//! The request transport the poll loop and sync worker talk through.

use async_trait::async_trait;
use url::Url;

use crate::config::{CometConfig, Endpoints};
use crate::types::{Error, PollResponse};

/// Request/response collaborator.
///
/// Implementations decide how URLs are resolved and how long a poll may be
/// held open; the poll loop treats every `Err` the same way.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET url` and decode the body as a [`PollResponse`].
    async fn poll(&self, url: &str) -> Result<PollResponse, Error>;

    /// `POST url` with `paths` as a JSON array.
    async fn post_paths(&self, url: &str, paths: &[String]) -> Result<(), Error>;
}

/// HTTP transport built on reqwest.
///
/// Requests are restricted to the configured origin. With `relax_origin` the
/// port may differ, but scheme and host must still match.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    origin: Url,
    relax_origin: bool,
}

impl ReqwestTransport {
    pub fn new(config: &CometConfig) -> Result<Self, Error> {
        if config.host.is_empty() {
            return Err(Error::Config(
                "the HTTP transport needs a non-empty host".into(),
            ));
        }
        let origin = Url::parse(Endpoints::from_config(config).origin())?;
        // No overall timeout: a poll is expected to stay open until the
        // server has something to say.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self::with_client(client, origin, config.relax_origin))
    }

    pub fn with_client(client: reqwest::Client, origin: Url, relax_origin: bool) -> Self {
        Self {
            client,
            origin,
            relax_origin,
        }
    }

    /// Resolve `url` against the origin and enforce the origin policy.
    fn resolve(&self, url: &str) -> Result<Url, Error> {
        let resolved = self.origin.join(url)?;
        let same_host = resolved.scheme() == self.origin.scheme()
            && resolved.host_str() == self.origin.host_str();
        let same_port = resolved.port_or_known_default() == self.origin.port_or_known_default();
        if same_host && (same_port || self.relax_origin) {
            Ok(resolved)
        } else {
            Err(Error::CrossOrigin {
                url: resolved.to_string(),
                origin: self.origin.to_string(),
            })
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn poll(&self, url: &str) -> Result<PollResponse, Error> {
        let url = self.resolve(url)?;
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::EmptyBody(url.to_string()));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_paths(&self, url: &str, paths: &[String]) -> Result<(), Error> {
        let url = self.resolve(url)?;
        self.client
            .post(url)
            .json(paths)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
