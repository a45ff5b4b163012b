//! `RemoteTransport` over the worker's JSON HTTP API.

use super::RemoteTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ferry_common::{
    PortAllocated, PortDeallocation, PortRelease, PortRequest, PortsReleased, RemoteServer,
    RemoteStatus, RunRegistered, RunSubmission,
};
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;

const USER_AGENT: &str = concat!("ferry/", env!("CARGO_PKG_VERSION"));

/// HTTP client for worker nodes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// A transport whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn request(&self, server: &RemoteServer, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", server.base_url(), path);
        let builder = self
            .client
            .request(method, url)
            .header("User-Agent", USER_AGENT);
        match &server.username {
            Some(username) => builder.basic_auth(username, server.password.as_deref()),
            None => builder,
        }
    }

    async fn post_run_action(&self, server: &RemoteServer, run_id: &str, action: &str) -> Result<()> {
        let resp = self
            .request(server, Method::POST, &format!("/runs/{}/{}", run_id, action))
            .send()
            .await
            .with_context(|| format!("Failed to send {} request for run {} to {}", action, run_id, server))?;
        ensure_success(resp, &format!("{} of run {} on {}", action, run_id, server)).await?;
        Ok(())
    }
}

/// Turn a non-2xx reply into an error carrying the worker's message.
async fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{} returned {}: {}", what, status, body.trim())
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn register(&self, server: &RemoteServer, submission: &RunSubmission) -> Result<String> {
        let resp = self
            .request(server, Method::POST, "/runs")
            .json(submission)
            .send()
            .await
            .with_context(|| format!("Failed to send pipeline '{}' to {}", submission.pipeline.name, server))?;
        let registered: RunRegistered = ensure_success(resp, &format!("Registration on {}", server))
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse registration reply from {}", server))?;
        Ok(registered.run_id)
    }

    async fn prepare(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
        self.post_run_action(server, run_id, "prepare").await
    }

    async fn start(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
        self.post_run_action(server, run_id, "start").await
    }

    async fn status(&self, server: &RemoteServer, run_id: &str) -> Result<RemoteStatus> {
        let resp = self
            .request(server, Method::GET, &format!("/runs/{}", run_id))
            .send()
            .await
            .with_context(|| format!("Failed to fetch status of run {} from {}", run_id, server))?;
        ensure_success(resp, &format!("Status of run {} on {}", run_id, server))
            .await?
            .json::<RemoteStatus>()
            .await
            .with_context(|| format!("Failed to parse status of run {} from {}", run_id, server))
    }

    async fn stop(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
        self.post_run_action(server, run_id, "stop").await
    }

    async fn cleanup(&self, server: &RemoteServer, run_id: &str) -> Result<()> {
        self.post_run_action(server, run_id, "cleanup").await
    }

    async fn allocate_port(&self, server: &RemoteServer, request: &PortRequest) -> Result<u16> {
        let resp = self
            .request(server, Method::POST, "/ports/allocate")
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to send port allocation to {}", server))?;
        let allocated: PortAllocated = ensure_success(resp, &format!("Port allocation on {}", server))
            .await?
            .json()
            .await
            .context("Failed to parse port allocation reply")?;
        Ok(allocated.port)
    }

    async fn deallocate_port(&self, server: &RemoteServer, host: &str, port: u16) -> Result<()> {
        let body = PortDeallocation {
            host: host.to_string(),
            port,
        };
        let resp = self
            .request(server, Method::POST, "/ports/deallocate")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send port deallocation to {}", server))?;
        ensure_success(resp, &format!("Port deallocation on {}", server)).await?;
        Ok(())
    }

    async fn release_ports(&self, server: &RemoteServer, pipeline_name: &str) -> Result<usize> {
        let body = PortRelease {
            pipeline_name: pipeline_name.to_string(),
        };
        let resp = self
            .request(server, Method::POST, "/ports/release")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send port release to {}", server))?;
        let released: PortsReleased = ensure_success(resp, &format!("Port release on {}", server))
            .await?
            .json()
            .await
            .context("Failed to parse port release reply")?;
        Ok(released.released)
    }
}
