//! InfluxDB v2 HTTP sink

use super::{Point, Precision, SinkConnection, SinkConnector};
use crate::error::SinkError;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

/// Connection settings for an InfluxDB v2 endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    pub precision: Precision,
    /// Create the bucket on first connect when it does not exist
    pub create_bucket: bool,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8087".to_string(),
            token: String::new(),
            org: "graphrag_org".to_string(),
            bucket: "metrics".to_string(),
            timeout_ms: 30_000,
            precision: Precision::S,
            create_bucket: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<NamedResource>,
}

#[derive(Debug, Default, Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<NamedResource>,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    #[serde(default)]
    id: String,
    name: String,
}

/// Opens HTTP connections to InfluxDB
#[derive(Debug, Clone)]
pub struct InfluxConnector {
    config: InfluxConfig,
    write_url: Url,
    health_url: Url,
    buckets_url: Url,
    orgs_url: Url,
    /// Set once the target bucket is known to exist
    bucket_ready: Arc<OnceCell<()>>,
}

impl InfluxConnector {
    pub fn new(config: InfluxConfig) -> Result<Self, SinkError> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| SinkError::Other(format!("invalid sink url {}: {e}", config.url)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut write_url = base
            .join("api/v2/write")
            .map_err(|e| SinkError::Other(e.to_string()))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &config.org)
            .append_pair("bucket", &config.bucket)
            .append_pair("precision", config.precision.as_str());

        let join = |path: &str| base.join(path).map_err(|e| SinkError::Other(e.to_string()));
        let health_url = join("health")?;
        let buckets_url = join("api/v2/buckets")?;
        let orgs_url = join("api/v2/orgs")?;

        Ok(Self {
            config,
            write_url,
            health_url,
            buckets_url,
            orgs_url,
            bucket_ready: Arc::new(OnceCell::new()),
        })
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.config.token)
    }

    /// Look up the target bucket and create it when it is missing
    async fn ensure_bucket(&self, client: &Client) -> Result<(), SinkError> {
        let response = client
            .get(self.buckets_url.clone())
            .query(&[("name", &self.config.bucket), ("org", &self.config.org)])
            .header(header::AUTHORIZATION, self.authorization())
            .send()
            .await?;
        // InfluxDB answers 404 for a name filter that matches nothing
        let existing = match response.status() {
            StatusCode::NOT_FOUND => BucketList::default(),
            status if status.is_success() => response
                .json::<BucketList>()
                .await
                .map_err(|e| SinkError::Other(format!("unexpected bucket list: {e}")))?,
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(status, body));
            }
        };

        if existing.buckets.iter().any(|b| b.name == self.config.bucket) {
            debug!(bucket = %self.config.bucket, "Bucket exists");
            return Ok(());
        }

        let org_id = self.org_id(client).await?;
        let response = client
            .post(self.buckets_url.clone())
            .header(header::AUTHORIZATION, self.authorization())
            .json(&serde_json::json!({
                "orgID": org_id,
                "name": self.config.bucket,
                "retentionRules": [],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        info!(bucket = %self.config.bucket, org = %self.config.org, "Created bucket");
        Ok(())
    }

    async fn org_id(&self, client: &Client) -> Result<String, SinkError> {
        let response = client
            .get(self.orgs_url.clone())
            .query(&[("org", &self.config.org)])
            .header(header::AUTHORIZATION, self.authorization())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let orgs: OrgList = response
            .json()
            .await
            .map_err(|e| SinkError::Other(format!("unexpected organization list: {e}")))?;

        orgs.orgs
            .into_iter()
            .find(|o| o.name == self.config.org)
            .map(|o| o.id)
            .ok_or_else(|| SinkError::Rejected {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: format!("organization {} not found", self.config.org),
            })
    }
}

#[async_trait]
impl SinkConnector for InfluxConnector {
    async fn connect(&self) -> Result<Box<dyn SinkConnection>, SinkError> {
        // One client per connection keeps a dedicated keep-alive socket per worker
        let client = Client::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let mut connection = InfluxConnection {
            client,
            write_url: self.write_url.clone(),
            health_url: self.health_url.clone(),
            token: self.config.token.clone(),
            precision: self.config.precision,
            closed: false,
        };

        connection.ping().await?;

        if self.config.create_bucket {
            let ready = self
                .bucket_ready
                .get_or_try_init(|| self.ensure_bucket(&connection.client))
                .await;
            if let Err(e) = ready {
                // Writes may still succeed with a token scoped to the bucket only
                warn!(bucket = %self.config.bucket, error = %e, "Failed to ensure bucket exists");
            }
        }

        debug!(endpoint = %self.health_url, "Sink connection established");
        Ok(Box::new(connection))
    }

    fn endpoint(&self) -> String {
        self.config.url.clone()
    }
}

/// A single HTTP connection to InfluxDB
#[derive(Debug)]
pub struct InfluxConnection {
    client: Client,
    write_url: Url,
    health_url: Url,
    token: String,
    precision: Precision,
    closed: bool,
}

impl InfluxConnection {
    async fn ping(&mut self) -> Result<(), SinkError> {
        let response = self.client.get(self.health_url.clone()).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let health: HealthResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Other(format!("unexpected health response: {e}")))?;

        if health.status == "pass" {
            Ok(())
        } else {
            Err(SinkError::Connection(format!(
                "sink reports status {}",
                health.status
            )))
        }
    }
}

#[async_trait]
impl SinkConnection for InfluxConnection {
    async fn write_batch(&mut self, points: &[Point]) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if points.is_empty() {
            return Ok(());
        }

        let body = points
            .iter()
            .map(|p| p.to_line(self.precision))
            .collect::<Vec<_>>()
            .join("\n");

        let response = self
            .client
            .post(self.write_url.clone())
            .header(header::AUTHORIZATION, format!("Token {}", self.token))
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }

    async fn health_check(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Sink health check failed");
                false
            }
        }
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        // Writes are sent synchronously, nothing is held client-side
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        Ok(())
    }
}

/// Map a non-success HTTP status to a sink error
pub(crate) fn classify_status(status: StatusCode, body: String) -> SinkError {
    match status.as_u16() {
        401 | 403 => SinkError::Unauthorized(status.as_u16()),
        400 | 413 | 422 => SinkError::MalformedPayload(body),
        408 => SinkError::Timeout(body),
        429 | 500..=599 => SinkError::Server {
            status: status.as_u16(),
            body,
        },
        code => SinkError::Rejected { status: code, body },
    }
}
