//! Mesh MCP client using the official rmcp SDK
//!
//! Connects to the Heurist Mesh tool server over Streamable HTTP. The
//! transport and connector traits form the seam that lets the tool cache be
//! tested without a live server.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, ClientCapabilities, ClientInfo, Implementation, RawContent},
    service::RunningService,
    transport::{
        streamable_http_client::StreamableHttpClientTransportConfig, StreamableHttpClientTransport,
    },
    RoleClient, ServiceExt,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Mesh client errors
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("Connection already closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type MeshResult<T> = Result<T, MeshError>;

/// A tool advertised by the Mesh server
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<rmcp::model::Tool> for ToolDescriptor {
    fn from(tool: rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.map(|s| s.to_string()).unwrap_or_default(),
            // input_schema is Arc<JsonObject>, convert to Value
            input_schema: serde_json::to_value(tool.input_schema.as_ref()).unwrap_or_default(),
        }
    }
}

/// An established connection to a Mesh server
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// List the server's full tool catalog
    async fn list_tools(&self) -> MeshResult<Vec<ToolDescriptor>>;

    /// Call a tool by name and return its output as JSON
    async fn call_tool(&self, name: &str, arguments: Value) -> MeshResult<Value>;

    /// Release the connection. Safe to call once; later calls are no-ops.
    async fn close(&self) -> MeshResult<()>;
}

/// Opens connections to a Mesh server
#[async_trait]
pub trait MeshConnector: Send + Sync {
    async fn connect(&self) -> MeshResult<Arc<dyn MeshTransport>>;
}

/// Mesh client over rmcp's Streamable HTTP transport
pub struct MeshClient {
    service: Mutex<Option<RunningService<RoleClient, ClientInfo>>>,
}

impl MeshClient {
    /// Connect to a Mesh server over HTTP. A bearer token, when present, is
    /// sent as a default `Authorization` header; absence simply omits it.
    pub async fn connect_http(url: &str, bearer_token: Option<&str>) -> MeshResult<Self> {
        tracing::info!(url, auth = bearer_token.is_some(), "connecting to mesh server");

        let config = StreamableHttpClientTransportConfig::with_uri(url.to_string());
        let transport = match bearer_token {
            Some(token) => {
                let mut headers = reqwest::header::HeaderMap::new();
                let mut value =
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                        .map_err(|e| MeshError::ConnectionFailed(e.to_string()))?;
                value.set_sensitive(true);
                headers.insert(reqwest::header::AUTHORIZATION, value);
                let http = reqwest::Client::builder()
                    .default_headers(headers)
                    .build()
                    .map_err(|e| MeshError::ConnectionFailed(e.to_string()))?;
                StreamableHttpClientTransport::with_client(http, config)
            }
            None => StreamableHttpClientTransport::with_client(
                reqwest::Client::default(),
                config,
            ),
        };

        let client_info = ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "surf-core".to_string(),
                title: Some("Surf".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                website_url: None,
                icons: None,
            },
        };

        let service = client_info
            .serve(transport)
            .await
            .map_err(|e| MeshError::InitializationFailed(e.to_string()))?;

        tracing::debug!("mesh connection initialized");

        Ok(Self {
            service: Mutex::new(Some(service)),
        })
    }
}

#[async_trait]
impl MeshTransport for MeshClient {
    async fn list_tools(&self) -> MeshResult<Vec<ToolDescriptor>> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(MeshError::Closed)?;

        let result = service
            .list_tools(Default::default())
            .await
            .map_err(|e| MeshError::Protocol(e.to_string()))?;

        tracing::debug!(count = result.tools.len(), "listed mesh tools");

        Ok(result.tools.into_iter().map(ToolDescriptor::from).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> MeshResult<Value> {
        let guard = self.service.lock().await;
        let service = guard.as_ref().ok_or(MeshError::Closed)?;

        let params = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments: arguments.as_object().cloned(),
            task: None,
        };

        let result = service
            .call_tool(params)
            .await
            .map_err(|e| MeshError::ToolCallFailed(e.to_string()))?;

        // Join text content and prefer structured JSON when the text parses
        let text = result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            return Err(MeshError::ToolCallFailed(text));
        }

        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    async fn close(&self) -> MeshResult<()> {
        let service = self.service.lock().await.take();
        if let Some(service) = service {
            tracing::debug!("closing mesh connection");
            service
                .cancel()
                .await
                .map_err(|e| MeshError::Protocol(e.to_string()))?;
        }
        Ok(())
    }
}

/// Connector that opens `MeshClient` connections to a fixed URL
pub struct HttpMeshConnector {
    url: String,
    bearer_token: Option<String>,
}

impl HttpMeshConnector {
    pub fn new(url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token,
        }
    }
}

#[async_trait]
impl MeshConnector for HttpMeshConnector {
    async fn connect(&self) -> MeshResult<Arc<dyn MeshTransport>> {
        let client = MeshClient::connect_http(&self.url, self.bearer_token.as_deref()).await?;
        Ok(Arc::new(client))
    }
}
