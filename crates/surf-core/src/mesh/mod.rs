//! Mesh tool access: MCP client, connector seam, and the TTL'd tool cache

mod cache;
mod client;

pub use cache::{Clock, SystemClock, ToolCache, ALLOWED_TOOLS, DEFAULT_TOOL_TTL};
pub use client::{
    HttpMeshConnector, MeshClient, MeshConnector, MeshError, MeshResult, MeshTransport,
    ToolDescriptor,
};
