//! Stdio MCP client used by `connect` in scripts.
//!
//! Spawns the server as a child process and speaks MCP over its
//! stdin/stdout through the rmcp client.

use crate::dsl::{ConnectSpec, Connector, DslError, DslResult, ToolClient, ToolContent, ToolOutput};
use async_trait::async_trait;
use rmcp::model::CallToolRequestParams;
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{json, Map, Value};
use tokio::process::Command;

/// Opens a new child-process session per `connect`.
#[derive(Debug, Default, Clone)]
pub struct StdioConnector;

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(&self, spec: &ConnectSpec) -> DslResult<Box<dyn ToolClient>> {
        let client = McpClient::spawn(spec).await?;
        Ok(Box::new(client))
    }
}

pub struct McpClient {
    service: Option<RunningService<RoleClient, ()>>,
}

impl McpClient {
    /// Start the server process and run the MCP handshake.
    pub async fn spawn(spec: &ConnectSpec) -> DslResult<Self> {
        let mut command = Command::new(&spec.command);
        command.args(&spec.args);
        command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let transport = TokioChildProcess::new(command)
            .map_err(|e| DslError::Client(format!("failed to connect: {}", e)))?;
        let service = ()
            .serve(transport)
            .await
            .map_err(|e| DslError::Client(format!("failed to connect: {}", e)))?;

        if let Some(info) = service.peer_info() {
            tracing::info!(
                "Connected to MCP server {} {}",
                info.server_info.name,
                info.server_info.version
            );
        }

        Ok(Self {
            service: Some(service),
        })
    }

    fn service(&self) -> DslResult<&RunningService<RoleClient, ()>> {
        self.service
            .as_ref()
            .ok_or_else(|| DslError::Client("client is closed".to_string()))
    }
}

#[async_trait]
impl ToolClient for McpClient {
    async fn call_tool(&mut self, name: &str, args: Map<String, Value>) -> DslResult<ToolOutput> {
        let params: CallToolRequestParams =
            serde_json::from_value(json!({ "name": name, "arguments": args }))
                .map_err(|e| DslError::Client(format!("tool call failed: {}", e)))?;

        tracing::debug!("Calling tool {}", name);
        let result = self
            .service()?
            .call_tool(params)
            .await
            .map_err(|e| DslError::Client(format!("tool call failed: {}", e)))?;

        let content = result
            .content
            .iter()
            .map(|item| match item.as_text() {
                Some(text) => ToolContent::Text(text.text.clone()),
                None => ToolContent::Other(serde_json::to_value(item).unwrap_or(Value::Null)),
            })
            .collect();

        Ok(ToolOutput {
            content,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn list_tools(&mut self) -> DslResult<Vec<String>> {
        let tools = self
            .service()?
            .list_all_tools()
            .await
            .map_err(|e| DslError::Client(format!("failed to list tools: {}", e)))?;
        Ok(tools.into_iter().map(|tool| tool.name.to_string()).collect())
    }

    async fn close(&mut self) -> DslResult<()> {
        let Some(service) = self.service.take() else {
            return Ok(());
        };
        service
            .cancel()
            .await
            .map_err(|e| DslError::Client(format!("failed to close client: {}", e)))?;
        Ok(())
    }
}
