//! MCP client for querying a running helper
//!
//! One short-lived streamable-HTTP session per query. Failures surface as
//! `RateLimited`, `AuthFailed` or `QueryError`; nothing is retried.

use crate::query::{
    extract_library_id, extract_library_title, library_matches, DocsQuery, LibraryRef,
};
use crate::{CoreError, Result};
use rmcp::{
    model::CallToolRequestParam,
    service::{RoleClient, RunningService, ServiceExt},
    transport::StreamableHttpClientTransport,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Tool that maps a library name to a library id
pub const RESOLVE_TOOL: &str = "resolve-library-id";
/// Tool that returns documentation for a library id
pub const QUERY_TOOL: &str = "query-docs";

/// MCP endpoint of the helper listening on `port`
pub fn endpoint(host: &str, port: u16) -> String {
    format!("http://{host}:{port}/mcp")
}

/// Client bound to one helper endpoint
#[derive(Debug, Clone)]
pub struct DocsClient {
    url: String,
}

impl DocsClient {
    /// Client for an explicit endpoint URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Client for the helper on `host:port`
    pub fn for_port(host: &str, port: u16) -> Self {
        Self::new(endpoint(host, port))
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<RunningService<RoleClient, ()>> {
        debug!("Connecting to helper at {}", self.url);
        let transport = StreamableHttpClientTransport::from_uri(self.url.clone());
        ().serve(transport).await.map_err(|e| {
            let message = e.to_string();
            match classify_failure("initialize", &message) {
                err if err.is_credential_related() => err,
                _ => CoreError::QueryError(format!(
                    "could not connect to helper at {} (is it running?): {}",
                    self.url, message
                )),
            }
        })
    }

    /// Run `query`, resolving a library name first when needed, and return
    /// the documentation text.
    pub async fn fetch(&self, query: &DocsQuery) -> Result<String> {
        let service = self.connect().await?;
        let result = self.fetch_with(&service, query).await;
        if let Err(e) = service.cancel().await {
            debug!("Helper session did not shut down cleanly: {}", e);
        }
        result
    }

    async fn fetch_with(
        &self,
        service: &RunningService<RoleClient, ()>,
        query: &DocsQuery,
    ) -> Result<String> {
        let library_id = match &query.library {
            LibraryRef::Id(id) => id.clone(),
            LibraryRef::Name(name) => {
                let text = call_text(
                    service,
                    RESOLVE_TOOL,
                    json!({ "libraryName": name, "query": query.query_text() }),
                )
                .await?;
                let id = extract_library_id(&text).ok_or_else(|| {
                    CoreError::QueryError(format!("no library found matching '{}'", name))
                })?;
                let title = extract_library_title(&text).unwrap_or_default();
                if library_matches(name, &id, &title) {
                    info!("Resolved '{}' to {}", name, id);
                } else {
                    warn!(
                        "'{}' resolved to an unexpected library: {} ({}); pass --library-id to pick one explicitly",
                        name, title, id
                    );
                }
                id
            }
        };

        call_text(
            service,
            QUERY_TOOL,
            json!({ "libraryId": library_id, "query": query.query_text() }),
        )
        .await
    }
}

async fn call_text(
    service: &RunningService<RoleClient, ()>,
    tool: &str,
    arguments: Value,
) -> Result<String> {
    debug!("Calling {} with {}", tool, arguments);
    let res = service
        .call_tool(CallToolRequestParam {
            name: tool.to_string().into(),
            arguments: arguments.as_object().cloned(),
        })
        .await
        .map_err(|e| classify_failure(tool, &e.to_string()))?;

    let value = serde_json::to_value(res)?;
    let text = extract_text(&value)
        .ok_or_else(|| CoreError::QueryError(format!("{} returned no text content", tool)))?;
    if value.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        return Err(classify_failure(tool, &text));
    }
    Ok(text)
}

/// Sort a failed tool call into rate-limit, authentication or plain query
/// errors by its message.
pub fn classify_failure(tool: &str, message: &str) -> CoreError {
    const RATE_LIMIT: [&str; 2] = ["rate limit", "too many requests"];
    const AUTH: [&str; 3] = ["unauthorized", "api key", "authentication"];

    let lower = message.to_lowercase();
    let detail = format!("{}: {}", tool, message.trim());
    if RATE_LIMIT.iter().any(|p| lower.contains(p)) || has_status(&lower, "429") {
        CoreError::RateLimited(detail)
    } else if AUTH.iter().any(|p| lower.contains(p)) {
        CoreError::AuthFailed(detail)
    } else {
        CoreError::QueryError(detail)
    }
}

/// `code` as a standalone number, so ports and pids containing it don't count
fn has_status(text: &str, code: &str) -> bool {
    let bytes = text.as_bytes();
    text.match_indices(code).any(|(i, _)| {
        let before = i.checked_sub(1).map(|j| bytes[j].is_ascii_digit());
        let after = bytes.get(i + code.len()).map(u8::is_ascii_digit);
        before != Some(true) && after != Some(true)
    })
}

/// Join the text items of a serialized tool result
pub fn extract_text(result: &Value) -> Option<String> {
    let parts: Vec<&str> = result
        .get("content")?
        .as_array()?
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}
