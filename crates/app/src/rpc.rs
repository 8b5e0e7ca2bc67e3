//! Line-delimited JSON-RPC 2.0 tool server.
//!
//! Each stdin line is one request; each response is written as one stdout
//! line. Logs go to stderr so they never interleave with frames.

use programme_rag_core::{Embedder, RetrievalOrchestrator, SearchError, VectorBackend};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "programme-rag";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;
const NOT_FOUND: i64 = -32004;

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

impl From<SearchError> for RpcError {
    fn from(value: SearchError) -> Self {
        match value {
            SearchError::NotFound { id } => Self {
                code: NOT_FOUND,
                message: "Not found".to_string(),
                data: Some(json!({ "id": id })),
            },
            SearchError::InvalidArgument(details) => Self::invalid_params(details),
            other => Self {
                code: INTERNAL_ERROR,
                message: "Internal error".to_string(),
                data: Some(json!({ "detail": other.to_string() })),
            },
        }
    }
}

fn result_frame(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_frame(id: Value, error: RpcError) -> Value {
    let mut body = json!({ "code": error.code, "message": error.message });
    if let Some(data) = error.data {
        body["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": body })
}

pub fn tool_definitions(max_top_k: usize) -> Value {
    json!({
        "tools": [
            {
                "name": "rag.search",
                "description": "Semantic search over degree programmes with intent filters and reranking.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "top_k": {"type": "integer", "minimum": 1, "maximum": max_top_k}
                    },
                    "required": ["query"]
                }
            },
            {
                "name": "rag.get",
                "description": "Fetch a stored chunk by id (text + metadata).",
                "inputSchema": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"]
                }
            }
        ]
    })
}

pub struct ToolServer<B, E>
where
    B: VectorBackend,
    E: Embedder,
{
    orchestrator: RetrievalOrchestrator<B, E>,
}

impl<B, E> ToolServer<B, E>
where
    B: VectorBackend,
    E: Embedder,
{
    pub fn new(orchestrator: RetrievalOrchestrator<B, E>) -> Self {
        Self { orchestrator }
    }

    /// Handles one raw line. Blank lines and notifications produce no frame.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => return Some(error_frame(Value::Null, RpcError::new(PARSE_ERROR, "Parse error"))),
        };

        let Some(object) = request.as_object() else {
            return Some(error_frame(Value::Null, RpcError::new(INVALID_REQUEST, "Invalid Request")));
        };
        let id = object.get("id").cloned();
        if object.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Some(error_frame(
                id.unwrap_or(Value::Null),
                RpcError::new(INVALID_REQUEST, "Invalid Request"),
            ));
        }

        let method = object.get("method").and_then(Value::as_str).unwrap_or_default();
        if id.is_none() && method.starts_with("notifications/") {
            debug!(method, "notification ignored");
            return None;
        }

        let empty = json!({});
        let params = match object.get("params") {
            Some(Value::Null) | None => &empty,
            Some(params) => params,
        };

        let id = id.unwrap_or(Value::Null);
        match self.dispatch(method, params).await {
            Ok(result) => Some(result_frame(id, result)),
            Err(rpc_error) => {
                if rpc_error.code == INTERNAL_ERROR {
                    error!(method, error = ?rpc_error.data, "unhandled server error");
                }
                Some(error_frame(id, rpc_error))
            }
        }
    }

    async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {
                    "tools": {},
                    "prompts": {},
                    "resources": {},
                    "logging": {"level": "info"}
                }
            })),
            "tools/list" | "tools.list" => Ok(tool_definitions(self.orchestrator.config().max_top_k)),
            "tools/call" | "tools.call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::invalid_params("tool name is required"))?;
                let empty = json!({});
                let arguments = match params.get("arguments") {
                    Some(Value::Null) | None => &empty,
                    Some(arguments) => arguments,
                };

                let result = self.call_tool(name, arguments).await?;
                let text = serde_json::to_string(&result)
                    .map_err(|error| RpcError::from(SearchError::from(error)))?;
                Ok(json!({
                    "content": [{"type": "text", "text": text}],
                    "structuredContent": result,
                }))
            }
            "ping" => {
                let ts = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs_f64())
                    .unwrap_or_default();
                Ok(json!({"ok": true, "ts": ts}))
            }
            other => Err(RpcError::new(METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        }
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<Value, RpcError> {
        match name {
            "rag.search" => {
                let query = match arguments.get("query") {
                    None | Some(Value::Null) => "",
                    Some(Value::String(query)) => query.as_str(),
                    Some(_) => return Err(RpcError::invalid_params("query must be a string")),
                };
                let config = self.orchestrator.config();
                let top_k = match arguments.get("top_k") {
                    None | Some(Value::Null) => config.default_top_k,
                    Some(value) => value
                        .as_u64()
                        .and_then(|top_k| usize::try_from(top_k).ok())
                        .filter(|top_k| (1..=config.max_top_k).contains(top_k))
                        .ok_or_else(|| {
                            RpcError::invalid_params(format!(
                                "top_k must be an integer between 1 and {}",
                                config.max_top_k
                            ))
                        })?,
                };

                debug!(query, top_k, "rag.search: request");
                let response = self.orchestrator.search(query, top_k).await?;
                let preview = response
                    .results
                    .iter()
                    .take(5)
                    .map(|candidate| {
                        json!({
                            "id": candidate.id,
                            "section": candidate.metadata.section,
                            "programme": candidate.metadata.programme_name,
                        })
                    })
                    .collect::<Vec<_>>();
                info!(query, top_k, preview = %serde_json::Value::Array(preview), "rag.search: response");

                serde_json::to_value(response).map_err(|error| RpcError::from(SearchError::from(error)))
            }
            "rag.get" => {
                let id = arguments
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::invalid_params("id must be a string"))?;

                debug!(id, "rag.get: request");
                let chunk = self.orchestrator.get_by_id(id).await?;
                info!(id, section = %chunk.metadata.section, "rag.get: response");

                serde_json::to_value(chunk).map_err(|error| RpcError::from(SearchError::from(error)))
            }
            other => Err(RpcError::invalid_params(format!("Unknown tool: {other}"))),
        }
    }

    pub async fn serve_stdio(&self) -> anyhow::Result<()> {
        info!(transport = "stdio", tools = "rag.search,rag.get", "tool server started");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if let Some(frame) = self.handle_line(&line).await {
                let mut encoded = serde_json::to_string(&frame)?;
                encoded.push('\n');
                stdout.write_all(encoded.as_bytes()).await?;
                stdout.flush().await?;
            }
        }

        info!("stdin closed, tool server stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use programme_rag_core::{
        index_records, CharacterNgramEmbedder, MemoryBackend, ProgrammeRecord, ProgrammeResolver,
        Reranker, RetrievalConfig,
    };
    use std::sync::Arc;

    async fn server() -> ToolServer<MemoryBackend<CharacterNgramEmbedder>, CharacterNgramEmbedder> {
        let embedder = Arc::new(CharacterNgramEmbedder::default());
        let backend = MemoryBackend::new(Arc::clone(&embedder));
        let records = vec![ProgrammeRecord {
            id: "sunway:soe:bsc-computer-science".to_string(),
            programme_name: "BSc Computer Science".to_string(),
            url: "https://example.edu/cs".to_string(),
            overview_text: "Software engineering and systems.".to_string(),
            ..Default::default()
        }];
        index_records(&backend, &records, None).await.expect("index fixture");

        let resolver = ProgrammeResolver::with_names(
            embedder,
            0.35,
            vec!["BSc Computer Science".to_string()],
        );
        ToolServer::new(RetrievalOrchestrator::with_config(
            backend,
            resolver,
            Reranker::Absent,
            RetrievalConfig::default(),
        ))
    }

    #[tokio::test]
    async fn blank_lines_and_notifications_are_silent() {
        let server = server().await;
        assert!(server.handle_line("   ").await.is_none());
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn malformed_frames_get_protocol_errors() {
        let server = server().await;

        let parse = server.handle_line("{oops").await.expect("frame");
        assert_eq!(parse["error"]["code"], PARSE_ERROR);
        assert_eq!(parse["id"], Value::Null);

        let version = server
            .handle_line(r#"{"jsonrpc":"1.0","id":4,"method":"ping"}"#)
            .await
            .expect("frame");
        assert_eq!(version["error"]["code"], INVALID_REQUEST);
        assert_eq!(version["id"], 4);

        let unknown = server
            .handle_line(r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#)
            .await
            .expect("frame");
        assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn initialize_and_list_tools() {
        let server = server().await;

        let init = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .expect("frame");
        assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["result"]["serverInfo"]["name"], SERVER_NAME);

        let tools = server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools.list"}"#)
            .await
            .expect("frame");
        let names = tools["result"]["tools"]
            .as_array()
            .map(|tools| tools.iter().filter_map(|t| t["name"].as_str()).collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(names, vec!["rag.search", "rag.get"]);
    }

    #[tokio::test]
    async fn search_tool_returns_structured_and_text_content() {
        let server = server().await;
        let frame = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"rag.search","arguments":{"query":"How much is BSc Computer Science per year?","top_k":3}}}"#,
            )
            .await
            .expect("frame");

        let structured = &frame["result"]["structuredContent"];
        assert_eq!(structured["results"][0]["metadata"]["section"], "fees");
        assert_eq!(
            structured["results"][0]["metadata"]["programme_name"],
            "BSc Computer Science"
        );

        let text = frame["result"]["content"][0]["text"].as_str().expect("text content");
        let decoded: Value = serde_json::from_str(text).expect("text is json");
        assert_eq!(&decoded, structured);
    }

    #[tokio::test]
    async fn search_tool_validates_top_k() {
        let server = server().await;
        let frame = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"rag.search","arguments":{"query":"fees","top_k":0}}}"#,
            )
            .await
            .expect("frame");
        assert_eq!(frame["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn get_tool_reports_missing_ids() {
        let server = server().await;

        let found = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"rag.get","arguments":{"id":"sunway:soe:bsc-computer-science#overview"}}}"#,
            )
            .await
            .expect("frame");
        assert_eq!(found["result"]["structuredContent"]["metadata"]["section"], "overview");

        let missing = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"rag.get","arguments":{"id":"nope"}}}"#,
            )
            .await
            .expect("frame");
        assert_eq!(missing["error"]["code"], NOT_FOUND);
        assert_eq!(missing["error"]["data"]["id"], "nope");
    }
}
