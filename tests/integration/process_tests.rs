/// Client session against the server binary running as a child process
use mcp_demo::*;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

#[cfg(test)]
mod process_integration_tests {
    use super::*;

    fn server_command(root: &std::path::Path) -> ServerCommand {
        ServerCommand::new(env!("CARGO_BIN_EXE_mcp-demo-server"))
            .arg("--root")
            .arg(root.display().to_string())
    }

    #[tokio::test]
    async fn test_spawned_server_workflow() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let session = ClientSession::spawn(&server_command(dir.path()), SessionOptions::default())
            .await
            .expect("Failed to spawn server");

        let tools = session.list_tools().await.expect("tools/list failed");
        assert_eq!(tools.len(), 6);

        let mut arguments = HashMap::new();
        arguments.insert("message".to_string(), json!("MCP!"));
        let output = session
            .call_tool("Echo", arguments, Some(Duration::from_secs(10)))
            .await
            .expect("Echo failed");
        assert_eq!(output.text(), Some("hello MCP!"));

        let mut arguments = HashMap::new();
        arguments.insert("filePath".to_string(), json!("spawned.txt"));
        arguments.insert("content".to_string(), json!("from a child process"));
        session
            .call_tool("CreateFile", arguments, None)
            .await
            .expect("CreateFile failed");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("spawned.txt")).unwrap(),
            "from a child process"
        );

        session.shutdown().await.expect("shutdown failed");
    }

    #[tokio::test]
    async fn test_missing_server_binary_fails_to_start() {
        let command = ServerCommand::new("/definitely/not/a/real/mcp-server");
        let err = ClientSession::spawn(&command, SessionOptions::default())
            .await
            .err()
            .expect("spawn should fail");
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn test_server_that_exits_immediately_fails_handshake() {
        // `true` exits without answering, so the handshake sees a closed channel
        let command = ServerCommand::new("true");
        let result = ClientSession::spawn(&command, SessionOptions::default()).await;
        assert!(matches!(result, Err(ClientError::TransportClosed) | Err(ClientError::Transport(_))));
    }
}
