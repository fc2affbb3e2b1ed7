/// Client session against an in-process server over an in-memory pipe
use mcp_demo::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use tokio::task::JoinHandle;

#[cfg(test)]
mod session_integration_tests {
    use super::*;

    async fn start_session(root: &Path) -> (ClientSession, JoinHandle<Result<(), ServerError>>) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let (client_read, client_write) = tokio::io::split(client_side);

        let server = ToolServer::new(root.to_path_buf()).expect("Failed to create server");
        let handle = tokio::spawn(server.serve(server_read, server_write));

        let session = ClientSession::connect(client_read, client_write, SessionOptions::default())
            .await
            .expect("Failed to connect session");

        (session, handle)
    }

    fn args(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, _server) = start_session(dir.path()).await;

        assert_eq!(session.server_info().server_info.name, "MCP Demo Server");

        let output = session
            .call_tool("Echo", args(&[("message", json!("MCP!"))]), None)
            .await
            .expect("Echo failed");
        assert_eq!(output.text(), Some("hello MCP!"));
    }

    #[tokio::test]
    async fn test_list_tools_in_registration_order() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, _server) = start_session(dir.path()).await;

        let tools = session.list_tools().await.expect("tools/list failed");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Echo", "CreateFile", "DeleteFile", "FileExists", "ReadFile", "GetFileInfo"]
        );
        assert!(tools.iter().all(|t| !t.description.is_empty()));

        let create = &tools[1];
        assert_eq!(create.parameters[0].name, "filePath");
        assert!(create.parameters[0].required);
        assert!(!create.parameters[1].required);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_fault_and_session_survives() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, _server) = start_session(dir.path()).await;

        let err = session
            .call_tool("DoesNotExist", HashMap::new(), None)
            .await
            .unwrap_err();
        match err {
            ClientError::Fault(fault) => {
                assert_eq!(fault.kind, FaultKind::NotFound);
                assert!(fault.message.contains("DoesNotExist"));
            }
            other => panic!("expected a fault, got {:?}", other),
        }

        let output = session
            .call_tool("Echo", args(&[("message", json!("again"))]), None)
            .await
            .expect("session should still work");
        assert_eq!(output.text(), Some("hello again"));
    }

    #[tokio::test]
    async fn test_missing_argument_runs_nothing() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, _server) = start_session(dir.path()).await;

        let err = session
            .call_tool("CreateFile", args(&[("content", json!("x"))]), None)
            .await
            .unwrap_err();
        assert_eq!(err.fault_kind(), Some(FaultKind::MissingArgument));

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_wrong_argument_type_is_rejected() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, _server) = start_session(dir.path()).await;

        let err = session
            .call_tool("Echo", args(&[("message", json!(42))]), None)
            .await
            .unwrap_err();
        assert_eq!(err.fault_kind(), Some(FaultKind::TypeMismatch));
    }

    #[tokio::test]
    async fn test_escaping_path_is_refused_without_side_effects() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().join("work");
        std::fs::create_dir(&root).unwrap();
        let (session, _server) = start_session(&root).await;

        let err = session
            .call_tool(
                "CreateFile",
                args(&[("filePath", json!("../outside.txt")), ("content", json!("nope"))]),
                None,
            )
            .await
            .unwrap_err();
        match err {
            ClientError::Fault(fault) => {
                assert_eq!(fault.kind, FaultKind::ToolFailed);
                assert!(fault.message.contains("unsafe file path"));
                assert!(fault.message.contains("../outside.txt"));
            }
            other => panic!("expected a fault, got {:?}", other),
        }
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_file_lifecycle() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, _server) = start_session(dir.path()).await;

        let created = session
            .call_tool(
                "CreateFile",
                args(&[("filePath", json!("notes/today.txt")), ("content", json!("remember"))]),
                None,
            )
            .await
            .expect("CreateFile failed");
        assert!(created.text().unwrap().starts_with("File created successfully"));
        assert!(dir.path().join("notes/today.txt").is_file());

        let read = session
            .call_tool("ReadFile", args(&[("filePath", json!("notes/today.txt"))]), None)
            .await
            .expect("ReadFile failed");
        assert!(read.text().unwrap().contains("remember"));

        let info = session
            .call_tool("GetFileInfo", args(&[("path", json!("notes"))]), None)
            .await
            .expect("GetFileInfo failed");
        assert!(info.text().unwrap().starts_with("Directory information"));

        session
            .call_tool("DeleteFile", args(&[("filePath", json!("notes/today.txt"))]), None)
            .await
            .expect("DeleteFile failed");

        let exists = session
            .call_tool("FileExists", args(&[("filePath", json!("notes/today.txt"))]), None)
            .await
            .expect("FileExists failed");
        assert!(exists.text().unwrap().starts_with("File does not exist"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_get_their_own_results() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, _server) = start_session(dir.path()).await;

        let calls = (0..10).map(|i| {
            let session = &session;
            async move {
                session
                    .call_tool("Echo", args(&[("message", json!(format!("#{}", i)))]), None)
                    .await
            }
        });
        let results = futures::future::join_all(calls).await;

        for (i, result) in results.into_iter().enumerate() {
            let output = result.expect("Echo failed");
            assert_eq!(output.text(), Some(format!("hello #{}", i).as_str()));
        }
    }

    #[tokio::test]
    async fn test_shutdown_ends_the_server_loop() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let (session, server) = start_session(dir.path()).await;

        session.shutdown().await.expect("shutdown failed");

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
        assert!(outcome.is_ok());
    }
}
