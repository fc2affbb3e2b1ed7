/// Message codec behaviour through the public API
use mcp_demo::mcp::protocol::{decode, encode, error_codes};
use mcp_demo::mcp::{Message, RequestId, RpcError};
use serde_json::json;

#[cfg(test)]
mod codec_unit_tests {
    use super::*;

    #[test]
    fn test_request_frame_is_a_single_line() {
        let message = Message::request(
            RequestId::Number(7),
            "tools/call",
            Some(json!({ "name": "Echo", "arguments": { "message": "multi\nline" } })),
        );

        let frame = encode(&message).unwrap();
        assert!(!frame.contains('\n'));
        assert_eq!(decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_error_response_keeps_code_and_message() {
        let message = Message::error(
            RequestId::String("abc".to_string()),
            RpcError::new(error_codes::TOOL_NOT_FOUND, "Unknown tool: Nope"),
        );

        let decoded = decode(&encode(&message).unwrap()).unwrap();
        match decoded {
            Message::Response { id, outcome: Err(error) } => {
                assert_eq!(id, RequestId::String("abc".to_string()));
                assert_eq!(error.code, error_codes::TOOL_NOT_FOUND);
                assert_eq!(error.message, "Unknown tool: Nope");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_null_result_is_still_a_success() {
        let decoded = decode(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        assert_eq!(decoded, Message::success(RequestId::Number(3), json!(null)));
    }

    #[test]
    fn test_notification_has_no_id() {
        let decoded = decode(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(decoded, Message::Notification { ref method, .. } if method == "notifications/initialized"));
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        assert!(decode("{not json").is_err());
        assert!(decode(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).is_err());
        assert!(decode(r#"{"jsonrpc":"2.0","id":1}"#).is_err());
        assert!(decode("[1,2,3]").is_err());
    }
}
