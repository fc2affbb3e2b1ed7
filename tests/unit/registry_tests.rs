/// Registry, argument binding and path policy through the public API
use mcp_demo::registry::{bind, BindError};
use mcp_demo::tools::{builtin_tools, is_path_safe};
use mcp_demo::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

#[cfg(test)]
mod registry_unit_tests {
    use super::*;

    fn constant_tool(name: &str) -> Tool {
        Tool::new(ToolDescriptor::new(name, "Returns a constant"), |_args| {
            Ok("constant".to_string())
        })
    }

    fn args(value: Value) -> HashMap<String, Value> {
        serde_json::from_value(value).expect("arguments must be an object")
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = ToolRegistry::new(vec![constant_tool("Same"), constant_tool("Same")]);
        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateToolName("Same".to_string()))
        );
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let registry = ToolRegistry::new(vec![constant_tool("Echo")]).unwrap();
        assert!(registry.resolve("Echo").is_ok());
        assert_eq!(
            registry.resolve("echo").err(),
            Some(RegistryError::NotFound("echo".to_string()))
        );
    }

    #[test]
    fn test_empty_registry_is_valid() {
        let registry = ToolRegistry::new(Vec::new()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_builtin_schema_is_an_object_schema() {
        let registry = ToolRegistry::new(builtin_tools(Path::new("/srv/data").to_path_buf()).unwrap()).unwrap();
        let create = registry.resolve("CreateFile").unwrap();
        let schema = create.descriptor.input_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["filePath"]["type"], "string");
        assert_eq!(schema["required"], json!(["filePath"]));
    }

    #[test]
    fn test_tool_server_exposes_builtin_registry() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let server = ToolServer::new(dir.path().to_path_buf()).expect("Failed to create server");

        assert_eq!(server.registry().len(), 6);
        assert!(server.registry().resolve("Echo").is_ok());
    }

    #[test]
    fn test_integer_range_matches_accessor() {
        let params = vec![ParamSpec::required("count", ParamType::Integer, "how many")];

        let too_big = bind(&params, &args(json!({ "count": u64::MAX })));
        assert!(matches!(too_big, Err(BindError::TypeMismatch { .. })));

        let bound = bind(&params, &args(json!({ "count": i64::MAX }))).unwrap();
        assert_eq!(bound.opt_i64("count"), Some(i64::MAX));
    }

    #[test]
    fn test_bind_applies_defaults_and_drops_extras() {
        let params = vec![
            ParamSpec::required("name", ParamType::String, "who"),
            ParamSpec::optional("times", ParamType::Integer, "how often").with_default(json!(1)),
        ];

        let bound = bind(&params, &args(json!({ "name": "x", "extra": true }))).unwrap();
        assert_eq!(bound.opt_str("name"), Some("x"));
        assert_eq!(bound.opt_i64("times"), Some(1));
        assert!(bound.get("extra").is_none());
    }

    #[test]
    fn test_bind_reports_first_problem() {
        let params = vec![
            ParamSpec::required("count", ParamType::Integer, "how many"),
            ParamSpec::required("flag", ParamType::Boolean, "switch"),
        ];

        let missing = bind(&params, &args(json!({ "count": null, "flag": true })));
        assert!(matches!(missing, Err(BindError::MissingArgument { ref param }) if param == "count"));

        let fractional = bind(&params, &args(json!({ "count": 1.5, "flag": true })));
        assert!(matches!(fractional, Err(BindError::TypeMismatch { ref param, .. }) if param == "count"));

        let stringly = bind(&params, &args(json!({ "count": 2, "flag": "true" })));
        assert!(matches!(stringly, Err(BindError::TypeMismatch { ref param, .. }) if param == "flag"));
    }

    #[test]
    fn test_path_policy() {
        let root = Path::new("/srv/data");
        assert!(is_path_safe(root, "notes.txt"));
        assert!(is_path_safe(root, "./a/../b.txt"));
        assert!(!is_path_safe(root, "../etc/passwd"));
        assert!(is_path_safe(root, "/etc/passwd"));
    }
}
