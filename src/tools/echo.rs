//! Tool for echoing a message back to the client

use crate::registry::{ParamSpec, ParamType, Tool, ToolArguments, ToolDescriptor, ToolError};

/// The Echo tool
pub fn echo_tool() -> Tool {
    Tool::new(
        ToolDescriptor::new("Echo", "Echoes the message back to the client.").param(
            ParamSpec::required("message", ParamType::String, "The message to echo back"),
        ),
        echo,
    )
}

/// Greet the caller with their own message
pub fn echo(args: &ToolArguments) -> Result<String, ToolError> {
    Ok(format!("hello {}", args.str("message")?))
}
