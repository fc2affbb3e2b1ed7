//! Built-in tools exposed by the server
//!
//! Each tool is a plain function over validated arguments returning text;
//! none of them knows anything about the protocol.

pub mod echo;
pub mod file;

pub use echo::*;
pub use file::*;

use std::path::PathBuf;

use crate::registry::Tool;

/// Every built-in tool, in the order clients will see them
///
/// File tools resolve relative paths against `root`.
pub fn builtin_tools(root: PathBuf) -> std::io::Result<Vec<Tool>> {
    let mut tools = vec![echo_tool()];
    tools.extend(file_tools(root)?);
    Ok(tools)
}
