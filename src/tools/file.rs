//! File tools: create, delete, check, read and inspect files
//!
//! All paths go through the same safety policy before touching the disk.
//! A relative path is resolved against the server root and must stay under
//! it; an absolute path is accepted as given. The containment test is a
//! case-insensitive prefix match on the lexically normalized path, so it
//! does not see through symlinks and a sibling directory whose name
//! extends the root's (e.g. `work2` next to `work`) passes. Known
//! limitation; tighten it before exposing the server to untrusted clients.

use chrono::{DateTime, Local};
use serde_json::json;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::info;

use crate::registry::{ParamSpec, ParamType, Tool, ToolArguments, ToolDescriptor, ToolError};

/// Width of the rulers around file content in `ReadFile` output
const RULER_WIDTH: usize = 40;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The file tools, resolving relative paths against `root`
///
/// A relative `root` is taken from the current working directory. Fails if
/// that directory cannot be determined.
pub fn file_tools(root: PathBuf) -> std::io::Result<Vec<Tool>> {
    let root = if root.is_absolute() {
        root
    } else {
        std::env::current_dir()?.join(root)
    };
    let root: Arc<Path> = Arc::from(lexical_normalize(&root));

    let file_path = |description: &str| ParamSpec::required("filePath", ParamType::String, description);

    Ok(vec![
        Tool::new(
            ToolDescriptor::new(
                "CreateFile",
                "Create a new file and write the given content; supports relative and absolute paths",
            )
            .param(file_path(
                "Path of the file to create (relative like './test.txt' or absolute like '/tmp/test.txt')",
            ))
            .param(
                ParamSpec::optional("content", ParamType::String, "Content to write to the file")
                    .with_default(json!("")),
            ),
            with_root(&root, |root, args| {
                create_file(root, args.str("filePath")?, args.opt_str("content").unwrap_or(""))
            }),
        ),
        Tool::new(
            ToolDescriptor::new(
                "DeleteFile",
                "Delete the given file; supports relative and absolute paths",
            )
            .param(file_path("Path of the file to delete (relative like './test.txt' or absolute)")),
            with_root(&root, |root, args| delete_file(root, args.str("filePath")?)),
        ),
        Tool::new(
            ToolDescriptor::new(
                "FileExists",
                "Check whether a file exists; supports relative and absolute paths",
            )
            .param(file_path("Path of the file to check (relative like './test.txt' or absolute)")),
            with_root(&root, |root, args| file_exists(root, args.str("filePath")?)),
        ),
        Tool::new(
            ToolDescriptor::new(
                "ReadFile",
                "Read the content of a file; supports relative and absolute paths",
            )
            .param(file_path("Path of the file to read (relative like './test.txt' or absolute)")),
            with_root(&root, |root, args| read_file(root, args.str("filePath")?)),
        ),
        Tool::new(
            ToolDescriptor::new("GetFileInfo", "Get detailed information about a file or directory")
                .param(ParamSpec::required(
                    "path",
                    ParamType::String,
                    "Path of the file or directory to inspect",
                )),
            with_root(&root, |root, args| get_file_info(root, args.str("path")?)),
        ),
    ])
}

fn with_root<F>(
    root: &Arc<Path>,
    handler: F,
) -> impl Fn(&ToolArguments) -> Result<String, ToolError> + Send + Sync + 'static
where
    F: Fn(&Path, &ToolArguments) -> Result<String, ToolError> + Send + Sync + 'static,
{
    let root = root.clone();
    move |args| handler(&root, args)
}

/// Resolve `.` and `..` without touching the filesystem
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Turn a user-supplied path into an absolute, normalized one
///
/// `root` must be absolute; a relative root would normalize to a prefix
/// that every path matches.
pub fn normalize_path(root: &Path, input: &str) -> Result<PathBuf, ToolError> {
    if input.trim().is_empty() {
        return Err(ToolError::InvalidArgument("file path cannot be empty".to_string()));
    }
    if !root.is_absolute() {
        return Err(ToolError::InvalidArgument(format!(
            "root directory '{}' is not absolute",
            root.display()
        )));
    }

    let candidate = Path::new(input);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    Ok(lexical_normalize(&joined))
}

/// Whether the policy allows operating on `input`
pub fn is_path_safe(root: &Path, input: &str) -> bool {
    match normalize_path(root, input) {
        Ok(normalized) => {
            let normalized = normalized.to_string_lossy().to_lowercase();
            let root = root.to_string_lossy().to_lowercase();
            normalized.starts_with(&root) || Path::new(input).is_absolute()
        }
        Err(_) => false,
    }
}

fn resolve(root: &Path, input: &str) -> Result<PathBuf, ToolError> {
    let normalized = normalize_path(root, input)?;
    if !is_path_safe(root, input) {
        return Err(ToolError::UnsafePath {
            path: input.to_string(),
        });
    }
    Ok(normalized)
}

/// Display `path` relative to `root`, walking up with `..` where needed
fn relative_display(root: &Path, path: &Path) -> String {
    let root_parts: Vec<Component> = root.components().collect();
    let path_parts: Vec<Component> = path.components().collect();
    let common = root_parts
        .iter()
        .zip(&path_parts)
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 {
        return path.display().to_string();
    }

    let mut relative = PathBuf::new();
    for _ in common..root_parts.len() {
        relative.push("..");
    }
    for part in &path_parts[common..] {
        relative.push(part.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        ".".to_string()
    } else {
        relative.display().to_string()
    }
}

fn location(root: &Path, path: &Path) -> String {
    format!(
        "Absolute path: {}\nRelative path: {}",
        path.display(),
        relative_display(root, path)
    )
}

fn io_error(input: &str) -> impl FnOnce(std::io::Error) -> ToolError + '_ {
    move |source| ToolError::Io {
        path: input.to_string(),
        source,
    }
}

fn format_time(time: std::io::Result<SystemTime>) -> String {
    match time {
        Ok(time) => DateTime::<Local>::from(time).format(TIME_FORMAT).to_string(),
        Err(_) => "unknown".to_string(),
    }
}

/// Create (or overwrite) a file, creating missing parent directories
pub fn create_file(root: &Path, file_path: &str, content: &str) -> Result<String, ToolError> {
    let path = resolve(root, file_path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(io_error(file_path))?;
            info!("Created directory: {}", parent.display());
        }
    }

    fs::write(&path, content).map_err(io_error(file_path))?;

    Ok(format!(
        "File created successfully\n{}\nContent length: {} characters",
        location(root, &path),
        content.chars().count()
    ))
}

/// Delete a file; a missing file is reported, not treated as an error
pub fn delete_file(root: &Path, file_path: &str) -> Result<String, ToolError> {
    let path = resolve(root, file_path)?;

    if !path.is_file() {
        return Ok(format!("File does not exist\n{}", location(root, &path)));
    }

    fs::remove_file(&path).map_err(io_error(file_path))?;
    Ok(format!("File deleted successfully\n{}", location(root, &path)))
}

/// Report whether a file exists
pub fn file_exists(root: &Path, file_path: &str) -> Result<String, ToolError> {
    let path = resolve(root, file_path)?;

    let status = if path.is_file() {
        "File exists"
    } else {
        "File does not exist"
    };
    Ok(format!("{}\n{}", status, location(root, &path)))
}

/// Read a text file along with its size and modification time
pub fn read_file(root: &Path, file_path: &str) -> Result<String, ToolError> {
    let path = resolve(root, file_path)?;

    if !path.is_file() {
        return Ok(format!("File does not exist\n{}", location(root, &path)));
    }

    let content = fs::read_to_string(&path).map_err(io_error(file_path))?;
    let metadata = fs::metadata(&path).map_err(io_error(file_path))?;
    let ruler = "-".repeat(RULER_WIDTH);

    Ok(format!(
        "File read successfully\n{}\nSize: {} bytes\nLast modified: {}\nContent:\n{}\n{}\n{}",
        location(root, &path),
        metadata.len(),
        format_time(metadata.modified()),
        ruler,
        content,
        ruler
    ))
}

/// Describe a file or a directory
pub fn get_file_info(root: &Path, input: &str) -> Result<String, ToolError> {
    let path = resolve(root, input)?;

    if path.is_file() {
        let metadata = fs::metadata(&path).map_err(io_error(input))?;
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        return Ok(format!(
            "File information\n{}\nSize: {} bytes\nCreated: {}\nLast modified: {}\nLast accessed: {}\nRead-only: {}\nExtension: {}",
            location(root, &path),
            metadata.len(),
            format_time(metadata.created()),
            format_time(metadata.modified()),
            format_time(metadata.accessed()),
            if metadata.permissions().readonly() { "yes" } else { "no" },
            extension
        ));
    }

    if path.is_dir() {
        let metadata = fs::metadata(&path).map_err(io_error(input))?;
        let mut files = 0usize;
        let mut directories = 0usize;
        let mut total_size = 0u64;

        for entry in fs::read_dir(&path).map_err(io_error(input))? {
            let entry = entry.map_err(io_error(input))?;
            let entry_meta = entry.metadata().map_err(io_error(input))?;
            if entry_meta.is_dir() {
                directories += 1;
            } else if entry_meta.is_file() {
                files += 1;
                total_size += entry_meta.len();
            }
        }

        return Ok(format!(
            "Directory information\n{}\nCreated: {}\nLast modified: {}\nFiles: {}\nSubdirectories: {}\nTotal size: {} bytes",
            location(root, &path),
            format_time(metadata.created()),
            format_time(metadata.modified()),
            files,
            directories,
            total_size
        ));
    }

    Ok(format!("Path does not exist\n{}", location(root, &path)))
}
