//! Workspace tools - files and shell commands confined to one root directory

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actors::context::ActorContext;
use crate::tools::{optional_str, optional_u64, required_str, Tool, ToolCatalog, ToolError, ToolOutput};

const DEFAULT_BASH_TIMEOUT_MS: u64 = 30_000;
const MAX_LIST_DEPTH: usize = 10;

pub fn register_all(catalog: &mut ToolCatalog, root: PathBuf) {
    catalog.register(ReadFileTool::new(root.clone()));
    catalog.register(WriteFileTool::new(root.clone()));
    catalog.register(ListFilesTool::new(root.clone()));
    catalog.register(BashTool::new(root));
}

/// Map `path` into `root`, refusing anything that escapes it
fn resolve(root: &Path, path: &str) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(path);
    let relative = if candidate.is_absolute() {
        candidate
            .strip_prefix(root)
            .map_err(|_| ToolError::new("Cannot access files outside the workspace"))?
            .to_path_buf()
    } else {
        candidate.to_path_buf()
    };
    if relative
        .components()
        .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(ToolError::new("Cannot access files outside the workspace"));
    }
    Ok(root.join(relative))
}

/// Model-supplied line count; anything past `usize` is clamped
fn line_count(value: Option<u64>) -> usize {
    value.map_or(0, |value| usize::try_from(value).unwrap_or(usize::MAX))
}

/// Read file tool - reads file contents
pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn read(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let path = resolve(&self.root, required_str(args, "path")?)?;
        let limit = line_count(optional_u64(args, "limit"));
        let offset = line_count(optional_u64(args, "offset"));

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::new(format!("Failed to read file: {e}")))?;

        let lines: Vec<&str> = content.lines().collect();
        let start = offset.min(lines.len());
        let end = if limit == 0 {
            lines.len()
        } else {
            start.saturating_add(limit).min(lines.len())
        };
        Ok(ToolOutput::ok(lines[start..end].join("\n")))
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace" },
                "limit": { "type": "integer", "description": "Maximum number of lines to read (0 = all)", "default": 0 },
                "offset": { "type": "integer", "description": "Line offset to start reading from (0-based)", "default": 0 }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        self.read(&args).await
    }
}

/// Write file tool - writes content to a file
pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn write(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let raw_path = required_str(args, "path")?;
        let path = resolve(&self.root, raw_path)?;
        let content = required_str(args, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::new(format!("Failed to create directory: {e}")))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::new(format!("Failed to write file: {e}")))?;
        Ok(ToolOutput::ok(format!("Successfully wrote to {raw_path}")))
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace" },
                "content": { "type": "string", "description": "Content to write to the file" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        self.write(&args).await
    }
}

/// List files tool - list directory contents
pub struct ListFilesTool {
    root: PathBuf,
}

impl ListFilesTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn list(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let path = resolve(&self.root, optional_str(args, "path").unwrap_or("."))?;
        let recursive = args
            .get("recursive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let depth = if recursive { MAX_LIST_DEPTH } else { 1 };

        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&path).min_depth(1).max_depth(depth) {
            match entry {
                Ok(e) => {
                    let shown = e
                        .path()
                        .strip_prefix(&self.root)
                        .unwrap_or(e.path())
                        .display()
                        .to_string();
                    let file_type = if e.file_type().is_dir() { "dir" } else { "file" };
                    files.push(format!("{file_type}: {shown}"));
                }
                Err(e) if files.is_empty() && e.depth() == 0 => {
                    return Err(ToolError::new(format!("Failed to read directory: {e}")));
                }
                Err(e) => files.push(format!("error: {e}")),
            }
        }
        files.sort();
        Ok(ToolOutput::ok(files.join("\n")))
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories in the workspace."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list (default: workspace root)", "default": "." },
                "recursive": { "type": "boolean", "description": "List recursively", "default": false }
            }
        })
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        self.list(&args)
    }
}

/// Bash tool - executes shell commands in the workspace
pub struct BashTool {
    root: PathBuf,
}

impl BashTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn run(&self, args: &Value) -> Result<ToolOutput, ToolError> {
        let command = required_str(args, "command")?;
        let timeout_ms = optional_u64(args, "timeout_ms").unwrap_or(DEFAULT_BASH_TIMEOUT_MS);

        let output = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.root)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(result)) => {
                let stdout = String::from_utf8_lossy(&result.stdout).to_string();
                let stderr = String::from_utf8_lossy(&result.stderr).to_string();
                if result.status.success() {
                    Ok(ToolOutput::ok(stdout))
                } else {
                    Ok(ToolOutput::failure(format!(
                        "Exit code: {:?}\nStdout: {}\nStderr: {}",
                        result.status.code(),
                        stdout,
                        stderr
                    )))
                }
            }
            Ok(Err(e)) => Err(ToolError::new(format!("Failed to execute: {e}"))),
            Err(_) => Err(ToolError::new(format!(
                "Command timed out after {timeout_ms}ms"
            ))),
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" },
                "timeout_ms": { "type": "integer", "description": "Timeout in milliseconds (default: 30000)", "default": DEFAULT_BASH_TIMEOUT_MS }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, _ctx: &ActorContext, args: Value) -> Result<ToolOutput, ToolError> {
        self.run(&args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_stays_inside_root() {
        let root = Path::new("/srv/workspace");
        assert_eq!(
            resolve(root, "notes/today.md").unwrap(),
            PathBuf::from("/srv/workspace/notes/today.md")
        );
        assert_eq!(
            resolve(root, "/srv/workspace/a.txt").unwrap(),
            PathBuf::from("/srv/workspace/a.txt")
        );
        assert!(resolve(root, "/etc/passwd").is_err());
        assert!(resolve(root, "../outside").is_err());
        assert!(resolve(root, "notes/../../outside").is_err());
    }

    #[tokio::test]
    async fn test_write_then_read_with_offset() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WriteFileTool::new(dir.path().to_path_buf());
        writer
            .write(&json!({ "path": "sub/file.txt", "content": "one\ntwo\nthree" }))
            .await
            .unwrap();

        let reader = ReadFileTool::new(dir.path().to_path_buf());
        let out = reader
            .read(&json!({ "path": "sub/file.txt", "offset": 1, "limit": 1 }))
            .await
            .unwrap();
        assert_eq!(out.content, "two");
    }

    #[tokio::test]
    async fn test_read_with_huge_limit_or_offset_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "one\ntwo\nthree").unwrap();
        let reader = ReadFileTool::new(dir.path().to_path_buf());

        let out = reader
            .read(&json!({ "path": "f.txt", "offset": 1, "limit": u64::MAX }))
            .await
            .unwrap();
        assert_eq!(out.content, "two\nthree");

        let out = reader
            .read(&json!({ "path": "f.txt", "offset": u64::MAX, "limit": u64::MAX }))
            .await
            .unwrap();
        assert_eq!(out.content, "");
    }

    #[tokio::test]
    async fn test_read_outside_workspace_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let reader = ReadFileTool::new(dir.path().to_path_buf());
        assert!(reader.read(&json!({ "path": "/etc/passwd" })).await.is_err());
    }

    #[test]
    fn test_list_files_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("nested").join("b.txt"), "b").unwrap();

        let tool = ListFilesTool::new(dir.path().to_path_buf());
        let flat = tool.list(&json!({})).unwrap();
        assert_eq!(flat.content, "dir: nested\nfile: a.txt");

        let deep = tool.list(&json!({ "recursive": true })).unwrap();
        assert!(deep.content.contains("file: nested/b.txt"));
    }

    #[tokio::test]
    async fn test_bash_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path().to_path_buf());
        let ok = tool.run(&json!({ "command": "echo hello" })).await.unwrap();
        assert!(ok.success);
        assert_eq!(ok.content.trim(), "hello");

        let failed = tool.run(&json!({ "command": "exit 3" })).await.unwrap();
        assert!(!failed.success);
        assert!(failed.content.contains("Exit code: Some(3)"));
    }
}
