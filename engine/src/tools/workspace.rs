//! Workspace file tools
//!
//! `read_file`, `list_dir` and `write_file`, confined to one workspace
//! directory. Writes report the written path as an artifact, which is what
//! moves the turn's fingerprint state forward. None of them go through the
//! result cache; exact repeats within a turn are still answered by the guard.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use sdk::{EngineError, ToolOutput};

use super::Tool;

/// Workspace root with path containment
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the root, rejecting anything that escapes it
    /// lexically or through a symlinked ancestor.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, EngineError> {
        let target = Path::new(path);
        let joined = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.root.join(target)
        };
        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(EngineError::PathOutsideWorkspace(joined));
        }

        let mut existing = normalized.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        if let Ok(real) = existing.canonicalize() {
            if !real.starts_with(&self.root) {
                return Err(EngineError::PathOutsideWorkspace(joined));
            }
        }
        Ok(normalized)
    }

    /// Artifact id for a resolved path: workspace-relative, `/`-separated
    pub fn artifact_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn path_arg<'a>(args: &'a Value, default: Option<&'a str>) -> Result<&'a str, EngineError> {
    args.get("path")
        .and_then(Value::as_str)
        .or(default)
        .ok_or_else(|| EngineError::ToolError("missing required argument 'path'".to_string()))
}

pub struct ReadFileTool {
    workspace: Arc<Workspace>,
}

impl ReadFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
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

    fn usage(&self) -> &str {
        r#"{"path": "relative/path"}"#
    }

    // the file can change between turns or under another process
    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
        let path = self.workspace.resolve(path_arg(args, None)?)?;
        let content = fs::read_to_string(&path).await.map_err(|e| {
            EngineError::ToolError(format!("failed to read {}: {}", path.display(), e))
        })?;
        debug!("Read {} bytes from {}", content.len(), path.display());

        Ok(ToolOutput::json(json!({
            "path": self.workspace.artifact_id(&path),
            "content": content,
        })))
    }
}

pub struct ListDirTool {
    workspace: Arc<Workspace>,
}

impl ListDirTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List files and directories at a path. Directories end with '/'."
    }

    fn usage(&self) -> &str {
        r#"{"path": "directory/path"}"#
    }

    // listings change whenever the workspace does
    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
        let path = self.workspace.resolve(path_arg(args, Some("."))?)?;
        let mut entries = fs::read_dir(&path).await.map_err(|e| {
            EngineError::ToolError(format!("failed to list {}: {}", path.display(), e))
        })?;

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_dir() {
                dirs.push(format!("{}/", name));
            } else {
                let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                files.push(json!({ "name": name, "size": format_size(size) }));
            }
        }
        dirs.sort();
        files.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ToolOutput::json(json!({
            "path": self.workspace.artifact_id(&path),
            "dirs": dirs,
            "files": files,
        })))
    }
}

pub struct WriteFileTool {
    workspace: Arc<Workspace>,
}

impl WriteFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, creating parent directories."
    }

    fn usage(&self) -> &str {
        r#"{"path": "file/path", "content": "file contents"}"#
    }

    fn cacheable(&self) -> bool {
        false
    }

    async fn execute(&self, args: &Value) -> Result<ToolOutput, EngineError> {
        let path = self.workspace.resolve(path_arg(args, None)?)?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::ToolError("missing required argument 'content'".into()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, content).await.map_err(|e| {
            EngineError::ToolError(format!("failed to write {}: {}", path.display(), e))
        })?;

        let artifact = self.workspace.artifact_id(&path);
        info!("Wrote {} bytes to {}", content.len(), artifact);

        Ok(ToolOutput::json(json!({
            "path": artifact,
            "bytes": content.len(),
        }))
        .with_artifacts(vec![artifact]))
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
