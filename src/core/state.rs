//! Lock file management: load, save (atomic), path derivation.

use super::error::{Result, StackError};
use super::types::StackLock;
use std::path::{Path, PathBuf};

/// Derive the lock file path for a stack within the state directory.
pub fn lock_file_path(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(stack).join("state.lock.yaml")
}

/// Load the lock file for a stack. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, stack: &str) -> Result<Option<StackLock>> {
    let path = lock_file_path(state_dir, stack);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| StackError::io(&path, e))?;
    let lock: StackLock = serde_yaml_ng::from_str(&content)?;
    Ok(Some(lock))
}

/// Save a lock file atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &StackLock) -> Result<()> {
    let path = lock_file_path(state_dir, &lock.stack);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StackError::io(parent, e))?;
    }

    let yaml = serde_yaml_ng::to_string(lock)?;

    let tmp_path = path.with_extension("lock.yaml.tmp");
    std::fs::write(&tmp_path, &yaml).map_err(|e| StackError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| StackError::io(&path, e))?;

    tracing::debug!(path = %path.display(), resources = lock.resources.len(), "saved lock");
    Ok(())
}

/// Create a new empty lock for a stack.
pub fn new_lock(stack: &str) -> StackLock {
    use crate::tripwire::eventlog::now_iso8601;
    StackLock {
        schema: "1.0".to_string(),
        stack: stack.to_string(),
        generated_at: now_iso8601(),
        generator: format!("edgestack {}", env!("CARGO_PKG_VERSION")),
        blake3_version: "1.8".to_string(),
        resources: indexmap::IndexMap::new(),
    }
}
