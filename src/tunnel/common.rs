//! Process and file helpers shared by tunnel engines

use crate::error::{AutoTunnelError, AutoTunnelResult};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Check if a binary is available in the system PATH
pub async fn check_binary_available(binary: &str) -> bool {
    match Command::new("which")
        .arg(binary)
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Ensure a directory exists, creating it if necessary
pub async fn ensure_directory_exists(path: &Path) -> AutoTunnelResult<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| AutoTunnelError::Engine(format!("Failed to create directory {:?}: {}", path, e)))?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Write configuration to a file with restricted permissions
///
/// A new file is created with `permissions` already applied. An existing file
/// is narrowed to `permissions` before its content is replaced.
pub async fn write_secure_config(path: &Path, content: &str, permissions: u32) -> AutoTunnelResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if path.exists() {
        let perms = std::fs::Permissions::from_mode(permissions);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|e| AutoTunnelError::Engine(format!("Failed to set permissions on {:?}: {}", path, e)))?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(permissions)
        .open(path)
        .await
        .map_err(|e| AutoTunnelError::Engine(format!("Failed to open {:?}: {}", path, e)))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| AutoTunnelError::Engine(format!("Failed to write config to {:?}: {}", path, e)))?;
    file.flush()
        .await
        .map_err(|e| AutoTunnelError::Engine(format!("Failed to write config to {:?}: {}", path, e)))?;

    debug!("Wrote config to {:?} with permissions {:o}", path, permissions);
    Ok(())
}

/// Delete a configuration file if it exists
pub async fn delete_config_file(path: &Path) -> AutoTunnelResult<()> {
    if path.exists() {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| AutoTunnelError::Engine(format!("Failed to delete {:?}: {}", path, e)))?;
        debug!("Deleted config file: {:?}", path);
    }
    Ok(())
}

/// Run a command to completion, turning a non-zero exit into an engine error
pub async fn run_checked(program: &str, args: &[&str]) -> AutoTunnelResult<()> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| AutoTunnelError::Engine(format!("Failed to run {}: {}", program, e)))?;

    if !output.status.success() {
        return Err(AutoTunnelError::Engine(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_secure_config_roundtrip() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("run");
        ensure_directory_exists(&nested).await.unwrap();

        let path = nested.join("wg-test.conf");
        write_secure_config(&path, "[Interface]\n", 0o600).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        delete_config_file(&path).await.unwrap();
        assert!(!path.exists());
        // Deleting twice is fine
        delete_config_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_secure_config_narrows_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wg-old.conf");
        std::fs::write(&path, "a much longer stale configuration body\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_secure_config(&path, "[Interface]\n", 0o600).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[Interface]\n");
    }

    #[tokio::test]
    async fn test_run_checked_reports_failure() {
        let err = run_checked("false", &[]).await.unwrap_err();
        assert!(matches!(err, AutoTunnelError::Engine(_)));
        run_checked("true", &[]).await.unwrap();
    }
}
