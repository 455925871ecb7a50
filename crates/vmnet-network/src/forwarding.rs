//! IPv4 forwarding sysctl.

use std::path::Path;

use vmnet_common::{VmnetError, VmnetResult};

/// Enable IPv4 forwarding by writing `1` to the sysctl file at `path`.
pub async fn enable_ip_forwarding(path: &Path) -> VmnetResult<()> {
    tokio::fs::write(path, "1").await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            VmnetError::PermissionDenied {
                operation: format!("write {}", path.display()),
            }
        } else {
            VmnetError::Io(e)
        }
    })?;

    tracing::info!(path = %path.display(), "IP forwarding enabled");
    Ok(())
}

/// Whether the sysctl file at `path` reports forwarding as enabled.
pub async fn ip_forwarding_enabled(path: &Path) -> VmnetResult<bool> {
    let value = tokio::fs::read_to_string(path).await?;
    Ok(value.trim() == "1")
}
