//! Owner-only directories and atomic file writes.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::errors::RevscopeError;

/// Create `path` (and parents) and restrict it to the owner (0700 on unix).
pub fn create_private_dir(path: &Path) -> Result<(), RevscopeError> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Write `content` to `path` via a sibling temp file and rename, so readers
/// never observe a partial file. The result is owner read/write only.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), RevscopeError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid file path: {}", path.display()))?;
    let tmp = path.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()));

    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
