//! Credential and token files shared with the rest of the boot environment
//!
//! Everything written here is secret material, so files are created with mode
//! 0600 and truncated on every write.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default directory; tmpfs so nothing survives a reboot
pub const DEFAULT_TOKEN_DIR: &str = "/dev/shm";

pub const CLIENT_ID_FILE: &str = "client_id";
pub const CLIENT_SECRET_FILE: &str = "client_secret";
pub const PROJECT_ID_FILE: &str = "project_id";
pub const ACCESS_TOKEN_FILE: &str = "idp_access_token";
pub const RELEASE_TOKEN_FILE: &str = "release_token";

#[derive(Debug, Clone)]
pub struct CredentialFiles {
    dir: PathBuf,
}

impl Default for CredentialFiles {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_DIR)
    }
}

impl CredentialFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_secret(&self, name: &str, data: &str) -> std::io::Result<()> {
        let path = self.path(name);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)?;
        file.write_all(data.as_bytes())?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    pub fn save_client_id(&self, client_id: &str) -> std::io::Result<()> {
        self.write_secret(CLIENT_ID_FILE, client_id)
    }

    pub fn save_client_secret(&self, client_secret: &str) -> std::io::Result<()> {
        self.write_secret(CLIENT_SECRET_FILE, client_secret)
    }

    pub fn save_project_id(&self, project_id: &str) -> std::io::Result<()> {
        self.write_secret(PROJECT_ID_FILE, project_id)
    }

    pub fn save_access_token(&self, token: &str) -> std::io::Result<()> {
        self.write_secret(ACCESS_TOKEN_FILE, token)
    }

    pub fn save_release_token(&self, token: &str) -> std::io::Result<()> {
        self.write_secret(RELEASE_TOKEN_FILE, token)
    }

    /// Access token left behind by the client-auth script, whitespace trimmed
    pub async fn read_access_token(&self) -> std::io::Result<String> {
        let token = tokio::fs::read_to_string(self.path(ACCESS_TOKEN_FILE)).await?;
        Ok(token.trim().to_string())
    }
}
