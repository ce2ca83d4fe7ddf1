//! Token storage and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Persisted session: the durable keys shared with permission checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Current store code (tenant)
    pub tenant: Option<String>,
    /// Unix seconds of the last token write
    pub updated_at: Option<i64>,
}

/// Token store trait for different storage backends.
///
/// Contents are opaque; validity is decided by the backend only.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    /// Replace the access token. `None` for `refresh` keeps the current one.
    fn set_tokens(&self, access: String, refresh: Option<String>);
    fn roles(&self) -> Vec<String>;
    fn set_roles(&self, roles: Vec<String>);
    fn tenant(&self) -> Option<String>;
    fn set_tenant(&self, tenant: Option<String>);
    /// Drop tokens, roles and tenant.
    fn clear(&self);

    fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

fn lock(m: &Mutex<Credentials>) -> MutexGuard<'_, Credentials> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn apply_tokens(creds: &mut Credentials, access: String, refresh: Option<String>) {
    creds.access_token = Some(access);
    if let Some(refresh) = refresh {
        creds.refresh_token = Some(refresh);
    }
    creds.updated_at = Some(chrono::Utc::now().timestamp());
}

/// In-memory store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Credentials>,
}

impl MemoryTokenStore {
    pub fn new(creds: Credentials) -> Self {
        Self {
            inner: Mutex::new(creds),
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Credentials {
        lock(&self.inner).clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.inner).access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.inner).refresh_token.clone()
    }

    fn set_tokens(&self, access: String, refresh: Option<String>) {
        apply_tokens(&mut lock(&self.inner), access, refresh);
    }

    fn roles(&self) -> Vec<String> {
        lock(&self.inner).roles.clone()
    }

    fn set_roles(&self, roles: Vec<String>) {
        lock(&self.inner).roles = roles;
    }

    fn tenant(&self) -> Option<String> {
        lock(&self.inner).tenant.clone()
    }

    fn set_tenant(&self, tenant: Option<String>) {
        lock(&self.inner).tenant = tenant;
    }

    fn clear(&self) {
        *lock(&self.inner) = Credentials::default();
    }
}

/// TOML-backed store. Every mutation is written through to disk so the
/// session survives restarts; the in-memory copy stays authoritative if a
/// write fails.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    inner: Mutex<Credentials>,
    /// Held across a mutation and its save so disk writes keep mutation order
    writer: Mutex<()>,
}

impl FileTokenStore {
    /// Open the session file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let creds = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read session file")?;
            toml::from_str(&content).context("Failed to parse session file")?
        } else {
            Credentials::default()
        };

        Ok(Self {
            path,
            inner: Mutex::new(creds),
            writer: Mutex::new(()),
        })
    }

    /// Apply a mutation and persist the result.
    fn update(&self, f: impl FnOnce(&mut Credentials)) {
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = {
            let mut guard = lock(&self.inner);
            f(&mut guard);
            guard.clone()
        };
        if let Err(e) = save(&self.path, &snapshot) {
            tracing::warn!("Failed to persist session: {:#}", e);
        }
    }
}

fn save(path: &Path, creds: &Credentials) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("Failed to create session directory")?;
    }

    let content = toml::to_string_pretty(creds).context("Failed to serialize session")?;
    fs::write(path, content).context("Failed to write session file")?;

    // Set restrictive permissions on session file (contains tokens)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).context("Failed to set session permissions")?;
    }

    Ok(())
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        lock(&self.inner).access_token.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.inner).refresh_token.clone()
    }

    fn set_tokens(&self, access: String, refresh: Option<String>) {
        self.update(|c| apply_tokens(c, access, refresh));
    }

    fn roles(&self) -> Vec<String> {
        lock(&self.inner).roles.clone()
    }

    fn set_roles(&self, roles: Vec<String>) {
        self.update(|c| c.roles = roles);
    }

    fn tenant(&self) -> Option<String> {
        lock(&self.inner).tenant.clone()
    }

    fn set_tenant(&self, tenant: Option<String>) {
        self.update(|c| c.tenant = tenant);
    }

    fn clear(&self) {
        self.update(|c| *c = Credentials::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_tokens_keeps_refresh_when_omitted() {
        let store = MemoryTokenStore::default();
        store.set_tokens("a1".into(), Some("r1".into()));
        store.set_tokens("a2".into(), None);

        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
        assert!(store.snapshot().updated_at.is_some());
    }

    #[test]
    fn test_clear_drops_everything() {
        let store = MemoryTokenStore::default();
        store.set_tokens("a".into(), Some("r".into()));
        store.set_roles(vec!["SUPERADMIN".into()]);
        store.set_tenant(Some("DEFAULT".into()));

        store.clear();
        assert_eq!(store.snapshot(), Credentials::default());
    }

    #[test]
    fn test_has_role_ignores_case() {
        let store = MemoryTokenStore::default();
        store.set_roles(vec!["ADMIN_CATALOGUE".into()]);
        assert!(store.has_role("admin_catalogue"));
        assert!(!store.has_role("SUPERADMIN"));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.toml");

        {
            let store = FileTokenStore::open(&path).unwrap();
            assert!(store.access_token().is_none());
            store.set_tokens("access".into(), Some("refresh".into()));
            store.set_roles(vec!["ADMIN".into(), "ADMIN_ORDER".into()]);
            store.set_tenant(Some("DEFAULT".into()));
        }

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.access_token().as_deref(), Some("access"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("refresh"));
        assert_eq!(reopened.roles(), vec!["ADMIN", "ADMIN_ORDER"]);
        assert_eq!(reopened.tenant().as_deref(), Some("DEFAULT"));
    }

    #[test]
    fn test_file_store_clear_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");

        let store = FileTokenStore::open(&path).unwrap();
        store.set_tokens("access".into(), Some("refresh".into()));
        store.clear();

        let reopened = FileTokenStore::open(&path).unwrap();
        assert!(reopened.access_token().is_none());
        assert!(reopened.refresh_token().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        let store = FileTokenStore::open(&path).unwrap();
        store.set_tokens("access".into(), None);

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unwritable_session_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where the session directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("session.toml");

        let store = FileTokenStore::open(&path).unwrap();
        store.set_tokens("access".into(), Some("refresh".into()));
        store.set_tenant(Some("DEFAULT".into()));

        assert_eq!(store.access_token().as_deref(), Some("access"));
        assert_eq!(store.refresh_token().as_deref(), Some("refresh"));
        assert_eq!(store.tenant().as_deref(), Some("DEFAULT"));
        assert!(!path.exists());

        store.clear();
        assert!(store.access_token().is_none());
    }

    #[test]
    fn test_concurrent_writes_persist_last_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        let store = std::sync::Arc::new(FileTokenStore::open(&path).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.set_tokens(format!("a-{}-{}", t, i), Some(format!("r-{}", t)));
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.access_token(), store.access_token());
        assert_eq!(reopened.refresh_token(), store.refresh_token());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "access_token = [").unwrap();
        assert!(FileTokenStore::open(&path).is_err());
    }
}
