use crate::auth::{AuthBackend, AuthData};
use crate::context::ContextChain;
use crate::core::BitpackError;
use crate::installer::{DependencyInstaller, PublishTransport};
use crate::remote::{RecordPath, RecordStore};
use crate::store::PackFetcher;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Record store over a single in-memory JSON tree.
///
/// Writing `null` removes a value, and objects left empty are pruned, so
/// reads behave like the realtime database.
#[derive(Debug)]
pub struct MemoryRecordStore {
    root: Mutex<Value>,
    reads: AtomicUsize,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            reads: AtomicUsize::new(0),
        }
    }

    /// Number of `get` calls served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// The value at an already-escaped `/`-separated path.
    pub fn value_at(&self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        lookup(&lock(&self.root), &segments).cloned()
    }

    fn write(&self, segments: &[&str], value: Value) {
        let mut root = lock(&self.root);
        if value.is_null() {
            remove(&mut root, segments);
        } else {
            insert(&mut root, segments, value);
        }
    }
}

fn lookup<'a>(node: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(node, |current, segment| current.get(*segment))
}

fn insert(node: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry((*first).to_string()).or_insert(Value::Null);
        insert(child, rest, value);
    }
}

/// Remove the value at `segments`; returns whether `node` is now empty.
fn remove(node: &mut Value, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        *node = Value::Object(Map::new());
        return true;
    };
    if let Value::Object(map) = node {
        let now_empty = match map.get_mut(*first) {
            Some(child) if rest.is_empty() => {
                *child = Value::Null;
                true
            }
            Some(child) => remove(child, rest),
            None => false,
        };
        if now_empty {
            map.remove(*first);
        }
        return map.is_empty();
    }
    false
}

fn segments(path: &RecordPath) -> Vec<&str> {
    path.segments().iter().map(String::as_str).collect()
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, _chain: &ContextChain, path: &RecordPath) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(lookup(&lock(&self.root), &segments(path)).filter(|v| !v.is_null()).cloned())
    }

    async fn set(&self, _chain: &ContextChain, path: &RecordPath, value: Value) -> Result<()> {
        self.write(&segments(path), value);
        Ok(())
    }

    async fn update(&self, _chain: &ContextChain, path: &RecordPath, updates: Map<String, Value>) -> Result<()> {
        let base = segments(path);
        for (relative, value) in updates {
            let mut full = base.clone();
            full.extend(relative.split('/').filter(|s| !s.is_empty()));
            self.write(&full, value);
        }
        Ok(())
    }

    async fn delete(&self, _chain: &ContextChain, path: &RecordPath) -> Result<()> {
        self.write(&segments(path), Value::Null);
        Ok(())
    }
}

/// Accounts and tokens held in memory. Tokens are `token-<uid>`.
#[derive(Debug, Default)]
pub struct MemoryAuthBackend {
    accounts: DashMap<String, (String, String)>,
    next_uid: AtomicUsize,
    token_auths: AtomicUsize,
}

impl MemoryAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(uid: &str) -> String {
        format!("token-{uid}")
    }

    /// Register an account without a user record.
    pub fn add_account(&self, email: &str, password: &str, uid: &str) {
        self.accounts.insert(email.to_string(), (password.to_string(), uid.to_string()));
    }

    /// Number of successful token authentications.
    pub fn token_auth_count(&self) -> usize {
        self.token_auths.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for MemoryAuthBackend {
    async fn auth_with_password(&self, _chain: &ContextChain, email: &str, password: &str) -> Result<AuthData> {
        let account = self.accounts.get(email).ok_or_else(|| anyhow!("unknown account {email}"))?;
        let (expected, uid) = account.value();
        if expected != password {
            return Err(anyhow!("invalid password for {email}"));
        }
        Ok(AuthData {
            uid: uid.clone(),
            token: Self::token_for(uid),
        })
    }

    async fn auth_with_token(&self, _chain: &ContextChain, token: &str) -> Result<AuthData> {
        let uid = token.strip_prefix("token-").ok_or_else(|| anyhow!("invalid token"))?;
        if !self.accounts.iter().any(|entry| entry.value().1 == uid) {
            return Err(anyhow!("invalid token"));
        }
        self.token_auths.fetch_add(1, Ordering::SeqCst);
        Ok(AuthData {
            uid: uid.to_string(),
            token: token.to_string(),
        })
    }

    async fn create_user(&self, _chain: &ContextChain, email: &str, password: &str) -> Result<String> {
        if self.accounts.contains_key(email) {
            return Err(BitpackError::EmailInUse {
                email: email.to_string(),
            }
            .into());
        }
        let uid = format!("user-{}", self.next_uid.fetch_add(1, Ordering::SeqCst) + 1);
        self.add_account(email, password, &uid);
        Ok(uid)
    }

    async fn unauth(&self, _chain: &ContextChain) -> Result<()> {
        Ok(())
    }
}

/// Serves archives registered with [`insert`](Self::insert).
#[derive(Debug, Default)]
pub struct MemoryPackFetcher {
    archives: DashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemoryPackFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pack_url: &str, archive: Vec<u8>) {
        self.archives.insert(pack_url.to_string(), archive);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PackFetcher for MemoryPackFetcher {
    async fn fetch(&self, pack_url: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.archives.get(pack_url).map(|entry| entry.value().clone()).ok_or_else(|| {
            BitpackError::DownloadFailed {
                url: pack_url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            }
            .into()
        })
    }
}

/// Records installer calls instead of running npm.
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    loads: AtomicUsize,
    installs: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl RecordingInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn installs(&self) -> Vec<(PathBuf, Vec<String>)> {
        lock(&self.installs).clone()
    }
}

#[async_trait]
impl DependencyInstaller for RecordingInstaller {
    async fn load(&self, _prefix: &Path) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn install(&self, prefix: &Path, packages: &[String]) -> Result<()> {
        lock(&self.installs).push((prefix.to_path_buf(), packages.to_vec()));
        Ok(())
    }
}

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub url: String,
    pub auth_token: String,
    pub body: Vec<u8>,
}

/// Records uploads; optionally rejects them all.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    uploads: Mutex<Vec<Upload>>,
    reject: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every upload fails with a non-200 status.
    pub fn rejecting() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        lock(&self.uploads).clone()
    }
}

#[async_trait]
impl PublishTransport for RecordingTransport {
    async fn post(&self, url: &str, auth_token: &str, body: Vec<u8>) -> Result<()> {
        lock(&self.uploads).push(Upload {
            url: url.to_string(),
            auth_token: auth_token.to_string(),
            body,
        });
        if self.reject {
            return Err(BitpackError::UploadFailed {
                reason: "HTTP 500 Internal Server Error".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
