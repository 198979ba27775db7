//! Blob zones: bucketed object storage for landing and curated artifacts.
//!
//! Buckets map to directories under a root. Object keys are
//! `{partition}/{identifier}.{extension}` and may contain `/` separators,
//! but may never escape their bucket.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tribunal_shared::{Result, TribunalError};
use uuid::Uuid;

/// Directory holding content-type sidecars, relative to the store root.
const META_DIR: &str = ".meta";

/// Object storage addressed by `(bucket, key)`.
pub trait BlobStore: Send + Sync {
    /// Create the bucket if it does not exist.
    fn ensure_bucket(&self, bucket: &str) -> impl Future<Output = Result<()>> + Send;

    fn bucket_exists(&self, bucket: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Write an object, replacing any previous bytes under the same key.
    /// The bucket is created if absent.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read an object. `Ok(None)` when the key does not exist.
    fn get(&self, bucket: &str, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// All object keys in the bucket, sorted. Empty for a missing bucket.
    fn list(&self, bucket: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Remove an object. `Ok(false)` when the key did not exist.
    fn delete(&self, bucket: &str, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Number of objects in the bucket.
    fn count(&self, bucket: &str) -> impl Future<Output = Result<u64>> + Send {
        async move { Ok(self.list(bucket).await?.len() as u64) }
    }
}

/// Reject keys and bucket names that could resolve outside their parent.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(TribunalError::validation(format!("invalid object key '{key}'")));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return Err(TribunalError::validation(format!(
                "invalid object key '{key}'"
            )));
        }
    }
    Ok(())
}

fn validate_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.contains('/') || bucket.starts_with('.') {
        return Err(TribunalError::validation(format!(
            "invalid bucket name '{bucket}'"
        )));
    }
    validate_key(bucket)
}

// ---------------------------------------------------------------------------
// FsBlobStore
// ---------------------------------------------------------------------------

/// Filesystem-backed store: `{root}/{bucket}/{key}`.
///
/// Declared content types live in `{root}/.meta/{bucket}/{key}.content-type`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    fn content_type_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root
            .join(META_DIR)
            .join(bucket)
            .join(format!("{key}.content-type"))
    }

    /// Stored content type of an object, if one was declared.
    pub async fn content_type(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let path = self.content_type_path(bucket, key);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TribunalError::io(path, e)),
        }
    }
}

/// Write to a hidden sibling temp file, then rename over the target.
async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| TribunalError::StoreWrite(format!("no parent for {}", target.display())))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| TribunalError::StoreWrite(format!("{}: {e}", parent.display())))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{file_name}.tmp-{}", Uuid::now_v7()));

    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(TribunalError::StoreWrite(format!("{}: {e}", temp.display())));
    }
    if let Err(e) = tokio::fs::rename(&temp, target).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(TribunalError::StoreWrite(format!("{}: {e}", target.display())));
    }
    Ok(())
}

/// Recursively collect visible file keys under `dir`, relative to `base`.
async fn walk_keys(base: &Path, dir: &Path, keys: &mut Vec<String>) -> Result<()> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|e| TribunalError::io(&current, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TribunalError::io(&current, e))?
        {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| TribunalError::io(&path, e))?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                if let Ok(relative) = path.strip_prefix(base) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
    }
    Ok(())
}

impl BlobStore for FsBlobStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let dir = self.bucket_dir(bucket)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TribunalError::StoreWrite(format!("cannot create bucket {bucket}: {e}")))
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let dir = self.bucket_dir(bucket)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TribunalError::io(dir, e)),
        }
    }

    async fn put(&self, bucket: &str, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        // The object is written last so a failed put never leaves a visible object.
        let sidecar = self.content_type_path(bucket, key);
        write_atomic(&sidecar, content_type.as_bytes()).await?;
        write_atomic(&path, bytes).await?;
        tracing::debug!(bucket, key, size = bytes.len(), "stored object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TribunalError::io(path, e)),
        }
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        if !self.bucket_exists(bucket).await? {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        walk_keys(&dir, &dir, &mut keys).await?;
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.object_path(bucket, key)?;
        let removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(TribunalError::StoreWrite(format!("{}: {e}", path.display())));
            }
        };
        if let Err(e) = tokio::fs::remove_file(self.content_type_path(bucket, key)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(bucket, key, error = %e, "cannot remove content-type sidecar");
            }
        }
        tracing::debug!(bucket, key, removed, "deleted object");
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

type Object = (Vec<u8>, String);

/// In-process store for tests and dry runs. Writes can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, Object>>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with a store-write error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Remove an object, simulating out-of-band drift.
    pub fn remove(&self, bucket: &str, key: &str) -> Result<bool> {
        let mut buckets = self.lock()?;
        Ok(buckets
            .get_mut(bucket)
            .is_some_and(|objects| objects.remove(key).is_some()))
    }

    /// Declared content type of an object.
    pub fn content_type(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        let buckets = self.lock()?;
        Ok(buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|(_, ct)| ct.clone()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, Object>>>> {
        self.buckets
            .lock()
            .map_err(|_| TribunalError::Storage("memory blob store lock poisoned".into()))
    }
}

impl BlobStore for MemoryBlobStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket(bucket)?;
        self.lock()?.entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(bucket))
    }

    async fn put(&self, bucket: &str, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TribunalError::StoreWrite(format!(
                "injected write failure for {bucket}/{key}"
            )));
        }
        self.lock()?
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .lock()?
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|(bytes, _)| bytes.clone()))
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TribunalError::StoreWrite(format!(
                "injected delete failure for {bucket}/{key}"
            )));
        }
        self.remove(bucket, key)
    }
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// One bucket of a shared store, addressed by key only.
#[derive(Debug)]
pub struct BlobZone<'a, B> {
    store: &'a B,
    bucket: String,
}

// Manual impls so `B` itself need not be Clone/Copy.
impl<B> Clone for BlobZone<'_, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            bucket: self.bucket.clone(),
        }
    }
}

impl<'a, B: BlobStore> BlobZone<'a, B> {
    pub fn new(store: &'a B, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn store(&self) -> &'a B {
        self.store
    }

    pub async fn ensure(&self) -> Result<()> {
        self.store.ensure_bucket(&self.bucket).await
    }

    pub async fn exists(&self) -> Result<bool> {
        self.store.bucket_exists(&self.bucket).await
    }

    pub async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.store.put(&self.bucket, key, bytes, content_type).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(&self.bucket, key).await
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.store.list(&self.bucket).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.store.count(&self.bucket).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.bucket, key).await
    }
}

/// The landing and curated zones over one store.
#[derive(Debug)]
pub struct BlobZones<'a, B> {
    pub landing: BlobZone<'a, B>,
    pub curated: BlobZone<'a, B>,
}

impl<'a, B: BlobStore> BlobZones<'a, B> {
    pub fn new(store: &'a B, landing_bucket: &str, curated_bucket: &str) -> Self {
        Self {
            landing: BlobZone::new(store, landing_bucket),
            curated: BlobZone::new(store, curated_bucket),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("tribunal_blobs_{}", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn fs_put_get_and_list() {
        let root = temp_root();
        let store = FsBlobStore::new(&root);

        assert!(!store.bucket_exists("landing-zone").await.unwrap());
        store
            .put("landing-zone", "2024-01/ADJ-00002.html", b"<p>two</p>", "text/html")
            .await
            .unwrap();
        store
            .put("landing-zone", "2024-01/ADJ-00001.pdf", b"%PDF", "application/pdf")
            .await
            .unwrap();

        assert!(store.bucket_exists("landing-zone").await.unwrap());
        assert_eq!(
            store.list("landing-zone").await.unwrap(),
            vec!["2024-01/ADJ-00001.pdf", "2024-01/ADJ-00002.html"]
        );
        assert_eq!(store.count("landing-zone").await.unwrap(), 2);
        assert_eq!(
            store
                .get("landing-zone", "2024-01/ADJ-00001.pdf")
                .await
                .unwrap()
                .as_deref(),
            Some(&b"%PDF"[..])
        );
        assert_eq!(
            store
                .content_type("landing-zone", "2024-01/ADJ-00001.pdf")
                .await
                .unwrap()
                .as_deref(),
            Some("application/pdf")
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_overwrite_keeps_single_object() {
        let root = temp_root();
        let store = FsBlobStore::new(&root);
        store.put("curated-zone", "2024-01/A.html", b"v1", "text/html").await.unwrap();
        store.put("curated-zone", "2024-01/A.html", b"v2", "text/html").await.unwrap();

        assert_eq!(store.count("curated-zone").await.unwrap(), 1);
        assert_eq!(
            store.get("curated-zone", "2024-01/A.html").await.unwrap(),
            Some(b"v2".to_vec())
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_missing_object_and_bucket() {
        let root = temp_root();
        let store = FsBlobStore::new(&root);
        assert!(store.get("landing-zone", "2024-01/X.html").await.unwrap().is_none());
        assert!(store.list("landing-zone").await.unwrap().is_empty());

        store.ensure_bucket("landing-zone").await.unwrap();
        assert!(store.bucket_exists("landing-zone").await.unwrap());
        assert_eq!(store.count("landing-zone").await.unwrap(), 0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_failed_sidecar_write_leaves_no_object() {
        let root = temp_root();
        std::fs::create_dir_all(&root).unwrap();
        // A plain file where the sidecar tree should be makes every sidecar write fail.
        std::fs::write(root.join(META_DIR), b"not a directory").unwrap();
        let store = FsBlobStore::new(&root);

        let err = store
            .put("landing-zone", "2024-01/ADJ-1.html", b"<p>one</p>", "text/html")
            .await
            .unwrap_err();
        assert!(matches!(err, TribunalError::StoreWrite(_)));
        assert_eq!(store.count("landing-zone").await.unwrap(), 0);
        assert!(store.get("landing-zone", "2024-01/ADJ-1.html").await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_delete_removes_object_and_content_type() {
        let root = temp_root();
        let store = FsBlobStore::new(&root);
        store.put("landing-zone", "2024-01/A.html", b"a", "text/html").await.unwrap();

        assert!(store.delete("landing-zone", "2024-01/A.html").await.unwrap());
        assert!(!store.delete("landing-zone", "2024-01/A.html").await.unwrap());
        assert_eq!(store.count("landing-zone").await.unwrap(), 0);
        assert!(store.content_type("landing-zone", "2024-01/A.html").await.unwrap().is_none());
        assert!(store.delete("landing-zone", "../escape").await.is_err());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let store = FsBlobStore::new(temp_root());
        for key in ["../etc/passwd", "/abs", "a//b", "a/./b", "a\\b", ""] {
            let result = store.put("landing-zone", key, b"x", "text/plain").await;
            assert!(result.is_err(), "key {key:?} should be rejected");
        }
        assert!(store.put("../up", "a.html", b"x", "text/html").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_injected_failure() {
        let store = MemoryBlobStore::new();
        store.put("landing-zone", "2024-01/A.html", b"a", "text/html").await.unwrap();

        store.fail_writes(true);
        let err = store
            .put("landing-zone", "2024-01/B.html", b"b", "text/html")
            .await
            .unwrap_err();
        assert!(matches!(err, TribunalError::StoreWrite(_)));
        assert_eq!(store.count("landing-zone").await.unwrap(), 1);

        store.fail_writes(false);
        assert!(store.remove("landing-zone", "2024-01/A.html").unwrap());
        assert_eq!(store.count("landing-zone").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zones_address_separate_buckets() {
        let store = MemoryBlobStore::new();
        let zones = BlobZones::new(&store, "landing-zone", "curated-zone");
        zones.landing.ensure().await.unwrap();
        zones.landing.put("2024-01/A.html", b"raw", "text/html").await.unwrap();

        assert_eq!(zones.landing.count().await.unwrap(), 1);
        assert_eq!(zones.curated.count().await.unwrap(), 0);
        assert!(!zones.curated.exists().await.unwrap());
    }
}
