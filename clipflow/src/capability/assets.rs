//! Asset storage for binary outputs (narration audio, images, video).

use crate::core::AssetHandle;
use crate::errors::CapabilityError;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Scheme prefix of handles issued by [`InMemoryAssetStore`].
const MEMORY_SCHEME: &str = "mem://";

/// Stores binary assets and hands out opaque handles for them.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores bytes and returns their handle.
    async fn put(&self, bytes: Vec<u8>, mime_type: &str) -> Result<AssetHandle, CapabilityError>;

    /// Reads the bytes behind a handle.
    async fn get(&self, handle: &AssetHandle) -> Result<Vec<u8>, CapabilityError>;

    /// Returns true if the handle resolves.
    async fn contains(&self, handle: &AssetHandle) -> bool {
        self.get(handle).await.is_ok()
    }
}

struct StoredAsset {
    bytes: Vec<u8>,
    mime_type: String,
}

/// Content-addressed, process-local asset store.
///
/// Identical content always maps to the same handle.
#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: DashMap<String, StoredAsset>,
}

impl InMemoryAssetStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the MIME type recorded for a handle.
    #[must_use]
    pub fn mime_type(&self, handle: &AssetHandle) -> Option<String> {
        self.assets.get(handle.as_str()).map(|a| a.mime_type.clone())
    }

    /// Returns the number of stored assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Clears all assets.
    pub fn clear(&self) {
        self.assets.clear();
    }
}

impl std::fmt::Debug for InMemoryAssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAssetStore")
            .field("assets", &self.assets.len())
            .finish()
    }
}

/// Computes the handle for a blob of content.
#[must_use]
pub fn content_handle(bytes: &[u8]) -> AssetHandle {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    AssetHandle::new(format!("{MEMORY_SCHEME}{}", hex::encode(hasher.finalize())))
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn put(&self, bytes: Vec<u8>, mime_type: &str) -> Result<AssetHandle, CapabilityError> {
        let handle = content_handle(&bytes);
        self.assets.insert(
            handle.as_str().to_string(),
            StoredAsset {
                bytes,
                mime_type: mime_type.to_string(),
            },
        );
        Ok(handle)
    }

    async fn get(&self, handle: &AssetHandle) -> Result<Vec<u8>, CapabilityError> {
        self.assets
            .get(handle.as_str())
            .map(|a| a.bytes.clone())
            .ok_or_else(|| CapabilityError::AssetNotFound(handle.to_string()))
    }

    async fn contains(&self, handle: &AssetHandle) -> bool {
        self.assets.contains_key(handle.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryAssetStore::new();
        let handle = store.put(b"png bytes".to_vec(), "image/png").await.unwrap();

        assert!(handle.as_str().starts_with("mem://"));
        assert_eq!(store.get(&handle).await.unwrap(), b"png bytes".to_vec());
        assert_eq!(store.mime_type(&handle).as_deref(), Some("image/png"));
        assert!(store.contains(&handle).await);
    }

    #[tokio::test]
    async fn test_content_addressing() {
        let store = InMemoryAssetStore::new();
        let a = store.put(b"same".to_vec(), "image/png").await.unwrap();
        let b = store.put(b"same".to_vec(), "image/png").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(a, content_handle(b"same"));
    }

    #[tokio::test]
    async fn test_missing_asset() {
        let store = InMemoryAssetStore::new();
        let handle = AssetHandle::new("mem://nope");

        assert!(matches!(
            store.get(&handle).await,
            Err(CapabilityError::AssetNotFound(ref h)) if h == "mem://nope"
        ));
        assert!(!store.contains(&handle).await);
    }
}
