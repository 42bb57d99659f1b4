//! Blob store boundary (uploaded image bytes).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// URLs of a stored object.
///
/// `public_url` is reachable from a browser; `internal_url` from inside the
/// deployment (the worker fetches through the latter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUrls {
    pub public_url: String,
    pub internal_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("blob storage error: {0}")]
    Storage(String),
}

/// Opaque object storage: `put(bytes) → urls`, `get(url) → bytes`.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, object_name: &str, bytes: Vec<u8>) -> Result<BlobUrls, BlobError>;

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError>;
}

#[async_trait::async_trait]
impl<B> BlobStore for Arc<B>
where
    B: BlobStore + ?Sized,
{
    async fn put(&self, object_name: &str, bytes: Vec<u8>) -> Result<BlobUrls, BlobError> {
        (**self).put(object_name, bytes).await
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        (**self).get(url).await
    }
}

/// In-memory blob store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn url_for(object_name: &str, host: &str) -> String {
        format!("http://{host}/uploads/{object_name}")
    }
}

#[async_trait::async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, object_name: &str, bytes: Vec<u8>) -> Result<BlobUrls, BlobError> {
        let internal_url = Self::url_for(object_name, "blob.internal");
        self.objects
            .lock()
            .map_err(|_| BlobError::Storage("lock poisoned".to_string()))?
            .insert(internal_url.clone(), bytes);

        Ok(BlobUrls {
            public_url: Self::url_for(object_name, "localhost:9000"),
            internal_url,
        })
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        self.objects
            .lock()
            .map_err(|_| BlobError::Storage("lock poisoned".to_string()))?
            .get(url)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(url.to_string()))
    }
}

/// Blob store speaking plain HTTP: `put` issues a PUT against the internal
/// base URL, `get` fetches whatever URL the image record carries.
///
/// Works against any object gateway that accepts unauthenticated PUT/GET on
/// its bucket paths (MinIO behind a presigning proxy, nginx with a dav
/// module, and the like).
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    public_base: String,
    internal_base: String,
}

#[cfg(feature = "http")]
impl HttpBlobStore {
    pub fn new(public_base: impl Into<String>, internal_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            public_base: public_base.into(),
            internal_base: internal_base.into(),
        }
    }

    fn join(base: &str, object_name: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), object_name)
    }
}

#[cfg(feature = "http")]
#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, object_name: &str, bytes: Vec<u8>) -> Result<BlobUrls, BlobError> {
        let internal_url = Self::join(&self.internal_base, object_name);
        let res = self
            .client
            .put(&internal_url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        if !res.status().is_success() {
            return Err(BlobError::Storage(format!(
                "put {internal_url} returned {}",
                res.status()
            )));
        }

        Ok(BlobUrls {
            public_url: Self::join(&self.public_base, object_name),
            internal_url,
        })
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlobError::Storage(e.to_string()))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(url.to_string()));
        }
        if !res.status().is_success() {
            return Err(BlobError::Storage(format!(
                "get {url} returned {}",
                res.status()
            )));
        }
        res.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| BlobError::Storage(e.to_string()))
    }
}
