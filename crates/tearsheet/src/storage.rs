use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

/// Blob storage for generated reports.
#[async_trait]
pub trait ReportStorage: Send + Sync {
    /// Write `bytes` at `path`, replacing any existing object.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;

    /// Public URL for an object at `path`.
    fn public_url(&self, path: &str) -> String;

    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid object path: {0}")]
    InvalidPath(String),
}

/// Supabase Storage over its REST API, authenticated with the service-role key.
pub struct SupabaseStorage {
    base_url: String,
    service_key: String,
    bucket: String,
    client: reqwest::Client,
}

impl SupabaseStorage {
    pub fn new(
        base_url: &str,
        service_key: &str,
        bucket: &str,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
            client,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl ReportStorage for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let resp = self
            .client
            .post(self.object_url(path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(bucket = %self.bucket, path, "Uploaded report object");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    fn name(&self) -> &str {
        "supabase"
    }
}

/// Reports written to a local directory, served by the dashboard itself.
pub struct LocalStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve `path` under the root. Only plain relative segments are allowed.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(path);
        let plain = !path.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ReportStorage for LocalStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path = %target.display(), "Wrote report file");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path)
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("factorlab-reports-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_supabase_urls() {
        let storage = SupabaseStorage::new(
            "https://abc.supabase.co/",
            "key",
            "reports",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            storage.object_url("r1/tearsheet.html"),
            "https://abc.supabase.co/storage/v1/object/reports/r1/tearsheet.html"
        );
        assert_eq!(
            storage.public_url("r1/tearsheet.html"),
            "https://abc.supabase.co/storage/v1/object/public/reports/r1/tearsheet.html"
        );
    }

    #[derive(Debug, Clone)]
    struct SeenRequest {
        method: String,
        path: String,
        authorization: Option<String>,
        apikey: Option<String>,
        upsert: Option<String>,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    type Seen = std::sync::Arc<std::sync::Mutex<Vec<SeenRequest>>>;

    /// Local stand-in for the storage API. Paths under `fail/` get a 500.
    async fn record_upload(
        axum::extract::State(seen): axum::extract::State<Seen>,
        method: axum::http::Method,
        uri: axum::http::Uri,
        headers: axum::http::HeaderMap,
        body: axum::body::Bytes,
    ) -> (axum::http::StatusCode, &'static str) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        seen.lock().unwrap().push(SeenRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            authorization: header("authorization"),
            apikey: header("apikey"),
            upsert: header("x-upsert"),
            content_type: header("content-type"),
            body: body.to_vec(),
        });
        if uri.path().contains("/fail/") {
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "bucket unavailable")
        } else {
            (axum::http::StatusCode::OK, "{}")
        }
    }

    async fn spawn_storage_api() -> (String, Seen) {
        let seen = Seen::default();
        let app = axum::Router::new()
            .fallback(record_upload)
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn test_supabase_upload_request() {
        let (base, seen) = spawn_storage_api().await;
        let storage =
            SupabaseStorage::new(&base, "service-key", "reports", Duration::from_secs(5)).unwrap();

        storage
            .upload("r1/tearsheet.html", b"<html></html>".to_vec(), "text/html")
            .await
            .unwrap();

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/storage/v1/object/reports/r1/tearsheet.html");
        assert_eq!(req.authorization.as_deref(), Some("Bearer service-key"));
        assert_eq!(req.apikey.as_deref(), Some("service-key"));
        assert_eq!(req.upsert.as_deref(), Some("true"));
        assert_eq!(req.content_type.as_deref(), Some("text/html"));
        assert_eq!(req.body, b"<html></html>");
    }

    #[tokio::test]
    async fn test_supabase_error_status() {
        let (base, _seen) = spawn_storage_api().await;
        let storage =
            SupabaseStorage::new(&base, "service-key", "reports", Duration::from_secs(5)).unwrap();

        let err = storage
            .upload("fail/tearsheet.html", Vec::new(), "text/html")
            .await
            .unwrap_err();
        match err {
            StorageError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "bucket unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_local_upload_creates_parents_and_overwrites() {
        let root = scratch_dir();
        let storage = LocalStorage::new(&root, "/reports/");

        storage
            .upload("r1/tearsheet.html", b"first".to_vec(), "text/html")
            .await
            .unwrap();
        storage
            .upload("r1/tearsheet.html", b"second".to_vec(), "text/html")
            .await
            .unwrap();

        let written = tokio::fs::read_to_string(root.join("r1/tearsheet.html"))
            .await
            .unwrap();
        assert_eq!(written, "second");
        assert_eq!(storage.public_url("r1/tearsheet.html"), "/reports/r1/tearsheet.html");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_rejects_traversal() {
        let storage = LocalStorage::new(scratch_dir(), "/reports");
        for bad in ["../escape.html", "/etc/passwd", "a/../../b", ""] {
            let err = storage.upload(bad, Vec::new(), "text/html").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidPath(_)), "{bad} accepted");
        }
    }
}
