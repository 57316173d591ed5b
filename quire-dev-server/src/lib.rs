use anyhow::{Context, Result};
use axum::Router;
use std::path::PathBuf;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Configuration for the preview server
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Host to bind to
    pub host: String,
    /// Port to serve on
    pub port: u16,
    /// Directory to serve, normally the build output
    pub root: PathBuf,
    /// Auto-open browser
    pub open: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            root: PathBuf::from("./out"),
            open: false,
        }
    }
}

/// A static file server for previewing a built site
pub struct PreviewServer {
    config: PreviewConfig,
}

impl PreviewServer {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    /// Address the browser is pointed at.
    pub fn url(&self) -> String {
        format!("http://localhost:{}/", self.config.port)
    }

    /// Directory requests are answered with their `index.html`.
    pub fn router(&self) -> Router {
        Router::new().fallback_service(ServeDir::new(&self.config.root))
    }

    /// Serve until the process is stopped.
    pub async fn run(self) -> Result<()> {
        if !self.config.root.exists() {
            return Err(anyhow::anyhow!(
                "Root directory does not exist: {}",
                self.config.root.display()
            ));
        }

        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| format!("binding {}:{}", self.config.host, self.config.port))?;

        info!(
            "Serving {} at http://{}",
            self.config.root.display(),
            listener.local_addr()?
        );

        if self.config.open {
            if let Err(e) = open::that(self.url()) {
                warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use std::fs;
    use tower::ServiceExt;

    fn server(root: &std::path::Path) -> PreviewServer {
        PreviewServer::new(PreviewConfig {
            root: root.to_path_buf(),
            ..PreviewConfig::default()
        })
    }

    async fn get(server: &PreviewServer, uri: &str) -> (StatusCode, String) {
        let response = server
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[tokio::test]
    async fn test_serves_output_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("notes/a.html"), "<p>a</p>").unwrap();

        let server = server(dir.path());
        assert_eq!(get(&server, "/").await, (StatusCode::OK, "<h1>home</h1>".into()));
        assert_eq!(get(&server, "/notes/a.html").await, (StatusCode::OK, "<p>a</p>".into()));
        assert_eq!(get(&server, "/missing.html").await.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_url_uses_localhost() {
        let server = PreviewServer::new(PreviewConfig {
            host: "0.0.0.0".into(),
            port: 4321,
            ..PreviewConfig::default()
        });
        assert_eq!(server.url(), "http://localhost:4321/");
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = server(&dir.path().join("nope")).run().await;
        assert!(result.is_err());
    }
}
