//! Document loading from files, strings, and HTTP URLs.
//!
//! Schemas and instance data are both plain JSON documents, so one set of
//! loaders serves both.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a JSON document from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_document_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Build the HTTP client used for remote documents.
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the TLS backend cannot initialise.
#[cfg(feature = "remote")]
pub fn http_client() -> Result<reqwest::Client, LoadError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| LoadError::NetworkError {
            url: String::new(),
            source,
        })
}

/// GET `url` with `client` and parse the body as JSON.
///
/// # Errors
///
/// Returns `LoadError::NetworkError` for transport failures, non-2xx
/// statuses, and bodies that aren't JSON.
#[cfg(feature = "remote")]
pub async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<Value, LoadError> {
    let network = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let response = client.get(url).send().await.map_err(network)?;

    // Check for HTTP errors before parsing
    let response = response.error_for_status().map_err(network)?;

    response.json().await.map_err(network)
}

/// Load a JSON document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the response
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub async fn load_document_url(url: &str) -> Result<Value, LoadError> {
    let client = http_client()?;
    fetch_json(&client, url).await
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a document from a file path or URL.
///
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub async fn load_document_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source).await
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_document_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "object"}}"#).unwrap();

        let schema = load_document(file.path()).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn load_document_file_not_found() {
        let result = load_document(Path::new("/nonexistent/path.json"));
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn load_document_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_document(file.path());
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn load_document_str_valid() {
        let schema = load_document_str(r#"{"type": "object"}"#).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn load_document_str_invalid() {
        let result = load_document_str("not json");
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn is_url_schemes() {
        assert!(is_url("https://example.com/schema.json"));
        assert!(is_url("http://example.com/schema.json"));
    }

    #[test]
    fn is_url_file_path() {
        assert!(!is_url("/path/to/schema.json"));
        assert!(!is_url("./schema.json"));
        assert!(!is_url("schema.json"));
    }

    #[tokio::test]
    async fn load_document_auto_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "string"}}"#).unwrap();

        let schema = load_document_auto(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(schema["type"], "string");
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[tokio::test]
        async fn load_document_url_valid() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/schema.json")
                .with_header("content-type", "application/json")
                .with_body(r#"{"id": "schema.json"}"#)
                .create_async()
                .await;

            let schema = load_document_url(&format!("{}/schema.json", server.url()))
                .await
                .unwrap();
            assert_eq!(schema["id"], "schema.json");
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn load_document_url_404() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/missing.json")
                .with_status(404)
                .create_async()
                .await;

            let result = load_document_url(&format!("{}/missing.json", server.url())).await;
            assert!(matches!(result, Err(LoadError::NetworkError { .. })));
        }

        #[tokio::test]
        async fn load_document_auto_url() {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("GET", "/data.json")
                .with_body("[1, 2, 3]")
                .create_async()
                .await;

            let data = load_document_auto(&format!("{}/data.json", server.url()))
                .await
                .unwrap();
            assert_eq!(data, serde_json::json!([1, 2, 3]));
        }
    }
}
