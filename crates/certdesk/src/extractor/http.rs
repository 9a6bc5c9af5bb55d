use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{DocumentExtractor, ExtractError, Extraction};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length of an error body carried into an error message.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Posts raw document bytes to an extraction service and reads back an
/// [`Extraction`] as JSON.
pub struct HttpExtractor {
    client: Client,
    endpoint: String,
}

impl HttpExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

#[async_trait]
impl DocumentExtractor for HttpExtractor {
    async fn extract(
        &self,
        bytes: &[u8],
        content_type: &str,
        filename: &str,
    ) -> Result<Extraction, ExtractError> {
        debug!(filename, content_type, size = bytes.len(), "Sending document for extraction");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ExtractError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE {
            return Err(ExtractError::UnsupportedContentType(content_type.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        response
            .json::<Extraction>()
            .await
            .map_err(|e| ExtractError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::DocumentKind;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/extract", addr)
    }

    #[tokio::test]
    async fn test_extract_success() {
        let app = Router::new().route(
            "/extract",
            post(
                |Query(q): Query<HashMap<String, String>>, headers: HeaderMap, body: axum::body::Bytes| async move {
                    assert_eq!(q.get("filename").map(String::as_str), Some("cert.pdf"));
                    assert_eq!(headers["content-type"], "application/pdf");
                    assert_eq!(&body[..], b"%PDF-1.4");
                    Json(serde_json::json!({
                        "kind": "medical_certificate",
                        "fields": {"fit_status": "fit_with_restrictions"},
                        "field_confidence": {"fit_status": 88.0},
                        "overall_confidence": 85.0
                    }))
                },
            ),
        );
        let url = serve(app).await;

        let extractor = HttpExtractor::new(url, Duration::from_secs(5)).unwrap();
        let extraction = extractor
            .extract(b"%PDF-1.4", "application/pdf", "cert.pdf")
            .await
            .unwrap();

        assert_eq!(extraction.kind, DocumentKind::MedicalCertificate);
        assert_eq!(extraction.overall_confidence, 85.0);
        assert_eq!(extraction.field_confidence.get("fit_status"), Some(&88.0));
    }

    #[tokio::test]
    async fn test_extract_server_error() {
        let app = Router::new().route(
            "/extract",
            post(|| async { (StatusCode::BAD_GATEWAY, "ocr backend down") }),
        );
        let url = serve(app).await;

        let extractor = HttpExtractor::new(url, Duration::from_secs(5)).unwrap();
        match extractor.extract(b"x", "image/png", "scan.png").await {
            Err(ExtractError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "ocr backend down");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extract_bad_json() {
        let app = Router::new().route("/extract", post(|| async { "not json" }));
        let url = serve(app).await;

        let extractor = HttpExtractor::new(url, Duration::from_secs(5)).unwrap();
        let result = extractor.extract(b"x", "image/png", "scan.png").await;
        assert!(matches!(result, Err(ExtractError::Decode(_))));
    }

    #[test]
    fn test_truncate_body() {
        let long = "a".repeat(500);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("... (truncated)"));
        assert_eq!(truncate_body("short"), "short");
    }
}
