use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};

use crate::error::{Error, ErrorDetails};

pub async fn handle_404(req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();

    Error::new(ErrorDetails::RouteNotFound { path, method }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::{Method, StatusCode, Uri};
    use serde_json::Value;

    #[tokio::test]
    async fn test_handle_404() {
        let req = Request::builder()
            .method(Method::POST)
            .uri(Uri::from_static("/v1/completions"))
            .body(Body::empty())
            .unwrap();

        let response = handle_404(req).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        let body: Value = serde_json::from_slice(&body_bytes).unwrap();

        let error_msg = body["error"]["message"].as_str().unwrap();
        assert!(error_msg.contains("POST"));
        assert!(error_msg.contains("/v1/completions"));
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], "not_found");
    }
}
