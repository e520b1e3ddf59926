//! Thin HTTP wrapper over the local LM inference service: `generate`, `embed`.
//! No retries or fallback policy of its own (§4.4) — that lives in `enhance`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("inference endpoint returned non-2xx status: {0}")]
    Status(u16),
    #[error("failed to parse inference response: {0}")]
    Parse(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub async fn generate(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        deadline: Duration,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/generate", self.base_url.trim_end_matches('/'));
        let send = self.client.post(url).json(&GenerateRequest { model, system, prompt }).send();

        let response = match tokio::time::timeout(deadline, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(InferenceError::Http(e)),
            Err(_) => return Err(InferenceError::Timeout(deadline)),
        };

        if !response.status().is_success() {
            return Err(InferenceError::Status(response.status().as_u16()));
        }

        let parsed: GenerateResponse =
            response.json().await.map_err(|e| InferenceError::Parse(e.to_string()))?;
        Ok(parsed.text)
    }

    pub async fn embed(&self, model: &str, text: &str, deadline: Duration) -> Result<Vec<f32>, InferenceError> {
        let url = format!("{}/embed", self.base_url.trim_end_matches('/'));
        let send = self.client.post(url).json(&EmbedRequest { model, input: text }).send();

        let response = match tokio::time::timeout(deadline, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(InferenceError::Http(e)),
            Err(_) => return Err(InferenceError::Timeout(deadline)),
        };

        if !response.status().is_success() {
            return Err(InferenceError::Status(response.status().as_u16()));
        }

        let parsed: EmbedResponse =
            response.json().await.map_err(|e| InferenceError::Parse(e.to_string()))?;
        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn generate_parses_text_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "hello" })))
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri());
        let text = client.generate("m", "sys", "prompt", Duration::from_secs(5)).await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn non_2xx_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri());
        let err = client.generate("m", "sys", "prompt", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, InferenceError::Status(500)));
    }

    #[tokio::test]
    async fn embed_parses_embedding_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "embedding": [1.0, 0.0] })))
            .mount(&server)
            .await;

        let client = InferenceClient::new(server.uri());
        let vector = client.embed("m", "text", Duration::from_secs(5)).await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
    }
}
