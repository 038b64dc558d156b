use serde::{Deserialize, Serialize};

use crate::config::GeminiConfig;
use crate::error::ChatError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Single-turn body: only the current question, no earlier turns.
fn request_body(question: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part { text: question }],
        }],
    }
}

/// Pulls `candidates[0].content.parts[0].text` out of a response body.
fn extract_answer(body: &str) -> Result<String, ChatError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| {
            ChatError::MalformedResponse("no candidates[0].content.parts[0].text".to_string())
        })
}

pub struct GeminiClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn with_config(config: &GeminiConfig) -> Self {
        Self::new(config.endpoint(), config.resolve_api_key())
    }

    pub fn new(endpoint: String, api_key: String) -> Self {
        GeminiClient {
            endpoint,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one question and returns the raw answer text.
    ///
    /// No timeout is applied; a hung request stays pending until it settles.
    pub async fn generate(&self, question: &str) -> Result<String, ChatError> {
        tracing::debug!(endpoint = %self.endpoint, "sending generateContent request");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(question))
            .send()
            .await
            .map_err(|e| {
                // reqwest includes the URL in its message; drop it so the key stays out of logs.
                ChatError::Network(e.without_url().to_string())
            })?;

        let status = response.status();
        if let Some(err) = ChatError::from_status(status) {
            tracing::warn!(%status, "generateContent returned an error status");
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Network(e.without_url().to_string()))?;

        let answer = extract_answer(&body)?;
        tracing::debug!(chars = answer.len(), "received answer");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    struct Captured {
        request_line: String,
        body: String,
    }

    /// Answers exactly one HTTP request with the given status line and body.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let header_end = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };

            let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);

            while buf.len() < header_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            let _ = tx.send(Captured {
                request_line: head.lines().next().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
            });
        });

        (format!("http://{}/v1beta/models/test:generateContent", addr), rx)
    }

    const OK_BODY: &str = r#"{"candidates":[{"content":{"parts":[{"text":"Intro* Point one"}],"role":"model"}}]}"#;

    #[test]
    fn body_contains_only_current_question() {
        let json = serde_json::to_value(request_body("what is a borrow?")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "contents": [ { "parts": [ { "text": "what is a borrow?" } ] } ] })
        );
    }

    #[test]
    fn extracts_first_candidate_text() {
        assert_eq!(extract_answer(OK_BODY).unwrap(), "Intro* Point one");
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let err = extract_answer(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
    }

    #[test]
    fn non_json_is_malformed() {
        let err = extract_answer("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn posts_question_with_key_and_returns_answer() {
        let (endpoint, captured) = serve_once("200 OK", OK_BODY).await;
        let client = GeminiClient::new(endpoint, "secret".to_string());

        let answer = client.generate("explain traits").await.unwrap();
        assert_eq!(answer, "Intro* Point one");

        let captured = captured.await.unwrap();
        assert!(captured.request_line.starts_with("POST /v1beta/models/test:generateContent?key=secret"));
        let sent: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(sent["contents"][0]["parts"][0]["text"], "explain traits");
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_rate_limited() {
        let (endpoint, _captured) = serve_once("429 Too Many Requests", "{}").await;
        let client = GeminiClient::new(endpoint, "k".to_string());

        let err = client.generate("q").await.unwrap_err();
        assert_eq!(err, ChatError::RateLimited);
    }

    #[tokio::test]
    async fn server_error_message_mentions_status() {
        let (endpoint, _captured) = serve_once("500 Internal Server Error", "{}").await;
        let client = GeminiClient::new(endpoint, "k".to_string());

        let err = client.generate("q").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GeminiClient::new(format!("http://{}/x", addr), "k".to_string());
        let err = client.generate("q").await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
    }
}
