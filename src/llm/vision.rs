//! Two-provider vision LLM client. Generalizes the teacher's single-provider
//! `LlmClient` (`llm/client.rs`: `reqwest` JSON call, transient/permanent
//! error split) from text-only Ollama to OpenAI/Anthropic image-batch calls
//! constrained to a JSON schema.

use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{LlmConfig, LlmProvider};

/// One page image to include in a vision request, already PNG-encoded.
pub struct PageImage {
    pub page_number: i32,
    pub png_bytes: Vec<u8>,
}

pub struct VisionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub schema: &'a Value,
    pub images: &'a [PageImage],
}

/// Token counts for one vision-LLM call, normalized across providers
/// (OpenAI's `prompt_tokens`/`completion_tokens`, Anthropic's
/// `input_tokens`/`output_tokens`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// The model's parsed JSON response plus the page numbers it covered, so
/// the caller can attribute fields back to pages.
pub struct VisionResponse {
    pub data: Value,
    pub pages: Vec<i32>,
    pub usage: TokenUsage,
}

/// Errors a vision call can fail with, split the same way the teacher's
/// `LlmError` is: connection/timeout and 5xx/429 are retryable, everything
/// else isn't.
#[derive(Debug)]
pub enum VisionError {
    Connection(String),
    Timeout(String),
    RateLimited(String),
    Api(String),
    Parse(String),
}

impl VisionError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VisionError::Connection(_) | VisionError::Timeout(_) | VisionError::RateLimited(_)
        )
    }
}

impl std::fmt::Display for VisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisionError::Connection(m) => write!(f, "connection error: {m}"),
            VisionError::Timeout(m) => write!(f, "timeout: {m}"),
            VisionError::RateLimited(m) => write!(f, "rate limited: {m}"),
            VisionError::Api(m) => write!(f, "api error: {m}"),
            VisionError::Parse(m) => write!(f, "parse error: {m}"),
        }
    }
}

impl std::error::Error for VisionError {}

impl From<VisionError> for crate::error::AppError {
    fn from(e: VisionError) -> Self {
        if e.is_retryable() {
            crate::error::AppError::Transient(e.to_string())
        } else {
            crate::error::AppError::Permanent(e.to_string())
        }
    }
}

pub struct VisionClient {
    config: LlmConfig,
    http: Client,
}

impl VisionClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build vision http client");
        Self { config, http }
    }

    pub async fn extract(&self, req: VisionRequest<'_>) -> Result<VisionResponse, VisionError> {
        let pages: Vec<i32> = req.images.iter().map(|p| p.page_number).collect();
        let (data, usage) = match self.config.provider {
            LlmProvider::OpenAi => self.call_openai(&req).await?,
            LlmProvider::Anthropic => self.call_anthropic(&req).await?,
        };
        Ok(VisionResponse { data, pages, usage })
    }

    async fn call_openai(&self, req: &VisionRequest<'_>) -> Result<(Value, TokenUsage), VisionError> {
        let mut content = vec![serde_json::json!({"type": "text", "text": req.user_prompt})];
        for image in req.images {
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": {"url": data_url(&image.png_bytes)},
            }));
        }

        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": format!(
                    "{}\n\nRespond with a single JSON object matching this schema:\n{}",
                    req.system_prompt, req.schema
                )},
                {"role": "user", "content": content},
            ],
        });

        let url = format!("{}/chat/completions", self.config.endpoint);
        let resp = self
            .send(self.http.post(&url).json(&body))
            .await?;

        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize, Default)]
        struct OpenAiUsage {
            #[serde(default)]
            prompt_tokens: i64,
            #[serde(default)]
            completion_tokens: i64,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: OpenAiUsage,
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;
        let usage = TokenUsage {
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        };
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VisionError::Parse("empty choices array".to_string()))?;
        let data = serde_json::from_str(&text).map_err(|e| VisionError::Parse(e.to_string()))?;
        Ok((data, usage))
    }

    async fn call_anthropic(&self, req: &VisionRequest<'_>) -> Result<(Value, TokenUsage), VisionError> {
        let mut content = vec![serde_json::json!({"type": "text", "text": req.user_prompt})];
        for image in req.images {
            content.push(serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": "image/png",
                    "data": base64::engine::general_purpose::STANDARD.encode(&image.png_bytes),
                },
            }));
        }

        let tool_name = "record_extraction";
        let body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": 4096,
            "temperature": 0,
            "system": req.system_prompt,
            "messages": [{"role": "user", "content": content}],
            "tools": [{
                "name": tool_name,
                "description": "Record the extracted document fields.",
                "input_schema": req.schema,
            }],
            "tool_choice": {"type": "tool", "name": tool_name},
        });

        let url = format!("{}/v1/messages", self.config.endpoint);
        let resp = self
            .send(
                self.http
                    .post(&url)
                    .header("anthropic-version", "2023-06-01")
                    .header(
                        "x-api-key",
                        self.config.api_key.as_deref().unwrap_or_default(),
                    )
                    .json(&body),
            )
            .await?;

        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            kind: String,
            input: Option<Value>,
        }
        #[derive(Deserialize, Default)]
        struct AnthropicUsage {
            #[serde(default)]
            input_tokens: i64,
            #[serde(default)]
            output_tokens: i64,
        }
        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
            #[serde(default)]
            usage: AnthropicUsage,
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;
        let usage = TokenUsage {
            prompt_tokens: parsed.usage.input_tokens,
            completion_tokens: parsed.usage.output_tokens,
        };
        let data = parsed
            .content
            .into_iter()
            .find(|b| b.kind == "tool_use")
            .and_then(|b| b.input)
            .ok_or_else(|| VisionError::Parse("no tool_use block in response".to_string()))?;
        Ok((data, usage))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, VisionError> {
        let builder = if let Some(key) = &self.config.api_key {
            if self.config.provider == LlmProvider::OpenAi {
                builder.bearer_auth(key)
            } else {
                builder
            }
        } else {
            builder
        };

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                VisionError::Timeout(e.to_string())
            } else {
                VisionError::Connection(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(VisionError::RateLimited(format!("HTTP {status}: {body}")))
        } else {
            Err(VisionError::Api(format!("HTTP {status}: {body}")))
        }
    }
}

fn data_url(png_bytes: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png_bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_map_to_transient() {
        let e: crate::error::AppError = VisionError::Timeout("slow".to_string()).into();
        assert!(e.is_retryable());
    }

    #[test]
    fn non_retryable_errors_map_to_permanent() {
        let e: crate::error::AppError = VisionError::Api("HTTP 400: bad request".to_string()).into();
        assert!(!e.is_retryable());
    }

    #[test]
    fn data_url_has_png_prefix() {
        let url = data_url(&[0x89, b'P', b'N', b'G']);
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
