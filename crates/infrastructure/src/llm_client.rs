//! LLM 网关 HTTP 客户端
//!
//! `POST {base_url}/completions` 发起补全，`GET {base_url}/models` 列出可用模型。

use std::time::Duration;

use application::{CompletionGateway, GatewayError};
use async_trait::async_trait;
use domain::{ChatMessage, CompletionRequest, CompletionResponse, ModelInfo};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    content: String,
    model: String,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelsReply {
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    provider: String,
}

fn map_reqwest_err(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::transport(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HttpCompletionGateway {
    client: Client,
    base_url: String,
}

impl HttpCompletionGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "LLM 网关返回错误状态");
        Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CompletionGateway for HttpCompletionGateway {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "发送补全请求"
        );

        let body = CompletionBody {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/completions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let response = Self::ensure_success(response).await?;

        let reply: CompletionReply = response.json().await.map_err(map_reqwest_err)?;
        Ok(CompletionResponse {
            content: reply.content,
            model: reply.model,
            prompt_tokens: reply.usage.prompt_tokens,
            output_tokens: reply.usage.output_tokens,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let response = Self::ensure_success(response).await?;

        let reply: ModelsReply = response.json().await.map_err(map_reqwest_err)?;
        Ok(reply
            .models
            .into_iter()
            .map(|entry| ModelInfo {
                id: entry.id,
                provider: entry.provider,
            })
            .collect())
    }
}
