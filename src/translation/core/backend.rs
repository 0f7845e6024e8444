//! 文本生成服务接口
//!
//! `GenerationBackend` 是网关唯一依赖的外部能力：给定提示词返回原始文本，
//! 失败时区分限流、策略拦截、响应格式错误和超时。`GeminiBackend` 是基于
//! generateContent REST 接口的实现。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::translation::config::TranslationConfig;
use crate::translation::error::{helpers, TranslationError, TranslationResult};

/// 单次生成调用的选项
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// 设置后要求服务按该 schema 返回 JSON
    pub structured_schema: Option<Value>,
}

impl GenerationOptions {
    pub fn free_text() -> Self {
        Self::default()
    }

    pub fn structured(schema: Value) -> Self {
        Self {
            structured_schema: Some(schema),
        }
    }

    pub fn is_structured(&self) -> bool {
        self.structured_schema.is_some()
    }
}

/// 文本生成能力
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> TranslationResult<String>;

    fn name(&self) -> &str;
}

// ============================================================================
// Gemini 实现
// ============================================================================

const API_KEY_HEADER: &str = "x-goog-api-key";

const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Google Gemini generateContent 客户端
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    safety_bypass: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> TranslationResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: crate::translation::config::constants::DEFAULT_API_URL.to_string(),
            model: crate::translation::config::constants::DEFAULT_MODEL.to_string(),
            safety_bypass: true,
        })
    }

    /// 从配置创建，缺少 API 密钥时返回配置错误
    pub fn from_config(config: &TranslationConfig) -> TranslationResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| helpers::config_error("未配置生成服务的 API 密钥 (HANZI_BRIDGE_GEMINI_API_KEY)"))?;

        Ok(Self::new(api_key, config.request_timeout())?
            .with_base_url(&config.api_url)
            .with_model(&config.model)
            .with_safety_bypass(config.safety_bypass))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_safety_bypass(mut self, enabled: bool) -> Self {
        self.safety_bypass = enabled;
        self
    }

    /// 密钥通过请求头传递，不出现在 URL 中
    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn request_body(&self, prompt: &str, options: &GenerationOptions) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        if let Some(schema) = &options.structured_schema {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseSchema": schema,
            });
        }

        if self.safety_bypass {
            body["safetySettings"] = Value::Array(
                SAFETY_CATEGORIES
                    .iter()
                    .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
                    .collect(),
            );
        }

        body
    }

    fn classify_status(status: StatusCode, body: &str) -> TranslationError {
        let detail = format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>());
        match status {
            StatusCode::TOO_MANY_REQUESTS => TranslationError::RateLimited(detail),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TranslationError::ConfigError(detail),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => TranslationError::TimeoutError(detail),
            status if status.is_server_error() => TranslationError::NetworkError(detail),
            _ => TranslationError::InvalidInput(detail),
        }
    }

    fn extract_text(response: GenerateResponse) -> TranslationResult<String> {
        if let Some(reason) = response.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            return Err(TranslationError::PolicyBlocked(reason));
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| TranslationError::MalformedResponse("响应中没有候选结果".to_string()))?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if BLOCKING_FINISH_REASONS.contains(&reason) {
                return Err(TranslationError::PolicyBlocked(reason.to_string()));
            }
        }

        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(TranslationError::MalformedResponse("响应文本为空".to_string()));
        }

        Ok(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> TranslationResult<String> {
        tracing::debug!(
            "调用 {} (structured: {}, {} 字符)",
            self.model,
            options.is_structured(),
            prompt.chars().count()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&self.request_body(prompt, options))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let body = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        Self::extract_text(parsed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
