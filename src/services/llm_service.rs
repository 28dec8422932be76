//! LLM 元数据服务 - 业务能力层
//!
//! 只负责"看图生成元数据"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 图片以 base64 data URL 内联到 Vision 请求中
//! - 兼容 OpenAI API 的服务（如 Gemini OpenAI 端点、Azure 等）

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::StockMetadata;
use crate::services::metadata_provider::{MetadataOutcome, MetadataProvider, MetadataRequest};
use crate::services::prompts::{build_prompt, system_message, PromptKind};

/// LLM 元数据服务
///
/// 职责：
/// - 把一张图片（或视频的几帧）发给 Vision 模型
/// - 把回复解析为 `StockMetadata`
/// - 不关心文件复制、重命名、exif
/// - 不持有密钥，每次请求使用调用方分配的密钥
pub struct LlmMetadataProvider {
    api_base: String,
}

impl LlmMetadataProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            api_base: config.api_base_url.clone(),
        }
    }

    fn client_for(&self, credential: &str) -> Client<OpenAIConfig> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(credential)
            .with_api_base(&self.api_base);
        Client::with_config(openai_config)
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `imgs`: 图片 URL（可为 data URL），会追加到用户消息中
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        client: &Client<OpenAIConfig>,
        model: &str,
        user_message: &str,
        system_message: Option<&str>,
        imgs: &[String],
    ) -> Result<String> {
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符，图片 {} 张", user_message.len(), imgs.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = if imgs.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()?
        } else {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: user_message.to_string(),
                },
            ));
            for url in imgs {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::Auto),
                        },
                    },
                ));
            }
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()?
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(2048u32)
            .build()?;

        let response = client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            anyhow::anyhow!("LLM API 调用失败: {}", e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }

    async fn request_metadata(&self, request: &MetadataRequest) -> Result<StockMetadata> {
        let mut imgs = Vec::with_capacity(request.image_paths.len());
        for path in &request.image_paths {
            imgs.push(to_data_url(path).await?);
        }

        let kind = PromptKind::select(request.use_png_prompt, request.is_video);
        let user_message = build_prompt(request.priority, kind, request.keyword_count);
        let client = self.client_for(&request.credential);

        let response = self
            .send_to_llm(
                &client,
                &request.model,
                &user_message,
                Some(system_message()),
                &imgs,
            )
            .await?;

        parse_metadata_response(&response, request.keyword_count)
            .ok_or_else(|| anyhow::anyhow!("无法解析 LLM 响应: {}", truncate(&response, 120)))
    }
}

#[async_trait]
impl MetadataProvider for LlmMetadataProvider {
    async fn get_metadata(&self, request: MetadataRequest) -> MetadataOutcome {
        if request.stop.should_stop() {
            return MetadataOutcome::Stopped;
        }
        if request.credential.trim().is_empty() {
            return MetadataOutcome::Error("API 密钥为空".to_string());
        }

        tokio::select! {
            result = self.request_metadata(&request) => match result {
                Ok(metadata) => MetadataOutcome::Metadata(metadata),
                Err(e) => {
                    if request.stop.should_stop() {
                        MetadataOutcome::Stopped
                    } else {
                        MetadataOutcome::Error(format!("{}: {:#}", request.provider, e))
                    }
                }
            },
            _ = request.stop.cancelled() => {
                debug!("等待 LLM 响应时收到停止信号");
                MetadataOutcome::Stopped
            }
        }
    }
}

/// 读取图片并编码为 data URL
async fn to_data_url(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("读取图片失败 {}: {}", path.display(), e))?;
    let mime = match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

/// 解析 LLM 回复
///
/// 先找第一个 JSON 对象，失败时退回 `Title:` / `Description:` / `Keywords:` 行格式。
/// 标题、描述、关键词全部为空时返回 `None`。
pub fn parse_metadata_response(response: &str, keyword_count: usize) -> Option<StockMetadata> {
    let metadata = parse_json_reply(response).or_else(|| parse_line_reply(response))?;
    let metadata = StockMetadata {
        tags: metadata.cleaned_tags(keyword_count),
        keyword_count,
        ..metadata
    };
    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}

fn parse_json_reply(response: &str) -> Option<StockMetadata> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&response[start..=end]).ok()?;
    let object = value.as_object()?;

    let text = |key: &str| -> Option<String> {
        match object.get(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    let tags = match object.get("keywords").or_else(|| object.get("tags")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => split_keywords(s),
        _ => Vec::new(),
    };

    Some(StockMetadata {
        title: text("title").unwrap_or_default(),
        description: text("description").unwrap_or_default(),
        tags,
        keyword_count: 0,
        adobe_category: text("adobe_category").filter(|s| !s.is_empty()),
        shutterstock_category: text("shutterstock_category").filter(|s| !s.is_empty()),
    })
}

fn parse_line_reply(response: &str) -> Option<StockMetadata> {
    let field = |name: &str| -> Option<String> {
        let pattern = format!(r"(?im)^[\s*#]*{}[\s*]*:\s*(.+)$", name);
        let re = Regex::new(&pattern).ok()?;
        re.captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().trim_matches('*').trim().to_string())
    };

    let title = field("title");
    let description = field("description");
    let keywords = field("keywords");
    if title.is_none() && description.is_none() && keywords.is_none() {
        return None;
    }

    Some(StockMetadata {
        title: title.unwrap_or_default(),
        description: description.unwrap_or_default(),
        tags: keywords.map(|k| split_keywords(&k)).unwrap_or_default(),
        keyword_count: 0,
        adobe_category: field("adobe ?stock ?category"),
        shutterstock_category: field("shutterstock ?category"),
    })
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(|k| k.trim().trim_matches('"').trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}
