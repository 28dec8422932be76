//! AI 元数据能力的接口
//!
//! 编排层只依赖这个 trait，具体服务商（async-openai 兼容端点）或测试桩在构造时注入。

use async_trait::async_trait;
use std::path::PathBuf;

use crate::infrastructure::StopSignal;
use crate::models::{Priority, StockMetadata};

/// 一次元数据请求
#[derive(Debug, Clone)]
pub struct MetadataRequest {
    pub provider: String,
    /// 图片/矢量为 1 张，视频为抽取的多帧
    pub image_paths: Vec<PathBuf>,
    /// 本次任务独占的 API 密钥
    pub credential: String,
    /// 主体聚焦的提示词（PNG 与矢量转换图）
    pub use_png_prompt: bool,
    pub model: String,
    pub keyword_count: usize,
    pub priority: Priority,
    pub is_vector_conversion: bool,
    pub is_video: bool,
    pub stop: StopSignal,
}

/// 请求结果
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataOutcome {
    Metadata(StockMetadata),
    /// 服务商返回的错误（配额、网络、无法解析等）
    Error(String),
    Stopped,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_metadata(&self, request: MetadataRequest) -> MetadataOutcome;
}
