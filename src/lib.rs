//! # Auto Metadata
//!
//! 为图片、矢量和视频批量生成图库元数据（标题、描述、关键词、分类）的 Rust 引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 停止信号、可取消的外部进程调用
//! - `StopSignal` - 全局唯一的取消令牌 + 强制停止标志
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力一个 trait
//! - `MetadataProvider` - AI 生成元数据
//! - `VectorConverter` / `ImageCompressor` / `FrameExtractor` - 准备发给 AI 的图片
//! - `MetadataEmbedder` - exiftool 写入元数据
//! - `CsvExporter` - 追加平台 CSV
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的完整处理流程
//! - `FileCtx` - 上下文封装（文件 + 密钥 + 尝试次数）
//! - `FileFlow` - 流程编排（检查 → AI → 复制 → 写入 → 重命名 → CSV）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scheduler` - 滑动窗口调度
//! - `orchestrator/retry` - 重试策略与重试轮
//! - `orchestrator/batch_processor` - 批处理入口
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::StopSignal;
pub use models::{BatchSummary, FileKind, FileRecord, JobStatus, StockMetadata};
pub use orchestrator::{BatchProcessor, ProgressCallback};
pub use services::Collaborators;
pub use workflow::{FileCtx, FileFlow};
