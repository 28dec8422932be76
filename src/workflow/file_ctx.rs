//! 文件处理上下文
//!
//! 封装"我正在处理哪个文件、第几次尝试、用哪个密钥"这一信息

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::models::{file_name_of, Priority};

/// 单个文件一次处理的上下文
#[derive(Debug, Clone)]
pub struct FileCtx {
    /// 输入文件
    pub input_path: PathBuf,

    /// 输出根目录（自动分类时在其下创建子目录）
    pub output_dir: PathBuf,

    /// 本次任务独占的 API 密钥
    pub credential: String,

    /// 第几次尝试（从 1 开始）
    pub attempt: u32,
}

impl FileCtx {
    pub fn new(input_path: PathBuf, output_dir: PathBuf, credential: String, attempt: u32) -> Self {
        Self {
            input_path,
            output_dir,
            credential,
            attempt,
        }
    }
}

impl Display for FileCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} 第{}次]",
            file_name_of(&self.input_path),
            self.attempt
        )
    }
}

/// 每个文件都相同的处理参数
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub provider: String,
    pub model: String,
    pub keyword_count: usize,
    pub priority: Priority,
    pub rename_enabled: bool,
    pub auto_category_enabled: bool,
    pub auto_subfolder_enabled: bool,
    pub embedding_enabled: bool,
    /// 获取元数据（转换/压缩/抽帧 + AI 调用）的最长时间
    ///
    /// 只覆盖复制到输出目录之前的阶段，复制之后的步骤不会被超时打断。
    pub acquire_timeout: Duration,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            keyword_count: config.keyword_count,
            priority: config.priority,
            rename_enabled: config.rename_enabled,
            auto_category_enabled: config.auto_category_enabled,
            auto_subfolder_enabled: config.auto_subfolder_enabled,
            embedding_enabled: config.embedding_enabled,
            acquire_timeout: Duration::from_secs(config.job_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_timeout_from_config() {
        let config = Config {
            job_timeout_secs: 7,
            ..Config::default()
        };
        let settings = JobSettings::from_config(&config);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(7));
    }
}
