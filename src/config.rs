use crate::error::{AppError, AppResult};
use crate::models::Priority;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 推荐的并发 worker 数
///
/// 逻辑核数 × 1.5，限制在 [4, 100] 区间内。
pub fn recommended_workers() -> usize {
    (num_cpus::get() * 3 / 2).clamp(4, 100)
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 输入文件夹
    pub input_dir: PathBuf,
    /// 输出文件夹
    pub output_dir: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 运行日志文件
    pub output_log_file: String,
    // --- AI 服务配置 ---
    /// API 密钥列表，按提交顺序轮换使用
    pub api_keys: Vec<String>,
    pub provider: String,
    pub api_base_url: String,
    pub model: String,
    pub keyword_count: usize,
    pub priority: Priority,
    // --- 外部工具 ---
    pub ghostscript_path: Option<PathBuf>,
    pub exiftool_path: Option<PathBuf>,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    // --- 处理开关 ---
    pub rename_enabled: bool,
    pub auto_category_enabled: bool,
    pub auto_subfolder_enabled: bool,
    pub embedding_enabled: bool,
    pub auto_retry_enabled: bool,
    // --- 调度参数 ---
    /// 同时处理的文件数量
    pub max_workers: usize,
    /// 两次提交之间的最小间隔（秒）
    pub delay_seconds: f64,
    /// 获取元数据阶段的最长时间（秒），复制到输出目录之后不再计时
    pub job_timeout_secs: u64,
    /// 停止后等待进行中任务收尾的时间（秒）
    pub stop_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            api_keys: Vec::new(),
            provider: "gemini".to_string(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            keyword_count: 49,
            priority: Priority::Detailed,
            ghostscript_path: None,
            exiftool_path: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            rename_enabled: false,
            auto_category_enabled: true,
            auto_subfolder_enabled: false,
            embedding_enabled: true,
            auto_retry_enabled: false,
            max_workers: recommended_workers(),
            delay_seconds: 0.0,
            job_timeout_secs: 120,
            stop_grace_secs: 5,
        }
    }
}

impl Config {
    /// 从环境变量加载，未设置的字段使用默认值
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            input_dir: env_path("INPUT_DIR").unwrap_or(default.input_dir),
            output_dir: env_path("OUTPUT_DIR").unwrap_or(default.output_dir),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            api_keys: std::env::var("API_KEYS")
                .map(|v| split_keys(&v))
                .unwrap_or(default.api_keys),
            provider: std::env::var("PROVIDER").unwrap_or(default.provider),
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(default.api_base_url),
            model: std::env::var("MODEL").unwrap_or(default.model),
            keyword_count: env_parse("KEYWORD_COUNT").unwrap_or(default.keyword_count),
            priority: std::env::var("PRIORITY")
                .ok()
                .and_then(|v| Priority::from_str(&v))
                .unwrap_or(default.priority),
            ghostscript_path: env_path("GHOSTSCRIPT_PATH").or(default.ghostscript_path),
            exiftool_path: env_path("EXIFTOOL_PATH").or(default.exiftool_path),
            ffmpeg_path: env_path("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),
            ffprobe_path: env_path("FFPROBE_PATH").unwrap_or(default.ffprobe_path),
            rename_enabled: env_parse("RENAME_ENABLED").unwrap_or(default.rename_enabled),
            auto_category_enabled: env_parse("AUTO_CATEGORY_ENABLED")
                .unwrap_or(default.auto_category_enabled),
            auto_subfolder_enabled: env_parse("AUTO_SUBFOLDER_ENABLED")
                .unwrap_or(default.auto_subfolder_enabled),
            embedding_enabled: env_parse("EMBEDDING_ENABLED").unwrap_or(default.embedding_enabled),
            auto_retry_enabled: env_parse("AUTO_RETRY_ENABLED")
                .unwrap_or(default.auto_retry_enabled),
            max_workers: env_parse("MAX_WORKERS").unwrap_or(default.max_workers),
            delay_seconds: env_parse("DELAY_SECONDS").unwrap_or(default.delay_seconds),
            job_timeout_secs: env_parse("JOB_TIMEOUT_SECS").unwrap_or(default.job_timeout_secs),
            stop_grace_secs: env_parse("STOP_GRACE_SECS").unwrap_or(default.stop_grace_secs),
        }
    }

    /// 从 TOML 文件加载，文件中未出现的字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// `AUTO_METADATA_CONFIG` 指向 TOML 文件时从文件加载，否则读取环境变量
    pub fn load() -> AppResult<Self> {
        match std::env::var("AUTO_METADATA_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(path.trim()),
            _ => Ok(Self::from_env()),
        }
    }

    /// 检查运行前必须满足的条件
    pub fn validate(&self) -> AppResult<()> {
        if self.api_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(AppError::Config("没有可用的 API 密钥".to_string()));
        }
        if self.max_workers == 0 {
            return Err(AppError::Config("max_workers 必须大于 0".to_string()));
        }
        if !self.delay_seconds.is_finite() || self.delay_seconds < 0.0 {
            return Err(AppError::Config(format!(
                "delay_seconds 无效: {}",
                self.delay_seconds
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommended_workers_is_clamped() {
        let workers = recommended_workers();
        assert!((4..=100).contains(&workers));
    }

    #[test]
    fn test_split_keys_drops_blanks() {
        assert_eq!(split_keys(" a, ,b ,"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_validate_rejects_missing_keys() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let config = Config {
            api_keys: vec!["key".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            api_keys = ["k1", "k2"]
            max_workers = 3
            priority = "balanced"
            "#,
        )
        .unwrap();
        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.priority, Priority::Balanced);
        assert_eq!(config.keyword_count, 49);
        assert_eq!(config.job_timeout_secs, 120);
    }
}
