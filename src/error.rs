use thiserror::Error;

/// 应用程序错误类型
///
/// 外部协作者（AI 服务、转换工具、exiftool、CSV）返回的错误都归到这里，
/// 编排层再把它们折算成单个文件的终态状态码。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件操作错误
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 外部工具错误（ghostscript / ffmpeg / exiftool）
    #[error("外部工具 {tool} 执行失败: {message}")]
    Tool { tool: String, message: String },

    /// AI 服务错误
    #[error("AI 服务 {provider} 调用失败: {message}")]
    Provider { provider: String, message: String },

    /// 图片解码/编码错误
    #[error("图片处理失败 ({path}): {message}")]
    Image { path: String, message: String },

    /// 收到停止信号
    #[error("操作已停止")]
    Stopped,
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件操作错误
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// 创建外部工具错误
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// 创建 AI 服务错误
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// 创建图片处理错误
    pub fn image(path: impl AsRef<std::path::Path>, message: impl std::fmt::Display) -> Self {
        AppError::Image {
            path: path.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, AppError::Stopped)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io {
            path: String::new(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(format!("TOML解析失败: {}", err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
