//! 元数据写入 - 业务能力层
//!
//! 通过 exiftool 把标题、描述、关键词写进输出文件。
//! 返回 `(should_continue, EmbedStatus)`：`should_continue == false` 表示这个文件的处理必须中止。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::infrastructure::{check_tool, run_tool, StopSignal, ToolRun};
use crate::models::{EmbedStatus, StockMetadata};

/// 标题最大字符数
const MAX_TITLE_CHARS: usize = 160;
const CLEAR_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait MetadataEmbedder: Send + Sync {
    async fn write(
        &self,
        source: &Path,
        output: &Path,
        metadata: &StockMetadata,
        is_video: bool,
        stop: &StopSignal,
    ) -> (bool, EmbedStatus);
}

/// exiftool 写入实现，工具路径在构造时确定
pub struct ExiftoolEmbedder {
    exiftool: Option<PathBuf>,
}

impl ExiftoolEmbedder {
    pub fn new(exiftool: Option<PathBuf>) -> Self {
        Self { exiftool }
    }

    /// 依次尝试：配置路径、PATH 中的 `exiftool`、`tools/exiftool/exiftool`
    pub async fn locate(configured: Option<&Path>) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = configured {
            candidates.push(path.to_path_buf());
        }
        candidates.push(PathBuf::from("exiftool"));
        let bundled = if cfg!(windows) {
            "tools/exiftool/exiftool.exe"
        } else {
            "tools/exiftool/exiftool"
        };
        candidates.push(PathBuf::from(bundled));

        for candidate in candidates {
            if let Some(version) = check_tool(&candidate, "-ver").await {
                info!("✓ 找到 exiftool (版本 {}): {}", version, candidate.display());
                return Self::new(Some(candidate));
            }
            debug!("exiftool 不可用: {}", candidate.display());
        }
        error!("✗ 未找到 exiftool，元数据将不会写入文件");
        Self::new(None)
    }

    pub fn is_available(&self) -> bool {
        self.exiftool.is_some()
    }
}

/// 图片的 exiftool 参数（不含程序名和 `-overwrite_original` 之前的部分）
pub fn image_tag_args(title: &str, description: &str, tags: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    if !title.is_empty() {
        args.push(format!("-Title={}", title));
        args.push(format!("-ObjectName={}", title));
    }
    if !description.is_empty() {
        args.push(format!("-XPComment={}", description));
        args.push(format!("-UserComment={}", description));
        args.push(format!("-ImageDescription={}", description));
    }
    if !tags.is_empty() {
        args.push("-Keywords=".to_string());
        args.push("-Subject=".to_string());
        for tag in tags {
            args.push(format!("-Keywords+={}", tag));
            args.push(format!("-Subject+={}", tag));
        }
    }
    args
}

/// 视频的 exiftool 参数
pub fn video_tag_args(title: &str, description: &str, tags: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    if !title.is_empty() {
        args.push(format!("-Title={}", title));
        args.push(format!("-Track1:Title={}", title));
        args.push(format!("-Movie:Title={}", title));
    }
    if !description.is_empty() {
        for tag in [
            "Description",
            "Comment",
            "UserComment",
            "Track1:Comment",
            "Movie:Comment",
            "Caption-Abstract",
        ] {
            args.push(format!("-{}={}", tag, description));
        }
    }
    if !tags.is_empty() {
        args.push("-Keywords=".to_string());
        args.push("-Subject=".to_string());
        args.push("-Category=".to_string());
        for tag in tags {
            args.push(format!("-Keywords+={}", tag));
            args.push(format!("-Subject+={}", tag));
            args.push(format!("-Category+={}", tag));
        }
    }
    args
}

fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect::<String>().trim().to_string()
}

#[async_trait]
impl MetadataEmbedder for ExiftoolEmbedder {
    async fn write(
        &self,
        source: &Path,
        output: &Path,
        metadata: &StockMetadata,
        is_video: bool,
        stop: &StopSignal,
    ) -> (bool, EmbedStatus) {
        let tags = metadata.cleaned_tags(metadata.keyword_count);

        if stop.should_stop() {
            debug!("写入元数据前收到停止信号");
            return (false, EmbedStatus::Stopped);
        }

        if !output.exists() {
            if is_video {
                error!("✗ 视频输出文件不存在: {}", output.display());
                return (false, EmbedStatus::OutputMissing);
            }
            if let Err(e) = tokio::fs::copy(source, output).await {
                error!("✗ 复制文件到输出目录失败 {}: {}", source.display(), e);
                return (false, EmbedStatus::CopyFailed);
            }
        }

        if stop.should_stop() {
            return (false, EmbedStatus::Stopped);
        }

        let title = truncate_title(&metadata.title);
        let description = metadata.description.trim();
        if title.is_empty() && description.is_empty() && tags.is_empty() {
            info!("没有可写入的元数据: {}", output.display());
            return (true, EmbedStatus::NoMetadata);
        }

        let Some(exiftool) = &self.exiftool else {
            error!("✗ 未配置 exiftool");
            return (true, EmbedStatus::ExiftoolNotFound);
        };

        // 先清掉旧的 XMP/IPTC 标签，失败只记录警告
        if !is_video {
            let clear_args = [
                "-XMP:Title=".to_string(),
                "-XMP:Description=".to_string(),
                "-XMP:Subject=".to_string(),
                "-IPTC:Keywords=".to_string(),
                "-overwrite_original".to_string(),
                output.display().to_string(),
            ];
            match run_tool(exiftool, &clear_args, stop, Some(CLEAR_TIMEOUT)).await {
                Ok(ToolRun::Finished(out)) if out.success => debug!("已清除旧元数据"),
                Ok(ToolRun::Finished(out)) => {
                    warn!("⚠ 清除旧元数据失败 (退出码 {:?}): {}", out.code, out.stderr.trim())
                }
                Ok(ToolRun::Stopped) => return (false, EmbedStatus::Stopped),
                Ok(ToolRun::TimedOut) => warn!("⚠ 清除旧元数据超时"),
                Err(e) => warn!("⚠ 清除旧元数据失败: {}", e),
            }
        }

        if stop.should_stop() {
            return (false, EmbedStatus::Stopped);
        }

        let mut args = vec![
            "-overwrite_original".to_string(),
            "-charset".to_string(),
            "UTF8".to_string(),
            "-codedcharacterset=utf8".to_string(),
        ];
        if is_video {
            args.extend(video_tag_args(&title, description, &tags));
        } else {
            args.extend(image_tag_args(&title, description, &tags));
        }
        args.push(output.display().to_string());

        match run_tool(exiftool, &args, stop, Some(WRITE_TIMEOUT)).await {
            Ok(ToolRun::Finished(out)) if out.success => {
                info!("✓ 元数据已写入: {}", output.display());
                (true, EmbedStatus::ExifOk)
            }
            Ok(ToolRun::Finished(out)) => {
                warn!(
                    "⚠ 写入元数据失败 (退出码 {:?}) {}: {}",
                    out.code,
                    output.display(),
                    out.stderr.trim()
                );
                (true, EmbedStatus::ExifFailed)
            }
            Ok(ToolRun::Stopped) => {
                debug!("已终止运行中的 exiftool");
                (false, EmbedStatus::Stopped)
            }
            Ok(ToolRun::TimedOut) => {
                warn!("⚠ exiftool 超时: {}", output.display());
                (true, EmbedStatus::ExifFailed)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("✗ 执行时找不到 exiftool: {}", e);
                (true, EmbedStatus::ExiftoolNotFound)
            }
            Err(e) => {
                error!("✗ 运行 exiftool 出错: {}", e);
                (true, EmbedStatus::ExifFailed)
            }
        }
    }
}
