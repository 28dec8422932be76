//! 文件处理流程 - 流程层
//!
//! 核心职责：定义"一个文件"的完整处理流程
//!
//! 流程顺序：
//! 1. 确定输出目录（可选按类型分子目录）
//! 2. 已存在检查 / 输入检查 / 空文件检查 / 格式检查
//! 3. 矢量转换 / 压缩 / 视频抽帧 → AI 生成元数据（受 `acquire_timeout` 限制）
//! 4. 复制到输出目录 → 写入 exif（可选）
//! 5. 按标题重命名（可选）
//! 6. 删除输入文件 → 追加 CSV
//!
//! 每一步开始前检查停止信号；任何未预料的错误折算为 `failed_worker`。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::infrastructure::StopSignal;
use crate::models::{file_name_of, EmbedStatus, FileKind, FileRecord, JobStatus, StockMetadata};
use crate::services::{
    Collaborators, CsvRow, MetadataOutcome, MetadataRequest, CSV_FOLDER_NAME,
    TEMP_COMPRESSION_FOLDER_NAME,
};
use crate::utils::logging::truncate_text;
use crate::workflow::file_ctx::{FileCtx, JobSettings};

/// 小于这个字节数的文件视为空文件
pub const MIN_FILE_SIZE: u64 = 100;
/// 重命名冲突时最多尝试的编号数
pub const MAX_RENAME_ATTEMPTS: u32 = 50;
/// 文件名（不含扩展名）的最大字符数
const MAX_BASE_NAME_CHARS: usize = 150;
/// 日志中标题的最大字符数
const TITLE_LOG_CHARS: usize = 60;

/// 重命名目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameTarget {
    /// 新名字与当前文件相同
    Unchanged,
    Target(PathBuf),
    /// 编号用尽
    Exhausted,
}

/// 文件处理流程
///
/// - 编排单个文件从输入到输出的完整过程
/// - 只返回结果记录，不修改任何共享计数
/// - 不持有任何调度状态
pub struct FileFlow {
    collaborators: Collaborators,
    settings: JobSettings,
}

impl FileFlow {
    pub fn new(collaborators: Collaborators, settings: JobSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// 处理一个文件，总是返回一条终态记录
    pub async fn run(&self, ctx: FileCtx, stop: StopSignal) -> FileRecord {
        if stop.should_stop() {
            return FileRecord::status_only(&ctx.input_path, JobStatus::Stopped);
        }

        let record = match self.try_run(&ctx, &stop).await {
            Ok(record) => record,
            Err(e) => {
                error!("{} ✗ 处理过程中发生错误: {:#}", ctx, e);
                FileRecord::status_only(&ctx.input_path, JobStatus::FailedWorker)
            }
        };

        if stop.should_stop() && record.status != JobStatus::Stopped {
            debug!("{} 完成时已收到停止信号，记为 stopped", ctx);
            return FileRecord {
                status: JobStatus::Stopped,
                ..record
            };
        }
        record
    }

    async fn try_run(&self, ctx: &FileCtx, stop: &StopSignal) -> Result<FileRecord> {
        let input = ctx.input_path.as_path();
        let original_filename = file_name_of(input);
        let kind = FileKind::from_path(input);
        let stopped = || FileRecord::status_only(input, JobStatus::Stopped);

        // ========== 1. 输出目录 ==========
        let target_dir = self.resolve_target_dir(&ctx.output_dir, kind).await;
        let output_path = target_dir.join(&original_filename);

        if stop.should_stop() {
            return Ok(stopped());
        }

        // ========== 2. 前置检查 ==========
        if output_path.exists() {
            info!("{} ⋯ 输出文件已存在，跳过", ctx);
            return Ok(FileRecord::status_only(input, JobStatus::SkippedExists)
                .with_output(Some(output_path)));
        }

        let file_meta = match tokio::fs::metadata(input).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("{} ✗ 输入文件在处理前消失", ctx);
                return Ok(FileRecord::status_only(input, JobStatus::FailedInputMissing));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("读取文件信息失败: {}", input.display()))
            }
        };

        if file_meta.len() < MIN_FILE_SIZE {
            warn!("{} ✗ 文件过小或为空 ({} 字节)", ctx, file_meta.len());
            return Ok(FileRecord::status_only(input, JobStatus::FailedEmpty));
        }

        if !kind.is_supported() {
            warn!("{} ✗ 不支持的文件格式", ctx);
            return Ok(FileRecord::status_only(input, JobStatus::FailedFormat));
        }

        if stop.should_stop() {
            return Ok(stopped());
        }

        // ========== 3. 获取元数据 ==========
        let temp_dir = target_dir.join(TEMP_COMPRESSION_FOLDER_NAME);
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .with_context(|| format!("创建临时目录失败: {}", temp_dir.display()))?;

        // 超时只覆盖复制之前的阶段，之后的步骤一旦开始就做完
        let acquisition = async {
            match kind {
                FileKind::Vector => self.acquire_vector(ctx, &temp_dir, stop).await,
                FileKind::Video => self.acquire_video(ctx, &temp_dir, stop).await,
                _ => self.acquire_image(ctx, kind, &temp_dir, stop).await,
            }
        };
        let acquired = match tokio::time::timeout(self.settings.acquire_timeout, acquisition).await
        {
            Ok(acquired) => acquired,
            Err(_) => {
                warn!(
                    "{} ✗ 获取元数据超过 {} 秒，放弃",
                    ctx,
                    self.settings.acquire_timeout.as_secs_f64()
                );
                Err(JobStatus::FailedTimeout)
            }
        };
        let mut metadata = match acquired {
            Ok(metadata) => metadata,
            Err(status) => return Ok(FileRecord::status_only(input, status)),
        };
        metadata.keyword_count = self.settings.keyword_count;
        debug!("{} 标题: {}", ctx, truncate_text(&metadata.title, TITLE_LOG_CHARS));

        let with_metadata = |status: JobStatus, output: Option<PathBuf>| {
            FileRecord::status_only(input, status)
                .with_metadata(Some(metadata.clone()))
                .with_output(output)
        };

        if stop.should_stop() {
            return Ok(with_metadata(JobStatus::Stopped, None));
        }

        // ========== 4. 复制 + 写入 exif ==========
        if !output_path.exists() {
            if let Err(e) = tokio::fs::copy(input, &output_path).await {
                error!("{} ✗ 复制到输出目录失败: {}", ctx, e);
                return Ok(with_metadata(JobStatus::FailedCopy, None));
            }
        }

        let status = if !self.settings.embedding_enabled {
            debug!("{} 未启用元数据写入", ctx);
            JobStatus::ProcessedNoExif
        } else {
            let (should_continue, embed_status) = self
                .collaborators
                .embedder
                .write(input, &output_path, &metadata, kind.is_video(), stop)
                .await;
            if !should_continue {
                warn!("{} ✗ 写入元数据中止: {}", ctx, embed_status);
                return Ok(with_metadata(
                    JobStatus::FailedEmbed(embed_status),
                    Some(output_path),
                ));
            }
            if embed_status != EmbedStatus::ExifOk {
                warn!("{} ⚠ 元数据写入结果: {}", ctx, embed_status);
            }
            JobStatus::from_embed(embed_status)
        };

        // ========== 5. 重命名 ==========
        let mut final_path = output_path.clone();
        let mut new_filename = None;
        let title = metadata.title.trim();
        if self.settings.rename_enabled && !title.is_empty() {
            if let Some(renamed) = self.rename_output(ctx, &target_dir, &output_path, title).await {
                new_filename = Some(file_name_of(&renamed));
                final_path = renamed;
            }
        }

        // ========== 6. 删除输入 + CSV ==========
        if let Err(e) = tokio::fs::remove_file(input).await {
            warn!("{} ⚠ 删除原始文件失败: {}", ctx, e);
        }

        let title_for_csv = match &new_filename {
            Some(_) => final_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| metadata.title.clone()),
            None => metadata.title.clone(),
        };
        let row = CsvRow {
            csv_dir: target_dir.join(CSV_FOLDER_NAME),
            filename: file_name_of(&final_path),
            title: title_for_csv,
            description: metadata.description.clone(),
            tags: metadata.tags.clone(),
            adobe_category: metadata.adobe_category.clone(),
            shutterstock_category: metadata.shutterstock_category.clone(),
            auto_category: self.settings.auto_category_enabled,
            is_vector: kind.is_vector(),
            max_keywords: self.settings.keyword_count,
            is_video: kind.is_video(),
        };
        if let Err(e) = self.collaborators.csv.append(row).await {
            warn!("{} ⚠ 写入 CSV 失败: {}", ctx, e);
        }

        Ok(FileRecord {
            status,
            input: input.to_path_buf(),
            output: Some(final_path),
            metadata: Some(metadata),
            original_filename,
            new_filename,
        })
    }

    /// 自动分类时返回类型子目录，创建失败退回输出根目录
    async fn resolve_target_dir(&self, output_dir: &Path, kind: FileKind) -> PathBuf {
        if !self.settings.auto_subfolder_enabled || !kind.is_supported() {
            return output_dir.to_path_buf();
        }
        let dir = output_dir.join(kind.subfolder());
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => dir,
            Err(e) => {
                error!("创建子目录失败 {}: {}，使用输出根目录", dir.display(), e);
                output_dir.to_path_buf()
            }
        }
    }

    fn request(&self, ctx: &FileCtx, image_paths: Vec<PathBuf>, stop: &StopSignal) -> MetadataRequest {
        MetadataRequest {
            provider: self.settings.provider.clone(),
            image_paths,
            credential: ctx.credential.clone(),
            use_png_prompt: false,
            model: self.settings.model.clone(),
            keyword_count: self.settings.keyword_count,
            priority: self.settings.priority,
            is_vector_conversion: false,
            is_video: false,
            stop: stop.clone(),
        }
    }

    async fn call_provider(
        &self,
        ctx: &FileCtx,
        request: MetadataRequest,
    ) -> std::result::Result<StockMetadata, JobStatus> {
        match self.collaborators.provider.get_metadata(request).await {
            MetadataOutcome::Metadata(metadata) => Ok(metadata),
            MetadataOutcome::Stopped => Err(JobStatus::Stopped),
            MetadataOutcome::Error(message) => {
                warn!("{} ✗ AI 服务返回错误: {}", ctx, message);
                Err(JobStatus::FailedApi)
            }
        }
    }

    async fn acquire_image(
        &self,
        ctx: &FileCtx,
        kind: FileKind,
        temp_dir: &Path,
        stop: &StopSignal,
    ) -> std::result::Result<StockMetadata, JobStatus> {
        let (send_path, compressed) = self
            .collaborators
            .compressor
            .compress(&ctx.input_path, temp_dir, stop)
            .await;

        let request = MetadataRequest {
            use_png_prompt: kind == FileKind::ImagePng,
            ..self.request(ctx, vec![send_path.clone()], stop)
        };
        let result = self.call_provider(ctx, request).await;

        if compressed {
            remove_quietly(&send_path).await;
        }
        result
    }

    async fn acquire_vector(
        &self,
        ctx: &FileCtx,
        temp_dir: &Path,
        stop: &StopSignal,
    ) -> std::result::Result<StockMetadata, JobStatus> {
        let stem = ctx
            .input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "vector".to_string());
        let mut raster = temp_dir.join(format!("{}_converted.jpg", stem));

        let conversion = self
            .collaborators
            .converter
            .convert(&ctx.input_path, &raster, stop)
            .await;
        if let crate::services::ConversionResult::Failed(message) = conversion {
            remove_quietly(&raster).await;
            if stop.should_stop() {
                return Err(JobStatus::Stopped);
            }
            warn!("{} ✗ 矢量转换失败: {}", ctx, message);
            return Err(JobStatus::FailedConversion);
        }

        if stop.should_stop() {
            remove_quietly(&raster).await;
            return Err(JobStatus::Stopped);
        }

        let (compressed_path, compressed) = self
            .collaborators
            .compressor
            .compress(&raster, temp_dir, stop)
            .await;
        if compressed && compressed_path != raster {
            remove_quietly(&raster).await;
            raster = compressed_path;
        }

        let request = MetadataRequest {
            use_png_prompt: true,
            is_vector_conversion: true,
            ..self.request(ctx, vec![raster.clone()], stop)
        };
        let result = self.call_provider(ctx, request).await;

        remove_quietly(&raster).await;
        result
    }

    async fn acquire_video(
        &self,
        ctx: &FileCtx,
        temp_dir: &Path,
        stop: &StopSignal,
    ) -> std::result::Result<StockMetadata, JobStatus> {
        let frames = match self
            .collaborators
            .frames
            .extract(&ctx.input_path, temp_dir, stop)
            .await
        {
            Ok(frames) if !frames.is_empty() => frames,
            Ok(_) => {
                warn!("{} ✗ 没有抽取到视频帧", ctx);
                return Err(JobStatus::FailedFrames);
            }
            Err(e) if e.is_stopped() => return Err(JobStatus::Stopped),
            Err(e) => {
                warn!("{} ✗ 视频抽帧失败: {}", ctx, e);
                return Err(JobStatus::FailedFrames);
            }
        };

        let request = MetadataRequest {
            is_video: true,
            ..self.request(ctx, frames.clone(), stop)
        };
        let result = self.call_provider(ctx, request).await;

        for frame in &frames {
            remove_quietly(frame).await;
        }
        result
    }

    async fn rename_output(
        &self,
        ctx: &FileCtx,
        target_dir: &Path,
        output_path: &Path,
        title: &str,
    ) -> Option<PathBuf> {
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut base = sanitize_filename(title);
        if base.is_empty() {
            base = format!("untitled_{}", stem);
        }
        let ext = output_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        match resolve_rename_target(target_dir, &base, &ext, output_path) {
            RenameTarget::Unchanged => None,
            RenameTarget::Exhausted => {
                error!("{} ✗ 找不到可用的新文件名，保留原名", ctx);
                None
            }
            RenameTarget::Target(new_path) => match tokio::fs::rename(output_path, &new_path).await {
                Ok(()) => {
                    info!("{} 重命名为: {}", ctx, file_name_of(&new_path));
                    Some(new_path)
                }
                Err(e) => {
                    error!("{} ✗ 重命名失败: {}", ctx, e);
                    None
                }
            },
        }
    }
}

/// 把标题转换成安全的文件名（不含扩展名）
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_BASE_NAME_CHARS).collect();
    truncated.trim_matches(|c: char| c == '.' || c.is_whitespace()).to_string()
}

/// 为重命名找一个不冲突的路径
///
/// `base` 冲突时依次尝试 `base (1)`、`base (2)`……最多 [`MAX_RENAME_ATTEMPTS`] 次。
pub fn resolve_rename_target(dir: &Path, base: &str, ext: &str, current: &Path) -> RenameTarget {
    let mut candidate = dir.join(format!("{}{}", base, ext));
    if candidate.to_string_lossy().to_lowercase() == current.to_string_lossy().to_lowercase() {
        return RenameTarget::Unchanged;
    }

    let mut counter = 0;
    while candidate.exists() && counter < MAX_RENAME_ATTEMPTS {
        counter += 1;
        candidate = dir.join(format!("{} ({}){}", base, counter, ext));
    }
    if candidate.exists() {
        RenameTarget::Exhausted
    } else {
        RenameTarget::Target(candidate)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("删除临时文件失败 {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Sunset"), "Sunset");
        assert_eq!(sanitize_filename("  a/b: c?  "), "a b c");
        assert_eq!(sanitize_filename("..."), "");
        assert_eq!(sanitize_filename(&"x".repeat(300)).len(), MAX_BASE_NAME_CHARS);
    }

    #[test]
    fn test_rename_collision_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("photo.jpg");
        std::fs::write(&current, b"x").unwrap();
        std::fs::write(dir.path().join("Sunset.jpg"), b"other").unwrap();

        let first = resolve_rename_target(dir.path(), "Sunset", ".jpg", &current);
        assert_eq!(first, RenameTarget::Target(dir.path().join("Sunset (1).jpg")));

        std::fs::write(dir.path().join("Sunset (1).jpg"), b"other").unwrap();
        let second = resolve_rename_target(dir.path(), "Sunset", ".jpg", &current);
        assert_eq!(second, RenameTarget::Target(dir.path().join("Sunset (2).jpg")));
    }

    #[test]
    fn test_rename_to_same_name_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("sunset.JPG");
        std::fs::write(&current, b"x").unwrap();
        assert_eq!(
            resolve_rename_target(dir.path(), "Sunset", ".jpg", &current),
            RenameTarget::Unchanged
        );
    }

    #[test]
    fn test_rename_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("photo.jpg");
        std::fs::write(dir.path().join("Sunset.jpg"), b"x").unwrap();
        for i in 1..=MAX_RENAME_ATTEMPTS {
            std::fs::write(dir.path().join(format!("Sunset ({}).jpg", i)), b"x").unwrap();
        }
        assert_eq!(
            resolve_rename_target(dir.path(), "Sunset", ".jpg", &current),
            RenameTarget::Exhausted
        );
    }
}
