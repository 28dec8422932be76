//! 批处理入口 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个引擎的入口，负责一次批处理的完整生命周期。
//!
//! ## 核心功能
//!
//! 1. **运行前检查**：校验配置、准备输出目录
//! 2. **文件枚举**：按目录列出顺序收集支持的文件
//! 3. **首轮处理**：交给 [`Scheduler`] 以滑动窗口方式处理全部文件
//! 4. **自动重试**：按重试策略执行若干重试轮
//! 5. **收尾**：清理临时压缩目录，输出并返回汇总
//!
//! ## 设计特点
//!
//! - **唯一致命路径**：内部任何未预料的错误都只会变成带 `error` 的零计数汇总
//! - **计数只在这里**：worker 只返回结果，计数和失败登记都由本协程维护

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::infrastructure::StopSignal;
use crate::models::{BatchSummary, FileKind};
use crate::orchestrator::retry::{fold_first_pass, run_retry_rounds, FailedRegistry};
use crate::orchestrator::scheduler::{
    JobOutcome, KeyRotation, RoundCandidate, Scheduler, SchedulerSettings,
};
use crate::orchestrator::tally::{BatchTally, ProgressCallback, ProgressReporter};
use crate::services::{Collaborators, CSV_FOLDER_NAME, TEMP_COMPRESSION_FOLDER_NAME};
use crate::utils::logging::{log_files_loaded, log_startup, print_final_stats};
use crate::workflow::{FileFlow, JobSettings};

/// 批处理器
pub struct BatchProcessor {
    config: Config,
    collaborators: Collaborators,
    stop: StopSignal,
    progress: Option<ProgressCallback>,
}

impl BatchProcessor {
    pub fn new(config: Config, collaborators: Collaborators, stop: StopSignal) -> Self {
        Self {
            config,
            collaborators,
            stop,
            progress: None,
        }
    }

    /// 设置进度回调：每个首轮文件完成时调用 `(已完成, 总数)`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// 运行一次批处理，总是返回汇总
    pub async fn run(&self) -> BatchSummary {
        match self.run_inner().await {
            Ok(summary) => summary,
            Err(e) => {
                error!("✗ 批处理异常终止: {:#}", e);
                BatchSummary::fatal(format!("{:#}", e))
            }
        }
    }

    async fn run_inner(&self) -> Result<BatchSummary> {
        let config = &self.config;
        config.validate()?;
        self.stop.reset_force_stop();
        log_startup(config);

        // ========== 1. 输出目录 ==========
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .with_context(|| format!("创建输出目录失败: {}", config.output_dir.display()))?;
        if !config.auto_subfolder_enabled {
            let csv_dir = config.output_dir.join(CSV_FOLDER_NAME);
            tokio::fs::create_dir_all(&csv_dir)
                .await
                .with_context(|| format!("创建 CSV 目录失败: {}", csv_dir.display()))?;
        }

        // ========== 2. 枚举文件 ==========
        info!("\n📁 正在扫描待处理的文件...");
        let files = list_input_files(&config.input_dir).await?;
        let total = files.len();
        if total == 0 {
            warn!("⚠️ 输入目录中没有可处理的文件");
            return Ok(BatchTally::new(0).summary());
        }
        log_files_loaded(total, config.max_workers);

        let mut reporter = ProgressReporter::new(total, self.progress.clone());
        if let Some(callback) = &self.progress {
            callback(0, total);
        }

        let flow = Arc::new(FileFlow::new(
            self.collaborators.clone(),
            JobSettings::from_config(config),
        ));
        let mut scheduler = Scheduler::new(
            flow,
            config.output_dir.clone(),
            SchedulerSettings::from_config(config),
            KeyRotation::new(&config.api_keys),
            self.stop.clone(),
        );

        // ========== 3. 首轮 ==========
        let candidates = files.into_iter().map(RoundCandidate::first).collect();
        let outcomes = scheduler
            .run_round(candidates, &mut |_outcome: &JobOutcome| reporter.advance())
            .await;

        let mut tally = BatchTally::new(total);
        let mut registry = FailedRegistry::new();
        fold_first_pass(&outcomes, &mut tally, &mut registry);
        info!(
            "首轮完成: 成功 {}，失败 {}，跳过 {}，停止 {}",
            tally.processed, tally.failed, tally.skipped, tally.stopped
        );

        // ========== 4. 自动重试 ==========
        if config.auto_retry_enabled && tally.failed > 0 && !self.stop.should_stop() {
            let report =
                run_retry_rounds(&mut scheduler, &mut tally, &mut registry, &self.stop).await;
            debug!("重试报告: {:?}", report);
        }

        // ========== 5. 收尾 ==========
        cleanup_temp_folders(&config.output_dir, config.auto_subfolder_enabled).await;

        if tally.accounted() != tally.total {
            warn!(
                "⚠ 计数不一致: 已统计 {}，总数 {}",
                tally.accounted(),
                tally.total
            );
        }
        let summary = tally.summary();
        print_final_stats(&summary, &config.output_log_file);
        Ok(summary)
    }
}

/// 列出输入目录中支持的文件（目录列出顺序，跳过隐藏文件）
pub async fn list_input_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(input_dir)
        .await
        .with_context(|| format!("读取输入目录失败: {}", input_dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("读取输入目录失败: {}", input_dir.display()))?
    {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if !FileKind::from_path(&path).is_supported() {
            continue;
        }
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("⚠ 无法读取文件类型 {}: {}", path.display(), e),
        }
    }
    Ok(files)
}

/// 删除输出目录（及分类子目录）下的临时压缩目录
async fn cleanup_temp_folders(output_dir: &Path, auto_subfolder: bool) {
    let mut folders = vec![output_dir.join(TEMP_COMPRESSION_FOLDER_NAME)];
    if auto_subfolder {
        for kind in [FileKind::ImageJpeg, FileKind::Video, FileKind::Vector] {
            folders.push(
                output_dir
                    .join(kind.subfolder())
                    .join(TEMP_COMPRESSION_FOLDER_NAME),
            );
        }
    }

    for folder in folders {
        if !folder.is_dir() {
            continue;
        }
        match tokio::fs::remove_dir_all(&folder).await {
            Ok(()) => debug!("🧹 已清理临时目录 {}", folder.display()),
            Err(e) => warn!("⚠ 清理临时目录失败 {}: {}", folder.display(), e),
        }
    }
}
