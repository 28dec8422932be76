//! 计数与进度
//!
//! 计数只由调度协程修改，worker 只返回结果。

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::models::{file_name_of, BatchSummary, JobStatus, OutcomeClass};
use crate::orchestrator::scheduler::JobOutcome;
use crate::utils::logging::truncate_text;

/// 日志中新文件名的最大字符数
const RENAMED_LOG_CHARS: usize = 60;

/// 进度回调：(已完成, 总数)
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// 一次批处理的累计计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stopped: usize,
    pub total: usize,
}

impl BatchTally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// 首轮结果计入对应计数
    pub fn fold_first(&mut self, status: JobStatus) {
        match status.class() {
            OutcomeClass::Processed => self.processed += 1,
            OutcomeClass::Skipped => self.skipped += 1,
            OutcomeClass::Stopped => self.stopped += 1,
            OutcomeClass::Failed => self.failed += 1,
        }
    }

    /// 之前记为失败的文件在重试中得到了非失败结果
    pub fn promote(&mut self, class: OutcomeClass) {
        if class == OutcomeClass::Failed {
            return;
        }
        self.failed = self.failed.saturating_sub(1);
        match class {
            OutcomeClass::Processed => self.processed += 1,
            OutcomeClass::Skipped => self.skipped += 1,
            OutcomeClass::Stopped => self.stopped += 1,
            OutcomeClass::Failed => {}
        }
    }

    pub fn accounted(&self) -> usize {
        self.processed + self.failed + self.skipped + self.stopped
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            processed_count: self.processed,
            failed_count: self.failed,
            skipped_count: self.skipped,
            stopped_count: self.stopped,
            total_files: self.total,
            error: None,
        }
    }
}

/// 进度汇报
///
/// 有回调时每完成一个文件都通知；日志每完成约 10% 输出一次。
pub struct ProgressReporter {
    total: usize,
    completed: usize,
    log_every: usize,
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            completed: 0,
            log_every: (total / 10).max(1),
            callback,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn advance(&mut self) {
        self.completed += 1;
        if let Some(callback) = &self.callback {
            callback(self.completed, self.total);
        }
        if self.completed % self.log_every == 0 || self.completed == self.total {
            info!("📊 进度: {}/{}", self.completed, self.total);
        }
    }
}

/// 每个文件结果一行日志，符号区分类型
pub fn log_outcome(outcome: &JobOutcome) {
    let name = file_name_of(&outcome.input);
    let symbol = outcome.status.symbol();
    let renamed = renamed_suffix(outcome);

    match outcome.status {
        JobStatus::ProcessedExif | JobStatus::ProcessedNoExif => {
            info!("{} {}{} ({})", symbol, name, renamed, outcome.status)
        }
        JobStatus::ProcessedExifFailed | JobStatus::ProcessedUnknownExifStatus => {
            warn!("{} {}{} ({})", symbol, name, renamed, outcome.status)
        }
        JobStatus::SkippedExists | JobStatus::Stopped => {
            info!("{} {} ({})", symbol, name, outcome.status)
        }
        _ => error!(
            "{} {} ({}, 第 {} 次尝试)",
            symbol, name, outcome.status, outcome.attempt
        ),
    }
}

/// 重命名过的文件在日志里追加 ` → 新文件名`，过长时截断
fn renamed_suffix(outcome: &JobOutcome) -> String {
    outcome
        .record
        .as_ref()
        .and_then(|r| r.new_filename.as_deref())
        .map(|n| format!(" → {}", truncate_text(n, RENAMED_LOG_CHARS)))
        .unwrap_or_default()
}
