//! 重试协调 - 编排层
//!
//! 首轮结束后，把可重试的失败文件按轮次重新交给调度器，
//! 每个状态有自己的最大尝试次数，保证循环一定结束。

use phf::{phf_map, phf_set};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::infrastructure::StopSignal;
use crate::models::JobStatus;
use crate::orchestrator::scheduler::{JobOutcome, RoundCandidate, Scheduler};
use crate::orchestrator::tally::BatchTally;
use crate::utils::logging::{log_round_complete, log_round_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryRule {
    pub priority: RetryPriority,
    pub max_attempts: u32,
}

/// 可重试状态及其上限
pub static RETRY_POLICY: phf::Map<&'static str, RetryRule> = phf_map! {
    "failed_api" => RetryRule { priority: RetryPriority::High, max_attempts: 5 },
    "failed_copy" => RetryRule { priority: RetryPriority::Medium, max_attempts: 3 },
    "failed_conversion" => RetryRule { priority: RetryPriority::Medium, max_attempts: 3 },
    "failed_frames" => RetryRule { priority: RetryPriority::Medium, max_attempts: 3 },
    "failed_worker" => RetryRule { priority: RetryPriority::Medium, max_attempts: 2 },
    "failed_timeout" => RetryRule { priority: RetryPriority::Medium, max_attempts: 2 },
    "failed_exception" => RetryRule { priority: RetryPriority::Low, max_attempts: 2 },
};

/// 无论尝试几次都不重试
pub static NON_RETRYABLE: phf::Set<&'static str> = phf_set! {
    "failed_format",
    "failed_empty",
    "failed_input_missing",
};

/// 第 `attempt` 次尝试以 `status` 失败后，是否还能再试
pub fn is_retryable(status: JobStatus, attempt: u32) -> bool {
    let key = status.as_str();
    if NON_RETRYABLE.contains(key) {
        return false;
    }
    RETRY_POLICY
        .get(key)
        .is_some_and(|rule| attempt < rule.max_attempts)
}

/// 失败登记表：最近一次尝试失败的文件 → (状态, 尝试次数)
///
/// 只由调度协程读写。
#[derive(Debug, Default)]
pub struct FailedRegistry {
    entries: HashMap<PathBuf, FailedEntry>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct FailedEntry {
    status: JobStatus,
    attempt: u32,
    /// 首次登记顺序，决定重试轮的提交顺序
    seq: u64,
}

impl FailedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: PathBuf, status: JobStatus, attempt: u32) {
        match self.entries.get_mut(&path) {
            Some(entry) => {
                entry.status = status;
                entry.attempt = attempt;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(
                    path,
                    FailedEntry {
                        status,
                        attempt,
                        seq,
                    },
                );
            }
        }
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<(JobStatus, u32)> {
        self.entries.get(path).map(|e| (e.status, e.attempt))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 下一轮的候选：可重试的文件，按首次登记顺序，尝试次数 +1
    pub fn retry_candidates(&self) -> Vec<RoundCandidate> {
        let mut entries: Vec<(&PathBuf, &FailedEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| is_retryable(e.status, e.attempt))
            .collect();
        entries.sort_by_key(|(_, e)| e.seq);
        entries
            .into_iter()
            .map(|(path, e)| RoundCandidate {
                path: path.clone(),
                attempt: e.attempt + 1,
            })
            .collect()
    }
}

/// 重试循环的结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    /// 实际执行的轮数
    pub rounds: u32,
    /// 重试后转为成功的文件数
    pub recovered: usize,
}

/// 首轮结果折算进登记表和计数
pub fn fold_first_pass(outcomes: &[JobOutcome], tally: &mut BatchTally, registry: &mut FailedRegistry) {
    for outcome in outcomes {
        tally.fold_first(outcome.status);
        if outcome.status.class() == crate::models::OutcomeClass::Failed {
            registry.record(outcome.input.clone(), outcome.status, outcome.attempt);
        }
    }
}

/// 单个重试结果折算：失败 → 更新登记；成功 → 失败转成功；停止/跳过 → 离开登记表
pub fn fold_retry_outcome(
    outcome: &JobOutcome,
    tally: &mut BatchTally,
    registry: &mut FailedRegistry,
) -> bool {
    use crate::models::OutcomeClass;

    match outcome.status.class() {
        OutcomeClass::Failed => {
            registry.record(outcome.input.clone(), outcome.status, outcome.attempt);
            false
        }
        class => {
            if registry.remove(&outcome.input) {
                tally.promote(class);
            }
            class == OutcomeClass::Processed
        }
    }
}

/// 执行重试轮，直到没有候选、收到停止信号或所有状态用尽尝试次数
pub async fn run_retry_rounds(
    scheduler: &mut Scheduler,
    tally: &mut BatchTally,
    registry: &mut FailedRegistry,
    stop: &StopSignal,
) -> RetryReport {
    let mut report = RetryReport::default();

    loop {
        if stop.should_stop() {
            info!("⊘ 收到停止信号，结束重试");
            break;
        }

        let candidates = registry.retry_candidates();
        if candidates.is_empty() {
            if report.rounds == 0 {
                info!("没有可重试的失败文件");
            }
            break;
        }

        let round = report.rounds + 1;
        log_round_start(round, candidates.len(), registry.len());

        let mut recovered_this_round = 0;
        let outcomes = scheduler
            .run_round(candidates, &mut |_outcome: &JobOutcome| {})
            .await;
        for outcome in &outcomes {
            if fold_retry_outcome(outcome, tally, registry) {
                recovered_this_round += 1;
            }
        }
        report.rounds = round;
        report.recovered += recovered_this_round;

        let remaining = registry.retry_candidates().len();
        log_round_complete(round, recovered_this_round, outcomes.len(), registry.len());

        if recovered_this_round == 0 {
            if remaining == 0 {
                break;
            }
            warn!(
                "⚠ 第 {} 轮重试没有文件成功，仍有 {} 个可重试文件，继续下一轮",
                round, remaining
            );
        }
    }

    info!(
        "重试结束: 共执行 {} 轮，恢复 {} 个文件，仍失败 {} 个",
        report.rounds,
        report.recovered,
        registry.len()
    );
    report
}
