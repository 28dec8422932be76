//! 滑动窗口调度器 - 编排层
//!
//! ## 职责
//!
//! - 最多 `max_workers` 个文件同时处理，任意一个完成立即补位
//! - 相邻两次提交之间至少间隔 `delay`
//! - API 密钥按提交顺序轮换，与结果无关
//! - 停止时不再提交，进行中的任务给一段收尾时间后取消，全部记为 stopped
//! - 任务 panic 记为 failed_exception，按任务 id 找回对应文件
//!
//! 单个任务的超时由 [`FileFlow`] 在获取元数据阶段处理，调度器不会中途打断任务。
//!
//! 首轮和每个重试轮都调用同一个 [`Scheduler::run_round`]。

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::infrastructure::StopSignal;
use crate::models::{FileRecord, JobStatus};
use crate::orchestrator::tally::log_outcome;
use crate::workflow::{FileCtx, FileFlow};

/// 等待任意任务完成的单次超时，超时后重新检查停止信号
const COMPLETION_POLL: Duration = Duration::from_millis(250);

/// 调度参数
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_workers: usize,
    /// 相邻两次提交的最小间隔
    pub delay: Duration,
    /// 停止后等待进行中任务的时间
    pub stop_grace: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            delay: Duration::try_from_secs_f64(config.delay_seconds).unwrap_or(Duration::ZERO),
            stop_grace: Duration::from_secs(config.stop_grace_secs),
        }
    }
}

/// 密钥轮换
///
/// 轮换位置在各轮之间保留。
#[derive(Debug, Clone)]
pub struct KeyRotation {
    keys: Vec<String>,
    next: usize,
}

impl KeyRotation {
    pub fn new(keys: &[String]) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn next_key(&mut self) -> String {
        if self.keys.is_empty() {
            return String::new();
        }
        let key = self.keys[self.next % self.keys.len()].clone();
        self.next = (self.next + 1) % self.keys.len();
        key
    }
}

/// 一轮中的一个候选文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundCandidate {
    pub path: PathBuf,
    /// 本次是第几次尝试
    pub attempt: u32,
}

impl RoundCandidate {
    pub fn first(path: PathBuf) -> Self {
        Self { path, attempt: 1 }
    }
}

/// 一个任务的终态
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub input: PathBuf,
    pub status: JobStatus,
    /// 任务正常返回时的完整记录
    pub record: Option<FileRecord>,
    pub attempt: u32,
}

impl JobOutcome {
    pub fn status_only(input: PathBuf, status: JobStatus, attempt: u32) -> Self {
        Self {
            input,
            status,
            record: None,
            attempt,
        }
    }

    pub fn from_record(record: FileRecord, attempt: u32) -> Self {
        Self {
            input: record.input.clone(),
            status: record.status,
            record: Some(record),
            attempt,
        }
    }

    fn into_stopped(self) -> Self {
        Self {
            status: JobStatus::Stopped,
            ..self
        }
    }
}

/// 滑动窗口调度器
pub struct Scheduler {
    flow: Arc<FileFlow>,
    output_dir: PathBuf,
    settings: SchedulerSettings,
    keys: KeyRotation,
    stop: StopSignal,
    last_submission: Option<Instant>,
}

impl Scheduler {
    pub fn new(
        flow: Arc<FileFlow>,
        output_dir: PathBuf,
        settings: SchedulerSettings,
        keys: KeyRotation,
        stop: StopSignal,
    ) -> Self {
        Self {
            flow,
            output_dir,
            settings,
            keys,
            stop,
            last_submission: None,
        }
    }

    /// 运行一轮：每个候选恰好产生一个结果
    ///
    /// `on_complete` 在每个结果产生时调用（完成顺序）。
    pub async fn run_round(
        &mut self,
        candidates: Vec<RoundCandidate>,
        on_complete: &mut (dyn FnMut(&JobOutcome) + Send),
    ) -> Vec<JobOutcome> {
        let mut queue: VecDeque<RoundCandidate> = candidates.into();
        let mut in_flight: JoinSet<JobOutcome> = JoinSet::new();
        let mut pending: HashMap<Id, RoundCandidate> = HashMap::new();
        let mut outcomes = Vec::with_capacity(queue.len());

        let mut emit = |outcome: JobOutcome, outcomes: &mut Vec<JobOutcome>| {
            log_outcome(&outcome);
            on_complete(&outcome);
            outcomes.push(outcome);
        };

        loop {
            // ========== 补满窗口 ==========
            while in_flight.len() < self.settings.max_workers && !self.stop.should_stop() {
                let Some(candidate) = queue.pop_front() else {
                    break;
                };

                if !self.wait_submission_slot().await {
                    queue.push_front(candidate);
                    break;
                }

                if !candidate.path.exists() {
                    emit(
                        JobOutcome::status_only(
                            candidate.path,
                            JobStatus::FailedInputMissing,
                            candidate.attempt,
                        ),
                        &mut outcomes,
                    );
                    continue;
                }

                let ctx = FileCtx::new(
                    candidate.path.clone(),
                    self.output_dir.clone(),
                    self.keys.next_key(),
                    candidate.attempt,
                );
                debug!("{} 提交", ctx);
                let handle = in_flight.spawn(run_job(self.flow.clone(), ctx, self.stop.clone()));
                pending.insert(handle.id(), candidate);
                self.last_submission = Some(Instant::now());
            }

            if self.stop.should_stop() {
                break;
            }
            if in_flight.is_empty() && queue.is_empty() {
                break;
            }

            // ========== 等待任意一个完成 ==========
            match tokio::time::timeout(COMPLETION_POLL, in_flight.join_next_with_id()).await {
                Err(_) | Ok(None) => continue,
                Ok(Some(joined)) => {
                    if let Some(outcome) = resolve_joined(joined, &mut pending) {
                        emit(outcome, &mut outcomes);
                    }
                }
            }
        }

        if self.stop.should_stop() {
            self.stop.set_force_stop();
            warn!(
                "⊘ 收到停止信号：进行中 {} 个，未提交 {} 个",
                in_flight.len(),
                queue.len()
            );

            let deadline = Instant::now() + self.settings.stop_grace;
            while !in_flight.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                match tokio::time::timeout(deadline - now, in_flight.join_next_with_id()).await {
                    Ok(Some(joined)) => {
                        if let Some(outcome) = resolve_joined(joined, &mut pending) {
                            emit(outcome.into_stopped(), &mut outcomes);
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            in_flight.abort_all();
            while let Some(joined) = in_flight.join_next_with_id().await {
                if let Some(outcome) = resolve_joined(joined, &mut pending) {
                    emit(outcome.into_stopped(), &mut outcomes);
                }
            }

            let mut abandoned: Vec<RoundCandidate> = pending.drain().map(|(_, c)| c).collect();
            abandoned.sort_by(|a, b| a.path.cmp(&b.path));
            for candidate in abandoned {
                emit(
                    JobOutcome::status_only(candidate.path, JobStatus::Stopped, candidate.attempt),
                    &mut outcomes,
                );
            }
            for candidate in queue.drain(..) {
                emit(
                    JobOutcome::status_only(candidate.path, JobStatus::Stopped, candidate.attempt),
                    &mut outcomes,
                );
            }
        }

        outcomes
    }

    /// 等到距上次提交满 `delay`；被停止打断时返回 `false`
    async fn wait_submission_slot(&self) -> bool {
        let Some(last) = self.last_submission else {
            return true;
        };
        let elapsed = last.elapsed();
        if elapsed >= self.settings.delay {
            return !self.stop.should_stop();
        }
        self.stop.sleep(self.settings.delay - elapsed).await
    }
}

/// 运行一个文件
///
/// panic 和取消由 [`resolve_joined`] 折算。
async fn run_job(flow: Arc<FileFlow>, ctx: FileCtx, stop: StopSignal) -> JobOutcome {
    let attempt = ctx.attempt;
    let record = flow.run(ctx, stop).await;
    JobOutcome::from_record(record, attempt)
}

/// 把一个已结束的任务对应回它的候选文件，并从 `pending` 中移除
///
/// 任务 panic 记为 `failed_exception`，被取消记为 `stopped`。
fn resolve_joined(
    joined: Result<(Id, JobOutcome), JoinError>,
    pending: &mut HashMap<Id, RoundCandidate>,
) -> Option<JobOutcome> {
    match joined {
        Ok((id, outcome)) => {
            pending.remove(&id);
            Some(outcome)
        }
        Err(e) => {
            let Some(candidate) = pending.remove(&e.id()) else {
                error!("✗ 未知任务异常结束: {}", e);
                return None;
            };
            let status = if e.is_panic() {
                error!("✗ 处理 {} 时发生 panic: {}", candidate.path.display(), e);
                JobStatus::FailedException
            } else {
                JobStatus::Stopped
            };
            Some(JobOutcome::status_only(candidate.path, status, candidate.attempt))
        }
    }
}
