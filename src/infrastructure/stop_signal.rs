//! 停止信号
//!
//! 调度层和每个 worker 共享同一个信号，在每个阻塞点前后检查。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 轮询停止信号的间隔
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 停止信号
///
/// - `token`：用户请求停止（Ctrl-C / 上层调用方）
/// - `force_stop`：调度层取消剩余任务后置位，让重试循环不再开新一轮
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    force_stop: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求停止
    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// 是否收到停止请求（不含 force stop）
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 停止请求或 force stop 任一成立
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.force_stop.load(Ordering::SeqCst)
    }

    pub fn set_force_stop(&self) {
        self.force_stop.store(true, Ordering::SeqCst);
    }

    /// 每次批处理开始时清除上一次残留的 force stop
    pub fn reset_force_stop(&self) {
        self.force_stop.store(false, Ordering::SeqCst);
    }

    /// 等到收到停止请求
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// 可中断的等待
    ///
    /// 以 [`STOP_POLL_INTERVAL`] 为粒度检查信号。完整睡完返回 `true`，被停止打断返回 `false`。
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.should_stop() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = STOP_POLL_INTERVAL.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = self.token.cancelled() => return false,
            }
        }
    }
}
