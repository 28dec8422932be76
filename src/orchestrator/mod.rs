//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批处理入口
//! - 校验配置、枚举输入文件
//! - 驱动首轮和重试轮
//! - 清理临时目录，输出全局统计
//!
//! ### `scheduler` - 滑动窗口调度器
//! - 最多 W 个文件同时处理，完成一个补一个（JoinSet）
//! - 提交间隔、密钥轮换、panic 与停止处理
//!
//! ### `retry` - 重试协调
//! - 重试策略表（状态 → 最大尝试次数）
//! - 失败登记表和逐轮重试
//!
//! ### `tally` - 计数与进度
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PathBuf>)
//!     ↓
//! scheduler / retry (一轮一轮地调度)
//!     ↓
//! workflow::FileFlow (处理单个文件)
//!     ↓
//! services (能力层：AI / 转换 / 压缩 / 抽帧 / exiftool / CSV)
//!     ↓
//! infrastructure (基础设施：StopSignal / 外部进程)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：scheduler 只管并发，retry 只管策略
//! 2. **单写者**：计数和失败登记只在调度协程中修改
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体文件处理

pub mod batch_processor;
pub mod retry;
pub mod scheduler;
pub mod tally;

// 重新导出主要类型
pub use batch_processor::{list_input_files, BatchProcessor};
pub use retry::{is_retryable, FailedRegistry, RetryReport, RETRY_POLICY};
pub use scheduler::{JobOutcome, KeyRotation, RoundCandidate, Scheduler, SchedulerSettings};
pub use tally::{BatchTally, ProgressCallback, ProgressReporter};
