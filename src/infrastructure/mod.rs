//! 基础设施层
//!
//! 持有跨层共享的能力：停止信号、外部进程执行。

pub mod stop_signal;
pub mod tool_runner;

pub use stop_signal::StopSignal;
pub use tool_runner::{check_tool, run_tool, ToolOutput, ToolRun};
