//! 外部工具执行器
//!
//! ghostscript / ffmpeg / exiftool 都通过这里启动。
//! 进程运行期间持续检查停止信号，收到信号或超时后直接丢弃子进程（`kill_on_drop`）。

use crate::infrastructure::stop_signal::{StopSignal, STOP_POLL_INTERVAL};
use std::ffi::OsStr;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::debug;

/// 进程正常退出后的输出
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// 一次工具调用的结果
#[derive(Debug, Clone)]
pub enum ToolRun {
    Finished(ToolOutput),
    Stopped,
    TimedOut,
}

/// 运行外部工具直到退出、停止或超时
///
/// 启动失败（找不到程序等）以 `io::Error` 返回，由调用方决定如何归类。
pub async fn run_tool<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    stop: &StopSignal,
    timeout: Option<Duration>,
) -> std::io::Result<ToolRun> {
    let program = program.as_ref();
    debug!("启动外部工具: {}", program.to_string_lossy());

    if stop.should_stop() {
        return Ok(ToolRun::Stopped);
    }

    let child = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let started = Instant::now();
    let output = child.wait_with_output();
    tokio::pin!(output);

    loop {
        tokio::select! {
            result = &mut output => {
                let output = result?;
                return Ok(ToolRun::Finished(ToolOutput {
                    success: output.status.success(),
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                }));
            }
            _ = tokio::time::sleep(STOP_POLL_INTERVAL) => {
                if stop.should_stop() {
                    debug!("收到停止信号，终止外部工具: {}", program.to_string_lossy());
                    return Ok(ToolRun::Stopped);
                }
                if timeout.is_some_and(|t| started.elapsed() >= t) {
                    debug!("外部工具超时: {}", program.to_string_lossy());
                    return Ok(ToolRun::TimedOut);
                }
            }
        }
    }
}

/// 检查工具能否执行，成功时返回版本输出
pub async fn check_tool(program: impl AsRef<OsStr>, version_arg: &str) -> Option<String> {
    let output = Command::new(program.as_ref())
        .arg(version_arg)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
