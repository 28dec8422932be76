use anyhow::{Context, Result};
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::BatchSummary;

/// 安装全局 tracing 订阅器
///
/// `RUST_LOG` 未设置时默认 `info`，`verbose` 为真时默认 `debug`。
/// 重复调用不会报错（测试中会多次调用）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n元数据处理日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("写入日志文件失败: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 滑动窗口批处理模式");
    info!("📁 输入目录: {}", config.input_dir.display());
    info!("📁 输出目录: {}", config.output_dir.display());
    info!(
        "🤖 服务: {} / {} ({} 个密钥)",
        config.provider,
        config.model,
        config.api_keys.len()
    );
    info!(
        "📊 并发数: {}，提交间隔: {} 秒",
        config.max_workers, config.delay_seconds
    );
    info!(
        "⚙️ 重命名: {}，自动分类: {}，分子目录: {}，写入元数据: {}，自动重试: {}",
        on_off(config.rename_enabled),
        on_off(config.auto_category_enabled),
        on_off(config.auto_subfolder_enabled),
        on_off(config.embedding_enabled),
        on_off(config.auto_retry_enabled)
    );
    info!("{}", "=".repeat(60));
}

/// 记录文件加载信息
///
/// # 参数
/// - `total`: 文件总数
/// - `max_workers`: 并发数
pub fn log_files_loaded(total: usize, max_workers: usize) {
    info!("✓ 找到 {} 个待处理的文件", total);
    info!("📋 最多 {} 个同时处理，完成一个立即补位\n", max_workers);
}

/// 记录重试轮开始信息
///
/// # 参数
/// - `round`: 轮次编号
/// - `candidates`: 本轮重试的文件数
/// - `failed_total`: 当前失败登记总数
pub fn log_round_start(round: u32, candidates: usize, failed_total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("🔄 开始第 {} 轮重试", round);
    info!("📄 本轮文件: {} / 失败登记 {} 个", candidates, failed_total);
    info!("{}", "=".repeat(60));
}

/// 记录重试轮完成信息
///
/// # 参数
/// - `round`: 轮次编号
/// - `recovered`: 本轮成功数量
/// - `attempted`: 本轮尝试数量
/// - `still_failed`: 本轮结束后仍失败的数量
pub fn log_round_complete(round: u32, recovered: usize, attempted: usize, still_failed: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 第 {} 轮重试完成: 成功 {}/{}，仍失败 {}",
        round, recovered, attempted, still_failed
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息，并追加到日志文件
///
/// # 参数
/// - `summary`: 批处理汇总
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(summary: &BatchSummary, log_file_path: &str) {
    let finished_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", finished_at);
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", summary.processed_count, summary.total_files);
    info!("❌ 失败: {}", summary.failed_count);
    info!("⋯ 跳过: {}", summary.skipped_count);
    info!("⊘ 停止: {}", summary.stopped_count);
    info!("{}", "=".repeat(60));

    if log_file_path.is_empty() {
        return;
    }
    let block = format!(
        "完成时间: {}\n成功: {}/{}\n失败: {}\n跳过: {}\n停止: {}\n",
        finished_at,
        summary.processed_count,
        summary.total_files,
        summary.failed_count,
        summary.skipped_count,
        summary.stopped_count
    );
    let appended = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_file_path)
        .and_then(|mut file| file.write_all(block.as_bytes()));
    match appended {
        Ok(()) => info!("\n日志已保存至: {}", log_file_path),
        Err(e) => tracing::warn!("⚠ 写入日志文件失败 {}: {}", log_file_path, e),
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "开"
    } else {
        "关"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("日落海滩", 2), "日落...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_log_file_header_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.txt");
        let path = path.to_str().unwrap();

        init_log_file(path).unwrap();
        let summary = BatchSummary {
            processed_count: 2,
            failed_count: 1,
            total_files: 3,
            ..Default::default()
        };
        print_final_stats(&summary, path);

        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with(&"=".repeat(60)));
        assert!(content.contains("成功: 2/3"));
        assert!(content.contains("失败: 1"));
    }
}
