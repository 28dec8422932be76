use anyhow::Result;
use auto_metadata::utils::logging;
use auto_metadata::{BatchProcessor, Collaborators, Config, StopSignal};
use tracing::{error, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);
    if !config.output_log_file.is_empty() {
        logging::init_log_file(&config.output_log_file)?;
    }

    // Ctrl-C → 停止信号
    let stop = StopSignal::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("⊘ 收到 Ctrl-C，正在停止...");
                ctrl_c_stop.request_stop();
            }
            Err(e) => error!("无法监听 Ctrl-C: {}", e),
        }
    });

    let collaborators = Collaborators::from_config(&config).await;
    let summary = BatchProcessor::new(config, collaborators, stop).run().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(message) = summary.error {
        anyhow::bail!(message);
    }
    Ok(())
}
