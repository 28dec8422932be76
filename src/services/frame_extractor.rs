//! 视频抽帧 - 业务能力层

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::{run_tool, StopSignal, ToolRun};

/// 抽帧位置（占总时长的比例）
const FRAME_POSITIONS: [f64; 3] = [0.1, 0.5, 0.9];
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// 抽取若干 JPEG 帧到 `temp_dir`，调用方负责删除
    async fn extract(&self, video: &Path, temp_dir: &Path, stop: &StopSignal)
        -> AppResult<Vec<PathBuf>>;
}

pub struct FfmpegFrameExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    /// 视频时长（秒），探测失败返回 `None`
    async fn read_duration(&self, video: &Path, stop: &StopSignal) -> Option<f64> {
        let args = [
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            video.display().to_string(),
        ];
        match run_tool(&self.ffprobe, &args, stop, Some(FFMPEG_TIMEOUT)).await {
            Ok(ToolRun::Finished(out)) if out.success => parse_duration(&out.stdout),
            Ok(_) => None,
            Err(e) => {
                warn!("⚠ 无法启动 ffprobe: {}", e);
                None
            }
        }
    }

    async fn grab_frame(
        &self,
        video: &Path,
        seconds: f64,
        output: &Path,
        stop: &StopSignal,
    ) -> AppResult<()> {
        let args = [
            "-y".to_string(),
            "-ss".to_string(),
            format!("{:.3}", seconds),
            "-i".to_string(),
            video.display().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-q:v".to_string(),
            "2".to_string(),
            output.display().to_string(),
        ];
        match run_tool(&self.ffmpeg, &args, stop, Some(FFMPEG_TIMEOUT)).await {
            Ok(ToolRun::Finished(out)) if out.success && output.exists() => Ok(()),
            Ok(ToolRun::Finished(out)) => Err(AppError::tool("ffmpeg", out.stderr.trim())),
            Ok(ToolRun::Stopped) => Err(AppError::Stopped),
            Ok(ToolRun::TimedOut) => Err(AppError::tool("ffmpeg", "抽帧超时")),
            Err(e) => Err(AppError::tool("ffmpeg", e.to_string())),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(
        &self,
        video: &Path,
        temp_dir: &Path,
        stop: &StopSignal,
    ) -> AppResult<Vec<PathBuf>> {
        if stop.should_stop() {
            return Err(AppError::Stopped);
        }
        tokio::fs::create_dir_all(temp_dir)
            .await
            .map_err(|e| AppError::io(temp_dir, e))?;

        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let positions: Vec<f64> = match self.read_duration(video, stop).await {
            Some(duration) if duration > 0.0 => {
                FRAME_POSITIONS.iter().map(|p| duration * p).collect()
            }
            _ => {
                debug!("无法获取视频时长，只抽取第一帧: {}", video.display());
                vec![0.0]
            }
        };

        let mut frames = Vec::with_capacity(positions.len());
        for (i, seconds) in positions.into_iter().enumerate() {
            let output = temp_dir.join(format!("{}_frame{}.jpg", stem, i + 1));
            if let Err(e) = self.grab_frame(video, seconds, &output, stop).await {
                for frame in &frames {
                    let _ = tokio::fs::remove_file(frame).await;
                }
                return Err(e);
            }
            frames.push(output);
        }

        debug!("抽取 {} 帧: {}", frames.len(), video.display());
        Ok(frames)
    }
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|line| line.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite())
}
