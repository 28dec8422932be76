//! 集成测试用的桩实现
//!
//! AI 服务、压缩、转换、抽帧、exiftool 都替换为不碰网络和外部工具的实现，
//! CSV 使用真实的 `PlatformCsvExporter`。

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use auto_metadata::infrastructure::StopSignal;
use auto_metadata::models::{EmbedStatus, StockMetadata};
use auto_metadata::services::{
    Collaborators, ConversionResult, FrameExtractor, ImageCompressor, MetadataEmbedder,
    MetadataOutcome, MetadataProvider, MetadataRequest, PlatformCsvExporter, VectorConverter,
};
use auto_metadata::{AppResult, Config};

/// AI 桩的行为
#[derive(Debug, Clone)]
pub enum ProviderMode {
    AlwaysOk,
    AlwaysError(String),
    /// 每个文件前 n 次返回错误，之后成功
    FailTimes(usize),
    /// 一直等到停止信号
    WaitForStop,
    /// 忽略停止信号一直睡
    Hang,
    Panic,
}

/// AI 桩看到的一次请求
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub image_paths: Vec<PathBuf>,
    /// 调用时这些图片是否都存在
    pub images_existed: bool,
    pub use_png_prompt: bool,
    pub is_vector_conversion: bool,
    pub is_video: bool,
}

/// 记录每次调用的 AI 桩
pub struct StubProvider {
    mode: ProviderMode,
    work: Duration,
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<SeenRequest>>,
    credentials: Mutex<Vec<String>>,
    started: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubProvider {
    pub fn new(mode: ProviderMode) -> Arc<Self> {
        Self::with_work(mode, Duration::ZERO)
    }

    /// 每次调用额外耗时 `work`
    pub fn with_work(mode: ProviderMode, work: Duration) -> Arc<Self> {
        Arc::new(Self {
            mode,
            work,
            calls: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls_for(&self, file_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(file_name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }

    pub fn start_times(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn metadata() -> StockMetadata {
        StockMetadata {
            title: "T".to_string(),
            description: "D".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataProvider for StubProvider {
    async fn get_metadata(&self, request: MetadataRequest) -> MetadataOutcome {
        let name = request
            .image_paths
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(name).or_insert(0);
            *entry += 1;
            *entry
        };
        self.requests.lock().unwrap().push(SeenRequest {
            image_paths: request.image_paths.clone(),
            images_existed: request.image_paths.iter().all(|p| p.exists()),
            use_png_prompt: request.use_png_prompt,
            is_vector_conversion: request.is_vector_conversion,
            is_video: request.is_video,
        });
        self.credentials
            .lock()
            .unwrap()
            .push(request.credential.clone());
        self.started.lock().unwrap().push(Instant::now());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        let outcome = match &self.mode {
            ProviderMode::AlwaysOk => MetadataOutcome::Metadata(Self::metadata()),
            ProviderMode::AlwaysError(message) => MetadataOutcome::Error(message.clone()),
            ProviderMode::FailTimes(n) => {
                if call_no <= *n {
                    MetadataOutcome::Error("quota".to_string())
                } else {
                    MetadataOutcome::Metadata(Self::metadata())
                }
            }
            ProviderMode::WaitForStop => {
                request.stop.cancelled().await;
                MetadataOutcome::Stopped
            }
            ProviderMode::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                MetadataOutcome::Error("hang".to_string())
            }
            ProviderMode::Panic => panic!("provider exploded"),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// 原样返回输入路径
pub struct PassthroughCompressor;

#[async_trait]
impl ImageCompressor for PassthroughCompressor {
    async fn compress(&self, path: &Path, _temp_dir: &Path, _stop: &StopSignal) -> (PathBuf, bool) {
        (path.to_path_buf(), false)
    }
}

/// 把矢量文件原样复制为"栅格图"
pub struct CopyConverter;

#[async_trait]
impl VectorConverter for CopyConverter {
    async fn convert(&self, input: &Path, output_raster: &Path, _stop: &StopSignal) -> ConversionResult {
        match tokio::fs::copy(input, output_raster).await {
            Ok(_) => ConversionResult::Ok,
            Err(e) => ConversionResult::Failed(e.to_string()),
        }
    }
}

/// 写出半张栅格图后报告失败
pub struct FailingConverter;

#[async_trait]
impl VectorConverter for FailingConverter {
    async fn convert(&self, _input: &Path, output_raster: &Path, _stop: &StopSignal) -> ConversionResult {
        let _ = tokio::fs::write(output_raster, b"partial").await;
        ConversionResult::Failed("ghostscript exited with 1".to_string())
    }
}

/// 从视频"抽出"一帧：复制原文件
pub struct CopyFrames;

#[async_trait]
impl FrameExtractor for CopyFrames {
    async fn extract(&self, video: &Path, temp_dir: &Path, _stop: &StopSignal) -> AppResult<Vec<PathBuf>> {
        let frame = temp_dir.join("frame0.jpg");
        tokio::fs::copy(video, &frame).await?;
        Ok(vec![frame])
    }
}

/// 一帧也抽不出来
pub struct EmptyFrames;

#[async_trait]
impl FrameExtractor for EmptyFrames {
    async fn extract(&self, _video: &Path, _temp_dir: &Path, _stop: &StopSignal) -> AppResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// 固定返回某个结果的 exiftool 桩
pub struct StubEmbedder {
    pub should_continue: bool,
    pub status: EmbedStatus,
    /// 只有第一次调用会耗时这么久
    pub first_call_delay: Duration,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn ok() -> Arc<Self> {
        Self::returning(true, EmbedStatus::ExifOk)
    }

    pub fn returning(should_continue: bool, status: EmbedStatus) -> Arc<Self> {
        Arc::new(Self {
            should_continue,
            status,
            first_call_delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    /// 第一次写入耗时 `delay`，之后立即成功
    pub fn slow_first(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            should_continue: true,
            status: EmbedStatus::ExifOk,
            first_call_delay: delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataEmbedder for StubEmbedder {
    async fn write(
        &self,
        _source: &Path,
        _output: &Path,
        _metadata: &StockMetadata,
        _is_video: bool,
        _stop: &StopSignal,
    ) -> (bool, EmbedStatus) {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 && !self.first_call_delay.is_zero() {
            tokio::time::sleep(self.first_call_delay).await;
        }
        (self.should_continue, self.status)
    }
}

pub fn collaborators(provider: Arc<StubProvider>) -> Collaborators {
    Collaborators::new(
        provider,
        Arc::new(CopyConverter),
        Arc::new(PassthroughCompressor),
        Arc::new(CopyFrames),
        StubEmbedder::ok(),
        Arc::new(PlatformCsvExporter::new()),
    )
}

/// 输入/输出目录都在临时目录中
pub struct Workspace {
    _root: tempfile::TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("input");
        let output = root.path().join("output");
        std::fs::create_dir_all(&input).unwrap();
        Self {
            _root: root,
            input,
            output,
        }
    }

    /// 写入一个不小于最小尺寸的假文件，类型由扩展名决定
    pub fn add_file(&self, name: &str) -> PathBuf {
        let path = self.input.join(name);
        std::fs::write(&path, vec![0xFFu8; 256]).unwrap();
        path
    }

    pub fn add_files(&self, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| self.add_file(&format!("photo_{:02}.jpg", i)))
            .collect()
    }

    pub fn config(&self, max_workers: usize) -> Config {
        Config {
            input_dir: self.input.clone(),
            output_dir: self.output.clone(),
            output_log_file: String::new(),
            api_keys: vec!["k1".to_string(), "k2".to_string()],
            max_workers,
            delay_seconds: 0.0,
            embedding_enabled: true,
            auto_retry_enabled: false,
            rename_enabled: false,
            auto_subfolder_enabled: false,
            job_timeout_secs: 30,
            stop_grace_secs: 1,
            ..Config::default()
        }
    }

    /// `metadata_csv/metadata.csv` 中的数据行数（不含表头）
    pub fn csv_rows(&self) -> usize {
        let path = self.output.join("metadata_csv").join("metadata.csv");
        std::fs::read_to_string(path)
            .map(|s| s.lines().filter(|l| !l.is_empty()).count().saturating_sub(1))
            .unwrap_or(0)
    }
}
