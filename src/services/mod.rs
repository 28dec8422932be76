//! 业务能力层（Services）
//!
//! 每个能力是一个 trait，默认实现调用外部服务或外部工具。
//! 流程层只通过 [`Collaborators`] 拿到它们，测试时整体替换为桩实现。

pub mod compressor;
pub mod csv_exporter;
pub mod exif_writer;
pub mod frame_extractor;
pub mod llm_service;
pub mod metadata_provider;
pub mod prompts;
pub mod vector_converter;

pub use compressor::{ImageCompressor, JpegCompressor, TEMP_COMPRESSION_FOLDER_NAME};
pub use csv_exporter::{CsvExporter, CsvRow, PlatformCsvExporter, CSV_FOLDER_NAME};
pub use exif_writer::{ExiftoolEmbedder, MetadataEmbedder};
pub use frame_extractor::{FfmpegFrameExtractor, FrameExtractor};
pub use llm_service::LlmMetadataProvider;
pub use metadata_provider::{MetadataOutcome, MetadataProvider, MetadataRequest};
pub use vector_converter::{ConversionResult, RasterConverter, VectorConverter};

use std::sync::Arc;

use crate::config::Config;

/// 一次批处理使用的全部外部能力
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn MetadataProvider>,
    pub converter: Arc<dyn VectorConverter>,
    pub compressor: Arc<dyn ImageCompressor>,
    pub frames: Arc<dyn FrameExtractor>,
    pub embedder: Arc<dyn MetadataEmbedder>,
    pub csv: Arc<dyn CsvExporter>,
}

impl Collaborators {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        converter: Arc<dyn VectorConverter>,
        compressor: Arc<dyn ImageCompressor>,
        frames: Arc<dyn FrameExtractor>,
        embedder: Arc<dyn MetadataEmbedder>,
        csv: Arc<dyn CsvExporter>,
    ) -> Self {
        Self {
            provider,
            converter,
            compressor,
            frames,
            embedder,
            csv,
        }
    }

    /// 按配置创建默认实现，外部工具路径在这里一次性解析
    pub async fn from_config(config: &Config) -> Self {
        let converter = RasterConverter::locate(config.ghostscript_path.as_deref()).await;
        let embedder = ExiftoolEmbedder::locate(config.exiftool_path.as_deref()).await;

        Self::new(
            Arc::new(LlmMetadataProvider::new(config)),
            Arc::new(converter),
            Arc::new(JpegCompressor::new()),
            Arc::new(FfmpegFrameExtractor::new(
                config.ffmpeg_path.clone(),
                config.ffprobe_path.clone(),
            )),
            Arc::new(embedder),
            Arc::new(PlatformCsvExporter::new()),
        )
    }
}
