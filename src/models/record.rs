use crate::models::metadata::StockMetadata;
use crate::models::status::JobStatus;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 单个文件一次处理的终态记录
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub status: JobStatus,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub metadata: Option<StockMetadata>,
    pub original_filename: String,
    pub new_filename: Option<String>,
}

impl FileRecord {
    /// 只有状态、没有产出的记录
    pub fn status_only(input: &Path, status: JobStatus) -> Self {
        Self {
            status,
            input: input.to_path_buf(),
            output: None,
            metadata: None,
            original_filename: file_name_of(input),
            new_filename: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<StockMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }
}

/// 批处理汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub stopped_count: usize,
    pub total_files: usize,
    /// 只有整批致命失败时才有值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchSummary {
    /// 致命错误对应的汇总：计数全部为 0
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn accounted(&self) -> usize {
        self.processed_count + self.failed_count + self.skipped_count + self.stopped_count
    }
}

/// 取文件名（日志和 CSV 用）
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
