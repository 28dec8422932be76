//! 状态码
//!
//! 单个文件一次处理的终态全部在这里，状态集合是封闭的。

use serde::{Serialize, Serializer};
use std::fmt;

/// exiftool 写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedStatus {
    ExifOk,
    ExifFailed,
    NoMetadata,
    Stopped,
    CopyFailed,
    ExiftoolNotFound,
    OutputMissing,
    UnknownError,
}

impl EmbedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbedStatus::ExifOk => "exif_ok",
            EmbedStatus::ExifFailed => "exif_failed",
            EmbedStatus::NoMetadata => "no_metadata",
            EmbedStatus::Stopped => "stopped",
            EmbedStatus::CopyFailed => "copy_failed",
            EmbedStatus::ExiftoolNotFound => "exiftool_not_found",
            EmbedStatus::OutputMissing => "output_missing",
            EmbedStatus::UnknownError => "unknown_error",
        }
    }

    /// 写入中止时对应的 `failed_<status>` 状态码
    fn failed_str(self) -> &'static str {
        match self {
            EmbedStatus::ExifOk => "failed_exif_ok",
            EmbedStatus::ExifFailed => "failed_exif_failed",
            EmbedStatus::NoMetadata => "failed_no_metadata",
            EmbedStatus::Stopped => "failed_stopped",
            EmbedStatus::CopyFailed => "failed_copy_failed",
            EmbedStatus::ExiftoolNotFound => "failed_exiftool_not_found",
            EmbedStatus::OutputMissing => "failed_output_missing",
            EmbedStatus::UnknownError => "failed_unknown_error",
        }
    }
}

impl fmt::Display for EmbedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态归类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Processed,
    Skipped,
    Stopped,
    Failed,
}

/// 单个文件的终态状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    ProcessedExif,
    ProcessedNoExif,
    ProcessedExifFailed,
    ProcessedUnknownExifStatus,
    SkippedExists,
    Stopped,
    FailedFormat,
    FailedEmpty,
    FailedInputMissing,
    FailedApi,
    FailedCopy,
    FailedConversion,
    FailedFrames,
    FailedWorker,
    FailedTimeout,
    FailedException,
    /// exiftool 要求中止（`should_continue == false`）
    FailedEmbed(EmbedStatus),
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::ProcessedExif => "processed_exif",
            JobStatus::ProcessedNoExif => "processed_no_exif",
            JobStatus::ProcessedExifFailed => "processed_exif_failed",
            JobStatus::ProcessedUnknownExifStatus => "processed_unknown_exif_status",
            JobStatus::SkippedExists => "skipped_exists",
            JobStatus::Stopped => "stopped",
            JobStatus::FailedFormat => "failed_format",
            JobStatus::FailedEmpty => "failed_empty",
            JobStatus::FailedInputMissing => "failed_input_missing",
            JobStatus::FailedApi => "failed_api",
            JobStatus::FailedCopy => "failed_copy",
            JobStatus::FailedConversion => "failed_conversion",
            JobStatus::FailedFrames => "failed_frames",
            JobStatus::FailedWorker => "failed_worker",
            JobStatus::FailedTimeout => "failed_timeout",
            JobStatus::FailedException => "failed_exception",
            JobStatus::FailedEmbed(s) => s.failed_str(),
        }
    }

    /// 写入继续时，exiftool 结果到处理状态的映射
    pub fn from_embed(status: EmbedStatus) -> Self {
        match status {
            EmbedStatus::ExifOk => JobStatus::ProcessedExif,
            EmbedStatus::ExifFailed | EmbedStatus::ExiftoolNotFound => {
                JobStatus::ProcessedExifFailed
            }
            EmbedStatus::NoMetadata => JobStatus::ProcessedNoExif,
            _ => JobStatus::ProcessedUnknownExifStatus,
        }
    }

    pub fn class(self) -> OutcomeClass {
        match self {
            JobStatus::ProcessedExif
            | JobStatus::ProcessedNoExif
            | JobStatus::ProcessedExifFailed
            | JobStatus::ProcessedUnknownExifStatus => OutcomeClass::Processed,
            JobStatus::SkippedExists => OutcomeClass::Skipped,
            JobStatus::Stopped => OutcomeClass::Stopped,
            _ => OutcomeClass::Failed,
        }
    }

    pub fn is_processed(self) -> bool {
        self.class() == OutcomeClass::Processed
    }

    /// 日志符号
    pub fn symbol(self) -> &'static str {
        match self {
            JobStatus::ProcessedExif | JobStatus::ProcessedNoExif => "✓",
            JobStatus::ProcessedExifFailed | JobStatus::ProcessedUnknownExifStatus => "⚠",
            JobStatus::SkippedExists => "⋯",
            JobStatus::Stopped => "⊘",
            _ => "✗",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_mapping() {
        assert_eq!(JobStatus::from_embed(EmbedStatus::ExifOk), JobStatus::ProcessedExif);
        assert_eq!(
            JobStatus::from_embed(EmbedStatus::ExifFailed),
            JobStatus::ProcessedExifFailed
        );
        assert_eq!(
            JobStatus::from_embed(EmbedStatus::ExiftoolNotFound),
            JobStatus::ProcessedExifFailed
        );
        assert_eq!(JobStatus::from_embed(EmbedStatus::NoMetadata), JobStatus::ProcessedNoExif);
        assert_eq!(
            JobStatus::from_embed(EmbedStatus::UnknownError),
            JobStatus::ProcessedUnknownExifStatus
        );
    }

    #[test]
    fn test_failed_embed_status_string() {
        assert_eq!(JobStatus::FailedEmbed(EmbedStatus::Stopped).as_str(), "failed_stopped");
        assert_eq!(
            JobStatus::FailedEmbed(EmbedStatus::CopyFailed).as_str(),
            "failed_copy_failed"
        );
        assert_eq!(
            JobStatus::FailedEmbed(EmbedStatus::Stopped).class(),
            OutcomeClass::Failed
        );
    }

    #[test]
    fn test_classes() {
        assert!(JobStatus::ProcessedUnknownExifStatus.is_processed());
        assert_eq!(JobStatus::SkippedExists.class(), OutcomeClass::Skipped);
        assert_eq!(JobStatus::Stopped.class(), OutcomeClass::Stopped);
        assert_eq!(JobStatus::FailedTimeout.class(), OutcomeClass::Failed);
    }

    #[test]
    fn test_serializes_as_status_string() {
        let json = serde_json::to_string(&JobStatus::FailedApi).unwrap();
        assert_eq!(json, "\"failed_api\"");
    }
}
