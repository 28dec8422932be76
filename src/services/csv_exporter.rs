//! CSV 导出 - 业务能力层
//!
//! 每个处理成功的文件向 `metadata_csv/` 下的三个平台文件各追加一行：
//! - `adobe_stock.csv`
//! - `shutterstock.csv`
//! - `metadata.csv`（通用格式）

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AppError, AppResult};

pub const CSV_FOLDER_NAME: &str = "metadata_csv";
pub const ADOBE_CSV: &str = "adobe_stock.csv";
pub const SHUTTERSTOCK_CSV: &str = "shutterstock.csv";
pub const GENERIC_CSV: &str = "metadata.csv";

const ADOBE_HEADER: [&str; 5] = ["Filename", "Title", "Keywords", "Category", "Releases"];
const SHUTTERSTOCK_HEADER: [&str; 7] = [
    "Filename",
    "Description",
    "Keywords",
    "Categories",
    "Illustration",
    "Mature Content",
    "Editorial",
];
const GENERIC_HEADER: [&str; 4] = ["Filename", "Title", "Description", "Keywords"];

/// 一行导出数据
#[derive(Debug, Clone, Default)]
pub struct CsvRow {
    pub csv_dir: PathBuf,
    pub filename: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub adobe_category: Option<String>,
    pub shutterstock_category: Option<String>,
    pub auto_category: bool,
    pub is_vector: bool,
    pub max_keywords: usize,
    pub is_video: bool,
}

#[async_trait]
pub trait CsvExporter: Send + Sync {
    async fn append(&self, row: CsvRow) -> AppResult<()>;
}

/// 平台 CSV 导出
///
/// 所有追加经过同一把异步锁，多个 worker 并发写入时行不会交错。
#[derive(Default)]
pub struct PlatformCsvExporter {
    write_lock: Mutex<()>,
}

impl PlatformCsvExporter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CsvExporter for PlatformCsvExporter {
    async fn append(&self, row: CsvRow) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;

        tokio::fs::create_dir_all(&row.csv_dir)
            .await
            .map_err(|e| AppError::io(&row.csv_dir, e))?;

        let keywords = capped_keywords(&row.tags, row.max_keywords).join(", ");
        let adobe_category = if row.auto_category {
            row.adobe_category
                .as_deref()
                .map(adobe_category_number)
                .unwrap_or_default()
        } else {
            String::new()
        };
        let shutterstock_category = if row.auto_category {
            row.shutterstock_category.clone().unwrap_or_default()
        } else {
            String::new()
        };
        let illustration = if row.is_vector { "yes" } else { "no" };

        append_record(
            &row.csv_dir.join(ADOBE_CSV),
            &ADOBE_HEADER,
            &[&row.filename, &row.title, &keywords, &adobe_category, ""],
        )
        .await?;
        append_record(
            &row.csv_dir.join(SHUTTERSTOCK_CSV),
            &SHUTTERSTOCK_HEADER,
            &[
                &row.filename,
                &row.description,
                &keywords,
                &shutterstock_category,
                illustration,
                "no",
                "no",
            ],
        )
        .await?;
        append_record(
            &row.csv_dir.join(GENERIC_CSV),
            &GENERIC_HEADER,
            &[&row.filename, &row.title, &row.description, &keywords],
        )
        .await?;

        debug!("CSV 已追加: {}", row.filename);
        Ok(())
    }
}

async fn append_record(path: &Path, header: &[&str], fields: &[&str]) -> AppResult<()> {
    let needs_header = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };

    let mut content = String::new();
    if needs_header {
        content.push_str(&format_record(header));
    }
    content.push_str(&format_record(fields));

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| AppError::io(path, e))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| AppError::io(path, e))?;
    file.flush().await.map_err(|e| AppError::io(path, e))
}

fn format_record(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// RFC 4180 转义
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn capped_keywords(tags: &[String], max: usize) -> Vec<String> {
    let max = if max == 0 {
        crate::models::DEFAULT_KEYWORD_COUNT
    } else {
        max
    };
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .take(max)
        .map(str::to_string)
        .collect()
}

/// "11. Landscapes" -> "11"，没有编号时原样返回
fn adobe_category_number(category: &str) -> String {
    let digits: String = category
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        category.trim().to_string()
    } else {
        digits
    }
}
