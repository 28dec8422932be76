//! 图片压缩 - 业务能力层
//!
//! 发送给 AI 之前把大图缩小、重新编码，结果按 (路径, 修改时间, 大小) 缓存。
//! 缓存属于压缩器实例，不是进程级全局状态。

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::StopSignal;

/// 临时压缩文件夹名
pub const TEMP_COMPRESSION_FOLDER_NAME: &str = "temp_compressed";
const MAX_IMAGE_BYTES: u64 = 3 * 1024 * 1024;
const MAX_IMAGE_DIMENSION: u32 = 1024;
const BASE_QUALITY: u8 = 75;
const CACHE_CAPACITY: usize = 256;

#[async_trait]
pub trait ImageCompressor: Send + Sync {
    /// 返回 (发送给 AI 的路径, 是否生成了压缩副本)
    ///
    /// 失败或停止时返回原路径和 `false`。
    async fn compress(&self, path: &Path, temp_dir: &Path, stop: &StopSignal) -> (PathBuf, bool);
}

type CacheKey = (PathBuf, SystemTime, u64);

#[derive(Default)]
struct CompressionCache {
    entries: HashMap<CacheKey, PathBuf>,
    order: VecDeque<CacheKey>,
}

impl CompressionCache {
    fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        self.entries.get(key).filter(|p| p.exists()).cloned()
    }

    fn insert(&mut self, key: CacheKey, output: PathBuf) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, output);
            return;
        }
        while self.entries.len() >= CACHE_CAPACITY {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, output);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 默认压缩实现：缩放到 1024px 以内，重新编码为 JPEG
#[derive(Default)]
pub struct JpegCompressor {
    cache: Mutex<CompressionCache>,
}

impl JpegCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// 根据文件大小调整的 JPEG 质量
pub fn adaptive_quality(size_bytes: u64) -> u8 {
    let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
    let penalty = (size_mb.min(50.0) / 10.0) as u8;
    BASE_QUALITY.saturating_sub(penalty).max(10)
}

#[async_trait]
impl ImageCompressor for JpegCompressor {
    async fn compress(&self, path: &Path, temp_dir: &Path, stop: &StopSignal) -> (PathBuf, bool) {
        if stop.should_stop() {
            debug!("收到停止信号，跳过压缩: {}", path.display());
            return (path.to_path_buf(), false);
        }

        let meta = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                warn!("⚠ 读取文件信息失败，跳过压缩 {}: {}", path.display(), e);
                return (path.to_path_buf(), false);
            }
        };
        let key: Option<CacheKey> = meta
            .modified()
            .ok()
            .map(|mtime| (path.to_path_buf(), mtime, meta.len()));

        if let Some(key) = &key {
            if let Some(cached) = self.cache.lock().await.get(key) {
                debug!("压缩缓存命中: {}", cached.display());
                return (cached, true);
            }
        }

        if let Err(e) = tokio::fs::create_dir_all(temp_dir).await {
            warn!("⚠ 创建压缩临时目录失败 {}: {}", temp_dir.display(), e);
            return (path.to_path_buf(), false);
        }

        let input = path.to_path_buf();
        let temp_dir = temp_dir.to_path_buf();
        let size = meta.len();
        let result =
            tokio::task::spawn_blocking(move || compress_blocking(&input, &temp_dir, size)).await;

        let output = match result {
            Ok(Ok(Some(output))) => output,
            Ok(Ok(None)) => return (path.to_path_buf(), false),
            Ok(Err(e)) => {
                warn!("⚠ 压缩失败，使用原图: {}", e);
                return (path.to_path_buf(), false);
            }
            Err(e) => {
                warn!("⚠ 压缩任务异常，使用原图: {}", e);
                return (path.to_path_buf(), false);
            }
        };

        if stop.should_stop() {
            let _ = tokio::fs::remove_file(&output).await;
            return (path.to_path_buf(), false);
        }

        if let Some(key) = key {
            self.cache.lock().await.insert(key, output.clone());
        }
        (output, true)
    }
}

/// 同步压缩，不需要压缩时返回 `Ok(None)`
fn compress_blocking(input: &Path, temp_dir: &Path, size: u64) -> AppResult<Option<PathBuf>> {
    let img = image::open(input).map_err(|e| AppError::image(input, e))?;
    let (width, height) = img.dimensions();

    let needs_resize = width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION;
    let needs_compress = size > MAX_IMAGE_BYTES;
    if !needs_resize && !needs_compress {
        return Ok(None);
    }

    let img = if needs_resize {
        img.resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Lanczos3)
    } else {
        img
    };
    let rgb = flatten_onto_white(&img);

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let output = temp_dir.join(format!("{}_{}_compressed.jpg", stem, ext));

    let quality = adaptive_quality(size);
    write_jpeg(&rgb, &output, quality)?;

    let written = std::fs::metadata(&output)
        .map_err(|e| AppError::io(&output, e))?
        .len();
    if written > MAX_IMAGE_BYTES && quality > 15 {
        debug!("压缩后仍然过大，降低质量重新编码: {}", output.display());
        write_jpeg(&rgb, &output, quality.saturating_sub(10).max(10))?;
    }

    Ok(Some(output))
}

/// 透明像素铺到白底上
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        rgb.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    rgb
}

fn write_jpeg(img: &RgbImage, output: &Path, quality: u8) -> AppResult<()> {
    let file = std::fs::File::create(output).map_err(|e| AppError::io(output, e))?;
    let mut writer = std::io::BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(img)
        .map_err(|e| AppError::image(output, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_adaptive_quality() {
        assert_eq!(adaptive_quality(1024 * 1024), 75);
        assert_eq!(adaptive_quality(25 * 1024 * 1024), 73);
        assert_eq!(adaptive_quality(500 * 1024 * 1024), 70);
    }

    #[test]
    fn test_flatten_transparent_pixel_becomes_white() {
        let mut rgba = RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let rgb = flatten_onto_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let mut cache = CompressionCache::default();
        let now = SystemTime::now();
        for i in 0..CACHE_CAPACITY + 1 {
            cache.insert(
                (PathBuf::from(format!("{}.jpg", i)), now, i as u64),
                PathBuf::from(format!("out{}.jpg", i)),
            );
        }
        assert_eq!(cache.len(), CACHE_CAPACITY);
        assert!(!cache.entries.contains_key(&(PathBuf::from("0.jpg"), now, 0)));
        assert!(cache.entries.contains_key(&(PathBuf::from("1.jpg"), now, 1)));
    }

    #[tokio::test]
    async fn test_small_image_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("small.png");
        RgbaImage::new(16, 16).save(&input).unwrap();

        let compressor = JpegCompressor::new();
        let (path, compressed) = compressor
            .compress(&input, &dir.path().join("temp"), &StopSignal::new())
            .await;
        assert_eq!(path, input);
        assert!(!compressed);
    }

    #[tokio::test]
    async fn test_large_image_is_resized_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("large.png");
        RgbaImage::from_pixel(2048, 1024, Rgba([10, 20, 30, 255]))
            .save(&input)
            .unwrap();
        let temp = dir.path().join("temp");

        let compressor = JpegCompressor::new();
        let (path, compressed) = compressor.compress(&input, &temp, &StopSignal::new()).await;
        assert!(compressed);
        assert_eq!(path, temp.join("large_png_compressed.jpg"));
        let img = image::open(&path).unwrap();
        assert_eq!(img.dimensions(), (1024, 512));

        let (again, _) = compressor.compress(&input, &temp, &StopSignal::new()).await;
        assert_eq!(again, path);
        assert_eq!(compressor.cached_entries().await, 1);
    }
}
