//! 矢量转换 - 业务能力层
//!
//! - `.svg` 使用 resvg 渲染到白底，再由 image 编码为 JPEG
//! - `.eps` / `.ai` 交给 Ghostscript 栅格化

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbaImage};
use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::{Options, Tree};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::infrastructure::{check_tool, run_tool, StopSignal, ToolRun};

/// 栅格图的长边像素
const RASTER_LONG_SIDE: f32 = 2000.0;
/// Ghostscript 单次转换的最长时间
const GHOSTSCRIPT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Ok,
    Failed(String),
}

impl ConversionResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConversionResult::Ok)
    }
}

#[async_trait]
pub trait VectorConverter: Send + Sync {
    /// 把 `input` 转换为 `output_raster`（JPEG）
    async fn convert(&self, input: &Path, output_raster: &Path, stop: &StopSignal)
        -> ConversionResult;
}

/// 默认的矢量转换实现
pub struct RasterConverter {
    ghostscript: Option<PathBuf>,
}

impl RasterConverter {
    pub fn new(ghostscript: Option<PathBuf>) -> Self {
        Self { ghostscript }
    }

    /// 配置中的路径优先，否则在 PATH 中查找
    pub async fn locate(configured: Option<&Path>) -> Self {
        if let Some(path) = configured {
            return Self::new(Some(path.to_path_buf()));
        }
        let candidates: &[&str] = if cfg!(windows) {
            &["gswin64c", "gswin32c", "gs"]
        } else {
            &["gs"]
        };
        for candidate in candidates {
            if let Some(version) = check_tool(candidate, "--version").await {
                debug!("找到 Ghostscript {}: {}", version, candidate);
                return Self::new(Some(PathBuf::from(candidate)));
            }
        }
        warn!("⚠ 未找到 Ghostscript，EPS/AI 文件将无法转换");
        Self::new(None)
    }

    async fn convert_with_ghostscript(
        &self,
        input: &Path,
        output: &Path,
        stop: &StopSignal,
    ) -> ConversionResult {
        let Some(gs) = &self.ghostscript else {
            return ConversionResult::Failed("未配置 Ghostscript".to_string());
        };

        let args = vec![
            "-dNOPAUSE".into(),
            "-dBATCH".into(),
            "-dSAFER".into(),
            "-dQUIET".into(),
            "-dEPSCrop".into(),
            "-sDEVICE=jpeg".into(),
            "-dJPEGQ=95".into(),
            "-r300".into(),
            format!("-sOutputFile={}", output.display()),
            input.display().to_string(),
        ];

        match run_tool(gs, &args, stop, Some(GHOSTSCRIPT_TIMEOUT)).await {
            Ok(ToolRun::Finished(out)) if out.success => ConversionResult::Ok,
            Ok(ToolRun::Finished(out)) => ConversionResult::Failed(format!(
                "Ghostscript 退出码 {:?}: {}",
                out.code,
                out.stderr.trim()
            )),
            Ok(ToolRun::Stopped) => ConversionResult::Failed("转换已停止".to_string()),
            Ok(ToolRun::TimedOut) => ConversionResult::Failed("Ghostscript 超时".to_string()),
            Err(e) => ConversionResult::Failed(format!("无法启动 Ghostscript: {}", e)),
        }
    }
}

#[async_trait]
impl VectorConverter for RasterConverter {
    async fn convert(
        &self,
        input: &Path,
        output_raster: &Path,
        stop: &StopSignal,
    ) -> ConversionResult {
        if stop.should_stop() {
            return ConversionResult::Failed("转换已停止".to_string());
        }

        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let result = if ext == "svg" {
            let input = input.to_path_buf();
            let output = output_raster.to_path_buf();
            match tokio::task::spawn_blocking(move || render_svg_to_jpeg(&input, &output)).await {
                Ok(Ok(())) => ConversionResult::Ok,
                Ok(Err(e)) => ConversionResult::Failed(e),
                Err(e) => ConversionResult::Failed(format!("SVG 渲染任务异常: {}", e)),
            }
        } else {
            self.convert_with_ghostscript(input, output_raster, stop)
                .await
        };

        if result.is_ok() {
            match std::fs::metadata(output_raster) {
                Ok(meta) if meta.len() > 0 => {
                    info!("✓ 矢量转换成功: {}", output_raster.display());
                }
                _ => return ConversionResult::Failed("转换结果为空".to_string()),
            }
        }
        result
    }
}

/// 渲染 SVG 到白底 JPEG
pub fn render_svg_to_jpeg(input: &Path, output: &Path) -> Result<(), String> {
    let svg_data = std::fs::read(input).map_err(|e| format!("读取 SVG 失败: {}", e))?;
    let tree = Tree::from_data(&svg_data, &Options::default())
        .map_err(|e| format!("解析 SVG 失败: {}", e))?;

    let svg_size = tree.size();
    let (orig_width, orig_height) = (svg_size.width(), svg_size.height());
    let scale = RASTER_LONG_SIDE / orig_width.max(orig_height);
    let width = ((orig_width * scale).ceil() as u32).max(1);
    let height = ((orig_height * scale).ceil() as u32).max(1);

    let mut pixmap = Pixmap::new(width, height).ok_or("创建画布失败")?;
    pixmap.fill(Color::WHITE);
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    // 白底不透明，预乘 alpha 与直通 alpha 相同
    let rgba = RgbaImage::from_raw(width, height, pixmap.data().to_vec()).ok_or("画布转换失败")?;
    DynamicImage::ImageRgba8(rgba)
        .to_rgb8()
        .save_with_format(output, ImageFormat::Jpeg)
        .map_err(|e| format!("写入 JPEG 失败: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
<rect x="0" y="0" width="20" height="20" fill="red"/>
</svg>"#;

    #[test]
    fn test_render_svg_to_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shape.svg");
        let output = dir.path().join("shape.jpg");
        std::fs::write(&input, SVG).unwrap();

        render_svg_to_jpeg(&input, &output).unwrap();

        let img = image::open(&output).unwrap();
        assert_eq!(img.width(), 2000);
        assert_eq!(img.height(), 1000);
    }

    #[tokio::test]
    async fn test_invalid_svg_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.svg");
        std::fs::write(&input, "not svg at all").unwrap();

        let converter = RasterConverter::new(None);
        let result = converter
            .convert(&input, &dir.path().join("out.jpg"), &StopSignal::new())
            .await;
        assert!(matches!(result, ConversionResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_eps_without_ghostscript_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("art.eps");
        std::fs::write(&input, "%!PS-Adobe-3.0 EPSF-3.0").unwrap();

        let converter = RasterConverter::new(None);
        let result = converter
            .convert(&input, &dir.path().join("out.jpg"), &StopSignal::new())
            .await;
        assert_eq!(result, ConversionResult::Failed("未配置 Ghostscript".to_string()));
    }
}
