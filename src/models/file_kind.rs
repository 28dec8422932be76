use std::path::Path;

/// 视频扩展名
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "mpeg", "mpg", "wmv", "flv", "webm", "m4v",
];

/// 需要先栅格化的矢量扩展名
pub const VECTOR_EXTENSIONS: &[&str] = &["eps", "ai", "svg"];

/// 文件类别
///
/// 只由小写扩展名决定，不读取文件内容。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// .jpg / .jpeg
    ImageJpeg,
    /// .png
    ImagePng,
    /// .eps / .ai / .svg
    Vector,
    /// 常见视频容器
    Video,
    /// 其他扩展名
    Unsupported,
}

impl FileKind {
    /// 从路径解析文件类别
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(FileKind::Unsupported)
    }

    /// 从扩展名解析文件类别（可带前导点，大小写不敏感）
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => FileKind::ImageJpeg,
            "png" => FileKind::ImagePng,
            e if VECTOR_EXTENSIONS.contains(&e) => FileKind::Vector,
            e if VIDEO_EXTENSIONS.contains(&e) => FileKind::Video,
            _ => FileKind::Unsupported,
        }
    }

    /// 自动分文件夹时的目标子目录
    pub fn subfolder(self) -> &'static str {
        match self {
            FileKind::Video => "Videos",
            FileKind::Vector => "Vectors",
            _ => "Images",
        }
    }

    pub fn is_supported(self) -> bool {
        self != FileKind::Unsupported
    }

    pub fn is_vector(self) -> bool {
        self == FileKind::Vector
    }

    pub fn is_video(self) -> bool {
        self == FileKind::Video
    }

    /// 获取标准名称（日志用）
    pub fn name(self) -> &'static str {
        match self {
            FileKind::ImageJpeg => "jpeg",
            FileKind::ImagePng => "png",
            FileKind::Vector => "vector",
            FileKind::Video => "video",
            FileKind::Unsupported => "unsupported",
        }
    }
}
