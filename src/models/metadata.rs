use serde::{Deserialize, Serialize};

/// 默认关键词上限
pub const DEFAULT_KEYWORD_COUNT: usize = 49;

/// 生成质量优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// 详细
    Detailed,
    /// 均衡
    Balanced,
    /// 快速
    Fast,
}

impl Priority {
    /// 尝试从字符串解析（大小写不敏感）
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "detailed" | "details" | "detail" => Some(Priority::Detailed),
            "balanced" => Some(Priority::Balanced),
            "fast" | "less" => Some(Priority::Fast),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Priority::Detailed => "detailed",
            Priority::Balanced => "balanced",
            Priority::Fast => "fast",
        }
    }
}

/// AI 返回的图库元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// 本次请求的关键词上限，写入 exif/CSV 时再次截断
    pub keyword_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adobe_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutterstock_category: Option<String>,
}

impl StockMetadata {
    /// 去空白、去重（保持顺序）并截断到 `max` 个关键词
    ///
    /// `max` 为 0 时退回默认上限。
    pub fn cleaned_tags(&self, max: usize) -> Vec<String> {
        let max = if max == 0 { DEFAULT_KEYWORD_COUNT } else { max };
        let mut seen = std::collections::HashSet::new();
        self.tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_string()))
            .take(max)
            .map(str::to_string)
            .collect()
    }

    /// 标题、描述、关键词全部为空
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.description.trim().is_empty()
            && self.tags.iter().all(|t| t.trim().is_empty())
    }
}
