//! 提示词
//!
//! 按 质量优先级 × 素材类型 选择，回复格式统一为 JSON 对象。

use crate::models::Priority;

/// 素材类型对应的提示词分组
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// 普通照片
    Photo,
    /// PNG / 矢量转换图，聚焦主体
    Subject,
    /// 视频抽帧
    Video,
}

impl PromptKind {
    pub fn select(use_png_prompt: bool, is_video: bool) -> Self {
        if is_video {
            PromptKind::Video
        } else if use_png_prompt {
            PromptKind::Subject
        } else {
            PromptKind::Photo
        }
    }
}

const ADOBE_CATEGORIES: &str = "1.Animals, 2.Buildings and Architecture, 3.Business, 4.Drinks, \
5.The Environment, 6.States of Mind, 7.Food, 8.Graphic Resources, 9.Hobbies and Leisure, \
10.Industry, 11.Landscapes, 12.Lifestyle, 13.People, 14.Plants and Flowers, \
15.Culture and Religion, 16.Science, 17.Social Issues, 18.Sports, 19.Technology, \
20.Transport, 21.Travel";

const SHUTTERSTOCK_CATEGORIES: &str = "Abstract, Animals/Wildlife, Arts, Backgrounds/Textures, \
Beauty/Fashion, Buildings/Landmarks, Business/Finance, Celebrities, Education, Food and drink, \
Healthcare/Medical, Holidays, Industrial, Interiors, Miscellaneous, Nature, Objects, \
Parks/Outdoor, People, Religion, Science, Signs/Symbols, Sports/Recreation, Technology, \
Transportation, Vintage";

const SYSTEM_MESSAGE: &str = "You are a stock media metadata expert. \
Always answer in English with a single JSON object and nothing else.";

pub fn system_message() -> &'static str {
    SYSTEM_MESSAGE
}

fn subject_line(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Photo => "Analyze the image and generate stock metadata.",
        PromptKind::Subject => {
            "Analyze the image and generate stock metadata focused on the main object or subject."
        }
        PromptKind::Video => {
            "Analyze these video frames as one clip and generate stock video metadata covering all frames."
        }
    }
}

fn detail_line(priority: Priority) -> (&'static str, u32) {
    match priority {
        Priority::Detailed => (
            "Be highly descriptive: distinctive visual features, composition, lighting, mood and context.",
            6,
        ),
        Priority::Balanced => (
            "Describe the key visual elements, setting and notable characteristics.",
            5,
        ),
        Priority::Fast => ("Keep it short and accurate.", 4),
    }
}

/// 构建用户消息
pub fn build_prompt(priority: Priority, kind: PromptKind, keyword_count: usize) -> String {
    let (detail, min_words) = detail_line(priority);
    format!(
        r#"{subject}
{detail}

Fields:
1. title: unique descriptive title (minimum {min_words} words, maximum 180 characters).
2. description: clear description (minimum {min_words} words, maximum 180 characters).
3. keywords: {keyword_count} single-word keywords, most relevant first.
4. adobe_category: one of (number and name): {adobe}
5. shutterstock_category: one of: {shutterstock}

Reply format:
{{"title": "...", "description": "...", "keywords": ["..."], "adobe_category": "11. Landscapes", "shutterstock_category": "Nature"}}"#,
        subject = subject_line(kind),
        detail = detail,
        min_words = min_words,
        keyword_count = keyword_count,
        adobe = ADOBE_CATEGORIES,
        shutterstock = SHUTTERSTOCK_CATEGORIES,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_selection() {
        assert_eq!(PromptKind::select(false, true), PromptKind::Video);
        assert_eq!(PromptKind::select(true, true), PromptKind::Video);
        assert_eq!(PromptKind::select(true, false), PromptKind::Subject);
        assert_eq!(PromptKind::select(false, false), PromptKind::Photo);
    }

    #[test]
    fn test_prompt_mentions_keyword_count() {
        let prompt = build_prompt(Priority::Fast, PromptKind::Photo, 30);
        assert!(prompt.contains("30 single-word keywords"));
        assert!(prompt.contains("minimum 4 words"));
        assert!(prompt.contains("\"adobe_category\""));
    }
}
