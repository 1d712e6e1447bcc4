//! Greetings, thanks and goodbyes

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::Result;
use crate::context::ContextStore;

use super::Handler;

/// Keyword group with its possible replies
struct Category {
    keywords: &'static [&'static str],
    replies: &'static [&'static str],
}

static CATEGORIES: [Category; 3] = [
    Category {
        keywords: &["你好", "嗨", "喂", "哈喽", "早上好", "晚上好", "中午好"],
        replies: &[
            "你好！",
            "你好，有什么我可以帮助你的吗？",
            "嗨！很高兴为你服务。",
            "你好啊！",
            "你好，我在这里。",
        ],
    },
    Category {
        keywords: &["谢谢", "感谢", "非常感谢", "多谢"],
        replies: &[
            "不客气！",
            "很高兴能帮到你！",
            "随时为你服务！",
            "不用谢！",
            "这是我应该做的。",
        ],
    },
    Category {
        keywords: &["再见", "拜拜", "回头见", "下次见"],
        replies: &[
            "再见！",
            "下次见！",
            "祝你有愉快的一天！",
            "回头见！",
            "再见，有需要随时叫我。",
        ],
    },
];

/// Small talk handler
#[derive(Debug, Default)]
pub struct GreetingHandler;

impl GreetingHandler {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn category(input: &str) -> Option<&'static Category> {
        let input = input.to_lowercase();
        CATEGORIES
            .iter()
            .find(|c| c.keywords.iter().any(|k| input.contains(k)))
    }
}

#[async_trait]
impl Handler for GreetingHandler {
    fn name(&self) -> &str {
        "greeting"
    }

    fn description(&self) -> &str {
        "回应问候、感谢和道别"
    }

    fn accepts(&self, input: &str, _context: &ContextStore) -> Result<bool> {
        Ok(Self::category(input).is_some())
    }

    async fn respond(&self, input: &str, _context: &mut ContextStore) -> Result<Option<String>> {
        Ok(Self::category(input)
            .and_then(|c| c.replies.choose(&mut rand::thread_rng()))
            .map(ToString::to_string))
    }
}
