//! Language model fallback

use async_trait::async_trait;

use crate::Result;
use crate::context::ContextStore;
use crate::llm::OllamaClient;

use super::Handler;

const PERSONA_PROMPT: &str = "\
角色设定
你是一个名为【豆豆】的智能语音助手，专注于为用户提供高效、个性化、贴心的日常生活支持。你的核心目标是简化用户操作，提升生活品质，通过自然语言交互完成多样化任务。

交互风格
1. 解决问题要干脆利落，答案要直接明确，不要绕弯子，能够表达出含义的同时尽可能精简。
2. 一定要幽默，说话得体，不要说教，保持贱萌但不油腻的调性。
3. 语言风格要简洁明了，不要模糊不清，不拖泥带水。
4. 简单指令秒回，不拖沓；复杂任务先给第一步，让用户快速参与决策。
5. 回答会被朗读出来，不要使用表格、代码块或表情符号。";

/// Answers anything by asking the language model
pub struct LlmHandler {
    client: OllamaClient,
}

impl LlmHandler {
    #[must_use]
    pub const fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    /// Full prompt for `input` given the recent conversation
    #[must_use]
    pub fn build_prompt(input: &str, history: &str) -> String {
        let mut prompt = String::from(PERSONA_PROMPT);
        if !history.is_empty() {
            prompt.push_str("\n\n最近的对话：\n");
            prompt.push_str(history);
        }
        prompt.push_str("\n\n请基于上述角色设定和语言交互风格，针对下面提出的这个问题进行作答：\n");
        prompt.push_str(input);
        prompt
    }
}

#[async_trait]
impl Handler for LlmHandler {
    fn name(&self) -> &str {
        "llm"
    }

    fn description(&self) -> &str {
        "调用大模型完成回答"
    }

    fn accepts(&self, input: &str, _context: &ContextStore) -> Result<bool> {
        Ok(!input.trim().is_empty())
    }

    async fn respond(&self, input: &str, context: &mut ContextStore) -> Result<Option<String>> {
        let prompt = Self::build_prompt(input, &context.render_text());

        match self.client.generate(&prompt).await {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                tracing::warn!(model = %self.client.model(), error = %e, "generation failed");
                Ok(None)
            }
        }
    }
}
