//! Prompt Assembler (C10, spec §4.5): builds a grounded system+user prompt
//! from retrieved hits and chat history, strictly bounded by what was
//! actually retrieved.

use crate::domain::{Message, MessageRole, RetrievalHit};

/// One entry of the chat-completion message list sent to the LLM Service.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    fn system(content: String) -> Self {
        PromptMessage { role: "system", content }
    }

    fn user(content: String) -> Self {
        PromptMessage { role: "user", content }
    }

    fn assistant(content: String) -> Self {
        PromptMessage { role: "assistant", content }
    }
}

const DEFAULT_HISTORY_MESSAGES: usize = 10;

fn fallback_phrase(locale: &str) -> &'static str {
    match locale {
        "zh" => "根據您提供的文檔，我無法找到相關信息。",
        _ => "Based on the provided documents, I cannot find that information.",
    }
}

fn system_prompt(locale: &str) -> String {
    let fallback = fallback_phrase(locale);
    match locale {
        "zh" => format!(
            "你是一個嚴格基於所提供文檔內容回答問題的助手。\n\
             規則：\n\
             1. 只能使用下方「文檔內容」中提供的信息作答，禁止使用任何先前知識或推測。\n\
             2. 若文檔內容不足以回答問題，必須明確說明：「{fallback}」\n\
             3. 禁止使用模糊詞語，例如「通常」、「一般來說」、「眾所周知」等。\n\
             4. 回答前請自我檢查：每一個陳述是否能在下方文檔內容中找到依據？\n\
             5. 引用來源時使用 [file_id#chunk_index] 格式。"
        ),
        _ => format!(
            "You are an assistant that answers strictly from the supplied document context.\n\
             Rules:\n\
             1. Use only the information in the \"Document context\" section below. Do not use prior knowledge or speculate.\n\
             2. If the context is insufficient to answer, say exactly: \"{fallback}\"\n\
             3. Do not use hedging phrases such as \"generally\", \"commonly\", \"as is known\".\n\
             4. Before answering, verify each claim is traceable to the context below.\n\
             5. Cite sources inline using the [file_id#chunk_index] format already attached to each passage."
        ),
    }
}

/// Builds the message list passed to the LLM Service.
///
/// `hits` must already be sorted by descending score — the assembler does
/// not re-rank, only truncates to fit `context_budget_chars`.
pub struct PromptAssembler {
    context_budget_chars: usize,
    history_window: usize,
}

impl PromptAssembler {
    pub fn new(context_budget_chars: usize) -> Self {
        PromptAssembler {
            context_budget_chars,
            history_window: DEFAULT_HISTORY_MESSAGES,
        }
    }

    pub fn build(
        &self,
        user_query: &str,
        hits: &[RetrievalHit],
        history: &[Message],
        locale: &str,
    ) -> Vec<PromptMessage> {
        let mut out = Vec::with_capacity(history.len().min(self.history_window) + 2);
        out.push(PromptMessage::system(self.build_system_with_context(hits, locale)));

        let tail_start = history.len().saturating_sub(self.history_window);
        for message in &history[tail_start..] {
            let prompt_msg = match message.role {
                MessageRole::User => PromptMessage::user(message.content.clone()),
                MessageRole::Assistant => PromptMessage::assistant(message.content.clone()),
                MessageRole::System => continue,
            };
            out.push(prompt_msg);
        }

        out.push(PromptMessage::user(user_query.to_string()));
        out
    }

    fn build_system_with_context(&self, hits: &[RetrievalHit], locale: &str) -> String {
        let mut context = String::new();
        for hit in hits {
            let marker = format!("[{}#{}]", hit.file_id, hit.chunk_index);
            let piece = format!("{marker} {}\n\n", hit.content);
            if context.len() + piece.len() > self.context_budget_chars {
                break;
            }
            context.push_str(&piece);
        }

        format!(
            "{}\n\nDocument context:\n{}",
            system_prompt(locale),
            if context.is_empty() { "(no context retrieved)" } else { context.trim_end() }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn hit(file_id: &str, idx: usize, content: &str) -> RetrievalHit {
        RetrievalHit {
            file_id: file_id.to_string(),
            chunk_index: idx,
            content: content.to_string(),
            score: 1.0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn truncates_context_to_budget() {
        let assembler = PromptAssembler::new(20);
        let hits = vec![hit("f1", 0, "a".repeat(30).as_str()), hit("f1", 1, "second")];
        let messages = assembler.build("question?", &hits, &[], "en");
        let system = &messages[0].content;
        assert!(!system.contains("second"));
    }

    #[test]
    fn appends_history_then_final_query_verbatim() {
        let assembler = PromptAssembler::new(6000);
        let history = vec![Message {
            role: MessageRole::User,
            content: "earlier question".to_string(),
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }];
        let messages = assembler.build("final question", &[], &history, "en");
        assert_eq!(messages.last().unwrap().content, "final question");
        assert!(messages.iter().any(|m| m.content == "earlier question"));
    }

    #[test]
    fn empty_context_still_produces_system_message() {
        let assembler = PromptAssembler::new(6000);
        let messages = assembler.build("q", &[], &[], "zh");
        assert!(messages[0].content.contains("無法找到相關信息"));
    }
}
