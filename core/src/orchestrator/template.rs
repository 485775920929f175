//! Template placeholder splicing and message-list assembly shared by both
//! orchestrators (§4.5).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::assistant::Assistant;
use crate::message::{ContentPart, Message, MessageContent};
use crate::tool::ToolResult;

static LEFTOVER_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[a-z0-9_]+\}").unwrap());

/// Replaces every tool's `{placeholder}` in `template` with its content (or empties
/// it when the content is empty), leaving `{user_input}` untouched for the caller to
/// fill last.
pub fn splice_placeholders(template: &str, results: &[ToolResult]) -> String {
    let mut out = template.to_string();
    for result in results {
        let token = format!("{{{}}}", result.placeholder);
        let replacement = if result.content.is_empty() {
            String::new()
        } else {
            format!("\n\n{}\n\n", result.content)
        };
        out = out.replace(&token, &replacement);
    }
    out
}

/// Replaces `{user_input}` and erases any placeholder token left unfilled (no tool
/// registered for it, or the tool did not run) (§4.5 step 3).
pub fn finalize_template(template: &str, user_input: &str) -> String {
    let filled = if user_input.is_empty() {
        template.replace("{user_input}", "")
    } else {
        template.replace("{user_input}", &format!("\n\n{}\n\n", user_input))
    };
    LEFTOVER_PLACEHOLDER.replace_all(&filled, "").to_string()
}

/// Builds the final message list (§4.5 steps 1, 2, 4): system prompt, prior history,
/// then the processed last message with the original role and, for multimodal
/// content, the vision-aware content rebuild (§4.5 "tie-break and edge policies").
pub fn build_message_list(assistant: &Assistant, history: &[Message], last_message: &Message, processed_text: String) -> Vec<Message> {
    let mut out = Vec::with_capacity(history.len() + 2);
    if !assistant.system_prompt.is_empty() {
        out.push(Message::system(assistant.system_prompt.clone()));
    }
    out.extend(history.iter().cloned());

    let content = if last_message.content.has_non_text_parts() {
        if assistant.metadata.capabilities.vision {
            let mut parts = vec![ContentPart::Text { text: processed_text }];
            parts.extend(last_message.content.non_text_parts());
            MessageContent::Parts(parts)
        } else {
            MessageContent::Text(processed_text)
        }
    } else {
        MessageContent::Text(processed_text)
    };

    out.push(Message {
        role: last_message.role.clone(),
        content,
        tool_calls: last_message.tool_calls.clone(),
        tool_call_id: last_message.tool_call_id.clone(),
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb_client::Source;

    #[test]
    fn splice_placeholders_replaces_each_tool_token() {
        let results = vec![
            ToolResult::ok("ctx1", "first"),
            ToolResult::ok("ctx2", "second"),
        ];
        let out = splice_placeholders("A:{ctx1} B:{ctx2}", &results);
        assert_eq!(out, "A:\n\nfirst\n\n B:\n\nsecond\n\n");
    }

    #[test]
    fn splice_placeholders_empties_token_for_empty_content() {
        let results = vec![ToolResult::ok("ctx1", "")];
        let out = splice_placeholders("A:{ctx1}", &results);
        assert_eq!(out, "A:");
    }

    #[test]
    fn finalize_template_erases_unfilled_placeholders() {
        let out = finalize_template("Background:{ctx1}\nQ: {user_input}", "What is mitosis?");
        assert!(!out.contains("{ctx1}"));
        assert!(out.contains("What is mitosis?"));
    }

    #[test]
    fn finalize_template_handles_empty_user_input() {
        let out = finalize_template("Q: {user_input}", "");
        assert!(!out.contains("{user_input}"));
    }

    #[test]
    fn s4_vision_passthrough_preserves_image_parts_after_augmented_text() {
        let mut metadata = crate::assistant::AssistantMetadata::default();
        metadata.capabilities.vision = true;
        let assistant = Assistant {
            id: 1,
            name: "Vision Tutor".into(),
            owner_user_id: 1,
            organization_id: 1,
            description: String::new(),
            system_prompt: String::new(),
            prompt_template: "{user_input}".into(),
            shared_with_organization: false,
            metadata,
            rag_collections: Vec::new(),
            rag_top_k: None,
            published: true,
        };
        let last_message = Message {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "What's this?".into() },
                ContentPart::ImageUrl { image_url: crate::message::ImageUrl { url: "data:image/png;base64,abc".into() } },
            ]),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        let messages = build_message_list(&assistant, &[], &last_message, "\n\nWhat's this?\n\n".to_string());
        let last = messages.last().unwrap();
        match &last.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(&parts[0], ContentPart::Text { text } if text.contains("What's this?")));
                assert!(matches!(&parts[1], ContentPart::ImageUrl { .. }));
            }
            _ => panic!("expected parts content for vision-capable assistant"),
        }
    }

    #[test]
    fn vision_disabled_strips_non_text_parts() {
        let assistant = Assistant {
            id: 1,
            name: "Plain Tutor".into(),
            owner_user_id: 1,
            organization_id: 1,
            description: String::new(),
            system_prompt: String::new(),
            prompt_template: "{user_input}".into(),
            shared_with_organization: false,
            metadata: crate::assistant::AssistantMetadata::default(),
            rag_collections: Vec::new(),
            rag_top_k: None,
            published: true,
        };
        let last_message = Message {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "What's this?".into() },
                ContentPart::ImageUrl { image_url: crate::message::ImageUrl { url: "data:image/png;base64,abc".into() } },
            ]),
            tool_calls: Vec::new(),
            tool_call_id: None,
        };
        let messages = build_message_list(&assistant, &[], &last_message, "processed".to_string());
        let last = messages.last().unwrap();
        assert!(matches!(&last.content, MessageContent::Text(t) if t == "processed"));
    }

    #[test]
    fn source_struct_is_usable_from_template_tests() {
        let source = Source {
            url: Some("https://x".into()),
            filename: None,
            chunk_index: None,
            page: None,
        };
        assert_eq!(source.url.as_deref(), Some("https://x"));
    }
}
