//! Markdown verbose report builder (§4.5 "Verbose mode").

use crate::assistant::{Assistant, ToolConfig};
use crate::message::Message;
use crate::tool::ToolResult;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}

/// Builds the markdown verbose report: orchestrator/assistant header, a user-message
/// excerpt, per-tool summaries, a sources summary, and final message previews.
pub fn build_report(
    orchestrator_name: &str,
    assistant: &Assistant,
    user_message_excerpt: &str,
    tool_configs: &[ToolConfig],
    results: &[ToolResult],
    final_messages: &[Message],
) -> String {
    let mut report = String::new();
    report.push_str(&format!(
        "# Orchestration Report\n\n- Orchestrator: {orchestrator_name}\n- Assistant: {}\n\n",
        assistant.name
    ));
    report.push_str(&format!("## User Message\n\n{}\n\n", truncate(user_message_excerpt, 200)));

    report.push_str("## Tools\n\n");
    for cfg in tool_configs {
        let result = results.iter().find(|r| r.placeholder == cfg.placeholder);
        let content_len = result.map(|r| r.content.len()).unwrap_or(0);
        let preview = result.map(|r| truncate(&r.content, 500)).unwrap_or_default();
        report.push_str(&format!(
            "### {} (`{{{}}}`)\n\n- enabled: {}\n- config: `{}`\n- content length: {}\n- preview: {}\n\n",
            cfg.tool_name, cfg.placeholder, cfg.enabled, cfg.config, content_len, preview
        ));
    }

    report.push_str("## Sources\n\n");
    let all_sources: Vec<_> = results.iter().flat_map(|r| r.sources.iter()).take(10).collect();
    if all_sources.is_empty() {
        report.push_str("(none)\n\n");
    } else {
        for source in all_sources {
            report.push_str(&format!("- {}\n", source.url.as_deref().unwrap_or("(no url)")));
        }
        report.push('\n');
    }

    report.push_str("## Final Messages\n\n");
    for msg in final_messages {
        report.push_str(&format!("- **{}**: {}\n", msg.role, truncate(&msg.content.as_text(), 300)));
    }

    report
}
