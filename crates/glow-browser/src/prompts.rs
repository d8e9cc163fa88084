use crate::surface::InteractiveElement;

pub const BROWSER_SYSTEM_PROMPT: &str = r#"You control a web browser to complete the user's task. Each turn you receive a screenshot of the page, its URL, a numbered list of interactive elements, an excerpt of the visible text, and a log of the actions you already took.

Reply with exactly ONE action as a JSON object in a ```json block. Available actions:
- {"action": "navigate", "url": "https://...", "reason": "..."}
- {"action": "click", "selector": "css selector", "reason": "..."} or {"action": "click", "text": "visible text", "reason": "..."}
- {"action": "type", "selector": "css selector (optional)", "text": "...", "submit": true, "reason": "..."}
- {"action": "scroll", "direction": "down" | "up", "reason": "..."}
- {"action": "extract", "reason": "..."}
- {"action": "done", "reason": "the final answer"}

Rules:
1. For information-retrieval tasks, use "extract" to read the results before finishing.
2. The "reason" of "done" IS the answer shown to the user. Put the actual findings there (names, prices, addresses...). Never answer with "search completed" or "task complete".
3. Prefer selectors from the element list. Fall back to visible text when no selector fits.
4. Do not repeat an action that already failed; try something else."#;

/// The per-step user message that accompanies the screenshot.
pub fn observation_prompt(
    task: &str,
    url: &str,
    elements: &[InteractiveElement],
    page_text: &str,
    history: &[String],
) -> String {
    let mut prompt = format!("Task: {}\n\nCurrent URL: {}\n\nInteractive elements:\n", task, url);
    if elements.is_empty() {
        prompt.push_str("(none found)\n");
    }
    for element in elements {
        prompt.push_str(&format!("[{}] <{}> \"{}\"", element.index, element.tag, element.text));
        if let Some(selector) = &element.selector {
            prompt.push_str(&format!(" selector={}", selector));
        }
        if let Some(href) = &element.href {
            prompt.push_str(&format!(" href={}", href));
        }
        prompt.push('\n');
    }

    prompt.push_str("\nVisible text:\n");
    if page_text.trim().is_empty() {
        prompt.push_str("(empty)\n");
    } else {
        prompt.push_str(page_text);
        prompt.push('\n');
    }

    prompt.push_str("\nActions so far:\n");
    if history.is_empty() {
        prompt.push_str("(none yet)\n");
    }
    for (i, entry) in history.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, entry));
    }
    prompt.push_str("\nReply with the next action.");
    prompt
}
