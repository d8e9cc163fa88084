//! Page scripts used to observe and act on a surface.
//!
//! Every script is a function body (WebDriver `execute` semantics) that
//! returns JSON. The first line is a `// glow:<kind>` marker so hosts and
//! test doubles can tell the scripts apart.

use serde::Deserialize;
use serde_json::Value;

use crate::error::SurfaceError;
use crate::surface::{InteractiveElement, Surface};

const MAX_ELEMENT_TEXT: usize = 80;

const ELEMENTS_JS: &str = r#"
const limit = __LIMIT__;
const textLimit = __TEXT_LIMIT__;
const nodes = document.querySelectorAll('a[href], button, input, textarea, select, [role="button"], [onclick]');
const out = [];
const cssPath = (el) => {
  if (el.id) return '#' + CSS.escape(el.id);
  const parts = [];
  while (el && el.nodeType === 1 && parts.length < 5) {
    let part = el.tagName.toLowerCase();
    const parent = el.parentElement;
    if (parent) {
      const same = Array.from(parent.children).filter((c) => c.tagName === el.tagName);
      if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(el) + 1) + ')';
    }
    parts.unshift(part);
    if (el.id) break;
    el = parent;
  }
  return parts.join(' > ');
};
for (const el of nodes) {
  if (out.length >= limit) break;
  const rect = el.getBoundingClientRect();
  if (rect.width === 0 || rect.height === 0) continue;
  const style = window.getComputedStyle(el);
  if (style.visibility === 'hidden' || style.display === 'none') continue;
  const text = (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('placeholder') || '').trim().replace(/\s+/g, ' ');
  out.push({
    index: out.length,
    tag: el.tagName.toLowerCase(),
    text: text.slice(0, textLimit),
    selector: cssPath(el),
    href: el.href || undefined,
  });
}
return out;
"#;

const VISIBLE_TEXT_JS: &str = r#"
const limit = __LIMIT__;
const candidates = ['main', '[role="main"]', '#search', '#results', '.results', '[data-testid*="result"]', 'article'];
let root = null;
for (const selector of candidates) {
  const el = document.querySelector(selector);
  if (el && el.innerText && el.innerText.trim().length > 0) { root = el; break; }
}
const text = ((root || document.body) ? (root || document.body).innerText : '').replace(/\n{3,}/g, '\n\n').trim();
return text.slice(0, limit);
"#;

const CLICK_SELECTOR_JS: &str = r#"
const el = document.querySelector(__SELECTOR__);
if (!el) return { ok: false, message: 'No element matches selector ' + __SELECTOR__ };
el.scrollIntoView({ block: 'center' });
el.click();
return { ok: true, message: 'Clicked ' + __SELECTOR__ };
"#;

const CLICK_TEXT_JS: &str = r#"
const wanted = __TEXT__.toLowerCase();
const nodes = document.querySelectorAll('a, button, input[type="submit"], input[type="button"], [role="button"], [onclick]');
let partial = null;
for (const el of nodes) {
  const text = (el.innerText || el.value || el.getAttribute('aria-label') || '').trim().toLowerCase();
  if (!text) continue;
  if (text === wanted) { el.scrollIntoView({ block: 'center' }); el.click(); return { ok: true, message: 'Clicked "' + text + '"' }; }
  if (!partial && text.includes(wanted)) partial = el;
}
if (partial) {
  partial.scrollIntoView({ block: 'center' });
  partial.click();
  return { ok: true, message: 'Clicked element containing "' + __TEXT__ + '"' };
}
return { ok: false, message: 'No clickable element with text "' + __TEXT__ + '"' };
"#;

const TYPE_TEXT_JS: &str = r#"
const selector = __SELECTOR__;
let el = selector ? document.querySelector(selector) : document.activeElement;
if (!el || !('value' in el)) {
  el = document.querySelector('input[type="search"], input[type="text"], input:not([type]), textarea');
}
if (!el) return { ok: false, message: 'No input to type into' };
el.focus();
const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
if (setter && setter.set) { setter.set.call(el, __TEXT__); } else { el.value = __TEXT__; }
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
if (__SUBMIT__) {
  el.dispatchEvent(new KeyboardEvent('keydown', { key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true }));
  if (el.form) {
    if (typeof el.form.requestSubmit === 'function') { el.form.requestSubmit(); } else { el.form.submit(); }
  }
  return { ok: true, message: 'Typed and submitted "' + __TEXT__ + '"' };
}
return { ok: true, message: 'Typed "' + __TEXT__ + '"' };
"#;

const SCROLL_JS: &str = r#"
window.scrollBy(0, __OFFSET__);
return { ok: true, message: 'Scrolled to y=' + Math.round(window.scrollY) };
"#;

const EXTRACT_JS: &str = r#"
const limit = __LIMIT__;
const containers = ['[data-testid*="result"]', '.g', '.result', '.search-result', '[role="article"]', 'article', 'li[class*="result"]', '[class*="card"]', '[class*="place"]', '[class*="item"]'];
const clean = (s) => (s || '').trim().replace(/\s+/g, ' ');
for (const selector of containers) {
  const nodes = Array.from(document.querySelectorAll(selector));
  const records = [];
  for (const node of nodes) {
    if (records.length >= limit) break;
    const heading = node.querySelector('h1, h2, h3, h4, [role="heading"]');
    const link = node.querySelector('a[href]');
    const title = clean(heading ? heading.innerText : (link ? link.innerText : ''));
    const snippet = clean(node.innerText).slice(0, 300);
    if (!title && !snippet) continue;
    records.push({ title: title || snippet.slice(0, 80), url: link ? link.href : null, snippet: snippet });
  }
  if (records.length > 0) return records;
}
return [];
"#;

fn js_string(value: &str) -> String {
    // A JSON string literal is a valid JS string literal.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Substitute `__NAME__` placeholders in one pass, so a value is never
/// rescanned for placeholders.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find("__") {
        out.push_str(&rest[..pos]);
        let at = &rest[pos..];
        match values.iter().find(|(key, _)| at.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &at[key.len()..];
            }
            None => {
                out.push('_');
                rest = &at[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn marked(kind: &str, body: String) -> String {
    format!("// glow:{}\n{}", kind, body)
}

/// `elements`, `text`, `click`, `click_text`, `type`, `scroll` or `extract`.
pub fn script_kind(script: &str) -> Option<&str> {
    script
        .lines()
        .next()?
        .strip_prefix("// glow:")
        .map(str::trim)
}

pub fn elements_script(max_elements: usize) -> String {
    marked(
        "elements",
        fill(
            ELEMENTS_JS,
            &[
                ("__LIMIT__", max_elements.to_string().as_str()),
                ("__TEXT_LIMIT__", MAX_ELEMENT_TEXT.to_string().as_str()),
            ],
        ),
    )
}

pub fn visible_text_script(max_chars: usize) -> String {
    marked(
        "text",
        fill(VISIBLE_TEXT_JS, &[("__LIMIT__", max_chars.to_string().as_str())]),
    )
}

pub fn click_selector_script(selector: &str) -> String {
    marked(
        "click",
        fill(CLICK_SELECTOR_JS, &[("__SELECTOR__", js_string(selector).as_str())]),
    )
}

pub fn click_text_script(text: &str) -> String {
    marked("click_text", fill(CLICK_TEXT_JS, &[("__TEXT__", js_string(text).as_str())]))
}

pub fn type_script(selector: Option<&str>, text: &str, submit: bool) -> String {
    let selector = selector.map(js_string).unwrap_or_else(|| "null".to_string());
    marked(
        "type",
        fill(
            TYPE_TEXT_JS,
            &[
                ("__SELECTOR__", selector.as_str()),
                ("__TEXT__", js_string(text).as_str()),
                ("__SUBMIT__", if submit { "true" } else { "false" }),
            ],
        ),
    )
}

pub fn scroll_script(offset: i64) -> String {
    marked("scroll", fill(SCROLL_JS, &[("__OFFSET__", offset.to_string().as_str())]))
}

pub fn extract_script(max_records: usize) -> String {
    marked(
        "extract",
        fill(EXTRACT_JS, &[("__LIMIT__", max_records.to_string().as_str())]),
    )
}

/// `{ok, message}` returned by the action scripts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptOutcome {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

pub async fn run_action(surface: &dyn Surface, script: &str) -> Result<ScriptOutcome, SurfaceError> {
    let value = surface.execute_script(script).await?;
    serde_json::from_value(value).map_err(|e| SurfaceError::Script(e.to_string()))
}

pub async fn interactive_elements(
    surface: &dyn Surface,
    max_elements: usize,
) -> Result<Vec<InteractiveElement>, SurfaceError> {
    let value = surface.execute_script(&elements_script(max_elements)).await?;
    let mut elements: Vec<InteractiveElement> =
        serde_json::from_value(value).map_err(|e| SurfaceError::Script(e.to_string()))?;
    elements.truncate(max_elements);
    for element in &mut elements {
        if element.text.chars().count() > MAX_ELEMENT_TEXT {
            element.text = element.text.chars().take(MAX_ELEMENT_TEXT).collect();
        }
    }
    Ok(elements)
}

pub async fn visible_text(surface: &dyn Surface, max_chars: usize) -> Result<String, SurfaceError> {
    match surface.execute_script(&visible_text_script(max_chars)).await? {
        Value::String(text) => Ok(text.chars().take(max_chars).collect()),
        Value::Null => Ok(String::new()),
        other => Err(SurfaceError::Script(format!(
            "expected page text, got {}",
            other
        ))),
    }
}

/// Scraped result-like records; an empty list when nothing matched.
pub async fn extract_records(
    surface: &dyn Surface,
    max_records: usize,
) -> Result<Vec<Value>, SurfaceError> {
    match surface.execute_script(&extract_script(max_records)).await? {
        Value::Array(mut records) => {
            records.truncate(max_records);
            Ok(records)
        }
        Value::Null => Ok(Vec::new()),
        other => Err(SurfaceError::Script(format!(
            "expected a list of records, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_carry_their_kind() {
        assert_eq!(script_kind(&elements_script(5)), Some("elements"));
        assert_eq!(script_kind(&visible_text_script(100)), Some("text"));
        assert_eq!(script_kind(&click_selector_script("#go")), Some("click"));
        assert_eq!(script_kind(&click_text_script("Go")), Some("click_text"));
        assert_eq!(script_kind(&type_script(None, "x", false)), Some("type"));
        assert_eq!(script_kind(&scroll_script(600)), Some("scroll"));
        assert_eq!(script_kind(&extract_script(10)), Some("extract"));
        assert_eq!(script_kind("return 1;"), None);
    }

    #[test]
    fn test_arguments_are_escaped() {
        let script = click_text_script("it's \"quoted\"\n");
        assert!(script.contains(r#""it's \"quoted\"\n""#));
        assert!(!script.contains("__TEXT__"));

        let script = type_script(Some("input[name='q']"), "lunch", true);
        assert!(script.contains(r#""input[name='q']""#));
        assert!(script.contains("if (true)"));
        assert!(!script.contains("__"));
    }

    #[test]
    fn test_placeholder_tokens_in_values_are_literal() {
        let script = type_script(Some("__TEXT__"), "+alert(1)+", false);
        assert!(script.contains(r#"const selector = "__TEXT__";"#));
        assert!(!script.contains(r#"const selector = "+alert(1)+";"#));
        assert!(script.contains(r#"setter.set.call(el, "+alert(1)+")"#));

        let script = type_script(None, "__SUBMIT__", false);
        assert!(script.contains(r#"setter.set.call(el, "__SUBMIT__")"#));
        assert!(script.contains("if (false)"));

        let script = click_text_script("__TEXT__ and __SELECTOR__");
        assert!(script.contains(r#"const wanted = "__TEXT__ and __SELECTOR__".toLowerCase();"#));
    }

    #[test]
    fn test_fill_leaves_unknown_underscores() {
        assert_eq!(fill("a__B__c___d", &[("__B__", "x")]), "axc___d");
        assert_eq!(
            fill("__TEXT_LIMIT__ __TEXT__", &[("__TEXT__", "t"), ("__TEXT_LIMIT__", "9")]),
            "9 t"
        );
    }

    #[test]
    fn test_scroll_offset_sign() {
        assert!(scroll_script(-600).contains("window.scrollBy(0, -600)"));
    }
}
