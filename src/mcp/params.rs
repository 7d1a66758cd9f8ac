//! Tool argument types. Required arguments are `Option` so a missing or
//! mistyped one becomes a tool error rather than a protocol error.

use crate::browser::types::KeyModifiers;
use rmcp::schemars;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

// ── Lenient field decoding ──────────────────────────────────────────────────
//
// An argument of the wrong type falls back to the field default (or `None`
// for required ones), so a malformed call still reaches the tool handler.

trait Coerce: Sized {
    fn coerce(value: Value) -> Option<Self>;
}

impl Coerce for i64 {
    fn coerce(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl Coerce for f64 {
    fn coerce(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }
}

impl Coerce for bool {
    fn coerce(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => match s.as_str() {
                "1" | "t" | "T" | "true" | "True" | "TRUE" => Some(true),
                "0" | "f" | "F" | "false" | "False" | "FALSE" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Coerce for String {
    fn coerce(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Coerce for Vec<Value> {
    fn coerce(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl Coerce for KeyModifiers {
    fn coerce(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else { return None };
        let mut flag = |key: &str| map.remove(key).and_then(bool::coerce).unwrap_or(false);
        Some(KeyModifiers {
            ctrl: flag("ctrl"),
            alt: flag("alt"),
            shift: flag("shift"),
            meta: flag("meta"),
        })
    }
}

impl Coerce for OmnibarType {
    fn coerce(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Coerce + Default,
{
    Ok(T::coerce(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Coerce,
{
    Ok(T::coerce(Value::deserialize(deserializer)?))
}

/// Declares a default together with a reader that falls back to it.
macro_rules! field_default {
    ($default:ident, $reader:ident, $ty:ty, $value:expr) => {
        fn $default() -> $ty { $value }
        fn $reader<'de, D: Deserializer<'de>>(deserializer: D) -> Result<$ty, D::Error> {
            Ok(<$ty as Coerce>::coerce(Value::deserialize(deserializer)?).unwrap_or_else($default))
        }
    };
}

field_default!(default_true, true_or_default, bool, true);
field_default!(default_connect_timeout, connect_timeout_or_default, f64, 30.0);
field_default!(default_blank_url, blank_url_or_default, String, "about:blank".to_string());
field_default!(default_element_timeout, element_timeout_or_default, i64, 30000);
field_default!(default_element_state, element_state_or_default, String, "visible".to_string());
field_default!(default_scroll_behavior, scroll_behavior_or_default, String, "auto".to_string());
field_default!(default_body_selector, body_selector_or_default, String, "body".to_string());
field_default!(default_content_type, content_type_or_default, String, "text".to_string());
field_default!(default_image_format, image_format_or_default, String, "png".to_string());
field_default!(default_image_quality, image_quality_or_default, i64, 90);
field_default!(default_cookie_path, cookie_path_or_default, String, "/".to_string());
field_default!(default_hint_action, hint_action_or_default, String, "click".to_string());
field_default!(default_hint_index, hint_index_or_default, i64, -1);
field_default!(default_search_engine, search_engine_or_default, String, "google".to_string());
field_default!(default_clipboard_format, clipboard_format_or_default, String, "text".to_string());

// ── Connection ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WaitForConnectionParams {
    /// Timeout in seconds (default: 30)
    #[serde(default = "default_connect_timeout", deserialize_with = "connect_timeout_or_default")]
    pub timeout: f64,
}

// ── Tabs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateTabParams {
    /// URL to open (default: "about:blank")
    #[serde(default = "default_blank_url", deserialize_with = "blank_url_or_default")]
    pub url: String,
    /// Make the new tab the active tab (default: true)
    #[serde(default = "default_true", deserialize_with = "true_or_default")]
    pub active: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequiredTabParams {
    /// Tab ID (from browser_list_tabs)
    #[serde(default, deserialize_with = "optional")]
    pub tab_id: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TabParams {
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendKeyParams {
    /// Key to send, e.g. "Enter", "Tab", "Escape", "ArrowDown", "a"
    #[serde(default, deserialize_with = "optional")]
    pub key: Option<String>,
    /// Modifier keys held while the key is pressed (all default to false)
    #[serde(default, deserialize_with = "lenient")]
    pub modifiers: KeyModifiers,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

// ── Navigation ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    /// Fully-qualified URL to navigate to
    #[serde(default, deserialize_with = "optional")]
    pub url: Option<String>,
    /// Wait for the page load event before returning (default: true)
    #[serde(default = "default_true", deserialize_with = "true_or_default")]
    pub wait_until_load: bool,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReloadParams {
    /// Bypass the cache (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub hard_reload: bool,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

// ── Interaction ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickParams {
    /// CSS selector of the element to click
    #[serde(default, deserialize_with = "optional")]
    pub selector: Option<String>,
    /// How long to wait for the element, in milliseconds (default: 30000)
    #[serde(default = "default_element_timeout", deserialize_with = "element_timeout_or_default")]
    pub timeout: i64,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypeParams {
    /// CSS selector of the input or textarea
    #[serde(default, deserialize_with = "optional")]
    pub selector: Option<String>,
    /// Text to type
    #[serde(default, deserialize_with = "optional")]
    pub text: Option<String>,
    /// Clear the field before typing (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub clear_first: bool,
    /// Delay between keystrokes in milliseconds (default: 0)
    #[serde(default, deserialize_with = "lenient")]
    pub delay: i64,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrollParams {
    /// Horizontal scroll position in pixels (negative = not set)
    #[serde(default, deserialize_with = "optional")]
    pub x: Option<f64>,
    /// Vertical scroll position in pixels (negative = not set)
    #[serde(default, deserialize_with = "optional")]
    pub y: Option<f64>,
    /// CSS selector of an element to scroll into view
    #[serde(default, deserialize_with = "optional")]
    pub selector: Option<String>,
    /// "auto" or "smooth" (default: "auto")
    #[serde(default = "default_scroll_behavior", deserialize_with = "scroll_behavior_or_default")]
    pub behavior: String,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitForElementParams {
    /// CSS selector to wait for
    #[serde(default, deserialize_with = "optional")]
    pub selector: Option<String>,
    /// Maximum wait in milliseconds (default: 30000)
    #[serde(default = "default_element_timeout", deserialize_with = "element_timeout_or_default")]
    pub timeout: i64,
    /// "attached", "detached", "visible" or "hidden" (default: "visible")
    #[serde(default = "default_element_state", deserialize_with = "element_state_or_default")]
    pub state: String,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

// ── Content ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteScriptParams {
    /// JavaScript source to run in the page
    #[serde(default, deserialize_with = "optional")]
    pub script: Option<String>,
    /// Arguments passed to the script (default: [])
    #[serde(default, deserialize_with = "lenient")]
    pub args: Vec<Value>,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractContentParams {
    /// CSS selector (default: "body")
    #[serde(default = "default_body_selector", deserialize_with = "body_selector_or_default")]
    pub selector: String,
    /// "text", "html" or "attribute" (default: "text")
    #[serde(rename = "type", default = "default_content_type", deserialize_with = "content_type_or_default")]
    pub content_type: String,
    /// Attribute name when type is "attribute"
    #[serde(default, deserialize_with = "optional")]
    pub attribute: Option<String>,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractTextParams {
    /// CSS selector (default: "body")
    #[serde(default = "default_body_selector", deserialize_with = "body_selector_or_default")]
    pub selector: String,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotParams {
    /// Capture the whole scrollable page (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub full_page: bool,
    /// CSS selector of a single element to capture
    #[serde(default, deserialize_with = "optional")]
    pub selector: Option<String>,
    /// "png" or "jpeg" (default: "png")
    #[serde(default = "default_image_format", deserialize_with = "image_format_or_default")]
    pub format: String,
    /// JPEG quality 0-100 (default: 90)
    #[serde(default = "default_image_quality", deserialize_with = "image_quality_or_default")]
    pub quality: i64,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

// ── Cookies and storage ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CookieFilterParams {
    /// Only cookies that would be sent to this URL
    #[serde(default, deserialize_with = "optional")]
    pub url: Option<String>,
    /// Only cookies with this name
    #[serde(default, deserialize_with = "optional")]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetCookieParams {
    /// Cookie name
    #[serde(default, deserialize_with = "optional")]
    pub name: Option<String>,
    /// Cookie value
    #[serde(default, deserialize_with = "optional")]
    pub value: Option<String>,
    /// Cookie domain, e.g. ".example.com"
    #[serde(default, deserialize_with = "lenient")]
    pub domain: String,
    /// Cookie path (default: "/")
    #[serde(default = "default_cookie_path", deserialize_with = "cookie_path_or_default")]
    pub path: String,
    /// HTTPS only (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub secure: bool,
    /// Hidden from page scripts (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub http_only: bool,
    /// "strict", "lax" or "no_restriction"
    #[serde(default, deserialize_with = "lenient")]
    pub same_site: String,
    /// Expiry in seconds since the epoch (omit for a session cookie)
    #[serde(default, deserialize_with = "lenient")]
    pub expiration_date: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageKeyParams {
    /// Storage key
    #[serde(default, deserialize_with = "optional")]
    pub key: Option<String>,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSetParams {
    /// Storage key
    #[serde(default, deserialize_with = "optional")]
    pub key: Option<String>,
    /// Value to store
    #[serde(default, deserialize_with = "optional")]
    pub value: Option<String>,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

// ── Page inspection ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilitySnapshotParams {
    /// Only include nodes that are interesting for accessibility (default: true)
    #[serde(default = "default_true", deserialize_with = "true_or_default")]
    pub interesting_only: bool,
    /// CSS selector of the subtree root
    #[serde(default, deserialize_with = "optional")]
    pub root: Option<String>,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

// ── Keyboard navigation ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShowHintsParams {
    /// CSS selector to filter hints
    #[serde(default, deserialize_with = "optional")]
    pub selector: Option<String>,
    /// Action performed when a hint is chosen, e.g. "click", "hover" (default: "click")
    #[serde(default = "default_hint_action", deserialize_with = "hint_action_or_default")]
    pub action: String,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickHintParams {
    /// CSS selector of the hint to click
    #[serde(default, deserialize_with = "optional")]
    pub selector: Option<String>,
    /// 0-based hint index (default: -1, not used)
    #[serde(default = "default_hint_index", deserialize_with = "hint_index_or_default")]
    pub index: i64,
    /// Text content of the hint to click
    #[serde(default, deserialize_with = "optional")]
    pub text: Option<String>,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query
    #[serde(default, deserialize_with = "optional")]
    pub query: Option<String>,
    /// Search engine, e.g. "google", "bing", "duckduckgo" (default: "google")
    #[serde(default = "default_search_engine", deserialize_with = "search_engine_or_default")]
    pub engine: String,
    /// Open results in a new tab (default: true)
    #[serde(default = "default_true", deserialize_with = "true_or_default")]
    pub new_tab: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindParams {
    /// Text to find on the page
    #[serde(default, deserialize_with = "optional")]
    pub text: Option<String>,
    /// Case sensitive search (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub case_sensitive: bool,
    /// Match whole words only (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub whole_word: bool,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ClipboardWriteParams {
    /// Text to write to the clipboard
    #[serde(default, deserialize_with = "optional")]
    pub text: Option<String>,
    /// Clipboard content format (default: "text")
    #[serde(default = "default_clipboard_format", deserialize_with = "clipboard_format_or_default")]
    pub format: String,
}

#[derive(Debug, Clone, Copy, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OmnibarType {
    Bookmarks,
    History,
    Tabs,
    Commands,
}

impl OmnibarType {
    pub fn as_str(self) -> &'static str {
        match self {
            OmnibarType::Bookmarks => "bookmarks",
            OmnibarType::History => "history",
            OmnibarType::Tabs => "tabs",
            OmnibarType::Commands => "commands",
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OmnibarParams {
    /// Which omnibar to open
    #[serde(rename = "type", default, deserialize_with = "optional")]
    pub bar_type: Option<OmnibarType>,
    /// Initial query
    #[serde(default, deserialize_with = "optional")]
    pub query: Option<String>,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisualModeParams {
    /// Select the whole element instead of text (default: false)
    #[serde(default, deserialize_with = "lenient")]
    pub select_element: bool,
    /// Tab ID (0 or omitted = active tab)
    #[serde(default, deserialize_with = "lenient")]
    pub tab_id: i64,
}
