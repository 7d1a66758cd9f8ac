//! MCP tool surface of the bridge.
//!
//! Every tool is a thin wrapper over one [`BrowserClient`] operation. Domain
//! failures (missing argument, extension error, timeout) come back as tool
//! error results; the MCP transport only sees protocol-level problems.

pub mod params;

use crate::browser::client::BrowserClient;
use crate::browser::types::Cookie;
use crate::config::ServerConfig;
use params::*;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler,
};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

type ToolResult = Result<CallToolResult, McpError>;

#[derive(Clone)]
pub struct BrowserMcpServer {
    client: Arc<BrowserClient>,
    name: String,
    version: String,
    tool_router: ToolRouter<Self>,
}

impl BrowserMcpServer {
    pub fn new(client: Arc<BrowserClient>, config: &ServerConfig) -> Self {
        Self {
            client,
            name: config.name.clone(),
            version: config.version.clone(),
            tool_router: Self::tool_router(),
        }
    }

    fn text_result(text: impl Into<String>) -> ToolResult {
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    fn json_result<T: Serialize>(value: &T, verb: &str) -> ToolResult {
        match serde_json::to_string(value) {
            Ok(json) => Self::text_result(json),
            Err(e) => Self::error_result(format!("Failed to serialize {} result: {}", verb, e)),
        }
    }

    fn error_result(text: impl Into<String>) -> ToolResult {
        Ok(CallToolResult::error(vec![Content::text(text)]))
    }

    fn missing(name: &str) -> ToolResult {
        Self::error_result(format!("required argument \"{}\" not found", name))
    }

    fn failed(verb: &str, err: impl Display) -> ToolResult {
        Self::error_result(format!("Failed to {}: {}", verb, err))
    }
}

/// Split `data:<mime>;base64,<payload>` into mime type and payload
pub fn split_data_url(data_url: &str) -> (&str, &str) {
    let mime = data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(';'))
        .map(|(mime, _)| mime)
        .filter(|mime| !mime.is_empty())
        .unwrap_or("image/png");
    let data = match data_url.split_once(',') {
        Some((head, data)) if !head.is_empty() => data,
        _ => data_url,
    };
    (mime, data)
}

fn non_negative(v: Option<f64>) -> Option<f64> {
    v.filter(|v| *v >= 0.0)
}

#[tool_router]
impl BrowserMcpServer {
    // ── Connection ─────────────────────────────────────────────────────────

    #[tool(description = "Wait for the browser extension to connect. Call this first if other tools report no connection.")]
    async fn browser_wait_for_connection(
        &self,
        Parameters(p): Parameters<WaitForConnectionParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let timeout = Duration::try_from_secs_f64(p.timeout.max(0.0)).unwrap_or(Duration::MAX);
        match self.client.wait_for_connection(&context.ct, timeout).await {
            Ok(()) => Self::text_result("Successfully connected to browser extension"),
            Err(e) => Self::failed("connect to browser", e),
        }
    }

    // ── Tabs ───────────────────────────────────────────────────────────────

    #[tool(description = "List all open browser tabs with their id, title, URL and index. The active tab is marked [ACTIVE].")]
    async fn browser_list_tabs(&self, context: RequestContext<RoleServer>) -> ToolResult {
        let tabs = match self.client.list_tabs(&context.ct).await {
            Ok(tabs) => tabs,
            Err(e) => return Self::failed("list tabs", e),
        };

        let mut out = format!("Found {} open tabs:\n\n", tabs.len());
        for tab in &tabs {
            let status = if tab.active { " [ACTIVE]" } else { "" };
            out.push_str(&format!("Tab {}{}: {}\n", tab.id, status, tab.title));
            out.push_str(&format!("  URL: {}\n", tab.url));
            out.push_str(&format!("  Index: {}\n\n", tab.index));
        }
        Self::text_result(out)
    }

    #[tool(description = "Open a new tab. Returns the tab as JSON. An active tab becomes the default target for tools called without tabId.")]
    async fn browser_create_tab(
        &self,
        Parameters(p): Parameters<CreateTabParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self.client.create_tab(&context.ct, &p.url, p.active).await {
            Ok(tab) => Self::json_result(&tab, "create tab"),
            Err(e) => Self::failed("create tab", e),
        }
    }

    #[tool(description = "Close a tab by id.")]
    async fn browser_close_tab(
        &self,
        Parameters(p): Parameters<RequiredTabParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(tab_id) = p.tab_id else { return Self::missing("tabId") };
        match self.client.close_tab(&context.ct, tab_id).await {
            Ok(()) => Self::text_result(format!("Closed tab {}", tab_id)),
            Err(e) => Self::failed("close tab", e),
        }
    }

    #[tool(description = "Switch to a tab by id. It becomes the default target for tools called without tabId.")]
    async fn browser_activate_tab(
        &self,
        Parameters(p): Parameters<RequiredTabParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(tab_id) = p.tab_id else { return Self::missing("tabId") };
        match self.client.activate_tab(&context.ct, tab_id).await {
            Ok(()) => Self::text_result(format!("Activated tab {}", tab_id)),
            Err(e) => Self::failed("activate tab", e),
        }
    }

    #[tool(description = "Send a keyboard key to the page, optionally with ctrl/alt/shift/meta held.")]
    async fn browser_send_key(
        &self,
        Parameters(p): Parameters<SendKeyParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(key) = p.key else { return Self::missing("key") };
        match self.client.send_key(&context.ct, p.tab_id, &key, p.modifiers).await {
            Ok(()) => Self::text_result(format!("Sent key: {}", key)),
            Err(e) => Self::failed("send key", e),
        }
    }

    // ── Navigation ─────────────────────────────────────────────────────────

    #[tool(description = "Navigate a tab to a URL, waiting for the load event by default.")]
    async fn browser_navigate(
        &self,
        Parameters(p): Parameters<NavigateParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(url) = p.url else { return Self::missing("url") };
        match self
            .client
            .navigate(&context.ct, p.tab_id, &url, p.wait_until_load)
            .await
        {
            Ok(_) => Self::text_result(format!("Navigated to {}", url)),
            Err(e) => Self::failed("navigate", e),
        }
    }

    #[tool(description = "Reload the page. hardReload=true bypasses the cache.")]
    async fn browser_reload(
        &self,
        Parameters(p): Parameters<ReloadParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self.client.reload(&context.ct, p.tab_id, p.hard_reload).await {
            Ok(()) if p.hard_reload => Self::text_result("Hard reloaded page"),
            Ok(()) => Self::text_result("Reloaded page"),
            Err(e) => Self::failed("reload", e),
        }
    }

    // ── Interaction ────────────────────────────────────────────────────────

    #[tool(description = "Click the element matching a CSS selector, waiting up to timeout ms for it to appear.")]
    async fn browser_click(
        &self,
        Parameters(p): Parameters<ClickParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(selector) = p.selector else { return Self::missing("selector") };
        match self.client.click(&context.ct, p.tab_id, &selector, p.timeout).await {
            Ok(()) => Self::text_result(format!("Clicked on element: {}", selector)),
            Err(e) => Self::failed("click", e),
        }
    }

    #[tool(description = "Type text into an input or textarea. clearFirst=true empties the field first; delay sets ms between keystrokes.")]
    async fn browser_type(
        &self,
        Parameters(p): Parameters<TypeParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(selector) = p.selector else { return Self::missing("selector") };
        let Some(text) = p.text else { return Self::missing("text") };
        match self
            .client
            .type_text(&context.ct, p.tab_id, &selector, &text, p.clear_first, p.delay)
            .await
        {
            Ok(()) => {
                let action = if p.clear_first { "Cleared and typed" } else { "Typed" };
                Self::text_result(format!("{} '{}' into {}", action, text, selector))
            }
            Err(e) => Self::failed("type", e),
        }
    }

    #[tool(description = "Scroll to an x/y position or bring the element matching selector into view.")]
    async fn browser_scroll(
        &self,
        Parameters(p): Parameters<ScrollParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let x = non_negative(p.x);
        let y = non_negative(p.y);
        let selector = p.selector.filter(|s| !s.is_empty());
        if let Err(e) = self
            .client
            .scroll(&context.ct, p.tab_id, x, y, selector.as_deref(), &p.behavior)
            .await
        {
            return Self::failed("scroll", e);
        }

        let desc = match (selector, x, y) {
            (Some(selector), _, _) => format!("to element {}", selector),
            (None, Some(x), Some(y)) => format!("to position ({}, {})", x, y),
            (None, Some(x), None) => format!("horizontally to {}", x),
            (None, None, Some(y)) => format!("vertically to {}", y),
            (None, None, None) => String::new(),
        };
        Self::text_result(format!("Scrolled {}", desc))
    }

    #[tool(description = "Wait until the element matching selector reaches a state: attached, detached, visible or hidden.")]
    async fn browser_wait_for_element(
        &self,
        Parameters(p): Parameters<WaitForElementParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(selector) = p.selector else { return Self::missing("selector") };
        match self
            .client
            .wait_for_element(&context.ct, p.tab_id, &selector, p.timeout, &p.state)
            .await
        {
            Ok(_) => Self::text_result(format!("Element {} is now {}", selector, p.state)),
            Err(e) => Self::failed("wait for element", e),
        }
    }

    // ── Content ────────────────────────────────────────────────────────────

    #[tool(description = "Run JavaScript in the page and return its result.")]
    async fn browser_execute_script(
        &self,
        Parameters(p): Parameters<ExecuteScriptParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(script) = p.script else { return Self::missing("script") };
        match self
            .client
            .execute_script(&context.ct, p.tab_id, &script, p.args)
            .await
        {
            Ok(serde_json::Value::String(s)) => Self::text_result(format!("Script result: {}", s)),
            Ok(other) => Self::text_result(format!("Script result: {}", other)),
            Err(e) => Self::failed("execute script", e),
        }
    }

    #[tool(description = "Extract text, HTML or an attribute from every element matching selector.")]
    async fn browser_extract_content(
        &self,
        Parameters(p): Parameters<ExtractContentParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let results = match self
            .client
            .extract_content(
                &context.ct,
                p.tab_id,
                &p.selector,
                &p.content_type,
                p.attribute.as_deref(),
            )
            .await
        {
            Ok(results) => results,
            Err(e) => return Self::failed("extract content", e),
        };

        if results.is_empty() {
            return Self::text_result("No matching elements found");
        }

        let mut out = format!("Found {} matching element(s):\n\n", results.len());
        let last = results.len() - 1;
        for (i, content) in results.iter().enumerate() {
            if results.len() > 1 {
                out.push_str(&format!("[{}] ", i + 1));
            }
            out.push_str(content);
            out.push('\n');
            if i < last {
                out.push('\n');
            }
        }
        Self::text_result(out)
    }

    #[tool(description = "Extract the elements matching selector as readable plain text (scripts, styles and tags removed).")]
    async fn browser_extract_text(
        &self,
        Parameters(p): Parameters<ExtractTextParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self.client.extract_text(&context.ct, p.tab_id, &p.selector).await {
            Ok(text) => Self::text_result(text),
            Err(e) => Self::failed("extract text", e),
        }
    }

    #[tool(description = "Capture a screenshot of the visible page, the full page, or a single element. Returned as an image.")]
    async fn browser_screenshot(
        &self,
        Parameters(p): Parameters<ScreenshotParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let data_url = match self
            .client
            .screenshot(
                &context.ct,
                p.tab_id,
                p.full_page,
                p.selector.as_deref(),
                &p.format,
                p.quality,
            )
            .await
        {
            Ok(data_url) => data_url,
            Err(e) => return Self::failed("take screenshot", e),
        };

        let (mime, data) = split_data_url(&data_url);
        Ok(CallToolResult::success(vec![
            Content::text("Screenshot captured"),
            Content::image(data.to_string(), mime.to_string()),
        ]))
    }

    // ── Cookies ────────────────────────────────────────────────────────────

    #[tool(description = "List cookies, optionally filtered by URL and name.")]
    async fn browser_get_cookies(
        &self,
        Parameters(p): Parameters<CookieFilterParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let cookies = match self
            .client
            .get_cookies(&context.ct, p.url.as_deref(), p.name.as_deref())
            .await
        {
            Ok(cookies) => cookies,
            Err(e) => return Self::failed("get cookies", e),
        };

        if cookies.is_empty() {
            return Self::text_result("No cookies found");
        }

        let mut out = format!("Found {} cookie(s):\n\n", cookies.len());
        for cookie in &cookies {
            out.push_str(&format!("Name: {}\n", cookie.name));
            out.push_str(&format!("Value: {}\n", cookie.value));
            out.push_str(&format!("Domain: {}\n", cookie.domain));
            out.push_str(&format!("Path: {}\n", cookie.path));
            if cookie.secure {
                out.push_str("Secure: true\n");
            }
            if cookie.http_only {
                out.push_str("HttpOnly: true\n");
            }
            out.push('\n');
        }
        Self::text_result(out)
    }

    #[tool(description = "Set a cookie. The cookie URL is derived from domain and secure.")]
    async fn browser_set_cookie(
        &self,
        Parameters(p): Parameters<SetCookieParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(name) = p.name else { return Self::missing("name") };
        let Some(value) = p.value else { return Self::missing("value") };
        let cookie = Cookie {
            name,
            value,
            domain: p.domain,
            path: p.path,
            secure: p.secure,
            http_only: p.http_only,
            same_site: p.same_site,
            expiration_date: p.expiration_date,
        };
        match self.client.set_cookie(&context.ct, &cookie).await {
            Ok(_) => Self::text_result(format!("Set cookie '{}' = '{}'", cookie.name, cookie.value)),
            Err(e) => Self::failed("set cookie", e),
        }
    }

    #[tool(description = "Delete cookies by URL and/or name. With neither, deletes all cookies.")]
    async fn browser_delete_cookies(
        &self,
        Parameters(p): Parameters<CookieFilterParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let url = p.url.filter(|u| !u.is_empty());
        let name = p.name.filter(|n| !n.is_empty());
        if let Err(e) = self
            .client
            .delete_cookies(&context.ct, url.as_deref(), name.as_deref())
            .await
        {
            return Self::failed("delete cookies", e);
        }

        let desc = match (name, url) {
            (Some(name), _) => format!("cookie '{}'", name),
            (None, Some(url)) => format!("cookies for {}", url),
            (None, None) => "all cookies".to_string(),
        };
        Self::text_result(format!("Deleted {}", desc))
    }

    // ── Web storage ────────────────────────────────────────────────────────

    #[tool(description = "Read a localStorage value from the page.")]
    async fn browser_get_local_storage(
        &self,
        Parameters(p): Parameters<StorageKeyParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(key) = p.key else { return Self::missing("key") };
        match self.client.get_local_storage(&context.ct, p.tab_id, &key).await {
            Ok(value) => Self::text_result(format!("localStorage['{}'] = {}", key, value)),
            Err(e) => Self::failed("get localStorage", e),
        }
    }

    #[tool(description = "Write a localStorage value in the page.")]
    async fn browser_set_local_storage(
        &self,
        Parameters(p): Parameters<StorageSetParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(key) = p.key else { return Self::missing("key") };
        let Some(value) = p.value else { return Self::missing("value") };
        match self
            .client
            .set_local_storage(&context.ct, p.tab_id, &key, &value)
            .await
        {
            Ok(()) => Self::text_result(format!("Set localStorage['{}'] = {}", key, value)),
            Err(e) => Self::failed("set localStorage", e),
        }
    }

    #[tool(description = "Remove every localStorage entry of the page.")]
    async fn browser_clear_local_storage(
        &self,
        Parameters(p): Parameters<TabParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self.client.clear_local_storage(&context.ct, p.tab_id).await {
            Ok(()) => Self::text_result("Cleared localStorage"),
            Err(e) => Self::failed("clear localStorage", e),
        }
    }

    #[tool(description = "Read a sessionStorage value from the page.")]
    async fn browser_get_session_storage(
        &self,
        Parameters(p): Parameters<StorageKeyParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(key) = p.key else { return Self::missing("key") };
        match self.client.get_session_storage(&context.ct, p.tab_id, &key).await {
            Ok(value) => Self::text_result(format!("sessionStorage['{}'] = {}", key, value)),
            Err(e) => Self::failed("get sessionStorage", e),
        }
    }

    #[tool(description = "Write a sessionStorage value in the page.")]
    async fn browser_set_session_storage(
        &self,
        Parameters(p): Parameters<StorageSetParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(key) = p.key else { return Self::missing("key") };
        let Some(value) = p.value else { return Self::missing("value") };
        match self
            .client
            .set_session_storage(&context.ct, p.tab_id, &key, &value)
            .await
        {
            Ok(()) => Self::text_result(format!("Set sessionStorage['{}'] = {}", key, value)),
            Err(e) => Self::failed("set sessionStorage", e),
        }
    }

    #[tool(description = "Remove every sessionStorage entry of the page.")]
    async fn browser_clear_session_storage(
        &self,
        Parameters(p): Parameters<TabParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self.client.clear_session_storage(&context.ct, p.tab_id).await {
            Ok(()) => Self::text_result("Cleared sessionStorage"),
            Err(e) => Self::failed("clear sessionStorage", e),
        }
    }

    // ── Page inspection ────────────────────────────────────────────────────

    #[tool(description = "List interactive elements on the page as JSON: description, type and a CSS selector for each.")]
    async fn browser_get_actionables(
        &self,
        Parameters(p): Parameters<TabParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self.client.get_actionables(&context.ct, p.tab_id).await {
            Ok(actionables) => Self::json_result(&actionables, "get actionables"),
            Err(e) => Self::failed("get actionables", e),
        }
    }

    #[tool(description = "Get the page's accessibility tree as JSON, optionally rooted at a CSS selector.")]
    async fn browser_get_accessibility_snapshot(
        &self,
        Parameters(p): Parameters<AccessibilitySnapshotParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self
            .client
            .get_accessibility_snapshot(&context.ct, p.tab_id, p.interesting_only, p.root.as_deref())
            .await
        {
            Ok(serde_json::Value::Null) => Self::text_result("{}"),
            Ok(snapshot) => Self::json_result(&snapshot, "get accessibility snapshot"),
            Err(e) => Self::failed("get accessibility snapshot", e),
        }
    }

    #[tool(description = "Get the title of the page.")]
    async fn browser_get_page_title(
        &self,
        Parameters(p): Parameters<TabParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self.client.get_page_title(&context.ct, p.tab_id).await {
            Ok(title) => Self::text_result(title),
            Err(e) => Self::failed("get page title", e),
        }
    }

    // ── Keyboard navigation ────────────────────────────────────────────────

    #[tool(description = "Show interactive element hints on the page.")]
    async fn browser_hints_show(
        &self,
        Parameters(p): Parameters<ShowHintsParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self
            .client
            .show_hints(&context.ct, p.tab_id, p.selector.as_deref(), &p.action)
            .await
        {
            Ok(result) => Self::json_result(&result, "show hints"),
            Err(e) => Self::failed("show hints", e),
        }
    }

    #[tool(description = "Click a hint element by selector, index or text.")]
    async fn browser_hints_click(
        &self,
        Parameters(p): Parameters<ClickHintParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self
            .client
            .click_hint(&context.ct, p.tab_id, p.selector.as_deref(), p.index, p.text.as_deref())
            .await
        {
            Ok(result) => Self::json_result(&result, "click hint"),
            Err(e) => Self::failed("click hint", e),
        }
    }

    #[tool(description = "Run a web search with the given engine.")]
    async fn browser_search(
        &self,
        Parameters(p): Parameters<SearchParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(query) = p.query else { return Self::missing("query") };
        match self.client.search(&context.ct, &query, &p.engine, p.new_tab).await {
            Ok(result) => Self::json_result(&result, "search"),
            Err(e) => Self::failed("search", e),
        }
    }

    #[tool(description = "Find text on the current page.")]
    async fn browser_find(
        &self,
        Parameters(p): Parameters<FindParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(text) = p.text else { return Self::missing("text") };
        match self
            .client
            .find(&context.ct, p.tab_id, &text, p.case_sensitive, p.whole_word)
            .await
        {
            Ok(result) => Self::json_result(&result, "find"),
            Err(e) => Self::failed("find", e),
        }
    }

    #[tool(description = "Read text from the system clipboard.")]
    async fn browser_clipboard_read(&self, context: RequestContext<RoleServer>) -> ToolResult {
        match self.client.read_clipboard(&context.ct).await {
            Ok(text) => Self::text_result(text),
            Err(e) => Self::failed("read clipboard", e),
        }
    }

    #[tool(description = "Write text to the system clipboard.")]
    async fn browser_clipboard_write(
        &self,
        Parameters(p): Parameters<ClipboardWriteParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(text) = p.text else { return Self::missing("text") };
        match self.client.write_clipboard(&context.ct, &text, &p.format).await {
            Ok(()) => Self::text_result(format!("Wrote {} characters to clipboard", text.chars().count())),
            Err(e) => Self::failed("write clipboard", e),
        }
    }

    #[tool(description = "Open the omnibar for bookmarks, history, tabs or commands.")]
    async fn browser_omnibar(
        &self,
        Parameters(p): Parameters<OmnibarParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        let Some(bar_type) = p.bar_type else { return Self::missing("type") };
        match self
            .client
            .show_omnibar(&context.ct, p.tab_id, bar_type.as_str(), p.query.as_deref())
            .await
        {
            Ok(result) => Self::json_result(&result, "show omnibar"),
            Err(e) => Self::failed("show omnibar", e),
        }
    }

    #[tool(description = "Start visual selection mode.")]
    async fn browser_visual_mode(
        &self,
        Parameters(p): Parameters<VisualModeParams>,
        context: RequestContext<RoleServer>,
    ) -> ToolResult {
        match self
            .client
            .start_visual_mode(&context.ct, p.tab_id, p.select_element)
            .await
        {
            Ok(result) => Self::json_result(&result, "start visual mode"),
            Err(e) => Self::failed("start visual mode", e),
        }
    }
}

#[tool_handler]
impl ServerHandler for BrowserMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                title: Some("Browser Automation".into()),
                description: Some(
                    "Drive a running browser through its automation extension".into(),
                ),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "# Browser automation via extension\n\
                 \n\
                 The bridge relays every tool call to one connected browser extension.\n\
                 \n\
                 ## Workflow\n\
                 ```\n\
                 1. browser_wait_for_connection  → make sure the extension is attached\n\
                 2. browser_list_tabs / browser_create_tab\n\
                 3. browser_navigate             → load a page\n\
                 4. browser_get_actionables      → discover selectors\n\
                 5. browser_click / browser_type → interact\n\
                 6. browser_extract_text / browser_screenshot → observe\n\
                 ```\n\
                 \n\
                 ## Tips\n\
                 - Omit `tabId` (or pass 0) to target the active tab. The active tab is the last one\n\
                   created with active=true or switched to with browser_activate_tab.\n\
                 - When the active tab is closed, tools without an explicit `tabId` fail until another\n\
                   tab is activated.\n\
                 - Every call is bounded by the bridge's request timeout."
                    .into(),
            ),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_split() {
        assert_eq!(
            split_data_url("data:image/jpeg;base64,AAAA"),
            ("image/jpeg", "AAAA")
        );
        assert_eq!(split_data_url("data:image/webp;base64,"), ("image/webp", ""));
    }

    #[test]
    fn data_url_without_prefix_defaults_png() {
        assert_eq!(split_data_url("iVBORw0"), ("image/png", "iVBORw0"));
    }

    #[test]
    fn negative_scroll_positions_dropped() {
        assert_eq!(non_negative(Some(-1.0)), None);
        assert_eq!(non_negative(Some(0.0)), Some(0.0));
        assert_eq!(non_negative(None), None);
    }

    #[test]
    fn failed_wraps_error_text() {
        let result = BrowserMcpServer::failed("click", "chrome extension error: nope").unwrap();
        assert_eq!(result.is_error, Some(true));
        let text = result.content[0].as_text().map(|t| t.text.clone()).unwrap();
        assert_eq!(text, "Failed to click: chrome extension error: nope");
    }

    #[test]
    fn missing_argument_message() {
        let result = BrowserMcpServer::missing("selector").unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
