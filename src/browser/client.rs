//! Command correlation with the browser extension and the typed operations
//! built on top of it.
//!
//! Every command gets a fresh id and a one-shot waiter registered before the
//! frame leaves. The waiter resolves on the first of: the matching reply, an
//! error frame for the id, the request timeout, caller cancellation, or the
//! loss of the link the command went out on.

use crate::browser::html::strip_html_tags;
use crate::browser::types::{Actionable, Cookie, KeyModifiers, Tab};
use crate::config::WebSocketConfig;
use crate::error::{BridgeError, Result};
use crate::websocket::message::Message;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Active tab value before any tab is known, and after it is closed
pub const NO_ACTIVE_TAB: i64 = -1;

const CONNECTION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outbound half of a live extension connection
pub trait PeerLink: Send + Sync {
    fn id(&self) -> &str;

    /// Queue a frame without blocking
    fn send(&self, message: &Message) -> Result<()>;
}

#[derive(Debug)]
enum Outcome {
    Reply(Value),
    PeerError(String),
    LinkLost,
}

struct Waiter {
    link_id: String,
    tx: oneshot::Sender<Outcome>,
}

/// Removes the waiter however the request ends
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<String, Waiter>>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

pub struct BrowserClient {
    link: RwLock<Option<Arc<dyn PeerLink>>>,
    pending: Mutex<HashMap<String, Waiter>>,
    active_tab: AtomicI64,
    request_timeout: Duration,
}

impl BrowserClient {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            link: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            active_tab: AtomicI64::new(NO_ACTIVE_TAB),
            request_timeout,
        }
    }

    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self::new(Duration::from_millis(config.reconnect_ms))
    }

    // ── Link ownership ──────────────────────────────────────────────────

    /// Make `link` the current peer, replacing any previous one
    pub fn set_link(&self, link: Arc<dyn PeerLink>) {
        let mut slot = self.link.write();
        if let Some(old) = slot.as_ref() {
            tracing::info!("Replacing extension connection {} with {}", old.id(), link.id());
        }
        *slot = Some(link);
    }

    /// Forget `link_id` if it is still current and fail every waiter whose
    /// command went out through it.
    pub fn remove_link(&self, link_id: &str) {
        {
            let mut slot = self.link.write();
            if slot.as_ref().is_some_and(|l| l.id() == link_id) {
                *slot = None;
            }
        }

        let lost: Vec<Waiter> = {
            let mut pending = self.pending.lock();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, w)| w.link_id == link_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        if !lost.is_empty() {
            tracing::warn!(
                "Extension connection {} lost with {} request(s) in flight",
                link_id,
                lost.len()
            );
        }
        for waiter in lost {
            let _ = waiter.tx.send(Outcome::LinkLost);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.read().is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn active_tab_id(&self) -> i64 {
        self.active_tab.load(Ordering::SeqCst)
    }

    fn set_active_tab(&self, tab_id: i64) {
        self.active_tab.store(tab_id, Ordering::SeqCst);
    }

    /// `0` selects the remembered active tab, which may be the `-1` sentinel
    fn resolve_tab(&self, tab_id: i64) -> i64 {
        if tab_id == 0 {
            self.active_tab_id()
        } else {
            tab_id
        }
    }

    /// Poll until an extension is connected
    pub async fn wait_for_connection(&self, ct: &CancellationToken, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        let mut ticker = tokio::time::interval(CONNECTION_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = ct.cancelled() => return Err(BridgeError::Cancelled),
                _ = ticker.tick() => {
                    if self.is_connected() {
                        return Ok(());
                    }
                    if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                        return Err(BridgeError::Timeout(
                            "timeout waiting for Chrome extension connection".to_string(),
                        ));
                    }
                }
            }
        }
    }

    // ── Inbound routing ─────────────────────────────────────────────────

    /// Deliver a reply to its waiter. Replies for unknown or abandoned ids
    /// are dropped.
    pub fn handle_response(&self, id: &str, payload: Option<Value>, error: &str) {
        let Some(waiter) = self.pending.lock().remove(id) else {
            tracing::debug!("Dropping reply for unknown request {}", id);
            return;
        };

        let outcome = if error.is_empty() {
            Outcome::Reply(payload.unwrap_or(Value::Null))
        } else {
            Outcome::PeerError(error.to_string())
        };
        let _ = waiter.tx.send(outcome);
    }

    pub fn handle_event(&self, action: &str, data: Option<&Value>) {
        match action {
            "tabClosed" => {
                let Some(tab_id) = data.and_then(|d| d.get("tabId")).and_then(Value::as_i64) else {
                    tracing::debug!("tabClosed event without tabId");
                    return;
                };
                let _ = self.active_tab.compare_exchange(
                    tab_id,
                    NO_ACTIVE_TAB,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                tracing::debug!("Tab {} closed", tab_id);
            }
            other => tracing::trace!("Ignoring extension event {}", other),
        }
    }

    // ── Send and await ──────────────────────────────────────────────────

    pub async fn send_command(
        &self,
        ct: &CancellationToken,
        action: &str,
        params: Value,
    ) -> Result<Value> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        // The link is read under the pending lock so a concurrent
        // `remove_link` either runs first or sees this waiter.
        let link = {
            let mut pending = self.pending.lock();
            let link = self.link.read().clone().ok_or(BridgeError::NoConnection)?;
            pending.insert(
                id.clone(),
                Waiter {
                    link_id: link.id().to_string(),
                    tx,
                },
            );
            link
        };
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        link.send(&Message::command(id.as_str(), action, params))?;
        tracing::trace!("Sent {} as {} on {}", action, id, link.id());

        tokio::select! {
            outcome = rx => match outcome {
                Ok(Outcome::Reply(value)) => Ok(value),
                Ok(Outcome::PeerError(e)) => Err(BridgeError::Extension(e)),
                Ok(Outcome::LinkLost) | Err(_) => Err(BridgeError::LinkLost),
            },
            _ = ct.cancelled() => Err(BridgeError::Cancelled),
            _ = tokio::time::sleep(self.request_timeout) => Err(BridgeError::Timeout(
                "timeout waiting for Chrome extension response".to_string(),
            )),
        }
    }

    async fn send_and_decode<T: DeserializeOwned>(
        &self,
        ct: &CancellationToken,
        action: &str,
        params: Value,
    ) -> Result<T> {
        let value = self.send_command(ct, action, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    // ── Tabs ────────────────────────────────────────────────────────────

    pub async fn list_tabs(&self, ct: &CancellationToken) -> Result<Vec<Tab>> {
        self.send_and_decode(ct, "listTabs", json!({})).await
    }

    pub async fn create_tab(&self, ct: &CancellationToken, url: &str, active: bool) -> Result<Tab> {
        let value = self
            .send_command(ct, "createTab", json!({ "url": url, "active": active }))
            .await?;
        if value.is_null() {
            return Err(BridgeError::EmptyResponse);
        }

        let tab: Tab = serde_json::from_value(value)?;
        if active {
            self.set_active_tab(tab.id);
        }
        Ok(tab)
    }

    pub async fn close_tab(&self, ct: &CancellationToken, tab_id: i64) -> Result<()> {
        self.send_command(ct, "closeTab", json!({ "tabId": tab_id })).await?;
        Ok(())
    }

    pub async fn activate_tab(&self, ct: &CancellationToken, tab_id: i64) -> Result<()> {
        self.send_command(ct, "activateTab", json!({ "tabId": tab_id })).await?;
        self.set_active_tab(tab_id);
        Ok(())
    }

    pub async fn send_key(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        key: &str,
        modifiers: KeyModifiers,
    ) -> Result<()> {
        let params = json!({
            "tabId": self.resolve_tab(tab_id),
            "key": key,
            "modifiers": modifiers,
        });
        self.send_command(ct, "sendKey", params).await?;
        Ok(())
    }

    // ── Navigation ──────────────────────────────────────────────────────

    pub async fn navigate(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        url: &str,
        wait_until_load: bool,
    ) -> Result<Value> {
        let params = json!({
            "tabId": self.resolve_tab(tab_id),
            "url": url,
            "waitUntilLoad": wait_until_load,
        });
        self.send_command(ct, "navigate", params).await
    }

    pub async fn reload(&self, ct: &CancellationToken, tab_id: i64, hard_reload: bool) -> Result<()> {
        let params = json!({ "tabId": self.resolve_tab(tab_id), "hardReload": hard_reload });
        self.send_command(ct, "reload", params).await?;
        Ok(())
    }

    // ── Interaction ─────────────────────────────────────────────────────

    pub async fn click(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        selector: &str,
        timeout: i64,
    ) -> Result<()> {
        let params = json!({
            "tabId": self.resolve_tab(tab_id),
            "selector": selector,
            "timeout": timeout,
        });
        self.send_command(ct, "click", params).await?;
        Ok(())
    }

    pub async fn type_text(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        selector: &str,
        text: &str,
        clear_first: bool,
        delay: i64,
    ) -> Result<()> {
        let params = json!({
            "tabId": self.resolve_tab(tab_id),
            "selector": selector,
            "text": text,
            "clearFirst": clear_first,
            "delay": delay,
        });
        self.send_command(ct, "type", params).await?;
        Ok(())
    }

    pub async fn scroll(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        x: Option<f64>,
        y: Option<f64>,
        selector: Option<&str>,
        behavior: &str,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("tabId".into(), json!(self.resolve_tab(tab_id)));
        params.insert("behavior".into(), json!(behavior));
        if let Some(x) = x {
            params.insert("x".into(), json!(x));
        }
        if let Some(y) = y {
            params.insert("y".into(), json!(y));
        }
        if let Some(selector) = selector.filter(|s| !s.is_empty()) {
            params.insert("selector".into(), json!(selector));
        }
        self.send_command(ct, "scroll", Value::Object(params)).await
    }

    pub async fn wait_for_element(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        selector: &str,
        timeout: i64,
        state: &str,
    ) -> Result<Value> {
        let params = json!({
            "tabId": self.resolve_tab(tab_id),
            "selector": selector,
            "timeout": timeout,
            "state": state,
        });
        self.send_command(ct, "waitForElement", params).await
    }

    // ── Content ─────────────────────────────────────────────────────────

    pub async fn execute_script(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        let params = json!({
            "tabId": self.resolve_tab(tab_id),
            "script": script,
            "args": args,
        });
        self.send_command(ct, "executeScript", params).await
    }

    /// Matching elements' content; a single-string reply becomes one entry
    pub async fn extract_content(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        selector: &str,
        content_type: &str,
        attribute: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut params = Map::new();
        params.insert("tabId".into(), json!(self.resolve_tab(tab_id)));
        params.insert("selector".into(), json!(selector));
        params.insert("contentType".into(), json!(content_type));
        if let Some(attribute) = attribute.filter(|a| !a.is_empty()) {
            params.insert("attribute".into(), json!(attribute));
        }

        #[derive(Deserialize)]
        struct Reply {
            #[serde(default)]
            text: Value,
        }

        let reply: Reply = self
            .send_and_decode(ct, "extractContent", Value::Object(params))
            .await?;
        match reply.text {
            Value::String(s) => Ok(vec![s]),
            Value::Array(items) => Ok(items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    _ => String::new(),
                })
                .collect()),
            other => Err(BridgeError::Extension(format!(
                "unexpected extractContent reply: {}",
                other
            ))),
        }
    }

    /// Extract `selector` as HTML and reduce each fragment to plain text.
    /// Fragments are separated by a blank line.
    pub async fn extract_text(&self, ct: &CancellationToken, tab_id: i64, selector: &str) -> Result<String> {
        let fragments = self.extract_content(ct, tab_id, selector, "html", None).await?;
        Ok(fragments
            .iter()
            .map(|html| strip_html_tags(html))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Returns the `data:<mime>;base64,...` URL
    pub async fn screenshot(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        full_page: bool,
        selector: Option<&str>,
        format: &str,
        quality: i64,
    ) -> Result<String> {
        let mut params = Map::new();
        params.insert("tabId".into(), json!(self.resolve_tab(tab_id)));
        params.insert("fullPage".into(), json!(full_page));
        params.insert("format".into(), json!(format));
        params.insert("quality".into(), json!(quality));
        if let Some(selector) = selector.filter(|s| !s.is_empty()) {
            params.insert("selector".into(), json!(selector));
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Reply {
            #[serde(default)]
            data_url: String,
        }

        let reply: Reply = self.send_and_decode(ct, "screenshot", Value::Object(params)).await?;
        Ok(reply.data_url)
    }

    // ── Cookies ─────────────────────────────────────────────────────────

    pub async fn get_cookies(
        &self,
        ct: &CancellationToken,
        url: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Cookie>> {
        #[derive(Deserialize)]
        struct Reply {
            #[serde(default)]
            cookies: Vec<Cookie>,
        }

        let reply: Reply = self
            .send_and_decode(ct, "getCookies", cookie_filter(url, name))
            .await?;
        Ok(reply.cookies)
    }

    pub async fn set_cookie(&self, ct: &CancellationToken, cookie: &Cookie) -> Result<Value> {
        let mut params = Map::new();
        params.insert("name".into(), json!(cookie.name));
        params.insert("value".into(), json!(cookie.value));
        params.insert("domain".into(), json!(cookie.domain));
        params.insert("path".into(), json!(cookie.path));
        params.insert("secure".into(), json!(cookie.secure));
        params.insert("httpOnly".into(), json!(cookie.http_only));
        params.insert("url".into(), json!(cookie.url()));
        if !cookie.same_site.is_empty() {
            params.insert("sameSite".into(), json!(cookie.same_site));
        }
        if cookie.expiration_date > 0.0 {
            params.insert("expirationDate".into(), json!(cookie.expiration_date));
        }
        self.send_command(ct, "setCookie", Value::Object(params)).await
    }

    pub async fn delete_cookies(
        &self,
        ct: &CancellationToken,
        url: Option<&str>,
        name: Option<&str>,
    ) -> Result<()> {
        self.send_command(ct, "deleteCookies", cookie_filter(url, name)).await?;
        Ok(())
    }

    // ── Web storage ─────────────────────────────────────────────────────

    pub async fn get_local_storage(&self, ct: &CancellationToken, tab_id: i64, key: &str) -> Result<String> {
        self.get_storage(ct, "getLocalStorage", tab_id, key).await
    }

    pub async fn set_local_storage(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.set_storage(ct, "setLocalStorage", tab_id, key, value).await
    }

    pub async fn clear_local_storage(&self, ct: &CancellationToken, tab_id: i64) -> Result<()> {
        let params = json!({ "tabId": self.resolve_tab(tab_id) });
        self.send_command(ct, "clearLocalStorage", params).await?;
        Ok(())
    }

    pub async fn get_session_storage(&self, ct: &CancellationToken, tab_id: i64, key: &str) -> Result<String> {
        self.get_storage(ct, "getSessionStorage", tab_id, key).await
    }

    pub async fn set_session_storage(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.set_storage(ct, "setSessionStorage", tab_id, key, value).await
    }

    pub async fn clear_session_storage(&self, ct: &CancellationToken, tab_id: i64) -> Result<()> {
        let params = json!({ "tabId": self.resolve_tab(tab_id) });
        self.send_command(ct, "clearSessionStorage", params).await?;
        Ok(())
    }

    /// Reply is `{storage: {key: value}}`; a missing or non-string value reads as ""
    async fn get_storage(&self, ct: &CancellationToken, action: &str, tab_id: i64, key: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Reply {
            #[serde(default)]
            storage: Map<String, Value>,
        }

        let params = json!({ "tabId": self.resolve_tab(tab_id), "key": key });
        let reply: Reply = self.send_and_decode(ct, action, params).await?;
        Ok(reply
            .storage
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn set_storage(
        &self,
        ct: &CancellationToken,
        action: &str,
        tab_id: i64,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let params = json!({ "tabId": self.resolve_tab(tab_id), "key": key, "value": value });
        self.send_command(ct, action, params).await?;
        Ok(())
    }

    // ── Page inspection ─────────────────────────────────────────────────

    pub async fn get_actionables(&self, ct: &CancellationToken, tab_id: i64) -> Result<Vec<Actionable>> {
        #[derive(Deserialize)]
        struct Reply {
            #[serde(default)]
            actionables: Vec<Actionable>,
        }

        let params = json!({ "tabId": self.resolve_tab(tab_id) });
        let reply: Reply = self.send_and_decode(ct, "tabs.getActionables", params).await?;
        Ok(reply.actionables)
    }

    pub async fn get_accessibility_snapshot(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        interesting_only: bool,
        root: Option<&str>,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("tabId".into(), json!(self.resolve_tab(tab_id)));
        params.insert("interestingOnly".into(), json!(interesting_only));
        if let Some(root) = root.filter(|r| !r.is_empty()) {
            params.insert("root".into(), json!(root));
        }
        self.send_command(ct, "tabs.getAccessibilitySnapshot", Value::Object(params))
            .await
    }

    pub async fn get_page_title(&self, ct: &CancellationToken, tab_id: i64) -> Result<String> {
        #[derive(Deserialize)]
        struct Reply {
            #[serde(default)]
            title: String,
        }

        let params = json!({ "tabId": self.resolve_tab(tab_id) });
        let reply: Reply = self.send_and_decode(ct, "getPageTitle", params).await?;
        Ok(reply.title)
    }

    // ── Keyboard-driven navigation (hints, find, omnibar, visual mode) ──

    pub async fn show_hints(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        selector: Option<&str>,
        action: &str,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("tabId".into(), json!(self.resolve_tab(tab_id)));
        params.insert("action".into(), json!(action));
        if let Some(selector) = selector.filter(|s| !s.is_empty()) {
            params.insert("selector".into(), json!(selector));
        }
        self.send_command(ct, "hints.show", Value::Object(params)).await
    }

    /// A negative `index` is left out of the request
    pub async fn click_hint(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        selector: Option<&str>,
        index: i64,
        text: Option<&str>,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("tabId".into(), json!(self.resolve_tab(tab_id)));
        if let Some(selector) = selector.filter(|s| !s.is_empty()) {
            params.insert("selector".into(), json!(selector));
        }
        if index >= 0 {
            params.insert("index".into(), json!(index));
        }
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            params.insert("text".into(), json!(text));
        }
        self.send_command(ct, "hints.click", Value::Object(params)).await
    }

    pub async fn search(&self, ct: &CancellationToken, query: &str, engine: &str, new_tab: bool) -> Result<Value> {
        let params = json!({ "query": query, "engine": engine, "newTab": new_tab });
        self.send_command(ct, "search", params).await
    }

    pub async fn find(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        text: &str,
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Value> {
        let params = json!({
            "tabId": self.resolve_tab(tab_id),
            "text": text,
            "caseSensitive": case_sensitive,
            "wholeWord": whole_word,
        });
        self.send_command(ct, "find", params).await
    }

    pub async fn read_clipboard(&self, ct: &CancellationToken) -> Result<String> {
        #[derive(Deserialize)]
        struct Reply {
            #[serde(default)]
            text: String,
        }

        let reply: Reply = self.send_and_decode(ct, "clipboard.read", json!({})).await?;
        Ok(reply.text)
    }

    pub async fn write_clipboard(&self, ct: &CancellationToken, text: &str, format: &str) -> Result<()> {
        let params = json!({ "text": text, "format": format });
        self.send_command(ct, "clipboard.write", params).await?;
        Ok(())
    }

    pub async fn show_omnibar(
        &self,
        ct: &CancellationToken,
        tab_id: i64,
        bar_type: &str,
        query: Option<&str>,
    ) -> Result<Value> {
        let mut params = Map::new();
        params.insert("tabId".into(), json!(self.resolve_tab(tab_id)));
        params.insert("type".into(), json!(bar_type));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            params.insert("query".into(), json!(query));
        }
        self.send_command(ct, "omnibar.show", Value::Object(params)).await
    }

    pub async fn start_visual_mode(&self, ct: &CancellationToken, tab_id: i64, select_element: bool) -> Result<Value> {
        let params = json!({ "tabId": self.resolve_tab(tab_id), "selectElement": select_element });
        self.send_command(ct, "visual.start", params).await
    }
}

fn cookie_filter(url: Option<&str>, name: Option<&str>) -> Value {
    let mut params = Map::new();
    if let Some(url) = url.filter(|u| !u.is_empty()) {
        params.insert("url".into(), json!(url));
    }
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        params.insert("name".into(), json!(name));
    }
    Value::Object(params)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Link that hands every sent frame to the test
    pub(crate) struct FakeLink {
        id: String,
        tx: mpsc::UnboundedSender<Message>,
    }

    impl FakeLink {
        pub(crate) fn new(id: &str) -> (Arc<Self>, mpsc::UnboundedReceiver<Message>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { id: id.to_string(), tx }), rx)
        }
    }

    impl PeerLink for FakeLink {
        fn id(&self) -> &str {
            &self.id
        }

        fn send(&self, message: &Message) -> Result<()> {
            self.tx.send(message.clone()).map_err(|_| BridgeError::ConnectionClosed)
        }
    }

    fn connected(timeout_ms: u64) -> (Arc<BrowserClient>, mpsc::UnboundedReceiver<Message>) {
        let client = Arc::new(BrowserClient::new(Duration::from_millis(timeout_ms)));
        let (link, rx) = FakeLink::new("conn-1");
        client.set_link(link);
        (client, rx)
    }

    /// Answer the next command with `result`
    fn reply_next(
        client: &Arc<BrowserClient>,
        mut rx: mpsc::UnboundedReceiver<Message>,
        result: Value,
    ) -> tokio::task::JoinHandle<Message> {
        let client = client.clone();
        tokio::spawn(async move {
            let msg = rx.recv().await.unwrap();
            client.handle_response(&msg.id, Some(result), "");
            msg
        })
    }

    #[tokio::test]
    async fn test_list_tabs_correlates_reply() {
        let (client, rx) = connected(1000);
        let responder = reply_next(
            &client,
            rx,
            json!([{"id": 1, "url": "https://a", "title": "A", "active": true, "index": 0}]),
        );

        let tabs = client.list_tabs(&CancellationToken::new()).await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].id, 1);

        let sent = responder.await.unwrap();
        assert_eq!(sent.command, "listTabs");
        assert!(!sent.id.is_empty());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_no_connection() {
        let client = BrowserClient::new(Duration::from_millis(100));
        let err = client.list_tabs(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "no connection to Chrome extension");
    }

    #[tokio::test]
    async fn test_timeout_removes_waiter() {
        let (client, _rx) = connected(50);
        let started = std::time::Instant::now();
        let err = client.list_tabs(&CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_then_late_reply_dropped() {
        let (client, mut rx) = connected(5000);
        let ct = CancellationToken::new();
        let canceller = ct.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = client.list_tabs(&ct).await.unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled));
        assert_eq!(client.pending_count(), 0);

        let sent = rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.handle_response(&sent.id, Some(json!([])), "");
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_error() {
        let (client, mut rx) = connected(1000);
        let c = client.clone();
        tokio::spawn(async move {
            let msg = rx.recv().await.unwrap();
            c.handle_response(&msg.id, None, "element not found");
        });

        let err = client
            .click(&CancellationToken::new(), 5, "#missing", 1000)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "chrome extension error: element not found");
    }

    #[tokio::test]
    async fn test_link_loss_fails_waiters() {
        let (client, mut rx) = connected(5000);
        let c = client.clone();
        tokio::spawn(async move {
            let _ = rx.recv().await;
            c.remove_link("conn-1");
        });

        let err = client.list_tabs(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::LinkLost));
        assert!(!client.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_link_churn_never_strands_a_waiter() {
        let client = Arc::new(BrowserClient::new(Duration::from_secs(30)));
        let stop = CancellationToken::new();

        let churn = {
            let client = client.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                for n in 0.. {
                    if stop.is_cancelled() {
                        break;
                    }
                    let id = format!("churn-{}", n);
                    let (link, _rx) = FakeLink::new(&id);
                    client.set_link(link);
                    tokio::task::yield_now().await;
                    client.remove_link(&id);
                }
            })
        };

        let started = std::time::Instant::now();
        let callers: Vec<_> = (0..200)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    client.send_command(&CancellationToken::new(), "getTitle", json!({})).await
                })
            })
            .collect();
        for caller in callers {
            let err = caller.await.unwrap().unwrap_err();
            assert!(
                matches!(
                    err,
                    BridgeError::NoConnection | BridgeError::LinkLost | BridgeError::ConnectionClosed
                ),
                "unexpected {:?}",
                err
            );
        }
        stop.cancel();
        churn.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_link_removal_keeps_current() {
        let (client, _rx) = connected(1000);
        let (newer, _rx2) = FakeLink::new("conn-2");
        client.set_link(newer);
        client.remove_link("conn-1");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_active_tab_lifecycle() {
        let (client, mut rx) = connected(1000);
        assert_eq!(client.active_tab_id(), NO_ACTIVE_TAB);

        let c = client.clone();
        let responder = tokio::spawn(async move {
            let activate = rx.recv().await.unwrap();
            c.handle_response(&activate.id, Some(json!({"success": true})), "");
            let click = rx.recv().await.unwrap();
            c.handle_response(&click.id, Some(json!({})), "");
            let click_after = rx.recv().await.unwrap();
            c.handle_response(&click_after.id, Some(json!({})), "");
            (click, click_after)
        });

        let ct = CancellationToken::new();
        client.activate_tab(&ct, 123).await.unwrap();
        assert_eq!(client.active_tab_id(), 123);
        client.click(&ct, 0, "#a", 30000).await.unwrap();

        client.handle_event("tabClosed", Some(&json!({"tabId": 999})));
        assert_eq!(client.active_tab_id(), 123);
        client.handle_event("tabClosed", Some(&json!({"tabId": 123})));
        assert_eq!(client.active_tab_id(), NO_ACTIVE_TAB);

        client.click(&ct, 0, "#a", 30000).await.unwrap();

        let (click, click_after) = responder.await.unwrap();
        assert_eq!(click.params.unwrap()["tabId"], 123);
        assert_eq!(click_after.params.unwrap()["tabId"], -1);
    }

    #[tokio::test]
    async fn test_create_tab_sets_active_only_when_active() {
        let (client, mut rx) = connected(1000);
        let c = client.clone();
        tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            c.handle_response(&first.id, Some(json!({"id": 7, "url": "about:blank"})), "");
            let second = rx.recv().await.unwrap();
            c.handle_response(&second.id, Some(json!({"id": 8, "url": "about:blank"})), "");
            let third = rx.recv().await.unwrap();
            c.handle_response(&third.id, None, "");
        });

        let ct = CancellationToken::new();
        let tab = client.create_tab(&ct, "about:blank", true).await.unwrap();
        assert_eq!(tab.id, 7);
        assert_eq!(client.active_tab_id(), 7);

        client.create_tab(&ct, "about:blank", false).await.unwrap();
        assert_eq!(client.active_tab_id(), 7);

        let err = client.create_tab(&ct, "about:blank", true).await.unwrap_err();
        assert!(matches!(err, BridgeError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_extract_content_normalizes_string() {
        let (client, rx) = connected(1000);
        let responder = reply_next(&client, rx, json!({"text": "only"}));
        let out = client
            .extract_content(&CancellationToken::new(), 1, "h1", "text", Some("href"))
            .await
            .unwrap();
        assert_eq!(out, vec!["only".to_string()]);

        let sent = responder.await.unwrap();
        let params = sent.params.unwrap();
        assert_eq!(params["contentType"], "text");
        assert_eq!(params["attribute"], "href");
    }

    #[tokio::test]
    async fn test_extract_text() {
        let (client, rx) = connected(1000);
        reply_next(
            &client,
            rx,
            json!({"text": "<p>Hello<br>World</p><script>x</script>"}),
        );
        let text = client
            .extract_text(&CancellationToken::new(), 0, "body")
            .await
            .unwrap();
        assert_eq!(text, "Hello\nWorld");
    }

    #[tokio::test]
    async fn test_extract_text_joins_fragments() {
        let (client, rx) = connected(1000);
        reply_next(&client, rx, json!({"text": ["<p>a</p>", "<div>b</div>"]}));
        let text = client
            .extract_text(&CancellationToken::new(), 0, "p")
            .await
            .unwrap();
        assert_eq!(text, "a\n\nb");
    }

    #[tokio::test]
    async fn test_set_cookie_synthesizes_url() {
        let (client, rx) = connected(1000);
        let responder = reply_next(&client, rx, json!({"success": true}));
        let cookie = Cookie {
            name: "sid".into(),
            value: "abc".into(),
            domain: ".example.com".into(),
            path: "/".into(),
            secure: true,
            ..Default::default()
        };
        client.set_cookie(&CancellationToken::new(), &cookie).await.unwrap();

        let params = responder.await.unwrap().params.unwrap();
        assert_eq!(params["url"], "https://example.com");
        assert!(params.get("expirationDate").is_none());
    }

    #[tokio::test]
    async fn test_storage_unwraps_key() {
        let (client, rx) = connected(1000);
        reply_next(&client, rx, json!({"storage": {"token": "xyz", "other": 1}}));
        let value = client
            .get_local_storage(&CancellationToken::new(), 2, "token")
            .await
            .unwrap();
        assert_eq!(value, "xyz");
    }

    #[tokio::test]
    async fn test_storage_null_reads_empty() {
        let (client, rx) = connected(1000);
        reply_next(&client, rx, json!({"storage": {"token": null}}));
        let value = client
            .get_session_storage(&CancellationToken::new(), 2, "token")
            .await
            .unwrap();
        assert_eq!(value, "");
    }

    #[tokio::test]
    async fn test_scroll_omits_absent_fields() {
        let (client, rx) = connected(1000);
        let responder = reply_next(&client, rx, json!({}));
        client
            .scroll(&CancellationToken::new(), 3, None, Some(200.0), None, "smooth")
            .await
            .unwrap();
        let params = responder.await.unwrap().params.unwrap();
        assert!(params.get("x").is_none());
        assert!(params.get("selector").is_none());
        assert_eq!(params["y"], 200.0);
    }

    #[tokio::test]
    async fn test_wait_for_connection() {
        let client = Arc::new(BrowserClient::new(Duration::from_millis(100)));
        let ct = CancellationToken::new();

        let err = client
            .wait_for_connection(&ct, Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timeout waiting for Chrome extension connection"));

        let c = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let (link, _rx) = FakeLink::new("late");
            c.set_link(link);
        });
        client
            .wait_for_connection(&ct, Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_out_of_order_replies() {
        let (client, mut rx) = connected(2000);
        let c = client.clone();
        tokio::spawn(async move {
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            for msg in [second, first] {
                let title = msg.params.as_ref().unwrap()["tabId"].clone();
                c.handle_response(&msg.id, Some(json!({ "title": title.to_string() })), "");
            }
        });

        let ct = CancellationToken::new();
        let (a, b) = tokio::join!(client.get_page_title(&ct, 1), client.get_page_title(&ct, 2));
        assert_eq!(a.unwrap(), "1");
        assert_eq!(b.unwrap(), "2");
    }
}
