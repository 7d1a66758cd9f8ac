use rmcp::schemars;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Browser tab as reported by the extension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub id: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub index: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub favicon: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub same_site: String,
    /// Seconds since the epoch; 0 means a session cookie
    #[serde(default, skip_serializing_if = "is_zero")]
    pub expiration_date: f64,
}

impl Cookie {
    /// URL the extension needs to scope the cookie: scheme from `secure`,
    /// host from `domain` without its leading dot.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self.domain.strip_prefix('.').unwrap_or(&self.domain);
        let host = if host.is_empty() { "localhost" } else { host };
        format!("{}://{}", scheme, host)
    }
}

/// Interactive element found on the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Actionable {
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub selector: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Modifier keys held while sending a key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct KeyModifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cookie_url_from_domain() {
        let mut cookie = Cookie {
            name: "sid".into(),
            value: "1".into(),
            domain: ".example.com".into(),
            ..Default::default()
        };
        assert_eq!(cookie.url(), "http://example.com");

        cookie.secure = true;
        assert_eq!(cookie.url(), "https://example.com");

        cookie.domain.clear();
        assert_eq!(cookie.url(), "https://localhost");
    }

    #[test]
    fn cookie_strips_single_dot_only() {
        let cookie = Cookie {
            domain: "..odd.test".into(),
            ..Default::default()
        };
        assert_eq!(cookie.url(), "http://.odd.test");
    }

    #[test]
    fn tab_without_favicon() {
        let tab: Tab = serde_json::from_value(json!({"id": 4, "url": "u", "title": "t"})).unwrap();
        assert_eq!(tab.id, 4);
        assert!(!tab.active);
        let back = serde_json::to_value(&tab).unwrap();
        assert!(back.get("favicon").is_none());
    }

    #[test]
    fn actionable_keeps_extra_fields() {
        let a: Actionable = serde_json::from_value(json!({
            "description": "Submit", "type": "button", "selector": "#go", "visible": true
        }))
        .unwrap();
        assert_eq!(a.kind, "button");
        assert_eq!(a.extra.get("visible"), Some(&json!(true)));
    }
}
