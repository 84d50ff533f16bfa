//! W3C WebDriver wire shapes.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key under which WebDriver returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Every WebDriver response wraps its payload in `value`.
#[derive(Deserialize, Debug)]
pub struct WireResponse {
    #[serde(default)]
    pub value: Value,
}

#[derive(Deserialize, Debug)]
pub struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct NewSessionValue {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Serialize, Debug)]
pub struct FindElements<'a> {
    pub using: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }
}

/// Pull element ids out of a `find elements` payload.
pub fn element_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn element_arg(id: &str) -> Value {
    json!({ ELEMENT_KEY: id })
}
