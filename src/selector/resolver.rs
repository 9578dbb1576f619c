use std::fmt;

use serde::{Deserialize, Serialize};

/// How a [`Selector`] value should be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SelectorType {
    Id,
    Name,
    Css,
    Xpath,
    ClassName,
    TagName,
    LinkText,
    /// Any other (or missing) type; resolves to the raw value
    #[default]
    Unknown,
}

impl From<String> for SelectorType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "id" => SelectorType::Id,
            "name" => SelectorType::Name,
            "css" => SelectorType::Css,
            "xpath" => SelectorType::Xpath,
            "className" => SelectorType::ClassName,
            "tagName" => SelectorType::TagName,
            "linkText" => SelectorType::LinkText,
            _ => SelectorType::Unknown,
        }
    }
}

impl From<SelectorType> for String {
    fn from(t: SelectorType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for SelectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectorType::Id => "id",
            SelectorType::Name => "name",
            SelectorType::Css => "css",
            SelectorType::Xpath => "xpath",
            SelectorType::ClassName => "className",
            SelectorType::TagName => "tagName",
            SelectorType::LinkText => "linkText",
            SelectorType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Abstract element locator as written in a test suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    #[serde(rename = "type", default)]
    pub kind: SelectorType,
    pub value: String,
}

impl Selector {
    pub fn new(kind: SelectorType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(SelectorType::Css, value)
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(SelectorType::Id, value)
    }

    /// Driver-native query string for this selector.
    pub fn to_query(&self) -> String {
        let v = &self.value;
        match self.kind {
            SelectorType::Id => format!("#{}", v),
            SelectorType::Name => format!("[name=\"{}\"]", v),
            SelectorType::Css => v.clone(),
            SelectorType::Xpath => format!("xpath={}", v),
            SelectorType::LinkText => format!("text={}", v),
            SelectorType::ClassName => format!(".{}", v),
            SelectorType::TagName => v.clone(),
            SelectorType::Unknown => v.clone(),
        }
    }
}

/// Resolve an optional selector; absence yields an empty query.
pub fn resolve_selector(selector: Option<&Selector>) -> String {
    selector.map(Selector::to_query).unwrap_or_default()
}
