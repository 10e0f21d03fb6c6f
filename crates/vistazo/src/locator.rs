//! Locators: how a page-bound field or a capture target finds its element.
//!
//! The variants mirror the lookup strategies page models declare in
//! `#[find_by(...)]`. `Chain` is the `#[find_bys]` form (each locator searched
//! inside the previous match) and `Any` is the `#[find_all]` form (first
//! locator with a match wins).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element lookup strategy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// `id` attribute
    Id(String),
    /// `name` attribute
    Name(String),
    /// Single CSS class
    ClassName(String),
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath expression
    XPath(String),
    /// Tag name
    TagName(String),
    /// Exact text of a link
    LinkText(String),
    /// Nested lookup, each locator searched inside the previous match
    Chain(Vec<Locator>),
    /// Alternatives, the first locator that matches wins
    Any(Vec<Locator>),
}

impl Default for Locator {
    fn default() -> Self {
        Self::body()
    }
}

impl Locator {
    /// Locator for an element id
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// Locator for a `name` attribute
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Locator for a CSS class
    #[must_use]
    pub fn class_name(class: impl Into<String>) -> Self {
        Self::ClassName(class.into())
    }

    /// Locator for a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Locator for an XPath expression
    #[must_use]
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    /// Locator for a tag name
    #[must_use]
    pub fn tag_name(tag: impl Into<String>) -> Self {
        Self::TagName(tag.into())
    }

    /// Locator for a link by its visible text
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::LinkText(text.into())
    }

    /// The whole page
    #[must_use]
    pub fn body() -> Self {
        Self::TagName("body".to_string())
    }

    /// Whether this locator designates the whole page rather than one element.
    #[must_use]
    pub fn is_whole_page(&self) -> bool {
        match self {
            Self::TagName(t) | Self::Css(t) | Self::Id(t) => t.trim() == "body",
            _ => false,
        }
    }

    /// CSS selector equivalent, when one exists
    #[must_use]
    pub fn to_css(&self) -> Option<String> {
        match self {
            Self::Id(id) => Some(format!("#{}", css_escape(id))),
            Self::Name(name) => Some(format!("[name=\"{name}\"]")),
            Self::ClassName(class) => Some(format!(".{}", css_escape(class))),
            Self::Css(css) => Some(css.clone()),
            Self::TagName(tag) => Some(tag.clone()),
            Self::XPath(_) | Self::LinkText(_) => None,
            Self::Chain(parts) => parts
                .iter()
                .map(Self::to_css)
                .collect::<Option<Vec<_>>>()
                .map(|p| p.join(" ")),
            Self::Any(parts) => parts
                .iter()
                .map(Self::to_css)
                .collect::<Option<Vec<_>>>()
                .map(|p| p.join(", ")),
        }
    }

    /// XPath equivalent for locators CSS cannot express
    #[must_use]
    pub fn to_xpath(&self) -> Option<String> {
        match self {
            Self::XPath(x) => Some(x.clone()),
            Self::LinkText(text) => Some(format!("//a[normalize-space(.)={text:?}]")),
            Self::Id(id) => Some(format!("//*[@id={id:?}]")),
            Self::Name(name) => Some(format!("//*[@name={name:?}]")),
            Self::TagName(tag) => Some(format!("//{tag}")),
            Self::ClassName(class) => Some(format!(
                "//*[contains(concat(' ', normalize-space(@class), ' '), ' {class} ')]"
            )),
            Self::Css(_) => None,
            Self::Chain(parts) => parts
                .iter()
                .map(Self::to_xpath)
                .collect::<Option<Vec<_>>>()
                .map(|p| p.join("")),
            Self::Any(parts) => parts
                .iter()
                .map(Self::to_xpath)
                .collect::<Option<Vec<_>>>()
                .map(|p| p.join(" | ")),
        }
    }

    /// JavaScript expression evaluating to the first matching element
    #[must_use]
    pub fn to_query(&self) -> String {
        if let Some(css) = self.to_css() {
            format!("document.querySelector({css:?})")
        } else {
            let xpath = self.to_xpath().unwrap_or_default();
            format!("document.evaluate({xpath:?}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue")
        }
    }
}

/// Escape characters CSS would read as syntax in an identifier
fn css_escape(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, c) in ident.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            if i == 0 && c.is_ascii_digit() {
                out.push_str(&format!("\\3{c} "));
            } else {
                out.push(c);
            }
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(v) => write!(f, "id={v}"),
            Self::Name(v) => write!(f, "name={v}"),
            Self::ClassName(v) => write!(f, "class={v}"),
            Self::Css(v) => write!(f, "css={v}"),
            Self::XPath(v) => write!(f, "xpath={v}"),
            Self::TagName(v) => write!(f, "tag={v}"),
            Self::LinkText(v) => write!(f, "link={v}"),
            Self::Chain(parts) | Self::Any(parts) => {
                let sep = if matches!(self, Self::Chain(_)) { " > " } else { " | " };
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{p}")?;
                }
                Ok(())
            }
        }
    }
}

/// Bounding box of a rendered element, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the box has a visible area
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}
