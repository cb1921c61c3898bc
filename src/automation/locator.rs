//! Element locators understood by every [`BrowserSession`](super::BrowserSession).
//!
//! A locator describes *how* to find an element, not which driver finds it.
//! [`Locator::to_webdriver`] lowers each variant to a W3C WebDriver
//! `(using, value)` pair: CSS stays CSS, the rest becomes XPath.

use std::fmt;

/// ARIA-ish role used by [`Locator::Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Link,
    Button,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A CSS selector.
    Css(String),
    /// An XPath expression.
    XPath(String),
    /// The form control a `<label>` with this exact text points at.
    Label(String),
    /// A link or button whose visible name is this text.
    Role { role: Role, name: String },
    /// Elements matching `css` (tag and classes only) whose text contains `text`.
    Text { css: String, text: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::Label(text.into())
    }

    pub fn link(name: impl Into<String>) -> Self {
        Self::Role {
            role: Role::Link,
            name: name.into(),
        }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::Role {
            role: Role::Button,
            name: name.into(),
        }
    }

    /// `a.govuk-button` containing "Start now", and similar.
    pub fn text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            css: css.into(),
            text: text.into(),
        }
    }

    /// W3C `using` strategy and selector value.
    pub fn to_webdriver(&self) -> (&'static str, String) {
        match self {
            Locator::Css(sel) => ("css selector", sel.clone()),
            Locator::XPath(xp) => ("xpath", xp.clone()),
            Locator::Label(text) => {
                let lit = xpath_literal(text);
                (
                    "xpath",
                    format!(
                        "//*[self::input or self::select or self::textarea]\
                         [@id = //label[normalize-space(.)={lit}]/@for \
                         or ancestor::label[normalize-space(text())={lit}]]"
                    ),
                )
            }
            Locator::Role { role, name } => {
                let lit = xpath_literal(name);
                let xp = match role {
                    Role::Link => format!("//a[normalize-space(.)={lit}]"),
                    Role::Button => format!(
                        "//button[normalize-space(.)={lit}] \
                         | //input[(@type='submit' or @type='button') and @value={lit}] \
                         | //*[@role='button' and normalize-space(.)={lit}]"
                    ),
                };
                ("xpath", xp)
            }
            Locator::Text { css, text } => {
                ("xpath", format!("{}[contains(normalize-space(.), {})]", css_to_xpath(css), xpath_literal(text)))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(sel) => write!(f, "css={sel}"),
            Locator::XPath(xp) => write!(f, "xpath={xp}"),
            Locator::Label(text) => write!(f, "label={text:?}"),
            Locator::Role { role, name } => {
                let role = match role {
                    Role::Link => "link",
                    Role::Button => "button",
                };
                write!(f, "role={role}[name={name:?}]")
            }
            Locator::Text { css, text } => write!(f, "{css}:has-text({text:?})"),
        }
    }
}

/// Quote `s` as an XPath 1.0 string literal.
///
/// XPath 1.0 has no escape sequences, so a string holding both quote kinds
/// is built with `concat()`.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{s}'");
    }
    if !s.contains('"') {
        return format!("\"{s}\"");
    }
    let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// `tag.class1.class2` → `//tag[contains(concat(' ', @class, ' '), ' class1 ')]…`.
fn css_to_xpath(css: &str) -> String {
    let mut parts = css.split('.');
    let tag = match parts.next() {
        Some("") | None => "*",
        Some(t) => t,
    };
    let mut xp = format!("//{tag}");
    for class in parts.filter(|c| !c.is_empty()) {
        xp.push_str(&format!("[contains(concat(' ', normalize-space(@class), ' '), ' {class} ')]"));
    }
    xp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_passes_through() {
        let (using, value) = Locator::css("input#shareCode").to_webdriver();
        assert_eq!(using, "css selector");
        assert_eq!(value, "input#shareCode");
    }

    #[test]
    fn text_locator_with_class() {
        let (using, value) = Locator::text("a.govuk-button", "Start now").to_webdriver();
        assert_eq!(using, "xpath");
        assert!(value.starts_with("//a[contains(concat(' ', normalize-space(@class), ' '), ' govuk-button ')]"));
        assert!(value.ends_with("[contains(normalize-space(.), 'Start now')]"));
    }

    #[test]
    fn label_targets_for_attribute() {
        let (_, value) = Locator::label("Day").to_webdriver();
        assert!(value.contains("//label[normalize-space(.)='Day']/@for"));
    }

    #[test]
    fn quotes_in_literals() {
        assert_eq!(xpath_literal("Start now"), "'Start now'");
        assert_eq!(xpath_literal("Don't"), "\"Don't\"");
        assert_eq!(xpath_literal("a'b\"c"), "concat('a', \"'\", 'b\"c')");
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Locator::link("Download PDF").to_string(), "role=link[name=\"Download PDF\"]");
        assert_eq!(Locator::text("button", "Continue").to_string(), "button:has-text(\"Continue\")");
    }
}
