//! Content Selectors
//!
//! Parses the `select` attribute of `<content>` slots into compound CSS
//! selectors and matches them against document elements. Supported:
//! element names, `.class`, `#id`, `[attr]`, `[attr=value]`, `:not(...)`
//! and comma-separated alternatives. Combinators are not supported.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::error::{Result, TemplatingError};

static SELECTOR_REGEXP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\:not\()|(([\.\#]?)[-\w]+)|(?:\[([-.\w*\\$]+)(?:=(?:"([^"]*)"|'([^']*)'|([^\]]*)))?\])|(\))|(\s*,\s*)"#).unwrap()
});

/// Capture groups of `SELECTOR_REGEXP`
#[derive(Debug, Clone, Copy)]
enum SelectorRegexp {
    Not = 1,
    Tag = 2,
    Prefix = 3,
    Attribute = 4,
    AttributeValueDouble = 5,
    AttributeValueSingle = 6,
    AttributeValueUnquoted = 7,
    NotEnd = 8,
    Separator = 9,
}

/// One compound selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CssSelector {
    pub element: Option<String>,
    pub class_names: Vec<String>,
    /// Attribute name/value pairs; an empty value only tests presence
    pub attrs: Vec<(String, String)>,
    pub not_selectors: Vec<CssSelector>,
}

impl CssSelector {
    pub fn new() -> Self {
        CssSelector::default()
    }

    /// Parse a selector list. Each comma-separated alternative yields one entry.
    pub fn parse(selector: &str) -> Result<Vec<CssSelector>> {
        let invalid = |reason: &str| TemplatingError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };

        let mut results = Vec::new();
        let mut css_selector = CssSelector::new();
        let mut in_not = false;

        for cap in SELECTOR_REGEXP.captures_iter(selector) {
            if cap.get(SelectorRegexp::Not as usize).is_some() {
                if in_not {
                    return Err(invalid("Nesting :not in a selector is not allowed"));
                }
                in_not = true;
                css_selector.not_selectors.push(CssSelector::new());
            }

            let not_count = css_selector.not_selectors.len();
            let current = if in_not && not_count > 0 {
                &mut css_selector.not_selectors[not_count - 1]
            } else {
                &mut css_selector
            };

            if let Some(tag_match) = cap.get(SelectorRegexp::Tag as usize) {
                let tag = tag_match.as_str();
                let prefix = cap
                    .get(SelectorRegexp::Prefix as usize)
                    .map(|m| m.as_str())
                    .unwrap_or("");

                match prefix {
                    "#" => current.add_attribute("id", &tag[1..]),
                    "." => current.add_class_name(&tag[1..]),
                    _ => current.set_element(tag),
                }
            }

            if let Some(attr_match) = cap.get(SelectorRegexp::Attribute as usize) {
                let value = cap
                    .get(SelectorRegexp::AttributeValueDouble as usize)
                    .or_else(|| cap.get(SelectorRegexp::AttributeValueSingle as usize))
                    .or_else(|| cap.get(SelectorRegexp::AttributeValueUnquoted as usize))
                    .map(|m| m.as_str())
                    .unwrap_or("");

                let name = unescape_attribute(attr_match.as_str()).map_err(|e| invalid(&e))?;
                current.add_attribute(&name, value);
            }

            if cap.get(SelectorRegexp::NotEnd as usize).is_some() {
                in_not = false;
            }

            if cap.get(SelectorRegexp::Separator as usize).is_some() {
                if in_not {
                    return Err(invalid("Multiple selectors in :not are not supported"));
                }
                results.push(std::mem::take(&mut css_selector));
            }
        }

        results.push(css_selector);
        Ok(results)
    }

    pub fn set_element(&mut self, element: &str) {
        self.element = Some(element.to_ascii_lowercase());
    }

    pub fn add_attribute(&mut self, name: &str, value: &str) {
        self.attrs.push((name.to_ascii_lowercase(), value.to_lowercase()));
    }

    pub fn add_class_name(&mut self, name: &str) {
        self.class_names.push(name.to_lowercase());
    }

    /// True when the selector constrains nothing (e.g. `*`)
    pub fn is_universal(&self) -> bool {
        matches!(self.element.as_deref(), None | Some("*"))
            && self.class_names.is_empty()
            && self.attrs.is_empty()
            && self.not_selectors.is_empty()
    }

    /// Test an element against this compound selector.
    /// Only elements can match; text and comment nodes never do.
    pub fn matches(&self, document: &Document, node: NodeId) -> bool {
        let Some(tag) = document.tag_name(node) else {
            return false;
        };

        if let Some(element) = &self.element {
            if element != "*" && !element.eq_ignore_ascii_case(&tag) {
                return false;
            }
        }

        if !self.class_names.is_empty() {
            let classes: Vec<String> = document
                .class_list(node)
                .iter()
                .map(|c| c.to_lowercase())
                .collect();
            if !self.class_names.iter().all(|c| classes.contains(c)) {
                return false;
            }
        }

        for (name, value) in &self.attrs {
            match document.get_attribute(node, name) {
                None => return false,
                Some(actual) => {
                    if !value.is_empty() && actual.to_lowercase() != *value {
                        return false;
                    }
                }
            }
        }

        !self.not_selectors.iter().any(|not| not.matches(document, node))
    }
}

fn unescape_attribute(attr: &str) -> std::result::Result<String, String> {
    let mut result = String::new();
    let mut escaping = false;

    for ch in attr.chars() {
        if ch == '\\' {
            escaping = true;
            continue;
        }
        if ch == '$' && !escaping {
            return Err(format!(
                "Error in attribute selector \"{}\". Unescaped \"$\" is not supported. Please escape with \"\\$\".",
                attr
            ));
        }
        escaping = false;
        result.push(ch);
    }

    Ok(result)
}

impl fmt::Display for CssSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.element.as_deref().unwrap_or(""))?;

        for class_name in &self.class_names {
            write!(f, ".{}", class_name)?;
        }

        for (name, value) in &self.attrs {
            let name = name.replace('$', "\\$");
            if value.is_empty() {
                write!(f, "[{}]", name)?;
            } else {
                write!(f, "[{}={}]", name, value)?;
            }
        }

        for not_selector in &self.not_selectors {
            write!(f, ":not({})", not_selector)?;
        }

        Ok(())
    }
}

/// Comma-separated alternatives; matches when any alternative does
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorList {
    selectors: Vec<CssSelector>,
}

impl SelectorList {
    pub fn parse(selector: &str) -> Result<Self> {
        Ok(SelectorList {
            selectors: CssSelector::parse(selector)?,
        })
    }

    pub fn selectors(&self) -> &[CssSelector] {
        &self.selectors
    }

    pub fn matches(&self, document: &Document, node: NodeId) -> bool {
        self.selectors.iter().any(|s| s.matches(document, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(doc: &Document, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = doc.create_element(tag);
        for (name, value) in attrs {
            doc.set_attribute(node, name, value);
        }
        node
    }

    #[test]
    fn test_parse_compound() {
        let parsed = CssSelector::parse("div.header[slot=top]:not(.hidden)").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].element.as_deref(), Some("div"));
        assert_eq!(parsed[0].class_names, vec!["header"]);
        assert_eq!(parsed[0].attrs, vec![("slot".to_string(), "top".to_string())]);
        assert_eq!(parsed[0].not_selectors.len(), 1);
        assert_eq!(parsed[0].to_string(), "div.header[slot=top]:not(.hidden)");
    }

    #[test]
    fn test_parse_rejects_nested_not() {
        assert!(CssSelector::parse(":not(:not(.a))").is_err());
    }

    #[test]
    fn test_matches_elements() {
        let doc = Document::new();
        let header = element(&doc, "h1", &[("class", "title Big")]);
        let para = element(&doc, "p", &[("id", "intro")]);
        let text = doc.create_text("x");

        let list = SelectorList::parse("h1.big, #intro").unwrap();
        assert!(list.matches(&doc, header));
        assert!(list.matches(&doc, para));
        assert!(!list.matches(&doc, text));

        let not = SelectorList::parse("p:not(#intro)").unwrap();
        assert!(!not.matches(&doc, para));
    }
}
