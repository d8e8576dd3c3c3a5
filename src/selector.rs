use dom_query::NodeRef;
use serde::{Deserialize, Serialize};

/// A structural element selector: tag name plus at most one distinguishing
/// attribute. Every field left unset matches anything.
///
/// Selectors are used two ways: rendered to CSS for document queries
/// (title/content lookup) and matched directly against nodes while walking
/// the tree (noise removal, promotional markers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
    /// Exact attribute value; only meaningful together with `attr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ElementSelector {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_owned()),
            ..Self::default()
        }
    }

    pub fn tag_with_class(tag: &str, class: &str) -> Self {
        Self {
            tag: Some(tag.to_owned()),
            class: Some(class.to_owned()),
            ..Self::default()
        }
    }

    pub fn tag_with_id(tag: &str, id: &str) -> Self {
        Self {
            tag: Some(tag.to_owned()),
            id: Some(id.to_owned()),
            ..Self::default()
        }
    }

    pub fn class(class: &str) -> Self {
        Self {
            class: Some(class.to_owned()),
            ..Self::default()
        }
    }

    pub fn attribute(tag: Option<&str>, attr: &str, value: Option<&str>) -> Self {
        Self {
            tag: tag.map(str::to_owned),
            attr: Some(attr.to_owned()),
            value: value.map(str::to_owned),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.class.is_none() && self.attr.is_none()
    }

    /// Render as a CSS selector understood by `dom_query`.
    pub fn to_css(&self) -> String {
        let mut css = self.tag.clone().unwrap_or_else(|| "*".to_owned());
        if let Some(id) = &self.id {
            css.push_str(&format!("[id=\"{}\"]", css_escape(id)));
        }
        if let Some(class) = &self.class {
            css.push_str(&format!("[class~=\"{}\"]", css_escape(class)));
        }
        if let Some(attr) = &self.attr {
            match &self.value {
                Some(value) => css.push_str(&format!("[{attr}=\"{}\"]", css_escape(value))),
                None => css.push_str(&format!("[{attr}]")),
            }
        }
        css
    }

    /// Match a single node without running a document query.
    pub fn matches(&self, node: &NodeRef) -> bool {
        if !node.is_element() || self.is_empty() {
            return false;
        }

        if let Some(tag) = &self.tag {
            let Some(name) = node.node_name() else {
                return false;
            };
            if !name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if let Some(id) = &self.id
            && node.attr("id").as_deref() != Some(id.as_str())
        {
            return false;
        }

        if let Some(class) = &self.class {
            let Some(classes) = node.attr("class") else {
                return false;
            };
            if !classes.split_whitespace().any(|c| c == class) {
                return false;
            }
        }

        if let Some(attr) = &self.attr {
            let Some(actual) = node.attr(attr) else {
                return false;
            };
            if let Some(expected) = &self.value
                && actual.trim() != expected.trim()
            {
                return false;
            }
        }

        true
    }
}

impl std::fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_css())
    }
}

fn css_escape(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}
