//! Attributes and meta items.
//!
//! An attribute's payload is a `MetaItem` tree: a name, optionally with a
//! string value (`key = "val"`) or a parenthesised list (`all(a, b)`).

use ferric_diagnostics::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaData {
    /// Bare name: `#[test]`, `cfg(unix)`'s `unix` leaf
    Flag,
    /// `name = "value"`
    Value(String),
    /// `name(item, item, ...)`
    List(Vec<MetaItem>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaItem {
    pub name: String,
    pub data: MetaData,
}

impl MetaItem {
    pub fn flag(name: &str) -> Self {
        MetaItem {
            name: name.to_string(),
            data: MetaData::Flag,
        }
    }

    pub fn value(name: &str, value: &str) -> Self {
        MetaItem {
            name: name.to_string(),
            data: MetaData::Value(value.to_string()),
        }
    }

    pub fn list(name: &str, items: Vec<MetaItem>) -> Self {
        MetaItem {
            name: name.to_string(),
            data: MetaData::List(items),
        }
    }

    pub fn has_sub_items(&self) -> bool {
        matches!(self.data, MetaData::List(_))
    }

    pub fn items(&self) -> &[MetaItem] {
        match &self.data {
            MetaData::List(items) => items,
            _ => &[],
        }
    }

    pub fn string(&self) -> Option<&str> {
        match &self.data {
            MetaData::Value(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        match &self.data {
            MetaData::Flag => Ok(()),
            MetaData::Value(v) => write!(f, " = {v:?}"),
            MetaData::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub span: Span,
    pub meta: MetaItem,
}

impl Attribute {
    pub fn new(span: Span, meta: MetaItem) -> Self {
        Attribute { span, meta }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

/// Find the first attribute with the given name
pub fn find_attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attrs.iter().find(|a| a.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_display() {
        let mi = MetaItem::list(
            "cfg",
            vec![MetaItem::list(
                "all",
                vec![
                    MetaItem::flag("unix"),
                    MetaItem::value("target_os", "linux"),
                ],
            )],
        );
        assert_eq!(format!("{mi}"), "cfg(all(unix, target_os = \"linux\"))");
    }

    #[test]
    fn test_find_attr() {
        let attrs = vec![
            Attribute::new(Span::synthetic(), MetaItem::flag("inline")),
            Attribute::new(Span::synthetic(), MetaItem::flag("test")),
        ];
        assert!(find_attr(&attrs, "test").is_some());
        assert!(find_attr(&attrs, "derive").is_none());
    }
}
