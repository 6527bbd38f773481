//! Entry templates describing the shape an editable entry takes.

use serde::{Deserialize, Serialize};

/// Uuid of the builtin standard template.
pub const STANDARD_TEMPLATE_UUID: &str = "00000000-0000-0000-0000-000000000000";

/// Uuid of the designer template used while template records themselves
/// are being edited.
pub const DESIGNER_TEMPLATE_UUID: &str = "ffffffff-ffff-ffff-ffff-ffffffffffff";

/// Kind of value a template attribute declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateAttributeKind {
    Text,
    Multiline,
    DateTime,
    Divider,
}

impl TemplateAttributeKind {
    /// Storage name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Multiline => "multiline",
            Self::DateTime => "datetime",
            Self::Divider => "divider",
        }
    }

    /// Look a kind up by its storage name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "multiline" => Some(Self::Multiline),
            "datetime" => Some(Self::DateTime),
            "divider" => Some(Self::Divider),
            _ => None,
        }
    }
}

/// One attribute slot declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateAttribute {
    pub label: String,
    pub kind: TemplateAttributeKind,
    pub protected: bool,
}

impl TemplateAttribute {
    pub fn new(label: impl Into<String>, kind: TemplateAttributeKind, protected: bool) -> Self {
        Self {
            label: label.into(),
            kind,
            protected,
        }
    }

    /// Plain unprotected text attribute.
    pub fn text(label: impl Into<String>) -> Self {
        Self::new(label, TemplateAttributeKind::Text, false)
    }

    /// Text attribute whose value is stored protected.
    pub fn protected_text(label: impl Into<String>) -> Self {
        Self::new(label, TemplateAttributeKind::Text, true)
    }
}

/// A named set of attribute slots entries can be built from.
///
/// The standard fields (title, username, ...) are always present and are not
/// listed here; attributes describe the extra slots a template adds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub uuid: String,
    pub name: String,
    pub attributes: Vec<TemplateAttribute>,
}

impl Template {
    /// The builtin template carrying only the standard fields.
    pub fn standard() -> Self {
        Self {
            uuid: STANDARD_TEMPLATE_UUID.to_string(),
            name: "Standard".to_string(),
            attributes: Vec::new(),
        }
    }

    /// The template governing edits of template records themselves.
    pub fn designer() -> Self {
        Self {
            uuid: DESIGNER_TEMPLATE_UUID.to_string(),
            name: "Template designer".to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn is_standard(&self) -> bool {
        self.uuid == STANDARD_TEMPLATE_UUID
    }

    /// Look an attribute up by label.
    pub fn attribute(&self, label: &str) -> Option<&TemplateAttribute> {
        self.attributes.iter().find(|a| a.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            TemplateAttributeKind::Text,
            TemplateAttributeKind::Multiline,
            TemplateAttributeKind::DateTime,
            TemplateAttributeKind::Divider,
        ] {
            assert_eq!(TemplateAttributeKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(TemplateAttributeKind::from_name("tide"), None);
    }

    #[test]
    fn standard_template_is_marked() {
        assert!(Template::standard().is_standard());
        assert!(!Template::designer().is_standard());
    }

    #[test]
    fn attribute_lookup_by_label() {
        let template = Template {
            uuid: "t".to_string(),
            name: "Wi-Fi".to_string(),
            attributes: vec![TemplateAttribute::protected_text("SSID key")],
        };
        assert!(template.attribute("SSID key").is_some_and(|a| a.protected));
        assert!(template.attribute("missing").is_none());
    }
}
