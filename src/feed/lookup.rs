//! Page-link resolution
//!
//! Every source must say how its revisions join to a page. The answer is
//! picked once per source from its static description, in priority order:
//!
//! 1. the source represents pages themselves: the page's own `slug`
//! 2. the source names a page-slug attribute: that attribute
//! 3. the model holds a page reference: `page__slug`
//! 4. the model has a `slug` attribute of its own: `slug`
//! 5. nothing applies: unresolved, which is a configuration error

use serde::{Deserialize, Serialize};

/// Static structure of the model a source versions
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    pub name: String,

    /// The model holds a reference to its owning page
    #[serde(default)]
    pub page_reference: bool,

    /// Attribute names present on every instance
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl ModelShape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_page_reference(mut self) -> Self {
        self.page_reference = true;
        self
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }
}

/// What a change source declares about itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique kind of the source, e.g. `map`
    pub kind: String,

    /// Address namespace its links live under
    pub namespace: String,

    /// The source versions pages themselves
    #[serde(default)]
    pub represents_page: bool,

    /// Explicit attribute holding the page slug
    #[serde(default)]
    pub page_slug_attribute: Option<String>,

    pub model: ModelShape,
}

impl SourceDescriptor {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, model: ModelShape) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            represents_page: false,
            page_slug_attribute: None,
            model,
        }
    }

    pub fn representing_page(mut self) -> Self {
        self.represents_page = true;
        self
    }

    pub fn with_page_slug_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.page_slug_attribute = Some(attribute.into());
        self
    }
}

/// How revisions of a source link to their page
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageLinkStrategy {
    ExplicitPageField,
    ExplicitAttributeName(String),
    ReferencedPageModel,
    DirectSlugAttribute,
    Unresolved,
}

impl PageLinkStrategy {
    pub fn resolve(descriptor: &SourceDescriptor) -> Self {
        if descriptor.represents_page {
            return PageLinkStrategy::ExplicitPageField;
        }
        if let Some(attribute) = &descriptor.page_slug_attribute {
            return PageLinkStrategy::ExplicitAttributeName(attribute.clone());
        }
        if descriptor.model.page_reference {
            return PageLinkStrategy::ReferencedPageModel;
        }
        if descriptor.model.has_attribute("slug") {
            return PageLinkStrategy::DirectSlugAttribute;
        }
        PageLinkStrategy::Unresolved
    }

    /// The lookup path, or `None` when unresolved
    pub fn lookup_path(&self) -> Option<&str> {
        match self {
            PageLinkStrategy::ExplicitPageField => Some("slug"),
            PageLinkStrategy::ExplicitAttributeName(attribute) => Some(attribute.as_str()),
            PageLinkStrategy::ReferencedPageModel => Some("page__slug"),
            PageLinkStrategy::DirectSlugAttribute => Some("slug"),
            PageLinkStrategy::Unresolved => None,
        }
    }
}
