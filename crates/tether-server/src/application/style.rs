//! Inline style access for an [`Element`].

use crate::application::element::Element;
use crate::application::error::DomError;

/// Values accepted by [`StyleReceiver::set_display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayValue {
    None,
    Block,
}

impl DisplayValue {
    pub fn as_css(self) -> &'static str {
        match self {
            DisplayValue::None => "none",
            DisplayValue::Block => "block",
        }
    }
}

/// Sets inline style properties on one element.
#[derive(Debug)]
pub struct StyleReceiver<'a> {
    element: &'a Element,
}

impl<'a> StyleReceiver<'a> {
    pub(crate) fn new(element: &'a Element) -> Self {
        Self { element }
    }

    pub fn set_display(&self, value: DisplayValue) -> Result<(), DomError> {
        self.set_property("display", value.as_css())
    }

    /// Sets `width`; `value` is any CSS length (`"10px"`, `"50%"`).
    pub fn set_width(&self, value: &str) -> Result<(), DomError> {
        self.set_property("width", value)
    }

    pub fn set_property(&self, property: &str, value: &str) -> Result<(), DomError> {
        self.element.set_style_property(property, value)
    }

    /// Shorthand for hiding the element.
    pub fn remove(&self) -> Result<(), DomError> {
        self.set_display(DisplayValue::None)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session::Session;
    use serde_json::Value;
    use std::sync::Arc;

    #[test]
    fn test_style_is_mirrored_in_shadow() {
        // Arrange
        let session = Arc::new(Session::with_shadow("c1", false));
        let body = Element::from_expression(Arc::clone(&session), "document.body", Some("body"));
        let div = body.create_child("div", Vec::<(String, Value)>::new(), None).unwrap();

        // Act
        div.style().set_display(DisplayValue::Block).unwrap();
        div.style().set_width("10px").unwrap();

        // Assert
        let style = session
            .with_shadow_document(|doc| {
                let node = doc.element_by_id("K1").unwrap();
                doc.attribute(node, "style").map(str::to_string)
            })
            .flatten();
        assert_eq!(style.as_deref(), Some("display: block; width: 10px;"));
    }

    #[test]
    fn test_remove_hides_element() {
        let session = Arc::new(Session::new("c1", false));
        let el = Element::by_id(Arc::clone(&session), "K1");

        let (_, js) = session.catch_outbound(|| el.style().remove().unwrap());

        assert_eq!(
            js,
            "document.getElementById(\"K1\").style.setProperty(\"display\", \"none\");"
        );
    }
}
