//! Remote element handles.
//!
//! An [`Element`] is a cheap, cloneable view of one DOM node in one
//! session's page.  It holds a script expression that finds the node on the
//! client, and optionally the node's stable id and tag.  Handles are never
//! destroyed explicitly; dropping one has no effect on the page.
//!
//! Every mutating method goes through the instruction dispatcher, which
//! decides between the shadow document, a structured instruction, and raw
//! script.  Methods that would emit nothing (such as setting an absent
//! attribute value) return early without touching the session.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use tether_core::protocol::attribute_text;

use crate::application::dispatcher::{dispatch, js_string, resolve, Mutation, Target};
use crate::application::error::DomError;
use crate::application::evaluation::PendingEvaluation;
use crate::application::observable::{Observable, SubscriptionHandle};
use crate::application::scope::{CleanupScope, ScopeGuard};
use crate::application::session::Session;
use crate::application::style::StyleReceiver;

/// Class toggled by [`Element::activate`] and [`Element::deactivate`].
pub const ACTIVE_CLASS: &str = "is-active";

/// A handle to a DOM node in one session's page.
#[derive(Clone)]
pub struct Element {
    session: Arc<Session>,
    js_expression: String,
    id: Option<String>,
    tag: Option<String>,
    scope: Option<CleanupScope>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("client_id", &self.session.client_id())
            .field("js_expression", &self.js_expression)
            .field("id", &self.id)
            .field("tag", &self.tag)
            .finish()
    }
}

impl Element {
    /// A handle addressed by `document.getElementById(id)`.
    pub fn by_id(session: Arc<Session>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            session,
            js_expression: id_expression(&id),
            id: Some(id),
            tag: None,
            scope: None,
        }
    }

    /// A handle addressed only by a script expression.  Such a handle never
    /// gets structured instructions.
    pub fn from_expression(session: Arc<Session>, js_expression: impl Into<String>, tag: Option<&str>) -> Self {
        Self {
            session,
            js_expression: js_expression.into(),
            id: None,
            tag: tag.map(str::to_string),
            scope: None,
        }
    }

    pub(crate) fn created(session: Arc<Session>, id: String, tag: &str, scope: CleanupScope) -> Self {
        Self {
            session,
            js_expression: id_expression(&id),
            id: Some(id),
            tag: Some(tag.to_string()),
            scope: Some(scope),
        }
    }

    /// Returns this handle tied to `scope`: listeners and bindings it
    /// registers are cleaned up when `scope` ends.
    pub fn with_scope(mut self, scope: CleanupScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn js_expression(&self) -> &str {
        &self.js_expression
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The scope cleanups are registered in: the handle's own, or the
    /// session's.
    pub fn cleanup_scope(&self) -> CleanupScope {
        self.scope
            .clone()
            .unwrap_or_else(|| self.session.scope().clone())
    }

    pub(crate) fn target(&self) -> Target<'_> {
        Target {
            expr: &self.js_expression,
            id: self.id.as_deref(),
            tag: self.tag.as_deref(),
        }
    }

    /// Key under which per-element flags are stored in the session.
    pub(crate) fn flag(&self, name: &str) -> String {
        format!("{}::{name}", self.id.as_deref().unwrap_or(&self.js_expression))
    }

    fn apply(&self, mutation: Mutation<'_>) -> Result<(), DomError> {
        dispatch(&self.session, &self.target(), &mutation)
    }

    // ── Low level ────────────────────────────────────────────────────────────

    pub fn execute(&self, js: &str) {
        self.session.execute(js);
    }

    pub fn evaluate(&self, js: &str) -> Result<PendingEvaluation, DomError> {
        self.session.evaluate(js)
    }

    // ── Attributes ───────────────────────────────────────────────────────────

    /// Sets an attribute.  A `null` value is ignored and nothing is sent.
    ///
    /// Setting `id` also re-addresses this handle by the new id.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<Value>) -> Result<(), DomError> {
        let value = value.into();
        if value.is_null() {
            return Ok(());
        }
        self.apply(Mutation::SetAttribute { name, value: &value })?;
        if name == "id" {
            let id = attribute_text(&value);
            self.js_expression = id_expression(&id);
            self.id = Some(id);
        }
        Ok(())
    }

    pub fn remove_attribute(&self, name: &str) -> Result<(), DomError> {
        self.apply(Mutation::RemoveAttribute { name })
    }

    /// Reads an attribute: from the shadow document while there is one,
    /// otherwise by evaluation.  An absent attribute reads as `None`.
    pub async fn get_attribute(&self, name: &str) -> Result<Option<String>, DomError> {
        let target = self.target();
        let shadowed = self.session.with_shadow_document(|doc| {
            resolve(doc, &target).map(|node| doc.attribute(node, name).map(str::to_string))
        });
        if let Some(Some(value)) = shadowed {
            return Ok(value);
        }
        let value = self
            .evaluate(&format!("{}.getAttribute({})", self.js_expression, js_string(name)))?
            .await?;
        Ok(match value {
            Value::Null => None,
            other => Some(attribute_text(&other)),
        })
    }

    pub fn set_classes(&mut self, classes: &[&str]) -> Result<(), DomError> {
        validate_classes(classes)?;
        self.set_attribute("class", classes.join(" "))
    }

    /// Adds classes.  Every name is checked before anything is sent.
    pub fn add_classes(&self, classes: &[&str]) -> Result<(), DomError> {
        validate_classes(classes)?;
        for class in classes {
            self.apply(Mutation::AddClass(class))?;
        }
        Ok(())
    }

    /// Removes classes.  Every name is checked before anything is sent.
    pub fn remove_classes(&self, classes: &[&str]) -> Result<(), DomError> {
        validate_classes(classes)?;
        for class in classes {
            self.apply(Mutation::RemoveClass(class))?;
        }
        Ok(())
    }

    pub fn activate(&self) -> Result<(), DomError> {
        self.add_classes(&[ACTIVE_CLASS])
    }

    pub fn deactivate(&self) -> Result<(), DomError> {
        self.remove_classes(&[ACTIVE_CLASS])
    }

    pub fn disable(&mut self) -> Result<(), DomError> {
        self.set_attribute("disabled", true)
    }

    pub fn enable(&self) -> Result<(), DomError> {
        self.remove_attribute("disabled")
    }

    pub fn spellcheck(&mut self, enabled: bool) -> Result<(), DomError> {
        self.set_attribute("spellcheck", enabled)
    }

    pub fn style(&self) -> StyleReceiver<'_> {
        StyleReceiver::new(self)
    }

    pub(crate) fn set_style_property(&self, property: &str, value: &str) -> Result<(), DomError> {
        self.apply(Mutation::SetStyle { property, value })
    }

    // ── Content ──────────────────────────────────────────────────────────────

    /// Replaces the element's children with a single text node.
    pub fn set_text(&self, text: &str) -> Result<(), DomError> {
        self.apply(Mutation::SetText(text))
    }

    /// Appends a text node.
    pub fn add_text(&self, text: &str) -> Result<(), DomError> {
        self.apply(Mutation::AddText(text))
    }

    pub fn set_inner_html(&self, html: &str) -> Result<(), DomError> {
        self.apply(Mutation::SetInnerHtml(html))
    }

    /// Reads `textContent`: from the shadow document while there is one,
    /// otherwise by evaluation.
    pub async fn get_text(&self) -> Result<String, DomError> {
        let target = self.target();
        let shadowed = self
            .session
            .with_shadow_document(|doc| resolve(doc, &target).map(|node| doc.text_content(node)));
        if let Some(Some(text)) = shadowed {
            return Ok(text?);
        }
        let value = self
            .evaluate(&format!("{}.textContent", self.js_expression))?
            .await?;
        Ok(match value {
            Value::Null => String::new(),
            other => attribute_text(&other),
        })
    }

    // ── Structure ────────────────────────────────────────────────────────────

    pub fn remove_children(&self) -> Result<(), DomError> {
        self.apply(Mutation::RemoveChildren)
    }

    /// Removes the element child at `position`.
    pub fn remove_child_at(&self, position: usize) -> Result<(), DomError> {
        self.apply(Mutation::RemoveChildAt(position))
    }

    /// Detaches the element from its parent.
    pub fn delete(&self) -> Result<(), DomError> {
        self.apply(Mutation::Delete)
    }

    /// Like [`delete`](Self::delete), but a missing element is not an error.
    pub fn delete_if_exists(&self) -> Result<(), DomError> {
        self.apply(Mutation::DeleteIfExists)
    }

    /// Creates a child element.
    ///
    /// The new element gets the `id` attribute from `attributes` if one is
    /// given, otherwise a fresh `K{n}` id.  `position` indexes the parent's
    /// element children; `None` appends.
    pub fn create_child<I, K, V>(&self, tag: &str, attributes: I, position: Option<usize>) -> Result<Element, DomError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.create_child_in(tag, collect_attributes(attributes), position, self.cleanup_scope())
    }

    pub(crate) fn create_child_in(
        &self,
        tag: &str,
        attributes: Map<String, Value>,
        position: Option<usize>,
        scope: CleanupScope,
    ) -> Result<Element, DomError> {
        let new_id = match attributes.get("id") {
            Some(value) if !value.is_null() => attribute_text(value),
            _ => self.session.next_element_id(),
        };
        self.apply(Mutation::CreateElement {
            tag,
            attributes: &attributes,
            new_id: &new_id,
            position,
        })?;
        Ok(Element::created(Arc::clone(&self.session), new_id, tag, scope))
    }

    /// Returns a creator that adds children to this element, starting at
    /// `position`, in a child of this element's cleanup scope.
    pub fn new_children(&self, position: Option<usize>) -> ElementCreator {
        ElementCreator {
            parent: self.clone(),
            position,
            scope: self.cleanup_scope().child(),
            created: 0,
        }
    }

    // ── Focus ────────────────────────────────────────────────────────────────

    pub fn focus(&self) {
        self.execute(&format!("{}.focus();", self.js_expression));
    }

    pub fn blur(&self) {
        self.execute(&format!("{}.blur();", self.js_expression));
    }

    // ── Observable bindings ──────────────────────────────────────────────────

    /// Sets the text now and again whenever `text` changes, until this
    /// element's cleanup scope ends.
    pub fn set_text_bound(&self, text: &Observable<String>) -> Result<SubscriptionHandle, DomError> {
        self.set_text(&text.get())?;
        let element = self.clone();
        let handle = text.subscribe(move |_, new| {
            if let Err(e) = element.set_text(new) {
                warn!("bound text update failed: {e}");
            }
        });
        self.unsubscribe_on_cleanup(text, handle);
        Ok(handle)
    }

    /// Sets the inner HTML now and whenever `html` changes.
    pub fn set_inner_html_bound(&self, html: &Observable<String>) -> Result<SubscriptionHandle, DomError> {
        self.set_inner_html(&html.get())?;
        let element = self.clone();
        let handle = html.subscribe(move |_, new| {
            if let Err(e) = element.set_inner_html(new) {
                warn!("bound inner HTML update failed: {e}");
            }
        });
        self.unsubscribe_on_cleanup(html, handle);
        Ok(handle)
    }

    /// Sets an attribute now and whenever `value` changes.
    pub fn set_attribute_bound<T>(&mut self, name: &str, value: &Observable<T>) -> Result<SubscriptionHandle, DomError>
    where
        T: Into<Value> + Clone + PartialEq + Send + 'static,
    {
        self.set_attribute(name, value.get())?;
        let element = self.clone();
        let name = name.to_string();
        let handle = value.subscribe(move |_, new| {
            let mut element = element.clone();
            if let Err(e) = element.set_attribute(&name, new.clone()) {
                warn!("bound attribute {name} update failed: {e}");
            }
        });
        self.unsubscribe_on_cleanup(value, handle);
        Ok(handle)
    }

    fn unsubscribe_on_cleanup<T>(&self, observable: &Observable<T>, handle: SubscriptionHandle)
    where
        T: Clone + PartialEq + Send + 'static,
    {
        let observable = observable.clone();
        self.cleanup_scope().on_cleanup(move || {
            observable.unsubscribe(handle);
        });
    }
}

/// Creates children of one parent element inside one cleanup scope.
///
/// With a starting position, successive children are placed one after
/// another from that position, keeping creation order.
pub struct ElementCreator {
    parent: Element,
    position: Option<usize>,
    scope: CleanupScope,
    created: usize,
}

impl ElementCreator {
    pub fn parent(&self) -> &Element {
        &self.parent
    }

    pub fn scope(&self) -> &CleanupScope {
        &self.scope
    }

    pub fn element<I, K, V>(&mut self, tag: &str, attributes: I) -> Result<Element, DomError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let position = self.position.map(|p| p + self.created);
        let element = self.parent.create_child_in(
            tag,
            collect_attributes(attributes),
            position,
            self.scope.clone(),
        )?;
        self.created += 1;
        Ok(element)
    }

    /// Returns a guard that ends this creator's scope when dropped.  A build
    /// that bails out with `?` then leaves no listeners or bindings behind;
    /// call [`ScopeGuard::keep`] once it has succeeded.
    pub fn guard(&self) -> ScopeGuard {
        self.scope.guard()
    }

    /// Registers a closure to run when this creator's scope ends.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        self.scope.on_cleanup(f);
    }

    /// Ends the scope: listeners and bindings of the created elements are
    /// removed.  The elements themselves stay in the page.
    pub fn cleanup(&self) {
        self.scope.end();
    }
}

fn id_expression(id: &str) -> String {
    format!("document.getElementById({})", js_string(id))
}

fn collect_attributes<I, K, V>(attributes: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    attributes
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .filter(|(_, v)| !v.is_null())
        .collect()
}

fn validate_classes(classes: &[&str]) -> Result<(), DomError> {
    match classes.iter().find(|c| c.chars().any(char::is_whitespace)) {
        Some(bad) => Err(DomError::InvalidClassName(bad.to_string())),
        None => Ok(()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
