//! Instruction dispatcher: one place that decides how a DOM mutation reaches
//! the client.
//!
//! For every [`Mutation`], in priority order:
//!
//! 1. If the session has a shadow document, the mutation is applied to it.
//!    The session is not connected yet, so whatever step 2 or 3 produces is
//!    queued and replayed on hello; the shadow itself is never serialized.
//! 2. Otherwise, if the element has a stable id and the session is not
//!    catching outbound script, a structured [`Instruction`] is sent (for the
//!    mutations that have one).
//! 3. Otherwise a script is executed against the element's expression.
//!
//! Instructions are never produced while catching, so a caught build is
//! always pure script.

use serde_json::{Map, Value};
use tracing::debug;

use tether_core::protocol::attribute_text;
use tether_core::{DocumentError, DomTree, Instruction, NodeId};

use crate::application::error::DomError;
use crate::application::session::Session;

/// How an element is addressed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target<'a> {
    pub expr: &'a str,
    pub id: Option<&'a str>,
    pub tag: Option<&'a str>,
}

/// A DOM mutation that can be mirrored into the shadow document.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Mutation<'a> {
    SetAttribute { name: &'a str, value: &'a Value },
    RemoveAttribute { name: &'a str },
    SetText(&'a str),
    AddText(&'a str),
    SetInnerHtml(&'a str),
    AddClass(&'a str),
    RemoveClass(&'a str),
    RemoveChildren,
    RemoveChildAt(usize),
    Delete,
    DeleteIfExists,
    CreateElement {
        tag: &'a str,
        attributes: &'a Map<String, Value>,
        new_id: &'a str,
        position: Option<usize>,
    },
    SetStyle { property: &'a str, value: &'a str },
}

/// Delivers `mutation` along the first applicable path.
pub(crate) fn dispatch(session: &Session, target: &Target<'_>, mutation: &Mutation<'_>) -> Result<(), DomError> {
    if let Some(mirrored) = session.with_shadow_document(|doc| mirror(doc, target, mutation)) {
        mirrored?;
    }

    if let Some(id) = target.id {
        if !session.is_catching() {
            if let Some(instruction) = mutation.instruction(id) {
                session.send_instruction(instruction);
                return Ok(());
            }
        }
    }

    session.execute(&mutation.script(target.expr));
    Ok(())
}

/// Finds the shadow node for `target`: by id, else `<body>`/`<head>` by tag.
pub(crate) fn resolve(doc: &DomTree, target: &Target<'_>) -> Option<NodeId> {
    if let Some(id) = target.id {
        return doc.element_by_id(id);
    }
    match target.tag {
        Some("body") => Some(doc.body()),
        Some("head") => Some(doc.head()),
        _ => None,
    }
}

fn mirror(doc: &mut DomTree, target: &Target<'_>, mutation: &Mutation<'_>) -> Result<(), DomError> {
    match (resolve(doc, target), mutation) {
        (None, Mutation::DeleteIfExists) => Ok(()),
        (None, _) => match target.id {
            Some(id) => Err(DocumentError::UnknownElement(id.to_string()).into()),
            None => {
                debug!("shadow: {} has no id, delivering without mirroring", target.expr);
                Ok(())
            }
        },
        (Some(node), m) => m.apply(doc, node).map_err(DomError::from),
    }
}

impl Mutation<'_> {
    fn apply(&self, doc: &mut DomTree, node: NodeId) -> Result<(), DocumentError> {
        match *self {
            Mutation::SetAttribute { name, value } => doc.set_attribute(node, name, &attribute_text(value)),
            Mutation::RemoveAttribute { name } => doc.remove_attribute(node, name).map(|_| ()),
            Mutation::SetText(text) => doc.set_text(node, text),
            Mutation::AddText(text) => doc.append_text(node, text),
            Mutation::SetInnerHtml(html) => doc.set_inner_markup(node, html),
            Mutation::AddClass(class) => doc.add_class(node, class),
            Mutation::RemoveClass(class) => doc.remove_class(node, class),
            Mutation::RemoveChildren => doc.remove_children(node),
            Mutation::RemoveChildAt(position) => doc.remove_child_at(node, position),
            Mutation::Delete | Mutation::DeleteIfExists => doc.detach(node),
            Mutation::CreateElement {
                tag,
                attributes,
                new_id,
                position,
            } => {
                let child = doc.create_element(
                    tag,
                    attributes
                        .iter()
                        .filter(|(k, _)| k.as_str() != "id")
                        .map(|(k, v)| (k.clone(), attribute_text(v))),
                );
                doc.set_attribute(child, "id", new_id)?;
                doc.insert_child(node, child, position)
            }
            Mutation::SetStyle { property, value } => doc.set_style_property(node, property, value),
        }
    }

    /// The structured form, for the mutations that have one.
    fn instruction(&self, id: &str) -> Option<Instruction> {
        let id = id.to_string();
        match *self {
            Mutation::SetAttribute { name, value } => Some(Instruction::SetAttribute {
                id,
                name: name.to_string(),
                value: value.clone(),
            }),
            Mutation::RemoveAttribute { name } => Some(Instruction::RemoveAttribute {
                id,
                name: name.to_string(),
            }),
            Mutation::SetText(text) => Some(Instruction::SetText {
                id,
                text: text.to_string(),
            }),
            Mutation::AddText(text) => Some(Instruction::AddText {
                id,
                text: text.to_string(),
            }),
            Mutation::CreateElement {
                tag,
                attributes,
                new_id,
                position,
            } => Some(Instruction::CreateElement {
                tag: tag.to_string(),
                attributes: attributes.clone(),
                new_id: new_id.to_string(),
                parent_id: id,
                position,
            }),
            _ => None,
        }
    }

    /// The raw-script form, addressed by expression.
    fn script(&self, expr: &str) -> String {
        match *self {
            Mutation::SetAttribute { name, value } => {
                format!("{expr}.setAttribute({}, {});", js_string(name), js_value(value))
            }
            Mutation::RemoveAttribute { name } => format!("{expr}.removeAttribute({});", js_string(name)),
            Mutation::SetText(text) => format!("{expr}.textContent = {};", js_string(text)),
            Mutation::AddText(text) => {
                format!("{expr}.appendChild(document.createTextNode({}));", js_string(text))
            }
            Mutation::SetInnerHtml(html) => format!("{expr}.innerHTML = {};", js_string(html)),
            Mutation::AddClass(class) => format!("addClass({expr}, {});", js_string(class)),
            Mutation::RemoveClass(class) => format!("removeClass({expr}, {});", js_string(class)),
            Mutation::RemoveChildren => format!(
                "{{ const el = {expr}; if (el != null) {{ while (el.firstChild) {{ el.removeChild(el.firstChild); }} }} }}"
            ),
            Mutation::RemoveChildAt(position) => {
                format!("{{ const el = {expr}; el.removeChild(el.children[{position}]); }}")
            }
            Mutation::Delete => format!("{{ const el = {expr}; el.parentNode.removeChild(el); }}"),
            Mutation::DeleteIfExists => {
                format!("{{ const el = {expr}; if (el) {{ el.parentNode.removeChild(el); }} }}")
            }
            Mutation::CreateElement {
                tag,
                attributes,
                new_id,
                position,
            } => {
                let at = position.map(|p| p as i64).unwrap_or(-1);
                format!(
                    "{{ const e = document.createElement({tag}); e.setAttribute(\"id\", {id}); \
                     const a = {attrs}; for (const k in a) {{ if (k !== \"id\") {{ e.setAttribute(k, a[k]); }} }} \
                     const p = {expr}; const at = {at}; \
                     if (at > -1) {{ p.insertBefore(e, p.children[at] || null); }} else {{ p.appendChild(e); }} }}",
                    tag = js_string(tag),
                    id = js_string(new_id),
                    attrs = Value::Object(attributes.clone()),
                )
            }
            Mutation::SetStyle { property, value } => {
                format!("{expr}.style.setProperty({}, {});", js_string(property), js_string(value))
            }
        }
    }
}

/// A JavaScript string literal for `s`.
pub(crate) fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// A JavaScript literal for a JSON value.
pub(crate) fn js_value(v: &Value) -> String {
    v.to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
