//! Arena-backed document tree.
//!
//! [`DomTree`] models just enough of the browser DOM for tether: elements
//! with attributes, text nodes, and opaque markup fragments (the result of an
//! `innerHTML` assignment, which the tree does not parse).
//!
//! # Child positions
//!
//! Positions passed to [`DomTree::insert_child`] and
//! [`DomTree::remove_child_at`] index *element* children only, the way
//! `parent.children[p]` does in the browser.  Text and markup nodes are
//! skipped when counting but keep their place in the full child list.
//!
//! # Node lifetime
//!
//! Nodes live in a `Vec<Option<Node>>`.  Detaching a node frees its whole
//! subtree, so a [`NodeId`] held across a detach may dangle; every accessor
//! checks and reports [`DocumentError::MissingNode`].

use std::collections::BTreeMap;

use thiserror::Error;

/// Index of a node inside one [`DomTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
    /// Unparsed markup set through `innerHTML`.
    Markup(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Errors from document operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// No element carries this `id` attribute.
    #[error("no element with id {0:?}")]
    UnknownElement(String),

    /// The node handle refers to a node that has been detached and freed.
    #[error("node {0:?} no longer exists")]
    MissingNode(NodeId),

    /// The operation needs an element but the node is text or markup.
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    /// `remove_child_at` named an index past the last element child.
    #[error("no element child at position {position}")]
    NoChildAt { position: usize },

    /// The document root cannot be detached.
    #[error("the document root cannot be removed")]
    RootRemoval,
}

/// An in-memory HTML document.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Creates the `<html><head></head><body></body></html>` skeleton.
    pub fn new() -> Self {
        let mut tree = DomTree {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
        };
        let root = tree.alloc(element_kind("html"));
        let head = tree.alloc(element_kind("head"));
        let body = tree.alloc(element_kind("body"));
        tree.link(root, head, None);
        tree.link(root, body, None);
        tree.root = root;
        tree.head = head;
        tree.body = body;
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Finds the first element in document order whose `id` attribute equals
    /// `id`.  Detached elements are not searched.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let Ok(node) = self.node(current) else {
                continue;
            };
            if let NodeKind::Element { attributes, .. } = &node.kind {
                if attributes.get("id").map(String::as_str) == Some(id) {
                    return Some(current);
                }
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Like [`element_by_id`](Self::element_by_id) but reports a miss as an error.
    pub fn require_id(&self, id: &str) -> Result<NodeId, DocumentError> {
        self.element_by_id(id)
            .ok_or_else(|| DocumentError::UnknownElement(id.to_string()))
    }

    pub fn contains(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.0), Some(Some(_)))
    }

    pub fn kind(&self, node: NodeId) -> Result<&NodeKind, DocumentError> {
        Ok(&self.node(node)?.kind)
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.node(node).ok()?.kind {
            NodeKind::Element { ref tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).ok()?.parent
    }

    /// All child nodes, including text and markup.
    pub fn children(&self, node: NodeId) -> Result<&[NodeId], DocumentError> {
        Ok(&self.node(node)?.children)
    }

    /// Element children only, in document order.
    pub fn element_children(&self, node: NodeId) -> Result<Vec<NodeId>, DocumentError> {
        Ok(self
            .node(node)?
            .children
            .iter()
            .copied()
            .filter(|c| matches!(self.nodes[c.0], Some(Node { kind: NodeKind::Element { .. }, .. })))
            .collect())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.node(node).ok()?.kind {
            NodeKind::Element { ref attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes (`textContent`).
    pub fn text_content(&self, node: NodeId) -> Result<String, DocumentError> {
        let mut out = String::new();
        self.collect_text(node, &mut out)?;
        Ok(out)
    }

    // ── Structure ────────────────────────────────────────────────────────────

    /// Creates a detached element.  Insert it with [`insert_child`](Self::insert_child).
    pub fn create_element<I, K, V>(&mut self, tag: &str, attributes: I) -> NodeId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.alloc(NodeKind::Element {
            tag: tag.to_string(),
            attributes,
        })
    }

    /// Inserts `child` under `parent`.
    ///
    /// `Some(p)` inserts before the element child currently at index `p`;
    /// `None`, or a `p` past the last element child, appends.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        position: Option<usize>,
    ) -> Result<(), DocumentError> {
        self.element_mut(parent)?;
        self.node(child)?;
        if let Some(old_parent) = self.node(child)?.parent {
            self.unlink(old_parent, child);
        }
        let before = match position {
            Some(p) => self.element_children(parent)?.get(p).copied(),
            None => None,
        };
        self.link(parent, child, before);
        Ok(())
    }

    /// Detaches `node` from its parent and frees its subtree.
    pub fn detach(&mut self, node: NodeId) -> Result<(), DocumentError> {
        if node == self.root {
            return Err(DocumentError::RootRemoval);
        }
        if let Some(parent) = self.node(node)?.parent {
            self.unlink(parent, node);
        }
        self.free(node);
        Ok(())
    }

    /// Removes every child node, text included.
    pub fn remove_children(&mut self, node: NodeId) -> Result<(), DocumentError> {
        let children = std::mem::take(&mut self.node_mut(node)?.children);
        for child in children {
            self.free(child);
        }
        Ok(())
    }

    /// Removes the element child at `position` (element-children index).
    pub fn remove_child_at(&mut self, node: NodeId, position: usize) -> Result<(), DocumentError> {
        let target = self
            .element_children(node)?
            .get(position)
            .copied()
            .ok_or(DocumentError::NoChildAt { position })?;
        self.detach(target)
    }

    // ── Content ──────────────────────────────────────────────────────────────

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DocumentError> {
        self.attributes_mut(node)?
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Returns whether the attribute was present.  Removing an absent
    /// attribute is not an error.
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<bool, DocumentError> {
        Ok(self.attributes_mut(node)?.remove(name).is_some())
    }

    /// `textContent = text`: all children are replaced by one text node,
    /// or by nothing when `text` is empty.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), DocumentError> {
        self.remove_children(node)?;
        if !text.is_empty() {
            let t = self.alloc(NodeKind::Text(text.to_string()));
            self.link(node, t, None);
        }
        Ok(())
    }

    /// Appends a text node.
    pub fn append_text(&mut self, node: NodeId, text: &str) -> Result<(), DocumentError> {
        self.element_mut(node)?;
        let t = self.alloc(NodeKind::Text(text.to_string()));
        self.link(node, t, None);
        Ok(())
    }

    /// `innerHTML = html`: children are replaced by one opaque markup node.
    pub fn set_inner_markup(&mut self, node: NodeId, html: &str) -> Result<(), DocumentError> {
        self.remove_children(node)?;
        if !html.is_empty() {
            let m = self.alloc(NodeKind::Markup(html.to_string()));
            self.link(node, m, None);
        }
        Ok(())
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().any(|t| t == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<(), DocumentError> {
        if self.has_class(node, class) {
            self.element_mut(node)?;
            return Ok(());
        }
        let attrs = self.attributes_mut(node)?;
        let updated = match attrs.get("class").map(|c| c.trim()) {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_string(),
        };
        attrs.insert("class".to_string(), updated);
        Ok(())
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<(), DocumentError> {
        let attrs = self.attributes_mut(node)?;
        if let Some(existing) = attrs.get("class") {
            let kept: Vec<&str> = existing.split_whitespace().filter(|t| *t != class).collect();
            let kept = kept.join(" ");
            attrs.insert("class".to_string(), kept);
        }
        Ok(())
    }

    /// Sets one inline style property, keeping the others.
    pub fn set_style_property(&mut self, node: NodeId, property: &str, value: &str) -> Result<(), DocumentError> {
        let attrs = self.attributes_mut(node)?;
        let mut declarations = parse_style(attrs.get("style").map(String::as_str).unwrap_or(""));
        match declarations.iter_mut().find(|(p, _)| p == property) {
            Some(slot) => slot.1 = value.to_string(),
            None => declarations.push((property.to_string(), value.to_string())),
        }
        attrs.insert("style".to_string(), render_style(&declarations));
        Ok(())
    }

    /// Reads one inline style property.
    pub fn style_property(&self, node: NodeId, property: &str) -> Option<String> {
        parse_style(self.attribute(node, "style")?)
            .into_iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Some(Node {
            kind,
            parent: None,
            children: Vec::new(),
        }));
        NodeId(self.nodes.len() - 1)
    }

    fn node(&self, id: NodeId) -> Result<&Node, DocumentError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(DocumentError::MissingNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DocumentError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(DocumentError::MissingNode(id))
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Node, DocumentError> {
        let node = self.node_mut(id)?;
        match node.kind {
            NodeKind::Element { .. } => Ok(node),
            _ => Err(DocumentError::NotAnElement(id)),
        }
    }

    fn attributes_mut(&mut self, id: NodeId) -> Result<&mut BTreeMap<String, String>, DocumentError> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => Ok(attributes),
            _ => Err(DocumentError::NotAnElement(id)),
        }
    }

    /// Links `child` under `parent`, before `before` when given.
    fn link(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        if let Some(Some(p)) = self.nodes.get_mut(parent.0) {
            let index = before
                .and_then(|b| p.children.iter().position(|c| *c == b))
                .unwrap_or(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(Some(c)) = self.nodes.get_mut(child.0) {
            c.parent = Some(parent);
        }
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) {
        if let Some(Some(p)) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != child);
        }
        if let Some(Some(c)) = self.nodes.get_mut(child.0) {
            c.parent = None;
        }
    }

    fn free(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(slot) = self.nodes.get_mut(next.0) {
                if let Some(node) = slot.take() {
                    stack.extend(node.children);
                }
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) -> Result<(), DocumentError> {
        let node = self.node(id)?;
        match &node.kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Markup(_) => {}
            NodeKind::Element { .. } => {
                for child in &node.children {
                    self.collect_text(*child, out)?;
                }
            }
        }
        Ok(())
    }
}

fn element_kind(tag: &str) -> NodeKind {
    NodeKind::Element {
        tag: tag.to_string(),
        attributes: BTreeMap::new(),
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (p, v) = decl.split_once(':')?;
            let p = p.trim();
            (!p.is_empty()).then(|| (p.to_string(), v.trim().to_string()))
        })
        .collect()
}

fn render_style(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(p, v)| format!("{p}: {v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
