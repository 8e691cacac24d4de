//! Structured DOM instructions.
//!
//! An [`Instruction`] is a small DOM mutation that the client dispatcher can
//! apply without parsing any script.  Instructions address elements only by
//! their `id` attribute, never by a script expression, because a batch may be
//! queued and replayed against a document that has changed since the
//! instruction was built.
//!
//! # Wire shape
//!
//! Every instruction is a JSON object with a `type` discriminant and a
//! positional `parameters` array:
//!
//! ```json
//! {"type":"SetAttribute","parameters":["K3","href","/home"]}
//! {"type":"CreateElement","parameters":["li",{"class":"item"},"K7","K2",1]}
//! ```
//!
//! The positional layout is fixed by the browser-side dispatcher, so the
//! conversion goes through [`RawInstruction`] rather than a derived enum
//! representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::codec::CodecError;

/// A replay-safe DOM mutation addressed by element id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInstruction", into = "RawInstruction")]
pub enum Instruction {
    /// `document.getElementById(id).setAttribute(name, value)`.
    SetAttribute { id: String, name: String, value: Value },

    /// `document.getElementById(id).removeAttribute(name)`.
    RemoveAttribute { id: String, name: String },

    /// Creates `<tag>` with `attributes`, gives it `new_id`, and inserts it
    /// under `parent_id`.
    ///
    /// `position: Some(p)` inserts before the element child currently at
    /// index `p`; `None` appends.  On the wire `None` is `-1`.
    CreateElement {
        tag: String,
        attributes: Map<String, Value>,
        new_id: String,
        parent_id: String,
        position: Option<usize>,
    },

    /// Appends a text node.
    AddText { id: String, text: String },

    /// Replaces all children with a single text node (`textContent = text`).
    SetText { id: String, text: String },
}

impl Instruction {
    /// The wire discriminant of this instruction.
    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::SetAttribute { .. } => "SetAttribute",
            Instruction::RemoveAttribute { .. } => "RemoveAttribute",
            Instruction::CreateElement { .. } => "CreateElement",
            Instruction::AddText { .. } => "AddText",
            Instruction::SetText { .. } => "SetText",
        }
    }

    /// The id of the element this instruction must find in the document
    /// before it can be applied.  For `CreateElement` that is the parent.
    pub fn target_id(&self) -> &str {
        match self {
            Instruction::SetAttribute { id, .. }
            | Instruction::RemoveAttribute { id, .. }
            | Instruction::AddText { id, .. }
            | Instruction::SetText { id, .. } => id,
            Instruction::CreateElement { parent_id, .. } => parent_id,
        }
    }
}

/// Renders an attribute value the way `Element.setAttribute` stringifies it.
///
/// Strings are used verbatim; every other JSON value uses its JSON text
/// (`true`, `4`, `null`).
pub fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Wire representation ───────────────────────────────────────────────────────

/// The on-the-wire form of an [`Instruction`]: `{type, parameters}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInstruction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl From<Instruction> for RawInstruction {
    fn from(instruction: Instruction) -> Self {
        let kind = instruction.kind().to_string();
        let parameters = match instruction {
            Instruction::SetAttribute { id, name, value } => {
                vec![Value::String(id), Value::String(name), value]
            }
            Instruction::RemoveAttribute { id, name } => {
                vec![Value::String(id), Value::String(name)]
            }
            Instruction::CreateElement {
                tag,
                attributes,
                new_id,
                parent_id,
                position,
            } => vec![
                Value::String(tag),
                Value::Object(attributes),
                Value::String(new_id),
                Value::String(parent_id),
                match position {
                    Some(p) => Value::from(p as u64),
                    None => Value::from(-1),
                },
            ],
            Instruction::AddText { id, text } | Instruction::SetText { id, text } => {
                vec![Value::String(id), Value::String(text)]
            }
        };
        RawInstruction { kind, parameters }
    }
}

impl TryFrom<RawInstruction> for Instruction {
    type Error = CodecError;

    fn try_from(raw: RawInstruction) -> Result<Self, Self::Error> {
        let kind = raw.kind.as_str();
        let p = &raw.parameters;
        match kind {
            "SetAttribute" => Ok(Instruction::SetAttribute {
                id: string_param(kind, p, 0)?,
                name: string_param(kind, p, 1)?,
                value: p.get(2).cloned().ok_or_else(|| missing(kind, 2))?,
            }),
            "RemoveAttribute" => Ok(Instruction::RemoveAttribute {
                id: string_param(kind, p, 0)?,
                name: string_param(kind, p, 1)?,
            }),
            "CreateElement" => {
                let attributes = match p.get(1) {
                    Some(Value::Object(map)) => map.clone(),
                    Some(Value::Null) | None => Map::new(),
                    Some(other) => {
                        return Err(CodecError::BadParameter {
                            kind: kind.to_string(),
                            index: 1,
                            reason: format!("expected an object, got {other}"),
                        })
                    }
                };
                Ok(Instruction::CreateElement {
                    tag: string_param(kind, p, 0)?,
                    attributes,
                    new_id: string_param(kind, p, 2)?,
                    parent_id: string_param(kind, p, 3)?,
                    position: position_param(kind, p, 4)?,
                })
            }
            "AddText" => Ok(Instruction::AddText {
                id: string_param(kind, p, 0)?,
                text: string_param(kind, p, 1)?,
            }),
            "SetText" => Ok(Instruction::SetText {
                id: string_param(kind, p, 0)?,
                text: string_param(kind, p, 1)?,
            }),
            other => Err(CodecError::UnknownInstruction(other.to_string())),
        }
    }
}

fn missing(kind: &str, index: usize) -> CodecError {
    CodecError::BadParameter {
        kind: kind.to_string(),
        index,
        reason: "missing".to_string(),
    }
}

fn string_param(kind: &str, params: &[Value], index: usize) -> Result<String, CodecError> {
    match params.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(CodecError::BadParameter {
            kind: kind.to_string(),
            index,
            reason: format!("expected a string, got {other}"),
        }),
        None => Err(missing(kind, index)),
    }
}

/// Absent, `null`, and negative positions all mean "append".
fn position_param(kind: &str, params: &[Value], index: usize) -> Result<Option<usize>, CodecError> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) if v >= 0 => Ok(Some(v as usize)),
            Some(_) => Ok(None),
            None => Err(CodecError::BadParameter {
                kind: kind.to_string(),
                index,
                reason: format!("expected an integer, got {n}"),
            }),
        },
        Some(other) => Err(CodecError::BadParameter {
            kind: kind.to_string(),
            index,
            reason: format!("expected an integer, got {other}"),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_attribute_serializes_positionally() {
        // Arrange
        let instruction = Instruction::SetAttribute {
            id: "K1".to_string(),
            name: "href".to_string(),
            value: json!("/home"),
        };

        // Act
        let value = serde_json::to_value(&instruction).unwrap();

        // Assert
        assert_eq!(
            value,
            json!({"type": "SetAttribute", "parameters": ["K1", "href", "/home"]})
        );
    }

    #[test]
    fn test_create_element_without_position_encodes_minus_one() {
        let instruction = Instruction::CreateElement {
            tag: "li".to_string(),
            attributes: Map::new(),
            new_id: "K7".to_string(),
            parent_id: "K2".to_string(),
            position: None,
        };

        let value = serde_json::to_value(&instruction).unwrap();

        assert_eq!(value["parameters"][4], json!(-1));
    }

    #[test]
    fn test_create_element_negative_position_decodes_as_append() {
        let json = r#"{"type":"CreateElement","parameters":["p",{},"K9","K1",-5]}"#;

        let instruction: Instruction = serde_json::from_str(json).unwrap();

        match instruction {
            Instruction::CreateElement { position, .. } => assert_eq!(position, None),
            other => panic!("expected CreateElement, got {other:?}"),
        }
    }

    #[test]
    fn test_create_element_missing_position_decodes_as_append() {
        let json = r#"{"type":"CreateElement","parameters":["p",{"class":"x"},"K9","K1"]}"#;

        let instruction: Instruction = serde_json::from_str(json).unwrap();

        match instruction {
            Instruction::CreateElement {
                position,
                attributes,
                ..
            } => {
                assert_eq!(position, None);
                assert_eq!(attributes.get("class"), Some(&json!("x")));
            }
            other => panic!("expected CreateElement, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_instruction_type_is_rejected() {
        let raw = RawInstruction {
            kind: "Explode".to_string(),
            parameters: vec![],
        };

        let result = Instruction::try_from(raw);

        assert_eq!(
            result,
            Err(CodecError::UnknownInstruction("Explode".to_string()))
        );
    }

    #[test]
    fn test_wrong_parameter_type_is_rejected() {
        let raw = RawInstruction {
            kind: "SetText".to_string(),
            parameters: vec![json!(5), json!("hello")],
        };

        let result = Instruction::try_from(raw);

        assert!(matches!(
            result,
            Err(CodecError::BadParameter { index: 0, .. })
        ));
    }

    #[test]
    fn test_missing_parameter_is_rejected() {
        let raw = RawInstruction {
            kind: "RemoveAttribute".to_string(),
            parameters: vec![json!("K1")],
        };

        assert!(matches!(
            Instruction::try_from(raw),
            Err(CodecError::BadParameter { index: 1, .. })
        ));
    }

    #[test]
    fn test_target_id_of_create_element_is_parent() {
        let instruction = Instruction::CreateElement {
            tag: "div".to_string(),
            attributes: Map::new(),
            new_id: "child".to_string(),
            parent_id: "parent".to_string(),
            position: Some(0),
        };

        assert_eq!(instruction.target_id(), "parent");
    }

    #[test]
    fn test_attribute_text_stringifies_like_the_browser() {
        assert_eq!(attribute_text(&json!("plain")), "plain");
        assert_eq!(attribute_text(&json!(true)), "true");
        assert_eq!(attribute_text(&json!(4)), "4");
    }
}
