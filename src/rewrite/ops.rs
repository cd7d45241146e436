//! Content stream operation helpers

use lopdf::content::{Content, Operation};
use lopdf::Object;

use crate::error::Result;

/// Text-showing operators. These are the only operations the rewrite driver
/// never copies through.
pub fn is_text_showing(operator: &str) -> bool {
    matches!(operator, "Tj" | "TJ" | "'" | "\"")
}

/// One element of a text-showing operation's payload.
pub enum TextElement<'a> {
    /// Encoded string bytes drawn by the operation.
    Glyphs(&'a [u8]),
    /// Horizontal adjustment in thousandths of text-space units (`TJ` only).
    Adjust(f64),
}

/// The drawable elements of a text-showing operation, in drawing order.
/// `"` carries its string in operand position 2, after the word and
/// character spacing numbers.
pub fn text_elements(op: &Operation) -> Vec<TextElement<'_>> {
    match op.operator.as_str() {
        "Tj" | "'" => op
            .operands
            .first()
            .and_then(string_bytes)
            .map(|s| vec![TextElement::Glyphs(s)])
            .unwrap_or_default(),
        "\"" => op
            .operands
            .get(2)
            .and_then(string_bytes)
            .map(|s| vec![TextElement::Glyphs(s)])
            .unwrap_or_default(),
        "TJ" => match op.operands.first() {
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(|item| {
                    if let Some(s) = string_bytes(item) {
                        Some(TextElement::Glyphs(s))
                    } else {
                        number(item).map(TextElement::Adjust)
                    }
                })
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn string_bytes(object: &Object) -> Option<&[u8]> {
    match object {
        Object::String(bytes, _) => Some(bytes),
        _ => None,
    }
}

/// Numeric operand as f64, whichever of the two numeric object kinds it is.
pub fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Serialize a single operation the same way a whole stream is serialized,
/// so byte-for-byte comparison against re-encoded streams holds.
pub fn encode_operation(op: &Operation) -> Result<Vec<u8>> {
    let content = Content {
        operations: vec![op.clone()],
    };
    Ok(content.encode()?)
}

/// Serialize a sequence of operations into content stream bytes.
pub fn encode_operations(operations: Vec<Operation>) -> Result<Vec<u8>> {
    let content = Content { operations };
    Ok(content.encode()?)
}
