//! Worklist walk over a JSON tree
//!
//! Collects every value stored under a given key, at any depth, in the order
//! a recursive depth-first pre-order traversal would visit them. An explicit
//! stack bounds native stack use regardless of nesting depth.

use serde_json::Value;

enum Frame<'a> {
    /// A value whose children still have to be visited
    Node(&'a Value),
    /// A map entry: its key is checked before its value is descended into
    Entry(&'a str, &'a Value),
}

/// Values stored under `field` anywhere in `root`, in document order
///
/// A matching value that is itself a map or array is still descended into,
/// so nested copies of the field (e.g. inside an embedded sub-event) are
/// found too.
pub fn collect_field_values<'a>(root: &'a Value, field: &str) -> Vec<&'a Value> {
    let mut found = Vec::new();
    let mut stack = vec![Frame::Node(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Entry(key, value) => {
                if key == field {
                    found.push(value);
                }
                stack.push(Frame::Node(value));
            }
            Frame::Node(Value::Object(map)) => {
                // Reversed so the first entry is popped first
                for (key, value) in map.iter().rev() {
                    stack.push(Frame::Entry(key.as_str(), value));
                }
            }
            Frame::Node(Value::Array(items)) => {
                for item in items.iter().rev() {
                    stack.push(Frame::Node(item));
                }
            }
            Frame::Node(_) => {}
        }
    }

    found
}
