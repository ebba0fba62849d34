//! Indented rendering of nested values.
//!
//! Used to print namespace descriptions returned by introspection:
//!
//! ```text
//! constants
//!   pi: 3
//! description: A namespace for arithmetic methods.
//! ```

use std::fmt::{self, Write};

use crate::value::Value;

/// Number of spaces added per nesting level.
const INDENT_STEP: usize = 2;

/// Writes `value` as an indented tree.
///
/// Dictionaries print one line per key, lists one line per index. Only
/// `Dict` and `List` recurse; scalars are printed inline after their key.
pub fn write_tree<W: Write>(out: &mut W, value: &Value, indent: usize) -> fmt::Result {
    match value {
        Value::Dict(entries) => {
            for (key, child) in entries {
                write_entry(out, key, child, indent)?;
            }
            Ok(())
        }
        Value::List(items) => {
            for (index, child) in items.iter().enumerate() {
                write_entry(out, &format!("[{}]", index), child, indent)?;
            }
            Ok(())
        }
        Value::Int32(_) | Value::String(_) | Value::Error(_) => {
            pad(out, indent)?;
            write_scalar(out, value)?;
            out.write_char('\n')
        }
    }
}

fn write_entry<W: Write>(out: &mut W, key: &str, value: &Value, indent: usize) -> fmt::Result {
    pad(out, indent)?;
    out.write_str(key)?;
    match value {
        Value::Dict(_) | Value::List(_) => {
            out.write_char('\n')?;
            write_tree(out, value, indent + INDENT_STEP)
        }
        Value::Int32(_) | Value::String(_) | Value::Error(_) => {
            out.write_str(": ")?;
            write_scalar(out, value)?;
            out.write_char('\n')
        }
    }
}

fn write_scalar<W: Write>(out: &mut W, value: &Value) -> fmt::Result {
    match value {
        Value::Int32(i) => write!(out, "{}", i),
        Value::String(s) => out.write_str(s),
        Value::Error(message) => write!(out, "error: {}", message),
        // Containers are handled by the callers.
        Value::Dict(_) | Value::List(_) => Ok(()),
    }
}

fn pad<W: Write>(out: &mut W, indent: usize) -> fmt::Result {
    for _ in 0..indent {
        out.write_char(' ')?;
    }
    Ok(())
}

/// [`Display`](fmt::Display) adapter rendering a value with [`write_tree`].
pub struct TreeDisplay<'a>(pub &'a Value);

impl fmt::Display for TreeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tree(f, self.0, 0)
    }
}

impl Value {
    /// Returns a displayable indented tree of this value.
    pub fn tree(&self) -> TreeDisplay<'_> {
        TreeDisplay(self)
    }
}
