//! JSON output serialization for runtime values.
//!
//! Values are rendered deterministically: object keys are sorted and
//! string escaping follows standard JSON rules. Trees, functions, and
//! packed values have no JSON form and render as null; flatten a tree
//! with [`crate::tree::plain`] before printing it.
//!
//! # Examples
//!
//! ```
//! use canopy_lang::Value;
//! use canopy_lang::output::{to_json, to_json_pretty};
//!
//! let value = Value::Integer(42);
//!
//! // Compact output
//! assert_eq!(to_json(&value), "42");
//!
//! // Pretty output (identical for simple values)
//! assert_eq!(to_json_pretty(&value), "42");
//! ```

use std::collections::BTreeMap;

use crate::value::Value;

pub struct JsonPrinter {
    pretty: bool,
}

impl JsonPrinter {
    pub fn new(pretty: bool) -> Self {
        JsonPrinter { pretty }
    }

    pub fn print(&self, value: &Value) -> String {
        self.print_value(value, 0)
    }

    fn print_value(&self, value: &Value, indent: usize) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::String(s) => format!("\"{}\"", self.escape_string(s)),
            Value::Array(arr) => self.print_array(arr, indent),
            Value::Object(obj) => self.print_object(obj, indent),
            // No JSON form; flatten trees first.
            Value::Tree(_) | Value::Function(_) | Value::Packed(_) => "null".to_string(),
        }
    }

    fn print_array(&self, arr: &[Value], indent: usize) -> String {
        if arr.is_empty() {
            return "[]".to_string();
        }

        if self.pretty {
            let mut result = "[\n".to_string();
            let items: Vec<String> = arr
                .iter()
                .map(|v| {
                    format!(
                        "{}{}",
                        self.indent(indent + 1),
                        self.print_value(v, indent + 1)
                    )
                })
                .collect();
            result.push_str(&items.join(",\n"));
            result.push('\n');
            result.push_str(&self.indent(indent));
            result.push(']');
            result
        } else {
            let items: Vec<String> = arr.iter().map(|v| self.print_value(v, indent)).collect();
            format!("[{}]", items.join(","))
        }
    }

    fn print_object(&self, obj: &BTreeMap<String, Value>, indent: usize) -> String {
        if obj.is_empty() {
            return "{}".to_string();
        }

        if self.pretty {
            let mut result = "{\n".to_string();
            let items: Vec<String> = obj
                .iter()
                .map(|(key, value)| {
                    format!(
                        "{}\"{}\": {}",
                        self.indent(indent + 1),
                        self.escape_string(key),
                        self.print_value(value, indent + 1)
                    )
                })
                .collect();
            result.push_str(&items.join(",\n"));
            result.push('\n');
            result.push_str(&self.indent(indent));
            result.push('}');
            result
        } else {
            let items: Vec<String> = obj
                .iter()
                .map(|(key, value)| {
                    format!(
                        "\"{}\":{}",
                        self.escape_string(key),
                        self.print_value(value, indent)
                    )
                })
                .collect();
            format!("{{{}}}", items.join(","))
        }
    }

    fn indent(&self, level: usize) -> String {
        "  ".repeat(level)
    }

    fn escape_string(&self, s: &str) -> String {
        s.chars()
            .flat_map(|c| match c {
                '"' => vec!['\\', '"'],
                '\\' => vec!['\\', '\\'],
                '\n' => vec!['\\', 'n'],
                '\r' => vec!['\\', 'r'],
                '\t' => vec!['\\', 't'],
                c if c.is_control() => format!("\\u{:04x}", c as u32).chars().collect(),
                c => vec![c],
            })
            .collect()
    }
}

/// Converts a value to its compact JSON string representation.
pub fn to_json(value: &Value) -> String {
    JsonPrinter::new(false).print(value)
}

/// Converts a value to pretty-printed JSON with 2-space indentation.
pub fn to_json_pretty(value: &Value) -> String {
    JsonPrinter::new(true).print(value)
}
