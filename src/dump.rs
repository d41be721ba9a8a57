//! Format instances for display (indented tree view).

use crate::instance::Instance;
use crate::value::Value;

/// Raw scalar string.
pub fn format_scalar(v: &Value) -> String {
    match v {
        Value::Unset => "<unset>".to_string(),
        Value::U8(x) => format!("{}", x),
        Value::I8(x) => format!("{}", x),
        Value::U16(x) => format!("{}", x),
        Value::I16(x) => format!("{}", x),
        Value::U32(x) => format!("{}", x),
        Value::I32(x) => format!("{}", x),
        Value::U64(x) => format!("{}", x),
        Value::I64(x) => format!("{}", x),
        Value::F64(x) => format!("{}", x),
        Value::Char(c) => {
            if c.is_ascii_graphic() || *c == b' ' {
                format!("'{}'", *c as char)
            } else {
                format!("0x{:02x}", c)
            }
        }
        other => format!("{:?}", other),
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|x| format!("{:02x}", x))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multi-line rendering of an instance: one field per line, nested
/// instances and arrays indented.
pub fn instance_to_dump(inst: &Instance, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let mut lines = vec![format!("{}{} {{", pad, inst.schema().name())];
    for (name, v) in inst.items() {
        let sub = value_to_dump(&v, indent + 1);
        lines.push(format!("{}  {}: {}", pad, name, sub.trim_start()));
    }
    lines.push(format!("{}}}", pad));
    lines.join("\n")
}

/// Rendering of a single value at the given indent.
pub fn value_to_dump(v: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match v {
        Value::Struct(inst) => instance_to_dump(inst, indent),
        Value::Array(elems) => {
            if elems.is_empty() {
                return format!("{}[]", pad);
            }
            // Byte-string arrays render as hex, not one line per byte.
            let chars: Option<Vec<u8>> = elems.iter().map(|e| e.as_char()).collect();
            if let Some(bytes) = chars {
                return format!("{}hex({})", pad, hex_string(&bytes));
            }
            let mut lines = vec![format!("{}[", pad)];
            for (i, item) in elems.iter().enumerate() {
                let sub = value_to_dump(item, indent + 1);
                lines.push(format!("{}  [{}] {}", pad, i, sub.trim_start()));
            }
            lines.push(format!("{}]", pad));
            lines.join("\n")
        }
        scalar => format!("{}{}", pad, format_scalar(scalar)),
    }
}
