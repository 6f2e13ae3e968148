use std::fmt;

use crate::object::JsObject;

#[derive(Clone, Debug)]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(JsString),
    Object(JsObject),
}

/// Code units that count as WhiteSpace or LineTerminator. U+180E is not
/// whitespace; U+200B is not either.
pub const WHITESPACE: &[u16] = &[
    0x0009, 0x000A, 0x000B, 0x000C, 0x000D, 0x0020, 0x00A0, 0x1680, 0x2000, 0x2001, 0x2002, 0x2003,
    0x2004, 0x2005, 0x2006, 0x2007, 0x2008, 0x2009, 0x200A, 0x2028, 0x2029, 0x202F, 0x205F, 0x3000,
    0xFEFF,
];

// UTF-16 code unit string
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct JsString {
    pub code_units: Vec<u16>,
}

impl JsString {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self {
            code_units: s.encode_utf16().collect(),
        }
    }

    pub fn from_code_units(code_units: Vec<u16>) -> Self {
        Self { code_units }
    }

    pub fn is_empty(&self) -> bool {
        self.code_units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.code_units.len()
    }

    pub fn to_rust_string(&self) -> String {
        String::from_utf16_lossy(&self.code_units)
    }

    /// Strips [`WHITESPACE`] from both ends.
    pub fn trim(&self) -> JsString {
        let units = &self.code_units;
        let start = units.iter().position(|u| !WHITESPACE.contains(u)).unwrap_or(units.len());
        let end = units.iter().rposition(|u| !WHITESPACE.contains(u)).map_or(start, |i| i + 1);
        JsString::from_code_units(units[start..end].to_vec())
    }

    pub fn slice_utf16(&self, start: usize, end: usize) -> JsString {
        let s = start.min(self.code_units.len());
        let e = end.min(self.code_units.len());
        if s >= e {
            return JsString { code_units: vec![] };
        }
        JsString {
            code_units: self.code_units[s..e].to_vec(),
        }
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rust_string())
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString::from_str(s)
    }
}

impl JsValue {
    pub fn string(s: &str) -> Self {
        JsValue::String(JsString::from_str(s))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, JsValue::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsValue::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JsValue::Object(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, JsValue::Undefined | JsValue::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, JsValue::Object(o) if o.is_callable())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            JsValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsObject> {
        match self {
            JsValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Rust string for string values, `None` for everything else.
    pub fn as_rust_string(&self) -> Option<String> {
        match self {
            JsValue::String(s) => Some(s.to_rust_string()),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "object",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Object(o) if o.is_callable() => "function",
            JsValue::Object(_) => "object",
        }
    }
}

// Number type operations
pub mod number_ops {
    pub fn same_value(x: f64, y: f64) -> bool {
        if x.is_nan() && y.is_nan() {
            return true;
        }
        if x == 0.0 && y == 0.0 {
            return x.is_sign_positive() == y.is_sign_positive();
        }
        x == y
    }

    pub fn to_string(x: f64) -> String {
        if x.is_nan() {
            return "NaN".to_string();
        }
        if x == 0.0 {
            return "0".to_string();
        }
        if x.is_infinite() {
            return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }
        // shortest round-trip digits
        let mut buf = ryu_js::Buffer::new();
        buf.format(x).to_string()
    }

    pub fn to_integer_or_infinity(n: f64) -> f64 {
        if n.is_nan() || n == 0.0 {
            0.0
        } else if n.is_infinite() {
            n
        } else {
            n.trunc()
        }
    }
}

// ToBoolean
pub fn to_boolean(val: &JsValue) -> bool {
    match val {
        JsValue::Undefined | JsValue::Null => false,
        JsValue::Boolean(b) => *b,
        JsValue::Number(n) => *n != 0.0 && !n.is_nan(),
        JsValue::String(s) => !s.is_empty(),
        JsValue::Object(_) => true,
    }
}

// ToNumber, without invoking user-defined conversions on objects
pub fn to_number(val: &JsValue) -> f64 {
    match val {
        JsValue::Undefined => f64::NAN,
        JsValue::Null => 0.0,
        JsValue::Boolean(b) => *b as u8 as f64,
        JsValue::Number(n) => *n,
        JsValue::String(s) => string_to_number(s),
        JsValue::Object(o) => match o.primitive_value() {
            Some(JsValue::Object(_)) | None => f64::NAN,
            Some(prim) => to_number(&prim),
        },
    }
}

fn string_to_number(s: &JsString) -> f64 {
    let trimmed = s.trim().to_rust_string();
    let trimmed = trimmed.as_str();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf"/"nan" spellings that are not numeric literals here
        t if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        t => t.parse::<f64>().unwrap_or(f64::NAN),
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsValue::Undefined => write!(f, "undefined"),
            JsValue::Null => write!(f, "null"),
            JsValue::Boolean(b) => write!(f, "{b}"),
            JsValue::Number(n) => write!(f, "{}", number_ops::to_string(*n)),
            JsValue::String(s) => write!(f, "{s}"),
            JsValue::Object(o) => match o.primitive_value() {
                Some(JsValue::Object(_)) | None => {
                    if o.is_array() {
                        let parts: Vec<String> = o
                            .array_elements()
                            .iter()
                            .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                            .collect();
                        write!(f, "{}", parts.join(","))
                    } else {
                        write!(f, "[object {}]", o.class_name())
                    }
                }
                Some(prim) => write!(f, "{prim}"),
            },
        }
    }
}
