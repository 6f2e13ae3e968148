use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::{JsonValue, MAX_DEPTH};
use crate::error::JsError;

/// Coarse structural check run before the reader: once escapes, scalar
/// tokens and opening brackets are removed, only punctuation and
/// whitespace may remain.
struct Prefilter {
    escapes: Regex,
    tokens: Regex,
    opens: Regex,
    residue: Regex,
}

static PREFILTER: LazyLock<Result<Prefilter, regex::Error>> = LazyLock::new(|| {
    Ok(Prefilter {
        escapes: Regex::new(r#"\\(?:["\\/bfnrt]|u[0-9a-fA-F]{4})"#)?,
        tokens: Regex::new(
            r#""[^"\\\n\r]*"|true|false|null|-?[0-9]+(?:\.[0-9]*)?(?:[eE][+\-]?[0-9]+)?"#,
        )?,
        opens: Regex::new(r"(?:^|:|,)(?:\s*\[)+")?,
        residue: Regex::new(r"^[\],:{}\s]*$")?,
    })
});

impl Prefilter {
    fn accepts(&self, text: &str) -> bool {
        let s = self.escapes.replace_all(text, "@");
        let s = self.tokens.replace_all(&s, "]");
        let s = self.opens.replace_all(&s, "");
        self.residue.is_match(&s)
    }
}

fn syntax_error(msg: impl Into<String>) -> JsError {
    JsError::syntax_error(msg)
}

/// Parses JSON text into a typed tree. Any malformed input is a
/// `SyntaxError`.
pub fn parse(text: &str) -> Result<JsonValue, JsError> {
    let prefilter = PREFILTER
        .as_ref()
        .map_err(|e| syntax_error(format!("JSON prefilter unavailable: {e}")))?;
    if !prefilter.accepts(text) {
        return Err(syntax_error("Unexpected token in JSON"));
    }
    let mut reader = Reader {
        bytes: text.as_bytes(),
        pos: 0,
        depth: 0,
    };
    reader.skip_ws();
    let value = reader.value()?;
    reader.skip_ws();
    if reader.pos != reader.bytes.len() {
        return Err(reader.error("Unexpected non-whitespace character after JSON"));
    }
    Ok(value)
}

/// Parses and then walks the tree bottom-up, replacing each member with
/// `reviver(key, value)`. `None` removes the member; array elements keep
/// their original index as key. `Ok(None)` when the root itself is removed.
pub fn parse_with_reviver<F>(text: &str, mut reviver: F) -> Result<Option<JsonValue>, JsError>
where
    F: FnMut(&str, JsonValue) -> Option<JsonValue>,
{
    let root = parse(text)?;
    Ok(revive("", root, &mut reviver))
}

fn revive<F>(key: &str, value: JsonValue, reviver: &mut F) -> Option<JsonValue>
where
    F: FnMut(&str, JsonValue) -> Option<JsonValue>,
{
    let walked = match value {
        JsonValue::Array(items) => JsonValue::Array(
            items
                .into_iter()
                .enumerate()
                .filter_map(|(i, v)| revive(&i.to_string(), v, reviver))
                .collect(),
        ),
        JsonValue::Object(members) => {
            let mut kept = IndexMap::with_capacity(members.len());
            for (k, v) in members {
                if let Some(v) = revive(&k, v, reviver) {
                    kept.insert(k, v);
                }
            }
            JsonValue::Object(kept)
        }
        scalar => scalar,
    };
    reviver(key, walked)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Reader<'_> {
    fn error(&self, msg: &str) -> JsError {
        syntax_error(format!("{msg} at position {}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), JsError> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("Expected '{}'", b as char)))
        }
    }

    fn literal(&mut self, word: &str, value: JsonValue) -> Result<JsonValue, JsError> {
        if self.bytes[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(self.error("Unexpected token in JSON"))
        }
    }

    fn value(&mut self) -> Result<JsonValue, JsError> {
        match self.peek() {
            Some(b'{') => self.nested(Self::object),
            Some(b'[') => self.nested(Self::array),
            Some(b'"') => self.string().map(JsonValue::String),
            Some(b't') => self.literal("true", JsonValue::Bool(true)),
            Some(b'f') => self.literal("false", JsonValue::Bool(false)),
            Some(b'n') => self.literal("null", JsonValue::Null),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(_) => Err(self.error("Unexpected token in JSON")),
            None => Err(self.error("Unexpected end of JSON input")),
        }
    }

    fn nested(
        &mut self,
        read: fn(&mut Self) -> Result<JsonValue, JsError>,
    ) -> Result<JsonValue, JsError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("JSON nesting too deep"));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn object(&mut self) -> Result<JsonValue, JsError> {
        self.expect(b'{')?;
        let mut members = IndexMap::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Object(members));
        }
        loop {
            self.skip_ws();
            if self.peek() != Some(b'"') {
                return Err(self.error("Expected property name"));
            }
            let key = self.string()?;
            self.skip_ws();
            self.expect(b':')?;
            self.skip_ws();
            let value = self.value()?;
            members.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(JsonValue::Object(members));
                }
                _ => return Err(self.error("Expected ',' or '}'")),
            }
        }
    }

    fn array(&mut self) -> Result<JsonValue, JsError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::Array(items));
        }
        loop {
            self.skip_ws();
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(JsonValue::Array(items));
                }
                _ => return Err(self.error("Expected ',' or ']'")),
            }
        }
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while let Some(b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
        self.pos - start
    }

    fn number(&mut self) -> Result<JsonValue, JsError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => {
                self.digits();
            }
            _ => return Err(self.error("No number after minus sign in JSON")),
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            if self.digits() == 0 {
                return Err(self.error("Unterminated fractional number in JSON"));
            }
        }
        if let Some(b'e' | b'E') = self.peek() {
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return Err(self.error("Exponent part is missing a number in JSON"));
            }
        }
        // the slice is ASCII by construction
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.error("Invalid number"))?;
        text.parse::<f64>()
            .map(JsonValue::Number)
            .map_err(|_| self.error("Invalid number"))
    }

    fn hex4(&mut self) -> Result<u16, JsError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| self.error("Bad Unicode escape in JSON"))?;
        let mut code = 0u16;
        for b in slice {
            let d = (*b as char)
                .to_digit(16)
                .ok_or_else(|| self.error("Bad Unicode escape in JSON"))?;
            code = code * 16 + d as u16;
        }
        self.pos += 4;
        Ok(code)
    }

    fn string(&mut self) -> Result<String, JsError> {
        self.expect(b'"')?;
        let mut units: Vec<u16> = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(self.error("Unterminated string in JSON"));
            };
            match b {
                b'"' => {
                    self.pos += 1;
                    return Ok(String::from_utf16_lossy(&units));
                }
                b'\\' => {
                    self.pos += 1;
                    let Some(esc) = self.peek() else {
                        return Err(self.error("Unterminated string in JSON"));
                    };
                    self.pos += 1;
                    let unit = match esc {
                        b'"' => 0x22,
                        b'\\' => 0x5c,
                        b'/' => 0x2f,
                        b'b' => 0x08,
                        b'f' => 0x0c,
                        b'n' => 0x0a,
                        b'r' => 0x0d,
                        b't' => 0x09,
                        b'u' => self.hex4()?,
                        _ => return Err(self.error("Bad escaped character in JSON")),
                    };
                    units.push(unit);
                }
                0x00..=0x1f => return Err(self.error("Bad control character in string literal")),
                _ => {
                    // copy one UTF-8 sequence
                    let rest = &self.bytes[self.pos..];
                    let width = utf8_width(b);
                    let chunk = rest
                        .get(..width)
                        .and_then(|c| std::str::from_utf8(c).ok())
                        .ok_or_else(|| self.error("Invalid UTF-8 in JSON string"))?;
                    units.extend(chunk.encode_utf16());
                    self.pos += width;
                }
            }
        }
    }
}

fn utf8_width(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}
