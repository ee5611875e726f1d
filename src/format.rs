//! Wire-format primitives shared by the encoder, decoder and stream encoder.
//!
//! ```text
//! @dict[#0:"Engineering", #1:"San Francisco"]
//!
//! @schema[id:int, name:str, dept:str, active:bool]
//! @defaults[active:true, dept:#0]
//!
//! employees(3):
//!   1, "Alice"
//!   2, "Bob", #1
//!   3, "Carol", , false
//! ```
//!
//! An empty slot between commas is a field elided because it equals the
//! table default; trailing elided fields are dropped from the row.

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{eof, opt},
    sequence::{delimited, tuple},
    IResult,
};

use crate::compression::Dictionary;
use crate::error::{AtonError, AtonResult};
use crate::schema::{Defaults, Schema, TableLayout};
use crate::value::{Number, Record, Value};

/// Indentation before every data row.
pub const ROW_INDENT: &str = "  ";

/// Escape a string for use between double quotes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape`]. Unknown escapes are kept verbatim.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn quote(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

/// Render one value as a literal.
///
/// Strings that are reference tokens of `dictionary` are written bare;
/// every other string is quoted.
pub fn render_value(value: &Value, dictionary: &Dictionary) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Number(n) => render_number(n),
        Value::String(s) if dictionary.contains_key(s) => s.clone(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(|v| render_value(v, dictionary)).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), render_value(v, dictionary)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Floats always carry a decimal point so they decode as floats.
fn render_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) => {
            let text = f.to_string();
            if text.contains('.') || !f.is_finite() {
                text
            } else {
                format!("{}.0", text)
            }
        }
        None => n.to_string(),
    }
}

/// `@dict[#0:"...", ...]`, keys in lexicographic order.
pub fn format_dictionary(dictionary: &Dictionary) -> String {
    let entries: Vec<String> = dictionary
        .iter()
        .map(|(reference, literal)| format!("{}:{}", reference, quote(literal)))
        .collect();
    format!("@dict[{}]", entries.join(", "))
}

/// Field names are written bare unless they would confuse entry splitting.
pub fn render_field_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name.trim() == name
        && !name.starts_with('#')
        && !name
            .chars()
            .any(|c| matches!(c, ',' | ':' | '"' | '\\' | '[' | ']' | '{' | '}' | '\n' | '\r'));
    if plain { name.to_string() } else { quote(name) }
}

/// Reverse [`render_field_name`].
pub fn parse_field_name(text: &str) -> String {
    let text = text.trim();
    if is_quoted(text, '"') {
        unescape(&text[1..text.len() - 1])
    } else {
        text.to_string()
    }
}

/// `@schema[field:type, ...]`, in column order.
pub fn format_schema(schema: &Schema) -> String {
    let fields: Vec<String> = schema
        .iter()
        .map(|(name, tag)| format!("{}:{}", render_field_name(name), tag))
        .collect();
    format!("@schema[{}]", fields.join(", "))
}

/// `@defaults[field:value, ...]`, fields in lexicographic order.
pub fn format_defaults(defaults: &Defaults, dictionary: &Dictionary) -> String {
    let entries: Vec<String> = defaults
        .iter()
        .map(|(field, value)| {
            format!("{}:{}", render_field_name(field), render_value(value, dictionary))
        })
        .collect();
    format!("@defaults[{}]", entries.join(", "))
}

/// `name(count):`, or `name+(count):` for a continuation block.
pub fn format_table_header(name: &str, count: usize, continuation: bool) -> String {
    let plus = if continuation { "+" } else { "" };
    format!("{}{}({}):", name, plus, count)
}

/// Render one record as a row, in schema order, eliding default values.
pub fn format_row(record: &Record, layout: &TableLayout, dictionary: &Dictionary) -> String {
    if layout.schema.is_empty() {
        return "{}".to_string();
    }

    let mut slots: Vec<Option<String>> = layout
        .schema
        .iter()
        .map(|(field, _)| {
            let value = record.get(field).unwrap_or(&Value::Null);
            if layout.is_default(field, value) {
                None
            } else {
                Some(render_value(value, dictionary))
            }
        })
        .collect();

    while matches!(slots.last(), Some(None)) {
        slots.pop();
    }

    // a fully elided row still needs one visible slot
    if slots.is_empty() {
        let (field, _) = &layout.schema[0];
        let value = record.get(field).unwrap_or(&Value::Null);
        return render_value(value, dictionary);
    }

    slots
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    Normal,
    InQuote,
    Escaped,
}

/// Split `text` on top-level commas.
///
/// Commas inside double quotes or inside `[...]` / `{...}` do not split.
/// Parts are trimmed; empty parts are kept so elided slots keep their
/// position. Blank input yields no parts.
pub fn split_fields(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut state = SplitState::Normal;
    let mut depth: usize = 0;

    for c in text.chars() {
        match state {
            SplitState::Escaped => {
                current.push(c);
                state = SplitState::InQuote;
                continue;
            }
            SplitState::InQuote => {
                match c {
                    '\\' => state = SplitState::Escaped,
                    '"' => state = SplitState::Normal,
                    _ => {}
                }
                current.push(c);
                continue;
            }
            SplitState::Normal => {}
        }

        match c {
            '"' => state = SplitState::InQuote,
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    parts
}

/// Split `entry` at its first `:` outside double quotes.
pub fn split_pair(entry: &str) -> Option<(&str, &str)> {
    let mut in_quote = false;
    let mut escaped = false;
    for (i, c) in entry.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ':' if !in_quote => return Some((entry[..i].trim(), entry[i + 1..].trim())),
            _ => {}
        }
    }
    None
}

fn is_quoted(text: &str, quote: char) -> bool {
    text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote)
}

/// Parse one literal. Never fails: unrecognised text is returned as a string.
///
/// Bare `#N` tokens resolve through `dictionary` when present there.
pub fn parse_value(text: &str, dictionary: &Dictionary) -> Value {
    let text = text.trim();
    match text {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if is_quoted(text, '"') {
        return Value::String(unescape(&text[1..text.len() - 1]));
    }

    if text.starts_with('#') {
        return Value::String(dictionary.get(text).cloned().unwrap_or_else(|| text.to_string()));
    }

    if text.starts_with('[') && text.ends_with(']') {
        return Value::Array(
            split_fields(&text[1..text.len() - 1])
                .iter()
                .map(|item| {
                    let item = if is_quoted(item, '\'') {
                        &item[1..item.len() - 1]
                    } else {
                        item.as_str()
                    };
                    parse_value(item, dictionary)
                })
                .collect(),
        );
    }

    if text.starts_with('{') && text.ends_with('}') {
        if let Some(map) = parse_object(&text[1..text.len() - 1], dictionary) {
            return Value::Object(map);
        }
    }

    parse_number(text).unwrap_or_else(|| Value::String(text.to_string()))
}

fn parse_object(inner: &str, dictionary: &Dictionary) -> Option<Record> {
    let mut map = Record::new();
    for entry in split_fields(inner) {
        let (key, value) = split_pair(&entry)?;
        let key = match parse_value(key, dictionary) {
            Value::String(s) => s,
            _ => return None,
        };
        map.insert(key, parse_value(value, dictionary));
    }
    Some(map)
}

fn parse_number(text: &str) -> Option<Value> {
    if text.contains('.') {
        let f: f64 = text.parse().ok()?;
        return Number::from_f64(f).map(Value::Number);
    }
    text.parse::<i64>()
        .map(Value::from)
        .or_else(|_| text.parse::<u64>().map(Value::from))
        .ok()
}

/// A parsed table header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHeader<'a> {
    pub name: &'a str,
    pub count: usize,
    pub continuation: bool,
}

/// Whether a line has the shape of a table header, valid or not.
pub fn looks_like_header(line: &str) -> bool {
    !line.starts_with('@') && line.contains('(') && line.ends_with("):")
}

fn header(input: &str) -> IResult<&str, (&str, Option<char>, &str)> {
    let (input, (name, plus, count, _, _)) = tuple((
        take_while1(|c: char| c != '(' && c != '+' && !c.is_whitespace()),
        opt(char('+')),
        delimited(char('('), digit1, char(')')),
        char(':'),
        eof,
    ))(input)?;
    Ok((input, (name, plus, count)))
}

/// Parse `name(count):` or `name+(count):`. `Ok(None)` when the line has
/// another shape; an error when the count does not fit in `usize`.
pub fn parse_table_header(line: &str) -> AtonResult<Option<TableHeader<'_>>> {
    let Ok((_, (name, plus, count))) = header(line.trim()) else {
        return Ok(None);
    };
    Ok(Some(TableHeader {
        name,
        count: count.parse().map_err(AtonError::decoding_from)?,
        continuation: plus.is_some(),
    }))
}

/// Body of a `@name[...]` directive, or `None` when the brackets are missing.
pub fn directive_body<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    line.strip_prefix(name)?
        .trim_start()
        .strip_prefix('[')?
        .strip_suffix(']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeTag;
    use serde_json::json;

    fn dict(pairs: &[(&str, &str)]) -> Dictionary {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_split_plain_and_quoted() {
        assert_eq!(split_fields(r#"1, "a, b", 3"#), vec!["1", "\"a, b\"", "3"]);
    }

    #[test]
    fn test_split_escaped_quote() {
        assert_eq!(
            split_fields(r#""say \"hi, there\"", 2"#),
            vec![r#""say \"hi, there\"""#, "2"]
        );
    }

    #[test]
    fn test_split_nested_brackets() {
        assert_eq!(
            split_fields(r#"[1, [2, 3]], {"k": 1, "j": [4, 5]}, x"#),
            vec!["[1, [2, 3]]", r#"{"k": 1, "j": [4, 5]}"#, "x"]
        );
    }

    #[test]
    fn test_split_brackets_inside_quotes_ignored() {
        assert_eq!(split_fields(r#""[", 1"#), vec!["\"[\"", "1"]);
    }

    #[test]
    fn test_split_keeps_empty_slots() {
        assert_eq!(split_fields("1, , 3"), vec!["1", "", "3"]);
        assert!(split_fields("   ").is_empty());
    }

    #[test]
    fn test_escape_round_trip() {
        let raw = "a \"quoted\" \\ path\nnext\rline";
        assert_eq!(unescape(&escape(raw)), raw);
        assert_eq!(escape("say \"hi\""), r#"say \"hi\""#);
    }

    #[test]
    fn test_render_scalars() {
        let empty = Dictionary::new();
        assert_eq!(render_value(&Value::Null, &empty), "null");
        assert_eq!(render_value(&json!(true), &empty), "true");
        assert_eq!(render_value(&json!(42), &empty), "42");
        assert_eq!(render_value(&json!(2.0), &empty), "2.0");
        assert_eq!(render_value(&json!(1e20), &empty), "100000000000000000000.0");
        assert_eq!(render_value(&json!(0.25), &empty), "0.25");
        assert_eq!(render_value(&json!("x\"y"), &empty), r#""x\"y""#);
    }

    #[test]
    fn test_render_references_bare_only_when_known() {
        let d = dict(&[("#0", "Engineering")]);
        assert_eq!(render_value(&json!("#0"), &d), "#0");
        assert_eq!(render_value(&json!("#1"), &d), "\"#1\"");
    }

    #[test]
    fn test_render_composites() {
        let empty = Dictionary::new();
        assert_eq!(render_value(&json!(["a", 1, null]), &empty), r#"["a", 1, null]"#);
        assert_eq!(
            render_value(&json!({"k": [1], "s": "v"}), &empty),
            r#"{"k": [1], "s": "v"}"#
        );
    }

    #[test]
    fn test_parse_literals() {
        let d = dict(&[("#0", "Engineering")]);
        assert_eq!(parse_value("null", &d), Value::Null);
        assert_eq!(parse_value("false", &d), json!(false));
        assert_eq!(parse_value("-7", &d), json!(-7));
        assert_eq!(parse_value("3.50", &d), json!(3.5));
        assert_eq!(parse_value(r#""a \"b\"""#, &d), json!("a \"b\""));
        assert_eq!(parse_value("#0", &d), json!("Engineering"));
        assert_eq!(parse_value("#9", &d), json!("#9"));
        assert_eq!(parse_value("\"#0\"", &d), json!("#0"));
        assert_eq!(parse_value("bare words", &d), json!("bare words"));
        assert_eq!(parse_value("1.2.3", &d), json!("1.2.3"));
    }

    #[test]
    fn test_parse_arrays_and_objects() {
        let d = dict(&[("#0", "Engineering")]);
        assert_eq!(parse_value("[]", &d), json!([]));
        assert_eq!(parse_value("['a', 'b']", &d), json!(["a", "b"]));
        assert_eq!(parse_value(r#"[1, "x", #0, [2]]"#, &d), json!([1, "x", "Engineering", [2]]));
        assert_eq!(
            parse_value(r#"{"k": 1, "n": {"m": null}}"#, &d),
            json!({"k": 1, "n": {"m": null}})
        );
        assert_eq!(parse_value("{}", &d), json!({}));
        assert_eq!(parse_value("{oops}", &d), json!("{oops}"));
    }

    #[test]
    fn test_row_elides_defaults_positionally() {
        let layout = TableLayout {
            schema: vec![
                ("id".into(), TypeTag::Int),
                ("status".into(), TypeTag::Str),
                ("name".into(), TypeTag::Str),
                ("flag".into(), TypeTag::Bool),
            ],
            defaults: Defaults::from([
                ("status".to_string(), json!("active")),
                ("flag".to_string(), json!(true)),
            ]),
        };
        let empty = Dictionary::new();
        let rec = json!({"id": 1, "status": "active", "name": "x", "flag": true});
        assert_eq!(format_row(rec.as_object().unwrap(), &layout, &empty), r#"1, , "x""#);

        let rec = json!({"id": 2, "status": "gone", "name": "y", "flag": false});
        assert_eq!(
            format_row(rec.as_object().unwrap(), &layout, &empty),
            r#"2, "gone", "y", false"#
        );
    }

    #[test]
    fn test_fully_elided_row_keeps_first_field() {
        let layout = TableLayout {
            schema: vec![("status".into(), TypeTag::Str)],
            defaults: Defaults::from([("status".to_string(), json!("on"))]),
        };
        let rec = json!({"status": "on"});
        assert_eq!(
            format_row(rec.as_object().unwrap(), &layout, &Dictionary::new()),
            "\"on\""
        );
    }

    #[test]
    fn test_directive_lines() {
        let d = dict(&[("#1", "b\"q"), ("#0", "alpha")]);
        assert_eq!(format_dictionary(&d), r#"@dict[#0:"alpha", #1:"b\"q"]"#);
        assert_eq!(
            format_schema(&vec![("id".into(), TypeTag::Int), ("n".into(), TypeTag::Str)]),
            "@schema[id:int, n:str]"
        );
        let defaults = Defaults::from([("z".to_string(), json!(null)), ("a".to_string(), json!("#0"))]);
        assert_eq!(format_defaults(&defaults, &d), "@defaults[a:#0, z:null]");
        assert_eq!(directive_body("@schema[id:int]", "@schema"), Some("id:int"));
        assert_eq!(directive_body("@schema id:int", "@schema"), None);
    }

    #[test]
    fn test_headers() {
        assert_eq!(
            parse_table_header("products(12):").unwrap(),
            Some(TableHeader { name: "products", count: 12, continuation: false })
        );
        assert_eq!(
            parse_table_header("products+(3):").unwrap(),
            Some(TableHeader { name: "products", count: 3, continuation: true })
        );
        assert!(looks_like_header("bad name(x):"));
        assert_eq!(parse_table_header("bad name(x):").unwrap(), None);
        assert!(parse_table_header("t(99999999999999999999999999):").is_err());
        assert_eq!(format_table_header("t", 4, true), "t+(4):");
    }

    #[test]
    fn test_field_names_with_separators_are_quoted() {
        assert_eq!(render_field_name("price"), "price");
        assert_eq!(render_field_name("a:b"), r#""a:b""#);
        assert_eq!(render_field_name("x, y"), r#""x, y""#);
        assert_eq!(render_field_name(""), r#""""#);
        assert_eq!(render_field_name(" padded"), r#"" padded""#);

        let schema: Schema = vec![("a:b".to_string(), TypeTag::Int), ("c".to_string(), TypeTag::Str)];
        let line = format_schema(&schema);
        assert_eq!(line, r#"@schema["a:b":int, c:str]"#);
        let body = directive_body(&line, "@schema").unwrap();
        let names: Vec<String> = split_fields(body)
            .iter()
            .map(|entry| parse_field_name(split_pair(entry).unwrap().0))
            .collect();
        assert_eq!(names, vec!["a:b", "c"]);
    }

    #[test]
    fn test_split_pair_respects_quotes() {
        assert_eq!(split_pair(r#""a:b": 1"#), Some((r#""a:b""#, "1")));
        assert_eq!(split_pair("#0:\"x\""), Some(("#0", "\"x\"")));
        assert_eq!(split_pair("novalue"), None);
    }
}
