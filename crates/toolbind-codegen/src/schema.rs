//! Schema-to-type compilation.
//!
//! The generator talks to schema compilation only through the
//! [`SchemaCompiler`] trait, so a different target language (or a
//! different Rust representation) can be swapped in behind one method.
//! The default [`RustSchemaCompiler`] turns a JSON Schema object into a
//! serde-derive struct, preserving the schema's required/optional field
//! structure exactly.

use serde_json::Value;
use toolbind_core::{Error, Result};

/// Compiles one schema into type source text.
pub trait SchemaCompiler: Send + Sync {
    /// Compiles `schema` into the source text of a type named `type_name`.
    fn compile(&self, schema: &Value, type_name: &str) -> Result<String>;
}

/// The default compiler: JSON Schema → Rust struct with serde derives.
///
/// Property types map to `String`, `i64`, `f64`, `bool`, `Vec<_>`; nested
/// objects and anything without a recognizable `type` stay
/// `serde_json::Value`. Optional fields (absent from `required`) become
/// `Option<T>` with serde defaults.
pub struct RustSchemaCompiler;

impl SchemaCompiler for RustSchemaCompiler {
    fn compile(&self, schema: &Value, type_name: &str) -> Result<String> {
        let obj = match schema {
            Value::Object(obj) => obj,
            Value::Null => return Ok(render_empty_struct(type_name)),
            other => {
                return Err(Error::Schema(format!(
                    "schema for '{type_name}' must be an object, got {other}"
                )))
            }
        };

        let declared_type = obj.get("type").and_then(Value::as_str);
        if declared_type == Some("object") || obj.get("properties").is_some() {
            return render_struct(obj, type_name);
        }

        match declared_type {
            Some(primitive) => Ok(format!(
                "pub type {type_name} = {};\n",
                map_type_name(primitive, obj.get("items"))
            )),
            None => Ok(format!("pub type {type_name} = serde_json::Value;\n")),
        }
    }
}

fn render_empty_struct(type_name: &str) -> String {
    format!(
        "#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]\npub struct {type_name} {{}}\n"
    )
}

fn render_struct(obj: &serde_json::Map<String, Value>, type_name: &str) -> Result<String> {
    let properties = match obj.get("properties") {
        Some(Value::Object(props)) => props,
        Some(other) => {
            return Err(Error::Schema(format!(
                "'properties' of '{type_name}' must be an object, got {other}"
            )))
        }
        None => return Ok(render_empty_struct(type_name)),
    };

    if properties.is_empty() {
        return Ok(render_empty_struct(type_name));
    }

    let required: Vec<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str("#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]\n");
    out.push_str(&format!("pub struct {type_name} {{\n"));

    // serde_json preserves insertion order only with a feature flag; sort
    // for deterministic output across regenerations.
    let mut names: Vec<&String> = properties.keys().collect();
    names.sort();

    for name in names {
        let prop = &properties[name.as_str()];
        if let Some(description) = prop.get("description").and_then(Value::as_str) {
            for line in description.lines() {
                out.push_str(&format!("    /// {}\n", line.trim_end()));
            }
        }

        let ident = field_ident(name);
        if ident != *name {
            out.push_str(&format!("    #[serde(rename = \"{name}\")]\n"));
        }

        let base = property_type(prop);
        if required.contains(&name.as_str()) {
            out.push_str(&format!("    pub {ident}: {base},\n"));
        } else {
            out.push_str("    #[serde(default, skip_serializing_if = \"Option::is_none\")]\n");
            out.push_str(&format!("    pub {ident}: Option<{base}>,\n"));
        }
    }

    out.push_str("}\n");
    Ok(out)
}

fn property_type(prop: &Value) -> String {
    map_type_name(
        prop.get("type").and_then(Value::as_str).unwrap_or(""),
        prop.get("items"),
    )
}

fn map_type_name(declared: &str, items: Option<&Value>) -> String {
    match declared {
        "string" => "String".to_string(),
        "integer" => "i64".to_string(),
        "number" => "f64".to_string(),
        "boolean" => "bool".to_string(),
        "array" => {
            let item = items.map_or_else(|| "serde_json::Value".to_string(), property_type);
            format!("Vec<{item}>")
        }
        // Nested objects, unions, and unrecognized types stay untyped.
        _ => "serde_json::Value".to_string(),
    }
}

/// Converts a schema property name to a legal Rust field identifier:
/// snake_case, non-alphanumerics folded to `_`, keywords suffixed.
pub fn field_ident(name: &str) -> String {
    let mut ident = String::with_capacity(name.len());
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                ident.push('_');
            }
            ident.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            ident.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !ident.ends_with('_') {
                ident.push('_');
            }
            prev_lower = false;
        }
    }
    if ident.is_empty() {
        ident.push('_');
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if is_keyword(&ident) {
        ident.push('_');
    }
    ident
}

/// Converts a short tool name to a PascalCase type-name stem.
pub fn type_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                stem.push(c.to_ascii_uppercase());
                upper_next = false;
            } else {
                stem.push(c);
            }
        } else {
            upper_next = true;
        }
    }
    if stem.is_empty() {
        stem.push_str("Tool");
    }
    if stem.starts_with(|c: char| c.is_ascii_digit()) {
        stem.insert(0, 'T');
    }
    stem
}

fn is_keyword(ident: &str) -> bool {
    matches!(
        ident,
        "as" | "async" | "await" | "box" | "break" | "const" | "continue" | "crate" | "dyn"
            | "else" | "enum" | "extern" | "false" | "fn" | "for" | "if" | "impl" | "in" | "let"
            | "loop" | "match" | "mod" | "move" | "mut" | "pub" | "ref" | "return" | "self"
            | "static" | "struct" | "super" | "trait" | "true" | "type" | "unsafe" | "use"
            | "where" | "while" | "yield"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn compile(schema: serde_json::Value, name: &str) -> String {
        RustSchemaCompiler.compile(&schema, name).unwrap()
    }

    #[test]
    fn test_required_and_optional_fields() {
        let source = compile(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File to read"},
                    "limit": {"type": "integer"},
                    "follow": {"type": "boolean"},
                },
                "required": ["path"],
            }),
            "ReadFileInput",
        );
        assert!(source.contains("pub struct ReadFileInput {"));
        assert!(source.contains("pub path: String,"));
        assert!(source.contains("pub limit: Option<i64>,"));
        assert!(source.contains("pub follow: Option<bool>,"));
        assert!(source.contains("/// File to read"));
        assert!(source.contains("skip_serializing_if = \"Option::is_none\""));
    }

    #[test]
    fn test_array_and_nested_object_types() {
        let source = compile(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "matrix": {"type": "array", "items": {"type": "array", "items": {"type": "number"}}},
                    "options": {"type": "object"},
                },
                "required": ["tags", "matrix", "options"],
            }),
            "SearchInput",
        );
        assert!(source.contains("pub tags: Vec<String>,"));
        assert!(source.contains("pub matrix: Vec<Vec<f64>>,"));
        assert!(source.contains("pub options: serde_json::Value,"));
    }

    #[test]
    fn test_camel_case_field_gets_renamed() {
        let source = compile(
            serde_json::json!({
                "type": "object",
                "properties": {"maxResults": {"type": "integer"}},
                "required": ["maxResults"],
            }),
            "QueryInput",
        );
        assert!(source.contains("#[serde(rename = \"maxResults\")]"));
        assert!(source.contains("pub max_results: i64,"));
    }

    #[test]
    fn test_keyword_field_gets_suffixed() {
        let source = compile(
            serde_json::json!({
                "type": "object",
                "properties": {"type": {"type": "string"}},
                "required": ["type"],
            }),
            "FilterInput",
        );
        assert!(source.contains("#[serde(rename = \"type\")]"));
        assert!(source.contains("pub type_: String,"));
    }

    #[test]
    fn test_empty_schema_degenerates_to_empty_struct() {
        let source = compile(
            serde_json::json!({"type": "object", "properties": {}}),
            "PingInput",
        );
        assert!(source.contains("pub struct PingInput {}"));
        assert!(source.contains("Default"));
    }

    #[test]
    fn test_null_schema_degenerates_to_empty_struct() {
        let source = compile(serde_json::Value::Null, "VoidInput");
        assert!(source.contains("pub struct VoidInput {}"));
    }

    #[test]
    fn test_primitive_top_level_schema_becomes_alias() {
        let source = compile(serde_json::json!({"type": "string"}), "NameOutput");
        assert_eq!(source, "pub type NameOutput = String;\n");
    }

    #[test]
    fn test_non_object_schema_is_schema_error() {
        let err = RustSchemaCompiler
            .compile(&serde_json::json!("nonsense"), "BadInput")
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_type_stem_conversion() {
        assert_eq!(type_stem("read_file"), "ReadFile");
        assert_eq!(type_stem("search-issues"), "SearchIssues");
        assert_eq!(type_stem("getUser"), "GetUser");
        assert_eq!(type_stem("2fa_check"), "T2faCheck");
    }

    #[test]
    fn test_field_ident_conversion() {
        assert_eq!(field_ident("maxResults"), "max_results");
        assert_eq!(field_ident("dry-run"), "dry_run");
        assert_eq!(field_ident("type"), "type_");
        assert_eq!(field_ident("2nd"), "_2nd");
    }
}
