//! YAML documents → generic `serde_json::Value` trees.

use metabase_serdes_model::MemberDocument;
use serde_json::Value;

/// Parse one exported YAML document.
///
/// Blank and comment-only documents are `Empty`, not parse errors. The YAML
/// tree is converted to `serde_json::Value` so every downstream rule works on
/// one generic tree type; YAML that has no JSON form (non-string map keys,
/// for instance) is a parse error.
pub fn parse_yaml_document(bytes: &[u8]) -> MemberDocument {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => return MemberDocument::ParseError(format!("not valid UTF-8: {err}")),
    };

    if text.trim().is_empty() {
        return MemberDocument::Empty;
    }

    let yaml: serde_yaml::Value = match serde_yaml::from_str(text) {
        Ok(value) => value,
        Err(err) => return MemberDocument::ParseError(err.to_string()),
    };

    match serde_json::to_value(yaml) {
        Ok(Value::Null) => MemberDocument::Empty,
        Ok(value) => MemberDocument::Parsed(value),
        Err(err) => MemberDocument::ParseError(format!("unsupported YAML structure: {err}")),
    }
}
