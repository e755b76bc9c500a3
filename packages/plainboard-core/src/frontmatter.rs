/// YAML front-matter codec.
///
/// Format:
/// ```markdown
/// ---
/// id: MKA-1
/// title: Fix login
/// ---
///
/// Free text body.
/// ```
/// Content without a leading `---` line has no front-matter and is all body.
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml_ng::{Mapping, Value};

const DELIMITER: &str = "---";

#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError {
    #[error("Front-matter block is not terminated")]
    Unterminated,

    #[error("No front-matter block")]
    Missing,

    #[error("Invalid front-matter YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

/// A parsed file: typed metadata plus free-text body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<T> {
    pub meta: T,
    pub body: String,
}

/// Split raw content into the YAML block (if any) and the body.
pub fn split(content: &str) -> Result<(Option<String>, String), FrontMatterError> {
    let normalized = content.replace("\r\n", "\n");
    let Some(rest) = normalized.strip_prefix("---\n") else {
        return Ok((None, normalize_body(&normalized)));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = rest[..offset].to_string();
            let body = normalize_body(&rest[offset + line.len()..]);
            return Ok((Some(yaml), body));
        }
        offset += line.len();
    }
    Err(FrontMatterError::Unterminated)
}

fn normalize_body(body: &str) -> String {
    body.trim_start_matches('\n').trim_end().to_string()
}

/// Parse a file into typed metadata. A file without front-matter is an error.
pub fn parse<T: DeserializeOwned>(content: &str) -> Result<Document<T>, FrontMatterError> {
    let (yaml, body) = split(content)?;
    let yaml = yaml.ok_or(FrontMatterError::Missing)?;
    let meta = if yaml.trim().is_empty() {
        serde_yaml_ng::from_value(Value::Mapping(Mapping::new()))?
    } else {
        serde_yaml_ng::from_str(&yaml)?
    };
    Ok(Document { meta, body })
}

/// The `id` declared in the front-matter, if there is one.
///
/// Only the id field is looked at, so files written by other tools with
/// unrelated metadata still resolve. Numeric ids are accepted.
pub fn declared_id(content: &str) -> Result<Option<String>, FrontMatterError> {
    let (yaml, _) = split(content)?;
    let Some(yaml) = yaml else {
        return Ok(None);
    };
    if yaml.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_yaml_ng::from_str(&yaml)?;
    let id = match value.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    Ok(id)
}

/// Serialize metadata and body into a single text blob.
pub fn render<T: Serialize>(meta: &T, body: &str) -> Result<String, FrontMatterError> {
    let yaml = serde_yaml_ng::to_string(meta)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    let body = body.trim();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body);
        out.push('\n');
    }
    Ok(out)
}
