//! YAML frontmatter parsing
//!
//! Resource files may begin with a `---` delimited YAML header. Everything after
//! the closing delimiter is the body. A file without an opening delimiter is all
//! body with default metadata.

use crate::error::{FrontmatterError, ResourceError};
use crucible_types::ResourceRef;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::fs;

const DELIMITER: &str = "---";

/// Default version when the header omits one
pub const DEFAULT_VERSION: &str = "1.0";

/// Structured metadata read from a resource header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMetadata {
    /// Display name override
    pub name: Option<String>,
    /// One-line description
    pub description: Option<String>,
    /// Resource version string
    pub version: String,
    /// Lowercase trigger keywords, deduplicated, declaration order kept
    pub triggers: Vec<String>,
    /// Applies to every review regardless of context
    pub always_run: bool,
    /// Lowercase domain names this resource always applies to
    pub always_run_for_domains: Vec<String>,
    /// Knowledge files this resource pulls in when it applies
    pub linked_knowledge: Vec<String>,
    /// Header keys this parser does not interpret, preserved for rendering
    #[serde(skip)]
    pub extra: Mapping,
    /// Text after the header
    #[serde(skip)]
    pub body: String,
}

impl Default for ResourceMetadata {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            version: DEFAULT_VERSION.to_string(),
            triggers: Vec::new(),
            always_run: false,
            always_run_for_domains: Vec::new(),
            linked_knowledge: Vec::new(),
            extra: Mapping::new(),
            body: String::new(),
        }
    }
}

impl ResourceMetadata {
    /// Whether any matching rule is declared
    pub fn has_match_rules(&self) -> bool {
        self.always_run || !self.always_run_for_domains.is_empty() || !self.triggers.is_empty()
    }

    /// Render the metadata and body back into a frontmatter document
    pub fn render(&self) -> Result<String, FrontmatterError> {
        let mut header = Mapping::new();
        if let Some(name) = &self.name {
            header.insert("name".into(), name.clone().into());
        }
        if let Some(description) = &self.description {
            header.insert("description".into(), description.clone().into());
        }
        header.insert("version".into(), self.version.clone().into());
        if !self.triggers.is_empty() {
            header.insert("triggers".into(), string_seq(&self.triggers));
        }
        if self.always_run {
            header.insert("always_run".into(), Value::Bool(true));
        }
        if !self.always_run_for_domains.is_empty() {
            header.insert(
                "always_run_for_domains".into(),
                string_seq(&self.always_run_for_domains),
            );
        }
        if !self.linked_knowledge.is_empty() {
            header.insert("knowledge".into(), string_seq(&self.linked_knowledge));
        }
        for (key, value) in &self.extra {
            header.insert(key.clone(), value.clone());
        }

        let yaml = serde_yaml::to_string(&Value::Mapping(header))?;
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{}", self.body))
    }
}

/// Parse a resource document into metadata plus body
pub fn parse(raw: &str) -> Result<ResourceMetadata, FrontmatterError> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok(ResourceMetadata::default());
    };
    if first.trim_end() != DELIMITER {
        return Ok(ResourceMetadata {
            body: text.to_string(),
            ..ResourceMetadata::default()
        });
    }

    let mut header = String::new();
    let mut consumed = first.len();
    let mut closed = false;
    for line in lines {
        consumed += line.len();
        if line.trim_end() == DELIMITER {
            closed = true;
            break;
        }
        header.push_str(line);
    }
    if !closed {
        return Err(FrontmatterError::Unclosed);
    }

    let body = text[consumed..].to_string();
    if header.trim().is_empty() {
        return Ok(ResourceMetadata {
            body,
            ..ResourceMetadata::default()
        });
    }
    let mapping = match serde_yaml::from_str::<Value>(&header)? {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        _ => return Err(FrontmatterError::NotAMapping),
    };

    let mut meta = from_mapping(&mapping)?;
    meta.body = body;
    Ok(meta)
}

/// Read and parse a resolved resource file
pub fn read_resource(resource: &ResourceRef) -> Result<ResourceMetadata, ResourceError> {
    let path = resource
        .path
        .as_ref()
        .ok_or_else(|| ResourceError::Unresolved(format!("{} '{}'", resource.kind, resource.name)))?;
    let raw = fs::read_to_string(path).map_err(|source| ResourceError::Read {
        path: path.clone(),
        source,
    })?;
    parse(&raw).map_err(|source| ResourceError::Parse {
        path: path.clone(),
        source,
    })
}

/// Interpret an already-parsed YAML header
///
/// Used for files whose header lives inside a larger YAML document.
pub fn from_mapping(mapping: &Mapping) -> Result<ResourceMetadata, FrontmatterError> {
    let mut meta = ResourceMetadata::default();

    for (key, value) in mapping {
        let Some(key_str) = key.as_str() else {
            meta.extra.insert(key.clone(), value.clone());
            continue;
        };
        match key_str {
            "name" => meta.name = optional_string(key_str, value)?,
            "description" => meta.description = optional_string(key_str, value)?,
            "version" => {
                if let Some(version) = optional_string(key_str, value)? {
                    meta.version = version;
                }
            }
            "triggers" => meta.triggers = lowercase_unique(string_list(key_str, value)?),
            "always_run" => meta.always_run = bool_field(key_str, value)?,
            "always_run_for_domains" => {
                meta.always_run_for_domains = lowercase_unique(string_list(key_str, value)?)
            }
            "knowledge" => meta.linked_knowledge = unique(string_list(key_str, value)?),
            _ => {
                meta.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(meta)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn optional_string(key: &str, value: &Value) -> Result<Option<String>, FrontmatterError> {
    match value {
        Value::Null => Ok(None),
        other => scalar_to_string(other)
            .map(Some)
            .ok_or_else(|| FrontmatterError::InvalidField {
                key: key.to_string(),
                expected: "a string",
            }),
    }
}

/// A list of scalars; a lone scalar is read as a one-element list
fn string_list(key: &str, value: &Value) -> Result<Vec<String>, FrontmatterError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| FrontmatterError::NonScalarList {
                    key: key.to_string(),
                })
            })
            .collect(),
        Value::Mapping(_) | Value::Tagged(_) => Err(FrontmatterError::NonScalarList {
            key: key.to_string(),
        }),
        scalar => Ok(scalar_to_string(scalar).into_iter().collect()),
    }
}

fn bool_field(key: &str, value: &Value) -> Result<bool, FrontmatterError> {
    let invalid = || FrontmatterError::InvalidField {
        key: key.to_string(),
        expected: "true or false",
    };
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

fn unique(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn lowercase_unique(items: Vec<String>) -> Vec<String> {
    unique(items.into_iter().map(|s| s.to_lowercase()).collect())
}

fn string_seq(items: &[String]) -> Value {
    Value::Sequence(items.iter().cloned().map(Value::String).collect())
}
