// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Grammar of `[registry/]name:tag` image references.
//!
//! The registry is everything in front of the last `/`, so `quay.io/foo/bar:v1` has the registry
//! `quay.io/foo` and the name `bar`. Promotion replaces the whole prefix with the target registry.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub registry: String,
    pub name: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognized {
    Reference(ParsedReference),
    /// Something that lives in an image field but is not a literal reference, e.g. a template.
    NotAReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    MissingTag,
    EmptyName,
    EmptyTag,
    Digest,
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::MissingTag => "image reference has no tag",
            Self::EmptyName => "image reference has an empty name",
            Self::EmptyTag => "image reference has an empty tag",
            Self::Digest => "digest pinned image references cannot be retagged",
        };
        f.write_str(reason)
    }
}

/// Classifies the value of an image field. Without `require_tag` a missing tag reads as an empty one.
pub fn recognize(value: &str, require_tag: bool) -> Result<Recognized, ReferenceError> {
    if !looks_literal(value) {
        return Ok(Recognized::NotAReference);
    }
    if value.contains('@') {
        return Err(ReferenceError::Digest);
    }

    let (registry, last) = split_repository(value);
    let (name, tag) = match last.split_once(':') {
        Some((name, tag)) => (name, tag),
        None if require_tag => return Err(ReferenceError::MissingTag),
        None => (last, ""),
    };
    if name.is_empty() {
        return Err(ReferenceError::EmptyName);
    }
    if tag.is_empty() && last.contains(':') {
        return Err(ReferenceError::EmptyTag);
    }

    Ok(Recognized::Reference(ParsedReference {
        registry: registry.to_string(),
        name: name.to_string(),
        tag: tag.to_string(),
    }))
}

/// Recognizes the `repository` child of a structured image field, which carries no tag.
/// Returns the registry prefix and the name.
pub fn recognize_repository(value: &str) -> Result<Option<(String, String)>, ReferenceError> {
    if !looks_literal(value) {
        return Ok(None);
    }
    if value.contains('@') {
        return Err(ReferenceError::Digest);
    }
    let (registry, name) = split_repository(value);
    if name.is_empty() {
        return Err(ReferenceError::EmptyName);
    }
    Ok(Some((registry.to_string(), name.to_string())))
}

/// Splits at the last `/`. Ports in the registry (`localhost:5000/app`) stay with the registry.
fn split_repository(value: &str) -> (&str, &str) {
    match value.rsplit_once('/') {
        Some((registry, last)) => (registry, last),
        None => ("", value),
    }
}

pub fn looks_literal(value: &str) -> bool {
    !(value.is_empty()
        || is_null(value)
        || value.contains("{{")
        || value.contains("${")
        || value.starts_with(['{', '[', '*', '&', '!', '|', '>'])
        || value.chars().any(char::is_whitespace))
}

/// YAML spellings of null, used to leave an image override unset.
pub fn is_null(value: &str) -> bool {
    matches!(value, "~" | "null" | "Null" | "NULL")
}

/// Joins a registry, a name and a tag. Empty registry or tag parts are left out.
pub fn render(registry: &str, name: &str, tag: &str) -> String {
    let mut out = String::with_capacity(registry.len() + name.len() + tag.len() + 2);
    if !registry.is_empty() {
        out.push_str(registry);
        out.push('/');
    }
    out.push_str(name);
    if !tag.is_empty() {
        out.push(':');
        out.push_str(tag);
    }
    out
}
