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

//! Locates image fields in Helm values files.
//!
//! Rewriting has to keep comments, quoting and ordering of the file intact, so instead of
//! round-tripping through a YAML value this walks the text line by line, tracks the key path from
//! the indentation and reports the byte span of every scalar value.

use std::fmt;
use std::ops::Range;
use std::path::Path;

use serde::Deserialize;

use crate::error::PromoteError;

const IMAGE_KEY: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Item(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    pub fn parent(&self) -> FieldPath {
        FieldPath(self.0[..self.0.len().saturating_sub(1)].to_vec())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Item(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A scalar value together with the byte range it occupies in the file.
/// For quoted values the range covers the text between the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarField {
    /// Ordinal of the YAML document the value belongs to, counting `---`/`...` markers.
    pub document: usize,
    pub path: FieldPath,
    pub value: String,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageField {
    /// `image: registry/name:tag`
    Scalar(ScalarField),
    /// `image:` with `registry`, `repository` and `tag` children
    Mapping {
        path: FieldPath,
        registry: Option<ScalarField>,
        repository: ScalarField,
        tag: Option<ScalarField>,
    },
}

impl ImageField {
    pub fn path(&self) -> &FieldPath {
        match self {
            Self::Scalar(field) => &field.path,
            Self::Mapping { path, .. } => path,
        }
    }
}

/// Checks that every document in the file is valid YAML.
pub fn validate(path: &Path, content: &str) -> Result<(), PromoteError> {
    for document in serde_yml::Deserializer::from_str(content) {
        serde_yml::Value::deserialize(document)
            .map_err(|err| PromoteError::parse(path, "document", format!("cannot parse yaml file: {err}")))?;
    }
    Ok(())
}

/// Returns the image fields of a values file in the order they appear.
pub fn image_fields(content: &str) -> Vec<ImageField> {
    let mut fields: Vec<(usize, ImageField)> = Vec::new();
    // keyed by document and parent path, so equal paths in different documents stay apart
    let mut groups: Vec<(usize, usize, FieldPath, Vec<ScalarField>)> = Vec::new();

    for scalar in scalars(content) {
        if scalar.path.last_key() == Some(IMAGE_KEY) {
            fields.push((scalar.span.start, ImageField::Scalar(scalar)));
            continue;
        }

        let parent = scalar.path.parent();
        if parent.last_key() != Some(IMAGE_KEY)
            || !matches!(scalar.path.last_key(), Some("registry" | "repository" | "tag"))
        {
            continue;
        }
        let document = scalar.document;
        match groups.iter_mut().find(|(_, doc, path, _)| *doc == document && *path == parent) {
            Some((_, _, _, children)) => children.push(scalar),
            None => groups.push((scalar.span.start, document, parent, vec![scalar])),
        }
    }

    for (position, _, path, children) in groups {
        let mut registry = None;
        let mut repository = None;
        let mut tag = None;
        for child in children {
            match child.path.last_key() {
                Some("registry") => registry = Some(child),
                Some("repository") => repository = Some(child),
                Some("tag") => tag = Some(child),
                _ => {},
            }
        }
        // e.g. `image: {pullPolicy: Always}` style blocks without a repository
        let Some(repository) = repository else {
            continue;
        };
        fields.push((position, ImageField::Mapping {
            path,
            registry,
            repository,
            tag,
        }));
    }

    fields.sort_by_key(|(position, _)| *position);
    fields.into_iter().map(|(_, field)| field).collect()
}

struct Frame {
    column: usize,
    segment: Segment,
}

/// Returns every `key: value` scalar of the file with its full key path.
pub fn scalars(content: &str) -> Vec<ScalarField> {
    let mut fields = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    // lines indented deeper than this column belong to a block scalar
    let mut block_column: Option<usize> = None;
    let mut document = 0;
    let mut offset = 0;

    for raw in content.split_inclusive('\n') {
        let line_start = offset;
        offset += raw.len();
        let line = raw.trim_end_matches(['\n', '\r']);
        let trimmed = line.trim_start_matches(' ');
        let indent = line.len() - trimmed.len();

        if let Some(column) = block_column {
            if trimmed.is_empty() || indent > column {
                continue;
            }
            block_column = None;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if indent == 0 && is_document_marker(trimmed) {
            stack.clear();
            document += 1;
            continue;
        }

        let mut column = indent;
        let mut rest = trimmed;
        while rest == "-" || rest.starts_with("- ") {
            while stack.last().is_some_and(|frame| frame.column > column) {
                stack.pop();
            }
            let next_item = match stack.last() {
                Some(Frame {
                    column: c,
                    segment: Segment::Item(i),
                }) if *c == column => Some(i + 1),
                _ => None,
            };
            let index = match next_item {
                Some(index) => {
                    stack.pop();
                    index
                },
                None => 0,
            };
            stack.push(Frame {
                column,
                segment: Segment::Item(index),
            });

            let after = &rest[1..];
            let skipped = 1 + after.len() - after.trim_start_matches(' ').len();
            column += skipped;
            rest = &rest[skipped..];
        }

        let Some((key, after_colon)) = split_key(rest) else {
            continue;
        };
        while stack.last().is_some_and(|frame| frame.column >= column) {
            stack.pop();
        }

        let value = strip_properties(after_colon.trim_start_matches(' '));
        if value.is_empty() || value.starts_with('#') {
            stack.push(Frame {
                column,
                segment: Segment::Key(key),
            });
            continue;
        }
        if value.starts_with(['|', '>']) {
            block_column = Some(column);
            continue;
        }

        let value_start = line_start + line.len() - value.len();
        let Some((text, span)) = scalar_span(value) else {
            continue;
        };

        let mut segments: Vec<Segment> = stack.iter().map(|frame| frame.segment.clone()).collect();
        segments.push(Segment::Key(key));
        fields.push(ScalarField {
            document,
            path: FieldPath(segments),
            value: text.to_string(),
            span: value_start + span.start..value_start + span.end,
        });
    }

    fields
}

fn is_document_marker(line: &str) -> bool {
    ["---", "..."]
        .iter()
        .any(|marker| line == *marker || line.starts_with(&format!("{marker} ")))
}

/// Splits `key: value` (or `key:`) into the key and everything after the colon.
fn split_key(rest: &str) -> Option<(String, &str)> {
    if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
        let close = rest[1..].find(quote)? + 1;
        let after = rest[close + 1..].trim_start_matches(' ');
        let after = after.strip_prefix(':')?;
        if !(after.is_empty() || after.starts_with(' ')) {
            return None;
        }
        return Some((rest[1..close].to_string(), after));
    }

    if rest.starts_with(['{', '[', '#', '&', '*', '!', '?']) {
        return None;
    }
    let colon = match rest.find(": ") {
        Some(colon) => colon,
        None if rest.ends_with(':') => rest.len() - 1,
        None => return None,
    };
    let key = rest[..colon].trim_end();
    if key.is_empty() || key.contains(" #") {
        return None;
    }
    Some((key.to_string(), &rest[colon + 1..]))
}

/// Drops leading anchors (`&name`) and tags (`!!str`) from a value.
fn strip_properties(mut value: &str) -> &str {
    while value.starts_with(['&', '!']) {
        value = match value.find(' ') {
            Some(space) => value[space..].trim_start_matches(' '),
            None => "",
        };
    }
    value
}

/// Returns the scalar text and its range relative to `value`, without quotes or trailing comment.
fn scalar_span(value: &str) -> Option<(&str, Range<usize>)> {
    match value.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            // unterminated quotes continue on the next line; those are left alone
            let close = value[1..].find(quote)? + 1;
            Some((&value[1..close], 1..close))
        },
        _ => {
            let end = value.find(" #").unwrap_or(value.len());
            let text = value[..end].trim_end();
            Some((text, 0..text.len()))
        },
    }
}
