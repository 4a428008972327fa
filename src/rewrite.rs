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

use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::error::PromoteError;
use crate::excludes::ExclusionSet;
use crate::helm_config::{self, ImageField, ScalarField};
use crate::images::{ImageReference, SourceLocation};
use crate::reference::{self, Recognized, ReferenceError};
use crate::walk::{Classifier, Scope};

/// What to do with the tag of a reference when the target tag is empty.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum EmptyTagPolicy {
    /// Keep the tag the reference already has.
    #[default]
    KeepOriginal,
    /// Write the empty tag, leaving references untagged.
    Clear,
}

/// Registry and tag images are promoted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    registry: String,
    tag: String,
    empty_tag: EmptyTagPolicy,
}

impl Target {
    /// Trailing slashes are stripped from the registry.
    pub fn new(registry: &str, tag: &str, empty_tag: EmptyTagPolicy) -> Self {
        Self {
            registry: registry.trim_end_matches('/').to_string(),
            tag: tag.to_string(),
            empty_tag,
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn clears_tags(&self) -> bool {
        self.tag.is_empty() && self.empty_tag == EmptyTagPolicy::Clear
    }

    fn resolve_tag<'a>(&'a self, original: &'a str) -> &'a str {
        if self.tag.is_empty() && self.empty_tag == EmptyTagPolicy::KeepOriginal {
            original
        } else {
            &self.tag
        }
    }
}

pub struct RewriteOptions<'a> {
    pub target: &'a Target,
    pub dry_run: bool,
    pub excludes: &'a ExclusionSet,
    pub classifier: &'a dyn Classifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub scope: Scope,
    pub image: ImageReference,
}

#[derive(Debug)]
pub struct Rewrite {
    pub content: String,
    pub rewritten: bool,
    pub discovered: Vec<Discovered>,
}

#[derive(Debug)]
pub struct FileRewrite {
    pub rewritten: bool,
    pub discovered: Vec<Discovered>,
}

/// Promotes the images of a values file, writing it back unless this is a dry run.
pub fn rewrite_file(path: &Path, options: &RewriteOptions<'_>) -> Result<FileRewrite, PromoteError> {
    let content = fs::read_to_string(path).map_err(|source| PromoteError::Traversal {
        path: path.to_path_buf(),
        source,
    })?;
    let rewrite = rewrite_content(path, &content, options)?;

    if rewrite.rewritten {
        if options.dry_run {
            log::info!("would rewrite {} (dry run)", path.display());
        } else {
            fs::write(path, &rewrite.content).map_err(|source| PromoteError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            log::info!("rewrote {}", path.display());
        }
    }

    Ok(FileRewrite {
        rewritten: rewrite.rewritten,
        discovered: rewrite.discovered,
    })
}

/// Promotes the images of one values file held in memory. Only the bytes of image values change.
pub fn rewrite_content(path: &Path, content: &str, options: &RewriteOptions<'_>) -> Result<Rewrite, PromoteError> {
    helm_config::validate(path, content)?;

    let target = options.target;
    let mut edits = Edits::default();
    let mut discovered = Vec::new();

    for field in helm_config::image_fields(content) {
        let field_name = field.path().to_string();
        let parse_err = |err: ReferenceError| PromoteError::parse(path, field_name.clone(), err.to_string());

        let (name, original, tag) = match &field {
            ImageField::Scalar(scalar) => {
                let parsed = match reference::recognize(&scalar.value, !target.clears_tags()).map_err(parse_err)? {
                    Recognized::Reference(parsed) => parsed,
                    Recognized::NotAReference => {
                        log::debug!("skipping {field_name} in {}: not an image reference", path.display());
                        continue;
                    },
                };
                if options.excludes.contains(&parsed.name) {
                    log::debug!("skipping excluded image {} in {}", parsed.name, path.display());
                    continue;
                }

                let tag = target.resolve_tag(&parsed.tag).to_string();
                edits.replace(scalar, reference::render(target.registry(), &parsed.name, &tag));
                (parsed.name.clone(), scalar.value.clone(), tag)
            },
            ImageField::Mapping {
                registry,
                repository,
                tag,
                ..
            } => {
                let Some((prefix, name)) = reference::recognize_repository(&repository.value).map_err(parse_err)?
                else {
                    log::debug!("skipping {field_name} in {}: not an image reference", path.display());
                    continue;
                };
                let unset = |field: &ScalarField| field.value.is_empty() || reference::is_null(&field.value);
                if registry
                    .as_ref()
                    .is_some_and(|registry| !unset(registry) && !reference::looks_literal(&registry.value))
                {
                    log::debug!("skipping {field_name} in {}: templated registry", path.display());
                    continue;
                }
                // a null tag is the same as no tag at all
                let tag = tag.as_ref().filter(|tag| !reference::is_null(&tag.value));
                let original_tag = match tag {
                    Some(tag) if tag.value.is_empty() && !target.clears_tags() => {
                        return Err(parse_err(ReferenceError::EmptyTag));
                    },
                    Some(tag) if !tag.value.is_empty() && !reference::looks_literal(&tag.value) => {
                        log::debug!("skipping {field_name} in {}: templated tag", path.display());
                        continue;
                    },
                    Some(tag) => tag.value.as_str(),
                    None if target.clears_tags() => "",
                    None => return Err(parse_err(ReferenceError::MissingTag)),
                };
                if options.excludes.contains(&name) {
                    log::debug!("skipping excluded image {name} in {}", path.display());
                    continue;
                }

                let original_registry = match registry {
                    Some(registry) if unset(registry) => prefix.clone(),
                    Some(registry) if prefix.is_empty() => registry.value.clone(),
                    Some(registry) => format!("{}/{prefix}", registry.value),
                    None => prefix.clone(),
                };
                match registry {
                    Some(registry) => {
                        edits.replace(registry, target.registry().to_string());
                        edits.replace(repository, name.clone());
                    },
                    None => edits.replace(repository, reference::render(target.registry(), &name, "")),
                }

                let new_tag = target.resolve_tag(original_tag).to_string();
                if let Some(tag) = tag {
                    edits.replace_quoting_empty(content, tag, new_tag.clone());
                }
                let original = reference::render(&original_registry, &name, original_tag);
                (name, original, new_tag)
            },
        };

        log::debug!(
            "found {original} at {field_name} in {}, promoting to {}",
            path.display(),
            reference::render(target.registry(), &name, &tag)
        );
        let location = SourceLocation {
            file: path.to_path_buf(),
            field: field_name,
        };
        discovered.push(Discovered {
            scope: options.classifier.classify(&location),
            image: ImageReference {
                name,
                registry: target.registry().to_string(),
                tag,
                location,
            },
        });
    }

    let rewritten = !edits.is_empty();
    Ok(Rewrite {
        content: edits.apply(content),
        rewritten,
        discovered,
    })
}

/// Byte range replacements, only recorded when they change something.
#[derive(Default)]
struct Edits(Vec<(Range<usize>, String)>);

impl Edits {
    fn replace(&mut self, field: &ScalarField, text: String) {
        if field.value != text {
            self.0.push((field.span.clone(), text));
        }
    }

    /// An unquoted empty value would read back as null, so it is written as `""`.
    fn replace_quoting_empty(&mut self, content: &str, field: &ScalarField, text: String) {
        let quoted = field.span.start > 0 && matches!(content.as_bytes()[field.span.start - 1], b'"' | b'\'');
        if text.is_empty() && !quoted {
            self.0.push((field.span.clone(), "\"\"".to_string()));
        } else {
            self.replace(field, text);
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn apply(mut self, content: &str) -> String {
        let mut out = content.to_string();
        self.0.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));
        for (range, text) in self.0 {
            out.replace_range(range, &text);
        }
        out
    }
}
