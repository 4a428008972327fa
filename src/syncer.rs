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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PromoteError;
use crate::images::ImageMap;

/// Input document of the external image syncer.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncManifest {
    #[serde(rename = "targetContainerRegistry")]
    pub target_container_registry: String,
    #[serde(rename = "targetTag")]
    pub target_tag: String,
    pub sign: bool,
    pub images: Vec<SyncImage>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncImage {
    pub name: String,
    pub registry: String,
    pub tag: String,
}

impl SyncManifest {
    pub fn build(images: &ImageMap, target_registry: &str, target_tag: &str, sign: bool) -> Result<Self, PromoteError> {
        let mut entries = Vec::with_capacity(images.len());
        for image in images {
            for (field, value) in [("name", &image.name), ("registry", &image.registry), ("tag", &image.tag)] {
                if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
                    return Err(PromoteError::serialization(format!(
                        "{field} {value:?} of image {} found at {} contains invalid characters",
                        image.name, image.location
                    )));
                }
            }
            entries.push(SyncImage {
                name: image.name.clone(),
                registry: image.registry.clone(),
                tag: image.tag.clone(),
            });
        }

        Ok(Self {
            target_container_registry: target_registry.to_string(),
            target_tag: target_tag.to_string(),
            sign,
            images: entries,
        })
    }

    pub fn render(&self) -> Result<String, PromoteError> {
        serde_yml::to_string(self).map_err(|err| PromoteError::Serialization {
            reason: "cannot render yaml".to_string(),
            source: Some(Box::new(err)),
        })
    }
}

/// Renders the sync manifest for `images` and writes it to `sink` in one piece.
pub fn emit<W: Write>(
    images: &ImageMap,
    target_registry: &str,
    target_tag: &str,
    sign: bool,
    sink: &mut W,
) -> Result<SyncManifest, PromoteError> {
    let (manifest, document) = prepare(images, target_registry, target_tag, sign)?;
    write_document(&document, sink)?;

    log::debug!("emitted sync manifest with {} images", manifest.images.len());
    Ok(manifest)
}

/// Like [`emit`], but into the file at `path`. The file is only created once the manifest rendered.
pub fn emit_to_file(
    images: &ImageMap,
    target_registry: &str,
    target_tag: &str,
    sign: bool,
    path: &Path,
) -> Result<SyncManifest, PromoteError> {
    let (manifest, document) = prepare(images, target_registry, target_tag, sign)?;
    let file = File::create(path).map_err(|source| PromoteError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    write_document(&document, &mut BufWriter::new(file))?;

    log::debug!("wrote sync manifest with {} images to {}", manifest.images.len(), path.display());
    Ok(manifest)
}

fn prepare(
    images: &ImageMap,
    target_registry: &str,
    target_tag: &str,
    sign: bool,
) -> Result<(SyncManifest, String), PromoteError> {
    let manifest = SyncManifest::build(images, target_registry, target_tag, sign)?;
    let document = manifest.render()?;
    Ok((manifest, document))
}

fn write_document<W: Write>(document: &str, sink: &mut W) -> Result<(), PromoteError> {
    let write_err = |err: std::io::Error| PromoteError::Serialization {
        reason: "cannot write sync manifest".to_string(),
        source: Some(Box::new(err)),
    };
    sink.write_all(document.as_bytes()).map_err(write_err)?;
    sink.flush().map_err(write_err)
}
