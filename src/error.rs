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

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors of the promotion pipeline. Every one of them aborts the current run.
#[derive(Debug, Error)]
pub enum PromoteError {
    /// The excludes list could not be opened or read.
    #[error("cannot read excludes list {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The resources directory (or something inside it) could not be walked or read.
    #[error("cannot traverse {}", .path.display())]
    Traversal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A values file is not valid YAML or holds a malformed image reference.
    #[error("cannot parse {field} in {}: {reason}", .path.display())]
    Parse {
        path: PathBuf,
        field: String,
        reason: String,
    },

    /// A rewritten values file or the sync manifest file could not be written.
    #[error("cannot write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The sync manifest could not be built or written.
    #[error("cannot serialize sync manifest: {reason}")]
    Serialization {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PromoteError {
    pub fn parse(path: &Path, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
            source: None,
        }
    }
}
