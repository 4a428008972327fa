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

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::PromoteError;

/// Image names that are neither rewritten nor reported.
#[derive(Debug, Default, Clone)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    /// Reads one image name per line. Blank lines and lines starting with `#` are skipped.
    /// An empty path yields an empty set without touching the filesystem.
    pub fn parse(path: &Path) -> Result<Self, PromoteError> {
        if path.as_os_str().is_empty() {
            return Ok(Self::default());
        }

        let read_err = |source| PromoteError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_err)?;

        let mut names = HashSet::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(read_err)?;
            let name = line.trim();
            if name.is_empty() || name.starts_with('#') {
                continue;
            }
            names.insert(name.to_string());
        }

        log::debug!("loaded {} excluded images from {}", names.len(), path.display());
        Ok(Self { names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
