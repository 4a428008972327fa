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

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Where an image reference was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub field: String,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.field)
    }
}

/// A discovered image in its promoted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub name: String,
    pub registry: String,
    pub tag: String,
    pub location: SourceLocation,
}

/// Images keyed by name, kept in insertion order.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone)]
pub struct ImageMap {
    entries: Vec<ImageReference>,
    index: HashMap<String, usize>,
}

impl ImageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a reference under its name. An existing entry is replaced where it stands.
    pub fn set(&mut self, reference: ImageReference) {
        match self.index.get(&reference.name) {
            Some(&position) => self.entries[position] = reference,
            None => {
                self.index.insert(reference.name.clone(), self.entries.len());
                self.entries.push(reference);
            },
        }
    }

    /// Sets every entry of `src` into `self`, leaving `src` untouched.
    pub fn merge(&mut self, src: &ImageMap) {
        for reference in src.iter() {
            self.set(reference.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&ImageReference> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageReference> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ImageMap {
    type Item = &'a ImageReference;
    type IntoIter = std::slice::Iter<'a, ImageReference>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{ImageMap, ImageReference, SourceLocation};

    fn image(name: &str, tag: &str) -> ImageReference {
        ImageReference {
            name: name.to_string(),
            registry: "myregistry.io".to_string(),
            tag: tag.to_string(),
            location: SourceLocation {
                file: "values.yaml".into(),
                field: "image".to_string(),
            },
        }
    }

    fn names(map: &ImageMap) -> Vec<&str> {
        map.iter().map(|image| image.name.as_str()).collect()
    }

    fn contents(map: &ImageMap) -> BTreeMap<String, ImageReference> {
        map.iter().map(|image| (image.name.clone(), image.clone())).collect()
    }

    #[test]
    fn set_keeps_one_entry_per_name_with_last_value() {
        let mut map = ImageMap::new();
        map.set(image("bar", "v1"));
        map.set(image("foo", "v1"));
        map.set(image("bar", "v2"));
        map.set(image("bar", "v3"));

        assert_eq!(map.len(), 2);
        assert_eq!(names(&map), vec!["bar", "foo"]);
        assert_eq!(map.get("bar").unwrap().tag, "v3");
        assert!(map.contains("foo"));
        assert!(!map.contains("baz"));
    }

    #[test]
    fn merge_is_idempotent_and_leaves_source_alone() {
        let mut src = ImageMap::new();
        src.set(image("a", "1"));
        src.set(image("b", "1"));

        let mut dst = ImageMap::new();
        dst.set(image("c", "1"));
        dst.merge(&src);
        let once = contents(&dst);
        dst.merge(&src);

        assert_eq!(contents(&dst), once);
        assert_eq!(names(&dst), vec!["c", "a", "b"]);
        assert_eq!(names(&src), vec!["a", "b"]);
    }

    #[test]
    fn merge_order_changes_order_not_contents() {
        let mut a = ImageMap::new();
        a.set(image("x", "t"));
        a.set(image("shared", "t"));
        let mut b = ImageMap::new();
        b.set(image("shared", "t"));
        b.set(image("y", "t"));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(contents(&ab), contents(&ba));
        assert_eq!(names(&ab), vec!["x", "shared", "y"]);
        assert_eq!(names(&ba), vec!["shared", "y", "x"]);
    }
}
