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
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::PromoteError;
use crate::images::{ImageMap, SourceLocation};
use crate::rewrite::{self, RewriteOptions};

const MANIFEST_FILE_NAMES: [&str; 2] = ["values.yaml", "values.yml"];
const TEST_DIRECTORIES: [&str; 2] = ["test", "tests"];
const TEST_IMAGES_KEY: &str = "testImages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Application,
    Test,
}

/// Decides whether a discovered image belongs to the application or to its tests.
pub trait Classifier {
    fn classify(&self, location: &SourceLocation) -> Scope;
}

impl<F> Classifier for F
where
    F: Fn(&SourceLocation) -> Scope,
{
    fn classify(&self, location: &SourceLocation) -> Scope {
        self(location)
    }
}

/// Images in a `test`/`tests` directory below the root, or under a `testImages` key, are test images.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    root: PathBuf,
}

impl PathClassifier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Classifier for PathClassifier {
    fn classify(&self, location: &SourceLocation) -> Scope {
        let relative = location.file.strip_prefix(&self.root).unwrap_or(&location.file);
        let in_test_directory = relative.parent().is_some_and(|dir| {
            dir.components().any(|c| match c {
                Component::Normal(name) => name.to_str().is_some_and(|name| TEST_DIRECTORIES.contains(&name)),
                _ => false,
            })
        });
        let under_test_images = location.field.split(['.', '[']).any(|key| key == TEST_IMAGES_KEY);

        if in_test_directory || under_test_images {
            Scope::Test
        } else {
            Scope::Application
        }
    }
}

pub fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| MANIFEST_FILE_NAMES.contains(&name))
}

/// Images found by a walk, split by scope.
#[derive(Debug, Default, Clone)]
pub struct Discovery {
    pub images: ImageMap,
    pub test_images: ImageMap,
}

impl Discovery {
    /// Application images first, then test images. An image in both keeps its application position.
    pub fn merged(&self) -> ImageMap {
        let mut all = ImageMap::new();
        all.merge(&self.images);
        for image in &self.test_images {
            if all.contains(&image.name) {
                log::debug!("test image {} is also an application image", image.name);
            }
        }
        all.merge(&self.test_images);
        all
    }
}

/// State of one pass over a resources directory.
pub struct WalkContext<'a> {
    root: &'a Path,
    options: &'a RewriteOptions<'a>,
    discovery: Discovery,
}

impl<'a> WalkContext<'a> {
    pub fn new(root: &'a Path, options: &'a RewriteOptions<'a>) -> Self {
        Self {
            root,
            options,
            discovery: Discovery::default(),
        }
    }

    /// Visits every values file below the root in lexical order. The first failure ends the walk.
    pub fn run(mut self) -> Result<Discovery, PromoteError> {
        let traversal_err = |path: &Path, source: io::Error| PromoteError::Traversal {
            path: path.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(self.root).map_err(|err| traversal_err(self.root, err))?;
        if !metadata.is_dir() {
            return Err(traversal_err(self.root, io::Error::other("not a directory")));
        }

        for entry in WalkDir::new(self.root).sort_by_file_name() {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(self.root).to_path_buf();
                traversal_err(&path, err.into())
            })?;
            if !entry.file_type().is_file() || !is_manifest(entry.path()) {
                continue;
            }
            self.visit(entry.path())?;
        }

        log::info!(
            "found {} images and {} test images below {}",
            self.discovery.images.len(),
            self.discovery.test_images.len(),
            self.root.display()
        );
        Ok(self.discovery)
    }

    fn visit(&mut self, path: &Path) -> Result<(), PromoteError> {
        log::debug!("visiting {}", path.display());
        let file = rewrite::rewrite_file(path, self.options)?;
        for found in file.discovered {
            match found.scope {
                Scope::Application => self.discovery.images.set(found.image),
                Scope::Test => self.discovery.test_images.set(found.image),
            }
        }
        Ok(())
    }
}

/// Promotes every values file below `root`.
pub fn walk(root: &Path, options: &RewriteOptions<'_>) -> Result<Discovery, PromoteError> {
    WalkContext::new(root, options).run()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{is_manifest, Classifier, Discovery, PathClassifier, Scope};
    use crate::images::{ImageReference, SourceLocation};

    fn location(file: &str, field: &str) -> SourceLocation {
        SourceLocation {
            file: file.into(),
            field: field.to_string(),
        }
    }

    fn image(name: &str, file: &str) -> ImageReference {
        ImageReference {
            name: name.to_string(),
            registry: "myregistry.io".to_string(),
            tag: "v2".to_string(),
            location: location(file, "image"),
        }
    }

    #[test]
    fn merged_keeps_application_position_of_shared_images() {
        let mut discovery = Discovery::default();
        discovery.images.set(image("bar", "app/values.yaml"));
        discovery.images.set(image("foo", "app/values.yaml"));
        discovery.test_images.set(image("e2e", "tests/values.yaml"));
        discovery.test_images.set(image("bar", "tests/values.yaml"));

        let all = discovery.merged();
        let names: Vec<&str> = all.iter().map(|image| image.name.as_str()).collect();
        assert_eq!(names, vec!["bar", "foo", "e2e"]);
        assert!(all.contains("e2e"));
        assert_eq!(all.get("bar").unwrap().location.file, Path::new("tests/values.yaml"));
    }

    #[test]
    fn recognizes_values_files() {
        assert!(is_manifest(Path::new("resources/app/values.yaml")));
        assert!(is_manifest(Path::new("values.yml")));
        assert!(!is_manifest(Path::new("resources/app/Chart.yaml")));
        assert!(!is_manifest(Path::new("resources/app/values.yaml.bak")));
    }

    #[test]
    fn classifies_by_directory_below_root() {
        let classifier = PathClassifier::new("/src/tests/resources");

        assert_eq!(
            classifier.classify(&location("/src/tests/resources/app/values.yaml", "image")),
            Scope::Application
        );
        assert_eq!(
            classifier.classify(&location("/src/tests/resources/app/tests/values.yaml", "image")),
            Scope::Test
        );
        assert_eq!(
            classifier.classify(&location("/src/tests/resources/test/app/values.yaml", "image")),
            Scope::Test
        );
    }

    #[test]
    fn classifies_test_images_key() {
        let classifier = PathClassifier::new("resources");
        assert_eq!(
            classifier.classify(&location("resources/app/values.yaml", "global.testImages.e2e.image")),
            Scope::Test
        );
        assert_eq!(
            classifier.classify(&location("resources/app/values.yaml", "global.images.app.image")),
            Scope::Application
        );
    }

    #[test]
    fn closures_are_classifiers() {
        let everything_is_test = |_: &SourceLocation| Scope::Test;
        assert_eq!(everything_is_test.classify(&location("values.yaml", "image")), Scope::Test);
    }
}
