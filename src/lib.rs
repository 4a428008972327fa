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

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod error;
pub mod excludes;
pub mod helm_config;
pub mod images;
pub mod reference;
pub mod rewrite;
pub mod syncer;
pub mod walk;

pub use error::PromoteError;
pub use excludes::ExclusionSet;
pub use images::{ImageMap, ImageReference, SourceLocation};
pub use rewrite::{EmptyTagPolicy, RewriteOptions, Target};
pub use syncer::SyncManifest;
pub use walk::{walk, Classifier, Discovery, PathClassifier, Scope};
