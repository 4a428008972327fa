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

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::builder::NonEmptyStringValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use image_url_helper::{syncer, walk, EmptyTagPolicy, ExclusionSet, PathClassifier, RewriteOptions, Target};
use log::LevelFilter;

/// Helper for container image URLs in Helm values files
#[derive(Parser)]
#[command(version, about, long_about = None, propagate_version = true)]
struct Cli {
    /// Directory holding the charts with values.yaml files
    #[arg(
        short,
        long,
        default_value = "resources",
        env = "IMAGE_URL_HELPER_RESOURCES_DIRECTORY",
        global = true
    )]
    resources_directory: PathBuf,

    /// Verbose mode (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace container registry and image version values in values.yaml files with selected ones
    #[command(after_help = "Example: image-url-helper promote --target-container-registry abc --target-tag release-1")]
    Promote(PromoteArgs),
}

#[derive(clap::Args)]
struct PromoteArgs {
    /// Name of the target registry
    #[arg(
        short = 'c',
        long,
        env = "IMAGE_URL_HELPER_TARGET_CONTAINER_REGISTRY",
        value_parser = NonEmptyStringValueParser::new()
    )]
    target_container_registry: String,

    /// Name of the target tag
    #[arg(short, long, default_value = "", env = "IMAGE_URL_HELPER_TARGET_TAG")]
    target_tag: String,

    /// Dry run enabled, nothing is changed
    #[arg(short, long, default_value_t = true, action = ArgAction::Set, env = "IMAGE_URL_HELPER_DRY_RUN")]
    dry_run: bool,

    /// Set sign flag in outputted yaml file
    #[arg(short, long, env = "IMAGE_URL_HELPER_SIGN")]
    sign: bool,

    /// Path to the file containing a list of excluded images
    #[arg(short, long, env = "IMAGE_URL_HELPER_EXCLUDES_LIST")]
    excludes_list: Option<PathBuf>,

    /// What to do with existing tags when the target tag is empty
    #[arg(long, value_enum, default_value_t = EmptyTag::Keep, env = "IMAGE_URL_HELPER_EMPTY_TAG")]
    empty_tag: EmptyTag,

    /// Write the image list to this file instead of stdout
    #[arg(short, long, env = "IMAGE_URL_HELPER_OUTPUT")]
    output: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum EmptyTag {
    /// Keep the original tag of every image
    Keep,
    /// Write the empty tag, leaving images untagged
    Clear,
}

impl From<EmptyTag> for EmptyTagPolicy {
    fn from(value: EmptyTag) -> Self {
        match value {
            EmptyTag::Keep => EmptyTagPolicy::KeepOriginal,
            EmptyTag::Clear => EmptyTagPolicy::Clear,
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    match &cli.command {
        Commands::Promote(args) => promote(&cli.resources_directory, args),
    }
}

fn promote(resources_directory: &Path, args: &PromoteArgs) -> Result<(), anyhow::Error> {
    // remove trailing slash to have consistent paths
    let resources_directory = clean(resources_directory);
    let target = Target::new(&args.target_container_registry, &args.target_tag, args.empty_tag.into());

    let excludes_list = args.excludes_list.as_deref().unwrap_or(Path::new(""));
    let excludes = ExclusionSet::parse(excludes_list).context("cannot parse excludes list")?;
    if !excludes.is_empty() {
        log::info!("excluding {} images listed in {}", excludes.len(), excludes_list.display());
    }

    log::info!(
        "promoting images below {} to {} (dry run: {})",
        resources_directory.display(),
        target.registry(),
        args.dry_run
    );
    let classifier = PathClassifier::new(&resources_directory);
    let options = RewriteOptions {
        target: &target,
        dry_run: args.dry_run,
        excludes: &excludes,
        classifier: &classifier,
    };
    let discovery = walk(&resources_directory, &options).context("cannot traverse directory")?;

    // join both images lists
    let all_images = discovery.merged();

    let emitted = match &args.output {
        Some(path) => syncer::emit_to_file(&all_images, target.registry(), target.tag(), args.sign, path),
        None => syncer::emit(&all_images, target.registry(), target.tag(), args.sign, &mut io::stdout().lock()),
    };
    emitted.context("cannot print list of images")?;

    Ok(())
}

fn clean(path: &Path) -> PathBuf {
    path.components().collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::{CommandFactory, Parser};

    use crate::{clean, Cli, Commands, EmptyTag};

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn promote_defaults_to_dry_run() {
        let cli = Cli::try_parse_from(["image-url-helper", "promote", "-c", "myregistry.io"]).unwrap();
        let Commands::Promote(args) = cli.command;
        assert!(args.dry_run);
        assert!(!args.sign);
        assert_eq!(args.target_tag, "");
        assert_eq!(args.empty_tag, EmptyTag::Keep);
        assert!(args.excludes_list.is_none());
        assert_eq!(cli.resources_directory, PathBuf::from("resources"));
    }

    #[test]
    fn dry_run_can_be_disabled() {
        let cli = Cli::try_parse_from([
            "image-url-helper",
            "promote",
            "--target-container-registry",
            "myregistry.io",
            "--target-tag",
            "release-1",
            "--dry-run",
            "false",
            "--sign",
        ])
        .unwrap();
        let Commands::Promote(args) = cli.command;
        assert!(!args.dry_run);
        assert!(args.sign);
        assert_eq!(args.target_tag, "release-1");
    }

    #[test]
    fn target_registry_is_required() {
        assert!(Cli::try_parse_from(["image-url-helper", "promote"]).is_err());
        assert!(Cli::try_parse_from(["image-url-helper", "promote", "-c", ""]).is_err());
    }

    #[test]
    fn clean_strips_trailing_slash() {
        assert_eq!(clean(&PathBuf::from("resources/")), PathBuf::from("resources"));
        assert_eq!(clean(&PathBuf::from("./resources//app/")), PathBuf::from("./resources/app"));
    }
}
