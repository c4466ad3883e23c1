//! Shell configuration: command-line arguments plus the log level override.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use clusterfs::Settings;
use log::LevelFilter;

pub const DEFAULT_IMAGE: &str = "clusterfs.img";
pub const DEFAULT_IMAGE_SIZE: u64 = 1024;
pub const DEFAULT_CLUSTER_SIZE: u64 = 64;
/// Environment variable naming the log level.
pub const LOG_ENV: &str = "CLUSTERFS_LOG";
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Warn;

pub const USAGE: &str = "usage: clusterfs-shell [image] [--create <size> <cluster_size>] [--allow-large] [--log <level>]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellConfig {
    pub image: PathBuf,
    /// Format the image with these settings before opening it.
    pub create: Option<Settings>,
    pub allow_large: bool,
    pub log_level: LevelFilter,
    pub show_help: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::from(DEFAULT_IMAGE),
            create: None,
            allow_large: false,
            log_level: DEFAULT_LOG_LEVEL,
            show_help: false,
        }
    }
}

impl ShellConfig {
    /// `args` excludes the program name. `--log` wins over `env_level`.
    pub fn parse<I>(args: I, env_level: Option<&str>) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(level) = env_level {
            config.log_level = parse_level(level).with_context(|| format!("in {LOG_ENV}"))?;
        }
        let mut image = None;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => config.show_help = true,
                "--allow-large" => config.allow_large = true,
                "--log" => {
                    let level = args.next().context("--log needs a level")?;
                    config.log_level = parse_level(&level)?;
                }
                "--create" => {
                    let size = parse_size(args.next(), "image size")?;
                    let cluster = parse_size(args.next(), "cluster size")?;
                    config.create = Some(Settings::new(size, cluster));
                }
                flag if flag.starts_with("--") => bail!("unknown option `{flag}`"),
                path => {
                    if image.replace(PathBuf::from(path)).is_some() {
                        bail!("more than one image path given");
                    }
                }
            }
        }
        if let Some(image) = image {
            config.image = image;
        }
        Ok(config)
    }

    /// Settings for a missing image that was not explicitly created.
    pub fn default_settings() -> Settings {
        Settings::new(DEFAULT_IMAGE_SIZE, DEFAULT_CLUSTER_SIZE)
    }
}

fn parse_level(level: &str) -> anyhow::Result<LevelFilter> {
    LevelFilter::from_str(level.trim()).with_context(|| format!("invalid log level `{level}`"))
}

fn parse_size(arg: Option<String>, what: &str) -> anyhow::Result<u64> {
    let arg = arg.with_context(|| format!("--create needs {what}"))?;
    arg.parse()
        .with_context(|| format!("invalid {what} `{arg}`"))
}
