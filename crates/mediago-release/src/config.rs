//! Configuration file support for mediago-release.
//!
//! Settings live in an optional `mediago-release.toml` so the directory layout,
//! npm naming and tool names do not have to be repeated on every invocation.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./mediago-release.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! Relative paths inside the file are resolved against the directory that
//! holds it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! binary_name = "mediago-player"
//! server_package = "./cmd/server"
//!
//! [npm]
//! scope = "@mediago"
//! package = "player"
//!
//! [dev]
//! video_root = "./videos"
//!
//! [tools]
//! go = "go1.22"
//! ```

use anyhow::{Context, Result};
use mediago_release_sdk::ProjectLayout;
use mediago_release_sdk::platform::BINARY_STEM;
use mediago_release_sdk::project::{DevSettings, NpmSettings, Toolchain};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "mediago-release.toml";

/// Root configuration structure for `mediago-release.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Directory layout and binary naming.
    pub project: ProjectConfig,

    /// npm package naming and metadata.
    pub npm: NpmConfig,

    /// API docs generation.
    pub docs: DocsConfig,

    /// Development server options.
    pub dev: DevConfig,

    /// External tool names or paths.
    pub tools: ToolsConfig,
}

/// Directory layout and binary naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Binary name without the `.exe` suffix.
    ///
    /// Defaults to "mediago-player".
    pub binary_name: String,

    /// Go package containing the server entry point.
    pub server_package: String,

    pub ui_dir: PathBuf,

    /// Where the UI bundle is copied for embedding.
    pub assets_ui_dir: PathBuf,

    pub dist_dir: PathBuf,

    /// Root of the generated npm packages.
    pub npm_dir: PathBuf,

    pub release_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            binary_name: BINARY_STEM.to_string(),
            server_package: "./cmd/server".to_string(),
            ui_dir: PathBuf::from("ui"),
            assets_ui_dir: PathBuf::from("assets/ui"),
            dist_dir: PathBuf::from("dist"),
            npm_dir: PathBuf::from("npm"),
            release_dir: PathBuf::from("release/npm"),
        }
    }
}

/// npm package naming and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpmConfig {
    /// Package scope including the `@`.
    pub scope: String,
    pub package: String,
    /// Value for `npm publish --access`.
    pub access: String,
    pub description: String,
    pub repository: String,
    pub license: String,
}

impl Default for NpmConfig {
    fn default() -> Self {
        let npm = NpmSettings::default();
        Self {
            scope: npm.scope,
            package: npm.package,
            access: npm.access,
            description: npm.description,
            repository: npm.repository,
            license: npm.license,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    /// File passed to `swag init -g`.
    pub entry: String,
    /// Directory passed to `swag init -o`.
    pub output: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            entry: "cmd/server/main.go".to_string(),
            output: "docs".to_string(),
        }
    }
}

/// Development server options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    /// Video directory handed to the dev server.
    pub video_root: Option<PathBuf>,

    /// Serve Swagger docs from the dev server.
    ///
    /// Defaults to true.
    pub enable_docs: bool,

    /// Program and arguments that start the UI dev server.
    ///
    /// Defaults to `["pnpm", "dev"]`.
    pub ui_command: Vec<String>,
}

impl Default for DevConfig {
    fn default() -> Self {
        let dev = DevSettings::default();
        Self {
            video_root: None,
            enable_docs: dev.enable_docs,
            ui_command: dev.ui_command,
        }
    }
}

/// External tool names or paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub go: String,
    pub pnpm: String,
    pub npm: String,
    pub swag: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let tools = Toolchain::default();
        Self {
            go: tools.go,
            pnpm: tools.pnpm,
            npm: tools.npm,
            swag: tools.swag,
        }
    }
}

impl ReleaseConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ReleaseConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Builds the project layout, resolving relative paths against `base_dir`.
    pub fn into_layout(self, base_dir: &Path) -> ProjectLayout {
        let resolve = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let mut layout = ProjectLayout::new(base_dir);
        layout.ui_dir = resolve(self.project.ui_dir);
        layout.assets_ui_dir = resolve(self.project.assets_ui_dir);
        layout.dist_dir = resolve(self.project.dist_dir);
        layout.npm_dir = resolve(self.project.npm_dir);
        layout.release_dir = resolve(self.project.release_dir);
        layout.server_package = self.project.server_package;
        layout.binary_stem = self.project.binary_name;
        layout.docs_entry = self.docs.entry;
        layout.docs_output = self.docs.output;
        layout.npm = NpmSettings {
            scope: self.npm.scope,
            package: self.npm.package,
            access: self.npm.access,
            description: self.npm.description,
            repository: self.npm.repository,
            license: self.npm.license,
        };
        layout.dev = DevSettings {
            video_root: self
                .dev
                .video_root
                .map(|p| resolve(p).to_string_lossy().into_owned()),
            enable_docs: self.dev.enable_docs,
            ui_command: self.dev.ui_command,
        };
        layout.tools = Toolchain {
            go: self.tools.go,
            pnpm: self.tools.pnpm,
            npm: self.tools.npm,
            swag: self.tools.swag,
        };
        layout
    }

    /// Generates a starter configuration file as a formatted TOML string.
    ///
    /// Every value is the built-in default, so the file only documents them.
    pub fn generate_starter_toml() -> String {
        r#"# mediago-release configuration file
# Paths are relative to the directory holding this file.

[project]
# Binary name without the .exe suffix
binary_name = "mediago-player"

# Go package containing the server entry point
server_package = "./cmd/server"

ui_dir = "ui"
# The UI bundle is copied here so the server can embed it
assets_ui_dir = "assets/ui"
dist_dir = "dist"
npm_dir = "npm"
release_dir = "release/npm"

[npm]
scope = "@mediago"
package = "player"
access = "public"
license = "ISC"
# description = "MediaGo Player - A hybrid Go+React video player server"
# repository = "https://github.com/mediago/mediago-player"

[docs]
entry = "cmd/server/main.go"
output = "docs"

[dev]
# Video directory passed to the dev server as -video-root (optional)
# video_root = "./videos"
enable_docs = true
ui_command = ["pnpm", "dev"]

[tools]
go = "go"
pnpm = "pnpm"
npm = "npm"
swag = "swag"
"#
        .to_string()
    }
}

/// Discovered configuration together with where it was found.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<ReleaseConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads `explicit` if given, otherwise searches upward from `cwd`.
    pub fn new(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                cwd.join(path)
            };
            let config = ReleaseConfig::load_from_file(&path)?;
            return Ok(Self {
                config: Some(config),
                config_path: Some(path),
            });
        }

        match ReleaseConfig::discover_from(cwd)? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self {
                config: None,
                config_path: None,
            }),
        }
    }

    /// Directory holding the config file, or `cwd` when there is none.
    pub fn project_root(&self, cwd: &Path) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf())
    }

    /// The resolved project layout.
    pub fn layout(&self, cwd: &Path) -> ProjectLayout {
        let root = self.project_root(cwd);
        self.config.clone().unwrap_or_default().into_layout(&root)
    }
}
