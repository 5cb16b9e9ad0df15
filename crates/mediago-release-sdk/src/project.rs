//! Project layout and the individual build steps.
//!
//! [`ProjectLayout`] resolves every directory and tool name the pipeline
//! touches. [`Project`] pairs a layout with a [`CommandRunner`] and exposes
//! one method per build step, plus the `dev` and `build` task graphs composed
//! from them.

use std::path::{Path, PathBuf};

use crate::files::{copy_directory, ensure_dir, path_exists};
use crate::platform::{BINARY_STEM, PlatformTarget, binary_name_for, platform_targets_with_stem};
use crate::runner::{CommandOptions, CommandRunner};
use crate::tasks::Task;
use crate::types::ReleaseError;

/// npm naming and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmSettings {
    /// Package scope including the `@`, e.g. `@mediago`.
    pub scope: String,
    /// Root package name inside the scope, e.g. `player`.
    pub package: String,
    /// Value passed to `npm publish --access`.
    pub access: String,
    pub description: String,
    pub repository: String,
    pub license: String,
}

impl Default for NpmSettings {
    fn default() -> Self {
        Self {
            scope: "@mediago".to_string(),
            package: "player".to_string(),
            access: "public".to_string(),
            description: "MediaGo Player - A hybrid Go+React video player server".to_string(),
            repository: "https://github.com/mediago/mediago-player".to_string(),
            license: "ISC".to_string(),
        }
    }
}

/// Options for the development server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevSettings {
    /// Directory passed to the server as `-video-root`.
    pub video_root: Option<String>,
    /// Pass `-enable-docs` to the dev server.
    pub enable_docs: bool,
    /// Command (program followed by args) that starts the UI dev server.
    pub ui_command: Vec<String>,
}

impl Default for DevSettings {
    fn default() -> Self {
        Self {
            video_root: None,
            enable_docs: true,
            ui_command: vec!["pnpm".to_string(), "dev".to_string()],
        }
    }
}

/// Names of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub go: String,
    pub pnpm: String,
    pub npm: String,
    pub swag: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            go: "go".to_string(),
            pnpm: "pnpm".to_string(),
            npm: "npm".to_string(),
            swag: "swag".to_string(),
        }
    }
}

/// Resolved paths and names for one checkout of the player repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub ui_dir: PathBuf,
    /// Where the UI bundle is copied so the server can embed it.
    pub assets_ui_dir: PathBuf,
    pub dist_dir: PathBuf,
    /// Tree holding the generated npm packages.
    pub npm_dir: PathBuf,
    pub release_dir: PathBuf,
    /// Go package of the server entry point, e.g. `./cmd/server`.
    pub server_package: String,
    /// Binary name without the `.exe` suffix.
    pub binary_stem: String,
    pub docs_entry: String,
    pub docs_output: String,
    pub npm: NpmSettings,
    pub dev: DevSettings,
    pub tools: Toolchain,
}

impl ProjectLayout {
    /// Default layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            ui_dir: root.join("ui"),
            assets_ui_dir: root.join("assets").join("ui"),
            dist_dir: root.join("dist"),
            npm_dir: root.join("npm"),
            release_dir: root.join("release").join("npm"),
            server_package: "./cmd/server".to_string(),
            binary_stem: BINARY_STEM.to_string(),
            docs_entry: "cmd/server/main.go".to_string(),
            docs_output: "docs".to_string(),
            npm: NpmSettings::default(),
            dev: DevSettings::default(),
            tools: Toolchain::default(),
            root,
        }
    }

    /// The release targets, named after this project's binary.
    pub fn targets(&self) -> Vec<PlatformTarget> {
        platform_targets_with_stem(&self.binary_stem)
    }

    /// Binary file name for the machine running the build.
    pub fn host_binary_name(&self) -> String {
        let goos = if cfg!(windows) { "windows" } else { "" };
        binary_name_for(goos, &self.binary_stem)
    }

    /// Path of the host binary produced by `build`.
    pub fn server_binary_path(&self) -> PathBuf {
        self.dist_dir.join(self.host_binary_name())
    }

    /// Full name of the root package, e.g. `@mediago/player`.
    pub fn package_name(&self) -> String {
        format!("{}/{}", self.npm.scope, self.npm.package)
    }

    /// Full name of a platform package, e.g. `@mediago/player-linux-x64`.
    pub fn platform_package_name(&self, platform: &str) -> String {
        format!("{}-{}", self.package_name(), platform)
    }

    pub fn root_package_dir(&self) -> PathBuf {
        self.npm_dir.join(&self.npm.scope).join(&self.npm.package)
    }

    pub fn platform_package_dir(&self, platform: &str) -> PathBuf {
        self.npm_dir
            .join(&self.npm.scope)
            .join(format!("{}-{}", self.npm.package, platform))
    }

    /// Where a target's binary lands inside its npm package.
    pub fn platform_binary_path(&self, target: &PlatformTarget) -> PathBuf {
        self.platform_package_dir(&target.platform)
            .join("bin")
            .join(&target.binary_name)
    }
}

/// A project layout plus the runner that executes its commands.
///
/// This is the context every task in the `dev` and `build` graphs receives.
#[derive(Debug)]
pub struct Project {
    layout: ProjectLayout,
    runner: CommandRunner,
}

impl Project {
    pub fn new(layout: ProjectLayout) -> Self {
        let runner = CommandRunner::new(&layout.root);
        Self { layout, runner }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Regenerates the Swagger docs.
    pub fn docs(&self) -> Result<(), ReleaseError> {
        let layout = &self.layout;
        self.runner.run(
            &layout.tools.swag,
            &[
                "init",
                "-g",
                layout.docs_entry.as_str(),
                "-o",
                layout.docs_output.as_str(),
            ],
            &CommandOptions::new(),
        )
    }

    /// Runs the backend with `go run`.
    pub fn dev_server(&self) -> Result<(), ReleaseError> {
        let layout = &self.layout;
        let mut args = vec!["run".to_string(), layout.server_package.clone()];
        if layout.dev.enable_docs {
            args.push("-enable-docs".to_string());
        }
        if let Some(video_root) = &layout.dev.video_root {
            args.push("-video-root".to_string());
            args.push(video_root.clone());
        }
        self.runner.run(&layout.tools.go, &args, &CommandOptions::new())
    }

    /// Runs the UI dev server.
    pub fn dev_ui(&self) -> Result<(), ReleaseError> {
        let Some((program, args)) = self.layout.dev.ui_command.split_first() else {
            return Err(ReleaseError::missing(
                "dev.ui_command",
                "set [dev] ui_command in mediago-release.toml",
            ));
        };
        self.runner.run(program, args, &CommandOptions::new())
    }

    /// Runs the backend test suite.
    pub fn test(&self) -> Result<(), ReleaseError> {
        self.runner
            .run(&self.layout.tools.go, &["test", "./..."], &CommandOptions::new())
    }

    /// Builds the UI and copies its bundle into the server's embedded assets.
    pub fn build_ui(&self) -> Result<(), ReleaseError> {
        let layout = &self.layout;
        self.runner.run(
            &layout.tools.pnpm,
            &["build"],
            &CommandOptions::new().cwd(&layout.ui_dir),
        )?;
        let dist = layout.ui_dir.join("dist");
        if !dist.is_dir() {
            return Err(ReleaseError::SourceMissing {
                path: dist,
                hint: Some("Expected UI build output at ui/dist but it was not found".into()),
            });
        }
        copy_directory(&dist, &layout.assets_ui_dir)?;
        log::info!(
            "Copied UI bundle {} -> {}",
            dist.display(),
            layout.assets_ui_dir.display()
        );
        Ok(())
    }

    /// Compiles the server for the host into `dist/`.
    pub fn build_server(&self) -> Result<(), ReleaseError> {
        let layout = &self.layout;
        ensure_dir(&layout.dist_dir)?;
        let output = layout.server_binary_path().to_string_lossy().into_owned();
        self.runner.run(
            &layout.tools.go,
            &["build", "-o", output.as_str(), layout.server_package.as_str()],
            &CommandOptions::new(),
        )
    }

    /// Runs the binary produced by [`Project::build_server`].
    pub fn run_binary(&self, args: &[String]) -> Result<(), ReleaseError> {
        let binary = absolute(&self.layout.server_binary_path(), &self.layout.root);
        if !path_exists(&binary) {
            return Err(ReleaseError::BinaryNotFound {
                path: binary,
                hint: Some("Run `mediago-release build` first.".into()),
            });
        }
        self.runner
            .run(&binary.to_string_lossy(), args, &CommandOptions::new())
    }
}

fn absolute(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// `dev` = parallel(series(docs, dev:server), dev:ui)
pub fn dev_graph() -> Task<Project> {
    Task::parallel(
        "dev",
        vec![
            Task::series(
                "dev:server",
                vec![
                    Task::step("docs", Project::docs),
                    Task::step("dev:server:run", Project::dev_server),
                ],
            ),
            Task::step("dev:ui", Project::dev_ui),
        ],
    )
}

/// `build` = series(docs, build:ui, build:server)
pub fn build_graph() -> Task<Project> {
    Task::series(
        "build",
        vec![
            Task::step("docs", Project::docs),
            Task::step("build:ui", Project::build_ui),
            Task::step("build:server", Project::build_server),
        ],
    )
}
