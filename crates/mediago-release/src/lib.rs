//! # mediago-release
//!
//! Task runner for developing, building and publishing the MediaGo Player.
//!
//! ## Overview
//!
//! `mediago-release` drives the Go backend and the React UI. It handles:
//!
//! - **Development** - docs, backend and UI dev servers side by side
//! - **Building** - UI bundle embedded into a host binary under `dist/`
//! - **Releasing** - one npm package per platform plus a root meta-package
//! - **Installing** - the postinstall step that links the right binary
//!
//! ## Quick Start
//!
//! ```bash
//! # Run backend and UI dev servers
//! mediago-release dev
//!
//! # Build and run the host binary
//! mediago-release build
//! mediago-release run -- -port 9000
//!
//! # Assemble npm packages, then publish them
//! VERSION=1.2.3 mediago-release npm:assemble
//! VERSION=1.2.3 PUBLISH=true mediago-release npm:publish
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dev` | Docs, then the backend dev server, alongside the UI dev server |
//! | `build` | Docs, UI bundle, host binary |
//! | `docs` | Regenerate the Swagger docs |
//! | `test` | Run the backend tests |
//! | `run` | Run the host binary from `dist/` |
//! | `npm:build-binary` | Build one binary from `GOOS`/`GOARCH`/`PLATFORM` |
//! | `npm:generate` | Write manifests, readmes and `install.js` |
//! | `npm:assemble` | Build every platform binary and generate the packages |
//! | `npm:publish` | Publish every package (needs `PUBLISH=true` and `VERSION`) |
//! | `npm:release` | Clean, assemble, publish when `PUBLISH=true` |
//! | `postinstall` | Link or copy the platform binary into an installed package |
//! | `targets` | List the release targets |
//! | `init-config` | Write a starter `mediago-release.toml` |
//!
//! ## Environment
//!
//! `.env.local` in the project root is loaded first; variables already set in
//! the environment win.
//!
//! - `VERSION` - release version (default `0.0.0`)
//! - `PUBLISH` - must be exactly `true` to publish
//! - `GOOS`, `GOARCH`, `PLATFORM` - all three select a single build target

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mediago_release_sdk::{
    DEFAULT_VERSION, InstallMethod, Installer, PlatformTarget, Project, ProjectLayout,
    PublishRequest, ReleasePackager, build_graph, dev_graph, target_from_env_values,
};
use std::fs;
use std::path::{Path, PathBuf};

pub mod config;

use config::{CONFIG_FILE_NAME, ConfigResolver, ReleaseConfig};

/// Task runner for the MediaGo Player.
#[derive(Parser, Debug)]
#[command(name = "mediago-release", author, version, about = "Build, package and publish the MediaGo Player", long_about = None)]
pub struct Cli {
    /// Enable debug logging, including every spawned command line.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Path to a config file (default: discover mediago-release.toml upward).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Regenerate docs, then run the backend dev server alongside the UI dev server.
    Dev,
    /// Regenerate docs, build the UI, then build the host binary into dist/.
    Build,
    /// Regenerate the Swagger API docs.
    Docs,
    /// Run the backend test suite.
    Test,
    /// Run the binary produced by `build`.
    Run {
        /// Arguments passed through to the server.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Build a single platform binary selected by GOOS, GOARCH and PLATFORM.
    #[command(name = "npm:build-binary")]
    NpmBuildBinary,
    /// Generate package.json, README, .gitignore and install.js for every package.
    #[command(name = "npm:generate")]
    NpmGenerate {
        /// Package version (default: $VERSION, then 0.0.0).
        #[arg(long)]
        version: Option<String>,
    },
    /// Purge stale binaries, build every platform and generate the packages.
    #[command(name = "npm:assemble")]
    NpmAssemble,
    /// Publish every platform package, then the root package.
    #[command(name = "npm:publish")]
    NpmPublish,
    /// Clean, assemble, and publish when PUBLISH=true.
    #[command(name = "npm:release")]
    NpmRelease,
    /// Install the platform binary into an installed root package.
    Postinstall {
        /// Installed root package directory (default: current directory).
        #[arg(long)]
        package_dir: Option<PathBuf>,
    },
    /// List the release targets.
    Targets {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Write a starter mediago-release.toml.
    InitConfig {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Raw environment values consumed by the release commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseEnv {
    pub version: Option<String>,
    pub publish: Option<String>,
    pub goos: Option<String>,
    pub goarch: Option<String>,
    pub platform: Option<String>,
}

impl ReleaseEnv {
    /// Reads the current process environment.
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            version: var("VERSION"),
            publish: var("PUBLISH"),
            goos: var("GOOS"),
            goarch: var("GOARCH"),
            platform: var("PLATFORM"),
        }
    }

    /// `VERSION`, falling back to `0.0.0`.
    pub fn version(&self) -> String {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION)
            .to_string()
    }

    /// Whether publishing was requested at all.
    pub fn publish_requested(&self) -> bool {
        self.publish.as_deref() == Some("true")
    }

    /// Validated publish request; fails unless both `PUBLISH=true` and `VERSION` are set.
    pub fn publish_request(&self) -> Result<PublishRequest> {
        Ok(PublishRequest::from_values(
            self.version.as_deref(),
            self.publish.as_deref(),
        )?)
    }

    /// The single target selected by `GOOS`/`GOARCH`/`PLATFORM`, named
    /// after the layout's binary.
    pub fn single_target(&self, layout: &ProjectLayout) -> Result<PlatformTarget> {
        Ok(target_from_env_values(
            self.goos.as_deref(),
            self.goarch.as_deref(),
            self.platform.as_deref(),
            &layout.binary_stem,
        )?)
    }
}

/// Entry point for the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run_with(cli)
}

/// `info` by default, `debug` for this tool with `--verbose`; `RUST_LOG` wins.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "info,mediago_release=debug,mediago_release_sdk=debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Runs an already-parsed command line.
pub fn run_with(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("resolving current directory")?;

    // Must work even when an existing config fails to parse.
    if let Command::InitConfig { output, force } = &cli.command {
        return init_config(&cwd.join(output), *force);
    }

    let resolver = ConfigResolver::new(cli.config.as_deref(), &cwd)?;
    if let Some(path) = &resolver.config_path {
        log::debug!("Using config {}", path.display());
    }
    let layout = resolver.layout(&cwd);
    load_dotenv(&layout.root);
    let env = ReleaseEnv::from_process();

    let project = Project::new(layout);
    project
        .runner()
        .registry()
        .install_signal_handlers()
        .context("installing signal handlers")?;

    match cli.command {
        Command::Dev => dev_graph().run(&project)?,
        Command::Build => {
            build_graph().run(&project)?;
            println!(
                "Built {}. Start it with `mediago-release run`.",
                project.layout().server_binary_path().display()
            );
        }
        Command::Docs => project.docs()?,
        Command::Test => project.test()?,
        Command::Run { args } => project.run_binary(&args)?,
        Command::NpmBuildBinary => {
            let target = env.single_target(project.layout())?;
            let packager = ReleasePackager::new(&project).targets(vec![target.clone()]);
            let output = packager.build_binary(&target)?;
            packager.set_permissions()?;
            println!("Built {} binary at {}", target.platform, output.display());
        }
        Command::NpmGenerate { version } => {
            let version = version.unwrap_or_else(|| env.version());
            let generated = ReleasePackager::new(&project).generate_packages(&version)?;
            println!(
                "Generated {} packages for version {version}",
                generated.manifests().len()
            );
        }
        Command::NpmAssemble => {
            let version = env.version();
            let packager = ReleasePackager::new(&project);
            packager.purge_binaries()?;
            packager.assemble(&version)?;
            print_assemble_summary(project.layout(), &version);
        }
        Command::NpmPublish => {
            let request = env.publish_request()?;
            ReleasePackager::new(&project).publish(&request)?;
            println!("Published version {} to npm", request.version);
        }
        Command::NpmRelease => {
            let version = env.version();
            let request = if env.publish_requested() {
                Some(env.publish_request()?)
            } else {
                None
            };
            ReleasePackager::new(&project).release(&version, request.as_ref())?;
            if request.is_none() {
                print_assemble_summary(project.layout(), &version);
            }
        }
        Command::Postinstall { package_dir } => {
            let layout = project.layout();
            let package_dir = package_dir.map(|dir| cwd.join(dir)).unwrap_or(cwd);
            let outcome =
                Installer::new(&package_dir, layout.package_name(), layout.targets()).install()?;
            match &outcome.method {
                InstallMethod::Copied => println!("Copied binary from {}", outcome.source.display()),
                InstallMethod::Symlinked { link } => println!(
                    "Created symlink {} -> {}",
                    outcome.destination.display(),
                    link.display()
                ),
            }
            println!(
                "MediaGo Player is ready! Run 'npx {}' to start.",
                layout.package_name()
            );
        }
        Command::Targets { json } => print_targets(&project.layout().targets(), json)?,
        // Handled before config discovery.
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

fn print_assemble_summary(layout: &ProjectLayout, version: &str) {
    println!("Assembled npm packages for version {version} in {}", layout.npm_dir.display());
    println!("To publish: VERSION={version} PUBLISH=true mediago-release npm:publish");
}

fn print_targets(targets: &[PlatformTarget], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(targets)?);
        return Ok(());
    }
    println!("{:<14} {:<8} {:<7} BINARY", "PLATFORM", "GOOS", "GOARCH");
    for target in targets {
        println!(
            "{:<14} {:<8} {:<7} {}",
            target.platform, target.goos, target.goarch, target.binary_name
        );
    }
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "refusing to overwrite existing file: {:?} (pass --force to replace it)",
            path
        );
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory {:?}", parent))?;
    }
    fs::write(path, ReleaseConfig::generate_starter_toml())
        .with_context(|| format!("writing file {:?}", path))?;
    println!("Wrote starter config to {:?}", path);
    Ok(())
}

fn load_dotenv(root: &Path) {
    let path = root.join(".env.local");
    match dotenvy::from_path(&path) {
        Ok(()) => log::debug!("Loaded {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => log::warn!("Ignoring {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parses_colon_task_names() {
        let cli = Cli::try_parse_from(["mediago-release", "npm:assemble"]).unwrap();
        assert_eq!(cli.command, Command::NpmAssemble);

        let cli = Cli::try_parse_from(["mediago-release", "npm:release", "--verbose"]).unwrap();
        assert_eq!(cli.command, Command::NpmRelease);
        assert!(cli.verbose);

        let cli = Cli::try_parse_from(["mediago-release", "npm:generate", "--version", "2.0.0"]).unwrap();
        assert_eq!(
            cli.command,
            Command::NpmGenerate {
                version: Some("2.0.0".into())
            }
        );
    }

    #[test]
    fn test_run_passes_hyphenated_args_through() {
        let cli = Cli::try_parse_from(["mediago-release", "run", "--", "-port", "9000"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Run {
                args: vec!["-port".into(), "9000".into()]
            }
        );
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["mediago-release", "targets", "--config", "ci/release.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ci/release.toml")));
        assert_eq!(cli.command, Command::Targets { json: false });
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["mediago-release", "npm:unknown"]).is_err());
    }

    #[test]
    fn test_version_defaults() {
        assert_eq!(ReleaseEnv::default().version(), "0.0.0");
        let env = ReleaseEnv {
            version: Some("1.2.3".into()),
            ..Default::default()
        };
        assert_eq!(env.version(), "1.2.3");
    }

    #[test]
    fn test_publish_guard() {
        let env = ReleaseEnv {
            publish: Some("true".into()),
            ..Default::default()
        };
        assert!(env.publish_requested());
        let err = env.publish_request().unwrap_err();
        assert!(err.to_string().contains("VERSION"));

        let env = ReleaseEnv {
            version: Some("1.2.3".into()),
            publish: Some("yes".into()),
            ..Default::default()
        };
        assert!(!env.publish_requested());
        assert!(env.publish_request().is_err());

        let env = ReleaseEnv {
            version: Some("1.2.3".into()),
            publish: Some("true".into()),
            ..Default::default()
        };
        assert_eq!(env.publish_request().unwrap().version, "1.2.3");
    }

    #[test]
    fn test_single_target_needs_all_three() {
        let layout = ProjectLayout::new("/repo");
        let env = ReleaseEnv {
            goos: Some("linux".into()),
            goarch: Some("arm64".into()),
            ..Default::default()
        };
        assert!(env.single_target(&layout).is_err());

        let env = ReleaseEnv {
            platform: Some("linux-arm64".into()),
            ..env
        };
        assert_eq!(env.single_target(&layout).unwrap().platform, "linux-arm64");
    }

    #[test]
    fn test_single_target_uses_configured_binary_name() {
        let mut layout = ProjectLayout::new("/repo");
        layout.binary_stem = "player".to_string();
        let env = ReleaseEnv {
            goos: Some("linux".into()),
            goarch: Some("amd64".into()),
            platform: Some("linux-x64".into()),
            ..Default::default()
        };

        let single = env.single_target(&layout).unwrap();
        let listed = layout
            .targets()
            .into_iter()
            .find(|t| t.platform == "linux-x64")
            .unwrap();
        assert_eq!(single.binary_name, "player");
        assert_eq!(
            layout.platform_binary_path(&single),
            layout.platform_binary_path(&listed)
        );
        assert_eq!(
            layout.platform_binary_path(&single),
            PathBuf::from("/repo/npm/@mediago/player-linux-x64/bin/player")
        );
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        init_config(&path, false).unwrap();
        assert!(ReleaseConfig::load_from_file(&path).is_ok());

        let err = init_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        init_config(&path, true).unwrap();
    }
}
