//! npm release packaging.
//!
//! The packager turns one build of the server into a set of npm packages:
//!
//! ```text
//! npm/@mediago/
//! ├── player/                  # root meta-package (install.js + optionalDependencies)
//! ├── player-darwin-arm64/     # one package per platform target
//! │   └── bin/mediago-player
//! └── player-win32-x64/
//!     └── bin/mediago-player.exe
//! ```
//!
//! ## Pipeline
//!
//! 1. **Clean** - drop the release directory and purge every `bin/` under the
//!    npm tree so a target that fails to rebuild cannot ship a stale binary
//! 2. **Build UI once** - docs, UI bundle, copy into the embedded assets
//! 3. **Cross-compile** - `go build` per target with `GOOS`/`GOARCH` and
//!    `CGO_ENABLED=0`; the first failure aborts the run
//! 4. **Generate** - manifests, READMEs, `.gitignore` and `install.js`
//! 5. **Permissions** - `0755` on every non-Windows binary
//! 6. **Publish** - only with an explicit [`PublishRequest`]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::files::{ensure_dir, make_executable, remove_directories_named, remove_if_exists};
use crate::platform::{PlatformPackageInfo, PlatformTarget};
use crate::project::{Project, ProjectLayout};
use crate::runner::CommandOptions;
use crate::templates::{
    self, PLATFORM_PACKAGE_JSON, PLATFORM_README, ROOT_INSTALL_SCRIPT, ROOT_PACKAGE_JSON,
    ROOT_README, TemplateVar,
};
use crate::types::{PublishRequest, ReleaseError};

const GITIGNORE: &str = "# Ignore bin directories containing compiled binaries\nbin/\n";

/// Directories written by [`generate_packages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPackages {
    pub root: PathBuf,
    pub platforms: Vec<PathBuf>,
}

impl GeneratedPackages {
    /// Every generated `package.json`, root first.
    pub fn manifests(&self) -> Vec<PathBuf> {
        std::iter::once(&self.root)
            .chain(self.platforms.iter())
            .map(|dir| dir.join("package.json"))
            .collect()
    }
}

/// Drives the release pipeline for a [`Project`].
pub struct ReleasePackager<'a> {
    project: &'a Project,
    targets: Vec<PlatformTarget>,
}

impl<'a> ReleasePackager<'a> {
    /// Creates a packager for every target in the project's registry.
    pub fn new(project: &'a Project) -> Self {
        Self {
            targets: project.layout().targets(),
            project,
        }
    }

    /// Restricts the run to `targets`.
    pub fn targets(mut self, targets: Vec<PlatformTarget>) -> Self {
        self.targets = targets;
        self
    }

    fn layout(&self) -> &ProjectLayout {
        self.project.layout()
    }

    /// Removes previous release output and every stale `bin/` directory.
    pub fn clean(&self) -> Result<(), ReleaseError> {
        let layout = self.layout();
        remove_if_exists(&layout.release_dir)?;
        self.purge_binaries()
    }

    /// Removes every `bin/` directory under the npm tree.
    pub fn purge_binaries(&self) -> Result<(), ReleaseError> {
        let removed = remove_directories_named(&self.layout().npm_dir, "bin")?;
        if !removed.is_empty() {
            log::info!("Removed {} stale bin directories", removed.len());
        }
        Ok(())
    }

    /// Regenerates docs and builds the UI bundle shared by every binary.
    pub fn build_ui(&self) -> Result<(), ReleaseError> {
        self.project.docs()?;
        self.project.build_ui()
    }

    /// Cross-compiles the server for `target` into its npm package.
    pub fn build_binary(&self, target: &PlatformTarget) -> Result<PathBuf, ReleaseError> {
        let layout = self.layout();
        let output = layout.platform_binary_path(target);
        if let Some(parent) = output.parent() {
            ensure_dir(parent)?;
        }
        log::info!("Building {} binary -> {}", target.platform, output.display());

        let options = CommandOptions::new()
            .env("CGO_ENABLED", "0")
            .env("GOOS", &target.goos)
            .env("GOARCH", &target.goarch);
        let output_arg = output.to_string_lossy().into_owned();
        self.project.runner().run(
            &layout.tools.go,
            &[
                "build",
                "-ldflags=-s -w",
                "-o",
                output_arg.as_str(),
                layout.server_package.as_str(),
            ],
            &options,
        )?;
        Ok(output)
    }

    /// Builds the UI once, then every target in order.
    pub fn build_binaries(&self) -> Result<(), ReleaseError> {
        self.build_ui()?;
        for target in &self.targets {
            self.build_binary(target)?;
        }
        Ok(())
    }

    /// Writes all package files for `version`.
    pub fn generate_packages(&self, version: &str) -> Result<GeneratedPackages, ReleaseError> {
        generate_packages(self.layout(), &self.targets, version)
    }

    /// Sets mode `0755` on every non-Windows binary. No-op on Windows hosts.
    pub fn set_permissions(&self) -> Result<(), ReleaseError> {
        if cfg!(windows) {
            return Ok(());
        }
        for target in self.targets.iter().filter(|t| !t.binary_name.ends_with(".exe")) {
            make_executable(&self.layout().platform_binary_path(target))?;
        }
        Ok(())
    }

    /// Builds every binary, generates the packages and fixes permissions.
    pub fn assemble(&self, version: &str) -> Result<GeneratedPackages, ReleaseError> {
        self.build_binaries()?;
        let generated = self.generate_packages(version)?;
        self.set_permissions()?;
        log::info!("Assembled npm packages for version {version}");
        Ok(generated)
    }

    /// Publishes every platform package, then the root package.
    pub fn publish(&self, request: &PublishRequest) -> Result<(), ReleaseError> {
        let layout = self.layout();
        let packages = self
            .targets
            .iter()
            .map(|t| {
                (
                    layout.platform_package_name(&t.platform),
                    layout.platform_package_dir(&t.platform),
                )
            })
            .chain(std::iter::once((layout.package_name(), layout.root_package_dir())));

        for (name, dir) in packages {
            log::info!("Publishing {name} (version {})", request.version);
            self.project.runner().run(
                &layout.tools.npm,
                &["publish", "--access", layout.npm.access.as_str()],
                &CommandOptions::new().cwd(dir),
            )?;
        }
        log::info!("Published version {} to npm", request.version);
        Ok(())
    }

    /// Clean, assemble, and publish when `publish` is given.
    pub fn release(
        &self,
        version: &str,
        publish: Option<&PublishRequest>,
    ) -> Result<GeneratedPackages, ReleaseError> {
        self.clean()?;
        let generated = self.assemble(version)?;
        match publish {
            Some(request) => self.publish(request)?,
            None => log::info!(
                "Dry run completed for version {version}. Set PUBLISH=true to publish to npm."
            ),
        }
        Ok(generated)
    }
}

/// Writes the root package and one package per target under the npm tree.
pub fn generate_packages(
    layout: &ProjectLayout,
    targets: &[PlatformTarget],
    version: &str,
) -> Result<GeneratedPackages, ReleaseError> {
    log::info!("Generating npm packages for version {version}...");

    let root = layout.root_package_dir();
    write_package_json(&root, &render_root_manifest(layout, targets, version)?)?;
    write_file(&root.join("README.md"), &render_root_readme(layout, targets)?)?;
    write_file(&root.join(".gitignore"), GITIGNORE)?;
    let install = root.join("install.js");
    write_file(&install, &render_install_script(layout, targets)?)?;
    if !cfg!(windows) {
        make_executable(&install)?;
    }

    let mut platforms = Vec::with_capacity(targets.len());
    for target in targets {
        let info = target.package_info();
        let dir = layout.platform_package_dir(&info.name);
        write_package_json(&dir, &render_platform_manifest(layout, &info, version)?)?;
        write_file(&dir.join("README.md"), &render_platform_readme(layout, &info)?)?;
        write_file(&dir.join(".gitignore"), GITIGNORE)?;
        platforms.push(dir);
    }

    log::info!("Successfully generated all package files for version {version}");
    Ok(GeneratedPackages { root, platforms })
}

/// Renders the root `package.json`. Every string value is JSON-escaped.
pub fn render_root_manifest(
    layout: &ProjectLayout,
    targets: &[PlatformTarget],
    version: &str,
) -> Result<String, ReleaseError> {
    let mut optional = Map::new();
    for target in targets {
        optional.insert(
            layout.platform_package_name(&target.platform),
            Value::String(version.to_string()),
        );
    }
    let optional = serde_json::to_string_pretty(&Value::Object(optional))?;

    templates::render_named(
        ROOT_PACKAGE_JSON,
        &[
            TemplateVar::new("PACKAGE_NAME", json_escape(&layout.package_name())?),
            TemplateVar::new("VERSION", json_escape(version)?),
            TemplateVar::new("DESCRIPTION", json_escape(&layout.npm.description)?),
            TemplateVar::new("BIN_NAME", json_escape(&layout.binary_stem)?),
            TemplateVar::new("OPTIONAL_DEPENDENCIES", optional),
            TemplateVar::new("LICENSE", json_escape(&layout.npm.license)?),
            TemplateVar::new("REPOSITORY", json_escape(&layout.npm.repository)?),
        ],
    )
}

/// Renders one platform `package.json`. Every string value is JSON-escaped.
pub fn render_platform_manifest(
    layout: &ProjectLayout,
    info: &PlatformPackageInfo,
    version: &str,
) -> Result<String, ReleaseError> {
    templates::render_named(
        PLATFORM_PACKAGE_JSON,
        &[
            TemplateVar::new("PACKAGE_NAME", json_escape(&layout.package_name())?),
            TemplateVar::new("PLATFORM_NAME", json_escape(&info.name)?),
            TemplateVar::new("VERSION", json_escape(version)?),
            TemplateVar::new("OS", json_escape(first(&info.os))?),
            TemplateVar::new("CPU", json_escape(first(&info.cpu))?),
            TemplateVar::new("BIN_NAME", json_escape(&layout.binary_stem)?),
            TemplateVar::new("BINARY_NAME", json_escape(&info.bin)?),
            TemplateVar::new("LICENSE", json_escape(&layout.npm.license)?),
        ],
    )
}

fn render_root_readme(layout: &ProjectLayout, targets: &[PlatformTarget]) -> Result<String, ReleaseError> {
    templates::render_named(
        ROOT_README,
        &[
            TemplateVar::new("PACKAGE_NAME", layout.package_name()),
            TemplateVar::new("SUPPORTED_PLATFORMS", supported_platforms(targets)),
            TemplateVar::new("LICENSE", layout.npm.license.as_str()),
            TemplateVar::new("REPOSITORY", layout.npm.repository.as_str()),
        ],
    )
}

fn render_platform_readme(layout: &ProjectLayout, info: &PlatformPackageInfo) -> Result<String, ReleaseError> {
    templates::render_named(
        PLATFORM_README,
        &[
            TemplateVar::new("PACKAGE_NAME", layout.package_name()),
            TemplateVar::new("PLATFORM_NAME", info.name.as_str()),
            TemplateVar::new("OS", first(&info.os)),
            TemplateVar::new("CPU", first(&info.cpu)),
            TemplateVar::new("LICENSE", layout.npm.license.as_str()),
        ],
    )
}

/// Renders `install.js` with a platform map derived from `targets`.
pub fn render_install_script(
    layout: &ProjectLayout,
    targets: &[PlatformTarget],
) -> Result<String, ReleaseError> {
    let mut map: Map<String, Value> = Map::new();
    for target in targets {
        let entry = map
            .entry(target.npm_os().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(archs) = entry {
            archs.insert(target.npm_cpu().to_string(), Value::String(target.platform.clone()));
        }
    }
    templates::render_named(
        ROOT_INSTALL_SCRIPT,
        &[
            TemplateVar::new("PACKAGE_NAME", layout.package_name()),
            TemplateVar::new("BIN_NAME", layout.binary_stem.as_str()),
            TemplateVar::new("PLATFORM_MAP", serde_json::to_string_pretty(&Value::Object(map))?),
        ],
    )
}

/// Bullet list of operating systems and their architectures, in registry order.
fn supported_platforms(targets: &[PlatformTarget]) -> String {
    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for target in targets {
        match groups.iter().position(|(os, _)| *os == target.npm_os()) {
            Some(index) => groups[index].1.push(target.npm_cpu()),
            None => groups.push((target.npm_os(), vec![target.npm_cpu()])),
        }
    }
    groups
        .into_iter()
        .map(|(os, cpus)| format!("- {} ({})", display_os(os), cpus.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn display_os(os: &str) -> &str {
    match os {
        "darwin" => "macOS",
        "linux" => "Linux",
        "win32" => "Windows",
        other => other,
    }
}

fn first(values: &[String]) -> &str {
    values.first().map(String::as_str).unwrap_or_default()
}

/// Escapes `value` for use inside a JSON string literal.
fn json_escape(value: &str) -> Result<String, ReleaseError> {
    let quoted = serde_json::to_string(value)?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

/// Parses the rendered manifest and writes it back pretty-printed.
fn write_package_json(dir: &Path, content: &str) -> Result<(), ReleaseError> {
    ensure_dir(dir)?;
    let data: Value = serde_json::from_str(content)?;
    let mut pretty = serde_json::to_string_pretty(&data)?;
    pretty.push('\n');
    write_file(&dir.join("package.json"), &pretty)
}

fn write_file(path: &Path, content: &str) -> Result<(), ReleaseError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, content)?;
    log::info!("Generated {}", path.display());
    Ok(())
}
