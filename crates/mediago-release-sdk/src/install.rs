//! Postinstall binary resolver.
//!
//! Runs once when the root meta-package is installed. It detects the host,
//! finds the platform package the package manager installed as an optional
//! dependency, and materializes its binary under the root package's `bin/`:
//! a byte-for-byte copy on Windows, a relative symlink everywhere else.

use std::fs;
use std::path::{Path, PathBuf};

use crate::files::{ensure_dir, path_exists, remove_if_exists};
use crate::platform::{PlatformTarget, node_arch, node_os};
use crate::types::ReleaseError;

/// Host operating system and CPU, using Node's names (`process.platform`,
/// `process.arch`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: String,
    pub arch: String,
}

impl HostPlatform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The machine this process runs on.
    pub fn current() -> Self {
        Self::new(
            node_os(std::env::consts::OS),
            node_arch(std::env::consts::ARCH),
        )
    }

    pub fn is_windows(&self) -> bool {
        self.os == "win32"
    }
}

/// Maps `host` to the registry target built for it.
///
/// Fails with `UnsupportedPlatform` when no target exists for the OS, and with
/// `UnsupportedArchitecture` when the OS is known but the CPU is not.
pub fn detect_platform<'a>(
    host: &HostPlatform,
    targets: &'a [PlatformTarget],
) -> Result<&'a PlatformTarget, ReleaseError> {
    let mut same_os = targets.iter().filter(|t| t.npm_os() == host.os).peekable();
    if same_os.peek().is_none() {
        return Err(ReleaseError::UnsupportedPlatform(host.os.clone()));
    }
    same_os
        .find(|t| t.npm_cpu() == host.arch)
        .ok_or_else(|| ReleaseError::UnsupportedArchitecture {
            os: host.os.clone(),
            arch: host.arch.clone(),
        })
}

/// Locates the installed package `package_name` the way Node's `require.resolve`
/// does from `start_dir`: every ancestor's `node_modules`, nearest first,
/// skipping directories that are themselves called `node_modules`.
pub fn find_platform_package(
    start_dir: &Path,
    package_name: &str,
    platform: &str,
) -> Result<PathBuf, ReleaseError> {
    for dir in start_dir.ancestors() {
        if dir.file_name().is_some_and(|name| name == "node_modules") {
            continue;
        }
        let candidate = package_name
            .split('/')
            .fold(dir.join("node_modules"), |path, part| path.join(part));
        if candidate.join("package.json").is_file() {
            log::debug!("Resolved {package_name} at {}", candidate.display());
            return Ok(candidate);
        }
    }
    Err(ReleaseError::PlatformPackageMissing {
        package: package_name.to_string(),
        platform: platform.to_string(),
    })
}

/// How the binary ended up in the root package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMethod {
    Copied,
    /// Symlink whose stored target is `link`, relative to the link's directory.
    Symlinked { link: PathBuf },
}

/// Result of a successful postinstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub platform: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub method: InstallMethod,
}

/// Postinstall for one root package directory.
pub struct Installer {
    package_dir: PathBuf,
    package_name: String,
    host: HostPlatform,
    targets: Vec<PlatformTarget>,
}

impl Installer {
    /// `package_dir` is the installed root package; `package_name` its npm
    /// name, e.g. `@mediago/player`.
    pub fn new(
        package_dir: impl Into<PathBuf>,
        package_name: impl Into<String>,
        targets: Vec<PlatformTarget>,
    ) -> Self {
        Self {
            package_dir: package_dir.into(),
            package_name: package_name.into(),
            host: HostPlatform::current(),
            targets,
        }
    }

    /// Overrides host detection.
    pub fn host(mut self, host: HostPlatform) -> Self {
        self.host = host;
        self
    }

    pub fn install(&self) -> Result<InstallOutcome, ReleaseError> {
        let target = detect_platform(&self.host, &self.targets)?;
        log::info!("Setting up {} for {}...", self.package_name, target.platform);

        let platform_package = format!("{}-{}", self.package_name, target.platform);
        let package = find_platform_package(&self.package_dir, &platform_package, &target.platform)?;

        let source = package.join("bin").join(&target.binary_name);
        if !source.is_file() {
            return Err(ReleaseError::BinaryNotFound {
                path: source,
                hint: Some(format!("The {platform_package} package looks incomplete. Reinstall it")),
            });
        }

        let bin_dir = self.package_dir.join("bin");
        ensure_dir(&bin_dir)?;
        let destination = bin_dir.join(&target.binary_name);
        if path_exists(&destination) {
            remove_if_exists(&destination)?;
        }

        let method = if self.host.is_windows() {
            fs::copy(&source, &destination)?;
            log::info!("Copied binary from {}", source.display());
            InstallMethod::Copied
        } else {
            let method = link_binary(&source, &bin_dir, &destination)?;
            log::info!("Linked binary from {}", source.display());
            method
        };

        Ok(InstallOutcome {
            platform: target.platform.clone(),
            source,
            destination,
            method,
        })
    }
}

#[cfg(unix)]
fn link_binary(source: &Path, bin_dir: &Path, destination: &Path) -> Result<InstallMethod, ReleaseError> {
    let link = crate::files::relative_path(bin_dir, source);
    std::os::unix::fs::symlink(&link, destination)?;
    Ok(InstallMethod::Symlinked { link })
}

#[cfg(not(unix))]
fn link_binary(source: &Path, _bin_dir: &Path, destination: &Path) -> Result<InstallMethod, ReleaseError> {
    fs::copy(source, destination)?;
    Ok(InstallMethod::Copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::platform_targets;
    use tempfile::TempDir;

    const ROOT: &str = "@mediago/player";

    /// Installs a fake platform package under `<project>/node_modules`.
    fn install_platform_package(node_modules: &Path, target: &PlatformTarget, body: &str) -> PathBuf {
        let dir = node_modules
            .join("@mediago")
            .join(format!("player-{}", target.platform));
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::write(dir.join("package.json"), "{}").unwrap();
        fs::write(dir.join("bin").join(&target.binary_name), body).unwrap();
        dir
    }

    fn root_package(node_modules: &Path) -> PathBuf {
        let dir = node_modules.join("@mediago").join("player");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), "{}").unwrap();
        dir
    }

    fn target(platform: &str) -> PlatformTarget {
        platform_targets()
            .into_iter()
            .find(|t| t.platform == platform)
            .unwrap()
    }

    #[test]
    fn test_every_registry_pair_maps_to_one_tag() {
        let targets = platform_targets();
        for target in &targets {
            let host = HostPlatform::new(target.npm_os(), target.npm_cpu());
            let detected = detect_platform(&host, &targets).unwrap();
            assert_eq!(detected.platform, target.platform);
            let matches = targets
                .iter()
                .filter(|t| t.npm_os() == host.os && t.npm_cpu() == host.arch)
                .count();
            assert_eq!(matches, 1);
        }
    }

    #[test]
    fn test_windows_arm64_is_supported() {
        let targets = platform_targets();
        let detected = detect_platform(&HostPlatform::new("win32", "arm64"), &targets).unwrap();
        assert_eq!(detected.platform, "win32-arm64");
        assert_eq!(detected.binary_name, "mediago-player.exe");
    }

    #[test]
    fn test_unknown_os_and_arch_errors() {
        let targets = platform_targets();
        let err = detect_platform(&HostPlatform::new("freebsd", "x64"), &targets).unwrap_err();
        assert!(matches!(err, ReleaseError::UnsupportedPlatform(ref os) if os == "freebsd"));

        let err = detect_platform(&HostPlatform::new("linux", "ia32"), &targets).unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::UnsupportedArchitecture { ref os, ref arch } if os == "linux" && arch == "ia32"
        ));
    }

    #[test]
    fn test_windows_host_with_only_linux_package_fails() {
        let temp = TempDir::new().unwrap();
        let node_modules = temp.path().join("node_modules");
        let root = root_package(&node_modules);
        install_platform_package(&node_modules, &target("linux-x64"), "elf");

        let err = Installer::new(&root, ROOT, platform_targets())
            .host(HostPlatform::new("win32", "x64"))
            .install()
            .unwrap_err();
        match err {
            ReleaseError::PlatformPackageMissing { package, platform } => {
                assert_eq!(package, "@mediago/player-win32-x64");
                assert_eq!(platform, "win32-x64");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!root.join("bin").join("mediago-player.exe").exists());
    }

    #[test]
    fn test_windows_host_copies_binary() {
        let temp = TempDir::new().unwrap();
        let node_modules = temp.path().join("node_modules");
        let root = root_package(&node_modules);
        install_platform_package(&node_modules, &target("win32-x64"), "MZ");

        let outcome = Installer::new(&root, ROOT, platform_targets())
            .host(HostPlatform::new("win32", "x64"))
            .install()
            .unwrap();
        assert_eq!(outcome.method, InstallMethod::Copied);
        assert_eq!(outcome.destination, root.join("bin").join("mediago-player.exe"));
        assert!(!fs::symlink_metadata(&outcome.destination).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&outcome.destination).unwrap(), "MZ");
    }

    #[test]
    fn test_missing_binary_in_platform_package() {
        let temp = TempDir::new().unwrap();
        let node_modules = temp.path().join("node_modules");
        let root = root_package(&node_modules);
        let package = install_platform_package(&node_modules, &target("linux-x64"), "elf");
        fs::remove_file(package.join("bin").join("mediago-player")).unwrap();

        let err = Installer::new(&root, ROOT, platform_targets())
            .host(HostPlatform::new("linux", "x64"))
            .install()
            .unwrap_err();
        assert!(matches!(err, ReleaseError::BinaryNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_host_symlinks_relative_to_bin_dir() {
        let temp = TempDir::new().unwrap();
        let node_modules = temp.path().join("node_modules");
        let root = root_package(&node_modules);
        let package = install_platform_package(&node_modules, &target("darwin-arm64"), "mach-o");

        let installer = Installer::new(&root, ROOT, platform_targets())
            .host(HostPlatform::new("darwin", "arm64"));
        let outcome = installer.install().unwrap();

        let link = fs::read_link(&outcome.destination).unwrap();
        assert!(link.is_relative());
        assert_eq!(
            link,
            PathBuf::from("../../player-darwin-arm64/bin/mediago-player")
        );
        assert_eq!(outcome.method, InstallMethod::Symlinked { link: link.clone() });

        let resolved = root.join("bin").join(&link);
        assert_eq!(
            resolved.canonicalize().unwrap(),
            package.join("bin").join("mediago-player").canonicalize().unwrap()
        );

        // Rerunning replaces the existing link.
        installer.install().unwrap();
        assert_eq!(fs::read_link(&outcome.destination).unwrap(), link);
        assert_eq!(fs::read_to_string(&outcome.destination).unwrap(), "mach-o");
    }

    #[test]
    fn test_resolves_pnpm_layout() {
        let temp = TempDir::new().unwrap();
        let store = temp
            .path()
            .join("node_modules")
            .join(".pnpm")
            .join("@mediago+player@1.0.0")
            .join("node_modules");
        let root = root_package(&store);
        let expected = install_platform_package(&store, &target("linux-arm64"), "elf");

        let found = find_platform_package(&root, "@mediago/player-linux-arm64", "linux-arm64").unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_nearest_node_modules_wins() {
        let temp = TempDir::new().unwrap();
        let outer = temp.path().join("node_modules");
        let root = root_package(&outer);
        let nested = root.join("node_modules");
        let linux = target("linux-x64");
        install_platform_package(&outer, &linux, "outer");
        let inner = install_platform_package(&nested, &linux, "inner");

        let found = find_platform_package(&root, "@mediago/player-linux-x64", "linux-x64").unwrap();
        assert_eq!(found, inner);
    }
}
