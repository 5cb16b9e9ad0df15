//! Platform target registry.
//!
//! Every binary the release pipeline ships is described by a [`PlatformTarget`]:
//! the Go `GOOS`/`GOARCH` pair used to cross-compile it, the npm platform tag
//! used as the package name suffix, and the file name of the binary.
//!
//! The same table drives the postinstall resolver, so a target that is built
//! is always a target that can be installed.

use serde::Serialize;

use crate::types::ReleaseError;

/// Base name of the server binary.
pub const BINARY_STEM: &str = "mediago-player";

/// One OS/architecture pair the server is released for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformTarget {
    /// Go operating system (`GOOS`), e.g. `darwin`, `linux`, `windows`.
    pub goos: String,
    /// Go architecture (`GOARCH`), e.g. `amd64`, `arm64`.
    pub goarch: String,
    /// npm platform tag, `<node os>-<node cpu>`, e.g. `win32-x64`.
    pub platform: String,
    /// File name of the binary inside the package's `bin/` directory.
    pub binary_name: String,
}

impl PlatformTarget {
    /// Creates a target, deriving the binary name from `goos`.
    pub fn new(goos: &str, goarch: &str, platform: &str) -> Self {
        Self::with_stem(goos, goarch, platform, BINARY_STEM)
    }

    /// Creates a target whose binary is called `stem` (plus `.exe` on Windows).
    pub fn with_stem(goos: &str, goarch: &str, platform: &str, stem: &str) -> Self {
        Self {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
            platform: platform.to_string(),
            binary_name: binary_name_for(goos, stem),
        }
    }

    /// Node `os` value (`process.platform`) of this target.
    pub fn npm_os(&self) -> &str {
        self.platform
            .split_once('-')
            .map(|(os, _)| os)
            .unwrap_or(&self.platform)
    }

    /// Node `cpu` value (`process.arch`) of this target.
    pub fn npm_cpu(&self) -> &str {
        self.platform
            .split_once('-')
            .map(|(_, cpu)| cpu)
            .unwrap_or("")
    }

    pub fn is_windows(&self) -> bool {
        self.goos == "windows"
    }

    /// Manifest information for this target's npm package.
    pub fn package_info(&self) -> PlatformPackageInfo {
        PlatformPackageInfo {
            name: self.platform.clone(),
            os: vec![self.npm_os().to_string()],
            cpu: vec![self.npm_cpu().to_string()],
            bin: self.binary_name.clone(),
        }
    }
}

/// Data used to render one platform package manifest.
///
/// `os` and `cpu` are single-element lists matching the npm manifest fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPackageInfo {
    /// Package name suffix (the platform tag).
    pub name: String,
    pub os: Vec<String>,
    pub cpu: Vec<String>,
    /// Binary file name.
    pub bin: String,
}

/// Appends `.exe` for Windows targets.
pub fn binary_name_for(goos: &str, stem: &str) -> String {
    if goos == "windows" {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}

/// `(GOOS, GOARCH, npm platform tag)` for every supported release target.
const TARGETS: &[(&str, &str, &str)] = &[
    ("darwin", "amd64", "darwin-x64"),
    ("darwin", "arm64", "darwin-arm64"),
    ("linux", "amd64", "linux-x64"),
    ("linux", "arm64", "linux-arm64"),
    ("windows", "amd64", "win32-x64"),
    ("windows", "arm64", "win32-arm64"),
];

/// The statically supported release targets.
pub fn platform_targets() -> Vec<PlatformTarget> {
    platform_targets_with_stem(BINARY_STEM)
}

/// The supported release targets for a binary named `stem`.
pub fn platform_targets_with_stem(stem: &str) -> Vec<PlatformTarget> {
    TARGETS
        .iter()
        .map(|(goos, goarch, platform)| PlatformTarget::with_stem(goos, goarch, platform, stem))
        .collect()
}

/// Builds a single target for a binary named `stem` from `GOOS`/`GOARCH`/`PLATFORM`.
///
/// All three must be present; this is how CI matrix jobs build one binary
/// at a time instead of iterating the registry.
pub fn target_from_env_values(
    goos: Option<&str>,
    goarch: Option<&str>,
    platform: Option<&str>,
    stem: &str,
) -> Result<PlatformTarget, ReleaseError> {
    match (non_empty(goos), non_empty(goarch), non_empty(platform)) {
        (Some(goos), Some(goarch), Some(platform)) => {
            Ok(PlatformTarget::with_stem(goos, goarch, platform, stem))
        }
        _ => Err(ReleaseError::missing(
            "GOOS, GOARCH, and PLATFORM",
            "all three environment variables must be set to build a single platform binary",
        )),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Maps a Rust `std::env::consts::OS` value to the Node platform name.
pub fn node_os(rust_os: &str) -> &str {
    match rust_os {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Maps a Rust `std::env::consts::ARCH` value to the Node arch name.
pub fn node_arch(rust_arch: &str) -> &str {
    match rust_arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        "arm" => "arm",
        other => other,
    }
}
