//! Build and npm release tooling for the MediaGo Player server
//!
//! `mediago-release-sdk` drives the Go backend and React UI builds, packages the
//! server as one npm package per platform plus a root meta-package, and ships
//! the postinstall logic that links the right binary on a user's machine.
//!
//! # Quick Start
//!
//! ```ignore
//! use mediago_release_sdk::{Project, ProjectLayout, ReleasePackager};
//!
//! fn main() -> Result<(), mediago_release_sdk::ReleaseError> {
//!     let project = Project::new(ProjectLayout::new("."));
//!
//!     // docs -> ui -> server
//!     mediago_release_sdk::build_graph().run(&project)?;
//!
//!     // Cross-compile every target and write npm/@mediago/*
//!     ReleasePackager::new(&project).assemble("1.2.3")?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Runner**: spawns tools with inherited I/O and kills stragglers on interrupt
//! - **Files**: directory copy, purge and relative-path helpers
//! - **Platform**: the static registry of release targets
//! - **Tasks**: named steps composed in series or in parallel
//! - **Templates**: embedded npm templates and flat placeholder rendering
//! - **Packager**: clean, cross-compile, generate, chmod, publish
//! - **Install**: the postinstall binary resolver

// Public modules
pub mod files;
pub mod install;
pub mod packager;
pub mod platform;
pub mod project;
pub mod runner;
pub mod tasks;
pub mod templates;
pub mod types;

// Re-export key types for convenience
pub use install::{HostPlatform, InstallMethod, InstallOutcome, Installer, detect_platform};
pub use packager::{GeneratedPackages, ReleasePackager, generate_packages};
pub use platform::{PlatformTarget, platform_targets, target_from_env_values};
pub use project::{Project, ProjectLayout, build_graph, dev_graph};
pub use runner::{CommandOptions, CommandRunner, ProcessRegistry};
pub use tasks::Task;
pub use types::{CommandFailure, DEFAULT_VERSION, PublishRequest, ReleaseError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
