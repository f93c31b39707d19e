//! Build metadata

use serde::Serialize;

/// Version of the running server
///
/// `GIT_HASH` and `BUILD_TIME` are taken from the build environment when set.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub service: &'static str,
    pub version: String,
    pub git_hash: &'static str,
    pub build_time: &'static str,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown"),
    }
}
