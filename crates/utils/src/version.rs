use std::sync::LazyLock;

/// Defines the application version.
///
/// `VERSION` may be set at build time to stamp a release tag or commit,
/// otherwise the crate version is used alone.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    version_string(env!("CARGO_PKG_VERSION"), option_env!("VERSION"))
});

fn version_string(package: &str, build: Option<&str>) -> String {
    match build {
        Some(build) if !build.is_empty() && build != package => format!("{package}-{build}"),
        _ => package.to_string(),
    }
}
