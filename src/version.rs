#![allow(clippy::doc_markdown)] // Generated file contains OPT_LEVEL without backticks

use std::sync::LazyLock;

include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// `fgmate` version: the package version, then the short git commit and a `-dirty` marker when
/// the build tree had uncommitted changes. Builds outside a git checkout report the package
/// version alone.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let mut version = PKG_VERSION.to_string();
    if let Some(commit) = GIT_COMMIT_HASH_SHORT.or(GIT_COMMIT_HASH) {
        version.push('-');
        version.push_str(commit);
    }
    if GIT_DIRTY == Some(true) {
        version.push_str("-dirty");
    }
    version
});

/// Target triple and rustc version the binary was built with, for bug reports.
pub fn build_info() -> String {
    format!("{TARGET} ({RUSTC_VERSION}, {PROFILE})")
}
