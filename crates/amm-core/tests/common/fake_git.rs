//! Stand-in git executables written as shell scripts, so checkout tests run
//! without network access or a real git.

use std::path::{Path, PathBuf};

/// `clone --quiet -- REMOTE DIR` creates the target directory and records the
/// remote; `-C dir checkout --quiet REF` records the ref.
pub const CLONING: &str = r#"#!/bin/sh
if [ "$1" = "clone" ] && [ "$3" = "--" ]; then
    mkdir -p "$5" && echo "$4" > "$5/REMOTE"
    exit $?
fi
if [ "$1" = "-C" ] && [ "$3" = "checkout" ]; then
    echo "$5" > "$2/REF"
    exit $?
fi
exit 1
"#;

/// Starts the clone and then hangs.
pub const HANGING: &str = r#"#!/bin/sh
mkdir -p "$5"
exec sleep 30
"#;

/// Clones, then exits successfully shortly after.
pub const SETTLING: &str = r#"#!/bin/sh
mkdir -p "$5" && echo "$4" > "$5/REMOTE"
sleep 0.3
"#;

/// Fails like a missing repository.
pub const FAILING: &str = r#"#!/bin/sh
echo "fatal: repository not found" >&2
exit 128
"#;

/// Writes `script` as an executable file in `dir` and returns its path.
#[cfg(unix)]
pub fn install(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
