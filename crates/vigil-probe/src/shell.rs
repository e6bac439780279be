//! Interpreter resolution for probe commands.
//!
//! Probes run under `shell -o pipefail -ec <cmd>`, so the interpreter must
//! support `pipefail`. Resolution happens once at startup and the result is
//! passed explicitly to each executor rather than held as process state.

use std::path::{Path, PathBuf};

use tracing::info;

/// Pick the interpreter for probe commands.
///
/// Prefers `$SHELL`; falls back to `/bin/sh`. When `/bin/sh` symlinks to
/// dash (which lacks `pipefail`), substitutes `/bin/bash`.
pub fn resolve_shell() -> PathBuf {
    let mut shell = std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .map_or_else(|| PathBuf::from("/bin/sh"), PathBuf::from);

    if shell == Path::new("/bin/sh") {
        if let Ok(target) = std::fs::read_link(&shell) {
            if target.to_string_lossy().contains("dash") {
                shell = PathBuf::from("/bin/bash");
            }
        }
    }

    info!(shell = %shell.display(), "resolved probe shell");
    shell
}
