//! `cargo run -p architecture-lint [BACKEND_DIR]`
//!
//! Lints `BACKEND_DIR` (default: the workspace's `backend/`) and exits
//! non-zero on any boundary violation.

use std::path::PathBuf;
use std::process::ExitCode;

#[expect(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "the verdict is this tool's only output"
)]
fn main() -> ExitCode {
    let backend_dir = std::env::args_os().nth(1).map_or_else(
        || PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../backend"),
        PathBuf::from,
    );
    match architecture_lint::lint_backend(&backend_dir) {
        Ok(()) => {
            println!("layer boundaries hold in {}", backend_dir.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
