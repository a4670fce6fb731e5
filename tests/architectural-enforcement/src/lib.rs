//! Architectural Enforcement Integration Tests
//!
//! Source-level checks that keep the async code honest:
//! - No thread sleeps or blocking HTTP inside the runtime
//! - No `unwrap()`/`expect()` in library code outside tests
//! - No `std::sync::Mutex` (locks are `parking_lot` or `tokio::sync`)
//!
//! This crate only holds the scanning helpers; the checks live in `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Rust source directories that ship in the binary
#[must_use]
pub fn production_dirs() -> Vec<PathBuf> {
    let root = workspace_root();
    vec![root.join("notifier/core/src"), root.join("notifier/daemon/src")]
}

/// Every `.rs` file under `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Non-comment lines before the file's `#[cfg(test)]` module, with 1-based numbers
///
/// Test modules sit at the bottom of each file, so everything after the
/// first `#[cfg(test)]` is treated as test code.
#[must_use]
pub fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (idx + 1, code.to_string())
        })
        .collect()
}

/// Lines in production code matching `is_violation`, formatted for a report
#[must_use]
pub fn find_violations(dirs: &[PathBuf], is_violation: impl Fn(&str) -> bool) -> Vec<String> {
    let mut violations = Vec::new();
    for dir in dirs {
        for file in rust_files(dir) {
            for (line_number, code) in production_lines(&file) {
                if is_violation(&code) {
                    violations.push(format!("{}:{} - {}", file.display(), line_number, code.trim()));
                }
            }
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let mut file = tempfile_in_target("scan.rs");
        writeln!(file.1, "fn a() {{}} // note\n// comment\n#[cfg(test)]\nfn b() {{}}").unwrap();

        let lines = production_lines(&file.0);
        assert_eq!(lines, vec![(1, "fn a() {} ".to_string())]);
    }

    fn tempfile_in_target(name: &str) -> (PathBuf, fs::File) {
        let dir = std::env::temp_dir().join(format!("arch-enforcement-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        (path, file)
    }
}
