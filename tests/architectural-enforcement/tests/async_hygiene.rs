//! Integration Test: Async Hygiene
//!
//! **Policy**: code running on the tokio runtime must never block a worker
//! thread, and library code reports failures instead of panicking.
//!
//! - `std::thread::sleep` stalls the scheduler tick and the long-poll loop;
//!   use `tokio::time::sleep` or `tokio::time::interval`.
//! - `reqwest::blocking` spins up its own runtime inside ours.
//! - `std::sync::Mutex` held across `.await` deadlocks; use `tokio::sync::Mutex`
//!   or `parking_lot::Mutex` for short critical sections.
//! - `.unwrap()` / `.expect()` in the core crate turn upstream failures into
//!   process aborts.

use architectural_enforcement::{find_violations, production_dirs, workspace_root};

fn report(kind: &str, violations: &[String]) {
    if violations.is_empty() {
        return;
    }
    for violation in violations {
        eprintln!("  \u{274c} {violation}");
    }
    panic!("\nFound {} {kind} violation(s) in production code.", violations.len());
}

#[test]
fn test_no_thread_sleep() {
    let violations = find_violations(&production_dirs(), |code| code.contains("thread::sleep"));
    report("thread sleep", &violations);
}

#[test]
fn test_no_blocking_http() {
    let violations = find_violations(&production_dirs(), |code| code.contains("reqwest::blocking"));
    report("blocking HTTP", &violations);
}

#[test]
fn test_no_std_mutex() {
    let violations = find_violations(&production_dirs(), |code| {
        code.contains("std::sync::Mutex") || code.contains("std::sync::{Mutex")
    });
    report("std mutex", &violations);
}

#[test]
fn test_no_unwrap_in_core() {
    let core = vec![workspace_root().join("notifier/core/src")];
    let violations = find_violations(&core, |code| code.contains(".unwrap()") || code.contains(".expect("));
    report("unwrap/expect", &violations);
}

#[test]
fn test_production_dirs_exist() {
    for dir in production_dirs() {
        assert!(dir.is_dir(), "missing source directory {}", dir.display());
    }
}
