//! TAP (Test Anything Protocol) harness for on-device tests.
//!
//! Unit tests run on the host with `cargo test`. The same logic can be
//! checked on a board (or in QEMU) by marking a function `#[tap_test]`; the
//! `device-tests` binary collects every such function and prints TAP on the
//! serial console.
//!
//! **Note:** only built with the `tap-tests` feature, so test code never ends
//! up in a production image.
//!
//! # Usage
//!
//! ```ignore
//! // In src/indicator/status.rs
//! #[cfg(feature = "tap-tests")]
//! mod tap_tests {
//!     use super::*;
//!     use blynk_board_esp32_macros::tap_test;
//!
//!     #[tap_test]
//!     fn running_is_solid() {
//!         assert_eq!(StatusSpec::lookup(RunMode::Running, None).blink, Blink::Solid);
//!     }
//!
//!     #[tap_test]
//!     fn port_parses() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         assert_eq!(parse_port("8442")?, 8442);
//!         Ok(())
//!     }
//! }
//! ```
//!
//! Tests are named by module (`store::store_survives_torn_write`). Set
//! `TAP_FILTER` when building `device-tests` to run only the tests whose name
//! contains it, e.g. `TAP_FILTER=store::`. Tests marked
//! `#[tap_test(device_only)]` are reported as `# SKIP` off the board.

use std::panic::{catch_unwind, AssertUnwindSafe};

// Re-export inventory for use by the proc-macro
pub use inventory;

/// Result type for test functions.
pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Runs one registered test under the name it is given.
pub type TestRegisterFn = fn(&mut TestRunner, &str);

/// A test registered by `#[tap_test]`.
pub struct TapTestEntry {
    /// `module_path!()` of the test function.
    pub module: &'static str,
    pub name: &'static str,
    pub register: TestRegisterFn,
}

impl TapTestEntry {
    pub const fn new(module: &'static str, name: &'static str, register: TestRegisterFn) -> Self {
        Self {
            module,
            name,
            register,
        }
    }

    /// Name shown in TAP output and matched by filters, e.g.
    /// `store::save_survives_torn_write`.
    pub fn qualified_name(&self) -> String {
        let module = self
            .module
            .split("::")
            .skip(1)
            .filter(|part| *part != "tap_tests")
            .collect::<Vec<_>>()
            .join("::");
        if module.is_empty() {
            self.name.to_string()
        } else {
            format!("{}::{}", module, self.name)
        }
    }
}

inventory::collect!(TapTestEntry);

fn selected(filter: Option<&str>) -> impl Iterator<Item = (&'static TapTestEntry, String)> + '_ {
    inventory::iter::<TapTestEntry>
        .into_iter()
        .map(|entry| (entry, entry.qualified_name()))
        .filter(move |(_, name)| filter.map_or(true, |f| name.contains(f)))
}

/// Number of registered tests.
pub fn test_count() -> usize {
    selected(None).count()
}

/// Run every registered test. Returns true if none failed.
pub fn run_all_tests() -> bool {
    run_matching(None)
}

/// Run the tests whose qualified name contains `filter` (all when `None`).
pub fn run_matching(filter: Option<&str>) -> bool {
    let mut runner = TestRunner::new();
    runner.print_header(selected(filter).count());
    if let Some(filter) = filter {
        TestRunner::comment(&format!("filter: {}", filter));
    }

    for (entry, name) in selected(filter) {
        (entry.register)(&mut runner, &name);
    }

    runner.finish()
}

/// How one test ended.
enum Outcome {
    Pass,
    Fail(String),
    Skip(&'static str),
}

/// Extract a human-readable message from a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Counts results and prints one TAP line per test.
#[derive(Debug, Default)]
pub struct TestRunner {
    tests_run: usize,
    tests_passed: usize,
    tests_failed: usize,
    tests_skipped: usize,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, name: &str, outcome: Outcome) {
        self.tests_run += 1;
        match outcome {
            Outcome::Pass => {
                self.tests_passed += 1;
                println!("ok {} - {}", self.tests_run, name);
            }
            Outcome::Fail(reason) => {
                self.tests_failed += 1;
                println!("not ok {} - {}", self.tests_run, name);
                println!("# {}", reason);
            }
            Outcome::Skip(reason) => {
                self.tests_skipped += 1;
                println!("ok {} - {} # SKIP {}", self.tests_run, name, reason);
            }
        }
    }

    /// Report a test that cannot run in this build.
    pub fn skip(&mut self, name: &str, reason: &'static str) {
        self.record(name, Outcome::Skip(reason));
    }

    /// Run a test returning [`TestResult`]. Panics count as failures.
    pub fn run<F>(&mut self, name: &str, test_fn: F)
    where
        F: FnOnce() -> TestResult + std::panic::UnwindSafe,
    {
        let outcome = match catch_unwind(AssertUnwindSafe(test_fn)) {
            Ok(Ok(())) => Outcome::Pass,
            Ok(Err(e)) => Outcome::Fail(format!("Error: {}", e)),
            Err(payload) => Outcome::Fail(format!("Panic: {}", panic_message(&*payload))),
        };
        self.record(name, outcome);
    }

    /// Run a test that signals failure by panicking.
    pub fn run_assert<F>(&mut self, name: &str, test_fn: F)
    where
        F: FnOnce() + std::panic::UnwindSafe,
    {
        self.run(name, || {
            test_fn();
            Ok(())
        });
    }

    /// Run a test that must panic, optionally with a message containing
    /// `expected`.
    pub fn run_should_panic<F>(&mut self, name: &str, test_fn: F, expected: Option<&str>)
    where
        F: FnOnce() + std::panic::UnwindSafe,
    {
        let outcome = match catch_unwind(AssertUnwindSafe(test_fn)) {
            Ok(()) => Outcome::Fail("Expected panic but test completed normally".into()),
            Err(payload) => {
                let msg = panic_message(&*payload);
                match expected {
                    Some(expected) if !msg.contains(expected) => Outcome::Fail(format!(
                        "Expected panic containing '{}', got '{}'",
                        expected, msg
                    )),
                    _ => Outcome::Pass,
                }
            }
        };
        self.record(name, outcome);
    }

    /// Print the TAP header. Call this before running tests.
    pub fn print_header(&self, planned_tests: usize) {
        println!("TAP version 14");
        println!("1..{}", planned_tests);
    }

    /// Print a diagnostic comment.
    pub fn comment(msg: &str) {
        println!("# {}", msg);
    }

    /// Print the summary. Returns true if every test passed.
    pub fn finish(&self) -> bool {
        println!("# -----------------------");
        println!("# Tests run: {}", self.tests_run);
        println!("# Passed: {}", self.tests_passed);
        println!("# Failed: {}", self.tests_failed);
        if self.tests_skipped > 0 {
            println!("# Skipped: {}", self.tests_skipped);
        }

        let passed = self.tests_failed == 0;
        println!("# Result: {}", if passed { "PASS" } else { "FAIL" });
        passed
    }

    pub fn tests_run(&self) -> usize {
        self.tests_run
    }

    pub fn tests_passed(&self) -> usize {
        self.tests_passed
    }

    pub fn tests_failed(&self) -> usize {
        self.tests_failed
    }

    pub fn tests_skipped(&self) -> usize {
        self.tests_skipped
    }
}

// The harness checks itself through its own TAP tests
mod tap_tests {
    use super::*;
    use blynk_board_esp32_macros::tap_test;

    #[tap_test]
    fn runner_counts_results() {
        let mut runner = TestRunner::new();
        runner.run("pass", || Ok(()));
        runner.run("fail", || Err("test error".into()));
        runner.run_assert("panic", || panic!("intentional panic"));
        assert_eq!(runner.tests_run(), 3);
        assert_eq!(runner.tests_passed(), 1);
        assert_eq!(runner.tests_failed(), 2);
        assert!(!runner.finish());
    }

    #[tap_test]
    fn runner_checks_expected_panic() {
        let mut runner = TestRunner::new();
        runner.run_should_panic("matches", || panic!("bad port"), Some("port"));
        runner.run_should_panic("mismatch", || panic!("bad host"), Some("port"));
        runner.run_should_panic("no panic", || {}, None);
        assert_eq!(runner.tests_passed(), 1);
        assert_eq!(runner.tests_failed(), 2);
    }

    #[tap_test]
    fn registry_is_populated() {
        assert!(test_count() >= 3);
        assert_eq!(selected(Some("testing::registry_is_populated")).count(), 1);
    }

    #[tap_test]
    fn names_are_module_qualified() {
        let entry = TapTestEntry::new("blynk_board_esp32::store::tap_tests", "torn_write", |_, _| {});
        assert_eq!(entry.qualified_name(), "store::torn_write");
        assert!(selected(Some("store::")).all(|(_, name)| name.starts_with("store::")));
    }

    #[tap_test]
    fn skipped_tests_do_not_fail_the_run() {
        let mut runner = TestRunner::new();
        runner.run("pass", || Ok(()));
        runner.skip("board only", "needs the board");
        assert_eq!(runner.tests_run(), 2);
        assert_eq!(runner.tests_skipped(), 1);
        assert!(runner.finish());
    }
}
