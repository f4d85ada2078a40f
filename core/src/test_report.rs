//! Test result extraction.
//!
//! The result tree is populated by the host's own reporting pipeline after
//! the test process exits, so extraction polls with a bounded retry budget
//! and falls back to exit-code-only reporting when the tree never shows up.

use std::sync::OnceLock;

use regex_lite::Regex;
use tokio::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use hostbridge_protocol::TestCaseResult;
use hostbridge_protocol::TestStatus;

use crate::error::BridgeError;
use crate::error::Result;

/// Node of the host's result tree: containers recurse, leaves classify.
#[derive(Debug, Clone, PartialEq)]
pub enum TestNode {
    Suite {
        name: String,
        children: Vec<TestNode>,
    },
    Case {
        name: String,
        outcome: CaseOutcome,
        /// Captured diagnostic text (assertion message, stack trace).
        diagnostics: Option<String>,
    },
}

/// Raw leaf classification as the host reports it. Defects are refined into
/// assertion-failure vs exception from the diagnostic text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Ignored,
    Defect,
}

/// Bounded retry budget for extraction; explicit configuration, so
/// termination is obvious.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(200),
        }
    }
}

fn assertion_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"(?i)\bassert|comparison failure|expected:.*but was")
            .expect("assertion pattern is valid")
    })
}

fn classify_defect(diagnostics: Option<&str>) -> TestStatus {
    match diagnostics {
        Some(text) if assertion_pattern().is_match(text) => TestStatus::AssertionFailed,
        _ => TestStatus::Exception,
    }
}

/// Flattens the tree into terminal cases, suite names joined with `.`.
pub fn flatten_cases(tree: &TestNode) -> Vec<TestCaseResult> {
    let mut cases = Vec::new();
    collect(tree, None, &mut cases);
    cases
}

fn collect(node: &TestNode, prefix: Option<&str>, into: &mut Vec<TestCaseResult>) {
    match node {
        TestNode::Suite { name, children } => {
            let joined = match prefix {
                Some(prefix) if !name.is_empty() => format!("{prefix}.{name}"),
                Some(prefix) => prefix.to_string(),
                None => name.clone(),
            };
            for child in children {
                let next = if joined.is_empty() { None } else { Some(joined.as_str()) };
                collect(child, next, into);
            }
        }
        TestNode::Case {
            name,
            outcome,
            diagnostics,
        } => {
            let full_name = match prefix {
                Some(prefix) => format!("{prefix}.{name}"),
                None => name.clone(),
            };
            let status = match outcome {
                CaseOutcome::Passed => TestStatus::Passed,
                CaseOutcome::Ignored => TestStatus::Ignored,
                CaseOutcome::Defect => classify_defect(diagnostics.as_deref()),
            };
            into.push(TestCaseResult {
                name: full_name,
                status,
                message: diagnostics.clone(),
            });
        }
    }
}

/// Polls `source` for the result tree up to the retry budget, then falls
/// back to exit-code-only reporting.
///
/// A nonzero exit with no tree yields a single synthetic failure entry. A
/// zero exit with no tree is [`BridgeError::NoMatchingTests`], a reportable
/// condition, never a false success. A `source` error is a reporting
/// pipeline fault and aborts the retries immediately.
pub async fn extract_with_retry(
    policy: &RetryPolicy,
    mut source: impl FnMut() -> anyhow::Result<Option<TestNode>>,
    exit_code: i32,
) -> Result<Vec<TestCaseResult>> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 0..attempts {
        let tree = source().map_err(|err| BridgeError::ExtractionFailed {
            reason: err.to_string(),
        })?;
        if let Some(tree) = tree {
            let cases = flatten_cases(&tree);
            if !cases.is_empty() {
                debug!(attempt, cases = cases.len(), "result tree extracted");
                return Ok(cases);
            }
        }
        if attempt + 1 < attempts {
            sleep(policy.delay).await;
        }
    }

    if exit_code != 0 {
        warn!(exit_code, "result tree never materialized; reporting exit code only");
        return Ok(vec![TestCaseResult {
            name: "test process".to_string(),
            status: TestStatus::Exception,
            message: Some(format!(
                "process exited with code {exit_code} before any results were reported"
            )),
        }]);
    }
    Err(BridgeError::NoMatchingTests)
}
