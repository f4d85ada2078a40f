use serde::Deserialize;
use serde::Serialize;

/// Request to run an incremental (or full) build of the open project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildParams {
    #[serde(default = "default_incremental")]
    pub incremental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            incremental: true,
            timeout_seconds: None,
            project_ref: None,
        }
    }
}

fn default_incremental() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutcome {
    pub success: bool,
    pub errors: Vec<CompilerMessage>,
    pub warnings: Vec<CompilerMessage>,
    pub time_ms: u64,
    #[serde(default)]
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Request to run the tests matching `pattern`.
///
/// `pattern` is required by the contract; it is optional here so the handler
/// layer can classify its absence as a validation failure rather than a
/// deserialization fault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub success: bool,
    pub tests: Vec<TestCaseResult>,
    pub time_ms: u64,
    #[serde(default)]
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub name: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Terminal classification of a single test case.
///
/// Defects are split into assertion failures and unexpected exceptions so a
/// caller can distinguish "the code is wrong" from "the test blew up".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Ignored,
    AssertionFailed,
    Exception,
}

impl TestStatus {
    pub fn is_defect(self) -> bool {
        matches!(self, Self::AssertionFailed | Self::Exception)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn build_params_default_to_incremental() {
        let params: BuildParams = serde_json::from_str("{}").expect("deserialize");
        assert!(params.incremental);
        assert_eq!(params.timeout_seconds, None);
    }

    #[test]
    fn outcome_uses_camel_case_field_names() {
        let outcome = BuildOutcome {
            success: false,
            errors: vec![CompilerMessage {
                message: "cannot find symbol".to_string(),
                file: Some("src/Main.x".to_string()),
                line: Some(12),
            }],
            warnings: Vec::new(),
            time_ms: 420,
            aborted: false,
        };
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["timeMs"], 420);
        assert_eq!(json["errors"][0]["file"], "src/Main.x");
    }

    #[test]
    fn test_status_defect_split() {
        assert!(TestStatus::AssertionFailed.is_defect());
        assert!(TestStatus::Exception.is_defect());
        assert!(!TestStatus::Passed.is_defect());
        assert!(!TestStatus::Ignored.is_defect());
    }
}
