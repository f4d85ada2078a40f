use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStartParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub success: bool,
    pub run_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutputParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// When set, the read drains the buffer so repeated reads never overlap.
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutputChunk {
    pub success: bool,
    pub output: String,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStopParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStopped {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunList {
    pub runs: Vec<RunSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub config_name: String,
    pub project_name: String,
    pub start_time: DateTime<Utc>,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_serializes_rfc3339_start_time() {
        let summary = RunSummary {
            run_id: "run-7".to_string(),
            config_name: "Server".to_string(),
            project_name: "demo".to_string(),
            start_time: DateTime::parse_from_rfc3339("2026-08-06T10:00:00Z")
                .expect("timestamp")
                .with_timezone(&Utc),
            running: true,
            exit_code: None,
        };
        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["runId"], "run-7");
        assert_eq!(json["startTime"], "2026-08-06T10:00:00Z");
        assert!(json.get("exitCode").is_none());
    }

    #[test]
    fn output_params_clear_defaults_off() {
        let params: RunOutputParams =
            serde_json::from_str(r#"{"runId":"run-1"}"#).expect("deserialize");
        assert_eq!(params.run_id.as_deref(), Some("run-1"));
        assert!(!params.clear);
    }
}
