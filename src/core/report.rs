use crate::domain::model::{EventKind, Stage};
use crate::utils::error::ConfigurationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub stage: Stage,
    pub record_key: Option<String>,
    pub error_message: String,
    /// 在讀取串流中的位置，用來還原順序
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<usize>,
}

/// 使整次執行提前結束的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FatalError {
    Configuration { errors: Vec<ConfigurationError> },
    SourceUnreachable { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    SuccessWithFailures,
    Fatal,
}

/// 單次執行的結果彙整
///
/// Callers are expected to read the counters and the failure list; partial
/// success is the common case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub action_name: String,
    pub read_success: usize,
    pub read_failure: usize,
    pub format_success: usize,
    pub format_failure: usize,
    pub write_success: usize,
    pub write_failure: usize,
    pub failures: Vec<FailureDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl ActionReport {
    pub fn new(action_name: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn configuration_failure(
        action_name: impl Into<String>,
        errors: Vec<ConfigurationError>,
    ) -> Self {
        Self {
            fatal: Some(FatalError::Configuration { errors }),
            ..Self::new(action_name)
        }
    }

    pub(crate) fn count(&mut self, kind: EventKind) {
        let counter = match kind {
            EventKind::ReadSuccess => &mut self.read_success,
            EventKind::ReadFailure => &mut self.read_failure,
            EventKind::FormatSuccess => &mut self.format_success,
            EventKind::FormatFailure => &mut self.format_failure,
            EventKind::WriteSuccess => &mut self.write_success,
            EventKind::WriteFailure => &mut self.write_failure,
        };
        *counter += 1;
    }

    pub(crate) fn push_failure(
        &mut self,
        stage: Stage,
        sequence: usize,
        record_key: Option<String>,
        error_message: String,
    ) {
        self.failures.push(FailureDetail {
            stage,
            record_key,
            error_message,
            sequence: Some(sequence),
        });
    }

    pub fn count_of(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::ReadSuccess => self.read_success,
            EventKind::ReadFailure => self.read_failure,
            EventKind::FormatSuccess => self.format_success,
            EventKind::FormatFailure => self.format_failure,
            EventKind::WriteSuccess => self.write_success,
            EventKind::WriteFailure => self.write_failure,
        }
    }

    pub fn failures_at(&self, stage: Stage) -> impl Iterator<Item = &FailureDetail> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn status(&self) -> RunStatus {
        if self.is_fatal() {
            RunStatus::Fatal
        } else if self.has_failures() {
            RunStatus::SuccessWithFailures
        } else {
            RunStatus::Success
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FieldError;

    #[test]
    fn test_status() {
        let mut report = ActionReport::new("profiles");
        assert_eq!(report.status(), RunStatus::Success);

        report.count(EventKind::FormatFailure);
        report.push_failure(Stage::Format, 3, Some("3".to_string()), "bad name".to_string());
        assert_eq!(report.status(), RunStatus::SuccessWithFailures);
        assert_eq!(report.failures_at(Stage::Format).count(), 1);
        assert_eq!(report.count_of(EventKind::FormatFailure), 1);

        report.fatal = Some(FatalError::SourceUnreachable {
            message: "connection refused".to_string(),
        });
        assert_eq!(report.status(), RunStatus::Fatal);
    }

    #[test]
    fn test_report_shape() {
        let mut report = ActionReport::new("jobs");
        report.count(EventKind::ReadSuccess);
        report.count(EventKind::WriteFailure);
        report.push_failure(Stage::Write, 0, None, "batch_failure: timeout".to_string());

        let json = serde_json::to_value(&report).unwrap();
        for key in [
            "read_success",
            "read_failure",
            "format_success",
            "format_failure",
            "write_success",
            "write_failure",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["failures"][0]["stage"], "write");
        assert_eq!(json["failures"][0]["record_key"], serde_json::Value::Null);
        assert_eq!(json["failures"][0]["error_message"], "batch_failure: timeout");
        assert!(json.get("fatal").is_none());
    }

    #[test]
    fn test_configuration_failure_has_zero_counts() {
        let report = ActionReport::configuration_failure(
            "jobs",
            vec![ConfigurationError::WriteParameter {
                error: FieldError::MissingField {
                    field: "api_key".to_string(),
                },
            }],
        );
        assert_eq!(report.read_success + report.write_success, 0);
        assert!(report.failures.is_empty());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fatal"]["reason"], "configuration");
        assert_eq!(json["fatal"]["errors"][0]["kind"], "write_parameter");
    }
}
