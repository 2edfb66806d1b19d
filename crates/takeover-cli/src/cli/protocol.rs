use serde::{Deserialize, Serialize};

/// Outcome of one CLI command, printed as JSON
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl Response {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// CLI command parsed from arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Create a reminder
    Add {
        title: String,
        date: String,
        time: String,
        note: String,
    },
    /// Replace a reminder's fields, keeping its id
    Edit {
        id: String,
        title: String,
        date: String,
        time: String,
        note: String,
    },
    /// Active reminders, soonest first
    List,
    /// Delete one reminder and its alarm
    Delete { id: String },
    /// Delete every reminder and alarm
    Clear,
    /// Whitelist management
    Sites(SitesCommand),
    /// Storage usage against the quota
    Usage,
    /// One test takeover against the configured tabs
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitesCommand {
    List,
    Add { site: String },
    Remove { site: String },
}

impl CliCommand {
    /// Method name used in logs
    pub fn method(&self) -> &'static str {
        match self {
            CliCommand::Add { .. } => "add",
            CliCommand::Edit { .. } => "edit",
            CliCommand::List => "list",
            CliCommand::Delete { .. } => "delete",
            CliCommand::Clear => "clear",
            CliCommand::Sites(SitesCommand::List) => "sites_list",
            CliCommand::Sites(SitesCommand::Add { .. }) => "sites_add",
            CliCommand::Sites(SitesCommand::Remove { .. }) => "sites_remove",
            CliCommand::Usage => "usage",
            CliCommand::Test => "test",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let ok = serde_json::to_value(Response::success(serde_json::json!({"n": 1}))).unwrap();
        assert_eq!(ok, serde_json::json!({"result": {"n": 1}}));

        let err = serde_json::to_value(Response::error("not_found", "Reminder not found")).unwrap();
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "not_found", "message": "Reminder not found"}})
        );
    }

    #[test]
    fn test_method_names() {
        assert_eq!(CliCommand::List.method(), "list");
        assert_eq!(
            CliCommand::Sites(SitesCommand::Remove {
                site: "example.com".into()
            })
            .method(),
            "sites_remove"
        );
    }
}
