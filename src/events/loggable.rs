use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity logs; drives retention and filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Never auto-deleted. All access-control changes land here.
    Critical,
    #[default]
    Important,
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can be written to the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. "role" in "role.created".
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "role_assigned" => Severity::Critical,
            "login" => Severity::Noise,
            _ => self.severity(),
        }
    }
}
