//! Answers to the three-question feedback survey.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One survey submission. Repeat submissions add rows; only existence is
/// ever checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub user_id: String,
    pub problem_solved: Option<String>,
    pub most_important_feature: Option<String>,
    pub improvement: Option<String>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}
