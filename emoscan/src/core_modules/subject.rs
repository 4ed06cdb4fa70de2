use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend identifier of a recognized person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub u64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The person currently in front of the camera, as recognized by the backend.
/// Field names on the wire follow the backend's person payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    #[serde(rename = "full_name")]
    pub display_name: String,
    /// URL of the enrolment photo, if the backend has one.
    #[serde(rename = "photo_url", default)]
    pub photo_ref: Option<String>,
    /// Face match confidence, in percent.
    #[serde(default)]
    pub confidence: f64,
    /// How many observations the backend already stored for this person.
    #[serde(rename = "camera_logs_count", default)]
    pub prior_observation_count: u32,
}

impl Subject {
    pub fn new(id: u64, display_name: impl Into<String>) -> Self {
        Self {
            id: SubjectId(id),
            display_name: display_name.into(),
            photo_ref: None,
            confidence: 0.0,
            prior_observation_count: 0,
        }
    }
}
