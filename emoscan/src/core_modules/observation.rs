// THEORY:
// An `Observation` is the smallest unit of evidence the session works with: one
// emotion label with the confidence the inference endpoint attached to it. It is
// an immutable value; the buffers and histories that hold observations copy them
// rather than share them.
//
// Labels are kept as the backend's raw keys (`"happy"`, `"sad"`, ...) so that a
// backend adding a new label never breaks the client. `EmotionKind` is the
// catalog of the labels this client knows how to name and decorate.

use crate::core_modules::subject::SubjectId;
use serde::{Deserialize, Serialize};

/// The label the inference endpoint returns when it saw a face but could not read it.
pub const UNDETECTED_LABEL: &str = "aniqlanmadi";

/// The label shown when the result panel is reset.
pub const RESTING_LABEL: &str = "neutral";

/// One (emotion, confidence) reading. Confidence is a percentage in `0..=100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "emotion")]
    pub emotion_label: String,
    pub confidence: f64,
}

impl Observation {
    pub fn new(emotion_label: impl Into<String>, confidence: f64) -> Self {
        Self {
            emotion_label: emotion_label.into(),
            confidence: confidence.clamp(0.0, 100.0),
        }
    }

    /// The catalog entry for this label, if the client knows it.
    pub fn kind(&self) -> Option<EmotionKind> {
        EmotionKind::from_key(&self.emotion_label)
    }

    /// Human readable name: the catalog's English name, or the raw label.
    pub fn display_name(&self) -> &str {
        match self.kind() {
            Some(kind) => kind.english(),
            None => &self.emotion_label,
        }
    }
}

/// True when a label carries an actual reading.
pub fn is_detected_label(label: &str) -> bool {
    !label.is_empty() && label != UNDETECTED_LABEL
}

/// The last observation tied to the current subject, held until the operator
/// confirms (persists) or discards it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResult {
    pub subject_id: SubjectId,
    pub observation: Observation,
    /// The backend's localized label, forwarded untouched when the result is saved.
    pub localized_label: Option<String>,
}

/// The emotions the inference backend is known to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionKind {
    Happy,
    Sad,
    Neutral,
    Angry,
    Surprise,
    Fear,
    Disgust,
}

impl EmotionKind {
    pub const ALL: [EmotionKind; 7] = [
        EmotionKind::Happy,
        EmotionKind::Sad,
        EmotionKind::Neutral,
        EmotionKind::Angry,
        EmotionKind::Surprise,
        EmotionKind::Fear,
        EmotionKind::Disgust,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }

    /// Looks a label up by the backend's localized name.
    pub fn from_localized(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.localized() == name)
    }

    pub fn key(self) -> &'static str {
        match self {
            EmotionKind::Happy => "happy",
            EmotionKind::Sad => "sad",
            EmotionKind::Neutral => "neutral",
            EmotionKind::Angry => "angry",
            EmotionKind::Surprise => "surprise",
            EmotionKind::Fear => "fear",
            EmotionKind::Disgust => "disgust",
        }
    }

    pub fn english(self) -> &'static str {
        match self {
            EmotionKind::Happy => "Happy",
            EmotionKind::Sad => "Sad",
            EmotionKind::Neutral => "Neutral",
            EmotionKind::Angry => "Angry",
            EmotionKind::Surprise => "Surprise",
            EmotionKind::Fear => "Fear",
            EmotionKind::Disgust => "Disgust",
        }
    }

    /// The backend's localized (Uzbek) display name.
    pub fn localized(self) -> &'static str {
        match self {
            EmotionKind::Happy => "HURSAND",
            EmotionKind::Sad => "CHARCHOQ (JISMONIY/RUHIY)",
            EmotionKind::Neutral => "BARQAROR (HOTIRJAM)",
            EmotionKind::Angry => "TAJAVUZLIK (ASABIY)",
            EmotionKind::Surprise => "NOSTANDART (STRESS)",
            EmotionKind::Fear => "QO'RQUV (HAVOTIR)",
            EmotionKind::Disgust => "JIRKANISH",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            EmotionKind::Happy => "😊",
            EmotionKind::Sad => "😢",
            EmotionKind::Neutral => "😐",
            EmotionKind::Angry => "😠",
            EmotionKind::Surprise => "😲",
            EmotionKind::Fear => "😨",
            EmotionKind::Disgust => "🤢",
        }
    }

    /// Accent color used by graphical presenters.
    pub fn color(self) -> &'static str {
        match self {
            EmotionKind::Happy => "#10b981",
            EmotionKind::Sad => "#6366f1",
            EmotionKind::Neutral => "#64748b",
            EmotionKind::Angry => "#ef4444",
            EmotionKind::Surprise => "#f59e0b",
            EmotionKind::Fear => "#8b5cf6",
            EmotionKind::Disgust => "#ec4899",
        }
    }
}
