use crate::core_modules::observation::{EmotionKind, Observation};
use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Entries kept for the person in front of the camera; matches one batch.
pub const PERSON_HISTORY_CAP: usize = 5;
/// Entries kept across all people in a session.
pub const GENERAL_HISTORY_CAP: usize = 20;

/// One rendered row of the detection history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub emotion_label: String,
    /// Confidence rounded to a whole percent.
    pub confidence: u8,
    /// Wall-clock time of the reading, `HH:MM:SS`.
    pub time: String,
    pub timestamp_millis: i64,
}

impl HistoryItem {
    pub fn at(observation: &Observation, when: DateTime<Local>) -> Self {
        Self {
            emotion_label: observation.emotion_label.clone(),
            confidence: observation.confidence.round().clamp(0.0, 100.0) as u8,
            time: when.format("%H:%M:%S").to_string(),
            timestamp_millis: when.timestamp_millis(),
        }
    }

    pub fn now(observation: &Observation) -> Self {
        Self::at(observation, Local::now())
    }

    pub fn kind(&self) -> Option<EmotionKind> {
        EmotionKind::from_key(&self.emotion_label)
    }
}

/// Newest-first log with a fixed number of entries.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    items: VecDeque<HistoryItem>,
    cap: usize,
}

impl HistoryLog {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap + 1),
            cap,
        }
    }

    pub fn push(&mut self, item: HistoryItem) {
        self.items.push_front(item);
        self.items.truncate(self.cap);
    }

    /// Entries, newest first.
    pub fn items(&self) -> Vec<HistoryItem> {
        self.items.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
