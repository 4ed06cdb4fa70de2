// THEORY:
// The dashboard shows up to four camera feeds side by side. `CameraSlots` is the
// single owner of which feed occupies which tile; presenters render from it and
// never keep their own copy of slot state.
//
// Placement rule: a new feed takes the first empty slot. When every slot is busy
// the first slot is replaced, so opening a camera always succeeds.

use serde::Deserialize;

pub const SLOT_COUNT: usize = 4;

/// A camera as listed by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

/// A feed placed in a slot. `stream_path` points at the backend's annotated
/// stream (face boxes and emotion labels drawn in), not the raw camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFeed {
    pub camera_id: u64,
    pub name: String,
    pub stream_path: String,
}

impl CameraFeed {
    pub fn annotated(camera_id: u64, name: impl Into<String>) -> Self {
        Self {
            camera_id,
            name: name.into(),
            stream_path: format!("/cemera/stream/{camera_id}/"),
        }
    }
}

impl From<&CameraInfo> for CameraFeed {
    fn from(info: &CameraInfo) -> Self {
        CameraFeed::annotated(info.id, info.name.clone())
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    feed: Option<CameraFeed>,
    fullscreen: bool,
}

/// Fixed-size registry of camera tiles, indexed `0..SLOT_COUNT`.
#[derive(Debug, Clone, Default)]
pub struct CameraSlots {
    slots: [Slot; SLOT_COUNT],
}

impl CameraSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `feed` in the first empty slot, or replaces slot 0 when all are
    /// taken. Returns the slot index used.
    pub fn assign(&mut self, feed: CameraFeed) -> usize {
        let index = self.slots.iter().position(|slot| slot.feed.is_none()).unwrap_or(0);
        self.slots[index] = Slot {
            feed: Some(feed),
            fullscreen: false,
        };
        index
    }

    /// Empties a slot and returns its previous feed.
    pub fn release(&mut self, index: usize) -> Option<CameraFeed> {
        let slot = self.slots.get_mut(index)?;
        slot.fullscreen = false;
        slot.feed.take()
    }

    pub fn occupant(&self, index: usize) -> Option<&CameraFeed> {
        self.slots.get(index).and_then(|slot| slot.feed.as_ref())
    }

    /// Flips the fullscreen flag of an occupied slot. Returns the new flag, or
    /// `None` for an empty or out-of-range slot.
    pub fn toggle_fullscreen(&mut self, index: usize) -> Option<bool> {
        let slot = self.slots.get_mut(index)?;
        slot.feed.as_ref()?;
        slot.fullscreen = !slot.fullscreen;
        Some(slot.fullscreen)
    }

    pub fn is_fullscreen(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.fullscreen)
    }

    /// Leaves fullscreen on every slot. Returns how many slots changed.
    pub fn exit_fullscreen(&mut self) -> usize {
        let mut changed = 0;
        for slot in self.slots.iter_mut().filter(|slot| slot.fullscreen) {
            slot.fullscreen = false;
            changed += 1;
        }
        changed
    }

    pub fn occupied(&self) -> impl Iterator<Item = (usize, &CameraFeed)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.feed.as_ref().map(|feed| (index, feed)))
    }
}
