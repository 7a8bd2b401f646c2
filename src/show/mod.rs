use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::display::DisplayRegistry;
use crate::playback::coordinator::PlaybackCoordinator;
use crate::{CastError, Result, UserId, WorldPoint};

pub mod schedule;

use schedule::ScheduleEntry;

/// The spatial region whose occupants count as a room's audience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioZone {
    pub center: WorldPoint,
    pub radius: f64,
}

/// A named grouping of displays sharing an audio zone and a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Ordered: the first resolvable display's session carries audio.
    pub display_ids: Vec<String>,
    pub audio_zone: Option<AudioZone>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowState {
    Running,
    Stopped,
}

/// One media source fanned out across a room's displays. At most one of its
/// sessions carries audio.
pub struct Show {
    pub room_id: String,
    pub media_id: String,
    pub display_ids: Vec<String>,
    pub session_ids: Vec<Uuid>,
    /// Users inside the room's audio zone, refreshed each tick by the engine.
    /// The audio session's listener filter reads this through the shared Arc.
    pub audience: Arc<Mutex<HashSet<UserId>>>,
    pub state: ShowState,
    pub started_at: DateTime<Utc>,
}

/// Diagnostic summary for the command surface.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub rooms: usize,
    pub active_shows: usize,
    pub schedules: usize,
    pub warnings: Vec<String>,
}

/// Owns rooms, their schedules, and the active shows. Session lifecycles stay
/// with the PlaybackCoordinator; the orchestrator tracks which sessions make
/// up each show and detects orphans.
pub struct ShowOrchestrator {
    rooms: HashMap<String, Room>,
    shows: HashMap<String, Show>,
    max_shows: usize,
}

impl ShowOrchestrator {
    pub fn new(max_shows: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            shows: HashMap::new(),
            max_shows,
        }
    }

    // Room administration

    pub fn create_room(&mut self, room: Room) -> Result<()> {
        if self.rooms.contains_key(&room.id) {
            return Err(CastError::Show(format!("room {} already exists", room.id)));
        }
        self.rooms.insert(room.id.clone(), room);
        Ok(())
    }

    pub fn delete_room(&mut self, room_id: &str) -> Option<Room> {
        self.rooms.remove(room_id)
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn rooms(&self) -> Vec<Room> {
        let mut all: Vec<Room> = self.rooms.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    // Show lifecycle

    pub fn has_show(&self, room_id: &str) -> bool {
        self.shows.contains_key(room_id)
    }

    pub fn show_count(&self) -> usize {
        self.shows.len()
    }

    /// Pre-start gate: room exists, no show active there, limit not reached.
    /// Nothing is registered until the caller has started every session.
    pub fn ensure_can_start(&self, room_id: &str) -> Result<()> {
        if !self.rooms.contains_key(room_id) {
            return Err(CastError::Show(format!("no such room: {}", room_id)));
        }
        if self.shows.contains_key(room_id) {
            return Err(CastError::Show(format!(
                "room {} already has an active show; stop it first",
                room_id
            )));
        }
        if self.shows.len() >= self.max_shows {
            return Err(CastError::Show(format!(
                "show limit reached ({} active)",
                self.max_shows
            )));
        }
        Ok(())
    }

    pub fn register_show(&mut self, show: Show) {
        self.shows.insert(show.room_id.clone(), show);
    }

    pub fn remove_show(&mut self, room_id: &str) -> Option<Show> {
        self.shows.remove(room_id)
    }

    pub fn show(&self, room_id: &str) -> Option<&Show> {
        self.shows.get(room_id)
    }

    pub fn show_room_ids(&self) -> Vec<String> {
        self.shows.keys().cloned().collect()
    }

    pub fn set_show_audience(&self, room_id: &str, users: HashSet<UserId>) {
        if let Some(show) = self.shows.get(room_id) {
            *show.audience.lock().unwrap() = users;
        }
    }

    /// Rooms whose show has lost every session — natural end or external
    /// stops. Expected at end-of-media, so not an error.
    pub fn orphaned_shows(&self, coordinator: &PlaybackCoordinator) -> Vec<String> {
        self.shows
            .iter()
            .filter(|(_, show)| {
                !show
                    .session_ids
                    .iter()
                    .any(|id| coordinator.contains_session(*id))
            })
            .map(|(room_id, _)| room_id.clone())
            .collect()
    }

    // Schedules

    pub fn add_schedule(&mut self, entry: ScheduleEntry) -> Result<()> {
        match self.rooms.get_mut(&entry.room_id) {
            Some(room) => {
                room.schedules.push(entry);
                Ok(())
            }
            None => Err(CastError::Schedule(format!(
                "no such room: {}",
                entry.room_id
            ))),
        }
    }

    pub fn remove_schedule(&mut self, room_id: &str, entry_id: Uuid) -> Result<bool> {
        match self.rooms.get_mut(room_id) {
            Some(room) => {
                let before = room.schedules.len();
                room.schedules.retain(|e| e.id != entry_id);
                Ok(room.schedules.len() != before)
            }
            None => Err(CastError::Schedule(format!("no such room: {}", room_id))),
        }
    }

    pub fn schedules(&self, room_id: &str) -> Result<Vec<ScheduleEntry>> {
        self.rooms
            .get(room_id)
            .map(|r| r.schedules.clone())
            .ok_or_else(|| CastError::Schedule(format!("no such room: {}", room_id)))
    }

    /// Due entries in rooms without an active show: (room, media, entry).
    pub fn due_entries(&self, now: DateTime<Utc>) -> Vec<(String, String, Uuid)> {
        self.rooms
            .values()
            .filter(|room| !self.shows.contains_key(&room.id))
            .flat_map(|room| {
                room.schedules
                    .iter()
                    .filter(|e| e.is_due(now))
                    .map(|e| (room.id.clone(), e.media_id.clone(), e.id))
            })
            .collect()
    }

    pub fn mark_triggered(&mut self, room_id: &str, entry_id: Uuid, now: DateTime<Utc>) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            if let Some(entry) = room.schedules.iter_mut().find(|e| e.id == entry_id) {
                entry.mark_triggered(now);
            }
        }
    }

    // Diagnostics

    pub fn doctor(&self, displays: &DisplayRegistry) -> DoctorReport {
        let mut warnings = Vec::new();
        for room in self.rooms.values() {
            let resolvable = room
                .display_ids
                .iter()
                .filter(|id| displays.contains(id))
                .count();
            if resolvable == 0 {
                warnings.push(format!(
                    "room {} has no resolvable displays ({} configured)",
                    room.id,
                    room.display_ids.len()
                ));
            }
        }
        DoctorReport {
            rooms: self.rooms.len(),
            active_shows: self.shows.len(),
            schedules: self.rooms.values().map(|r| r.schedules.len()).sum(),
            warnings,
        }
    }
}
