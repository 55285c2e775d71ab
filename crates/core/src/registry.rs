//! Room registry - the in-memory catalogue of debate rooms
//!
//! The registry owns room metadata for listing and lobby operations.
//! Live state of a running room belongs to its `DebateSession`; the
//! registry copy is refreshed whenever the session reports a change.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::invariants;
use crate::models::{DebateLevel, DebateType, Debater, Room, RoomStatus};
use crate::wizard::RoomDraft;
use crate::{Error, Result};

/// Listing filter; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFilter {
    pub status: Option<RoomStatus>,
    pub debate_type: Option<DebateType>,
    pub level: Option<DebateLevel>,
    /// Case-insensitive match on theme or tags
    pub query: Option<String>,
}

impl RoomFilter {
    pub fn matches(&self, room: &Room) -> bool {
        if self.status.is_some_and(|s| s != room.status) {
            return false;
        }
        if self.debate_type.is_some_and(|t| t != room.debate_type) {
            return false;
        }
        if self.level.is_some_and(|l| l != room.level) {
            return false;
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                room.theme.to_lowercase().contains(&q)
                    || room.tags.iter().any(|t| t.to_lowercase().contains(&q))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomSort {
    /// Newest first
    #[default]
    Recent,
    /// Largest audience first
    Popular,
    /// Earliest scheduled or started first, unscheduled last
    StartingSoon,
}

/// Central store of rooms by ID
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<Uuid, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted rooms
    pub fn from_rooms(rooms: impl IntoIterator<Item = Room>) -> Self {
        let mut registry = Self::new();
        for room in rooms {
            registry.upsert(room);
        }
        registry
    }

    /// Create a scheduled room from a validated draft
    pub fn create_room(&mut self, draft: RoomDraft, creator_id: Uuid, now: DateTime<Utc>) -> Result<&Room> {
        draft.validate()?;

        let mut room = Room::new(draft.theme, creator_id)
            .with_description(draft.description)
            .with_type(draft.debate_type);
        room.format = draft.format;
        room.level = draft.level;
        room.rules = draft.rules;
        room.tags = draft.tags;
        room.scheduled_at = draft.scheduled_at;
        room.created_at = now;

        invariants::assert_room_invariants(&room);
        let id = room.id;
        tracing::info!(room_id = %id, creator = %creator_id, "Created room");
        self.rooms.insert(id, room);
        self.get_required(id)
    }

    /// Insert or replace a room
    pub fn upsert(&mut self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    pub fn get(&self, room_id: Uuid) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    fn get_required(&self, room_id: Uuid) -> Result<&Room> {
        self.rooms
            .get(&room_id)
            .ok_or_else(|| Error::NotFound(format!("Room {}", room_id)))
    }

    fn get_required_mut(&mut self, room_id: Uuid) -> Result<&mut Room> {
        self.rooms
            .get_mut(&room_id)
            .ok_or_else(|| Error::NotFound(format!("Room {}", room_id)))
    }

    pub fn contains(&self, room_id: Uuid) -> bool {
        self.rooms.contains_key(&room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Filtered and sorted listing
    pub fn list(&self, filter: &RoomFilter, sort: RoomSort) -> Vec<&Room> {
        let mut rooms: Vec<&Room> = self.rooms.values().filter(|r| filter.matches(r)).collect();
        match sort {
            RoomSort::Recent => rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            RoomSort::Popular => rooms.sort_by(|a, b| {
                b.audience_count
                    .cmp(&a.audience_count)
                    .then(b.created_at.cmp(&a.created_at))
            }),
            RoomSort::StartingSoon => rooms.sort_by(|a, b| match (a.start_key(), b.start_key()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => b.created_at.cmp(&a.created_at),
            }),
        }
        rooms
    }

    /// Assign the room's moderator. Only the creator may do this, before the room ends.
    pub fn set_moderator(&mut self, room_id: Uuid, actor_id: Uuid, moderator_id: Uuid) -> Result<&Room> {
        let room = self.get_required_mut(room_id)?;
        if room.creator_id != actor_id {
            return Err(Error::PermissionDenied(
                "Only the room creator can choose the moderator".to_string(),
            ));
        }
        if room.is_ended() {
            return Err(Error::InvalidOperation("Room has ended".to_string()));
        }
        if room.is_debater(moderator_id) {
            return Err(Error::InvalidOperation(
                "A debater cannot moderate the same room".to_string(),
            ));
        }
        room.moderator_id = Some(moderator_id);
        Ok(room)
    }

    /// Seat a debater in a scheduled or live room
    pub fn join_as_debater(
        &mut self,
        room_id: Uuid,
        user_id: Uuid,
        username: String,
        position: String,
        now: DateTime<Utc>,
    ) -> Result<&Debater> {
        let room = self.get_required_mut(room_id)?;
        let debater = room.add_debater(user_id, username, position, now)?;
        tracing::debug!(room_id = %room_id, user_id = %user_id, "Debater joined");
        Ok(debater)
    }

    /// Move a scheduled room live. The creator or moderator may start it.
    pub fn start_room(&mut self, room_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<&Room> {
        let room = self.get_required_mut(room_id)?;
        if room.creator_id != actor_id && room.moderator_id != Some(actor_id) {
            return Err(Error::PermissionDenied(
                "Only the creator or moderator can start the room".to_string(),
            ));
        }
        room.transition(RoomStatus::Live, now)?;
        tracing::info!(room_id = %room_id, "Room is live");
        Ok(room)
    }

    /// End a room
    pub fn end_room(&mut self, room_id: Uuid, now: DateTime<Utc>) -> Result<&Room> {
        let room = self.get_required_mut(room_id)?;
        room.transition(RoomStatus::Ended, now)?;
        tracing::info!(room_id = %room_id, "Room ended");
        Ok(room)
    }

    pub fn set_audience_count(&mut self, room_id: Uuid, count: u32) -> Result<()> {
        self.get_required_mut(room_id)?.audience_count = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(theme: &str) -> RoomDraft {
        RoomDraft::new(theme)
    }

    #[test]
    fn test_create_room_from_draft() {
        let mut registry = RoomRegistry::new();
        let creator = Uuid::new_v4();
        let mut d = draft("Should cities ban private cars?");
        d.tags = vec!["Urbanism".into()];
        d.debate_type = DebateType::HumanVsAi;

        let room = registry.create_room(d, creator, Utc::now()).unwrap();
        assert_eq!(room.status, RoomStatus::Scheduled);
        assert_eq!(room.creator_id, creator);
        assert_eq!(room.max_debaters, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_room_rejects_invalid_draft() {
        let mut registry = RoomRegistry::new();
        assert!(matches!(
            registry.create_room(draft("short"), Uuid::new_v4(), Utc::now()),
            Err(Error::Validation(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_filter_and_sort() {
        let mut registry = RoomRegistry::new();
        let now = Utc::now();
        let creator = Uuid::new_v4();

        let mut a = draft("Is mathematics discovered or invented?");
        a.level = DebateLevel::Advanced;
        a.tags = vec!["Philosophy".into()];
        let a = registry.create_room(a, creator, now).unwrap().id;

        let mut b = draft("Nuclear power and the climate");
        b.scheduled_at = Some(now + Duration::hours(2));
        let b = registry
            .create_room(b, creator, now + Duration::seconds(1))
            .unwrap()
            .id;

        let mut c = draft("Universal basic income now");
        c.scheduled_at = Some(now + Duration::hours(1));
        let c = registry
            .create_room(c, creator, now + Duration::seconds(2))
            .unwrap()
            .id;
        registry.set_audience_count(a, 40).unwrap();

        let recent: Vec<Uuid> = registry
            .list(&RoomFilter::default(), RoomSort::Recent)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(recent, vec![c, b, a]);

        let popular = registry.list(&RoomFilter::default(), RoomSort::Popular);
        assert_eq!(popular[0].id, a);

        let soon: Vec<Uuid> = registry
            .list(&RoomFilter::default(), RoomSort::StartingSoon)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(soon, vec![c, b, a]);

        let by_tag = RoomFilter {
            query: Some("philo".into()),
            ..Default::default()
        };
        assert_eq!(registry.list(&by_tag, RoomSort::Recent).len(), 1);

        let advanced = RoomFilter {
            level: Some(DebateLevel::Advanced),
            ..Default::default()
        };
        assert_eq!(registry.list(&advanced, RoomSort::Recent)[0].id, a);
    }

    #[test]
    fn test_start_requires_creator_or_moderator() {
        let mut registry = RoomRegistry::new();
        let creator = Uuid::new_v4();
        let moderator = Uuid::new_v4();
        let id = registry
            .create_room(draft("Should voting be compulsory?"), creator, Utc::now())
            .unwrap()
            .id;

        assert!(matches!(
            registry.start_room(id, Uuid::new_v4(), Utc::now()),
            Err(Error::PermissionDenied(_))
        ));
        registry.set_moderator(id, creator, moderator).unwrap();
        registry.start_room(id, moderator, Utc::now()).unwrap();
        assert!(registry.get(id).unwrap().is_live());

        // No going back
        assert!(matches!(
            registry.start_room(id, creator, Utc::now()),
            Err(Error::InvalidTransition { .. })
        ));
        registry.end_room(id, Utc::now()).unwrap();
        assert!(registry.end_room(id, Utc::now()).is_err());
    }

    #[test]
    fn test_join_respects_capacity() {
        let mut registry = RoomRegistry::new();
        let id = registry
            .create_room(draft("Should voting be compulsory?"), Uuid::new_v4(), Utc::now())
            .unwrap()
            .id;

        registry
            .join_as_debater(id, Uuid::new_v4(), "ana".into(), "For".into(), Utc::now())
            .unwrap();
        registry
            .join_as_debater(id, Uuid::new_v4(), "ben".into(), "Against".into(), Utc::now())
            .unwrap();
        assert!(registry
            .join_as_debater(id, Uuid::new_v4(), "cy".into(), "For".into(), Utc::now())
            .is_err());
        assert!(registry.get(id).unwrap().debaters.len() as u32 <= registry.get(id).unwrap().max_debaters);
    }
}
