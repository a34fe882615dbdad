// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Rooms and the scope used to narrow availability queries.

use crate::base::{PropertyId, RoomId, RoomTypeId};
use serde::{Deserialize, Serialize};

/// Operational status, owned by housekeeping and admin workflows.
///
/// Independent of reservations: a room can be `Occupied` today and still be
/// bookable for next month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Available,
    Occupied,
    Maintenance,
    OutOfService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub property: PropertyId,
    pub room_type: RoomTypeId,
    pub number: String,
    pub status: RoomStatus,
    pub active: bool,
}

impl Room {
    pub fn new(id: RoomId, property: PropertyId, room_type: RoomTypeId, number: impl Into<String>) -> Self {
        Self {
            id,
            property,
            room_type,
            number: number.into(),
            status: RoomStatus::Available,
            active: true,
        }
    }

    /// Whether the room may be offered and reserved at all.
    pub fn is_bookable(&self) -> bool {
        self.active && !matches!(self.status, RoomStatus::Maintenance | RoomStatus::OutOfService)
    }
}

/// Narrows an availability query. Empty scope matches every room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomScope {
    pub property: Option<PropertyId>,
    pub room_type: Option<RoomTypeId>,
}

impl RoomScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn property(property: PropertyId) -> Self {
        Self {
            property: Some(property),
            room_type: None,
        }
    }

    pub fn room_type(room_type: RoomTypeId) -> Self {
        Self {
            property: None,
            room_type: Some(room_type),
        }
    }

    pub fn matches(&self, room: &Room) -> bool {
        self.property.is_none_or(|p| p == room.property)
            && self.room_type.is_none_or(|t| t == room.room_type)
    }
}
