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

//! Availability resolution.
//!
//! A room is available for `[check_in, check_out)` when it is bookable and no
//! pending, confirmed or checked-in booking on it overlaps the range. Pending
//! holds count as occupied until their payment window closes.
//!
//! Queries are reads and may be stale by the time a booking is created; the
//! authoritative check is the atomic claim in
//! [`InventoryStore::claim`](crate::inventory::InventoryStore::claim).

use crate::clock::Clock;
use crate::error::BookingError;
use crate::inventory::InventoryStore;
use crate::room::{Room, RoomScope};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Half-open interval intersection: `[a, b)` and `[c, d)` share a night.
pub fn overlaps(a: NaiveDate, b: NaiveDate, c: NaiveDate, d: NaiveDate) -> bool {
    a < d && c < b
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default)]
    pub scope: RoomScope,
}

impl AvailabilityQuery {
    /// # Errors
    ///
    /// [`BookingError::InvalidParameters`] when check-out is not after check-in.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate, scope: RoomScope) -> Result<Self, BookingError> {
        if check_out <= check_in {
            return Err(BookingError::InvalidParameters(
                "check_out must be after check_in".to_string(),
            ));
        }
        Ok(Self {
            check_in,
            check_out,
            scope,
        })
    }

    /// Builds a query from `YYYY-MM-DD` strings.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidParameters`] for malformed dates or an empty range.
    pub fn parse(check_in: &str, check_out: &str, scope: RoomScope) -> Result<Self, BookingError> {
        Self::new(parse_date("check_in", check_in)?, parse_date("check_out", check_out)?, scope)
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| BookingError::InvalidParameters(format!("{field} must be YYYY-MM-DD, got {raw:?}")))
}

/// Retries an idempotent read on [`BookingError::Storage`].
pub(crate) fn with_read_retry<T>(
    attempts: u32,
    mut read: impl FnMut() -> Result<T, BookingError>,
) -> Result<T, BookingError> {
    let mut attempt = 0;
    loop {
        match read() {
            Err(BookingError::Storage(reason)) if attempt < attempts => {
                attempt += 1;
                warn!(attempt, %reason, "Retrying storage read");
            }
            result => return result,
        }
    }
}

pub struct AvailabilityResolver<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    read_retries: u32,
}

impl<S: InventoryStore> AvailabilityResolver<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, read_retries: u32) -> Self {
        Self {
            store,
            clock,
            read_retries,
        }
    }

    /// Rooms in scope that are free for the whole query range, ordered by id.
    ///
    /// # Errors
    ///
    /// [`BookingError::Storage`] once read retries are exhausted.
    pub fn find_available(&self, query: &AvailabilityQuery) -> Result<Vec<Room>, BookingError> {
        let now = self.clock.now();
        let rooms = with_read_retry(self.read_retries, || self.store.rooms())?;

        let mut available = Vec::new();
        for room in rooms
            .into_iter()
            .filter(|room| room.is_bookable() && query.scope.matches(room))
        {
            let taken = with_read_retry(self.read_retries, || {
                self.store
                    .has_conflict(room.id, query.check_in, query.check_out, now)
            })?;
            if !taken {
                available.push(room);
            }
        }

        debug!(
            check_in = %query.check_in,
            check_out = %query.check_out,
            available = available.len(),
            "Resolved availability"
        );
        Ok(available)
    }
}
