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

//! Room and booking storage.
//!
//! [`InventoryStore`] is the only way the engine touches shared inventory.
//! Its contract:
//!
//! - [`InventoryStore::claim`] performs the overlap check and the insert as
//!   one atomic step per room. Two overlapping claims on the same room can
//!   never both succeed.
//! - [`InventoryStore::update`] applies a closure to a booking under the same
//!   per-room serialization and commits only if the closure succeeds.
//! - [`InventoryStore::apply_payment`] commits a booking change together with
//!   the record of the payment event that caused it. Either both persist or
//!   neither does.
//! - Reads hand out owned snapshots; writing to a snapshot changes nothing.
//!
//! # Thread Safety
//!
//! [`InMemoryInventory`] keeps one [`parking_lot::Mutex`] per room inside a
//! [`DashMap`]. Operations on different rooms proceed in parallel; operations
//! on one room are serialized. Map guards are always released before a room
//! mutex is taken, so the lock graph has no cycles.

use crate::base::{BookingId, EventId, RoomId};
use crate::booking::Booking;
use crate::error::BookingError;
use crate::event_log::{PaymentEvent, PaymentEventLog, PaymentRecord};
use crate::reconciler::Outcome;
use crate::room::{Room, RoomStatus};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Transactional storage for rooms and bookings.
pub trait InventoryStore: Send + Sync {
    /// Inserts a room, or replaces the stored room with the same id.
    fn put_room(&self, room: Room) -> Result<(), BookingError>;

    fn set_room_status(&self, room: RoomId, status: RoomStatus) -> Result<(), BookingError>;

    fn set_room_active(&self, room: RoomId, active: bool) -> Result<(), BookingError>;

    fn room(&self, room: RoomId) -> Result<Option<Room>, BookingError>;

    /// All rooms ordered by id.
    fn rooms(&self) -> Result<Vec<Room>, BookingError>;

    /// Whether any booking on `room` blocks `[check_in, check_out)` at `now`.
    fn has_conflict(
        &self,
        room: RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool, BookingError>;

    /// Atomically checks for overlap and inserts `booking`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - the room does not exist.
    /// - [`BookingError::RoomNotBookable`] - the room is inactive or out of service.
    /// - [`BookingError::RoomUnavailable`] - an active booking overlaps.
    fn claim(&self, booking: Booking, now: DateTime<Utc>) -> Result<Booking, BookingError>;

    /// Applies `change` to the stored booking, committing only on success.
    fn update<T, F>(&self, id: BookingId, change: F) -> Result<T, BookingError>
    where
        F: FnOnce(&mut Booking) -> Result<T, BookingError>;

    /// Outcome recorded for an already processed payment event.
    fn payment_outcome(&self, event: &EventId) -> Result<Option<Outcome>, BookingError>;

    /// Applies `change` to the stored booking and records `event` with the
    /// outcome it produced, as one commit.
    ///
    /// If `event` is already recorded nothing changes and the stored outcome
    /// is returned with `true`.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - the booking does not exist.
    /// - Any error of `change`, or a failed commit; nothing is recorded.
    fn apply_payment<F>(
        &self,
        id: BookingId,
        event: &PaymentEvent,
        received_at: DateTime<Utc>,
        change: F,
    ) -> Result<(Outcome, bool), BookingError>
    where
        F: FnOnce(&mut Booking) -> Result<Outcome, BookingError>;

    /// Drains processed payment records in arrival order.
    fn take_processed_payments(&self) -> Result<Vec<Arc<PaymentRecord>>, BookingError>;

    fn booking(&self, id: BookingId) -> Result<Option<Booking>, BookingError>;

    /// All bookings ordered by creation time.
    fn bookings(&self) -> Result<Vec<Booking>, BookingError>;

    fn bookings_for_room(&self, room: RoomId) -> Result<Vec<Booking>, BookingError>;

    /// Pending bookings whose hold has lapsed at `now`.
    fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<BookingId>, BookingError>;
}

/// A room and every booking ever made on it.
#[derive(Debug)]
struct RoomLedger {
    room: Room,
    bookings: Vec<Booking>,
}

impl RoomLedger {
    fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
        }
    }

    fn has_conflict(&self, check_in: NaiveDate, check_out: NaiveDate, now: DateTime<Utc>) -> bool {
        self.bookings
            .iter()
            .any(|booking| booking.blocks(check_in, check_out, now))
    }

    /// Cancels lapsed pending holds found while the room is locked.
    fn release_expired(&mut self, now: DateTime<Utc>) {
        for booking in self.bookings.iter_mut().filter(|b| b.hold_expired(now)) {
            if booking.expire(now).is_ok() {
                warn!(
                    booking_id = %booking.id,
                    room_id = %booking.room_id,
                    "Released lapsed pending hold"
                );
            }
        }
    }
}

/// In-process [`InventoryStore`].
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    rooms: DashMap<RoomId, Arc<Mutex<RoomLedger>>>,
    /// Booking id to the room holding it.
    index: DashMap<BookingId, RoomId>,
    payments: PaymentEventLog,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            index: DashMap::new(),
            payments: PaymentEventLog::new(),
        }
    }

    /// Processed payment events, for auditing.
    pub fn payment_events(&self) -> &PaymentEventLog {
        &self.payments
    }

    fn ledger(&self, room: RoomId) -> Result<Arc<Mutex<RoomLedger>>, BookingError> {
        self.rooms
            .get(&room)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BookingError::not_found(format!("room {room}")))
    }

    fn ledgers(&self) -> Vec<Arc<Mutex<RoomLedger>>> {
        self.rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn ledger_of(&self, id: BookingId) -> Result<Arc<Mutex<RoomLedger>>, BookingError> {
        let room = self
            .index
            .get(&id)
            .map(|entry| *entry.value())
            .ok_or_else(|| BookingError::not_found(format!("booking {id}")))?;
        self.ledger(room)
    }
}

impl InventoryStore for InMemoryInventory {
    fn put_room(&self, room: Room) -> Result<(), BookingError> {
        match self.rooms.entry(room.id) {
            Entry::Occupied(entry) => {
                let ledger = Arc::clone(entry.get());
                drop(entry);
                ledger.lock().room = room;
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(RoomLedger::new(room))));
            }
        }
        Ok(())
    }

    fn set_room_status(&self, room: RoomId, status: RoomStatus) -> Result<(), BookingError> {
        self.ledger(room)?.lock().room.status = status;
        Ok(())
    }

    fn set_room_active(&self, room: RoomId, active: bool) -> Result<(), BookingError> {
        self.ledger(room)?.lock().room.active = active;
        Ok(())
    }

    fn room(&self, room: RoomId) -> Result<Option<Room>, BookingError> {
        Ok(self
            .rooms
            .get(&room)
            .map(|entry| Arc::clone(entry.value()))
            .map(|ledger| ledger.lock().room.clone()))
    }

    fn rooms(&self) -> Result<Vec<Room>, BookingError> {
        let mut rooms: Vec<Room> = self
            .ledgers()
            .iter()
            .map(|ledger| ledger.lock().room.clone())
            .collect();
        rooms.sort_by_key(|room| room.id);
        Ok(rooms)
    }

    fn has_conflict(
        &self,
        room: RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool, BookingError> {
        Ok(self.ledger(room)?.lock().has_conflict(check_in, check_out, now))
    }

    fn claim(&self, booking: Booking, now: DateTime<Utc>) -> Result<Booking, BookingError> {
        let ledger = self.ledger(booking.room_id)?;
        let mut ledger = ledger.lock();

        if !ledger.room.is_bookable() {
            return Err(BookingError::RoomNotBookable(booking.room_id));
        }
        ledger.release_expired(now);
        if ledger.has_conflict(booking.check_in, booking.check_out, now) {
            return Err(BookingError::RoomUnavailable(booking.room_id));
        }

        self.index.insert(booking.id, booking.room_id);
        ledger.bookings.push(booking.clone());
        Ok(booking)
    }

    fn update<T, F>(&self, id: BookingId, change: F) -> Result<T, BookingError>
    where
        F: FnOnce(&mut Booking) -> Result<T, BookingError>,
    {
        let ledger = self.ledger_of(id)?;
        let mut ledger = ledger.lock();
        let stored = ledger
            .bookings
            .iter_mut()
            .find(|booking| booking.id == id)
            .ok_or_else(|| BookingError::not_found(format!("booking {id}")))?;

        let mut draft = stored.clone();
        let result = change(&mut draft)?;
        *stored = draft;
        Ok(result)
    }

    fn payment_outcome(&self, event: &EventId) -> Result<Option<Outcome>, BookingError> {
        Ok(self.payments.outcome(event))
    }

    fn apply_payment<F>(
        &self,
        id: BookingId,
        event: &PaymentEvent,
        received_at: DateTime<Utc>,
        change: F,
    ) -> Result<(Outcome, bool), BookingError>
    where
        F: FnOnce(&mut Booking) -> Result<Outcome, BookingError>,
    {
        let ledger = self.ledger_of(id)?;
        let mut ledger = ledger.lock();
        // Events for one booking serialize on the room lock, so this look is authoritative.
        if let Some(outcome) = self.payments.outcome(&event.id) {
            return Ok((outcome, true));
        }
        let stored = ledger
            .bookings
            .iter_mut()
            .find(|booking| booking.id == id)
            .ok_or_else(|| BookingError::not_found(format!("booking {id}")))?;

        let mut draft = stored.clone();
        let outcome = change(&mut draft)?;
        match self.payments.record(event.clone(), outcome.clone(), received_at) {
            Ok(()) => {
                *stored = draft;
                Ok((outcome, false))
            }
            // Same event id raced in under another booking's lock; its outcome stands.
            Err(BookingError::DuplicateEvent) => self
                .payments
                .outcome(&event.id)
                .map(|outcome| (outcome, true))
                .ok_or(BookingError::DuplicateEvent),
            Err(e) => Err(e),
        }
    }

    fn take_processed_payments(&self) -> Result<Vec<Arc<PaymentRecord>>, BookingError> {
        Ok(self.payments.take_processed())
    }

    fn booking(&self, id: BookingId) -> Result<Option<Booking>, BookingError> {
        let ledger = match self.ledger_of(id) {
            Ok(ledger) => ledger,
            Err(BookingError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let ledger = ledger.lock();
        Ok(ledger.bookings.iter().find(|b| b.id == id).cloned())
    }

    fn bookings(&self) -> Result<Vec<Booking>, BookingError> {
        let mut bookings: Vec<Booking> = self
            .ledgers()
            .iter()
            .flat_map(|ledger| ledger.lock().bookings.clone())
            .collect();
        bookings.sort_by_key(|booking| booking.created_at);
        Ok(bookings)
    }

    fn bookings_for_room(&self, room: RoomId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.ledger(room)?.lock().bookings.clone())
    }

    fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<BookingId>, BookingError> {
        Ok(self
            .ledgers()
            .iter()
            .flat_map(|ledger| {
                ledger
                    .lock()
                    .bookings
                    .iter()
                    .filter(|booking| booking.hold_expired(now))
                    .map(|booking| booking.id)
                    .collect::<Vec<_>>()
            })
            .collect())
    }
}
