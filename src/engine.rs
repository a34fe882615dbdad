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

//! Booking engine facade.
//!
//! The [`BookingEngine`] wires the availability resolver, the lifecycle state
//! machine and the payment reconciler over one shared [`InventoryStore`].
//! Every public operation of the system goes through it.
//!
//! # Thread Safety
//!
//! The engine is `Send + Sync`; share it behind an [`Arc`]. Operations on
//! different rooms run in parallel, operations on one room are serialized by
//! that room's lock.

use crate::availability::{AvailabilityQuery, AvailabilityResolver};
use crate::base::{BookingId, RoomId};
use crate::booking::{Booking, BookingRequest};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::BookingError;
use crate::event_log::{PaymentEvent, PaymentEventLog, PaymentRecord};
use crate::inventory::{InMemoryInventory, InventoryStore};
use crate::lifecycle::{BookingReceipt, BookingStateMachine};
use crate::payment::InvoiceProvider;
use crate::pricing::{PriceCalculation, StayType};
use crate::rate::RateResolver;
use crate::reconciler::{PaymentReconciler, Reconciliation};
use crate::room::{Room, RoomStatus};
use chrono::NaiveDate;
use std::sync::Arc;

/// Room booking and settlement engine.
///
/// # Invariants
///
/// - No two active bookings on one room overlap.
/// - A booking's price is fixed when it is created.
/// - A payment event is applied at most once.
/// - Booking status only moves forward through the lifecycle.
pub struct BookingEngine<S = InMemoryInventory> {
    store: Arc<S>,
    availability: AvailabilityResolver<S>,
    lifecycle: BookingStateMachine<S>,
    reconciler: PaymentReconciler<S>,
}

impl BookingEngine<InMemoryInventory> {
    /// Engine over a fresh in-memory store.
    pub fn in_memory(
        rates: Arc<dyn RateResolver>,
        invoices: Arc<dyn InvoiceProvider>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self::new(Arc::new(InMemoryInventory::new()), rates, invoices, clock, config)
    }

    /// Processed payment events, for auditing.
    pub fn payment_events(&self) -> &PaymentEventLog {
        self.store.payment_events()
    }
}

impl<S: InventoryStore> BookingEngine<S> {
    pub fn new(
        store: Arc<S>,
        rates: Arc<dyn RateResolver>,
        invoices: Arc<dyn InvoiceProvider>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let availability = AvailabilityResolver::new(Arc::clone(&store), Arc::clone(&clock), config.read_retries);
        let reconciler = PaymentReconciler::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.webhook_token.clone(),
            config.mismatch_policy,
        );
        let lifecycle = BookingStateMachine::new(Arc::clone(&store), rates, invoices, clock, config);
        BookingEngine {
            store,
            availability,
            lifecycle,
            reconciler,
        }
    }

    /// Inserts or replaces a room.
    pub fn put_room(&self, room: Room) -> Result<(), BookingError> {
        self.store.put_room(room)
    }

    /// Changes a room's operational status. Existing bookings are kept.
    pub fn set_room_status(&self, room: RoomId, status: RoomStatus) -> Result<(), BookingError> {
        self.store.set_room_status(room, status)
    }

    pub fn set_room_active(&self, room: RoomId, active: bool) -> Result<(), BookingError> {
        self.store.set_room_active(room, active)
    }

    pub fn room(&self, room: RoomId) -> Result<Room, BookingError> {
        self.store
            .room(room)?
            .ok_or_else(|| BookingError::not_found(format!("room {room}")))
    }

    pub fn rooms(&self) -> Result<Vec<Room>, BookingError> {
        self.store.rooms()
    }

    /// Rooms free for the whole of the query's range.
    pub fn find_available(&self, query: &AvailabilityQuery) -> Result<Vec<Room>, BookingError> {
        self.availability.find_available(query)
    }

    pub fn quote(
        &self,
        room: RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        stay_type: Option<StayType>,
    ) -> Result<PriceCalculation, BookingError> {
        self.lifecycle.quote(room, check_in, check_out, stay_type)
    }

    /// See [`BookingStateMachine::create`].
    pub fn create_booking(&self, request: BookingRequest) -> Result<BookingReceipt, BookingError> {
        self.lifecycle.create(request)
    }

    pub fn check_in(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.lifecycle.check_in(id)
    }

    pub fn check_out(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.lifecycle.check_out(id)
    }

    pub fn cancel(&self, id: BookingId, reason: impl Into<String>) -> Result<Booking, BookingError> {
        self.lifecycle.cancel(id, reason)
    }

    pub fn mark_no_show(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.lifecycle.mark_no_show(id)
    }

    /// Cancels every pending hold whose payment window has closed.
    pub fn expire_pending_holds(&self) -> Result<Vec<BookingId>, BookingError> {
        self.lifecycle.expire_pending_holds()
    }

    /// Authenticates and reconciles one payment webhook delivery.
    ///
    /// # Errors
    ///
    /// - [`BookingError::AuthenticationFailed`] - token missing or wrong.
    /// - [`BookingError::NotFound`] - the event names no booking.
    pub fn handle_webhook(&self, token: Option<&str>, event: PaymentEvent) -> Result<Reconciliation, BookingError> {
        self.reconciler.handle_webhook(token, event)
    }

    pub fn booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.lifecycle.booking(id)
    }

    /// All bookings ordered by creation time.
    pub fn bookings(&self) -> Result<Vec<Booking>, BookingError> {
        self.store.bookings()
    }

    /// Drains processed payment records in arrival order.
    pub fn take_processed_payments(&self) -> Result<Vec<Arc<PaymentRecord>>, BookingError> {
        self.store.take_processed_payments()
    }
}
