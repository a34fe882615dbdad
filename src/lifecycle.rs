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

//! Booking lifecycle orchestration.
//!
//! [`BookingStateMachine`] is the single writer of booking records. Creation
//! claims inventory atomically and requests an invoice; every later move goes
//! through [`InventoryStore::update`] so it is serialized per room and is
//! all-or-nothing.
//!
//! # Transitions
//!
//! | Operation | From | To |
//! |-----------|------|----|
//! | create | - | Pending |
//! | payment webhook | Pending | Confirmed |
//! | check_in | Confirmed | CheckedIn |
//! | check_out | CheckedIn | CheckedOut |
//! | cancel | Pending, Confirmed | Cancelled |
//! | mark_no_show | Confirmed | NoShow |
//! | expire_pending_holds | Pending | Cancelled (`payment_expired`) |

use crate::base::{BookingId, RoomId};
use crate::booking::{Booking, BookingRequest, BookingStatus, CancellationReason};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::BookingError;
use crate::inventory::InventoryStore;
use crate::payment::{ACCEPTED_CHANNELS, Invoice, InvoiceProvider, InvoiceRequest};
use crate::pricing::{PriceCalculation, StayType, compute_price, suggest_stay_type};
use crate::rate::RateResolver;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A freshly created booking and the invoice the guest must pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub invoice: Invoice,
}

pub struct BookingStateMachine<S> {
    store: Arc<S>,
    rates: Arc<dyn RateResolver>,
    invoices: Arc<dyn InvoiceProvider>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl<S: InventoryStore> BookingStateMachine<S> {
    pub fn new(
        store: Arc<S>,
        rates: Arc<dyn RateResolver>,
        invoices: Arc<dyn InvoiceProvider>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            rates,
            invoices,
            clock,
            config,
        }
    }

    /// Prices a stay on `room` without reserving anything.
    ///
    /// The stay type is suggested from the number of nights when absent.
    ///
    /// # Errors
    ///
    /// - [`BookingError::NotFound`] - unknown room or no rate for its type.
    /// - Any error of [`compute_price`].
    pub fn quote(
        &self,
        room: RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        stay_type: Option<StayType>,
    ) -> Result<PriceCalculation, BookingError> {
        let room = self
            .store
            .room(room)?
            .ok_or_else(|| BookingError::not_found(format!("room {room}")))?;
        let stay_type = stay_type.unwrap_or_else(|| suggest_stay_type((check_out - check_in).num_days()));
        let rate = self.rates.resolve(room.room_type, stay_type)?;
        compute_price(&rate, check_in, check_out, stay_type)
    }

    /// Creates a pending booking and requests its invoice.
    ///
    /// The availability claim is attempted once and never retried. If the
    /// invoice cannot be created the hold is cancelled with
    /// [`CancellationReason::InvoiceFailed`] before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidParameters`] / [`BookingError::InvalidDateRange`] - bad request.
    /// - [`BookingError::NotFound`] - unknown room or missing rate.
    /// - [`BookingError::RoomNotBookable`] - room inactive or out of service.
    /// - [`BookingError::BelowMinimumStay`] - stay shorter than the rate allows.
    /// - [`BookingError::RoomUnavailable`] - another booking holds the dates.
    /// - [`BookingError::PaymentProvider`] - invoice creation failed.
    pub fn create(&self, request: BookingRequest) -> Result<BookingReceipt, BookingError> {
        request.check()?;

        let room = self
            .store
            .room(request.room_id)?
            .ok_or_else(|| BookingError::not_found(format!("room {}", request.room_id)))?;
        if !room.is_bookable() {
            return Err(BookingError::RoomNotBookable(room.id));
        }

        let price = self.quote(room.id, request.check_in, request.check_out, request.stay_type)?;
        let now = self.clock.now();
        let hold_expires_at = now
            .checked_add_signed(self.config.invoice_validity()?)
            .ok_or_else(|| BookingError::InvalidParameters("invoice expiry is out of range".to_string()))?;
        let booking = self
            .store
            .claim(Booking::new(request, price, now, hold_expires_at), now)?;

        let invoice_request = self.invoice_request(&booking, &room.number);
        let invoice = match self.invoices.create_invoice(&invoice_request) {
            Ok(invoice) => invoice,
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Invoice creation failed, releasing hold");
                if let Err(release) = self.store.update(booking.id, |b| b.cancel(CancellationReason::InvoiceFailed, now)) {
                    warn!(booking_id = %booking.id, error = %release, "Could not release hold");
                }
                return Err(e);
            }
        };

        let booking = self.store.update(booking.id, |b| {
            b.attach_invoice(invoice.clone(), now)?;
            Ok(b.clone())
        })?;

        info!(
            booking_id = %booking.id,
            room_id = %booking.room_id,
            check_in = %booking.check_in,
            check_out = %booking.check_out,
            total = booking.total_amount,
            invoice_id = %invoice.id,
            "Booking created"
        );
        Ok(BookingReceipt { booking, invoice })
    }

    fn invoice_request(&self, booking: &Booking, room_number: &str) -> InvoiceRequest {
        InvoiceRequest {
            external_id: booking.reference.clone(),
            amount: booking.invoice_amount,
            payer_email: booking.guest.email.clone(),
            description: format!(
                "Room {} ({} to {}, {} {})",
                room_number,
                booking.check_in,
                booking.check_out,
                booking.price.units,
                booking.stay_type
            ),
            success_redirect_url: self.config.success_redirect_url.clone(),
            failure_redirect_url: self.config.failure_redirect_url.clone(),
            currency: self.config.currency.clone(),
            payment_methods: ACCEPTED_CHANNELS.iter().map(|c| c.to_string()).collect(),
            invoice_duration: self.config.invoice_validity_secs,
        }
    }

    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] unless confirmed and today falls
    /// within the stay.
    pub fn check_in(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.apply(id, |booking, now| booking.check_in(now))
    }

    pub fn check_out(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.apply(id, |booking, now| booking.check_out(now))
    }

    /// Cancels a pending or confirmed booking, releasing its room at once.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidParameters`] - blank reason.
    /// - [`BookingError::InvalidTransition`] - booking already settled.
    pub fn cancel(&self, id: BookingId, reason: impl Into<String>) -> Result<Booking, BookingError> {
        let reason = CancellationReason::Requested(reason.into());
        self.apply(id, |booking, now| booking.cancel(reason, now))
    }

    /// # Errors
    ///
    /// [`BookingError::InvalidTransition`] unless confirmed and the check-in
    /// date has passed.
    pub fn mark_no_show(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.apply(id, |booking, now| booking.mark_no_show(now))
    }

    /// Sweeps every pending hold whose payment window has closed.
    ///
    /// Returns the ids that were cancelled. A hold confirmed between listing
    /// and cancelling is left alone.
    pub fn expire_pending_holds(&self) -> Result<Vec<BookingId>, BookingError> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for id in self.store.expired_holds(now)? {
            let result = self.store.update(id, |booking| {
                if !booking.hold_expired(now) {
                    return Ok(false);
                }
                booking.expire(now)?;
                Ok(true)
            });
            match result {
                Ok(true) => {
                    warn!(booking_id = %id, "Pending hold expired without payment");
                    expired.push(id);
                }
                Ok(false) => debug!(booking_id = %id, "Hold settled before sweep"),
                Err(e) => warn!(booking_id = %id, error = %e, "Could not expire hold"),
            }
        }
        Ok(expired)
    }

    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown id.
    pub fn booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.store
            .booking(id)?
            .ok_or_else(|| BookingError::not_found(format!("booking {id}")))
    }

    fn apply<F>(&self, id: BookingId, transition: F) -> Result<Booking, BookingError>
    where
        F: FnOnce(&mut Booking, DateTime<Utc>) -> Result<(), BookingError>,
    {
        let now = self.clock.now();
        let (from, booking) = self.store.update(id, |booking| {
            let from = booking.status;
            transition(booking, now)?;
            Ok((from, booking.clone()))
        })?;
        log_transition(&booking, from);
        Ok(booking)
    }
}

fn log_transition(booking: &Booking, from: BookingStatus) {
    match &booking.cancellation_reason {
        Some(reason) if booking.status == BookingStatus::Cancelled => info!(
            booking_id = %booking.id,
            room_id = %booking.room_id,
            %from,
            %reason,
            "Booking cancelled, room released"
        ),
        _ => info!(
            booking_id = %booking.id,
            room_id = %booking.room_id,
            %from,
            to = %booking.status,
            "Booking transitioned"
        ),
    }
}
