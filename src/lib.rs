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

//! # Booking Engine
//!
//! This library provides a room booking and settlement engine: availability
//! resolution over date ranges, stay-type pricing, a booking lifecycle state
//! machine, and idempotent reconciliation of payment provider webhooks.
//!
//! ## Core Components
//!
//! - [`BookingEngine`]: Facade over every operation
//! - [`InventoryStore`]: Transactional room and booking storage
//! - [`BookingStateMachine`]: Creates bookings and drives their lifecycle
//! - [`PaymentReconciler`]: Applies payment events exactly once
//! - [`compute_price`]: Deterministic price breakdown for a stay
//!
//! ## Example
//!
//! ```
//! use booking_engine::{
//!     BookingEngine, BookingRequest, BookingStatus, EngineConfig, EventId, FixedClock,
//!     GuestContact, MockInvoiceProvider, PaymentEvent, PaymentEventStatus, PaymentOption,
//!     PropertyId, Rate, RateBook, Room, RoomId, RoomTypeId, StayType,
//! };
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
//! let rates = Arc::new(RateBook::new());
//! rates.publish(Rate::new(RoomTypeId(1), StayType::Daily, 400_000)).unwrap();
//!
//! let engine = BookingEngine::in_memory(
//!     rates,
//!     Arc::new(MockInvoiceProvider::with_clock(clock.clone())),
//!     clock,
//!     EngineConfig::default().with_webhook_token("secret"),
//! );
//! engine.put_room(Room::new(RoomId(1), PropertyId(1), RoomTypeId(1), "101")).unwrap();
//!
//! // Reserve two nights; the booking waits for payment.
//! let receipt = engine
//!     .create_booking(BookingRequest {
//!         room_id: RoomId(1),
//!         guest: GuestContact {
//!             name: "Ayu".to_string(),
//!             email: "ayu@example.com".to_string(),
//!             phone: "081234567890".to_string(),
//!         },
//!         check_in: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
//!         check_out: NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
//!         stay_type: None,
//!         guests: 2,
//!         special_requests: None,
//!         payment_method: None,
//!         payment_option: PaymentOption::Full,
//!     })
//!     .unwrap();
//! assert_eq!(receipt.booking.total_amount, 800_000);
//!
//! // The provider reports the invoice paid.
//! let event = PaymentEvent {
//!     id: EventId("evt-1".to_string()),
//!     external_id: receipt.booking.reference.clone(),
//!     payment_channel: Some("QRIS".to_string()),
//!     amount: 800_000,
//!     status: PaymentEventStatus::Paid,
//! };
//! engine.handle_webhook(Some("secret"), event).unwrap();
//!
//! let booking = engine.booking(receipt.booking.id).unwrap();
//! assert_eq!(booking.status, BookingStatus::Confirmed);
//! ```
//!
//! ## Thread Safety
//!
//! Each room is guarded by its own lock, so bookings for different rooms are
//! processed in parallel while competing claims on one room are serialized.

pub mod availability;
mod base;
pub mod booking;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod event_log;
pub mod inventory;
pub mod lifecycle;
pub mod payment;
pub mod pricing;
pub mod rate;
pub mod reconciler;
pub mod room;

pub use availability::{AvailabilityQuery, AvailabilityResolver, overlaps};
pub use base::{BookingId, EventId, PropertyId, RoomId, RoomTypeId};
pub use booking::{
    Booking, BookingRequest, BookingStatus, CancellationReason, GuestContact, PaymentOption,
    PaymentStatus,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, MAX_INVOICE_VALIDITY_SECS, MismatchPolicy};
pub use engine::BookingEngine;
pub use error::BookingError;
pub use event_log::{PaymentEvent, PaymentEventLog, PaymentEventStatus, PaymentRecord};
pub use inventory::{InMemoryInventory, InventoryStore};
pub use lifecycle::{BookingReceipt, BookingStateMachine};
pub use payment::{
    ACCEPTED_CHANNELS, Invoice, InvoiceProvider, InvoiceRequest, MockInvoiceProvider,
    PaymentMethod, authenticate,
};
pub use pricing::{
    PriceCalculation, StayType, calendar_months_between, compute_price, suggest_stay_type,
};
pub use rate::{Rate, RateBook, RateResolver};
pub use reconciler::{Outcome, PaymentReconciler, Reconciliation};
pub use room::{Room, RoomScope, RoomStatus};
