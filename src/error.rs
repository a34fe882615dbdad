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

//! Error types for booking, pricing and payment processing.

use crate::base::RoomId;
use crate::booking::BookingStatus;
use thiserror::Error;

/// Booking engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Check-out is not after check-in
    #[error("check-out must be after check-in")]
    InvalidDateRange,

    /// Stay type is not one of daily, weekly, monthly
    #[error("invalid stay type: {0}")]
    InvalidStayType(String),

    /// Stay is shorter than the rate's minimum
    #[error("stay of {nights} nights is below the minimum of {min_stay}")]
    BelowMinimumStay { nights: i64, min_stay: u32 },

    /// Another booking holds the room for an overlapping range
    #[error("room {0} is not available for the requested dates")]
    RoomUnavailable(RoomId),

    /// Room exists but is inactive or out of service
    #[error("room {0} cannot be booked in its current state")]
    RoomNotBookable(RoomId),

    /// Lifecycle move not permitted from the current status
    #[error("cannot {action}: booking is {from}")]
    InvalidTransition {
        from: BookingStatus,
        action: &'static str,
    },

    /// Paid amount differs from the amount the booking expects
    #[error("payment mismatch: expected {expected}, received {received}")]
    PaymentMismatch { expected: i64, received: i64 },

    /// Payment event was already processed
    #[error("duplicate payment event")]
    DuplicateEvent,

    /// Webhook token missing or wrong
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Referenced room, booking or rate does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed request or query
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Invoice could not be created with the payment provider
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    /// Transient failure of the backing store
    #[error("storage error: {0}")]
    Storage(String),

    /// Minor-unit arithmetic overflowed
    #[error("amount overflow")]
    AmountOverflow,
}

impl BookingError {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        BookingError::NotFound(what.to_string())
    }
}
