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

//! Booking records and their lifecycle.
//!
//! Implemented State Machine
//!
//! ```text
//!  Pending ──confirm──► Confirmed ──check_in──► CheckedIn ──check_out──► CheckedOut
//!     │                     │
//!     ├──cancel/expire──►   ├──cancel──► Cancelled
//!     │   Cancelled         └──mark_no_show──► NoShow
//! ```
//!
//! Every transition checks its guards before touching any field, so a failed
//! transition leaves the record exactly as it was.

use crate::availability::overlaps;
use crate::base::{BookingId, RoomId};
use crate::error::BookingError;
use crate::payment::{Invoice, PaymentMethod};
use crate::pricing::{PriceCalculation, StayType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Statuses that hold the room's inventory.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::CheckedIn)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CheckedOut | Self::Cancelled | Self::NoShow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked_in",
            Self::CheckedOut => "checked_out",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    /// At least the deposit, less than the total.
    Partial,
    Paid,
    Expired,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    PaymentExpired,
    PaymentFailed,
    InvoiceFailed,
    /// Staff or guest cancellation with free-text reason.
    Requested(String),
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentExpired => f.write_str("payment_expired"),
            Self::PaymentFailed => f.write_str("payment_failed"),
            Self::InvoiceFailed => f.write_str("invoice_failed"),
            Self::Requested(reason) => f.write_str(reason),
        }
    }
}

/// Which amount the invoice asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOption {
    #[default]
    Full,
    Deposit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct GuestContact {
    #[validate(length(max = 100), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// 8 to 20 characters of digits, spaces, `+`, `-` and parentheses.
fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let length = phone.chars().count();
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')');
    if !(8..=20).contains(&length) || !phone.chars().all(allowed) {
        return Err(ValidationError::new("phone"));
    }
    Ok(())
}

/// Inbound booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BookingRequest {
    pub room_id: RoomId,
    #[validate(nested)]
    pub guest: GuestContact,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    /// Suggested from the length of stay when absent.
    #[serde(default)]
    pub stay_type: Option<StayType>,
    #[validate(range(min = 1, max = 10))]
    pub guests: u8,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub special_requests: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_option: PaymentOption,
}

impl BookingRequest {
    /// Field-level validation of the request.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidParameters`] naming the offending fields, or
    /// [`BookingError::InvalidDateRange`] when check-out is not after check-in.
    pub fn check(&self) -> Result<(), BookingError> {
        self.validate()
            .map_err(|e| BookingError::InvalidParameters(e.to_string()))?;
        if self.check_out <= self.check_in {
            return Err(BookingError::InvalidDateRange);
        }
        Ok(())
    }
}

/// A reservation of one room for a half-open date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub reference: String,
    pub room_id: RoomId,
    pub guest: GuestContact,
    pub check_in: NaiveDate,
    /// Exclusive: the guest does not stay the night of `check_out`.
    pub check_out: NaiveDate,
    pub stay_type: StayType,
    pub guests: u8,
    pub special_requests: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_option: PaymentOption,
    pub total_amount: i64,
    pub deposit_amount: i64,
    /// Amount the invoice asks for: the total or the deposit.
    pub invoice_amount: i64,
    pub paid_amount: i64,
    /// Snapshot taken at creation; later rate changes never touch it.
    pub price: PriceCalculation,
    pub invoice: Option<Invoice>,
    /// Instant after which an unpaid pending hold no longer blocks the room.
    pub hold_expires_at: DateTime<Utc>,
    pub cancellation_reason: Option<CancellationReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub(crate) fn new(
        request: BookingRequest,
        price: PriceCalculation,
        now: DateTime<Utc>,
        hold_expires_at: DateTime<Utc>,
    ) -> Self {
        let id = BookingId::new();
        let invoice_amount = match request.payment_option {
            PaymentOption::Full => price.total_amount,
            PaymentOption::Deposit => price.deposit_amount,
        };
        Self {
            id,
            reference: id.reference(),
            room_id: request.room_id,
            guest: request.guest,
            check_in: request.check_in,
            check_out: request.check_out,
            stay_type: price.stay_type,
            guests: request.guests,
            special_requests: request.special_requests,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_method: request.payment_method,
            payment_option: request.payment_option,
            total_amount: price.total_amount,
            deposit_amount: price.deposit_amount,
            invoice_amount,
            paid_amount: 0,
            price,
            invoice: None,
            hold_expires_at,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending hold whose payment window has closed.
    pub fn hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && now >= self.hold_expires_at
    }

    /// Whether this booking blocks `[check_in, check_out)` on its room at `now`.
    pub fn blocks(&self, check_in: NaiveDate, check_out: NaiveDate, now: DateTime<Utc>) -> bool {
        self.status.is_active()
            && !self.hold_expired(now)
            && overlaps(self.check_in, self.check_out, check_in, check_out)
    }

    fn require(&self, allowed: &[BookingStatus], action: &'static str) -> Result<(), BookingError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(BookingError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    /// Stores the invoice. The hold never outlives it, since an expired
    /// invoice can no longer be paid.
    pub(crate) fn attach_invoice(&mut self, invoice: Invoice, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.require(&[BookingStatus::Pending], "attach an invoice")?;
        self.hold_expires_at = self.hold_expires_at.min(invoice.expiry_date);
        self.invoice = Some(invoice);
        self.updated_at = now;
        Ok(())
    }

    /// Pending -> Confirmed.
    pub(crate) fn confirm(
        &mut self,
        paid_amount: i64,
        payment_status: PaymentStatus,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        self.require(&[BookingStatus::Pending], "confirm")?;
        self.status = BookingStatus::Confirmed;
        self.payment_status = payment_status;
        self.paid_amount = paid_amount;
        if method.is_some() {
            self.payment_method = method;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Confirmed -> CheckedIn, on a date within the stay.
    pub(crate) fn check_in(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.require(&[BookingStatus::Confirmed], "check in")?;
        let today = now.date_naive();
        if today < self.check_in || today >= self.check_out {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                action: "check in outside the stay dates",
            });
        }
        self.status = BookingStatus::CheckedIn;
        self.updated_at = now;
        Ok(())
    }

    /// CheckedIn -> CheckedOut.
    pub(crate) fn check_out(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.require(&[BookingStatus::CheckedIn], "check out")?;
        self.status = BookingStatus::CheckedOut;
        self.updated_at = now;
        Ok(())
    }

    /// Pending | Confirmed -> Cancelled.
    pub(crate) fn cancel(&mut self, reason: CancellationReason, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.require(&[BookingStatus::Pending, BookingStatus::Confirmed], "cancel")?;
        if matches!(&reason, CancellationReason::Requested(text) if text.trim().is_empty()) {
            return Err(BookingError::InvalidParameters(
                "cancellation reason is required".to_string(),
            ));
        }
        match &reason {
            CancellationReason::PaymentExpired => self.payment_status = PaymentStatus::Expired,
            CancellationReason::PaymentFailed => self.payment_status = PaymentStatus::Failed,
            CancellationReason::InvoiceFailed | CancellationReason::Requested(_) => {}
        }
        self.status = BookingStatus::Cancelled;
        self.cancellation_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    /// Pending -> Cancelled once the provider reports the invoice expired.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.require(&[BookingStatus::Pending], "expire")?;
        self.cancel(CancellationReason::PaymentExpired, now)
    }

    /// Confirmed -> NoShow, once the check-in date has passed.
    pub(crate) fn mark_no_show(&mut self, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.require(&[BookingStatus::Confirmed], "mark no-show")?;
        if now.date_naive() <= self.check_in {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                action: "mark no-show before the check-in date has passed",
            });
        }
        self.status = BookingStatus::NoShow;
        self.updated_at = now;
        Ok(())
    }
}
