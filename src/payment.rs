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

//! Payment provider boundary.
//!
//! Outbound: invoices are requested through the [`InvoiceProvider`] port.
//! Inbound: webhook tokens are checked with [`authenticate`] and provider
//! channel codes are normalized with [`PaymentMethod::from_channel`].

use crate::clock::{Clock, SystemClock};
use crate::error::BookingError;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Channels offered on every invoice.
pub const ACCEPTED_CHANNELS: [&str; 7] = [
    "BCA",
    "BNI",
    "BRI",
    "MANDIRI",
    "PERMATA",
    "QRIS",
    "CREDIT_CARD",
];

/// Payment method taxonomy used on bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Qris,
    CreditCard,
    BankTransfer,
}

impl PaymentMethod {
    /// Maps a provider channel code onto a payment method.
    ///
    /// Bank codes and unknown codes both map to [`PaymentMethod::BankTransfer`].
    pub fn from_channel(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "QRIS" | "QR_CODE" => Self::Qris,
            "CREDIT_CARD" => Self::CreditCard,
            _ => Self::BankTransfer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qris => "qris",
            Self::CreditCard => "credit_card",
            Self::BankTransfer => "bank_transfer",
        }
    }
}

/// Checks a webhook token against the shared secret.
///
/// A missing or empty token never authenticates, even when the configured
/// secret is empty too.
///
/// # Errors
///
/// [`BookingError::AuthenticationFailed`] unless `provided` equals `secret`
/// exactly.
pub fn authenticate(provided: Option<&str>, secret: &str) -> Result<(), BookingError> {
    match provided {
        Some(token) if !token.is_empty() && token == secret => Ok(()),
        _ => Err(BookingError::AuthenticationFailed),
    }
}

/// Invoice creation request sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub external_id: String,
    /// Minor currency units.
    pub amount: i64,
    pub payer_email: String,
    pub description: String,
    pub success_redirect_url: String,
    pub failure_redirect_url: String,
    pub currency: String,
    pub payment_methods: Vec<String>,
    pub invoice_duration: u64,
}

/// Invoice as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_url: String,
    pub status: String,
    pub expiry_date: DateTime<Utc>,
}

/// Outbound port to the payment provider.
pub trait InvoiceProvider: Send + Sync {
    /// # Errors
    ///
    /// [`BookingError::PaymentProvider`] when the provider rejects the
    /// request or cannot be reached.
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, BookingError>;
}

/// In-process provider for development and tests.
///
/// Records every request and can be told to fail the next call.
pub struct MockInvoiceProvider {
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    fail_next: AtomicBool,
    requests: Mutex<Vec<InvoiceRequest>>,
}

impl MockInvoiceProvider {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(1),
            fail_next: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<InvoiceRequest> {
        self.requests.lock().clone()
    }
}

impl Default for MockInvoiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceProvider for MockInvoiceProvider {
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, BookingError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BookingError::PaymentProvider(
                "provider unavailable".to_string(),
            ));
        }

        let expiry_date = i64::try_from(request.invoice_duration)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|validity| self.clock.now().checked_add_signed(validity))
            .ok_or_else(|| {
                BookingError::PaymentProvider(format!(
                    "invoice duration {}s out of range",
                    request.invoice_duration
                ))
            })?;
        let id = format!("inv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.requests.lock().push(request.clone());

        Ok(Invoice {
            invoice_url: format!("https://checkout.invalid/{id}"),
            id,
            status: "PENDING".to_string(),
            expiry_date,
        })
    }
}
