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

//! Idempotent payment webhook reconciliation.
//!
//! Each [`PaymentEvent`] is applied at most once. The dedup check, the
//! booking transition and the event record commit together through
//! [`InventoryStore::apply_payment`]. A failed commit leaves no record, so the
//! provider's redelivery is applied afresh.
//!
//! Transitions only move forward: a confirmed booking is never cancelled by
//! a late expiry notice, and a payment arriving after cancellation is logged
//! for refund rather than reviving the booking.

use crate::base::{BookingId, EventId};
use crate::booking::{Booking, BookingStatus, CancellationReason, PaymentStatus};
use crate::clock::Clock;
use crate::config::MismatchPolicy;
use crate::error::BookingError;
use crate::event_log::{PaymentEvent, PaymentEventStatus};
use crate::inventory::InventoryStore;
use crate::payment::{self, PaymentMethod};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Effect a payment event had on its booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Confirmed {
        booking_id: BookingId,
        payment_status: PaymentStatus,
        payment_method: Option<PaymentMethod>,
        paid_amount: i64,
    },
    Cancelled {
        booking_id: BookingId,
        reason: CancellationReason,
    },
    /// Event acknowledged without changing the booking.
    Unchanged {
        booking_id: BookingId,
        status: BookingStatus,
    },
    /// Paid amount rejected by the mismatch policy; booking left pending.
    Mismatch {
        booking_id: BookingId,
        expected: i64,
        received: i64,
    },
}

impl Outcome {
    pub fn booking_id(&self) -> BookingId {
        match self {
            Outcome::Confirmed { booking_id, .. }
            | Outcome::Cancelled { booking_id, .. }
            | Outcome::Unchanged { booking_id, .. }
            | Outcome::Mismatch { booking_id, .. } => *booking_id,
        }
    }
}

/// Result of handling one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub event_id: EventId,
    pub outcome: Outcome,
    /// The event had been processed before; `outcome` is the original one.
    pub replayed: bool,
}

pub struct PaymentReconciler<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    webhook_token: String,
    policy: MismatchPolicy,
}

impl<S: InventoryStore> PaymentReconciler<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        webhook_token: impl Into<String>,
        policy: MismatchPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            webhook_token: webhook_token.into(),
            policy,
        }
    }

    pub fn authenticate(&self, token: Option<&str>) -> Result<(), BookingError> {
        payment::authenticate(token, &self.webhook_token)
            .inspect_err(|_| warn!("Rejected payment webhook with invalid token"))
    }

    /// Authenticates a webhook delivery and reconciles its event.
    ///
    /// # Errors
    ///
    /// - [`BookingError::AuthenticationFailed`] - token missing or wrong; nothing is touched.
    /// - Any error of [`PaymentReconciler::handle_event`].
    pub fn handle_webhook(&self, token: Option<&str>, event: PaymentEvent) -> Result<Reconciliation, BookingError> {
        self.authenticate(token)?;
        self.handle_event(event)
    }

    /// Applies an already authenticated event.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] if the external id names no booking. The
    /// event is not recorded, so a later redelivery is processed afresh.
    pub fn handle_event(&self, event: PaymentEvent) -> Result<Reconciliation, BookingError> {
        if let Some(outcome) = self.store.payment_outcome(&event.id)? {
            debug!(event_id = %event.id, "Duplicate payment event");
            return Ok(Reconciliation {
                event_id: event.id,
                outcome,
                replayed: true,
            });
        }

        let booking_id = BookingId::from_reference(&event.external_id)
            .ok_or_else(|| BookingError::not_found(format!("booking {}", event.external_id)))?;
        let now = self.clock.now();
        let method = event.payment_channel.as_deref().map(PaymentMethod::from_channel);

        let (outcome, replayed) = self
            .store
            .apply_payment(booking_id, &event, now, |booking| self.apply(booking, &event, method, now))?;

        if !replayed {
            info!(
                event_id = %event.id,
                booking_id = %booking_id,
                status = ?event.status,
                outcome = ?outcome,
                "Payment event reconciled"
            );
        }
        Ok(Reconciliation {
            event_id: event.id,
            outcome,
            replayed,
        })
    }

    fn apply(
        &self,
        booking: &mut Booking,
        event: &PaymentEvent,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> Result<Outcome, BookingError> {
        let unchanged = |booking: &Booking| Outcome::Unchanged {
            booking_id: booking.id,
            status: booking.status,
        };

        match event.status {
            PaymentEventStatus::Pending => Ok(unchanged(booking)),
            PaymentEventStatus::Paid => match booking.status {
                BookingStatus::Pending => match settle(self.policy, booking, event.amount) {
                    Ok(payment_status) => {
                        if event.amount != booking.invoice_amount {
                            warn!(
                                booking_id = %booking.id,
                                expected = booking.invoice_amount,
                                received = event.amount,
                                "Accepted payment that differs from the invoice"
                            );
                        }
                        booking.confirm(event.amount, payment_status, method, now)?;
                        Ok(Outcome::Confirmed {
                            booking_id: booking.id,
                            payment_status,
                            payment_method: booking.payment_method,
                            paid_amount: event.amount,
                        })
                    }
                    Err(BookingError::PaymentMismatch { expected, received }) => {
                        warn!(booking_id = %booking.id, expected, received, "Payment amount mismatch");
                        Ok(Outcome::Mismatch {
                            booking_id: booking.id,
                            expected,
                            received,
                        })
                    }
                    Err(e) => Err(e),
                },
                BookingStatus::Cancelled => {
                    warn!(
                        booking_id = %booking.id,
                        amount = event.amount,
                        "Payment received for cancelled booking, refund required"
                    );
                    Ok(unchanged(booking))
                }
                _ => Ok(unchanged(booking)),
            },
            PaymentEventStatus::Expired if booking.status == BookingStatus::Pending => {
                booking.expire(now)?;
                Ok(Outcome::Cancelled {
                    booking_id: booking.id,
                    reason: CancellationReason::PaymentExpired,
                })
            }
            PaymentEventStatus::Failed if booking.status == BookingStatus::Pending => {
                booking.cancel(CancellationReason::PaymentFailed, now)?;
                Ok(Outcome::Cancelled {
                    booking_id: booking.id,
                    reason: CancellationReason::PaymentFailed,
                })
            }
            PaymentEventStatus::Expired | PaymentEventStatus::Failed => Ok(unchanged(booking)),
        }
    }
}

/// Payment status for `paid` against `booking`, or why it is refused.
fn settle(policy: MismatchPolicy, booking: &Booking, paid: i64) -> Result<PaymentStatus, BookingError> {
    let status = if paid >= booking.total_amount {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    };
    let accepted = paid == booking.invoice_amount
        || match policy {
            MismatchPolicy::Reject => false,
            MismatchPolicy::AcceptDeposit => paid > 0 && paid >= booking.deposit_amount,
            MismatchPolicy::AcceptAny => paid > 0,
        };

    if accepted {
        Ok(status)
    } else {
        Err(BookingError::PaymentMismatch {
            expected: booking.invoice_amount,
            received: paid,
        })
    }
}
