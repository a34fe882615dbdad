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

//! Write-once log of processed payment events.
//!
//! Webhook delivery is at-least-once. The log remembers the outcome computed
//! for every event id, so a redelivery can be answered with that outcome
//! instead of being applied again.

use crate::base::EventId;
use crate::error::BookingError;
use crate::reconciler::Outcome;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Invoice state reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentEventStatus {
    /// Invoice created, nothing paid yet.
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "paid", alias = "SETTLED")]
    Paid,
    #[serde(alias = "expired")]
    Expired,
    #[serde(alias = "failed")]
    Failed,
}

/// Inbound payment notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider event id, stable across redeliveries.
    pub id: EventId,
    /// Booking reference embedded in the invoice.
    pub external_id: String,
    #[serde(default)]
    pub payment_channel: Option<String>,
    /// Minor currency units.
    #[serde(default)]
    pub amount: i64,
    pub status: PaymentEventStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    pub event: PaymentEvent,
    pub outcome: Outcome,
    pub received_at: DateTime<Utc>,
}

/// Thread-safe event log with duplicate detection.
///
/// Combines a [`DashMap`] for O(1) duplicate checking with a [`SegQueue`]
/// that preserves processing order for the audit feed.
#[derive(Debug)]
pub struct PaymentEventLog {
    records: DashMap<EventId, Arc<PaymentRecord>>,

    /// Event ids in processing order, drained by [`PaymentEventLog::take_processed`].
    order: SegQueue<EventId>,
}

impl PaymentEventLog {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            order: SegQueue::new(),
        }
    }

    /// Outcome previously recorded for `id`.
    pub fn outcome(&self, id: &EventId) -> Option<Outcome> {
        self.records.get(id).map(|record| record.outcome.clone())
    }

    /// Records a processed event.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::DuplicateEvent`] if an event with the same id
    /// was already recorded.
    pub fn record(
        &self,
        event: PaymentEvent,
        outcome: Outcome,
        received_at: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        // Entry API keeps check-and-insert atomic.
        match self.records.entry(event.id.clone()) {
            Entry::Occupied(_) => Err(BookingError::DuplicateEvent),
            Entry::Vacant(entry) => {
                let id = event.id.clone();
                entry.insert(Arc::new(PaymentRecord {
                    event,
                    outcome,
                    received_at,
                }));
                self.order.push(id);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drains records added since the last call, oldest first.
    ///
    /// Records stay in the log for deduplication.
    pub fn take_processed(&self) -> Vec<Arc<PaymentRecord>> {
        let mut drained = Vec::new();
        while let Some(id) = self.order.pop() {
            if let Some(record) = self.records.get(&id) {
                drained.push(Arc::clone(record.value()));
            }
        }
        drained
    }
}

impl Default for PaymentEventLog {
    fn default() -> Self {
        Self::new()
    }
}
