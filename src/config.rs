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

//! Engine configuration.
//!
//! Values come from [`EngineConfig::default`], a serde document, or the
//! process environment via [`EngineConfig::from_env`].

use crate::error::BookingError;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

/// Longest invoice window the provider accepts: one year.
pub const MAX_INVOICE_VALIDITY_SECS: u64 = 365 * 24 * 60 * 60;

/// What to do when a paid amount differs from the invoiced amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Confirm only on an exact match with the invoiced amount.
    #[default]
    Reject,
    /// Confirm when at least the deposit was paid.
    AcceptDeposit,
    /// Confirm on any positive amount, reporting the discrepancy.
    AcceptAny,
}

impl FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "accept_deposit" => Ok(Self::AcceptDeposit),
            "accept_any" => Ok(Self::AcceptAny),
            other => Err(format!("unknown mismatch policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shared secret expected on payment webhooks. Empty disables all webhooks.
    pub webhook_token: String,
    /// ISO 4217 code sent with every invoice.
    pub currency: String,
    /// How long an invoice, and therefore a pending hold, stays valid.
    pub invoice_validity_secs: u64,
    pub success_redirect_url: String,
    pub failure_redirect_url: String,
    pub mismatch_policy: MismatchPolicy,
    /// Attempts for idempotent store reads on transient failure.
    pub read_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            webhook_token: String::new(),
            currency: "IDR".to_string(),
            invoice_validity_secs: 24 * 60 * 60,
            success_redirect_url: "http://localhost:3000/payment/success".to_string(),
            failure_redirect_url: "http://localhost:3000/payment/failed".to_string(),
            mismatch_policy: MismatchPolicy::Reject,
            read_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            webhook_token: env::var("WEBHOOK_TOKEN").unwrap_or(defaults.webhook_token),
            currency: env::var("BOOKING_CURRENCY").unwrap_or(defaults.currency),
            invoice_validity_secs: parse_var("INVOICE_VALIDITY_SECS")
                .filter(|secs| {
                    let valid = (1..=MAX_INVOICE_VALIDITY_SECS).contains(secs);
                    if !valid {
                        warn!(secs, max = MAX_INVOICE_VALIDITY_SECS, "Ignoring out of range INVOICE_VALIDITY_SECS");
                    }
                    valid
                })
                .unwrap_or(defaults.invoice_validity_secs),
            success_redirect_url: env::var("PAYMENT_SUCCESS_URL")
                .unwrap_or(defaults.success_redirect_url),
            failure_redirect_url: env::var("PAYMENT_FAILURE_URL")
                .unwrap_or(defaults.failure_redirect_url),
            mismatch_policy: parse_var("PAYMENT_MISMATCH_POLICY")
                .unwrap_or(defaults.mismatch_policy),
            read_retries: parse_var("STORAGE_READ_RETRIES").unwrap_or(defaults.read_retries),
        }
    }

    pub fn with_webhook_token(mut self, token: impl Into<String>) -> Self {
        self.webhook_token = token.into();
        self
    }

    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    /// How long a new invoice and its pending hold stay valid.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidParameters`] unless `invoice_validity_secs` is
    /// between one second and [`MAX_INVOICE_VALIDITY_SECS`].
    pub fn invoice_validity(&self) -> Result<TimeDelta, BookingError> {
        let secs = self.invoice_validity_secs;
        if !(1..=MAX_INVOICE_VALIDITY_SECS).contains(&secs) {
            return Err(BookingError::InvalidParameters(format!(
                "invoice validity of {secs}s is outside 1..={MAX_INVOICE_VALIDITY_SECS}"
            )));
        }
        i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| BookingError::InvalidParameters(format!("invoice validity of {secs}s")))
    }
}

fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.trim().parse().ok())
}
