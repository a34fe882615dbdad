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

//! Rate cards and their lookup.
//!
//! A [`Rate`] is keyed by room type and stay type. Rates are never edited in
//! place: publishing a rate for an existing key appends a new version, so a
//! booking's price snapshot can always name the exact version it was quoted
//! against.

use crate::base::RoomTypeId;
use crate::error::BookingError;
use crate::pricing::StayType;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub room_type: RoomTypeId,
    pub stay_type: StayType,
    /// Assigned by [`RateBook::publish`]; 0 for an unpublished rate.
    #[serde(default)]
    pub version: u32,
    /// Price of one billing unit, in minor currency units.
    pub price: i64,
    /// Minimum number of nights.
    pub min_stay: u32,
    pub tax_percentage: Decimal,
    /// Flat fee per booking, in minor currency units.
    pub service_fee: i64,
    pub deposit_percentage: Decimal,
}

impl Rate {
    /// Rate with a one-night minimum, no tax, no fee and a full deposit.
    pub fn new(room_type: RoomTypeId, stay_type: StayType, price: i64) -> Self {
        Self {
            room_type,
            stay_type,
            version: 0,
            price,
            min_stay: 1,
            tax_percentage: Decimal::ZERO,
            service_fee: 0,
            deposit_percentage: dec!(100),
        }
    }

    pub fn with_min_stay(mut self, nights: u32) -> Self {
        self.min_stay = nights;
        self
    }

    pub fn with_tax(mut self, percentage: Decimal) -> Self {
        self.tax_percentage = percentage;
        self
    }

    pub fn with_service_fee(mut self, fee: i64) -> Self {
        self.service_fee = fee;
        self
    }

    pub fn with_deposit(mut self, percentage: Decimal) -> Self {
        self.deposit_percentage = percentage;
        self
    }

    fn validate(&self) -> Result<(), BookingError> {
        let percent = Decimal::ZERO..=dec!(100);
        if self.price < 0 || self.service_fee < 0 {
            return Err(BookingError::InvalidParameters(
                "rate amounts must not be negative".to_string(),
            ));
        }
        if !percent.contains(&self.tax_percentage) || !percent.contains(&self.deposit_percentage)
        {
            return Err(BookingError::InvalidParameters(
                "rate percentages must be within 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Supplies the applicable rate for a room type and stay type.
pub trait RateResolver: Send + Sync {
    /// # Errors
    ///
    /// [`BookingError::NotFound`] when no rate exists for the key.
    fn resolve(&self, room_type: RoomTypeId, stay_type: StayType) -> Result<Rate, BookingError>;
}

/// In-memory versioned rate store.
#[derive(Debug, Default)]
pub struct RateBook {
    rates: DashMap<(RoomTypeId, StayType), Vec<Rate>>,
}

impl RateBook {
    pub fn new() -> Self {
        Self {
            rates: DashMap::new(),
        }
    }

    /// Publishes `rate` as the newest version for its key.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidParameters`] for negative amounts or
    /// percentages outside `0..=100`.
    pub fn publish(&self, mut rate: Rate) -> Result<Rate, BookingError> {
        rate.validate()?;
        let mut versions = self
            .rates
            .entry((rate.room_type, rate.stay_type))
            .or_default();
        rate.version = u32::try_from(versions.len() + 1).map_err(|_| BookingError::AmountOverflow)?;
        versions.push(rate.clone());
        Ok(rate)
    }

    /// All published versions for a key, oldest first.
    pub fn history(&self, room_type: RoomTypeId, stay_type: StayType) -> Vec<Rate> {
        self.rates
            .get(&(room_type, stay_type))
            .map(|versions| versions.value().clone())
            .unwrap_or_default()
    }
}

impl RateResolver for RateBook {
    fn resolve(&self, room_type: RoomTypeId, stay_type: StayType) -> Result<Rate, BookingError> {
        self.rates
            .get(&(room_type, stay_type))
            .and_then(|versions| versions.last().cloned())
            .ok_or_else(|| BookingError::not_found(format!("{stay_type} rate for room type {room_type}")))
    }
}
