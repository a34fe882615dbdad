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

//! Stay-type pricing.
//!
//! [`compute_price`] turns a rate and a date range into a full price
//! breakdown. It performs no I/O and holds no state, so it is safe to call
//! from any thread without synchronization.
//!
//! # Billing units
//!
//! | Stay type | Units |
//! |-----------|-------|
//! | Daily     | one per night |
//! | Weekly    | `ceil(nights / 7)`, at least 1 |
//! | Monthly   | whole calendar months when at least one elapses, otherwise `ceil(nights / 30)` |
//!
//! Tax and deposit amounts are rounded to whole minor units, half away from
//! zero.

use crate::error::BookingError;
use crate::rate::Rate;
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Billing cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StayType {
    Daily,
    Weekly,
    Monthly,
}

impl StayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for StayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StayType {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(BookingError::InvalidStayType(s.to_string())),
        }
    }
}

/// Price breakdown for one quote. Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCalculation {
    pub stay_type: StayType,
    pub nights: i64,
    pub units: i64,
    pub base_price: i64,
    pub tax_amount: i64,
    pub service_fee: i64,
    /// Always zero until promotional pricing exists.
    pub discount_amount: i64,
    pub total_amount: i64,
    pub deposit_amount: i64,
    /// Rate version the breakdown was computed from.
    pub rate: Rate,
}

/// Picks a stay type from the length of stay.
pub fn suggest_stay_type(nights: i64) -> StayType {
    if nights >= 28 {
        StayType::Monthly
    } else if nights >= 7 {
        StayType::Weekly
    } else {
        StayType::Daily
    }
}

/// Whole calendar months from `check_in` to `check_out`.
///
/// A month counts once the day-of-month of `check_in` is reached again, so
/// 2024-01-10 to 2024-02-10 is one month and 2024-01-10 to 2024-02-09 is none.
pub fn calendar_months_between(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    let mut months = i64::from(check_out.year() - check_in.year()) * 12
        + i64::from(check_out.month())
        - i64::from(check_in.month());
    if check_out.day() < check_in.day() {
        months -= 1;
    }
    months.max(0)
}

/// Computes the price of a stay.
///
/// # Errors
///
/// - [`BookingError::InvalidDateRange`] - `check_out` is not after `check_in`.
/// - [`BookingError::BelowMinimumStay`] - fewer nights than `rate.min_stay`.
/// - [`BookingError::AmountOverflow`] - amounts do not fit in minor units.
pub fn compute_price(
    rate: &Rate,
    check_in: NaiveDate,
    check_out: NaiveDate,
    stay_type: StayType,
) -> Result<PriceCalculation, BookingError> {
    let nights = (check_out - check_in).num_days();
    if nights <= 0 {
        return Err(BookingError::InvalidDateRange);
    }
    if nights < i64::from(rate.min_stay) {
        return Err(BookingError::BelowMinimumStay {
            nights,
            min_stay: rate.min_stay,
        });
    }

    let units = billing_units(stay_type, check_in, check_out, nights);
    let base_price = rate
        .price
        .checked_mul(units)
        .ok_or(BookingError::AmountOverflow)?;
    let tax_amount = percent_of(base_price, rate.tax_percentage)?;
    let service_fee = rate.service_fee;
    let discount_amount = 0;
    let total_amount = base_price
        .checked_add(tax_amount)
        .and_then(|sum| sum.checked_add(service_fee))
        .and_then(|sum| sum.checked_sub(discount_amount))
        .ok_or(BookingError::AmountOverflow)?;
    let deposit_amount = percent_of(total_amount, rate.deposit_percentage)?;

    Ok(PriceCalculation {
        stay_type,
        nights,
        units,
        base_price,
        tax_amount,
        service_fee,
        discount_amount,
        total_amount,
        deposit_amount,
        rate: rate.clone(),
    })
}

fn billing_units(stay_type: StayType, check_in: NaiveDate, check_out: NaiveDate, nights: i64) -> i64 {
    match stay_type {
        StayType::Daily => nights,
        StayType::Weekly => ceil_div(nights, 7).max(1),
        StayType::Monthly => {
            let months = calendar_months_between(check_in, check_out);
            if months > 0 {
                months
            } else {
                ceil_div(nights, 30).max(1)
            }
        }
    }
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    (value + divisor - 1) / divisor
}

fn percent_of(amount: i64, percentage: Decimal) -> Result<i64, BookingError> {
    Decimal::from(amount)
        .checked_mul(percentage)
        .and_then(|scaled| scaled.checked_div(dec!(100)))
        .map(|value| value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|value| value.to_i64())
        .ok_or(BookingError::AmountOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::RoomTypeId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rate(stay_type: StayType, price: i64) -> Rate {
        Rate::new(RoomTypeId(1), stay_type, price)
    }

    #[test]
    fn daily_bills_one_unit_per_night() {
        let calc = compute_price(
            &rate(StayType::Daily, 300_000),
            date(2024, 3, 1),
            date(2024, 3, 4),
            StayType::Daily,
        )
        .unwrap();
        assert_eq!(calc.nights, 3);
        assert_eq!(calc.units, 3);
        assert_eq!(calc.base_price, 900_000);
        assert_eq!(calc.total_amount, 900_000);
    }

    #[test]
    fn weekly_rounds_partial_weeks_up() {
        let weekly = rate(StayType::Weekly, 1_500_000);

        let seven = compute_price(&weekly, date(2024, 3, 1), date(2024, 3, 8), StayType::Weekly)
            .unwrap();
        assert_eq!(seven.units, 1);

        let eight = compute_price(&weekly, date(2024, 3, 1), date(2024, 3, 9), StayType::Weekly)
            .unwrap();
        assert_eq!(eight.units, 2);
        assert_eq!(eight.base_price, 3_000_000);
    }

    #[test]
    fn monthly_without_full_calendar_month_uses_thirty_day_blocks() {
        let calc = compute_price(
            &rate(StayType::Monthly, 5_000_000),
            date(2024, 1, 10),
            date(2024, 2, 4),
            StayType::Monthly,
        )
        .unwrap();
        assert_eq!(calc.nights, 25);
        assert_eq!(calc.units, 1);
    }

    #[test]
    fn monthly_with_full_calendar_month_counts_calendar_months() {
        let calc = compute_price(
            &rate(StayType::Monthly, 5_000_000),
            date(2024, 1, 10),
            date(2024, 2, 15),
            StayType::Monthly,
        )
        .unwrap();
        assert_eq!(calc.nights, 36);
        assert_eq!(calc.units, 1);
        assert_eq!(calc.base_price, 5_000_000);
    }

    #[test]
    fn calendar_months_respect_day_of_month() {
        assert_eq!(calendar_months_between(date(2024, 1, 10), date(2024, 2, 9)), 0);
        assert_eq!(calendar_months_between(date(2024, 1, 10), date(2024, 2, 10)), 1);
        assert_eq!(calendar_months_between(date(2023, 11, 15), date(2024, 2, 20)), 3);
        assert_eq!(calendar_months_between(date(2024, 1, 31), date(2024, 2, 29)), 0);
    }

    #[test]
    fn reversed_or_empty_range_is_invalid() {
        let daily = rate(StayType::Daily, 100);
        assert_eq!(
            compute_price(&daily, date(2024, 3, 4), date(2024, 3, 4), StayType::Daily),
            Err(BookingError::InvalidDateRange)
        );
        assert_eq!(
            compute_price(&daily, date(2024, 3, 4), date(2024, 3, 1), StayType::Daily),
            Err(BookingError::InvalidDateRange)
        );
    }

    #[test]
    fn below_minimum_stay_is_rejected() {
        let daily = rate(StayType::Daily, 100).with_min_stay(3);
        assert_eq!(
            compute_price(&daily, date(2024, 3, 1), date(2024, 3, 3), StayType::Daily),
            Err(BookingError::BelowMinimumStay {
                nights: 2,
                min_stay: 3
            })
        );
    }

    #[test]
    fn tax_fee_and_deposit_breakdown() {
        let daily = rate(StayType::Daily, 250)
            .with_tax(dec!(1))
            .with_service_fee(40)
            .with_deposit(dec!(30));

        let calc = compute_price(&daily, date(2024, 3, 1), date(2024, 3, 2), StayType::Daily)
            .unwrap();

        // 2.5 rounds away from zero
        assert_eq!(calc.tax_amount, 3);
        assert_eq!(calc.service_fee, 40);
        assert_eq!(calc.discount_amount, 0);
        assert_eq!(calc.total_amount, 293);
        // 87.9
        assert_eq!(calc.deposit_amount, 88);
    }

    #[test]
    fn service_fee_is_not_scaled_by_units() {
        let daily = rate(StayType::Daily, 1_000).with_service_fee(500);
        let calc = compute_price(&daily, date(2024, 3, 1), date(2024, 3, 11), StayType::Daily)
            .unwrap();
        assert_eq!(calc.base_price, 10_000);
        assert_eq!(calc.total_amount, 10_500);
    }

    #[test]
    fn fractional_tax_percentage() {
        let daily = rate(StayType::Daily, 1_000_000).with_tax(dec!(11.5));
        let calc = compute_price(&daily, date(2024, 3, 1), date(2024, 3, 2), StayType::Daily)
            .unwrap();
        assert_eq!(calc.tax_amount, 115_000);
    }

    #[test]
    fn overflow_is_reported() {
        let daily = rate(StayType::Daily, i64::MAX);
        assert_eq!(
            compute_price(&daily, date(2024, 3, 1), date(2024, 3, 3), StayType::Daily),
            Err(BookingError::AmountOverflow)
        );
    }

    #[test]
    fn suggestion_thresholds_are_inclusive() {
        assert_eq!(suggest_stay_type(1), StayType::Daily);
        assert_eq!(suggest_stay_type(6), StayType::Daily);
        assert_eq!(suggest_stay_type(7), StayType::Weekly);
        assert_eq!(suggest_stay_type(27), StayType::Weekly);
        assert_eq!(suggest_stay_type(28), StayType::Monthly);
    }

    #[test]
    fn stay_type_parsing() {
        assert_eq!("Weekly".parse::<StayType>(), Ok(StayType::Weekly));
        assert_eq!(
            "hourly".parse::<StayType>(),
            Err(BookingError::InvalidStayType("hourly".to_string()))
        );
    }
}
