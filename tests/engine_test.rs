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

//! Engine public API integration tests.

use booking_engine::{
    AvailabilityQuery, BookingEngine, BookingError, BookingRequest, BookingStatus,
    CancellationReason, Clock, EngineConfig, EventId, FixedClock, GuestContact, Invoice,
    InvoiceProvider, InvoiceRequest, MockInvoiceProvider, PaymentEvent, PaymentEventStatus,
    PaymentOption, PaymentStatus, PropertyId, Rate, RateBook, Room, RoomId, RoomScope, RoomStatus,
    RoomTypeId, StayType,
};
use chrono::{Duration, NaiveDate};
use rust_decimal_macros::dec;
use std::sync::Arc;

const TOKEN: &str = "callback-secret";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Hotel {
    clock: Arc<FixedClock>,
    rates: Arc<RateBook>,
    invoices: Arc<MockInvoiceProvider>,
    engine: BookingEngine,
}

/// Two standard rooms and a suite on property 1, one standard room on property 2.
fn hotel() -> Hotel {
    let clock = Arc::new(FixedClock::at_date(date(2024, 1, 2)));
    let rates = Arc::new(RateBook::new());
    rates
        .publish(Rate::new(RoomTypeId(1), StayType::Daily, 400_000).with_tax(dec!(11)))
        .unwrap();
    rates
        .publish(Rate::new(RoomTypeId(1), StayType::Weekly, 2_500_000))
        .unwrap();
    rates
        .publish(Rate::new(RoomTypeId(1), StayType::Monthly, 9_000_000).with_deposit(dec!(30)))
        .unwrap();
    rates
        .publish(Rate::new(RoomTypeId(2), StayType::Daily, 1_000_000).with_min_stay(2))
        .unwrap();

    let invoices = Arc::new(MockInvoiceProvider::with_clock(clock.clone()));
    let engine = BookingEngine::in_memory(
        rates.clone(),
        invoices.clone(),
        clock.clone(),
        EngineConfig::default().with_webhook_token(TOKEN),
    );
    engine.put_room(Room::new(RoomId(101), PropertyId(1), RoomTypeId(1), "101")).unwrap();
    engine.put_room(Room::new(RoomId(102), PropertyId(1), RoomTypeId(1), "102")).unwrap();
    engine.put_room(Room::new(RoomId(201), PropertyId(1), RoomTypeId(2), "201")).unwrap();
    engine.put_room(Room::new(RoomId(301), PropertyId(2), RoomTypeId(1), "301")).unwrap();

    Hotel {
        clock,
        rates,
        invoices,
        engine,
    }
}

fn request(room: u32, check_in: NaiveDate, check_out: NaiveDate) -> BookingRequest {
    BookingRequest {
        room_id: RoomId(room),
        guest: GuestContact {
            name: "Siti Rahma".to_string(),
            email: "siti@example.com".to_string(),
            phone: "+62 812-3456-7890".to_string(),
        },
        check_in,
        check_out,
        stay_type: None,
        guests: 2,
        special_requests: Some("High floor".to_string()),
        payment_method: None,
        payment_option: PaymentOption::Full,
    }
}

fn paid(id: &str, reference: &str, amount: i64) -> PaymentEvent {
    PaymentEvent {
        id: EventId(id.to_string()),
        external_id: reference.to_string(),
        payment_channel: Some("BCA".to_string()),
        amount,
        status: PaymentEventStatus::Paid,
    }
}

fn available(hotel: &Hotel, check_in: NaiveDate, check_out: NaiveDate) -> Vec<RoomId> {
    let query = AvailabilityQuery::new(check_in, check_out, RoomScope::all()).unwrap();
    hotel
        .engine
        .find_available(&query)
        .unwrap()
        .into_iter()
        .map(|room| room.id)
        .collect()
}

#[test]
fn all_rooms_free_initially() {
    let hotel = hotel();
    assert_eq!(
        available(&hotel, date(2024, 1, 10), date(2024, 1, 12)),
        vec![RoomId(101), RoomId(102), RoomId(201), RoomId(301)]
    );
}

#[test]
fn scope_narrows_by_property_and_type() {
    let hotel = hotel();
    let query = AvailabilityQuery::parse("2024-01-10", "2024-01-12", RoomScope::property(PropertyId(2))).unwrap();
    let rooms = hotel.engine.find_available(&query).unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, RoomId(301));

    let query = AvailabilityQuery::parse("2024-01-10", "2024-01-12", RoomScope::room_type(RoomTypeId(2))).unwrap();
    let rooms = hotel.engine.find_available(&query).unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, RoomId(201));
}

#[test]
fn malformed_query_is_invalid_parameters() {
    assert!(matches!(
        AvailabilityQuery::parse("2024-13-01", "2024-01-12", RoomScope::all()),
        Err(BookingError::InvalidParameters(_))
    ));
    assert!(matches!(
        AvailabilityQuery::parse("2024-01-12", "2024-01-12", RoomScope::all()),
        Err(BookingError::InvalidParameters(_))
    ));
}

#[test]
fn pending_hold_blocks_availability() {
    let hotel = hotel();
    hotel
        .engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();

    let free = available(&hotel, date(2024, 1, 11), date(2024, 1, 13));
    assert!(!free.contains(&RoomId(101)));
    // Check-out night is exclusive.
    let free = available(&hotel, date(2024, 1, 12), date(2024, 1, 14));
    assert!(free.contains(&RoomId(101)));
}

#[test]
fn out_of_service_room_is_not_offered() {
    let hotel = hotel();
    hotel
        .engine
        .set_room_status(RoomId(102), RoomStatus::OutOfService)
        .unwrap();
    hotel.engine.set_room_active(RoomId(301), false).unwrap();

    let free = available(&hotel, date(2024, 1, 10), date(2024, 1, 12));
    assert_eq!(free, vec![RoomId(101), RoomId(201)]);
    assert_eq!(
        hotel
            .engine
            .create_booking(request(102, date(2024, 1, 10), date(2024, 1, 12)))
            .map(|r| r.booking.id),
        Err(BookingError::RoomNotBookable(RoomId(102)))
    );
}

#[test]
fn quote_includes_tax() {
    let hotel = hotel();
    let quote = hotel
        .engine
        .quote(RoomId(101), date(2024, 1, 10), date(2024, 1, 13), None)
        .unwrap();
    assert_eq!(quote.stay_type, StayType::Daily);
    assert_eq!(quote.units, 3);
    assert_eq!(quote.base_price, 1_200_000);
    assert_eq!(quote.tax_amount, 132_000);
    assert_eq!(quote.total_amount, 1_332_000);
    assert_eq!(quote.deposit_amount, 1_332_000);
}

#[test]
fn minimum_stay_is_enforced() {
    let hotel = hotel();
    assert_eq!(
        hotel
            .engine
            .create_booking(request(201, date(2024, 1, 10), date(2024, 1, 11)))
            .map(|r| r.booking.id),
        Err(BookingError::BelowMinimumStay {
            nights: 1,
            min_stay: 2
        })
    );
}

#[test]
fn invalid_guest_contact_is_rejected() {
    let hotel = hotel();
    let mut bad = request(101, date(2024, 1, 10), date(2024, 1, 12));
    bad.guest.phone = "call me".to_string();
    assert!(matches!(
        hotel.engine.create_booking(bad),
        Err(BookingError::InvalidParameters(_))
    ));

    let mut crowd = request(101, date(2024, 1, 10), date(2024, 1, 12));
    crowd.guests = 11;
    assert!(matches!(
        hotel.engine.create_booking(crowd),
        Err(BookingError::InvalidParameters(_))
    ));
    assert!(hotel.engine.bookings().unwrap().is_empty());
}

#[test]
fn monthly_booking_with_deposit_invoice() {
    let hotel = hotel();
    let mut monthly = request(101, date(2024, 1, 10), date(2024, 2, 15));
    monthly.payment_option = PaymentOption::Deposit;
    let receipt = hotel.engine.create_booking(monthly).unwrap();

    assert_eq!(receipt.booking.stay_type, StayType::Monthly);
    assert_eq!(receipt.booking.price.units, 1);
    assert_eq!(receipt.booking.total_amount, 9_000_000);
    assert_eq!(receipt.booking.deposit_amount, 2_700_000);
    assert_eq!(receipt.booking.invoice_amount, 2_700_000);
    assert_eq!(hotel.invoices.requests()[0].amount, 2_700_000);

    let outcome = hotel
        .engine
        .handle_webhook(Some(TOKEN), paid("evt-1", &receipt.booking.reference, 2_700_000))
        .unwrap();
    assert!(!outcome.replayed);
    let booking = hotel.engine.booking(receipt.booking.id).unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_status, PaymentStatus::Partial);
}

#[test]
fn rate_change_does_not_reprice_existing_booking() {
    let hotel = hotel();
    let receipt = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();

    hotel
        .rates
        .publish(Rate::new(RoomTypeId(1), StayType::Daily, 600_000))
        .unwrap();

    let booking = hotel.engine.booking(receipt.booking.id).unwrap();
    assert_eq!(booking.total_amount, 888_000);
    assert_eq!(booking.price.rate.version, 1);

    let quote = hotel
        .engine
        .quote(RoomId(101), date(2024, 1, 20), date(2024, 1, 22), None)
        .unwrap();
    assert_eq!(quote.total_amount, 1_200_000);
    assert_eq!(quote.rate.version, 2);
}

#[test]
fn full_lifecycle_through_webhook() {
    let hotel = hotel();
    let receipt = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();
    let id = receipt.booking.id;

    hotel
        .engine
        .handle_webhook(Some(TOKEN), paid("evt-1", &receipt.booking.reference, 888_000))
        .unwrap();
    let booking = hotel.engine.booking(id).unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.paid_amount, 888_000);

    // Too early.
    assert!(matches!(
        hotel.engine.check_in(id),
        Err(BookingError::InvalidTransition { .. })
    ));

    hotel.clock.set(date(2024, 1, 10).and_hms_opt(15, 0, 0).unwrap().and_utc());
    assert_eq!(hotel.engine.check_in(id).unwrap().status, BookingStatus::CheckedIn);
    assert!(!available(&hotel, date(2024, 1, 10), date(2024, 1, 11)).contains(&RoomId(101)));

    hotel.clock.set(date(2024, 1, 12).and_hms_opt(10, 0, 0).unwrap().and_utc());
    assert_eq!(hotel.engine.check_out(id).unwrap().status, BookingStatus::CheckedOut);
    assert!(available(&hotel, date(2024, 1, 10), date(2024, 1, 11)).contains(&RoomId(101)));
}

#[test]
fn check_in_on_pending_leaves_state_unchanged() {
    let hotel = hotel();
    let receipt = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 2), date(2024, 1, 4)))
        .unwrap();

    assert_eq!(
        hotel.engine.check_in(receipt.booking.id).map(|b| b.status),
        Err(BookingError::InvalidTransition {
            from: BookingStatus::Pending,
            action: "check in"
        })
    );
    assert_eq!(hotel.engine.booking(receipt.booking.id).unwrap(), receipt.booking);
}

#[test]
fn cancel_requires_reason_and_releases_room() {
    let hotel = hotel();
    let receipt = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();
    let id = receipt.booking.id;

    assert!(matches!(
        hotel.engine.cancel(id, "  "),
        Err(BookingError::InvalidParameters(_))
    ));
    assert_eq!(hotel.engine.booking(id).unwrap().status, BookingStatus::Pending);

    hotel.engine.cancel(id, "guest changed plans").unwrap();
    assert!(available(&hotel, date(2024, 1, 10), date(2024, 1, 12)).contains(&RoomId(101)));
    assert!(matches!(
        hotel.engine.cancel(id, "again"),
        Err(BookingError::InvalidTransition { from: BookingStatus::Cancelled, .. })
    ));
}

#[test]
fn no_show_releases_room() {
    let hotel = hotel();
    let receipt = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 3), date(2024, 1, 6)))
        .unwrap();
    hotel
        .engine
        .handle_webhook(Some(TOKEN), paid("evt-1", &receipt.booking.reference, receipt.booking.invoice_amount))
        .unwrap();

    hotel.clock.set(date(2024, 1, 4).and_hms_opt(9, 0, 0).unwrap().and_utc());
    let booking = hotel.engine.mark_no_show(receipt.booking.id).unwrap();
    assert_eq!(booking.status, BookingStatus::NoShow);
    assert!(available(&hotel, date(2024, 1, 4), date(2024, 1, 6)).contains(&RoomId(101)));
}

#[test]
fn unpaid_hold_expires_and_room_frees() {
    let hotel = hotel();
    let receipt = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();

    hotel.clock.advance(Duration::hours(23));
    assert!(hotel.engine.expire_pending_holds().unwrap().is_empty());
    assert!(!available(&hotel, date(2024, 1, 10), date(2024, 1, 12)).contains(&RoomId(101)));

    hotel.clock.advance(Duration::hours(2));
    // Lapsed holds stop blocking before any sweep runs.
    assert!(available(&hotel, date(2024, 1, 10), date(2024, 1, 12)).contains(&RoomId(101)));

    assert_eq!(hotel.engine.expire_pending_holds().unwrap(), vec![receipt.booking.id]);
    let booking = hotel.engine.booking(receipt.booking.id).unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.cancellation_reason, Some(CancellationReason::PaymentExpired));
}

#[test]
fn new_claim_cancels_lapsed_hold_on_same_room() {
    let hotel = hotel();
    let first = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();
    hotel.clock.advance(Duration::hours(25));

    hotel
        .engine
        .create_booking(request(101, date(2024, 1, 11), date(2024, 1, 13)))
        .unwrap();
    assert_eq!(
        hotel.engine.booking(first.booking.id).unwrap().status,
        BookingStatus::Cancelled
    );
}

#[test]
fn invoice_failure_surfaces_and_frees_room() {
    let hotel = hotel();
    hotel.invoices.fail_next();
    assert!(matches!(
        hotel
            .engine
            .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12))),
        Err(BookingError::PaymentProvider(_))
    ));
    assert!(available(&hotel, date(2024, 1, 10), date(2024, 1, 12)).contains(&RoomId(101)));
}

#[test]
fn bookings_are_listed_in_creation_order() {
    let hotel = hotel();
    let a = hotel
        .engine
        .create_booking(request(102, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();
    hotel.clock.advance(Duration::minutes(1));
    let b = hotel
        .engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();

    let ids: Vec<_> = hotel.engine.bookings().unwrap().into_iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![a.booking.id, b.booking.id]);
}

#[test]
fn unknown_ids_are_not_found() {
    let hotel = hotel();
    assert!(matches!(hotel.engine.room(RoomId(999)), Err(BookingError::NotFound(_))));
    assert!(matches!(
        hotel.engine.booking(booking_engine::BookingId::new()),
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        hotel
            .engine
            .create_booking(request(999, date(2024, 1, 10), date(2024, 1, 12))),
        Err(BookingError::NotFound(_))
    ));
}

#[test]
fn oversized_invoice_validity_is_rejected_without_a_hold() {
    let clock = Arc::new(FixedClock::at_date(date(2024, 1, 2)));
    let rates = Arc::new(RateBook::new());
    rates
        .publish(Rate::new(RoomTypeId(1), StayType::Daily, 400_000))
        .unwrap();
    let engine = BookingEngine::in_memory(
        rates,
        Arc::new(MockInvoiceProvider::with_clock(clock.clone())),
        clock,
        EngineConfig {
            invoice_validity_secs: 10_000_000_000_000_000,
            ..EngineConfig::default()
        },
    );
    engine.put_room(Room::new(RoomId(101), PropertyId(1), RoomTypeId(1), "101")).unwrap();

    let result = engine.create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)));
    assert!(matches!(result, Err(BookingError::InvalidParameters(_))));
    assert!(engine.bookings().unwrap().is_empty());
}

/// Provider that only keeps invoices open for one hour.
struct ShortWindowProvider {
    clock: Arc<FixedClock>,
}

impl InvoiceProvider for ShortWindowProvider {
    fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, BookingError> {
        Ok(Invoice {
            id: format!("short-{}", request.external_id),
            invoice_url: "https://checkout.invalid/short".to_string(),
            status: "PENDING".to_string(),
            expiry_date: self.clock.now() + Duration::hours(1),
        })
    }
}

#[test]
fn hold_follows_a_shorter_provider_expiry() {
    let clock = Arc::new(FixedClock::at_date(date(2024, 1, 2)));
    let rates = Arc::new(RateBook::new());
    rates
        .publish(Rate::new(RoomTypeId(1), StayType::Daily, 400_000))
        .unwrap();
    let engine = BookingEngine::in_memory(
        rates,
        Arc::new(ShortWindowProvider { clock: clock.clone() }),
        clock.clone(),
        EngineConfig::default().with_webhook_token(TOKEN),
    );
    engine.put_room(Room::new(RoomId(101), PropertyId(1), RoomTypeId(1), "101")).unwrap();

    let receipt = engine
        .create_booking(request(101, date(2024, 1, 10), date(2024, 1, 12)))
        .unwrap();
    assert_eq!(receipt.booking.hold_expires_at, receipt.invoice.expiry_date);

    clock.advance(Duration::hours(2));
    let query = AvailabilityQuery::new(date(2024, 1, 10), date(2024, 1, 12), RoomScope::all()).unwrap();
    let free: Vec<_> = engine
        .find_available(&query)
        .unwrap()
        .into_iter()
        .map(|room| room.id)
        .collect();
    assert_eq!(free, vec![RoomId(101)]);
    assert_eq!(engine.expire_pending_holds().unwrap(), vec![receipt.booking.id]);
}
