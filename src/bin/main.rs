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

use booking_engine::{
    Booking, BookingEngine, BookingError, BookingId, BookingRequest, EngineConfig, EventId,
    FixedClock, GuestContact, MismatchPolicy, MockInvoiceProvider, PaymentEvent, PaymentEventStatus,
    PaymentOption, PropertyId, Rate, RateBook, Room, RoomId, RoomTypeId, StayType,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const REPLAY_TOKEN: &str = "replay";

/// Booking Engine - Replay booking command CSV files
///
/// Reads booking commands from a CSV file, applies them to an in-memory
/// engine with a replay clock, and writes the resulting bookings to stdout.
#[derive(Parser, Debug)]
#[command(name = "booking-engine")]
#[command(about = "Replays booking and payment commands from a CSV", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: op,at,room,room_type,booking,check_in,check_out,amount,detail
    /// Example: cargo run -- commands.csv > bookings.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Accept any positive payment instead of requiring the invoiced amount
    #[arg(long)]
    accept_any_amount: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let mut config = EngineConfig::default().with_webhook_token(REPLAY_TOKEN);
    if args.accept_any_amount {
        config = config.with_mismatch_policy(MismatchPolicy::AcceptAny);
    }

    let replay = match replay_commands(BufReader::new(file), config) {
        Ok(replay) => replay,
        Err(e) => {
            eprintln!("Error processing commands: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_bookings(&replay, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, at, room, room_type, booking, check_in, check_out, amount, detail`
#[derive(Debug, Deserialize)]
struct CommandRecord {
    op: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "csv::invalid_option")]
    room: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    room_type: Option<u32>,
    #[serde(default)]
    booking: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    check_in: Option<NaiveDate>,
    #[serde(deserialize_with = "csv::invalid_option")]
    check_out: Option<NaiveDate>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<i64>,
    #[serde(default)]
    detail: String,
}

/// Engine state after a replay, with the labels the CSV used for bookings.
struct Replay {
    engine: BookingEngine,
    rates: Arc<RateBook>,
    clock: Arc<FixedClock>,
    labels: HashMap<BookingId, String>,
    by_label: HashMap<String, BookingId>,
}

impl Replay {
    fn new(config: EngineConfig) -> Self {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let rates = Arc::new(RateBook::new());
        let engine = BookingEngine::in_memory(
            rates.clone(),
            Arc::new(MockInvoiceProvider::with_clock(clock.clone())),
            clock.clone(),
            config,
        );
        Self {
            engine,
            rates,
            clock,
            labels: HashMap::new(),
            by_label: HashMap::new(),
        }
    }

    fn booking_id(&self, label: &str) -> Result<BookingId, BookingError> {
        self.by_label
            .get(label)
            .copied()
            .ok_or_else(|| BookingError::NotFound(format!("booking {label}")))
    }

    fn apply(&mut self, line: usize, record: CommandRecord) -> Result<(), BookingError> {
        if let Some(at) = record.at {
            self.clock.set(at);
        }

        match record.op.to_lowercase().as_str() {
            "rate" => {
                let room_type = RoomTypeId(required(record.room_type, "room_type")?);
                let stay_type: StayType = record.detail.parse()?;
                let price = required(record.amount, "amount")?;
                self.rates.publish(Rate::new(room_type, stay_type, price))?;
            }
            "room" => {
                let id = RoomId(required(record.room, "room")?);
                let room_type = RoomTypeId(required(record.room_type, "room_type")?);
                let number = if record.detail.is_empty() {
                    id.to_string()
                } else {
                    record.detail
                };
                self.engine
                    .put_room(Room::new(id, PropertyId(1), room_type, number))?;
            }
            "book" => {
                if record.booking.is_empty() {
                    return Err(BookingError::InvalidParameters("booking label is required".into()));
                }
                let stay_type = if record.detail.is_empty() {
                    None
                } else {
                    Some(record.detail.parse()?)
                };
                let receipt = self.engine.create_booking(BookingRequest {
                    room_id: RoomId(required(record.room, "room")?),
                    guest: replay_guest(&record.booking),
                    check_in: required(record.check_in, "check_in")?,
                    check_out: required(record.check_out, "check_out")?,
                    stay_type,
                    guests: 1,
                    special_requests: None,
                    payment_method: None,
                    payment_option: PaymentOption::Full,
                })?;
                self.labels.insert(receipt.booking.id, record.booking.clone());
                self.by_label.insert(record.booking, receipt.booking.id);
            }
            "pay" | "expire" | "fail" => {
                let status = match record.op.to_lowercase().as_str() {
                    "pay" => PaymentEventStatus::Paid,
                    "expire" => PaymentEventStatus::Expired,
                    _ => PaymentEventStatus::Failed,
                };
                let id = self.booking_id(&record.booking)?;
                let event_id = if record.detail.is_empty() {
                    format!("replay-{line}")
                } else {
                    record.detail
                };
                let event = PaymentEvent {
                    id: EventId(event_id),
                    external_id: id.reference(),
                    payment_channel: None,
                    amount: record.amount.unwrap_or(0),
                    status,
                };
                let result = self.engine.handle_webhook(Some(REPLAY_TOKEN), event)?;
                debug!(line, outcome = ?result.outcome, replayed = result.replayed, "Payment event applied");
            }
            "checkin" => {
                self.engine.check_in(self.booking_id(&record.booking)?)?;
            }
            "checkout" => {
                self.engine.check_out(self.booking_id(&record.booking)?)?;
            }
            "cancel" => {
                self.engine
                    .cancel(self.booking_id(&record.booking)?, record.detail)?;
            }
            "noshow" => {
                self.engine.mark_no_show(self.booking_id(&record.booking)?)?;
            }
            "sweep" => {
                self.engine.expire_pending_holds()?;
            }
            other => {
                return Err(BookingError::InvalidParameters(format!("unknown op '{other}'")));
            }
        }
        Ok(())
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, BookingError> {
    value.ok_or_else(|| BookingError::InvalidParameters(format!("{field} is required")))
}

fn replay_guest(label: &str) -> GuestContact {
    GuestContact {
        name: format!("Guest {label}"),
        email: "guest@replay.invalid".to_string(),
        phone: "0000000000".to_string(),
    }
}

/// Replay booking commands from a CSV reader.
///
/// Rows are streamed, so arbitrarily large files are not loaded into memory.
/// Malformed rows and rejected commands are logged and skipped.
///
/// # CSV Format
///
/// Expected columns: `op, at, room, room_type, booking, check_in, check_out, amount, detail`
/// - `op`: rate, room, book, pay, expire, fail, checkin, checkout, cancel, noshow, sweep
/// - `at`: optional RFC 3339 instant; the replay clock is set to it first
/// - `booking`: label the CSV uses to refer to a booking
/// - `detail`: stay type for rate/book, event id for payment ops, reason for cancel
///
/// # Example
///
/// ```csv
/// op,at,room,room_type,booking,check_in,check_out,amount,detail
/// rate,,,1,,,,400000,daily
/// room,,101,1,,,,,
/// book,2024-03-01T09:00:00Z,101,,b1,2024-03-10,2024-03-12,,
/// pay,2024-03-01T10:00:00Z,,,b1,,,800000,evt-1
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn replay_commands<R: Read>(reader: R, config: EngineConfig) -> Result<Replay, csv::Error> {
    let mut replay = Replay::new(config);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (index, result) in rdr.deserialize::<CommandRecord>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        match result {
            Ok(record) => {
                let op = record.op.clone();
                if let Err(e) = replay.apply(line, record) {
                    warn!(line, op = %op, error = %e, "Skipping command");
                }
            }
            Err(e) => {
                warn!(line, error = %e, "Skipping malformed row");
            }
        }
    }

    Ok(replay)
}

/// One output row per booking.
#[derive(Debug, Serialize)]
struct BookingRow<'a> {
    booking: &'a str,
    reference: &'a str,
    room: u32,
    check_in: NaiveDate,
    check_out: NaiveDate,
    stay_type: &'static str,
    status: &'static str,
    payment_status: &'static str,
    total: i64,
    paid: i64,
    cancellation_reason: String,
}

impl<'a> BookingRow<'a> {
    fn new(label: &'a str, booking: &'a Booking) -> Self {
        Self {
            booking: label,
            reference: &booking.reference,
            room: booking.room_id.0,
            check_in: booking.check_in,
            check_out: booking.check_out,
            stay_type: booking.stay_type.as_str(),
            status: booking.status.as_str(),
            payment_status: booking.payment_status.as_str(),
            total: booking.total_amount,
            paid: booking.paid_amount,
            cancellation_reason: booking
                .cancellation_reason
                .as_ref()
                .map(|reason| reason.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Write every booking, in creation order, as CSV.
///
/// # CSV Format
///
/// Columns: `booking, reference, room, check_in, check_out, stay_type, status,
/// payment_status, total, paid, cancellation_reason`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
fn write_bookings<W: Write>(replay: &Replay, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let bookings = replay
        .engine
        .bookings()
        .map_err(|e| csv::Error::from(std::io::Error::other(e)))?;
    for booking in &bookings {
        let label = replay.labels.get(&booking.id).map(String::as_str).unwrap_or("");
        wtr.serialize(BookingRow::new(label, booking))?;
    }

    wtr.flush()?;
    Ok(())
}
