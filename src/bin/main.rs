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

use chrono::{DateTime, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use pass_ledger_rs::{ClientId, Engine, KioskId, PassId, RedeemRequest, Settings};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;

/// Pass Ledger - Replay kiosk scan event CSV files
///
/// Reads setup and scan events from a CSV file, runs them through the
/// redemption engine, and writes pass states (or the ledger) to stdout.
#[derive(Parser, Debug)]
#[command(name = "pass-ledger-rs")]
#[command(about = "A pass redemption engine that replays scan-event CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with events
    ///
    /// Expected format: type,client,name,plan_size,valid_days,price,pass,kiosk,event,ts
    /// Example: cargo run -- events.csv > passes.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Secret key for token hashing
    #[arg(long, default_value = "dev-secret")]
    token_secret: String,

    /// Minimum seconds between two scans of the same pass
    #[arg(long, default_value_t = 0)]
    cooldown_sec: i64,

    /// Drop-in price in RSD
    #[arg(long, default_value = "0")]
    dropin_price: Decimal,

    /// Write the ledger instead of pass states
    #[arg(long)]
    ledger: bool,
}

fn main() {
    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = Engine::with_settings(
        args.token_secret.as_bytes(),
        Settings {
            cooldown_sec: args.cooldown_sec,
            drop_in_price_rsd: args.dropin_price,
        },
    );

    if let Err(e) = process_events(&engine, BufReader::new(file)) {
        eprintln!("Error processing events: {}", e);
        process::exit(1);
    }

    let result = if args.ledger {
        write_ledger(&engine, std::io::stdout())
    } else {
        write_passes(&engine, std::io::stdout())
    };
    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, client, name, plan_size, valid_days, price, pass, kiosk, event, ts`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    event_type: String,
    client: u32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    plan_size: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    valid_days: Option<i64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    price: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pass: Option<u32>,
    #[serde(default)]
    kiosk: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug)]
enum Command {
    Register {
        client: ClientId,
        name: String,
    },
    Sell {
        client: ClientId,
        plan_size: u32,
        valid_days: i64,
        price: Decimal,
    },
    Revoke {
        client: ClientId,
        pass: PassId,
    },
    Deactivate {
        client: ClientId,
    },
    Redeem {
        request: RedeemRequest,
        at: DateTime<Utc>,
    },
}

impl CsvRecord {
    /// Converts a CSV record to a command.
    ///
    /// Returns `None` for unknown types or missing required fields.
    fn into_command(self) -> Option<Command> {
        let client = ClientId(self.client);
        match self.event_type.to_lowercase().as_str() {
            "client" => Some(Command::Register {
                client,
                name: self.name.unwrap_or_default(),
            }),
            "pass" | "renew" => Some(Command::Sell {
                client,
                plan_size: self.plan_size?,
                valid_days: self.valid_days.unwrap_or(30),
                price: self.price.unwrap_or(Decimal::ZERO),
            }),
            "revoke" => Some(Command::Revoke {
                client,
                pass: PassId(self.pass?),
            }),
            "deactivate" => Some(Command::Deactivate { client }),
            "redeem" => {
                let ts = self.ts?;
                let at = DateTime::parse_from_rfc3339(&ts).ok()?.with_timezone(&Utc);
                Some(Command::Redeem {
                    request: RedeemRequest {
                        token: None,
                        client_id: Some(client),
                        kiosk_id: KioskId::new(self.kiosk.unwrap_or_else(|| "csv".into())),
                        ts,
                        idempotency_key: self.event?,
                        ip: None,
                    },
                    at,
                })
            }
            _ => None,
        }
    }
}

/// Replays events from a CSV reader against the engine.
///
/// Streaming: arbitrarily large files are handled without loading them
/// into memory. Malformed rows and rejected events are skipped; redeem
/// rows are evaluated at their own timestamp so replays are deterministic.
///
/// # CSV Format
///
/// ```csv
/// type,client,name,plan_size,valid_days,price,pass,kiosk,event,ts
/// client,1,Mira,,,,,,,
/// pass,1,,10,30,12000,,,,
/// redeem,1,,,,,,front-door,evt-1,2026-08-26T10:00:00Z
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the structure is invalid.
/// Individual event rejections don't stop processing.
pub fn process_events<R: Read>(engine: &Engine, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(command) = record.into_command() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid event record");
                    continue;
                };

                let outcome = match command {
                    Command::Register { client, name } => {
                        engine.register_client(client, name).map(|_| ())
                    }
                    Command::Sell {
                        client,
                        plan_size,
                        valid_days,
                        price,
                    } => engine.sell_pass(client, plan_size, valid_days, price).map(|_| ()),
                    Command::Revoke { client, pass } => engine.revoke_pass(client, pass),
                    Command::Deactivate { client } => engine.deactivate_client(client),
                    Command::Redeem { request, at } => engine.redeem_at(&request, at).map(|_| ()),
                };

                if let Err(_e) = outcome {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping event: {}", _e);
                }
            }
            Err(_e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", _e);
                continue;
            }
        }
    }

    Ok(())
}

/// Writes every client's pass states as CSV.
pub fn write_passes<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for client in engine.clients() {
        for pass in engine.passes(client.id) {
            wtr.serialize(&pass)?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the full ledger as CSV, in insertion order.
pub fn write_ledger<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in engine.ledger().snapshot() {
        wtr.serialize(entry.as_ref())?;
    }
    wtr.flush()?;
    Ok(())
}
