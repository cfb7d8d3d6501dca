//! CSV command scripts.
//!
//! A script drives one [`VendingMachine`] row by row. The header is
//! `action,session,product,value,quantity`; which columns a row needs depends
//! on its action:
//!
//! | action         | session | product | value        | quantity |
//! |----------------|---------|---------|--------------|----------|
//! | `load_product` |         | name    | price        | count    |
//! | `load_change`  |         | -       | denomination | count    |
//! | `start`        | alias   |         |              |          |
//! | `select`       | id      | name    |              |          |
//! | `insert`       | id      |         | denomination |          |
//! | `vend`         | id      |         |              |          |
//! | `reset`        | id      |         |              |          |
//!
//! `start` mints a fresh session and binds it to the alias, so later rows can
//! keep using the alias. Any other id is used as-is.

use crate::error::{Result, VendError};
use crate::inventory::ProductEntry;
use crate::machine::VendingMachine;
use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{Read, Write};

/// Raw script row as read from CSV.
#[derive(Debug, Deserialize)]
pub struct ScriptRecord {
    pub action: String,
    pub session: Option<String>,
    pub product: Option<String>,
    pub value: Option<String>,
    pub quantity: Option<String>,
}

/// A parsed script command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadProduct(ProductEntry),
    LoadChange { denomination: u32, quantity: i64 },
    Start { alias: String },
    Select { session: String, product: String },
    Insert { session: String, denomination: u32 },
    Vend { session: String },
    Reset { session: String },
}

fn field(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ScriptRecord {
    /// Parses the row into a command. `row` is used for error context.
    pub fn parse(&self, row: usize) -> Result<Command> {
        let invalid = |message: String| VendError::InvalidRecord { row, message };
        let required = |value: &Option<String>, name: &str| {
            field(value)
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("missing {}", name)))
        };
        let number = |value: &Option<String>, name: &str| -> Result<i64> {
            let raw = required(value, name)?;
            raw.parse::<i64>()
                .map_err(|_| invalid(format!("{} is not a whole number: {}", name, raw)))
        };
        let denomination = |value: &Option<String>| -> Result<u32> {
            let raw = required(value, "value")?;
            raw.parse::<u32>()
                .map_err(|_| invalid(format!("value is not a coin: {}", raw)))
        };

        let action = self.action.trim().to_lowercase();
        match action.as_str() {
            "load_product" => Ok(Command::LoadProduct(ProductEntry::new(
                required(&self.product, "product")?,
                number(&self.value, "value")?,
                number(&self.quantity, "quantity")?,
            )?)),
            "load_change" => Ok(Command::LoadChange {
                denomination: denomination(&self.value)?,
                quantity: number(&self.quantity, "quantity")?,
            }),
            "start" => Ok(Command::Start {
                alias: required(&self.session, "session")?,
            }),
            "select" => Ok(Command::Select {
                session: required(&self.session, "session")?,
                product: required(&self.product, "product")?,
            }),
            "insert" => Ok(Command::Insert {
                session: required(&self.session, "session")?,
                denomination: denomination(&self.value)?,
            }),
            "vend" => Ok(Command::Vend {
                session: required(&self.session, "session")?,
            }),
            "reset" => Ok(Command::Reset {
                session: required(&self.session, "session")?,
            }),
            other => Err(invalid(format!("unknown action {:?}", other))),
        }
    }
}

/// What one script row did, in customer-facing words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEvent {
    pub row: usize,
    pub message: String,
}

/// Runs scripts against a machine and reports its final state.
#[derive(Debug, Default)]
pub struct ScriptRunner {
    machine: VendingMachine,
    aliases: HashMap<String, String>,
    events: Vec<ScriptEvent>,
}

impl ScriptRunner {
    /// Creates a runner around a fresh machine.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn machine(&self) -> &VendingMachine {
        &self.machine
    }

    /// Outcomes of every row that ran, in order.
    pub fn events(&self) -> &[ScriptEvent] {
        &self.events
    }

    /// Processes a script from a CSV reader in streaming fashion.
    ///
    /// Rows that fail to parse or are rejected by the machine are logged at
    /// warn level and skipped; the run continues with the next row.
    pub fn process_csv<R: Read>(&mut self, reader: R) -> Result<()> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        for (row_idx, result) in csv_reader.deserialize::<ScriptRecord>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row

            let outcome = result
                .map_err(VendError::from)
                .and_then(|record| record.parse(row_num))
                .and_then(|command| self.execute(command));
            match outcome {
                Ok(message) => {
                    info!("Row {}: {}", row_num, message);
                    self.events.push(ScriptEvent {
                        row: row_num,
                        message,
                    });
                }
                Err(e) => warn!("Row {}: {}", row_num, e),
            }
        }

        Ok(())
    }

    fn resolve(&self, session: &str) -> String {
        self.aliases
            .get(session)
            .cloned()
            .unwrap_or_else(|| session.to_string())
    }

    /// Runs one command and describes what happened.
    pub fn execute(&mut self, command: Command) -> Result<String> {
        match command {
            Command::LoadProduct(entry) => {
                let name = entry.name().to_string();
                self.machine.inventory().load_products(&[entry])?;
                Ok(format!("Loaded {}", name))
            }
            Command::LoadChange {
                denomination,
                quantity,
            } => {
                self.machine
                    .inventory()
                    .load_change(&[(denomination, quantity)])?;
                Ok("Change loaded successfully".to_string())
            }
            Command::Start { alias } => {
                let id = self.machine.start_session();
                self.aliases.insert(alias, id.clone());
                Ok(format!("Session ID: {}", id))
            }
            Command::Select { session, product } => {
                self.machine
                    .select_product(&self.resolve(&session), &product)?;
                Ok(format!("Product {} selected", product))
            }
            Command::Insert {
                session,
                denomination,
            } => {
                self.machine
                    .insert_coin(&self.resolve(&session), denomination)?;
                Ok(format!("Inserted {}p", denomination))
            }
            Command::Vend { session } => {
                let outcome = self.machine.vend(&self.resolve(&session))?;
                Ok(outcome.to_string())
            }
            Command::Reset { session } => {
                let receipt = self.machine.reset(&self.resolve(&session))?;
                self.aliases.remove(&session);
                Ok(receipt.to_string())
            }
        }
    }

    /// Writes the final catalog and till as CSV.
    ///
    /// Products come first (`name,price,stock`, sorted by name), then a blank
    /// line, then the till (`denomination,count`, ascending).
    pub fn write_output<W: Write>(&self, mut writer: W) -> Result<()> {
        {
            let mut csv_writer = WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut writer);
            csv_writer.write_record(["name", "price", "stock"])?;
            for product in self.machine.inventory().get_products() {
                csv_writer.serialize(&product)?;
            }
            csv_writer.flush()?;
        }

        writeln!(writer)?;

        let mut csv_writer = csv::Writer::from_writer(&mut writer);
        csv_writer.write_record(["denomination", "count"])?;
        for (coin, count) in self.machine.inventory().get_till().iter() {
            csv_writer.write_record([coin.value().to_string(), count.to_string()])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}
