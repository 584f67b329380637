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

use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use trip_ledger::{
    DebtStatus, LedgerError, LedgerSnapshot, MemberId, NetBalances, TOLERANCE, TransactionSplit,
    calculate_trip_balances, check_amount, net_balances, round_money, suggest_settlements,
};

/// Trip Ledger - Settle shared trip expenses from a CSV ledger
///
/// Reads expenses, splits and settlements from a CSV file and writes member
/// balances, pairwise debts, or suggested transfers to stdout.
#[derive(Parser, Debug)]
#[command(name = "trip-ledger")]
#[command(about = "Computes who owes whom from a CSV expense ledger", long_about = None)]
struct Args {
    /// Path to CSV file with ledger rows
    ///
    /// Expected format: type,tx,member,counterparty,amount
    /// Example: cargo run -- ledger.csv --mode suggest > transfers.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// What to write to stdout
    #[arg(long, value_enum, default_value_t = Mode::Balances)]
    mode: Mode,

    /// Log filter for diagnostics on stderr (e.g. `debug`, `trip_ledger=trace`)
    #[arg(long, env = "TRIP_LEDGER_LOG", default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Net balance per member
    Balances,
    /// Pairwise debts with paid and remaining amounts
    Debts,
    /// Minimal transfers that settle everyone
    Suggest,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .init();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let snapshot = match read_ledger(BufReader::new(file)) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Error reading ledger: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_report(&snapshot, args.mode, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, tx, member, counterparty, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    tx: Option<u32>,
    member: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    counterparty: Option<u32>,
    amount: Decimal,
}

/// An expense being assembled from its `expense` and `split` rows.
#[derive(Debug)]
struct PendingExpense {
    paid_by: MemberId,
    total_amount: Decimal,
    splits: Vec<TransactionSplit>,
}

/// Builds a ledger snapshot from CSV rows.
///
/// Members are listed in order of first appearance. Rows that cannot be
/// parsed, amounts that are negative, finer than a cent or above
/// [`trip_ledger::MAX_AMOUNT`], splits for unknown expenses, and expenses
/// whose splits do not add up to the total are skipped.
///
/// # CSV Format
///
/// ```csv
/// type,tx,member,counterparty,amount
/// expense,1,1,,300.00
/// split,1,1,,100.00
/// split,1,2,,200.00
/// settlement,,2,1,50.00
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn read_ledger<R: Read>(reader: R) -> Result<LedgerSnapshot, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut members: Vec<MemberId> = Vec::new();
    let mut see = |member: MemberId| {
        if !members.contains(&member) {
            members.push(member);
        }
    };

    let mut expenses: BTreeMap<u32, PendingExpense> = BTreeMap::new();
    let mut snapshot = LedgerSnapshot::default();

    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!("skipping malformed row: {e}");
                continue;
            }
        };
        let member = MemberId(record.member);
        if let Err(e) = check_amount(record.amount) {
            tracing::debug!(kind = %record.kind, "skipping row: {e}");
            continue;
        }

        match (record.kind.to_lowercase().as_str(), record.tx, record.counterparty) {
            ("expense", Some(tx), _) => {
                see(member);
                expenses.insert(
                    tx,
                    PendingExpense {
                        paid_by: member,
                        total_amount: record.amount,
                        splits: Vec::new(),
                    },
                );
            }
            ("split", Some(tx), _) => match expenses.get_mut(&tx) {
                Some(expense) => {
                    see(member);
                    expense.splits.push(TransactionSplit::new(member, record.amount));
                }
                None => tracing::debug!(tx, "skipping split for unknown expense"),
            },
            ("settlement", _, Some(to)) => {
                let to = MemberId(to);
                see(member);
                see(to);
                snapshot.push_payment(member, to, record.amount);
            }
            (kind, _, _) => tracing::debug!(kind, "skipping invalid ledger row"),
        }
    }

    for (tx, expense) in expenses {
        let Some(actual) = expense
            .splits
            .iter()
            .try_fold(Decimal::ZERO, |sum, s| sum.checked_add(s.amount))
        else {
            tracing::warn!(tx, "skipping expense whose splits overflow");
            continue;
        };
        if expense.splits.is_empty() || (actual - expense.total_amount).abs() > TOLERANCE {
            tracing::warn!(tx, expected = %expense.total_amount, %actual, "skipping unbalanced expense");
            continue;
        }
        snapshot.push_expense(expense.paid_by, expense.total_amount, expense.splits);
    }

    snapshot.members = members;
    Ok(snapshot)
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    member: MemberId,
    balance: Decimal,
}

#[derive(Debug, Serialize)]
struct DebtRow {
    from: MemberId,
    to: MemberId,
    total: Decimal,
    paid: Decimal,
    remaining: Decimal,
    status: DebtStatus,
}

#[derive(Debug, Serialize)]
struct TransferRow {
    from: MemberId,
    to: MemberId,
    amount: Decimal,
}

fn invalid_ledger(e: LedgerError) -> csv::Error {
    csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, e))
}

fn balances_of(snapshot: &LedgerSnapshot) -> Result<NetBalances, csv::Error> {
    net_balances(snapshot).map_err(invalid_ledger)
}

/// Writes the report selected by `mode` as CSV.
///
/// # Errors
///
/// Returns a CSV error if writing fails or the ledger references a member it
/// does not list.
fn write_report<W: Write>(
    snapshot: &LedgerSnapshot,
    mode: Mode,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    match mode {
        Mode::Balances => {
            let balances = balances_of(snapshot)?;
            for (member, balance) in balances.iter() {
                wtr.serialize(BalanceRow {
                    member,
                    balance: round_money(balance),
                })?;
            }
        }
        Mode::Debts => {
            for debt in calculate_trip_balances(snapshot).map_err(invalid_ledger)? {
                wtr.serialize(DebtRow {
                    from: debt.from_member_id,
                    to: debt.to_member_id,
                    total: debt.total_amount,
                    paid: debt.paid_amount,
                    remaining: debt.remaining_amount,
                    status: debt.status,
                })?;
            }
        }
        Mode::Suggest => {
            let balances = balances_of(snapshot)?;
            for transfer in suggest_settlements(balances.iter()) {
                wtr.serialize(TransferRow {
                    from: transfer.from_member_id,
                    to: transfer.to_member_id,
                    amount: transfer.amount,
                })?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const LEDGER: &str = "type,tx,member,counterparty,amount\n\
                          expense,1,1,,300.00\n\
                          split,1,1,,100.00\n\
                          split,1,2,,100.00\n\
                          split,1,3,,100.00\n\
                          expense,2,2,,90.00\n\
                          split,2,2,,30.00\n\
                          split,2,3,,60.00\n\
                          settlement,,2,1,50.00\n";

    fn report(csv: &str, mode: Mode) -> String {
        let snapshot = read_ledger(Cursor::new(csv)).unwrap();
        let mut output = Vec::new();
        write_report(&snapshot, mode, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn parse_expenses_and_settlements() {
        let snapshot = read_ledger(Cursor::new(LEDGER)).unwrap();
        assert_eq!(snapshot.members, vec![MemberId(1), MemberId(2), MemberId(3)]);
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.payments.len(), 1);
        assert_eq!(snapshot.entries[1].splits[1].amount, dec!(60.00));
    }

    #[test]
    fn skip_unbalanced_expense() {
        let csv = "type,tx,member,counterparty,amount\n\
                   expense,1,1,,100\n\
                   split,1,2,,90\n";
        let snapshot = read_ledger(Cursor::new(csv)).unwrap();
        assert!(snapshot.entries.is_empty());
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "type,tx,member,counterparty,amount\n\
                   expense,1,1,,10\n\
                   split,1,2,,10\n\
                   split,x,y,z,oops\n\
                   refund,1,2,,10\n";
        let snapshot = read_ledger(Cursor::new(csv)).unwrap();
        assert_eq!(snapshot.entries.len(), 1);
    }

    #[test]
    fn skip_sub_cent_and_oversized_amounts() {
        let csv = "type,tx,member,counterparty,amount\n\
                   expense,1,1,,0.01\n\
                   split,1,2,,0.005\n\
                   split,1,2,,0.01\n\
                   expense,2,1,,1000000000000\n\
                   settlement,,2,1,0.005\n";
        let snapshot = read_ledger(Cursor::new(csv)).unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].splits.len(), 1);
        assert_eq!(snapshot.entries[0].splits[0].amount, dec!(0.01));
        assert!(snapshot.payments.is_empty());
    }

    #[test]
    fn parse_with_whitespace() {
        let csv = "type,tx,member,counterparty,amount\n expense , 1 , 1 , , 20 \n split , 1 , 2 , , 20 \n";
        let snapshot = read_ledger(Cursor::new(csv)).unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].total_amount, dec!(20));
    }

    #[test]
    fn write_balances() {
        let output = report(LEDGER, Mode::Balances);
        assert_eq!(output, "member,balance\n1,150.00\n2,10.00\n3,-160.00\n");
    }

    #[test]
    fn write_debts() {
        let output = report(LEDGER, Mode::Debts);
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("from,to,total,paid,remaining,status"));
        assert_eq!(lines.next(), Some("2,1,100.00,50.00,50.00,unpaid"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn write_suggestions() {
        let output = report(LEDGER, Mode::Suggest);
        assert_eq!(output, "from,to,amount\n3,1,150.00\n3,2,10.00\n");
    }
}
