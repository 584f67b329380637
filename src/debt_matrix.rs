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

//! Pairwise debt tracking.
//!
//! Builds two `[creditor][debtor]` matrices from a ledger snapshot:
//!
//! - **debts**: for each split whose member is not the payer, the split
//!   amount is owed by the split member to the payer;
//! - **payments**: each confirmed settlement pays down what `from` owes `to`.
//!
//! Every pair that ever had debt yields one [`PairwiseDebt`] row. Debts in
//! opposite directions between the same two members stay as separate rows;
//! only [`crate::simplify`] nets positions across members.

use crate::LedgerError;
use crate::base::{MemberId, TOLERANCE, add_money};
use crate::ledger::LedgerSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Paid,
    Unpaid,
}

/// What `from_member` owes `to_member`, and how much of it is settled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairwiseDebt {
    /// Debtor.
    pub from_member_id: MemberId,
    /// Creditor.
    pub to_member_id: MemberId,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    /// Exactly zero once the pair is paid.
    pub remaining_amount: Decimal,
    pub status: DebtStatus,
}

impl PairwiseDebt {
    pub fn is_paid(&self) -> bool {
        self.status == DebtStatus::Paid
    }

    pub fn involves(&self, member_id: MemberId) -> bool {
        self.from_member_id == member_id || self.to_member_id == member_id
    }
}

/// Derives every creditor/debtor pair from the snapshot.
///
/// Rows come out ordered by creditor id, then debtor id. Nothing is written;
/// cached member balances are neither read nor updated.
///
/// # Errors
///
/// [`LedgerError::Inconsistent`] if a pair's accumulated amount overflows.
pub fn calculate_trip_balances(snapshot: &LedgerSnapshot) -> Result<Vec<PairwiseDebt>, LedgerError> {
    let mut debts: BTreeMap<MemberId, BTreeMap<MemberId, Decimal>> = BTreeMap::new();
    for entry in &snapshot.entries {
        let creditor = entry.paid_by;
        for split in entry.splits.iter().filter(|s| s.member_id != creditor) {
            let owed = debts
                .entry(creditor)
                .or_default()
                .entry(split.member_id)
                .or_insert(Decimal::ZERO);
            *owed = add_money(*owed, split.amount)?;
        }
    }

    let mut payments: HashMap<(MemberId, MemberId), Decimal> = HashMap::new();
    for payment in &snapshot.payments {
        let paid = payments
            .entry((payment.to_member, payment.from_member))
            .or_insert(Decimal::ZERO);
        *paid = add_money(*paid, payment.amount)?;
    }

    let mut rows = Vec::new();
    for (creditor, debtors) in debts {
        for (debtor, total_amount) in debtors {
            let paid_amount = payments
                .get(&(creditor, debtor))
                .copied()
                .unwrap_or(Decimal::ZERO);
            let remaining = total_amount - paid_amount;

            let (remaining_amount, status) = if remaining <= TOLERANCE {
                (Decimal::ZERO, DebtStatus::Paid)
            } else {
                (remaining, DebtStatus::Unpaid)
            };

            rows.push(PairwiseDebt {
                from_member_id: debtor,
                to_member_id: creditor,
                total_amount,
                paid_amount,
                remaining_amount,
                status,
            });
        }
    }

    tracing::debug!(pairs = rows.len(), "built debt matrix");
    Ok(rows)
}
