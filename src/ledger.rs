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

//! Ledger reading.
//!
//! [`LedgerStore`] is the seam between the balance engine and whatever
//! persists trips. [`read_snapshot`] pulls one trip's expenses and confirmed
//! settlements out of a store into a [`LedgerSnapshot`], which the balance,
//! debt-matrix and simplifier passes consume without touching storage again.

use crate::LedgerError;
use crate::base::{MemberId, TripId};
use crate::settlement::Settlement;
use crate::transaction::{Transaction, TransactionSplit};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Storage operations the engine needs, scoped to one trip.
///
/// Calls made while an atomic unit is open observe that unit's own writes.
pub trait LedgerStore {
    /// Member ids of the trip, in listing order.
    fn member_ids(&self, trip_id: TripId) -> Result<Vec<MemberId>, LedgerError>;

    /// Every transaction of the trip, each with its full split set.
    fn transactions(&self, trip_id: TripId) -> Result<Vec<Transaction>, LedgerError>;

    /// Every settlement of the trip, regardless of status.
    fn settlements(&self, trip_id: TripId) -> Result<Vec<Settlement>, LedgerError>;

    /// Overwrites the cached balance of one member.
    fn set_member_balance(
        &mut self,
        member_id: MemberId,
        balance: Decimal,
    ) -> Result<(), LedgerError>;
}

/// One expense as the balance passes see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub paid_by: MemberId,
    pub total_amount: Decimal,
    pub splits: Vec<TransactionSplit>,
}

/// One confirmed settlement as the balance passes see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub from_member: MemberId,
    pub to_member: MemberId,
    pub amount: Decimal,
}

/// Consistent view of a trip's ledger at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub members: Vec<MemberId>,
    pub entries: Vec<LedgerEntry>,
    pub payments: Vec<Payment>,
}

impl LedgerSnapshot {
    pub fn new(members: Vec<MemberId>) -> Self {
        Self {
            members,
            ..Self::default()
        }
    }

    pub fn push_expense(
        &mut self,
        paid_by: MemberId,
        total_amount: Decimal,
        splits: Vec<TransactionSplit>,
    ) -> &mut Self {
        self.entries.push(LedgerEntry {
            paid_by,
            total_amount,
            splits,
        });
        self
    }

    pub fn push_payment(
        &mut self,
        from_member: MemberId,
        to_member: MemberId,
        amount: Decimal,
    ) -> &mut Self {
        self.payments.push(Payment {
            from_member,
            to_member,
            amount,
        });
        self
    }
}

/// Loads the trip's ledger from `store`.
///
/// Pending settlements are dropped here, so every downstream pass treats
/// them as if they did not exist.
pub fn read_snapshot<S>(store: &S, trip_id: TripId) -> Result<LedgerSnapshot, LedgerError>
where
    S: LedgerStore + ?Sized,
{
    let members = store.member_ids(trip_id)?;
    let entries = store
        .transactions(trip_id)?
        .into_iter()
        .map(|tx| LedgerEntry {
            paid_by: tx.paid_by,
            total_amount: tx.total_amount,
            splits: tx.splits,
        })
        .collect();
    let payments = store
        .settlements(trip_id)?
        .into_iter()
        .filter(Settlement::is_confirmed)
        .map(|s| Payment {
            from_member: s.from_member,
            to_member: s.to_member,
            amount: s.amount,
        })
        .collect();

    Ok(LedgerSnapshot {
        members,
        entries,
        payments,
    })
}
