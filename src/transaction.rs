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

//! Expenses and their split allocations.
//!
//! A [`Transaction`] records who fronted the money and owns the list of
//! [`TransactionSplit`]s saying how much of it each member consumed. The
//! split set is validated as a whole before it is ever written:
//!
//! - at least one split, no member listed twice;
//! - every amount a valid money value (non-negative, whole cents, bounded),
//!   every member part of the trip;
//! - amounts add up to the total within [`TOLERANCE`].

use crate::LedgerError;
use crate::base::{MemberId, TOLERANCE, TransactionId, TripId, add_money, check_amount};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SplitType {
    #[default]
    Equal,
    Shares,
    Itemized,
    Adjustment,
    ItemizedAi,
}

/// One member's share of one transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionSplit {
    pub member_id: MemberId,
    pub amount: Decimal,
}

impl TransactionSplit {
    pub fn new(member_id: MemberId, amount: Decimal) -> Self {
        Self { member_id, amount }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub trip_id: TripId,
    pub created_by: MemberId,
    pub paid_by: MemberId,
    pub title: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub split_type: SplitType,
    /// Opaque client data; `draft_id` inside it is an idempotency key.
    pub meta: Option<serde_json::Value>,
    pub splits: Vec<TransactionSplit>,
}

impl Transaction {
    pub fn draft_id(&self) -> Option<String> {
        self.meta.as_ref().and_then(draft_id)
    }

    /// Whether `member` created, paid, or holds a split of this transaction.
    pub fn involves(&self, member: MemberId) -> bool {
        self.paid_by == member
            || self.created_by == member
            || self.splits.iter().any(|s| s.member_id == member)
    }
}

/// Input for recording a new expense.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub paid_by: MemberId,
    #[serde(default)]
    pub split_type: SplitType,
    pub splits: Vec<TransactionSplit>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

impl NewTransaction {
    pub fn draft_id(&self) -> Option<String> {
        self.meta.as_ref().and_then(draft_id)
    }
}

/// Field patch for an existing expense.
///
/// `splits`, when present, replaces the whole split set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub paid_by: Option<MemberId>,
    pub split_type: Option<SplitType>,
    pub splits: Option<Vec<TransactionSplit>>,
}

impl TransactionPatch {
    /// Applies the patch to a copy of `current`.
    pub(crate) fn merged(&self, current: &Transaction) -> Transaction {
        Transaction {
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            description: self.description.clone().or_else(|| current.description.clone()),
            date: self.date.unwrap_or(current.date),
            total_amount: self.total_amount.unwrap_or(current.total_amount),
            paid_by: self.paid_by.unwrap_or(current.paid_by),
            split_type: self.split_type.unwrap_or(current.split_type),
            splits: self.splits.clone().unwrap_or_else(|| current.splits.clone()),
            ..current.clone()
        }
    }
}

fn draft_id(meta: &serde_json::Value) -> Option<String> {
    match meta.get("draft_id")? {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Checks a complete split set against its transaction total.
///
/// `in_trip` answers whether a member id belongs to the transaction's trip.
pub(crate) fn validate_splits(
    total_amount: Decimal,
    paid_by: MemberId,
    splits: &[TransactionSplit],
    in_trip: impl Fn(MemberId) -> bool,
) -> Result<(), LedgerError> {
    check_amount(total_amount)?;
    if !in_trip(paid_by) {
        return Err(LedgerError::MemberNotInTrip(paid_by));
    }
    if splits.is_empty() {
        return Err(LedgerError::EmptySplits);
    }

    let mut seen = HashSet::with_capacity(splits.len());
    for split in splits {
        check_amount(split.amount)?;
        if !in_trip(split.member_id) {
            return Err(LedgerError::MemberNotInTrip(split.member_id));
        }
        if !seen.insert(split.member_id) {
            return Err(LedgerError::DuplicateSplitMember(split.member_id));
        }
    }

    let actual = splits
        .iter()
        .try_fold(Decimal::ZERO, |sum, s| add_money(sum, s.amount))?;
    if (actual - total_amount).abs() > TOLERANCE {
        return Err(LedgerError::SplitSumMismatch {
            expected: total_amount,
            actual,
        });
    }
    Ok(())
}
