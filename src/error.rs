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

//! Error types for ledger operations.

use crate::base::{MemberId, TransactionId, TripId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Broad class of a [`LedgerError`], used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any write; nothing changed.
    Validation,
    /// Caller is not allowed to perform the operation.
    Authorization,
    /// A referenced trip, member, or transaction does not exist.
    NotFound,
    /// An atomic unit failed mid-way and was rolled back.
    Consistency,
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is negative, or below the minimum for settlements
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Transaction has no splits
    #[error("transaction must have at least one split")]
    EmptySplits,

    /// Split amounts do not add up to the transaction total
    #[error("total splits must equal total amount (expected {expected}, actual {actual})")]
    SplitSumMismatch { expected: Decimal, actual: Decimal },

    /// The same member appears twice in one split set
    #[error("member {0} appears more than once in splits")]
    DuplicateSplitMember(MemberId),

    /// Referenced member belongs to another trip
    #[error("member {0} does not belong to this trip")]
    MemberNotInTrip(MemberId),

    /// Settlement sender and receiver are the same member
    #[error("settlement sender and receiver must differ")]
    SelfSettlement,

    /// Currency code is not three ASCII letters
    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Required name or title is blank
    #[error("name must not be empty")]
    EmptyName,

    /// Member still referenced by ledger entries
    #[error("member {0} is referenced by transactions or settlements")]
    MemberReferenced(MemberId),

    /// Caller lacks the required membership or role
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("trip {0} not found")]
    TripNotFound(TripId),

    #[error("member {0} not found")]
    MemberNotFound(MemberId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("share token not found")]
    ShareTokenNotFound,

    /// Ledger state contradicts itself; the enclosing unit was rolled back
    #[error("inconsistent ledger: {0}")]
    Inconsistent(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::EmptySplits
            | Self::SplitSumMismatch { .. }
            | Self::DuplicateSplitMember(_)
            | Self::MemberNotInTrip(_)
            | Self::SelfSettlement
            | Self::InvalidCurrency(_)
            | Self::EmptyName
            | Self::MemberReferenced(_) => ErrorKind::Validation,
            Self::Forbidden(_) => ErrorKind::Authorization,
            Self::TripNotFound(_)
            | Self::MemberNotFound(_)
            | Self::TransactionNotFound(_)
            | Self::ShareTokenNotFound => ErrorKind::NotFound,
            Self::Inconsistent(_) => ErrorKind::Consistency,
        }
    }
}
