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

//! Core identifier types and the shared money tolerance.

use crate::LedgerError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amounts within this distance of zero are treated as settled.
///
/// Applied to pairwise remaining debt, net balances, and split sums alike.
pub const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Fractional digits kept for persisted amounts.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a single total, split, or settlement may carry
/// (999 999 999 999.99).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

/// Checks that `amount` is a storable money value: non-negative, no more
/// than [`MONEY_SCALE`] fractional digits, and at most [`MAX_AMOUNT`].
///
/// Trailing zeros do not count, so `10.500` is accepted as `10.50`.
///
/// # Errors
///
/// [`LedgerError::InvalidAmount`] carrying the rejected value.
pub fn check_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount < Decimal::ZERO
        || amount > MAX_AMOUNT
        || amount.normalize().scale() > MONEY_SCALE
    {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(amount)
}

/// Adds two amounts, reporting overflow as an inconsistent ledger.
pub(crate) fn add_money(lhs: Decimal, rhs: Decimal) -> Result<Decimal, LedgerError> {
    lhs.checked_add(rhs).ok_or_else(|| {
        LedgerError::Inconsistent(format!("amount overflow adding {rhs} to {lhs}"))
    })
}

/// Returns `true` when `amount` is within [`TOLERANCE`] of zero.
pub fn is_settled(amount: Decimal) -> bool {
    amount.abs() <= TOLERANCE
}

/// Rounds to [`MONEY_SCALE`] digits, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique identifier for a trip.
    TripId
);

id_type!(
    /// Unique identifier for a trip member.
    ///
    /// Member rows are never shared across trips, so the same person has a
    /// different `MemberId` in every trip they join.
    MemberId
);

id_type!(
    /// Unique identifier for a recorded expense.
    TransactionId
);

id_type!(
    /// Unique identifier for a settlement payment.
    SettlementId
);

id_type!(
    /// Unique identifier for a registered account holder.
    ///
    /// Issued by the authentication service; the engine only compares them.
    UserId
);
