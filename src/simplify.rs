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

//! Settlement suggestions by greedy netting.
//!
//! Only net positions matter: members owing money are matched against
//! members owed money in listing order, each step moving the smaller of the
//! two outstanding amounts. Every step retires at least one side, so `n`
//! unsettled members need at most `n - 1` transfers.

use crate::base::{MemberId, TOLERANCE, round_money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A transfer that would move `amount` from a debtor to a creditor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestedTransfer {
    pub from_member_id: MemberId,
    pub to_member_id: MemberId,
    pub amount: Decimal,
}

#[derive(Debug)]
struct Position {
    member_id: MemberId,
    outstanding: Decimal,
}

/// Suggests transfers that bring every balance to within [`TOLERANCE`] of zero.
///
/// Positive balances are owed money, negative ones owe. Members already
/// within tolerance are ignored. Ties are broken by input order only, so the
/// same input always yields the same transfers.
pub fn suggest_settlements<I>(balances: I) -> Vec<SuggestedTransfer>
where
    I: IntoIterator<Item = (MemberId, Decimal)>,
{
    let mut debtors = Vec::new();
    let mut creditors = Vec::new();
    for (member_id, balance) in balances {
        if balance < -TOLERANCE {
            debtors.push(Position {
                member_id,
                outstanding: -balance,
            });
        } else if balance > TOLERANCE {
            creditors.push(Position {
                member_id,
                outstanding: balance,
            });
        }
    }

    let mut transfers = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < debtors.len() && j < creditors.len() {
        let debtor = &mut debtors[i];
        let creditor = &mut creditors[j];

        let pay = debtor.outstanding.min(creditor.outstanding);
        if pay > TOLERANCE {
            transfers.push(SuggestedTransfer {
                from_member_id: debtor.member_id,
                to_member_id: creditor.member_id,
                amount: round_money(pay),
            });
            debtor.outstanding -= pay;
            creditor.outstanding -= pay;
        }

        if debtor.outstanding <= TOLERANCE {
            i += 1;
        }
        if creditor.outstanding <= TOLERANCE {
            j += 1;
        }
    }

    tracing::debug!(
        debtors = debtors.len(),
        creditors = creditors.len(),
        transfers = transfers.len(),
        "suggested settlements"
    );
    transfers
}
