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

//! Read models built on top of the debt matrix.
//!
//! - [`MemberDebt`]: the pairwise rows touching one member, labelled from
//!   that member's point of view.
//! - [`TripSummary`]: per-member outstanding totals plus the full list of
//!   pairwise rows, also served publicly through a share token.

use crate::base::{MemberId, TripId, UserId, add_money};
use crate::debt_matrix::{self, DebtStatus, PairwiseDebt};
use crate::ledger::read_snapshot;
use crate::trip::{Trip, TripMember};
use crate::{Engine, LedgerError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Members whose outstanding total is below this are left out of the overview.
const OVERVIEW_MIN_AMOUNT: Decimal = Decimal::ONE;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebtDirection {
    /// The counterparty owes the viewing member.
    OwesYou,
    /// The viewing member owes the counterparty.
    YouOwe,
}

/// One pairwise row seen from a member's side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberDebt {
    pub member_id: MemberId,
    pub name: String,
    pub direction: DebtDirection,
    /// Remaining amount.
    pub amount: Decimal,
    pub total_amount: Decimal,
    pub status: DebtStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceOverview {
    pub member_id: MemberId,
    pub name: String,
    pub user_id: Option<UserId>,
    /// Outstanding net: positive is owed to the member, negative is owed by them.
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementPlanRow {
    pub from_member_id: MemberId,
    pub from_name: String,
    pub to_member_id: MemberId,
    pub to_name: String,
    /// Remaining amount.
    pub amount: Decimal,
    pub total_amount: Decimal,
    pub status: DebtStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripSummary {
    pub trip_id: TripId,
    pub trip_name: String,
    pub currency_code: String,
    pub overview: Vec<BalanceOverview>,
    pub settlements: Vec<SettlementPlanRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareLink {
    pub url: String,
    pub token: String,
}

fn name_of(names: &HashMap<MemberId, String>, member_id: MemberId) -> String {
    names
        .get(&member_id)
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Rows touching `viewer`, paid ones included.
pub fn member_debts(
    viewer: MemberId,
    debts: &[PairwiseDebt],
    members: &[TripMember],
) -> Vec<MemberDebt> {
    let names: HashMap<MemberId, String> =
        members.iter().map(|m| (m.id, m.display_name())).collect();

    debts
        .iter()
        .filter_map(|debt| {
            let (counterparty, direction) = if debt.to_member_id == viewer {
                (debt.from_member_id, DebtDirection::OwesYou)
            } else if debt.from_member_id == viewer {
                (debt.to_member_id, DebtDirection::YouOwe)
            } else {
                return None;
            };
            Some(MemberDebt {
                member_id: counterparty,
                name: name_of(&names, counterparty),
                direction,
                amount: debt.remaining_amount,
                total_amount: debt.total_amount,
                status: debt.status,
            })
        })
        .collect()
}

/// Overview of outstanding amounts plus every pairwise row.
///
/// # Errors
///
/// [`LedgerError::Inconsistent`] if a member's outstanding total overflows.
pub fn summarize(
    trip: &Trip,
    debts: &[PairwiseDebt],
    members: &[TripMember],
) -> Result<TripSummary, LedgerError> {
    let names: HashMap<MemberId, String> =
        members.iter().map(|m| (m.id, m.display_name())).collect();

    let mut outstanding: HashMap<MemberId, Decimal> = HashMap::new();
    for debt in debts {
        let debtor = outstanding.entry(debt.from_member_id).or_default();
        *debtor = add_money(*debtor, -debt.remaining_amount)?;
        let creditor = outstanding.entry(debt.to_member_id).or_default();
        *creditor = add_money(*creditor, debt.remaining_amount)?;
    }

    let overview = members
        .iter()
        .filter_map(|member| {
            let amount = outstanding.get(&member.id).copied().unwrap_or_default();
            (amount.abs() >= OVERVIEW_MIN_AMOUNT).then(|| BalanceOverview {
                member_id: member.id,
                name: member.display_name(),
                user_id: member.user_id(),
                amount,
            })
        })
        .collect();

    let settlements = debts
        .iter()
        .map(|debt| SettlementPlanRow {
            from_member_id: debt.from_member_id,
            from_name: name_of(&names, debt.from_member_id),
            to_member_id: debt.to_member_id,
            to_name: name_of(&names, debt.to_member_id),
            amount: debt.remaining_amount,
            total_amount: debt.total_amount,
            status: debt.status,
        })
        .collect();

    Ok(TripSummary {
        trip_id: trip.id,
        trip_name: trip.name.clone(),
        currency_code: trip.currency_code.clone(),
        overview,
        settlements,
    })
}

impl Engine {
    /// Pairwise rows involving the caller, as "owes you" / "you owe".
    pub fn member_debts(
        &self,
        caller: UserId,
        trip_id: TripId,
    ) -> Result<Vec<MemberDebt>, LedgerError> {
        let (viewer, members, snapshot) = self.book(trip_id)?.read(|data| {
            let viewer = data.require_member(caller)?.id;
            let snapshot = read_snapshot(data, data.trip.id)?;
            Ok::<_, LedgerError>((viewer, data.members.clone(), snapshot))
        })?;
        let debts = debt_matrix::calculate_trip_balances(&snapshot)?;
        Ok(member_debts(viewer, &debts, &members))
    }

    /// Summary of who carries outstanding debt and the pairwise plan.
    pub fn trip_summary(&self, trip_id: TripId) -> Result<TripSummary, LedgerError> {
        let (trip, members, snapshot) = self.book(trip_id)?.read(|data| {
            let snapshot = read_snapshot(data, data.trip.id)?;
            Ok::<_, LedgerError>((data.trip.clone(), data.members.clone(), snapshot))
        })?;
        let debts = debt_matrix::calculate_trip_balances(&snapshot)?;
        summarize(&trip, &debts, &members)
    }

    /// Returns the public summary link, assigning a token on first use.
    pub fn share_trip(&self, caller: UserId, trip_id: TripId) -> Result<ShareLink, LedgerError> {
        let token = self.book(trip_id)?.update(|data| {
            data.require_member(caller)?;
            let token = data
                .trip
                .share_token
                .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string());
            Ok(token.clone())
        })?;
        self.share_tokens().insert(token.clone(), trip_id);

        Ok(ShareLink {
            url: format!("{}/public/trips/{}", self.config().share_base_url, token),
            token,
        })
    }

    /// Trip summary for anyone holding the share token.
    pub fn public_summary(&self, token: &str) -> Result<TripSummary, LedgerError> {
        let trip_id = *self
            .share_tokens()
            .get(token)
            .ok_or(LedgerError::ShareTokenNotFound)?;
        self.trip_summary(trip_id)
    }
}
