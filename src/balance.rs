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

//! Net balance aggregation.
//!
//! A member's net balance is everything they fronted minus everything they
//! consumed, adjusted by confirmed settlements:
//!
//! | Ledger item | Effect |
//! |-------------|--------|
//! | Transaction | payer `+= total_amount`, each split member `-= split.amount` |
//! | Settlement  | debtor (`from`) `+= amount`, creditor (`to`) `-= amount` |
//!
//! Positive means the member is owed money, negative means they owe.
//! Balances are always rebuilt from zero by replaying the whole ledger, never
//! patched incrementally, so recomputing twice cannot drift.

use crate::LedgerError;
use crate::base::{MemberId, TripId, add_money, round_money};
use crate::ledger::{LedgerSnapshot, LedgerStore, read_snapshot};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Net balance per member, in member listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NetBalances(Vec<(MemberId, Decimal)>);

impl NetBalances {
    pub fn get(&self, member_id: MemberId) -> Option<Decimal> {
        self.0
            .iter()
            .find(|(id, _)| *id == member_id)
            .map(|(_, balance)| *balance)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MemberId, Decimal)> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[(MemberId, Decimal)] {
        &self.0
    }

    /// Sum over all members; zero for any consistent ledger.
    pub fn total(&self) -> Result<Decimal, LedgerError> {
        self.0
            .iter()
            .try_fold(Decimal::ZERO, |sum, (_, balance)| add_money(sum, *balance))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(MemberId, Decimal)> for NetBalances {
    fn from_iter<I: IntoIterator<Item = (MemberId, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Folds a ledger snapshot into per-member net balances.
///
/// # Errors
///
/// Returns [`LedgerError::Inconsistent`] if an entry references a member the
/// snapshot does not list, or if a balance overflows.
pub fn net_balances(snapshot: &LedgerSnapshot) -> Result<NetBalances, LedgerError> {
    let index: HashMap<MemberId, usize> = snapshot
        .members
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();
    let mut balances: Vec<(MemberId, Decimal)> = snapshot
        .members
        .iter()
        .map(|id| (*id, Decimal::ZERO))
        .collect();

    let mut adjust = |member_id: MemberId, delta: Decimal| -> Result<(), LedgerError> {
        let slot = index.get(&member_id).ok_or_else(|| {
            LedgerError::Inconsistent(format!("ledger references unknown member {member_id}"))
        })?;
        let balance = &mut balances[*slot].1;
        *balance = add_money(*balance, delta)?;
        Ok(())
    };

    for entry in &snapshot.entries {
        adjust(entry.paid_by, entry.total_amount)?;
        for split in &entry.splits {
            adjust(split.member_id, -split.amount)?;
        }
    }

    for payment in &snapshot.payments {
        adjust(payment.from_member, payment.amount)?;
        adjust(payment.to_member, -payment.amount)?;
    }

    Ok(NetBalances(balances))
}

/// Rebuilds the cached balance of every member of `trip_id`.
///
/// Reads the ledger through `store`, computes fresh balances, then overwrites
/// each member's cached value with the 2-digit rounded result. Must run inside
/// the same atomic unit as the mutation that triggered it.
pub fn recalculate<S>(store: &mut S, trip_id: TripId) -> Result<(), LedgerError>
where
    S: LedgerStore + ?Sized,
{
    let snapshot = read_snapshot(store, trip_id)?;
    let balances = net_balances(&snapshot)?;

    for (member_id, balance) in balances.iter() {
        store.set_member_balance(member_id, round_money(balance))?;
    }

    tracing::debug!(
        trip = %trip_id,
        members = balances.len(),
        transactions = snapshot.entries.len(),
        settlements = snapshot.payments.len(),
        "recalculated member balances"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::TOLERANCE;
    use crate::transaction::TransactionSplit;
    use rust_decimal_macros::dec;

    const A: MemberId = MemberId(1);
    const B: MemberId = MemberId(2);
    const C: MemberId = MemberId(3);

    fn split(member: MemberId, amount: Decimal) -> TransactionSplit {
        TransactionSplit::new(member, amount)
    }

    fn three_member_trip() -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::new(vec![A, B, C]);
        snapshot
            .push_expense(
                A,
                dec!(300),
                vec![split(A, dec!(100)), split(B, dec!(100)), split(C, dec!(100))],
            )
            .push_expense(B, dec!(90), vec![split(B, dec!(30)), split(C, dec!(60))])
            .push_payment(B, A, dec!(50));
        snapshot
    }

    #[test]
    fn empty_ledger_is_all_zero() {
        let balances = net_balances(&LedgerSnapshot::new(vec![A, B])).unwrap();
        assert_eq!(balances.as_slice(), &[(A, Decimal::ZERO), (B, Decimal::ZERO)]);
    }

    #[test]
    fn payer_is_credited_total_minus_own_share() {
        let mut snapshot = LedgerSnapshot::new(vec![A, B]);
        snapshot.push_expense(A, dec!(100), vec![split(A, dec!(50)), split(B, dec!(50))]);

        let balances = net_balances(&snapshot).unwrap();
        assert_eq!(balances.get(A), Some(dec!(50)));
        assert_eq!(balances.get(B), Some(dec!(-50)));
    }

    #[test]
    fn settlement_moves_debtor_toward_zero() {
        let mut snapshot = LedgerSnapshot::new(vec![A, B]);
        snapshot
            .push_expense(A, dec!(100), vec![split(B, dec!(100))])
            .push_payment(B, A, dec!(40));

        let balances = net_balances(&snapshot).unwrap();
        assert_eq!(balances.get(A), Some(dec!(60)));
        assert_eq!(balances.get(B), Some(dec!(-60)));
    }

    #[test]
    fn three_member_scenario_is_zero_sum() {
        let balances = net_balances(&three_member_trip()).unwrap();

        // A: +300 -100 -50, B: -100 +90 -30 +50, C: -100 -60
        assert_eq!(balances.get(A), Some(dec!(150)));
        assert_eq!(balances.get(B), Some(dec!(10)));
        assert_eq!(balances.get(C), Some(dec!(-160)));
        assert!(balances.total().unwrap().abs() <= TOLERANCE);
    }

    #[test]
    fn preserves_member_order() {
        let mut snapshot = three_member_trip();
        snapshot.members = vec![C, A, B];
        let order: Vec<MemberId> = net_balances(&snapshot)
            .unwrap()
            .iter()
            .map(|(member, _)| member)
            .collect();
        assert_eq!(order, vec![C, A, B]);
    }

    #[test]
    fn overflow_is_inconsistent() {
        let mut snapshot = LedgerSnapshot::new(vec![A, B]);
        snapshot
            .push_expense(A, Decimal::MAX, vec![split(B, Decimal::MAX)])
            .push_expense(A, Decimal::MAX, vec![split(B, Decimal::MAX)]);
        assert!(matches!(
            net_balances(&snapshot),
            Err(LedgerError::Inconsistent(_))
        ));
    }

    #[test]
    fn unknown_member_is_inconsistent() {
        let mut snapshot = LedgerSnapshot::new(vec![A]);
        snapshot.push_expense(A, dec!(10), vec![split(MemberId(99), dec!(10))]);
        assert_eq!(
            net_balances(&snapshot),
            Err(LedgerError::Inconsistent(
                "ledger references unknown member 99".into()
            ))
        );
    }
}
