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

//! Property-based tests for the balance engine.
//!
//! These tests verify invariants that should hold for any ledger of
//! well-formed expenses and settlements.

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use trip_ledger::{
    DebtStatus, Engine, LedgerSnapshot, MemberId, MemberRole, NewMember, NewSettlement,
    NewTransaction, NewTrip, SplitType, TOLERANCE, TransactionSplit, UserId,
    calculate_trip_balances, net_balances, suggest_settlements,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Expense: payer index, total in cents, split weight per member.
type ArbExpense = (usize, i64, Vec<u8>);

/// Settlement: from index, to index, amount in cents.
type ArbPayment = (usize, usize, i64);

/// Generate a positive amount in cents (0.01 to 10000.00).
fn arb_cents() -> impl Strategy<Value = i64> {
    1i64..=1_000_000i64
}

fn arb_expense(members: usize) -> impl Strategy<Value = ArbExpense> {
    (0..members, arb_cents(), prop::collection::vec(0u8..4, members))
}

fn arb_payment(members: usize) -> impl Strategy<Value = ArbPayment> {
    (0..members, 0..members, arb_cents()).prop_filter("distinct members", |(f, t, _)| f != t)
}

/// Generate a trip ledger with 2-6 members.
fn arb_ledger() -> impl Strategy<Value = (usize, Vec<ArbExpense>, Vec<ArbPayment>)> {
    (2usize..=6).prop_flat_map(|members| {
        (
            Just(members),
            prop::collection::vec(arb_expense(members), 0..12),
            prop::collection::vec(arb_payment(members), 0..6),
        )
    })
}

fn member(index: usize) -> MemberId {
    MemberId(index as u32 + 1)
}

/// Splits `cents` by weight; the last weighted member absorbs the remainder.
/// With no weight at all the payer carries the whole expense.
fn weighted_splits(payer: usize, cents: i64, weights: &[u8]) -> Vec<TransactionSplit> {
    let total_weight: i64 = weights.iter().map(|w| i64::from(*w)).sum();
    if total_weight == 0 {
        return vec![TransactionSplit::new(member(payer), Decimal::new(cents, 2))];
    }

    let weighted: Vec<(usize, i64)> = weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .map(|(i, w)| (i, i64::from(*w)))
        .collect();
    let mut assigned = 0;
    weighted
        .iter()
        .enumerate()
        .map(|(k, (i, w))| {
            let share = if k + 1 == weighted.len() {
                cents - assigned
            } else {
                cents * w / total_weight
            };
            assigned += share;
            TransactionSplit::new(member(*i), Decimal::new(share, 2))
        })
        .collect()
}

fn build_snapshot(
    members: usize,
    expenses: &[ArbExpense],
    payments: &[ArbPayment],
) -> LedgerSnapshot {
    let mut snapshot = LedgerSnapshot::new((0..members).map(member).collect());
    for (payer, cents, weights) in expenses {
        snapshot.push_expense(
            member(*payer),
            Decimal::new(*cents, 2),
            weighted_splits(*payer, *cents, weights),
        );
    }
    for (from, to, cents) in payments {
        snapshot.push_payment(member(*from), member(*to), Decimal::new(*cents, 2));
    }
    snapshot
}

// =============================================================================
// Net Balance Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Net balances of any ledger sum to zero.
    #[test]
    fn net_balances_are_zero_sum(
        (members, expenses, payments) in arb_ledger(),
    ) {
        let snapshot = build_snapshot(members, &expenses, &payments);
        let balances = net_balances(&snapshot).unwrap();

        prop_assert_eq!(balances.len(), members);
        prop_assert_eq!(balances.total().unwrap(), Decimal::ZERO);
    }

    /// Replaying the same ledger twice yields identical balances.
    #[test]
    fn net_balances_are_deterministic(
        (members, expenses, payments) in arb_ledger(),
    ) {
        let snapshot = build_snapshot(members, &expenses, &payments);
        prop_assert_eq!(net_balances(&snapshot).unwrap(), net_balances(&snapshot).unwrap());
    }

    /// Without settlements, a member's net balance equals what others owe
    /// them minus what they owe others.
    #[test]
    fn debt_matrix_agrees_with_net_balances(
        (members, expenses, _) in arb_ledger(),
    ) {
        let snapshot = build_snapshot(members, &expenses, &[]);
        let balances = net_balances(&snapshot).unwrap();
        let debts = calculate_trip_balances(&snapshot).unwrap();

        for (member_id, balance) in balances.iter() {
            let owed: Decimal = debts
                .iter()
                .filter(|d| d.to_member_id == member_id)
                .map(|d| d.total_amount)
                .sum();
            let owes: Decimal = debts
                .iter()
                .filter(|d| d.from_member_id == member_id)
                .map(|d| d.total_amount)
                .sum();
            prop_assert_eq!(owed - owes, balance);
        }
    }
}

// =============================================================================
// Debt Matrix Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Status, paid and remaining amounts always agree with each other.
    #[test]
    fn paid_status_matches_remaining(
        (members, expenses, payments) in arb_ledger(),
    ) {
        let snapshot = build_snapshot(members, &expenses, &payments);

        for debt in calculate_trip_balances(&snapshot).unwrap() {
            prop_assert_ne!(debt.from_member_id, debt.to_member_id);
            prop_assert!(debt.total_amount >= Decimal::ZERO);

            let outstanding = debt.total_amount - debt.paid_amount;
            if outstanding <= TOLERANCE {
                prop_assert_eq!(debt.status, DebtStatus::Paid);
                prop_assert_eq!(debt.remaining_amount, Decimal::ZERO);
            } else {
                prop_assert_eq!(debt.status, DebtStatus::Unpaid);
                prop_assert_eq!(debt.remaining_amount, outstanding);
            }
        }
    }

    /// An expense split only to its payer creates no debt.
    #[test]
    fn self_share_creates_no_debt(
        members in 2usize..=6,
        payer_seed in any::<usize>(),
        cents in arb_cents(),
    ) {
        let payer = payer_seed % members;
        let mut snapshot = LedgerSnapshot::new((0..members).map(member).collect());
        snapshot.push_expense(
            member(payer),
            Decimal::new(cents, 2),
            vec![TransactionSplit::new(member(payer), Decimal::new(cents, 2))],
        );

        prop_assert!(calculate_trip_balances(&snapshot).unwrap().is_empty());
        prop_assert!(net_balances(&snapshot).unwrap().iter().all(|(_, b)| b.is_zero()));
    }

    /// Rows are unique per (debtor, creditor) pair and sorted by creditor, then debtor.
    #[test]
    fn rows_are_unique_and_ordered(
        (members, expenses, payments) in arb_ledger(),
    ) {
        let snapshot = build_snapshot(members, &expenses, &payments);
        let keys: Vec<(MemberId, MemberId)> = calculate_trip_balances(&snapshot)
            .unwrap()
            .iter()
            .map(|d| (d.to_member_id, d.from_member_id))
            .collect();

        prop_assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }
}

// =============================================================================
// Settlement Suggestion Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Applying every suggested transfer settles all members.
    #[test]
    fn suggestions_settle_everyone(
        (members, expenses, payments) in arb_ledger(),
    ) {
        let snapshot = build_snapshot(members, &expenses, &payments);
        let balances = net_balances(&snapshot).unwrap();
        let transfers = suggest_settlements(balances.iter());

        let mut remaining: Vec<(MemberId, Decimal)> = balances.iter().collect();
        for transfer in &transfers {
            prop_assert_ne!(transfer.from_member_id, transfer.to_member_id);
            prop_assert!(transfer.amount > TOLERANCE);
            for (member_id, balance) in remaining.iter_mut() {
                if *member_id == transfer.from_member_id {
                    *balance += transfer.amount;
                } else if *member_id == transfer.to_member_id {
                    *balance -= transfer.amount;
                }
            }
        }

        // Positions within one cent are never matched, so their cents can
        // pile up on whichever side finishes last.
        let slack = TOLERANCE * Decimal::from(members);
        for (member_id, balance) in remaining {
            prop_assert!(balance.abs() <= slack, "member {} left with {}", member_id, balance);
        }
    }

    /// At most one fewer transfer than there are unsettled members.
    #[test]
    fn suggestion_count_is_bounded(
        (members, expenses, payments) in arb_ledger(),
    ) {
        let snapshot = build_snapshot(members, &expenses, &payments);
        let balances = net_balances(&snapshot).unwrap();
        let unsettled = balances.iter().filter(|(_, b)| b.abs() > TOLERANCE).count();

        let transfers = suggest_settlements(balances.iter());
        prop_assert!(transfers.len() <= unsettled.saturating_sub(1));
    }
}

// =============================================================================
// Engine Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Cached balances after each mutation match a fresh replay, and
    /// recalculating again changes nothing.
    #[test]
    fn engine_cached_balances_match_replay(
        (members, expenses, payments) in arb_ledger(),
    ) {
        let owner = UserId(1);
        let engine = Engine::new();
        let trip = engine
            .create_trip(owner, NewTrip { name: "Prop".into(), ..Default::default() })
            .unwrap()
            .id;
        for i in 1..members {
            engine
                .add_member(
                    owner,
                    trip,
                    NewMember::Guest {
                        name: format!("Guest {i}"),
                        contact: None,
                        role: MemberRole::Member,
                    },
                )
                .unwrap();
        }
        let ids: Vec<MemberId> = engine.members(owner, trip).unwrap().iter().map(|m| m.id).collect();

        for (payer, cents, weights) in &expenses {
            let splits = weighted_splits(*payer, *cents, weights)
                .into_iter()
                .map(|s| TransactionSplit::new(ids[s.member_id.0 as usize - 1], s.amount))
                .collect();
            engine
                .create_transaction(
                    owner,
                    trip,
                    NewTransaction {
                        title: "Expense".into(),
                        description: None,
                        date: Utc::now(),
                        total_amount: Decimal::new(*cents, 2),
                        paid_by: ids[*payer],
                        split_type: SplitType::Shares,
                        splits,
                        meta: None,
                    },
                )
                .unwrap();
        }
        for (from, to, cents) in &payments {
            engine
                .create_settlement(
                    owner,
                    trip,
                    NewSettlement {
                        from_member: ids[*from],
                        to_member: ids[*to],
                        amount: Decimal::new(*cents, 2),
                    },
                )
                .unwrap();
        }

        let net = engine.net_balances(trip).unwrap();
        let cached = engine.members(owner, trip).unwrap();
        for m in &cached {
            prop_assert_eq!(Some(m.balance), net.get(m.id));
        }

        engine.recalculate_balances(trip).unwrap();
        prop_assert_eq!(engine.members(owner, trip).unwrap(), cached);
    }
}
