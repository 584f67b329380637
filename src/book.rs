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

//! Per-trip ledger storage with atomic units of work.
//!
//! Each trip lives in its own [`TripBook`], whose mutex is the per-trip lock:
//! every write to a trip is serialized on it, while different trips proceed
//! in parallel.
//!
//! A write never touches committed state directly. It is validated against
//! the committed data, applied to a staged copy, and the copy replaces the
//! committed data only if every step succeeded:
//!
//! ```text
//!  lock ──► validate(committed) ──► clone ──► apply(staged) ──► recalculate(staged) ──► swap
//!              │                                  │                   │
//!              └── Err: nothing staged            └───── Err: staged copy dropped ─────┘
//! ```

use crate::LedgerError;
use crate::balance;
use crate::base::{MemberId, TransactionId, TripId, UserId};
use crate::ledger::{LedgerSnapshot, LedgerStore, read_snapshot};
use crate::settlement::Settlement;
use crate::transaction::Transaction;
use crate::trip::{Trip, TripMember};
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// Everything owned by one trip.
#[derive(Debug, Clone)]
pub(crate) struct TripData {
    pub(crate) trip: Trip,
    pub(crate) members: Vec<TripMember>,
    pub(crate) transactions: Vec<Transaction>,
    pub(crate) settlements: Vec<Settlement>,
}

impl TripData {
    pub(crate) fn new(trip: Trip) -> Self {
        Self {
            trip,
            members: Vec::new(),
            transactions: Vec::new(),
            settlements: Vec::new(),
        }
    }

    pub(crate) fn member(&self, member_id: MemberId) -> Option<&TripMember> {
        self.members.iter().find(|m| m.id == member_id)
    }

    pub(crate) fn has_member(&self, member_id: MemberId) -> bool {
        self.member(member_id).is_some()
    }

    pub(crate) fn member_for_user(&self, user_id: UserId) -> Option<&TripMember> {
        self.members.iter().find(|m| m.user_id() == Some(user_id))
    }

    /// The caller's member row, or `Forbidden` if they are not in the trip.
    pub(crate) fn require_member(&self, user_id: UserId) -> Result<&TripMember, LedgerError> {
        self.member_for_user(user_id)
            .ok_or(LedgerError::Forbidden("not a member of this trip"))
    }

    pub(crate) fn require_admin(&self, user_id: UserId) -> Result<&TripMember, LedgerError> {
        let member = self.require_member(user_id)?;
        if !member.is_admin() {
            return Err(LedgerError::Forbidden("admin role required"));
        }
        Ok(member)
    }

    pub(crate) fn transaction(&self, id: TransactionId) -> Result<&Transaction, LedgerError> {
        self.transactions
            .iter()
            .find(|tx| tx.id == id)
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    pub(crate) fn transaction_mut(
        &mut self,
        id: TransactionId,
    ) -> Result<&mut Transaction, LedgerError> {
        self.transactions
            .iter_mut()
            .find(|tx| tx.id == id)
            .ok_or(LedgerError::TransactionNotFound(id))
    }

    /// Whether any transaction or settlement points at `member_id`.
    pub(crate) fn is_referenced(&self, member_id: MemberId) -> bool {
        self.transactions.iter().any(|tx| tx.involves(member_id))
            || self.settlements.iter().any(|s| {
                s.from_member == member_id || s.to_member == member_id || s.created_by == member_id
            })
    }

    fn check_trip(&self, trip_id: TripId) -> Result<(), LedgerError> {
        if trip_id != self.trip.id {
            return Err(LedgerError::TripNotFound(trip_id));
        }
        Ok(())
    }
}

impl LedgerStore for TripData {
    fn member_ids(&self, trip_id: TripId) -> Result<Vec<MemberId>, LedgerError> {
        self.check_trip(trip_id)?;
        Ok(self.members.iter().map(|m| m.id).collect())
    }

    fn transactions(&self, trip_id: TripId) -> Result<Vec<Transaction>, LedgerError> {
        self.check_trip(trip_id)?;
        Ok(self.transactions.clone())
    }

    fn settlements(&self, trip_id: TripId) -> Result<Vec<Settlement>, LedgerError> {
        self.check_trip(trip_id)?;
        Ok(self.settlements.clone())
    }

    fn set_member_balance(
        &mut self,
        member_id: MemberId,
        balance: Decimal,
    ) -> Result<(), LedgerError> {
        let member = self
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or(LedgerError::MemberNotFound(member_id))?;
        member.balance = balance;
        Ok(())
    }
}

/// Result of validating a write: either go ahead, or answer without writing.
pub(crate) enum Plan<V, T> {
    Apply(V),
    Skip(T),
}

/// A trip guarded by its own lock.
#[derive(Debug)]
pub(crate) struct TripBook {
    inner: Mutex<TripData>,
}

impl TripBook {
    pub(crate) fn new(data: TripData) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    /// Runs `f` against committed state.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&TripData) -> T) -> T {
        f(&*self.inner.lock())
    }

    /// Consistent ledger snapshot of committed state.
    pub(crate) fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        let data = self.inner.lock();
        read_snapshot(&*data, data.trip.id)
    }

    /// Applies a non-ledger write (trip fields, membership) atomically.
    pub(crate) fn update<T>(
        &self,
        f: impl FnOnce(&mut TripData) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut data = self.inner.lock();
        let mut staged = data.clone();
        match f(&mut staged) {
            Ok(value) => {
                *data = staged;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(trip = %data.trip.id, error = %err, "rolled back trip update");
                Err(err)
            }
        }
    }

    /// Validates, applies, and recalculates balances as one unit.
    ///
    /// `validate` sees committed state and may answer directly with
    /// [`Plan::Skip`]. `apply` and the balance recalculation run on a staged
    /// copy that is committed only if both succeed.
    pub(crate) fn mutate_ledger<V, T>(
        &self,
        validate: impl FnOnce(&TripData) -> Result<Plan<V, T>, LedgerError>,
        apply: impl FnOnce(&mut TripData, V) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut data = self.inner.lock();
        let plan = match validate(&*data)? {
            Plan::Apply(plan) => plan,
            Plan::Skip(value) => return Ok(value),
        };

        let trip_id = data.trip.id;
        let mut staged = data.clone();
        let result = apply(&mut staged, plan)
            .and_then(|value| balance::recalculate(&mut staged, trip_id).map(|()| value));

        match result {
            Ok(value) => {
                *data = staged;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(trip = %trip_id, error = %err, "rolled back ledger mutation");
                Err(err)
            }
        }
    }

    /// Recalculates cached balances without any other write.
    pub(crate) fn recalculate(&self) -> Result<(), LedgerError> {
        self.mutate_ledger(|_| Ok(Plan::Apply(())), |_, ()| Ok(()))
    }
}
