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

//! Trip ledger engine.
//!
//! The [`Engine`] owns every trip and is the only way to change one. It
//! covers three groups of operations:
//!
//! - **Trip and membership management**: create/update/delete trips, add and
//!   remove members.
//! - **Ledger mutations**: create/update/delete transactions and record
//!   settlements. Each runs as one atomic unit that validates first, writes,
//!   then recalculates every member's cached balance before committing.
//! - **Read paths**: pairwise debts, live net balances, and settlement
//!   suggestions, all derived from the current ledger without writing.
//!
//! # Authorization
//!
//! Operations taking a `caller` check that the user is a member of the trip
//! (or owner/admin where noted) before anything else happens. The bare read
//! paths ([`Engine::calculate_trip_balances`], [`Engine::net_balances`],
//! [`Engine::suggest_settlements`]) assume the caller was already checked.
//!
//! # Thread Safety
//!
//! Trips are stored in a [`DashMap`]; writes to one trip are serialized on that
//! trip's lock while different trips are processed in parallel.

use crate::LedgerError;
use crate::balance::{self, NetBalances};
use crate::base::{MemberId, SettlementId, TransactionId, TripId, UserId};
use crate::book::{Plan, TripBook, TripData};
use crate::debt_matrix::{self, PairwiseDebt};
use crate::settlement::{NewSettlement, Settlement, SettlementStatus};
use crate::simplify::{self, SuggestedTransfer};
use crate::transaction::{NewTransaction, Transaction, TransactionPatch, validate_splits};
use crate::trip::{
    MemberIdentity, MemberRole, NewMember, NewTrip, Trip, TripMember, TripPatch, TripStatus,
    normalize_currency, validate_name,
};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Currency assigned to trips created without one.
    pub default_currency: String,
    /// Prefix for public summary links.
    pub share_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_currency: "IDR".to_string(),
            share_base_url: "http://localhost".to_string(),
        }
    }
}

/// Builder for [`Engine`].
///
/// ```
/// use trip_ledger::Engine;
///
/// let engine = Engine::builder()
///     .default_currency("eur")
///     .share_base_url("https://trips.example.com")
///     .build()
///     .unwrap();
/// assert_eq!(engine.config().default_currency, "EUR");
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.config.default_currency = code.into();
        self
    }

    pub fn share_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.share_base_url = url.into();
        self
    }

    /// # Errors
    ///
    /// [`LedgerError::InvalidCurrency`] if the default currency is not three letters.
    pub fn build(mut self) -> Result<Engine, LedgerError> {
        self.config.default_currency = normalize_currency(&self.config.default_currency)?;
        let base = self.config.share_base_url.trim_end_matches('/').to_string();
        self.config.share_base_url = base;
        Ok(Engine::with_config(self.config))
    }
}

/// Shared-expense engine managing every trip.
///
/// # Invariants
///
/// - Every member's cached balance equals the replay of the trip's ledger
///   after each committed mutation.
/// - Split amounts of every stored transaction add up to its total within
///   [`crate::TOLERANCE`].
/// - Only confirmed settlements affect balances and debts.
pub struct Engine {
    trips: DashMap<TripId, TripBook>,
    share_tokens: DashMap<String, TripId>,
    config: EngineConfig,
    next_trip_id: AtomicU32,
    next_member_id: AtomicU32,
    next_transaction_id: AtomicU32,
    next_settlement_id: AtomicU32,
}

impl Engine {
    /// Creates an engine with default settings and no trips.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    fn with_config(config: EngineConfig) -> Self {
        Engine {
            trips: DashMap::new(),
            share_tokens: DashMap::new(),
            config,
            next_trip_id: AtomicU32::new(1),
            next_member_id: AtomicU32::new(1),
            next_transaction_id: AtomicU32::new(1),
            next_settlement_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn book(&self, trip_id: TripId) -> Result<Ref<'_, TripId, TripBook>, LedgerError> {
        self.trips
            .get(&trip_id)
            .ok_or(LedgerError::TripNotFound(trip_id))
    }

    pub(crate) fn share_tokens(&self) -> &DashMap<String, TripId> {
        &self.share_tokens
    }

    fn next_member_id(&self) -> MemberId {
        MemberId(self.next_member_id.fetch_add(1, Ordering::Relaxed))
    }

    // === Trips ===

    /// Creates a trip in `planning` status with `owner` as its first admin.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EmptyName`] - Blank trip name.
    /// - [`LedgerError::InvalidCurrency`] - Currency code is not three letters.
    pub fn create_trip(&self, owner: UserId, new: NewTrip) -> Result<Trip, LedgerError> {
        validate_name(&new.name)?;
        let currency_code = match &new.currency_code {
            Some(code) => normalize_currency(code)?,
            None => self.config.default_currency.clone(),
        };

        let trip = Trip {
            id: TripId(self.next_trip_id.fetch_add(1, Ordering::Relaxed)),
            owner_id: owner,
            name: new.name.trim().to_string(),
            description: new.description,
            start_date: new.start_date,
            end_date: new.end_date,
            currency_code,
            status: TripStatus::Planning,
            share_token: None,
            created_at: Utc::now(),
        };

        let mut data = TripData::new(trip.clone());
        data.members.push(TripMember {
            id: self.next_member_id(),
            trip_id: trip.id,
            identity: MemberIdentity::User { user_id: owner },
            role: MemberRole::Admin,
            balance: Decimal::ZERO,
        });
        self.trips.insert(trip.id, TripBook::new(data));

        tracing::info!(trip = %trip.id, owner = %owner, "created trip");
        Ok(trip)
    }

    /// Returns the trip if `caller` is one of its members.
    pub fn trip(&self, caller: UserId, trip_id: TripId) -> Result<Trip, LedgerError> {
        self.book(trip_id)?.read(|data| {
            data.require_member(caller)?;
            Ok(data.trip.clone())
        })
    }

    /// Every trip `user` belongs to, ordered by id.
    pub fn trips_for(&self, user: UserId) -> Vec<Trip> {
        let mut trips: Vec<Trip> = self
            .trips
            .iter()
            .filter_map(|entry| {
                entry.value().read(|data| {
                    data.member_for_user(user)
                        .is_some()
                        .then(|| data.trip.clone())
                })
            })
            .collect();
        trips.sort_by_key(|trip| trip.id);
        trips
    }

    /// Updates name, currency, or status. Any member may do this.
    pub fn update_trip(
        &self,
        caller: UserId,
        trip_id: TripId,
        patch: TripPatch,
    ) -> Result<Trip, LedgerError> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        let currency_code = patch
            .currency_code
            .as_deref()
            .map(normalize_currency)
            .transpose()?;

        let trip = self.book(trip_id)?.update(|data| {
            data.require_member(caller)?;
            if let Some(name) = &patch.name {
                data.trip.name = name.trim().to_string();
            }
            if let Some(description) = patch.description {
                data.trip.description = Some(description);
            }
            if let Some(start_date) = patch.start_date {
                data.trip.start_date = Some(start_date);
            }
            if let Some(end_date) = patch.end_date {
                data.trip.end_date = Some(end_date);
            }
            if let Some(code) = currency_code {
                data.trip.currency_code = code;
            }
            if let Some(status) = patch.status {
                data.trip.status = status;
            }
            Ok(data.trip.clone())
        })?;

        tracing::info!(trip = %trip_id, "updated trip");
        Ok(trip)
    }

    /// Deletes a trip with all its members, transactions and settlements.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TripNotFound`] - No such trip.
    /// - [`LedgerError::Forbidden`] - `caller` is not the owner.
    pub fn delete_trip(&self, caller: UserId, trip_id: TripId) -> Result<(), LedgerError> {
        let share_token = self.book(trip_id)?.read(|data| {
            if data.trip.owner_id != caller {
                return Err(LedgerError::Forbidden("only the owner can delete this trip"));
            }
            Ok(data.trip.share_token.clone())
        })?;

        self.trips
            .remove(&trip_id)
            .ok_or(LedgerError::TripNotFound(trip_id))?;
        if let Some(token) = share_token {
            self.share_tokens.remove(&token);
        }

        tracing::info!(trip = %trip_id, "deleted trip");
        Ok(())
    }

    // === Members ===

    /// Adds a registered user or a guest. Only admins may add members.
    ///
    /// Adding a user who already belongs to the trip returns their existing
    /// member row unchanged.
    pub fn add_member(
        &self,
        caller: UserId,
        trip_id: TripId,
        new: NewMember,
    ) -> Result<TripMember, LedgerError> {
        if let NewMember::Guest { name, .. } = &new {
            validate_name(name)?;
        }

        let member = self.book(trip_id)?.update(|data| {
            data.require_admin(caller)?;

            let (identity, role) = match new {
                NewMember::User { user_id, role } => {
                    if let Some(existing) = data.member_for_user(user_id) {
                        return Ok(existing.clone());
                    }
                    (MemberIdentity::User { user_id }, role)
                }
                NewMember::Guest {
                    name,
                    contact,
                    role,
                } => (
                    MemberIdentity::Guest {
                        name: name.trim().to_string(),
                        contact,
                    },
                    role,
                ),
            };

            let member = TripMember {
                id: self.next_member_id(),
                trip_id,
                identity,
                role,
                balance: Decimal::ZERO,
            };
            data.members.push(member.clone());
            Ok(member)
        })?;

        tracing::info!(trip = %trip_id, member = %member.id, "added member");
        Ok(member)
    }

    /// Removes a member that no ledger entry references. Admins only.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MemberNotFound`] - Not a member of this trip.
    /// - [`LedgerError::MemberReferenced`] - Member appears in a transaction or settlement.
    /// - [`LedgerError::Forbidden`] - Caller is not an admin, or target is the owner.
    pub fn remove_member(
        &self,
        caller: UserId,
        trip_id: TripId,
        member_id: MemberId,
    ) -> Result<(), LedgerError> {
        self.book(trip_id)?.update(|data| {
            data.require_admin(caller)?;
            let member = data
                .member(member_id)
                .ok_or(LedgerError::MemberNotFound(member_id))?;
            if member.user_id() == Some(data.trip.owner_id) {
                return Err(LedgerError::Forbidden("the trip owner cannot be removed"));
            }
            if data.is_referenced(member_id) {
                return Err(LedgerError::MemberReferenced(member_id));
            }
            data.members.retain(|m| m.id != member_id);
            Ok(())
        })?;

        tracing::info!(trip = %trip_id, member = %member_id, "removed member");
        Ok(())
    }

    /// Members of the trip in the order they joined.
    pub fn members(&self, caller: UserId, trip_id: TripId) -> Result<Vec<TripMember>, LedgerError> {
        self.book(trip_id)?.read(|data| {
            data.require_member(caller)?;
            Ok(data.members.clone())
        })
    }

    // === Transactions ===

    /// Records an expense and recalculates balances.
    ///
    /// If `meta.draft_id` matches a transaction already in the trip, that
    /// transaction is returned and nothing is written.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Forbidden`] - Caller is not a member.
    /// - [`LedgerError::EmptyName`] - Blank title.
    /// - [`LedgerError::MemberNotInTrip`] - Payer or split member is an outsider.
    /// - [`LedgerError::SplitSumMismatch`] - Splits do not add up to the total.
    pub fn create_transaction(
        &self,
        caller: UserId,
        trip_id: TripId,
        new: NewTransaction,
    ) -> Result<Transaction, LedgerError> {
        validate_name(&new.title)?;
        let draft_id = new.draft_id();

        let transaction = self.book(trip_id)?.mutate_ledger(
            |data| {
                let creator = data.require_member(caller)?.id;
                if let Some(draft) = &draft_id {
                    let existing = data
                        .transactions
                        .iter()
                        .find(|tx| tx.draft_id().as_ref() == Some(draft));
                    if let Some(existing) = existing {
                        return Ok(Plan::Skip(existing.clone()));
                    }
                }
                validate_splits(new.total_amount, new.paid_by, &new.splits, |m| {
                    data.has_member(m)
                })?;
                Ok(Plan::Apply((creator, new)))
            },
            |staged, (creator, new)| {
                let transaction = Transaction {
                    id: TransactionId(self.next_transaction_id.fetch_add(1, Ordering::Relaxed)),
                    trip_id,
                    created_by: creator,
                    paid_by: new.paid_by,
                    title: new.title.trim().to_string(),
                    description: new.description,
                    date: new.date,
                    total_amount: new.total_amount,
                    split_type: new.split_type,
                    meta: new.meta,
                    splits: new.splits,
                };
                staged.transactions.push(transaction.clone());
                Ok(transaction)
            },
        )?;

        tracing::info!(
            trip = %trip_id,
            transaction = %transaction.id,
            amount = %transaction.total_amount,
            "recorded transaction"
        );
        Ok(transaction)
    }

    /// Patches an expense, replacing its split set when one is given.
    ///
    /// The patched transaction is validated as a whole: changing only the
    /// total still requires the existing splits to add up to it.
    pub fn update_transaction(
        &self,
        caller: UserId,
        trip_id: TripId,
        transaction_id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, LedgerError> {
        let transaction = self.book(trip_id)?.mutate_ledger(
            |data| {
                data.require_member(caller)?;
                let merged = patch.merged(data.transaction(transaction_id)?);
                validate_name(&merged.title)?;
                validate_splits(merged.total_amount, merged.paid_by, &merged.splits, |m| {
                    data.has_member(m)
                })?;
                Ok(Plan::<_, Transaction>::Apply(merged))
            },
            |staged, merged| {
                let slot = staged.transaction_mut(transaction_id)?;
                *slot = merged.clone();
                Ok(merged)
            },
        )?;

        tracing::info!(trip = %trip_id, transaction = %transaction_id, "updated transaction");
        Ok(transaction)
    }

    /// Deletes an expense together with its splits.
    pub fn delete_transaction(
        &self,
        caller: UserId,
        trip_id: TripId,
        transaction_id: TransactionId,
    ) -> Result<(), LedgerError> {
        self.book(trip_id)?.mutate_ledger(
            |data| {
                data.require_member(caller)?;
                data.transaction(transaction_id)?;
                Ok(Plan::Apply(()))
            },
            |staged, ()| {
                staged.transactions.retain(|tx| tx.id != transaction_id);
                Ok(())
            },
        )?;

        tracing::info!(trip = %trip_id, transaction = %transaction_id, "deleted transaction");
        Ok(())
    }

    /// Transactions of the trip, newest first.
    pub fn transactions(
        &self,
        caller: UserId,
        trip_id: TripId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let mut transactions = self.book(trip_id)?.read(|data| {
            data.require_member(caller)?;
            Ok::<_, LedgerError>(data.transactions.clone())
        })?;
        transactions.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(transactions)
    }

    // === Settlements ===

    /// Records a confirmed settlement and recalculates balances.
    ///
    /// The caller must be the trip owner, an admin, or the paying member.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SelfSettlement`] - Sender and receiver are the same member.
    /// - [`LedgerError::InvalidAmount`] - Amount below one cent.
    /// - [`LedgerError::MemberNotInTrip`] - Sender or receiver is an outsider.
    /// - [`LedgerError::Forbidden`] - Caller may not record this payment.
    pub fn create_settlement(
        &self,
        caller: UserId,
        trip_id: TripId,
        new: NewSettlement,
    ) -> Result<Settlement, LedgerError> {
        new.validate()?;

        let settlement = self.book(trip_id)?.mutate_ledger(
            |data| {
                let creator = data.require_member(caller)?;
                let debtor = data
                    .member(new.from_member)
                    .ok_or(LedgerError::MemberNotInTrip(new.from_member))?;
                if !data.has_member(new.to_member) {
                    return Err(LedgerError::MemberNotInTrip(new.to_member));
                }

                let allowed = data.trip.owner_id == caller
                    || creator.is_admin()
                    || debtor.id == creator.id;
                if !allowed {
                    return Err(LedgerError::Forbidden(
                        "only the owner, an admin, or the payer can record a settlement",
                    ));
                }
                Ok(Plan::<_, Settlement>::Apply(creator.id))
            },
            |staged, creator| {
                let settlement = Settlement {
                    id: SettlementId(self.next_settlement_id.fetch_add(1, Ordering::Relaxed)),
                    trip_id,
                    from_member: new.from_member,
                    to_member: new.to_member,
                    amount: new.amount,
                    status: SettlementStatus::Confirmed,
                    created_by: creator,
                    confirmed_at: Some(Utc::now()),
                };
                staged.settlements.push(settlement.clone());
                Ok(settlement)
            },
        )?;

        tracing::info!(
            trip = %trip_id,
            settlement = %settlement.id,
            from = %settlement.from_member,
            to = %settlement.to_member,
            amount = %settlement.amount,
            "recorded settlement"
        );
        Ok(settlement)
    }

    /// Settlements of the trip in the order they were recorded.
    pub fn settlements(
        &self,
        caller: UserId,
        trip_id: TripId,
    ) -> Result<Vec<Settlement>, LedgerError> {
        self.book(trip_id)?.read(|data| {
            data.require_member(caller)?;
            Ok(data.settlements.clone())
        })
    }

    // === Balances ===

    /// Rebuilds every member's cached balance from the ledger.
    pub fn recalculate_balances(&self, trip_id: TripId) -> Result<(), LedgerError> {
        self.book(trip_id)?.recalculate()
    }

    /// Pairwise debts with paid and remaining amounts. Writes nothing.
    pub fn calculate_trip_balances(
        &self,
        trip_id: TripId,
    ) -> Result<Vec<PairwiseDebt>, LedgerError> {
        let snapshot = self.book(trip_id)?.snapshot()?;
        debt_matrix::calculate_trip_balances(&snapshot)
    }

    /// Net balances derived from the ledger, in member order.
    pub fn net_balances(&self, trip_id: TripId) -> Result<NetBalances, LedgerError> {
        let snapshot = self.book(trip_id)?.snapshot()?;
        balance::net_balances(&snapshot)
    }

    /// Minimal transfers that would settle every member of the trip.
    pub fn suggest_settlements(
        &self,
        trip_id: TripId,
    ) -> Result<Vec<SuggestedTransfer>, LedgerError> {
        let balances = self.net_balances(trip_id)?;
        Ok(simplify::suggest_settlements(balances.iter()))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{SplitType, TransactionSplit};
    use rust_decimal_macros::dec;

    const OWNER: UserId = UserId(1);
    const FRIEND: UserId = UserId(2);

    fn setup() -> (Engine, TripId, MemberId, MemberId) {
        let engine = Engine::new();
        let trip = engine
            .create_trip(
                OWNER,
                NewTrip {
                    name: "Bali".into(),
                    currency_code: None,
                    ..Default::default()
                },
            )
            .unwrap();
        let owner = engine.members(OWNER, trip.id).unwrap()[0].id;
        let friend = engine
            .add_member(
                OWNER,
                trip.id,
                NewMember::User {
                    user_id: FRIEND,
                    role: MemberRole::Member,
                },
            )
            .unwrap()
            .id;
        (engine, trip.id, owner, friend)
    }

    fn dinner(paid_by: MemberId, splits: Vec<TransactionSplit>) -> NewTransaction {
        NewTransaction {
            title: "Dinner".into(),
            description: None,
            date: Utc::now(),
            total_amount: splits.iter().map(|s| s.amount).sum(),
            paid_by,
            split_type: SplitType::Shares,
            splits,
            meta: None,
        }
    }

    #[test]
    fn builder_rejects_bad_currency() {
        assert!(matches!(
            Engine::builder().default_currency("rupiah").build(),
            Err(LedgerError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn new_trip_uses_default_currency_and_owner_admin() {
        let (engine, trip_id, owner, _) = setup();
        let trip = engine.trip(OWNER, trip_id).unwrap();
        assert_eq!(trip.currency_code, "IDR");
        assert_eq!(trip.status, TripStatus::Planning);

        let members = engine.members(OWNER, trip_id).unwrap();
        assert_eq!(members[0].id, owner);
        assert!(members[0].is_admin());
    }

    #[test]
    fn draft_id_makes_creation_idempotent() {
        let (engine, trip_id, owner, friend) = setup();
        let mut new = dinner(owner, vec![TransactionSplit::new(friend, dec!(40))]);
        new.meta = Some(serde_json::json!({"draft_id": "receipt-7"}));

        let first = engine.create_transaction(OWNER, trip_id, new.clone()).unwrap();
        let second = engine.create_transaction(FRIEND, trip_id, new).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(engine.transactions(OWNER, trip_id).unwrap().len(), 1);
        assert_eq!(engine.net_balances(trip_id).unwrap().get(owner), Some(dec!(40)));
    }

    #[test]
    fn transaction_ids_are_not_consumed_by_rejected_writes() {
        let (engine, trip_id, owner, friend) = setup();
        let mut bad = dinner(owner, vec![TransactionSplit::new(friend, dec!(10))]);
        bad.total_amount = dec!(20);
        assert!(engine.create_transaction(OWNER, trip_id, bad).is_err());

        let good = dinner(owner, vec![TransactionSplit::new(friend, dec!(10))]);
        let tx = engine.create_transaction(OWNER, trip_id, good).unwrap();
        assert_eq!(tx.id, TransactionId(1));
    }
}
