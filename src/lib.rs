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

//! # Trip Ledger
//!
//! This library tracks shared expenses for group trips: members record what
//! they paid and how it was split, settle up with each other, and get back
//! who owes whom.
//!
//! ## Core Components
//!
//! - [`Engine`]: Owns trips and runs every mutation as an atomic unit that
//!   recalculates cached member balances before committing.
//! - [`net_balances`]: Folds a ledger into one net balance per member.
//! - [`calculate_trip_balances`]: Pairwise debtor/creditor rows with paid and
//!   remaining amounts.
//! - [`suggest_settlements`]: Greedy netting of balances into a short list of
//!   transfers.
//! - [`LedgerError`]: Error types for rejected or rolled-back operations.
//!
//! ## Example
//!
//! ```
//! use trip_ledger::{Engine, NewMember, NewTransaction, NewTrip, TransactionSplit, UserId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let owner = UserId(1);
//! let trip = engine
//!     .create_trip(owner, NewTrip { name: "Lombok".into(), ..Default::default() })
//!     .unwrap();
//! let ayu = engine.members(owner, trip.id).unwrap()[0].id;
//! let bima = engine
//!     .add_member(owner, trip.id, NewMember::Guest {
//!         name: "Bima".into(),
//!         contact: None,
//!         role: Default::default(),
//!     })
//!     .unwrap()
//!     .id;
//!
//! // Ayu pays 120 for a dinner split evenly
//! engine
//!     .create_transaction(owner, trip.id, NewTransaction {
//!         title: "Dinner".into(),
//!         description: None,
//!         date: chrono::Utc::now(),
//!         total_amount: dec!(120),
//!         paid_by: ayu,
//!         split_type: Default::default(),
//!         splits: vec![TransactionSplit::new(ayu, dec!(60)), TransactionSplit::new(bima, dec!(60))],
//!         meta: None,
//!     })
//!     .unwrap();
//!
//! let transfers = engine.suggest_settlements(trip.id).unwrap();
//! assert_eq!(transfers.len(), 1);
//! assert_eq!(transfers[0].from_member_id, bima);
//! assert_eq!(transfers[0].amount, dec!(60));
//! ```
//!
//! ## Thread Safety
//!
//! Writes to one trip are serialized on that trip's lock; different trips are
//! processed in parallel.

pub mod balance;
mod base;
mod book;
pub mod debt_matrix;
mod engine;
pub mod error;
pub mod ledger;
pub mod settlement;
pub mod simplify;
pub mod transaction;
pub mod trip;
pub mod views;

pub use balance::{NetBalances, net_balances, recalculate};
pub use base::{
    MAX_AMOUNT, MONEY_SCALE, MemberId, SettlementId, TOLERANCE, TransactionId, TripId, UserId,
    check_amount, is_settled, round_money,
};
pub use debt_matrix::{DebtStatus, PairwiseDebt, calculate_trip_balances};
pub use engine::{Engine, EngineBuilder, EngineConfig};
pub use error::{ErrorKind, LedgerError};
pub use ledger::{LedgerEntry, LedgerSnapshot, LedgerStore, Payment, read_snapshot};
pub use settlement::{NewSettlement, Settlement, SettlementStatus};
pub use simplify::{SuggestedTransfer, suggest_settlements};
pub use transaction::{NewTransaction, SplitType, Transaction, TransactionPatch, TransactionSplit};
pub use trip::{
    MemberIdentity, MemberRole, NewMember, NewTrip, Trip, TripMember, TripPatch, TripStatus,
};
pub use views::{
    BalanceOverview, DebtDirection, MemberDebt, SettlementPlanRow, ShareLink, TripSummary,
};
