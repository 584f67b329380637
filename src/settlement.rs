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

//! Recorded payments between members.
//!
//! Only [`SettlementStatus::Confirmed`] settlements take part in balance and
//! debt calculations; a pending settlement is inert.

use crate::LedgerError;
use crate::base::{MemberId, SettlementId, TOLERANCE, TripId, check_amount};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub id: SettlementId,
    pub trip_id: TripId,
    /// Debtor, the member who paid.
    pub from_member: MemberId,
    /// Creditor, the member who received.
    pub to_member: MemberId,
    pub amount: Decimal,
    pub status: SettlementStatus,
    pub created_by: MemberId,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Settlement {
    pub fn is_confirmed(&self) -> bool {
        self.status == SettlementStatus::Confirmed
    }
}

/// Input for recording a settlement.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NewSettlement {
    pub from_member: MemberId,
    pub to_member: MemberId,
    pub amount: Decimal,
}

impl NewSettlement {
    /// Settlements move at least one cent between two different members.
    pub(crate) fn validate(&self) -> Result<(), LedgerError> {
        if self.from_member == self.to_member {
            return Err(LedgerError::SelfSettlement);
        }
        if check_amount(self.amount)? < TOLERANCE {
            return Err(LedgerError::InvalidAmount(self.amount));
        }
        Ok(())
    }
}
