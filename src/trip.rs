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

//! Trips and their members.
//!
//! A member is identified either by a registered [`UserId`] or by a guest
//! name; the two are mutually exclusive, which [`MemberIdentity`] encodes in
//! the type instead of as two nullable columns.

use crate::LedgerError;
use crate::base::{MemberId, TripId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    #[default]
    Planning,
    Ongoing,
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trip {
    pub id: TripId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub currency_code: String,
    pub status: TripStatus,
    /// Token for the unauthenticated summary link, assigned on first share.
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    #[default]
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MemberIdentity {
    User {
        user_id: UserId,
    },
    Guest {
        name: String,
        contact: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripMember {
    pub id: MemberId,
    pub trip_id: TripId,
    pub identity: MemberIdentity,
    pub role: MemberRole,
    /// Cached net balance, rewritten by every recompute.
    pub balance: Decimal,
}

impl TripMember {
    pub fn user_id(&self) -> Option<UserId> {
        match self.identity {
            MemberIdentity::User { user_id } => Some(user_id),
            MemberIdentity::Guest { .. } => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == MemberRole::Admin
    }

    /// User id for registered members, guest name otherwise.
    pub fn display_name(&self) -> String {
        match &self.identity {
            MemberIdentity::User { user_id } => format!("User #{user_id}"),
            MemberIdentity::Guest { name, .. } => name.clone(),
        }
    }
}

/// Input for creating a trip.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTrip {
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Falls back to the engine's default currency when absent.
    pub currency_code: Option<String>,
}

/// Partial trip update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub currency_code: Option<String>,
    pub status: Option<TripStatus>,
}

/// Input for adding a member to a trip.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NewMember {
    User {
        user_id: UserId,
        #[serde(default)]
        role: MemberRole,
    },
    Guest {
        name: String,
        contact: Option<String>,
        #[serde(default)]
        role: MemberRole,
    },
}

pub(crate) fn validate_name(name: &str) -> Result<(), LedgerError> {
    if name.trim().is_empty() {
        return Err(LedgerError::EmptyName);
    }
    Ok(())
}

/// Currency codes are three ASCII letters, stored upper-case.
pub(crate) fn normalize_currency(code: &str) -> Result<String, LedgerError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LedgerError::InvalidCurrency(code.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}
