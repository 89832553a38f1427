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

//! Identity and authorization collaborators.
//!
//! User and group records live in other services; the engine only asks
//! two questions of them before touching the ledger: which wallet belongs
//! to this owner, and may this actor act on this group.

use crate::base::{GroupId, UserId, WalletId};
use crate::wallet::WalletOwner;
use dashmap::DashMap;
use std::collections::HashSet;

/// Resolves an owner to its wallet.
pub trait WalletDirectory: Send + Sync {
    fn wallet_of(&self, owner: WalletOwner) -> Option<WalletId>;
}

/// Group membership checks.
pub trait AccessPolicy: Send + Sync {
    fn is_member(&self, user: UserId, group: GroupId) -> bool;
    fn is_admin(&self, user: UserId, group: GroupId) -> bool;
}

#[derive(Debug, Default)]
struct Roster {
    members: HashSet<UserId>,
    admins: HashSet<UserId>,
}

/// In-memory group roster.
#[derive(Debug, Default)]
pub struct Membership {
    groups: DashMap<GroupId, Roster>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, group: GroupId, user: UserId) {
        self.groups.entry(group).or_default().members.insert(user);
    }

    /// Admins are members too.
    pub fn add_admin(&self, group: GroupId, user: UserId) {
        let mut roster = self.groups.entry(group).or_default();
        roster.members.insert(user);
        roster.admins.insert(user);
    }

    pub fn remove_member(&self, group: GroupId, user: UserId) {
        if let Some(mut roster) = self.groups.get_mut(&group) {
            roster.members.remove(&user);
            roster.admins.remove(&user);
        }
    }
}

impl AccessPolicy for Membership {
    fn is_member(&self, user: UserId, group: GroupId) -> bool {
        self.groups
            .get(&group)
            .is_some_and(|roster| roster.members.contains(&user))
    }

    fn is_admin(&self, user: UserId, group: GroupId) -> bool {
        self.groups
            .get(&group)
            .is_some_and(|roster| roster.admins.contains(&user))
    }
}
