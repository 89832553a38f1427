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

//! JSON snapshots of the full ledger state.
//!
//! A snapshot is written to a sibling temp file and renamed into place, so
//! a crash mid-write leaves the previous snapshot intact.

use crate::audit::{AuditEvent, AuditLog};
use crate::error::PersistenceError;
use crate::ledger::{Ledger, LedgerSnapshot};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub ledger: LedgerSnapshot,
    #[serde(default)]
    pub audit_events: Vec<AuditEvent>,
}

impl Snapshot {
    pub fn capture(ledger: &Ledger, audit: &AuditLog) -> Self {
        Self {
            ledger: ledger.snapshot(),
            audit_events: audit.all(),
        }
    }

    /// Rebuilds live state, validating balances and reference uniqueness.
    pub fn restore(&self) -> Result<(Ledger, AuditLog), PersistenceError> {
        let ledger = Ledger::restore(&self.ledger)?;
        let audit = AuditLog::restore(self.audit_events.clone());
        Ok((ledger, audit))
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads `path` if it exists, otherwise returns an empty snapshot.
    pub fn load_or_default(path: &Path) -> Result<Self, PersistenceError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
