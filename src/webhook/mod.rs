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

//! Inbound settlement callbacks.
//!
//! The only path by which a pending deposit or withdrawal reaches a final
//! state.

mod payload;
mod reconciler;
mod signature;

pub use payload::{CallbackFields, map_status};
pub use reconciler::{CallbackOutcome, WebhookReconciler};
pub use signature::{sign, verify_signature};
