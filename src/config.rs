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

//! Service settings.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables prefixed `GROUPSAVE` with `__` between path segments, e.g.
//! `GROUPSAVE__WEBHOOK__SECRET` or `GROUPSAVE__GATEWAY__USE_SIMULATOR=true`.
//! Every field has a default so an empty environment yields a working
//! simulator-backed configuration.

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "GROUPSAVE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub gateway: GatewaySettings,
    pub webhook: WebhookSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Reads the optional file then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

/// Mobile-money gateway credentials and behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Use the in-process simulator instead of the live network.
    pub use_simulator: bool,
    pub simulated_delay_ms: u64,
    pub api_id: String,
    pub api_key: String,
    pub merchant_account: String,
    /// Overrides the receive (collection) endpoint.
    pub receive_url: Option<String>,
    /// Overrides the send (payout) endpoint.
    pub send_url: Option<String>,
    pub currency: String,
    pub timeout_secs: u64,
}

impl GatewaySettings {
    pub fn has_credentials(&self) -> bool {
        !self.api_id.is_empty() && !self.api_key.is_empty() && !self.merchant_account.is_empty()
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            use_simulator: false,
            simulated_delay_ms: 200,
            api_id: String::new(),
            api_key: String::new(),
            merchant_account: String::new(),
            receive_url: None,
            send_url: None,
            currency: "GHS".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Shared secret for callback signatures. Unset disables enforcement.
    pub secret: Option<String>,
    pub signature_header: String,
    /// Mismatches per reference before an escalation alert fires.
    pub mismatch_alert_threshold: u32,
}

impl WebhookSettings {
    /// Configured secret, treating an empty string as unset.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|secret| !secret.is_empty())
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            signature_header: "X-Hubtel-Signature".to_string(),
            mismatch_alert_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// JSON snapshot written after state changes and read at start-up.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
