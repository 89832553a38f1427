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

use clap::{Parser, Subcommand};
use csv::Writer;
use groupsave_ledger::http::{self, AppState};
use groupsave_ledger::logging::init_logging;
use groupsave_ledger::{LedgerError, Settings, Snapshot, StartupError, Transaction, WalletSnapshot};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use tokio::net::TcpListener;

/// GroupSave ledger - wallet ledger and mobile-money settlement service
#[derive(Parser, Debug)]
#[command(name = "groupsave-ledger")]
#[command(about = "Wallet ledger and settlement engine for group savings", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API and webhook endpoint
    Serve {
        /// Optional TOML settings file; GROUPSAVE__* variables override it
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print wallet states from a snapshot as CSV
    ///
    /// Example: groupsave-ledger report ledger.json > wallets.csv
    Report {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Print transactions instead of wallets
        #[arg(long)]
        transactions: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let result = match args.command {
        Command::Serve { config } => serve(config).await,
        Command::Report {
            snapshot,
            transactions,
        } => report(snapshot, transactions),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn serve(config: Option<PathBuf>) -> Result<(), StartupError> {
    let settings = Settings::load(config.as_deref())?;
    init_logging(&settings.logging)?;

    let state = AppState::from_settings(&settings)?;
    let address = settings.server.address()?;
    let listener = TcpListener::bind(address).await?;
    tracing::info!(%address, "listening");

    http::serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

fn report(path: PathBuf, transactions: bool) -> Result<(), StartupError> {
    let snapshot = Snapshot::load(&path)?;
    let stdout = std::io::stdout();
    let written = if transactions {
        write_transactions(&snapshot.ledger.transactions, stdout.lock())
    } else {
        write_wallets(&snapshot.ledger.wallets, stdout.lock())
    };
    written.map_err(|e| StartupError::Io(e.into()))
}

/// One CSV row per wallet.
#[derive(Debug, Serialize)]
struct WalletRow {
    wallet: u64,
    owner_kind: &'static str,
    owner: u64,
    balance: String,
    locked_balance: String,
    total: String,
}

impl TryFrom<&WalletSnapshot> for WalletRow {
    type Error = LedgerError;

    fn try_from(wallet: &WalletSnapshot) -> Result<Self, Self::Error> {
        let total = wallet.total()?;
        Ok(Self {
            wallet: wallet.id.0,
            owner_kind: wallet.owner.kind(),
            owner: wallet.owner.id(),
            balance: wallet.balance.to_string(),
            locked_balance: wallet.locked_balance.to_string(),
            total: total.to_string(),
        })
    }
}

/// Writes wallet states as CSV.
///
/// # CSV Format
///
/// ```csv
/// wallet,owner_kind,owner,balance,locked_balance,total
/// 1,user,1,70.00,30.00,100.00
/// 2,group,1,250.00,0.00,250.00
/// ```
fn write_wallets<W: Write>(wallets: &[WalletSnapshot], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for wallet in wallets {
        let row = WalletRow::try_from(wallet).map_err(std::io::Error::other)?;
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    id: u64,
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    amount: String,
    from_wallet: Option<u64>,
    to_wallet: Option<u64>,
    external_reference: Option<&'a str>,
    created_at: String,
}

fn write_transactions<W: Write>(transactions: &[Transaction], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for tx in transactions {
        wtr.serialize(TransactionRow {
            id: tx.id.0,
            kind: tx.kind.as_str(),
            status: tx.status.as_str(),
            amount: tx.amount.to_string(),
            from_wallet: tx.from_wallet.map(|w| w.0),
            to_wallet: tx.to_wallet.map(|w| w.0),
            external_reference: tx.external_reference.as_ref().map(|r| r.as_str()),
            created_at: tx.created_at.to_rfc3339(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}
