use crate::ui;
use alloy::primitives::{
    Address,
    U256,
};
use boxoffice::{
    EthereumGateway,
    GatewayConfig,
    KeystoreWallet,
    PurchaseCoordinator,
    PurchaseError,
    PurchasePhase,
    TicketLedger,
    ledger,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use std::{
    path::PathBuf,
    time::Duration,
};
use tokio::time;
use tracing::error;
use url::Url;

pub const DEFAULT_FUJI_RPC_URL: &str = "https://api.avax-test.network/ext/bc/C/rpc";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";
const ERROR_HISTORY_DEPTH: usize = 5;
const RECENT_TICKETS_SHOWN: usize = 10;

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Fuji { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    fn url(&self) -> &str {
        match self {
            NetworkTarget::Fuji { url } => url,
            NetworkTarget::LocalNode { url } => url,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            NetworkTarget::Fuji { .. } => "Avalanche Fuji",
            NetworkTarget::LocalNode { .. } => "Local node",
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    EthKeystore {
        name: Option<String>,
        dir: PathBuf,
    },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallets: WalletConfig,
    pub contract_address: Address,
    pub ledger_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct TicketRow {
    pub ticket_id: u64,
    pub purchased_at: String,
    pub tx_hash: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network_label: String,
    pub contract_address: Address,
    pub account: Option<Address>,
    pub total_sold: u64,
    pub capacity: u64,
    pub price_per_ticket: U256,
    pub phase: PurchasePhase,
    pub tickets: Vec<TicketRow>,
    pub status: String,
    pub errors: Vec<String>,
}

pub struct AppController {
    coordinator: PurchaseCoordinator<EthereumGateway>,
    wallet: KeystoreWallet,
    contract_address: Address,
    network_label: String,
    status: String,
    errors: Vec<String>,
}

impl AppController {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let rpc_url = Url::parse(config.network.url())
            .map_err(|e| eyre!("Invalid RPC URL {}: {e}", config.network.url()))?;
        let gateway = EthereumGateway::connect(GatewayConfig {
            rpc_url,
            contract_address: config.contract_address,
        })
        .await
        .map_err(|e| eyre!("Contract handshake failed: {e}"))?;

        let ledger_path = match config.ledger_path {
            Some(path) => path,
            None => ledger::default_ledger_path(config.contract_address)
                .map_err(|_| eyre!("HOME is not set; pass --ledger-path"))?,
        };
        let ledger = TicketLedger::open(ledger_path);

        let WalletConfig::EthKeystore { name, dir } = config.wallets;
        let wallet = KeystoreWallet::new(dir, name);

        let mut controller = Self {
            coordinator: PurchaseCoordinator::new(gateway, ledger),
            wallet,
            contract_address: config.contract_address,
            network_label: config.network.label().to_string(),
            status: String::from("Ready. Press 'c' to connect a wallet."),
            errors: Vec::new(),
        };
        if let Err(e) = controller.coordinator.refresh().await {
            controller.push_error(format!("Initial sale read failed: {}", render_error(&e)));
        }
        Ok(controller)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(5)
    }

    pub async fn connect_wallet(&mut self) {
        match self.coordinator.connect(&self.wallet).await {
            Ok(address) => {
                self.status = format!("Connected as {address}");
            }
            Err(e) => {
                error!(error = %e, "wallet connect failed");
                self.push_error(render_error(&e));
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.coordinator.disconnect();
        self.status = String::from("Disconnected. Local ticket cache cleared.");
    }

    pub async fn buy(&mut self) {
        match self.coordinator.buy().await {
            Ok(ticket) => {
                self.status = format!("Ticket #{} confirmed", ticket.ticket_id);
            }
            Err(e) => {
                error!(error = %e, "purchase failed");
                self.push_error(render_error(&e));
            }
        }
    }

    pub async fn refresh(&mut self) {
        if let Err(e) = self.coordinator.refresh().await {
            error!(error = %e, "sale refresh failed");
            self.push_error(render_error(&e));
        }
    }

    pub async fn resync(&mut self) {
        match self.coordinator.resync().await {
            Ok(count) => {
                self.status = format!("Resynced {count} tickets from chain");
            }
            Err(e) => {
                error!(error = %e, "ledger resync failed");
                self.push_error(render_error(&e));
            }
        }
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    fn push_error(&mut self, message: String) {
        self.errors.push(message);
        if self.errors.len() > ERROR_HISTORY_DEPTH {
            let overflow = self.errors.len() - ERROR_HISTORY_DEPTH;
            self.errors.drain(..overflow);
        }
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let (total_sold, capacity, price_per_ticket) = match self.coordinator.sale_state() {
            Some(state) => (state.total_sold, state.capacity, state.price_per_ticket),
            None => (0, boxoffice::TICKET_CAPACITY, U256::ZERO),
        };
        let tickets = self
            .coordinator
            .recent_purchases(RECENT_TICKETS_SHOWN)
            .into_iter()
            .map(|ticket| TicketRow {
                ticket_id: ticket.ticket_id,
                purchased_at: format_purchase_time(ticket.purchase_time),
                tx_hash: ticket.tx_hash.map(|hash| hash.to_string()),
            })
            .collect();

        AppSnapshot {
            network_label: self.network_label.clone(),
            contract_address: self.contract_address,
            account: self.coordinator.current_account(),
            total_sold,
            capacity,
            price_per_ticket,
            phase: self.coordinator.phase().clone(),
            tickets,
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Transient failures get a retry hint; everything else is shown as-is.
fn render_error(error: &PurchaseError) -> String {
    if error.is_retryable() {
        format!("{} (press 'r' to retry)", error.user_message())
    } else {
        error.user_message()
    }
}

fn format_purchase_time(unix_seconds: u64) -> String {
    chrono::DateTime::from_timestamp(unix_seconds as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| format!("t={unix_seconds}"))
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let mut controller = AppController::new(config).await?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    // UI bootstrap
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    controller: &mut AppController,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    let mut ticker = time::interval(controller.poll_interval());
    ui::draw(ui_state, &controller.snapshot())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => { break; }
            _ = ticker.tick() => {
                controller.refresh().await;
                ui::draw(ui_state, &controller.snapshot())?;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let Some(ev) = ui::interpret_event(ui_state, raw_ev?) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Connect => {
                        // rpassword needs the plain terminal back for the
                        // prompt, and the input thread must stop stealing
                        // its keystrokes
                        input_events.pause();
                        ui::terminal_exit()?;
                        controller.connect_wallet().await;
                        ui::terminal_enter(ui_state)?;
                        input_events.resume();
                    }
                    ui::UserEvent::Disconnect => controller.disconnect(),
                    ui::UserEvent::Buy => {
                        controller.set_status("Submitting purchase...");
                        ui::draw(ui_state, &controller.snapshot())?;
                        controller.buy().await;
                        controller.refresh().await;
                    }
                    ui::UserEvent::Refresh => controller.refresh().await,
                    ui::UserEvent::Resync => controller.resync().await,
                    ui::UserEvent::Redraw => {
                        // UI-only update; redraw without hitting the chain
                        ui::draw(ui_state, &controller.snapshot())?;
                        continue;
                    }
                }
                ui::draw(ui_state, &controller.snapshot())?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn render_error__network_failure__appends_retry_hint() {
        let error = PurchaseError::NetworkUnavailable(String::from("connection refused"));

        let rendered = render_error(&error);

        assert!(rendered.ends_with("(press 'r' to retry)"), "{rendered}");
        assert!(rendered.contains(&error.user_message()));
    }

    #[test]
    fn render_error__user_rejection__shows_plain_message() {
        let error = PurchaseError::UserRejectedSigning;

        assert_eq!(render_error(&error), error.user_message());
    }

    #[test]
    fn format_purchase_time__unix_epoch_offset__renders_utc() {
        assert_eq!(format_purchase_time(1_700_000_000), "2023-11-14 22:13 UTC");
    }
}
