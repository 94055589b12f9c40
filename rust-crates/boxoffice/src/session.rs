use crate::error::PurchaseError;
use alloy::{
    primitives::Address,
    signers::local::PrivateKeySigner,
};

/// An account together with its signing capability, produced by a
/// [`WalletProvider`] when the user grants access.
#[derive(Clone, Debug)]
pub struct UnlockedAccount {
    pub address: Address,
    pub signer: PrivateKeySigner,
}

/// The ambient wallet capability: account discovery plus signing.
///
/// Implementations fail with `NoWalletInstalled` when no wallet exists in
/// the environment and `UserDeclined` when the user refuses access.
pub trait WalletProvider {
    fn request_account(
        &self,
    ) -> impl Future<Output = Result<UnlockedAccount, PurchaseError>>;
}

/// Connection state for one user session.
///
/// The signing capability exists exactly when an account is connected; both
/// live in the same `Option` so the invariant holds by construction.
#[derive(Debug, Default)]
pub struct WalletSession {
    active: Option<UnlockedAccount>,
}

impl WalletSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request account access from the wallet capability.
    pub async fn connect<W: WalletProvider>(
        &mut self,
        wallet: &W,
    ) -> Result<Address, PurchaseError> {
        let unlocked = wallet.request_account().await?;
        let address = unlocked.address;
        self.active = Some(unlocked);
        tracing::info!(account = %address, "wallet connected");
        Ok(address)
    }

    /// Idempotent; always succeeds.
    pub fn disconnect(&mut self) {
        if self.active.take().is_some() {
            tracing::info!("wallet disconnected");
        }
    }

    pub fn current_account(&self) -> Option<Address> {
        self.active.as_ref().map(|a| a.address)
    }

    pub fn signer(&self) -> Option<&PrivateKeySigner> {
        self.active.as_ref().map(|a| &a.signer)
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Entry point for a wallet-initiated account change, registered as a
    /// callback by the embedding application. A switch away from the
    /// connected account tears the session down; reconnecting is a separate
    /// user action.
    pub fn handle_account_change(&mut self, new_account: Option<Address>) {
        if new_account != self.current_account() {
            tracing::info!(?new_account, "external account change; clearing session");
            self.active = None;
        }
    }
}
