use alloy::transports::{
    RpcError,
    TransportErrorKind,
};
use thiserror::Error;

/// Classified failure taxonomy for the purchase flow.
///
/// Every failure crossing the wallet or gateway boundary is mapped into one
/// of these kinds before the coordinator sees it; nothing unclassified
/// reaches the UI.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PurchaseError {
    #[error("no wallet keystore is available")]
    NoWalletInstalled,

    #[error("wallet access was declined")]
    UserDeclined,

    #[error("signing was rejected")]
    UserRejectedSigning,

    #[error("no wallet is connected")]
    NotConnected,

    #[error("all {capacity} tickets are sold")]
    SoldOut { capacity: u64 },

    #[error("contract reverted: {reason}")]
    Reverted { reason: String },

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("a purchase is already in flight")]
    PurchaseInProgress,
}

impl PurchaseError {
    /// One distinct human-readable line per kind, for the rendering layer.
    pub fn user_message(&self) -> String {
        match self {
            PurchaseError::NoWalletInstalled => {
                "No wallet found. Add a keystore to your wallet directory first.".to_string()
            }
            PurchaseError::UserDeclined => {
                "Wallet access declined. Connect again when ready.".to_string()
            }
            PurchaseError::UserRejectedSigning => {
                "Transaction was rejected at the signing prompt.".to_string()
            }
            PurchaseError::NotConnected => "Connect a wallet before buying.".to_string(),
            PurchaseError::SoldOut { capacity } => {
                format!("All {capacity} tickets are sold out.")
            }
            PurchaseError::Reverted { reason } => {
                format!("The contract refused the purchase: {reason}")
            }
            PurchaseError::NetworkUnavailable(_) => {
                "Could not reach the network. Refresh and try again.".to_string()
            }
            PurchaseError::PurchaseInProgress => {
                "A purchase is already pending. Wait for it to confirm.".to_string()
            }
        }
    }

    /// Retryable without new user action (the "Refresh" class of failures).
    pub fn is_retryable(&self) -> bool {
        matches!(self, PurchaseError::NetworkUnavailable(_))
    }
}

// EIP-1193 code used by browser wallets for a user-rejected request; some
// RPC proxies forward it verbatim.
const USER_REJECTED_CODE: i64 = 4001;

/// Classify a contract-call failure from the RPC boundary.
pub(crate) fn classify_contract_error(err: alloy::contract::Error) -> PurchaseError {
    match err {
        alloy::contract::Error::TransportError(rpc_err) => classify_rpc_error(&rpc_err),
        other => PurchaseError::NetworkUnavailable(other.to_string()),
    }
}

pub(crate) fn classify_rpc_error(err: &RpcError<TransportErrorKind>) -> PurchaseError {
    let Some(payload) = err.as_error_resp() else {
        return PurchaseError::NetworkUnavailable(err.to_string());
    };
    let message = payload.message.to_string();
    let lowered = message.to_lowercase();
    if payload.code == USER_REJECTED_CODE
        || lowered.contains("user rejected")
        || lowered.contains("user denied")
    {
        return PurchaseError::UserRejectedSigning;
    }
    if lowered.contains("revert") {
        let reason = message
            .split_once("execution reverted:")
            .map(|(_, tail)| tail.trim().to_string())
            .filter(|tail| !tail.is_empty())
            .unwrap_or_else(|| "no revert reason given".to_string());
        return PurchaseError::Reverted { reason };
    }
    PurchaseError::NetworkUnavailable(message)
}
