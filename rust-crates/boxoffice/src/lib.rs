//! Client-side coordination layer for the TicketSale contract: wallet
//! session management, contract access over JSON-RPC, the purchase state
//! machine, and a persistent local ticket cache.

pub mod coordinator;

pub mod error;

pub mod gateway;

pub mod ledger;

pub mod session;

pub mod ticket;

pub mod wallets;

pub use coordinator::{
    PurchaseCoordinator,
    PurchasePhase,
};
pub use error::PurchaseError;
pub use gateway::{
    ContractGateway,
    EthereumGateway,
    GatewayConfig,
};
pub use ledger::TicketLedger;
pub use session::{
    UnlockedAccount,
    WalletProvider,
    WalletSession,
};
pub use ticket::{
    SaleState,
    TICKET_CAPACITY,
    Ticket,
};
pub use wallets::KeystoreWallet;
