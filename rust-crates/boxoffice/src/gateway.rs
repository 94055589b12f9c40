use crate::{
    error::{
        PurchaseError,
        classify_contract_error,
    },
    session::WalletSession,
    ticket::{
        SaleState,
        TICKET_CAPACITY,
        Ticket,
    },
};
use alloy::{
    network::{
        Ethereum,
        EthereumWallet,
    },
    primitives::{
        Address,
        TxHash,
        U256,
    },
    providers::{
        PendingTransactionBuilder,
        Provider,
        ProviderBuilder,
        ReqwestProvider,
    },
    sol,
    transports::http::{
        Client,
        Http,
    },
};
use url::Url;

// abi as shipped in the event frontend; the contract is fixed at deployment
sol!(
    #[sol(rpc)]
    #[derive(Debug)]
    TicketSale,
    "src/abi/ticket_sale.json"
);

use self::TicketSale::TicketSaleInstance;

/// An in-flight purchase that can be awaited to confirmation. The hash is
/// assigned at submission and never changes.
pub trait PendingHandle {
    fn tx_hash(&self) -> TxHash;
}

impl PendingHandle for PendingTransactionBuilder<Http<Client>, Ethereum> {
    fn tx_hash(&self) -> TxHash {
        *PendingTransactionBuilder::tx_hash(self)
    }
}

/// All reads and writes against the single ticket contract instance.
pub trait ContractGateway {
    type Pending: PendingHandle;

    /// Read-only sale counters; atomic from the caller's perspective.
    fn sale_state(&self) -> impl Future<Output = Result<SaleState, PurchaseError>>;

    /// Full on-chain ticket history. Full-refresh only; no pagination.
    fn all_tickets(&self) -> impl Future<Output = Result<Vec<Ticket>, PurchaseError>>;

    /// Submit a value-bearing `buyTicket` call signed by the session.
    /// Returns as soon as the transaction is broadcast; confirmation is
    /// awaited separately.
    fn submit_purchase(
        &self,
        session: &WalletSession,
    ) -> impl Future<Output = Result<Self::Pending, PurchaseError>>;

    /// Suspend until the submitted transaction is mined. The returned
    /// ticket is built from the confirmation receipt, whose
    /// `TicketPurchased` event is the sole authority for the assigned
    /// `ticket_id` (a pre-submission `totalTickets` read can be stale
    /// under concurrent buyers).
    fn await_confirmation(
        &self,
        pending: Self::Pending,
    ) -> impl Future<Output = Result<Ticket, PurchaseError>>;
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub rpc_url: Url,
    pub contract_address: Address,
}

pub struct EthereumGateway {
    contract: TicketSaleInstance<Http<Client>, ReqwestProvider>,
    rpc_url: Url,
    contract_address: Address,
    // TICKET_PRICE is immutable after deployment; fetched once at connect.
    price_per_ticket: U256,
}

impl EthereumGateway {
    pub async fn connect(config: GatewayConfig) -> Result<Self, PurchaseError> {
        let provider = ProviderBuilder::new().on_http(config.rpc_url.clone());
        let code = provider
            .get_code_at(config.contract_address)
            .await
            .map_err(|e| crate::error::classify_rpc_error(&e))?;
        if code.is_empty() {
            return Err(PurchaseError::Reverted {
                reason: format!(
                    "no ticket contract deployed at {}",
                    config.contract_address
                ),
            });
        }
        let contract = TicketSale::new(config.contract_address, provider);
        let price_per_ticket = contract
            .TICKET_PRICE()
            .call()
            .await
            .map_err(classify_contract_error)?
            ._0;
        tracing::info!(
            contract = %config.contract_address,
            price = %price_per_ticket,
            "connected to ticket contract"
        );
        Ok(Self {
            contract,
            rpc_url: config.rpc_url,
            contract_address: config.contract_address,
            price_per_ticket,
        })
    }
}

fn ticket_from_event(event: &TicketSale::TicketPurchased, tx_hash: TxHash) -> Result<Ticket, PurchaseError> {
    Ok(Ticket {
        buyer: event.buyer,
        ticket_id: narrow(event.ticketId, "ticketId")?,
        purchase_time: narrow(event.timestamp, "timestamp")?,
        tx_hash: Some(tx_hash),
    })
}

fn narrow(value: U256, field: &str) -> Result<u64, PurchaseError> {
    u64::try_from(value).map_err(|_| {
        PurchaseError::NetworkUnavailable(format!(
            "chain returned out-of-range {field}: {value}"
        ))
    })
}

impl ContractGateway for EthereumGateway {
    type Pending = PendingTransactionBuilder<Http<Client>, Ethereum>;

    async fn sale_state(&self) -> Result<SaleState, PurchaseError> {
        let total_sold = self
            .contract
            .totalTickets()
            .call()
            .await
            .map_err(classify_contract_error)?
            ._0;
        Ok(SaleState {
            total_sold: narrow(total_sold, "totalTickets")?,
            capacity: TICKET_CAPACITY,
            price_per_ticket: self.price_per_ticket,
        })
    }

    async fn all_tickets(&self) -> Result<Vec<Ticket>, PurchaseError> {
        let raw = self
            .contract
            .getTickets()
            .call()
            .await
            .map_err(classify_contract_error)?
            ._0;
        let mut tickets = Vec::with_capacity(raw.len());
        for entry in raw {
            tickets.push(Ticket {
                buyer: entry.buyer,
                ticket_id: narrow(entry.ticketId, "ticketId")?,
                purchase_time: narrow(entry.purchaseTime, "purchaseTime")?,
                // getTickets does not carry the confirming hash
                tx_hash: None,
            });
        }
        Ok(tickets)
    }

    async fn submit_purchase(
        &self,
        session: &WalletSession,
    ) -> Result<Self::Pending, PurchaseError> {
        let account = session
            .current_account()
            .ok_or(PurchaseError::NotConnected)?;
        let signer = session.signer().ok_or(PurchaseError::NotConnected)?;

        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url.clone());
        let contract = TicketSale::new(self.contract_address, provider);

        let pending = contract
            .buyTicket()
            .from(account)
            .value(self.price_per_ticket)
            .send()
            .await
            .map_err(classify_contract_error)?;
        tracing::info!(tx_hash = %pending.tx_hash(), buyer = %account, "purchase submitted");
        Ok(pending)
    }

    async fn await_confirmation(
        &self,
        pending: Self::Pending,
    ) -> Result<Ticket, PurchaseError> {
        let tx_hash = PendingHandle::tx_hash(&pending);
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| PurchaseError::NetworkUnavailable(e.to_string()))?;

        if !receipt.status() {
            return Err(PurchaseError::Reverted {
                reason: "ticket purchase reverted on chain".to_string(),
            });
        }

        let purchased = receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| log.log_decode::<TicketSale::TicketPurchased>().ok())
            .ok_or_else(|| {
                PurchaseError::NetworkUnavailable(
                    "confirmation receipt carried no TicketPurchased event".to_string(),
                )
            })?;

        let ticket = ticket_from_event(&purchased.inner.data, tx_hash)?;
        tracing::info!(
            tx_hash = %tx_hash,
            ticket_id = ticket.ticket_id,
            "purchase confirmed"
        );
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn narrow__value_in_range__converts() {
        assert_eq!(narrow(U256::from(42u64), "ticketId").unwrap(), 42);
    }

    #[test]
    fn narrow__value_out_of_range__is_network_unavailable() {
        let err = narrow(U256::MAX, "ticketId").unwrap_err();

        assert!(matches!(err, PurchaseError::NetworkUnavailable(_)));
    }

    #[test]
    fn ticket_from_event__receipt_fields__are_authoritative() {
        // given
        let event = TicketSale::TicketPurchased {
            buyer: Address::repeat_byte(0xAB),
            ticketId: U256::from(42u64),
            timestamp: U256::from(1_700_000_000u64),
        };
        let tx_hash = TxHash::repeat_byte(0xDE);

        // when
        let ticket = ticket_from_event(&event, tx_hash).unwrap();

        // then
        assert_eq!(
            ticket,
            Ticket {
                buyer: Address::repeat_byte(0xAB),
                ticket_id: 42,
                purchase_time: 1_700_000_000,
                tx_hash: Some(tx_hash),
            }
        );
    }
}
