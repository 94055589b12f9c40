use crate::{
    error::PurchaseError,
    gateway::{
        ContractGateway,
        PendingHandle,
    },
    ledger::TicketLedger,
    session::{
        WalletProvider,
        WalletSession,
    },
    ticket::{
        SaleState,
        Ticket,
    },
};
use alloy::primitives::{
    Address,
    TxHash,
};

/// Lifecycle of one purchase attempt. `Recorded` and `Declined` are
/// terminal; a fresh `buy()` starts over from either.
#[derive(Clone, Debug, PartialEq)]
pub enum PurchasePhase {
    Idle,
    Submitting,
    PendingConfirmation { tx_hash: TxHash },
    Recorded { ticket: Ticket },
    Declined { reason: PurchaseError },
}

impl PurchasePhase {
    /// True while a transaction may be on the wire; new attempts are
    /// refused, never queued.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PurchasePhase::Submitting | PurchasePhase::PendingConfirmation { .. }
        )
    }
}

/// Orchestrates a purchase end to end: validates preconditions, submits
/// through the gateway, tracks the transaction lifecycle, and appends
/// confirmed tickets to the local ledger. Owns the session and the ledger;
/// the gateway only ever reads the session.
pub struct PurchaseCoordinator<G> {
    gateway: G,
    session: WalletSession,
    ledger: TicketLedger,
    phase: PurchasePhase,
    sale_state: Option<SaleState>,
}

impl<G: ContractGateway> PurchaseCoordinator<G> {
    pub fn new(gateway: G, ledger: TicketLedger) -> Self {
        Self {
            gateway,
            session: WalletSession::new(),
            ledger,
            phase: PurchasePhase::Idle,
            sale_state: None,
        }
    }

    pub async fn connect<W: WalletProvider>(
        &mut self,
        wallet: &W,
    ) -> Result<Address, PurchaseError> {
        self.session.connect(wallet).await
    }

    /// Idempotent. Clears the session and drops the persisted ticket cache
    /// along with it.
    pub fn disconnect(&mut self) {
        self.session.disconnect();
        self.ledger.clear();
        self.phase = PurchasePhase::Idle;
    }

    /// Registered callback for wallet-initiated account switches.
    pub fn handle_account_change(&mut self, new_account: Option<Address>) {
        let had_account = self.session.is_connected();
        self.session.handle_account_change(new_account);
        if had_account && !self.session.is_connected() {
            self.ledger.clear();
            self.phase = PurchasePhase::Idle;
        }
    }

    /// Pull the authoritative sale counters from chain.
    pub async fn refresh(&mut self) -> Result<SaleState, PurchaseError> {
        let state = self.gateway.sale_state().await?;
        self.sale_state = Some(state.clone());
        Ok(state)
    }

    /// Rebuild the local cache from the full on-chain ticket history.
    pub async fn resync(&mut self) -> Result<usize, PurchaseError> {
        let tickets = self.gateway.all_tickets().await?;
        let count = tickets.len();
        if let Err(e) = self.ledger.replace_all(tickets) {
            tracing::warn!(error = %e, "resynced ledger could not be persisted");
        }
        Ok(count)
    }

    /// Run one purchase attempt to completion.
    ///
    /// Every failure resolves to `Declined` with a classified reason; the
    /// ledger is only touched after confirmation, never optimistically.
    /// The `PurchaseInProgress` guard is the one exception: it refuses the
    /// call synchronously and leaves the in-flight phase untouched.
    pub async fn buy(&mut self) -> Result<Ticket, PurchaseError> {
        if self.phase.is_in_flight() {
            return Err(PurchaseError::PurchaseInProgress);
        }

        if let Err(reason) = self.validate() {
            return Err(self.decline(reason));
        }

        self.phase = PurchasePhase::Submitting;
        let pending = match self.gateway.submit_purchase(&self.session).await {
            Ok(pending) => pending,
            Err(reason) => return Err(self.decline(reason)),
        };

        self.phase = PurchasePhase::PendingConfirmation {
            tx_hash: pending.tx_hash(),
        };
        let ticket = match self.gateway.await_confirmation(pending).await {
            Ok(ticket) => ticket,
            Err(reason) => return Err(self.decline(reason)),
        };

        // A cache write failure never fails a confirmed purchase.
        if let Err(e) = self.ledger.append(ticket.clone()) {
            tracing::warn!(error = %e, "confirmed ticket could not be cached");
        }
        self.phase = PurchasePhase::Recorded {
            ticket: ticket.clone(),
        };
        Ok(ticket)
    }

    fn validate(&self) -> Result<(), PurchaseError> {
        if !self.session.is_connected() {
            return Err(PurchaseError::NotConnected);
        }
        // Best-effort local check; the contract enforces the real capacity.
        if let Some(state) = &self.sale_state
            && state.is_sold_out()
        {
            return Err(PurchaseError::SoldOut {
                capacity: state.capacity,
            });
        }
        Ok(())
    }

    fn decline(&mut self, reason: PurchaseError) -> PurchaseError {
        tracing::info!(%reason, "purchase declined");
        self.phase = PurchasePhase::Declined {
            reason: reason.clone(),
        };
        reason
    }

    pub fn phase(&self) -> &PurchasePhase {
        &self.phase
    }

    pub fn last_error(&self) -> Option<&PurchaseError> {
        match &self.phase {
            PurchasePhase::Declined { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn sale_state(&self) -> Option<&SaleState> {
        self.sale_state.as_ref()
    }

    pub fn current_account(&self) -> Option<Address> {
        self.session.current_account()
    }

    pub fn tickets(&self) -> &[Ticket] {
        self.ledger.tickets()
    }

    pub fn recent_purchases(&self, limit: usize) -> Vec<&Ticket> {
        self.ledger.recent(limit)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        session::UnlockedAccount,
        ticket::TICKET_CAPACITY,
    };
    use alloy::{
        primitives::U256,
        signers::local::PrivateKeySigner,
    };
    use std::cell::{
        Cell,
        RefCell,
    };
    use tempdir::TempDir;

    struct FakeWallet;

    impl WalletProvider for FakeWallet {
        async fn request_account(&self) -> Result<UnlockedAccount, PurchaseError> {
            let signer = PrivateKeySigner::random();
            let address = signer.address();
            Ok(UnlockedAccount { address, signer })
        }
    }

    struct FakePending {
        hash: TxHash,
    }

    impl PendingHandle for FakePending {
        fn tx_hash(&self) -> TxHash {
            self.hash
        }
    }

    struct FakeGateway {
        sale: RefCell<SaleState>,
        chain_tickets: Vec<Ticket>,
        submit_result: Result<TxHash, PurchaseError>,
        confirm_result: Result<Ticket, PurchaseError>,
        submit_calls: Cell<usize>,
    }

    impl FakeGateway {
        fn new() -> Self {
            Self {
                sale: RefCell::new(SaleState {
                    total_sold: 0,
                    capacity: TICKET_CAPACITY,
                    price_per_ticket: U256::from(100_000_000_000_000_000u64),
                }),
                chain_tickets: Vec::new(),
                submit_result: Ok(TxHash::repeat_byte(0xDE)),
                confirm_result: Ok(sample_ticket(42)),
                submit_calls: Cell::new(0),
            }
        }

        fn with_total_sold(self, total_sold: u64) -> Self {
            self.sale.borrow_mut().total_sold = total_sold;
            self
        }

        fn with_submit_error(mut self, err: PurchaseError) -> Self {
            self.submit_result = Err(err);
            self
        }

        fn with_confirm_error(mut self, err: PurchaseError) -> Self {
            self.confirm_result = Err(err);
            self
        }

        fn with_chain_tickets(mut self, tickets: Vec<Ticket>) -> Self {
            self.chain_tickets = tickets;
            self
        }
    }

    impl ContractGateway for FakeGateway {
        type Pending = FakePending;

        async fn sale_state(&self) -> Result<SaleState, PurchaseError> {
            Ok(self.sale.borrow().clone())
        }

        async fn all_tickets(&self) -> Result<Vec<Ticket>, PurchaseError> {
            Ok(self.chain_tickets.clone())
        }

        async fn submit_purchase(
            &self,
            session: &WalletSession,
        ) -> Result<FakePending, PurchaseError> {
            assert!(session.is_connected(), "gateway reached without a session");
            self.submit_calls.set(self.submit_calls.get() + 1);
            self.submit_result
                .clone()
                .map(|hash| FakePending { hash })
        }

        async fn await_confirmation(
            &self,
            _pending: FakePending,
        ) -> Result<Ticket, PurchaseError> {
            let confirmed = self.confirm_result.clone()?;
            self.sale.borrow_mut().total_sold += 1;
            Ok(confirmed)
        }
    }

    fn sample_ticket(id: u64) -> Ticket {
        Ticket {
            buyer: Address::repeat_byte(0xAB),
            ticket_id: id,
            purchase_time: 1_700_000_000,
            tx_hash: Some(TxHash::repeat_byte(0xDE)),
        }
    }

    fn ledger_in(dir: &TempDir) -> TicketLedger {
        TicketLedger::open(dir.path().join("tickets.json"))
    }

    #[tokio::test]
    async fn buy__not_connected__declines_before_any_network_contact() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let mut coordinator = PurchaseCoordinator::new(FakeGateway::new(), ledger_in(&dir));

        // when
        let err = coordinator.buy().await.unwrap_err();

        // then
        assert_eq!(err, PurchaseError::NotConnected);
        assert_eq!(coordinator.gateway.submit_calls.get(), 0);
        assert_eq!(
            coordinator.phase(),
            &PurchasePhase::Declined {
                reason: PurchaseError::NotConnected,
            }
        );
    }

    #[tokio::test]
    async fn buy__last_known_state_sold_out__short_circuits_with_sold_out() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let gateway = FakeGateway::new().with_total_sold(TICKET_CAPACITY);
        let mut coordinator = PurchaseCoordinator::new(gateway, ledger_in(&dir));
        coordinator.connect(&FakeWallet).await.unwrap();
        coordinator.refresh().await.unwrap();

        // when
        let err = coordinator.buy().await.unwrap_err();

        // then
        assert_eq!(
            err,
            PurchaseError::SoldOut {
                capacity: TICKET_CAPACITY,
            }
        );
        assert_eq!(coordinator.gateway.submit_calls.get(), 0);
    }

    #[tokio::test]
    async fn buy__while_in_flight__is_refused_without_touching_phase_or_network() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let mut coordinator = PurchaseCoordinator::new(FakeGateway::new(), ledger_in(&dir));
        coordinator.connect(&FakeWallet).await.unwrap();
        let in_flight = PurchasePhase::PendingConfirmation {
            tx_hash: TxHash::repeat_byte(0x11),
        };
        coordinator.phase = in_flight.clone();

        // when
        let err = coordinator.buy().await.unwrap_err();

        // then
        assert_eq!(err, PurchaseError::PurchaseInProgress);
        assert_eq!(coordinator.phase(), &in_flight);
        assert_eq!(coordinator.gateway.submit_calls.get(), 0);
    }

    #[tokio::test]
    async fn buy__confirmed__records_exactly_one_matching_ticket() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let mut coordinator = PurchaseCoordinator::new(FakeGateway::new(), ledger_in(&dir));
        coordinator.connect(&FakeWallet).await.unwrap();

        // when
        let ticket = coordinator.buy().await.unwrap();

        // then
        assert_eq!(ticket, sample_ticket(42));
        assert_eq!(coordinator.tickets(), &[sample_ticket(42)]);
        assert_eq!(
            coordinator.phase(),
            &PurchasePhase::Recorded {
                ticket: sample_ticket(42),
            }
        );
        // the next authoritative read reflects the sale
        let state = coordinator.refresh().await.unwrap();
        assert_eq!(state.total_sold, 1);
    }

    #[tokio::test]
    async fn buy__signing_rejected__declines_with_no_ledger_mutation_and_allows_retry() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let gateway =
            FakeGateway::new().with_submit_error(PurchaseError::UserRejectedSigning);
        let mut coordinator = PurchaseCoordinator::new(gateway, ledger_in(&dir));
        coordinator.connect(&FakeWallet).await.unwrap();

        // when
        let err = coordinator.buy().await.unwrap_err();

        // then
        assert_eq!(err, PurchaseError::UserRejectedSigning);
        assert!(coordinator.tickets().is_empty());
        assert_eq!(
            coordinator.last_error(),
            Some(&PurchaseError::UserRejectedSigning)
        );
        // terminal phase: the retry is a fresh attempt, not PurchaseInProgress
        let retry_err = coordinator.buy().await.unwrap_err();
        assert_eq!(retry_err, PurchaseError::UserRejectedSigning);
    }

    #[tokio::test]
    async fn buy__confirmation_reverted__declines_with_no_ledger_mutation() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let gateway = FakeGateway::new().with_confirm_error(PurchaseError::Reverted {
            reason: "All tickets sold out".to_string(),
        });
        let mut coordinator = PurchaseCoordinator::new(gateway, ledger_in(&dir));
        coordinator.connect(&FakeWallet).await.unwrap();

        // when
        let err = coordinator.buy().await.unwrap_err();

        // then
        assert!(matches!(err, PurchaseError::Reverted { .. }));
        assert!(coordinator.tickets().is_empty());
    }

    #[tokio::test]
    async fn buy__repeated_successes__ledger_never_exceeds_chain_count() {
        // given: other buyers already hold two tickets
        let dir = TempDir::new("coordinator").unwrap();
        let gateway = FakeGateway::new().with_total_sold(2);
        let mut coordinator = PurchaseCoordinator::new(gateway, ledger_in(&dir));
        coordinator.connect(&FakeWallet).await.unwrap();

        // when
        coordinator.buy().await.unwrap();
        let state = coordinator.refresh().await.unwrap();

        // then
        assert!(coordinator.tickets().len() as u64 <= state.total_sold);
    }

    #[tokio::test]
    async fn disconnect__after_purchase__clears_session_and_persisted_ledger() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let path = dir.path().join("tickets.json");
        let mut coordinator = PurchaseCoordinator::new(
            FakeGateway::new(),
            TicketLedger::open(&path),
        );
        coordinator.connect(&FakeWallet).await.unwrap();
        coordinator.buy().await.unwrap();

        // when
        coordinator.disconnect();

        // then
        assert_eq!(coordinator.current_account(), None);
        assert!(coordinator.tickets().is_empty());
        assert!(!path.exists());
        assert_eq!(coordinator.phase(), &PurchasePhase::Idle);
    }

    #[tokio::test]
    async fn resync__with_chain_history__replaces_local_cache() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let chain = vec![
            Ticket {
                tx_hash: None,
                ..sample_ticket(0)
            },
            Ticket {
                tx_hash: None,
                ..sample_ticket(1)
            },
        ];
        let gateway = FakeGateway::new().with_chain_tickets(chain.clone());
        let mut coordinator = PurchaseCoordinator::new(gateway, ledger_in(&dir));

        // when
        let count = coordinator.resync().await.unwrap();

        // then
        assert_eq!(count, 2);
        assert_eq!(coordinator.tickets(), chain.as_slice());
    }

    #[tokio::test]
    async fn handle_account_change__switch_to_other_account__clears_ledger() {
        // given
        let dir = TempDir::new("coordinator").unwrap();
        let mut coordinator = PurchaseCoordinator::new(FakeGateway::new(), ledger_in(&dir));
        coordinator.connect(&FakeWallet).await.unwrap();
        coordinator.buy().await.unwrap();

        // when
        coordinator.handle_account_change(Some(Address::repeat_byte(0x33)));

        // then
        assert_eq!(coordinator.current_account(), None);
        assert!(coordinator.tickets().is_empty());
    }
}
