use alloy::primitives::{
    Address,
    TxHash,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Fixed at contract deployment; the contract stops selling past this.
pub const TICKET_CAPACITY: u64 = 100;

/// One confirmed ticket purchase.
///
/// `tx_hash` is present on entries recorded from a confirmation receipt and
/// absent on entries rebuilt from `getTickets()`, which does not store the
/// confirming transaction on chain.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Ticket {
    pub buyer: Address,
    pub ticket_id: u64,
    pub purchase_time: u64,
    #[serde(default)]
    pub tx_hash: Option<TxHash>,
}

/// Read-mostly view of the sale, sourced from chain.
#[derive(Clone, Debug, PartialEq)]
pub struct SaleState {
    pub total_sold: u64,
    pub capacity: u64,
    pub price_per_ticket: U256,
}

impl SaleState {
    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.total_sold)
    }

    pub fn is_sold_out(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn remaining__oversold_count__saturates_to_zero() {
        let state = SaleState {
            total_sold: TICKET_CAPACITY + 1,
            capacity: TICKET_CAPACITY,
            price_per_ticket: U256::ZERO,
        };

        assert_eq!(state.remaining(), 0);
        assert!(state.is_sold_out());
    }

    #[test]
    fn remaining__partial_sale__is_capacity_minus_sold() {
        let state = SaleState {
            total_sold: 42,
            capacity: TICKET_CAPACITY,
            price_per_ticket: U256::ZERO,
        };

        assert_eq!(state.remaining(), 58);
        assert!(!state.is_sold_out());
    }
}
