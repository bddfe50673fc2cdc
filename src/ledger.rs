//! Ledger validation for minichain
//!
//! Pure functions over packet data: replaying a transaction history into a
//! balance table, and checking a serialized block chain for hash linkage and
//! per-block transaction shape. No state is kept between calls; the balance
//! table is a derived view, recomputable at any time from the transactions.

use crate::error::{ChainError, Result};
use crate::packet::{decode, Address, Record, TxRecord, COINBASE_REWARD, GENESIS_HASH};
use std::collections::HashMap;

/// Derived mapping from address to net balance. Never persisted.
pub type WalletTable = HashMap<Address, i64>;

/// Replay `txs` strictly in order, starting from empty balances.
///
/// A coinbase must issue exactly [`COINBASE_REWARD`]. A transfer debits the
/// sender before crediting the recipient, so an overdraft is detected at the
/// transaction that causes it, and ordering across transactions matters.
pub fn evaluate_transactions(txs: &[TxRecord]) -> Result<WalletTable> {
    let mut wallets = WalletTable::new();

    for tx in txs {
        if tx.is_coinbase() && tx.amount != COINBASE_REWARD {
            return Err(ChainError::InvalidTransaction(format!(
                "CoinbaseTx amount must be {}",
                COINBASE_REWARD
            )));
        }

        // Amounts past i64::MAX cannot be represented in the balance
        // table; rejecting them here keeps every later balance operation
        // in range.
        let amount = i64::try_from(tx.amount).map_err(|_| {
            ChainError::InvalidTransaction(format!("amount out of range: {}", tx.amount))
        })?;

        if let Some(from) = &tx.from {
            let balance = wallets.entry(from.clone()).or_insert(0);
            *balance -= amount;
            if *balance < 0 {
                return Err(ChainError::InvalidTransaction(format!(
                    "wallet is deficit {}'s wallet {}",
                    from, balance
                )));
            }
        }

        *wallets.entry(tx.send_to.clone()).or_insert(0) += amount;
    }

    Ok(wallets)
}

/// Validate an ordered chain of serialized block packets and return the
/// balance table obtained by replaying every contained transaction.
///
/// Linkage: each block's declared `prevHash` must equal the hash of the
/// preceding block's packet, starting from [`GENESIS_HASH`]. Shape: a block
/// holds at least one transaction, the first is the only coinbase.
pub fn validate_blocks(serialized_blocks: &[String]) -> Result<WalletTable> {
    let mut all_txs: Vec<TxRecord> = Vec::new();
    let mut prev_hash = GENESIS_HASH.to_string();

    for serialized_block in serialized_blocks {
        let decoded = decode(serialized_block)?;
        let block = match decoded.record {
            Record::Block(block) => block,
            other => {
                return Err(ChainError::InvalidBlock(format!(
                    "Block packet type error: {} != block",
                    other.type_name()
                )))
            }
        };

        if prev_hash != block.prev_hash {
            return Err(ChainError::InvalidBlock(format!(
                "block hash error: {} != {}",
                prev_hash, block.prev_hash
            )));
        }
        prev_hash = decoded.hash;

        let mut txs = Vec::with_capacity(block.txs.len());
        for serialized_tx in &block.txs {
            match decode(serialized_tx)?.record {
                Record::Tx(tx) => txs.push(tx),
                other => {
                    return Err(ChainError::InvalidBlock(format!(
                        "Tx packet type error: {} != tx",
                        other.type_name()
                    )))
                }
            }
        }

        if txs.is_empty() {
            return Err(ChainError::InvalidBlock("Empty Txs".to_string()));
        }
        if !txs[0].is_coinbase() {
            return Err(ChainError::InvalidBlock(
                "first Tx must be CoinbaseTx".to_string(),
            ));
        }
        if txs[1..].iter().any(|tx| tx.is_coinbase()) {
            return Err(ChainError::InvalidBlock("Illegal CoinbaseTx".to_string()));
        }

        all_txs.extend(txs);
    }

    evaluate_transactions(&all_txs).map_err(|e| ChainError::InvalidBlock(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{block_packet, coinbase_packet, tx_packet};

    fn tx(from: Option<&str>, send_to: &str, amount: u64) -> TxRecord {
        TxRecord {
            from: from.map(String::from),
            send_to: send_to.to_string(),
            amount,
        }
    }

    #[test]
    fn test_single_coinbase_credits_recipient() {
        let wallets = evaluate_transactions(&[tx(None, "hoge", 50)]).unwrap();
        assert_eq!(wallets["hoge"], 50);
    }

    #[test]
    fn test_over_issuance_rejected() {
        let result = evaluate_transactions(&[tx(None, "hoge", 100)]);
        match result {
            Err(ChainError::InvalidTransaction(msg)) => {
                assert!(msg.contains("CoinbaseTx amount must be 50"));
            }
            other => panic!("expected InvalidTransaction, got {:?}", other),
        }
    }

    #[test]
    fn test_overdraft_rejected() {
        let result = evaluate_transactions(&[tx(Some("hoge"), "fuga", 1)]);
        match result {
            Err(ChainError::InvalidTransaction(msg)) => {
                assert!(msg.contains("wallet is deficit"));
                assert!(msg.contains("hoge"));
            }
            other => panic!("expected InvalidTransaction, got {:?}", other),
        }
    }

    #[test]
    fn test_transfer_after_issuance_balances() {
        let wallets = evaluate_transactions(&[
            tx(None, "hoge", 50),
            tx(Some("hoge"), "fuga", 10),
        ])
        .unwrap();
        assert_eq!(wallets["hoge"], 40);
        assert_eq!(wallets["fuga"], 10);
    }

    #[test]
    fn test_order_matters_for_overdraft() {
        // Spend-then-fund fails even though the same set funds-then-spend.
        let spend_first = [tx(Some("hoge"), "fuga", 10), tx(None, "hoge", 50)];
        assert!(evaluate_transactions(&spend_first).is_err());

        let fund_first = [tx(None, "hoge", 50), tx(Some("hoge"), "fuga", 10)];
        assert!(evaluate_transactions(&fund_first).is_ok());
    }

    #[test]
    fn test_amount_above_i64_range_rejected() {
        let result = evaluate_transactions(&[tx(Some("hoge"), "fuga", u64::MAX)]);
        match result {
            Err(ChainError::InvalidTransaction(msg)) => {
                assert!(msg.contains("amount out of range"));
            }
            other => panic!("expected InvalidTransaction, got {:?}", other),
        }
    }

    #[test]
    fn test_amount_of_two_pow_63_rejected_even_when_funded() {
        let result = evaluate_transactions(&[
            tx(None, "hoge", 50),
            tx(Some("hoge"), "fuga", 1u64 << 63),
        ]);
        match result {
            Err(ChainError::InvalidTransaction(msg)) => {
                assert!(msg.contains("amount out of range"));
            }
            other => panic!("expected InvalidTransaction, got {:?}", other),
        }
    }

    #[test]
    fn test_self_transfer_debits_before_crediting() {
        // A wallet cannot lend itself funds within one transaction.
        let result = evaluate_transactions(&[tx(Some("hoge"), "hoge", 1)]);
        assert!(result.is_err());
    }

    fn chain_of(blocks: &[crate::packet::Packet]) -> Vec<String> {
        blocks.iter().map(|b| b.serialized.clone()).collect()
    }

    #[test]
    fn test_valid_single_block_chain() {
        let coinbase = coinbase_packet("hoge".to_string());
        let block = block_packet(vec![coinbase.serialized], GENESIS_HASH);
        let wallets = validate_blocks(&chain_of(&[block])).unwrap();
        assert_eq!(wallets["hoge"], 50);
    }

    #[test]
    fn test_linked_blocks_accumulate() {
        let cb1 = coinbase_packet("hoge".to_string());
        let block1 = block_packet(vec![cb1.serialized], GENESIS_HASH);
        let cb2 = coinbase_packet("hoge".to_string());
        let transfer = tx_packet(Some("hoge".to_string()), "fuga".to_string(), 30);
        let block2 = block_packet(vec![cb2.serialized, transfer.serialized], &block1.hash);

        let wallets = validate_blocks(&chain_of(&[block1, block2])).unwrap();
        assert_eq!(wallets["hoge"], 70);
        assert_eq!(wallets["fuga"], 30);

        let issued: i64 = wallets.values().sum();
        assert_eq!(issued, 100);
    }

    #[test]
    fn test_broken_linkage_rejected() {
        let cb1 = coinbase_packet("hoge".to_string());
        let block1 = block_packet(vec![cb1.serialized], GENESIS_HASH);
        let cb2 = coinbase_packet("hoge".to_string());
        // Wrong link: points at genesis instead of block1.
        let block2 = block_packet(vec![cb2.serialized], GENESIS_HASH);

        let result = validate_blocks(&chain_of(&[block1, block2]));
        match result {
            Err(ChainError::InvalidBlock(msg)) => assert!(msg.contains("block hash error")),
            other => panic!("expected InvalidBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_block_rejected() {
        let block = block_packet(vec![], GENESIS_HASH);
        let result = validate_blocks(&chain_of(&[block]));
        match result {
            Err(ChainError::InvalidBlock(msg)) => assert!(msg.contains("Empty Txs")),
            other => panic!("expected InvalidBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_first_tx_must_be_coinbase() {
        let transfer = tx_packet(Some("hoge".to_string()), "fuga".to_string(), 1);
        let block = block_packet(vec![transfer.serialized], GENESIS_HASH);
        let result = validate_blocks(&chain_of(&[block]));
        match result {
            Err(ChainError::InvalidBlock(msg)) => {
                assert!(msg.contains("first Tx must be CoinbaseTx"));
            }
            other => panic!("expected InvalidBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_second_coinbase_rejected() {
        let cb1 = coinbase_packet("hoge".to_string());
        let cb2 = coinbase_packet("fuga".to_string());
        let block = block_packet(vec![cb1.serialized, cb2.serialized], GENESIS_HASH);
        let result = validate_blocks(&chain_of(&[block]));
        match result {
            Err(ChainError::InvalidBlock(msg)) => assert!(msg.contains("Illegal CoinbaseTx")),
            other => panic!("expected InvalidBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_non_tx_packet_inside_block_rejected() {
        let inner = block_packet(vec![], GENESIS_HASH);
        let block = block_packet(vec![inner.serialized], GENESIS_HASH);
        let result = validate_blocks(&chain_of(&[block]));
        match result {
            Err(ChainError::InvalidBlock(msg)) => {
                assert!(msg.contains("Tx packet type error"));
            }
            other => panic!("expected InvalidBlock, got {:?}", other),
        }
    }

    #[test]
    fn test_replay_failure_surfaces_as_invalid_block() {
        let cb = coinbase_packet("hoge".to_string());
        // Overspend inside an otherwise well-formed block.
        let transfer = tx_packet(Some("hoge".to_string()), "fuga".to_string(), 60);
        let block = block_packet(vec![cb.serialized, transfer.serialized], GENESIS_HASH);

        let result = validate_blocks(&chain_of(&[block]));
        match result {
            Err(ChainError::InvalidBlock(msg)) => assert!(msg.contains("wallet is deficit")),
            other => panic!("expected InvalidBlock, got {:?}", other),
        }
    }
}
