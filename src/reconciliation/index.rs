//! Deduplicated transaction lookup

use std::collections::HashMap;

use crate::types::Transaction;

/// Lookup from `transaction_id` to transaction for one side of a run
///
/// The first occurrence of an id wins; later occurrences are kept aside in
/// [`TransactionIndex::duplicates`]. Iteration follows first-seen order.
#[derive(Debug, Clone, Default)]
pub struct TransactionIndex<'a> {
    by_id: HashMap<&'a str, &'a Transaction>,
    ordered: Vec<&'a Transaction>,
    duplicates: Vec<&'a Transaction>,
}

impl<'a> TransactionIndex<'a> {
    /// Index a collection of transactions
    pub fn build(transactions: &'a [Transaction]) -> Self {
        let mut index = Self {
            by_id: HashMap::with_capacity(transactions.len()),
            ordered: Vec::with_capacity(transactions.len()),
            duplicates: Vec::new(),
        };

        for transaction in transactions {
            let id = transaction.transaction_id.as_str();
            if index.by_id.contains_key(id) {
                index.duplicates.push(transaction);
                continue;
            }
            index.by_id.insert(id, transaction);
            index.ordered.push(transaction);
        }

        index
    }

    /// Number of unique ids
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.by_id.contains_key(transaction_id)
    }

    /// The retained transaction for an id
    pub fn get(&self, transaction_id: &str) -> Option<&'a Transaction> {
        self.by_id.get(transaction_id).copied()
    }

    /// Unique transactions in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &'a Transaction> + '_ {
        self.ordered.iter().copied()
    }

    /// Discarded duplicates in input order
    pub fn duplicates(&self) -> &[&'a Transaction] {
        &self.duplicates
    }
}
