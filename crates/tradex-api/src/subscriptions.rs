//! Locally registered price-index subscriptions.
//!
//! Registering or removing an index sends nothing; the full set is
//! subscribed when streaming starts.

/// Channel prefix for price-index notifications.
pub const PRICE_INDEX_PREFIX: &str = "deribit_price_index.";

pub fn price_index_channel(index: &str) -> String {
    format!("{PRICE_INDEX_PREFIX}{index}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    channels: Vec<String>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an index. Returns false if it was already registered.
    pub fn register(&mut self, index: &str) -> bool {
        let channel = price_index_channel(index);
        if self.channels.contains(&channel) {
            return false;
        }
        self.channels.push(channel);
        true
    }

    /// Remove an index. Returns false if it was not registered.
    pub fn remove(&mut self, index: &str) -> bool {
        let channel = price_index_channel(index);
        let before = self.channels.len();
        self.channels.retain(|c| *c != channel);
        self.channels.len() != before
    }

    /// Remove everything, returning how many channels were registered.
    pub fn clear(&mut self) -> usize {
        let count = self.channels.len();
        self.channels.clear();
        count
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn indices(&self) -> Vec<&str> {
        self.channels
            .iter()
            .map(|c| c.strip_prefix(PRICE_INDEX_PREFIX).unwrap_or(c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_deduplicates() {
        let mut set = SubscriptionSet::new();
        assert!(set.register("btc_usd"));
        assert!(!set.register("btc_usd"));
        assert!(set.register("eth_usd"));
        assert_eq!(
            set.channels(),
            ["deribit_price_index.btc_usd", "deribit_price_index.eth_usd"]
        );
        assert_eq!(set.indices(), vec!["btc_usd", "eth_usd"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut set = SubscriptionSet::new();
        set.register("btc_usd");
        set.register("eth_usd");
        assert!(set.remove("btc_usd"));
        assert!(!set.remove("btc_usd"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.clear(), 1);
        assert!(set.is_empty());
        assert_eq!(set.clear(), 0);
    }
}
