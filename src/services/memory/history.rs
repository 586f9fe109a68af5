//! Bounded closed-trade history per symbol and timeframe.

use crate::types::{ClosedTrade, Timeframe};
use dashmap::DashMap;
use std::collections::VecDeque;

pub struct TradeHistory {
    /// Key format: "{symbol}:{timeframe}", lowercase.
    trades: DashMap<String, VecDeque<ClosedTrade>>,
    per_key: usize,
}

fn history_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("{}:{}", symbol.to_lowercase(), timeframe)
}

impl TradeHistory {
    pub fn new(per_key: usize) -> Self {
        Self {
            trades: DashMap::new(),
            per_key: per_key.max(1),
        }
    }

    pub fn record(&self, trade: ClosedTrade) {
        let mut ring = self
            .trades
            .entry(history_key(&trade.symbol, trade.timeframe))
            .or_default();
        ring.push_back(trade);
        while ring.len() > self.per_key {
            ring.pop_front();
        }
    }

    /// Up to `limit` most recent trades, newest first.
    pub fn recent(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<ClosedTrade> {
        self.trades
            .get(&history_key(symbol, timeframe))
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Every trade, oldest first within each key, keys sorted.
    pub fn all(&self) -> Vec<ClosedTrade> {
        let mut keys: Vec<String> = self.trades.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys.iter()
            .filter_map(|key| self.trades.get(key))
            .flat_map(|ring| ring.iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trades.iter().map(|ring| ring.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the history. Trades are applied in order, so the last
    /// `per_key` of each key survive.
    pub fn load(&self, trades: impl IntoIterator<Item = ClosedTrade>) {
        self.trades.clear();
        for trade in trades {
            self.record(trade);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloseReason, SignalType};

    fn trade(symbol: &str, win: bool, closed_at: i64) -> ClosedTrade {
        ClosedTrade {
            symbol: symbol.to_string(),
            timeframe: Timeframe::H1,
            direction: SignalType::Long,
            win,
            reason: if win { CloseReason::Tp } else { CloseReason::Sl },
            closed_at,
        }
    }

    #[test]
    fn test_recent_is_newest_first() {
        let history = TradeHistory::new(100);
        for i in 0..5 {
            history.record(trade("ETHUSDT", i % 2 == 0, i));
        }

        let recent = history.recent("ethusdt", Timeframe::H1, 3);
        let times: Vec<i64> = recent.iter().map(|t| t.closed_at).collect();
        assert_eq!(times, vec![4, 3, 2]);
        assert!(history.recent("ETHUSDT", Timeframe::H4, 3).is_empty());
    }

    #[test]
    fn test_history_is_bounded_per_key() {
        let history = TradeHistory::new(3);
        for i in 0..10 {
            history.record(trade("ETHUSDT", true, i));
        }
        history.record(trade("BTCUSDT", true, 0));

        assert_eq!(history.len(), 4);
        assert_eq!(history.recent("ETHUSDT", Timeframe::H1, 10)[2].closed_at, 7);
    }

    #[test]
    fn test_all_and_load() {
        let history = TradeHistory::new(10);
        history.record(trade("ETHUSDT", true, 1));
        history.record(trade("BTCUSDT", false, 2));

        let all = history.all();
        assert_eq!(all[0].symbol, "BTCUSDT");

        let restored = TradeHistory::new(10);
        restored.load(all.clone());
        assert_eq!(restored.all(), all);
    }
}
