use crate::order::{MarketOrder, Price, QueuedOrder, StopBuyOrder, StopSellOrder};

/// Decides whether a pending order may be released at the current threshold.
///
/// Implementations must be pure and total: no side effects, and an answer for
/// every threshold/order pair the owning queue can present.
pub trait DispatchFilter<T, O>: Send + Sync {
    fn test(&self, threshold: &T, order: &O) -> bool;
}

impl<T, O, F> DispatchFilter<T, O> for F
where
    F: Fn(&T, &O) -> bool + Send + Sync,
{
    fn test(&self, threshold: &T, order: &O) -> bool {
        self(threshold, order)
    }
}

/// Market orders flow whenever the market is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketDispatchFilter;

impl DispatchFilter<bool, MarketOrder> for MarketDispatchFilter {
    fn test(&self, market_open: &bool, _order: &MarketOrder) -> bool {
        *market_open
    }
}

/// Stop buys trigger once the price has risen to or through the trigger price.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopBuyDispatchFilter;

impl DispatchFilter<Price, StopBuyOrder> for StopBuyDispatchFilter {
    fn test(&self, price: &Price, order: &StopBuyOrder) -> bool {
        order.details().price() <= *price
    }
}

/// Stop sells trigger once the price has fallen to or through the trigger price.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopSellDispatchFilter;

impl DispatchFilter<Price, StopSellOrder> for StopSellDispatchFilter {
    fn test(&self, price: &Price, order: &StopSellOrder) -> bool {
        order.details().price() >= *price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::MarketBuyOrder;

    #[test]
    fn market_filter_follows_open_flag() {
        let order: MarketOrder = MarketBuyOrder::new("neo", "ABC", 1, 100).into();
        assert!(MarketDispatchFilter.test(&true, &order));
        assert!(!MarketDispatchFilter.test(&false, &order));
    }

    #[test]
    fn stop_buy_triggers_at_or_above_trigger() {
        let order = StopBuyOrder::new("neo", "ABC", 1, 105);
        assert!(!StopBuyDispatchFilter.test(&104, &order));
        assert!(StopBuyDispatchFilter.test(&105, &order));
        assert!(StopBuyDispatchFilter.test(&106, &order));
    }

    #[test]
    fn stop_sell_triggers_at_or_below_trigger() {
        let order = StopSellOrder::new("neo", "ABC", 1, 95);
        assert!(!StopSellDispatchFilter.test(&96, &order));
        assert!(StopSellDispatchFilter.test(&95, &order));
        assert!(StopSellDispatchFilter.test(&10, &order));
    }

    #[test]
    fn closures_act_as_filters() {
        let filter = |limit: &Price, order: &StopBuyOrder| order.quantity() as Price <= *limit;
        let order = StopBuyOrder::new("neo", "ABC", 5, 1);
        assert!(DispatchFilter::<Price, StopBuyOrder>::test(&filter, &5, &order));
        assert!(!DispatchFilter::<Price, StopBuyOrder>::test(&filter, &4, &order));
    }
}
