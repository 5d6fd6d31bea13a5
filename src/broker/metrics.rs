use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters describing the broker's order flow.
pub struct BrokerMetrics {
    registry: Registry,
    orders_placed: IntCounterVec,
    orders_dispatched: IntCounterVec,
    trades_executed: IntCounter,
    processor_failures: IntCounter,
}

impl BrokerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounterVec::new(
            Opts::new("broker_orders_placed_total", "Orders accepted by the broker"),
            &["kind"],
        )?;
        let orders_dispatched = IntCounterVec::new(
            Opts::new(
                "broker_orders_dispatched_total",
                "Orders released by an order queue",
            ),
            &["queue"],
        )?;
        let trades_executed = IntCounter::new(
            "broker_trades_executed_total",
            "Market orders executed and reflected in an account",
        )?;
        let processor_failures = IntCounter::new(
            "broker_processor_failures_total",
            "Dispatched orders whose execution or account update failed",
        )?;

        registry.register(Box::new(orders_placed.clone()))?;
        registry.register(Box::new(orders_dispatched.clone()))?;
        registry.register(Box::new(trades_executed.clone()))?;
        registry.register(Box::new(processor_failures.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            orders_dispatched,
            trades_executed,
            processor_failures,
        })
    }

    pub fn order_placed(&self, kind: &str) {
        self.orders_placed.with_label_values(&[kind]).inc();
    }

    pub fn order_dispatched(&self, queue: &str) {
        self.orders_dispatched.with_label_values(&[queue]).inc();
    }

    pub fn trade_executed(&self) {
        self.trades_executed.inc();
    }

    pub fn processor_failed(&self) {
        self.processor_failures.inc();
    }

    pub fn placed(&self, kind: &str) -> u64 {
        self.orders_placed.with_label_values(&[kind]).get()
    }

    pub fn dispatched(&self, queue: &str) -> u64 {
        self.orders_dispatched.with_label_values(&[queue]).get()
    }

    pub fn trades(&self) -> u64 {
        self.trades_executed.get()
    }

    pub fn failures(&self) -> u64 {
        self.processor_failures.get()
    }

    /// Prometheus text exposition of every counter.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
