use shared::metrics_defs::{MetricDef, MetricType};

pub const RELAY_REQUESTS: MetricDef = MetricDef {
    name: "relay.requests",
    metric_type: MetricType::Counter,
    description: "Relayed requests. Tagged with outcome.",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "relay.upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Seconds until upstream response headers arrive.",
};

pub const UPSTREAM_FAILURES: MetricDef = MetricDef {
    name: "relay.upstream.failures",
    metric_type: MetricType::Counter,
    description: "Upstream transport failures. Tagged with target.",
};

pub const ALL_METRICS: &[MetricDef] = &[RELAY_REQUESTS, UPSTREAM_DURATION, UPSTREAM_FAILURES];
