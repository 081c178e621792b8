use crate::Outcome;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Metrics {
    compiles: Family<OutcomeLabels, Counter>,
    compile_duration: Histogram,
    publish_failures: Counter,
    certificates_issued: Counter,
    certificate_failures: Counter,
    proxies: Gauge,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct OutcomeLabels {
    outcome: &'static str,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let compiles = Family::<OutcomeLabels, Counter>::default();
        reg.register(
            "compile",
            "Total number of proxy configuration compiles by outcome",
            compiles.clone(),
        );

        let compile_duration = Histogram::new([0.001, 0.01, 0.1, 1.0, 10.0]);
        reg.register_with_unit(
            "compile_duration",
            "Histogram of proxy configuration compile latency",
            Unit::Seconds,
            compile_duration.clone(),
        );

        let publish_failures = Counter::default();
        reg.register(
            "publish_failures",
            "Total number of failed writes to the config store",
            publish_failures.clone(),
        );

        let certificates_issued = Counter::default();
        reg.register(
            "certificate_issued",
            "Total number of proxy certificates issued",
            certificates_issued.clone(),
        );

        let certificate_failures = Counter::default();
        reg.register(
            "certificate_failures",
            "Total number of failed proxy certificate issuances",
            certificate_failures.clone(),
        );

        let proxies = Gauge::default();
        reg.register("proxies", "Number of connected proxies", proxies.clone());

        Self {
            compiles,
            compile_duration,
            publish_failures,
            certificates_issued,
            certificate_failures,
            proxies,
        }
    }

    pub(crate) fn compiled(&self, outcome: &Outcome, elapsed: Duration) {
        let Some(outcome) = outcome.as_label() else {
            return;
        };
        self.compiles.get_or_create(&OutcomeLabels { outcome }).inc();
        self.compile_duration.observe(elapsed.as_secs_f64());
    }

    pub(crate) fn publish_failed(&self) {
        self.publish_failures.inc();
    }

    pub(crate) fn certificate_issued(&self) {
        self.certificates_issued.inc();
    }

    pub(crate) fn certificate_failed(&self) {
        self.certificate_failures.inc();
    }

    pub(crate) fn set_proxies(&self, n: usize) {
        self.proxies.set(i64::try_from(n).unwrap_or(i64::MAX));
    }
}
