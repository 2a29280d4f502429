//! Observability for the circle service: Prometheus metrics and their helpers.

pub mod metrics;
