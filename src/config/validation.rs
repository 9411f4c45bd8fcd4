//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::load_balancer::address::parse_address_list;
use crate::load_balancer::backend::WorkloadClass;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid {class} address list: {reason}")]
    AddressList { class: WorkloadClass, reason: String },

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("discovery.proxy_weight must be a positive number, got {0}")]
    ProxyWeight(f64),
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut positive = |field: &'static str, value: u64| {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    };
    positive("admission.token_limit", config.admission.token_limit as u64);
    positive("cluster.health_check_interval_secs", config.cluster.health_check_interval_secs);
    positive("cluster.connect_timeout_ms", config.cluster.connect_timeout_ms);
    positive("cluster.probe_timeout_secs", config.cluster.probe_timeout_secs);
    positive("cluster.drain_attempts", config.cluster.drain_attempts as u64);
    positive("autoscale.tick_ms", config.autoscale.tick_ms);
    positive("autoscale.quiet_samples", config.autoscale.quiet_samples as u64);
    positive("counter.flush_interval_ms", config.counter.flush_interval_ms);

    for class in WorkloadClass::ALL {
        if let Err(e) = parse_address_list(config.cluster.addresses(class)) {
            errors.push(ValidationError::AddressList {
                class,
                reason: e.to_string(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let proxy_weight = config.discovery.proxy_weight;
    if !(proxy_weight.is_finite() && proxy_weight > 0.0) {
        errors.push(ValidationError::ProxyWeight(proxy_weight));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn bad_address_list_is_reported_per_class() {
        let mut config = RouterConfig::default();
        config.cluster.transactional = "a:4000@0".into();
        config.cluster.analytical = "b:4000@x".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors[0],
            ValidationError::AddressList { class: WorkloadClass::Transactional, .. }
        ));
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = RouterConfig::default();
        config.observability.metrics_address = "nope".into();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MetricsAddress("nope".into())]
        );

        config.observability.metrics_enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
