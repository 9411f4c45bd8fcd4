//! Backend address strings: `host[:port][@weight]`.

use std::fmt;

use crate::error::{Result, RouterError};
use crate::load_balancer::backend::SELF_ADDR;

/// Separator between entries of a bulk address list.
pub const LIST_SEPARATOR: char = ',';
/// Separator between an address and its weight.
pub const WEIGHT_SEPARATOR: char = '@';

/// A parsed backend address with its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendAddress {
    pub host: String,
    pub weight: f64,
}

impl BackendAddress {
    /// Parse `host[:port][@weight]`. Weight defaults to 1.0 and must be a
    /// positive finite number.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(RouterError::EmptyAddress);
        }

        let (host, weight) = match spec.split_once(WEIGHT_SEPARATOR) {
            Some((host, raw)) => {
                let weight = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|w| w.is_finite() && *w > 0.0)
                    .ok_or_else(|| RouterError::InvalidWeight {
                        address: spec.to_string(),
                        weight: raw.to_string(),
                    })?;
                (host.trim(), weight)
            }
            None => (spec, 1.0),
        };

        if host.is_empty() {
            return Err(RouterError::EmptyAddress);
        }

        Ok(Self {
            host: host.to_string(),
            weight,
        })
    }

    pub fn is_self(&self) -> bool {
        self.host == SELF_ADDR
    }

    /// Pod reference for addresses shaped `<pod>.<service>.<namespace>[:port]`.
    pub fn pod_ref(&self) -> Option<PodRef> {
        let host = self.host.split(':').next()?;
        let mut parts = host.split('.');
        let pod = parts.next()?;
        let _service = parts.next()?;
        let namespace = parts.next()?;
        // dotted IPv4 literals are not pod names
        if pod.is_empty() || namespace.is_empty() || pod.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(PodRef {
            name: pod.to_string(),
            namespace: namespace.to_string(),
        })
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.host, WEIGHT_SEPARATOR, self.weight)
    }
}

/// Name and namespace of the pod behind an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
}

/// Strip the weight suffix, leaving the identity used for duplicate checks.
pub fn host_of(spec: &str) -> &str {
    spec.split(WEIGHT_SEPARATOR).next().unwrap_or(spec).trim()
}

/// Parse a comma separated address list, ignoring stray separators.
pub fn parse_address_list(list: &str) -> Result<Vec<BackendAddress>> {
    list.trim_matches(LIST_SEPARATOR)
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(BackendAddress::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weight_is_one() {
        let a = BackendAddress::parse("10.0.0.1:3306").unwrap();
        assert_eq!(a.host, "10.0.0.1:3306");
        assert_eq!(a.weight, 1.0);
    }

    #[test]
    fn weight_suffix_is_parsed() {
        let a = BackendAddress::parse("self@4.0").unwrap();
        assert!(a.is_self());
        assert_eq!(a.weight, 4.0);
    }

    #[test]
    fn malformed_or_non_positive_weight_is_rejected() {
        for bad in ["a:1@x", "a:1@0", "a:1@-2", "a:1@"] {
            assert!(
                matches!(BackendAddress::parse(bad), Err(RouterError::InvalidWeight { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn empty_address_is_rejected() {
        assert!(matches!(BackendAddress::parse("  "), Err(RouterError::EmptyAddress)));
        assert!(matches!(BackendAddress::parse("@2"), Err(RouterError::EmptyAddress)));
    }

    #[test]
    fn list_tolerates_trailing_separator() {
        let list = parse_address_list("a:3306@1,b:3306@3,").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].weight, 3.0);
        assert!(parse_address_list("").unwrap().is_empty());
    }

    #[test]
    fn pod_ref_from_dns_name() {
        let a = BackendAddress::parse("db-0.db-peer.prod:4000@2").unwrap();
        assert_eq!(
            a.pod_ref(),
            Some(PodRef { name: "db-0".into(), namespace: "prod".into() })
        );
        assert_eq!(BackendAddress::parse("10.1.2.3:4000").unwrap().pod_ref(), None);
        assert_eq!(BackendAddress::parse("localhost:4000").unwrap().pod_ref(), None);
    }

    #[test]
    fn host_of_strips_weight() {
        assert_eq!(host_of("a:3306@7"), "a:3306");
        assert_eq!(host_of("a:3306"), "a:3306");
    }
}
