//! Turning pod listings into backend address lists.

use crate::load_balancer::address::{LIST_SEPARATOR, WEIGHT_SEPARATOR};
use crate::load_balancer::backend::SELF_ADDR;
use crate::orchestrator::{PodInfo, PodRole};

/// Convert a CPU request to a weight: `500m` → 0.5, `2` → 2.0.
/// Missing or unparsable requests weigh 1.0.
pub fn cpu_to_weight(request: Option<&str>) -> f64 {
    let Some(raw) = request.map(str::trim).filter(|s| !s.is_empty()) else {
        return 1.0;
    };
    let parsed = match raw.strip_suffix('m') {
        Some(milli) => milli.parse::<f64>().map(|m| m / 1000.0),
        None => raw.parse::<f64>(),
    };
    parsed.ok().filter(|w| w.is_finite() && *w > 0.0).unwrap_or(1.0)
}

/// Stable DNS address of a compute pod.
pub fn pod_address(pod: &PodInfo, namespace: &str, port: u16) -> String {
    format!("{}.{}.{}:{}", pod.name, pod.peer_service, namespace, port)
}

/// Format pods as a bulk address list.
///
/// Compute pods become `<pod>.<peer-service>.<namespace>:<port>@<cpu>`;
/// proxy pods become `self@<proxy_weight>`.
pub fn format_pod_addresses(pods: &[PodInfo], namespace: &str, port: u16, proxy_weight: f64) -> String {
    pods.iter()
        .map(|pod| match pod.role {
            PodRole::Proxy => format!("{SELF_ADDR}{WEIGHT_SEPARATOR}{proxy_weight}"),
            PodRole::Compute => format!(
                "{}{}{}",
                pod_address(pod, namespace, port),
                WEIGHT_SEPARATOR,
                cpu_to_weight(pod.cpu_request.as_deref())
            ),
        })
        .collect::<Vec<_>>()
        .join(&LIST_SEPARATOR.to_string())
}
