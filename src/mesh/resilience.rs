use crate::domain::MatchSettings;
use crate::mesh::host::host_matches;
use crate::mesh::object::ConfigObject;

/// True when the destination rule applies connection-pool or outlier-detection policy to the
/// service, either for the whole service or for the subset labelled with `version`.
pub fn has_circuit_breaker(
    destination_rule: &ConfigObject,
    namespace: &str,
    service: &str,
    version: &str,
    settings: &MatchSettings,
) -> bool {
    let Some(spec) = destination_rule.as_destination_rule() else {
        return false;
    };
    let Some(host) = spec.host.as_deref() else {
        return false;
    };
    if !host_matches(host, service, namespace, &settings.identity_domain) {
        return false;
    }

    if spec
        .traffic_policy
        .as_ref()
        .is_some_and(|policy| policy.is_circuit_breaking())
    {
        return true;
    }
    if version.is_empty() {
        return false;
    }

    spec.subsets.iter().any(|subset| {
        subset
            .traffic_policy
            .as_ref()
            .is_some_and(|policy| policy.is_circuit_breaking())
            && subset.label(&settings.version_label) == Some(version)
    })
}
