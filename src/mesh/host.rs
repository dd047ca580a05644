/// Returns true when `host` names the service through one of the accepted forms:
/// `<service>`, `<service>.<namespace>`, `<service>.<namespace>.svc` or
/// `<service>.<namespace>.<identity_domain>`.
///
/// Comparison is exact and case-sensitive; wildcards are not expanded.
pub fn host_matches(host: &str, service: &str, namespace: &str, identity_domain: &str) -> bool {
    let Some(rest) = host.strip_prefix(service) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }

    let Some(rest) = rest
        .strip_prefix('.')
        .and_then(|rest| rest.strip_prefix(namespace))
    else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }

    match rest.strip_prefix('.') {
        Some(suffix) => suffix == "svc" || suffix == identity_domain,
        None => false,
    }
}
