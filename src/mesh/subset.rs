use crate::domain::MatchSettings;
use crate::mesh::host::host_matches;
use crate::mesh::object::ConfigObject;

/// Names of the subsets, across all matching destination rules, whose version label equals
/// `version`.
///
/// Each rule's host is matched against the rule's own namespace. Results follow document
/// order and are not deduplicated: a name repeated in the input appears repeatedly here.
pub fn subsets_for_version(
    destination_rules: &[ConfigObject],
    service: &str,
    version: &str,
    settings: &MatchSettings,
) -> Vec<String> {
    destination_rules
        .iter()
        .filter_map(|rule| rule.as_destination_rule().map(|spec| (rule.namespace(), spec)))
        .filter(|(namespace, spec)| {
            spec.host
                .as_deref()
                .is_some_and(|host| host_matches(host, service, namespace, &settings.identity_domain))
        })
        .flat_map(|(_, spec)| spec.subsets.iter())
        .filter(|subset| subset.label(&settings.version_label) == Some(version))
        .filter_map(|subset| subset.name.clone())
        .collect()
}
