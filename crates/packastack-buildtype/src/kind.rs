use packastack_core::{DeliverableKind, KindConfidence};
use packastack_release_metadata::ProjectRelease;

/// Known core OpenStack services, used as the last heuristic fallback
/// before `Unknown` (spec §4.D "Deliverable kind inference").
const CORE_SERVICES: &[&str] = &[
    "nova", "glance", "cinder", "neutron", "keystone", "swift", "heat", "horizon", "barbican",
    "designate", "ironic", "magnum", "manila", "mistral", "murano", "octavia", "sahara", "senlin",
    "trove", "zaqar", "placement", "aodh", "ceilometer", "gnocchi", "panko", "watcher", "vitrage",
    "blazar", "cyborg", "freezer", "karbor", "masakari", "monasca", "searchlight", "solum",
    "tacker", "zun",
];

/// Infers a deliverable's kind, preferring metadata over heuristics
/// (spec §4.D).
pub fn infer_deliverable_kind(
    project: Option<&ProjectRelease>,
    source_package: &str,
    deliverable: &str,
) -> (DeliverableKind, KindConfidence) {
    if let Some(kind_str) = project.and_then(|p| p.r#type.as_deref()) {
        let kind = match kind_str {
            "service" => DeliverableKind::Service,
            "library" => DeliverableKind::Library,
            "client" => DeliverableKind::Client,
            "horizon-plugin" => DeliverableKind::HorizonPlugin,
            "tempest-plugin" => DeliverableKind::TempestPlugin,
            "other" => DeliverableKind::Other,
            _ => DeliverableKind::Other,
        };
        return (kind, KindConfidence::Metadata);
    }

    if deliverable.ends_with("client") || source_package.ends_with("client") {
        return (DeliverableKind::Client, KindConfidence::Heuristic);
    }

    if deliverable.starts_with("oslo.") || deliverable.starts_with("oslo-") {
        return (DeliverableKind::Library, KindConfidence::Heuristic);
    }

    if source_package.starts_with("python-") && !source_package.ends_with("client") {
        return (DeliverableKind::Library, KindConfidence::Heuristic);
    }

    if deliverable.contains("horizon") && deliverable.contains("plugin") {
        return (DeliverableKind::HorizonPlugin, KindConfidence::Heuristic);
    }
    if deliverable.contains("-dashboard") || deliverable.contains("-ui") {
        return (DeliverableKind::HorizonPlugin, KindConfidence::Heuristic);
    }

    if deliverable.contains("tempest") && deliverable.contains("plugin") {
        return (DeliverableKind::TempestPlugin, KindConfidence::Heuristic);
    }

    if CORE_SERVICES.contains(&deliverable) {
        return (DeliverableKind::Service, KindConfidence::Heuristic);
    }

    (DeliverableKind::Unknown, KindConfidence::Default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_type_takes_priority() {
        let project = ProjectRelease {
            launchpad: None,
            release_model: String::new(),
            r#type: Some("library".to_string()),
            releases: vec![],
        };
        let (kind, confidence) = infer_deliverable_kind(Some(&project), "anything", "anything");
        assert_eq!(kind, DeliverableKind::Library);
        assert_eq!(confidence, KindConfidence::Metadata);
    }

    #[test]
    fn client_suffix_heuristic() {
        let (kind, confidence) =
            infer_deliverable_kind(None, "python-novaclient", "python-novaclient");
        assert_eq!(kind, DeliverableKind::Client);
        assert_eq!(confidence, KindConfidence::Heuristic);
    }

    #[test]
    fn oslo_prefix_is_library() {
        let (kind, _) = infer_deliverable_kind(None, "python-oslo.config", "oslo.config");
        assert_eq!(kind, DeliverableKind::Library);
    }

    #[test]
    fn core_service_heuristic() {
        let (kind, confidence) = infer_deliverable_kind(None, "nova", "nova");
        assert_eq!(kind, DeliverableKind::Service);
        assert_eq!(confidence, KindConfidence::Heuristic);
    }

    #[test]
    fn unrecognized_name_is_unknown() {
        let (kind, confidence) = infer_deliverable_kind(None, "mystery-thing", "mystery-thing");
        assert_eq!(kind, DeliverableKind::Unknown);
        assert_eq!(confidence, KindConfidence::Default);
    }
}
