use filterproxy_common::types::LabelFilter;
use prometheus::proto::{Metric, MetricFamily};
use protobuf::RepeatedField;

/// Keeps only the metrics that carry every label of `constraints` with the
/// exact required value.
///
/// Families left without metrics are dropped; the others keep their order,
/// name, help and type.
pub fn filter(families: &[MetricFamily], constraints: &LabelFilter) -> Vec<MetricFamily> {
    families
        .iter()
        .filter_map(|family| filter_family(family, constraints))
        .collect()
}

fn filter_family(family: &MetricFamily, constraints: &LabelFilter) -> Option<MetricFamily> {
    let retained = family
        .get_metric()
        .iter()
        .filter(|metric| matches_filter(metric, constraints))
        .cloned()
        .collect::<Vec<_>>();
    if retained.is_empty() {
        return None;
    }

    let mut filtered = MetricFamily::default();
    filtered.set_name(family.get_name().to_string());
    filtered.set_help(family.get_help().to_string());
    filtered.set_field_type(family.get_field_type());
    filtered.set_metric(RepeatedField::from_vec(retained));
    Some(filtered)
}

fn matches_filter(metric: &Metric, constraints: &LabelFilter) -> bool {
    constraints.iter().all(|(name, required)| {
        metric
            .get_label()
            .iter()
            .any(|label| label.get_name() == name && label.get_value() == required)
    })
}
