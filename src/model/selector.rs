use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

/// Label key shared by the deployment pod template and the service selector.
pub static LABEL_APP: &str = "app";

/// The label set identifying the pods of a JsonServer. Deployment selector, pod template and
/// service selector are all built from this map.
pub fn app_labels(name: &str) -> BTreeMap<String, String> {
    [(String::from(LABEL_APP), String::from(name))]
        .into_iter()
        .collect()
}

/// Renders a label selector in the apiserver canonical form, e.g. `app=demo,tier in (a,b)`.
pub fn format_label_selector(selector: &LabelSelector) -> String {
    let mut requirements = selector.match_labels.iter()
        .flatten()
        .map(|(key, value)| (key.as_str(), format!("{key}={value}")))
        .chain(
            selector.match_expressions.iter()
                .flatten()
                .flat_map(|req| format_requirement(req).map(|s| (req.key.as_str(), s)))
        )
        .collect::<Vec<_>>();

    requirements.sort_by(|(a, _), (b, _)| a.cmp(b));

    let formatted = requirements.into_iter()
        .map(|(_, s)| s)
        .collect::<Vec<_>>()
        .join(",");

    if formatted.is_empty() {
        String::from("<none>")
    } else {
        formatted
    }
}

fn format_requirement(req: &LabelSelectorRequirement) -> Option<String> {
    let mut values = req.values.clone().unwrap_or_default();
    values.sort();
    match req.operator.as_str() {
        "In" => Some(format!("{} in ({})", req.key, values.join(","))),
        "NotIn" => Some(format!("{} notin ({})", req.key, values.join(","))),
        "Exists" => Some(req.key.clone()),
        "DoesNotExist" => Some(format!("!{}", req.key)),
        other => {
            log::warn!("Skipping label selector requirement with unknown operator {other}");
            None
        }
    }
}
