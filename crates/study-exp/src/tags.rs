use std::collections::BTreeMap;

use study_core::{ModValue, ModificationSet};

/// Identifier-safe tag for a `(target, property)` pair.
///
/// Every run of characters outside `[A-Za-z0-9]` collapses into one `_`
/// (so `E->I`, `pop.E` and `w[0]` all become plain identifiers), leading and
/// trailing separators are dropped, and a leading digit gets a `v` prefix.
pub fn tag_name(target: &str, property: &str) -> String {
    let mut out = String::with_capacity(target.len() + property.len() + 1);
    let mut pending_sep = false;
    for ch in target.chars().chain(std::iter::once('.')).chain(property.chars()) {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        return "varied".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'v');
    }
    out
}

/// Varied tag set of a variant: the base modifications overlaid with the
/// variant's own.
///
/// Later edits win whenever two edits map to the same tag, including edits
/// of distinct fields whose names normalize alike (`E.g_Na` and `E_g.Na`).
/// Variation rows with such collisions are rejected at expansion time.
pub fn varied_tags(base: &ModificationSet, variant: &ModificationSet) -> BTreeMap<String, ModValue> {
    base.iter()
        .chain(variant.iter())
        .map(|m| (tag_name(&m.target, &m.property), m.value.clone()))
        .collect()
}
