use std::collections::BTreeMap;

use study_core::errors::{ErrorInfo, StudyError};
use study_core::modification::{EQUATIONS_PROPERTY, MECHANISM_PROPERTIES};
use study_core::{
    Combine, ModValue, Model, ModelModifier, Modification, ModificationSet, VariantId,
    VariationRow, VariationSpec,
};

use crate::tags::tag_name;

/// One entry of the expanded variant list.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedVariant {
    /// 1-based position in the expansion.
    pub id: VariantId,
    /// Modifications defining the variant.
    pub modifications: ModificationSet,
    /// True when the set edits mechanism composition or equations.
    pub structural: bool,
}

fn row_error(code: &str, message: &str, row: &VariationRow, index: usize) -> StudyError {
    StudyError::Config(
        ErrorInfo::new(code, message)
            .with_context("row", index.to_string())
            .with_context("target", row.target.clone())
            .with_context("property", row.property.clone()),
    )
}

/// Expands a variation table into ordered modification sets.
///
/// Rows are validated against `model` first; an empty table yields a single
/// empty set. The expansion is a pure function of its inputs, so positional
/// identifiers are stable across runs.
pub fn expand_variants(
    model: &Model,
    spec: &VariationSpec,
    modifier: &dyn ModelModifier,
) -> Result<Vec<ExpandedVariant>, StudyError> {
    for (index, row) in spec.rows.iter().enumerate() {
        validate_row(model, row, index, modifier)?;
    }
    check_tag_collisions(&spec.rows)?;
    let sets = match spec.combine {
        _ if spec.rows.is_empty() => vec![ModificationSet::empty()],
        Combine::Cross => {
            let mut out = Vec::new();
            expand_cross(&spec.rows, 0, ModificationSet::empty(), &mut out);
            out
        }
        Combine::Zip => expand_zip(&spec.rows)?,
    };
    Ok(sets
        .into_iter()
        .enumerate()
        .map(|(idx, modifications)| ExpandedVariant {
            id: idx as VariantId + 1,
            structural: modifications.is_structural(),
            modifications,
        })
        .collect())
}

fn validate_row(
    model: &Model,
    row: &VariationRow,
    index: usize,
    modifier: &dyn ModelModifier,
) -> Result<(), StudyError> {
    if row.values.is_empty() {
        return Err(row_error("vary_empty_row", "variation row has no values", row, index));
    }
    modifier
        .check_target(model, &row.target, &row.property)
        .map_err(|err| {
            let info = err.info().clone().with_context("row", index.to_string());
            StudyError::Config(info.with_hint("variation rows must address existing fields"))
        })?;
    let property = row.property.as_str();
    for value in &row.values {
        let kind_ok = match value {
            ModValue::Number(_) => !row.is_structural(),
            ModValue::Names(_) => MECHANISM_PROPERTIES.contains(&property),
            ModValue::Equations(_) => property == EQUATIONS_PROPERTY,
        };
        if !kind_ok {
            return Err(row_error(
                "vary_value_kind",
                "value kind does not match the varied property",
                row,
                index,
            ));
        }
        if !value.is_finite() {
            return Err(row_error(
                "vary_non_finite",
                "candidate values must be finite",
                row,
                index,
            ));
        }
    }
    Ok(())
}

// Distinct fields must keep distinct tags, or one value would shadow the
// other in every result record.
fn check_tag_collisions(rows: &[VariationRow]) -> Result<(), StudyError> {
    let mut seen: BTreeMap<String, (&str, &str)> = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        let field = (row.target.as_str(), row.property.as_str());
        let tag = tag_name(field.0, field.1);
        let Some(&(target, property)) = seen.get(&tag) else {
            seen.insert(tag, field);
            continue;
        };
        if (target, property) != field {
            return Err(StudyError::Config(
                ErrorInfo::new("vary_tag_collision", "two varied fields share a tag name")
                    .with_context("tag", tag)
                    .with_context("row", index.to_string())
                    .with_context("field", format!("{}.{}", row.target, row.property))
                    .with_context("other_field", format!("{target}.{property}"))
                    .with_hint("rename one of the parameters"),
            ));
        }
    }
    Ok(())
}

fn expand_cross(
    rows: &[VariationRow],
    idx: usize,
    current: ModificationSet,
    outputs: &mut Vec<ModificationSet>,
) {
    if idx == rows.len() {
        outputs.push(current);
        return;
    }
    let row = &rows[idx];
    for value in &row.values {
        let mut next = current.clone();
        next.push(Modification::new(row.target.clone(), row.property.clone(), value.clone()));
        expand_cross(rows, idx + 1, next, outputs);
    }
}

fn expand_zip(rows: &[VariationRow]) -> Result<Vec<ModificationSet>, StudyError> {
    let len = rows[0].values.len();
    if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.values.len() != len) {
        return Err(StudyError::Config(
            ErrorInfo::new("vary_zip_length", "zipped rows must have equal lengths")
                .with_context("row", index.to_string())
                .with_context("expected", len.to_string())
                .with_context("found", row.values.len().to_string()),
        ));
    }
    Ok((0..len)
        .map(|i| {
            rows.iter()
                .map(|row| Modification::new(row.target.clone(), row.property.clone(), row.values[i].clone()))
                .collect()
        })
        .collect())
}
