use study_core::ResultRecord;

/// Collects per-variant outputs into one ordered result list.
///
/// A variant may contribute several records (experiment delegates do). The
/// first contribution fixes the expected shape and the buffer is sized for
/// every remaining variant up front.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    expected_variants: usize,
    per_variant: Option<usize>,
    results: Vec<ResultRecord>,
}

impl ResultAggregator {
    /// Creates an aggregator for `expected_variants` variants.
    pub fn new(expected_variants: usize) -> Self {
        Self {
            expected_variants,
            per_variant: None,
            results: Vec::new(),
        }
    }

    /// Appends the records produced for one variant.
    pub fn push(&mut self, records: Vec<ResultRecord>) {
        if self.per_variant.is_none() {
            let shape = records.len().max(1);
            self.per_variant = Some(shape);
            self.results.reserve(shape * self.expected_variants.max(1));
        }
        self.results.extend(records);
    }

    /// Records per variant observed on the first contribution.
    pub fn shape(&self) -> Option<usize> {
        self.per_variant
    }

    /// Number of records collected so far.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results ordered by variant identifier, stable within a variant.
    pub fn finish(mut self) -> Vec<ResultRecord> {
        self.results.sort_by_key(|r| r.variant_id);
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::{SeriesData, SolverConfig, VariantId};

    fn record(id: VariantId) -> ResultRecord {
        ResultRecord {
            schema_version: Default::default(),
            variant_id: id,
            labels: vec!["time".into()],
            samples: 1,
            series: SeriesData::Memory {
                channels: vec![vec![0.0]],
            },
            solver: SolverConfig::default(),
            model: None,
            varied: Default::default(),
            provenance: Default::default(),
        }
    }

    #[test]
    fn reserves_from_first_shape_and_orders_by_variant() {
        let mut agg = ResultAggregator::new(3);
        agg.push(vec![record(2), record(2)]);
        assert_eq!(agg.shape(), Some(2));
        assert!(agg.results.capacity() >= 6);
        agg.push(vec![record(1), record(1)]);
        agg.push(vec![record(3), record(3)]);
        let ids: Vec<VariantId> = agg.finish().iter().map(|r| r.variant_id).collect();
        assert_eq!(ids, vec![1, 1, 2, 2, 3, 3]);
    }
}
