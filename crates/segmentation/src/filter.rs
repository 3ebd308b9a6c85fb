//! Filter specification and evaluation over the enriched base table.

use crate::bands::{BandAssignment, BandClassifier, PerformanceBand};
use chrono::NaiveDate;
use influencer_analytics::{Dataset, EnrichedRecord};
use influencer_core::{Dimension, FilterWarning, PayoutBasis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Immutable conjunction of predicates. A `None` predicate is unrestricted;
/// a present set matches any of its values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    date_from: Option<NaiveDate>,
    #[serde(default)]
    date_to: Option<NaiveDate>,
    #[serde(default)]
    campaigns: Option<BTreeSet<String>>,
    #[serde(default)]
    platforms: Option<BTreeSet<String>>,
    #[serde(default)]
    categories: Option<BTreeSet<String>>,
    #[serde(default)]
    genders: Option<BTreeSet<String>>,
    #[serde(default)]
    influencers: Option<BTreeSet<String>>,
    #[serde(default)]
    bases: Option<BTreeSet<PayoutBasis>>,
    #[serde(default)]
    bands: Option<BTreeSet<PerformanceBand>>,
}

fn to_set<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive on both ends; either end may be open.
    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_campaigns<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.campaigns = Some(to_set(values));
        self
    }

    pub fn with_platforms<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.platforms = Some(to_set(values));
        self
    }

    pub fn with_categories<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.categories = Some(to_set(values));
        self
    }

    pub fn with_genders<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.genders = Some(to_set(values));
        self
    }

    pub fn with_influencers<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        values: I,
    ) -> Self {
        self.influencers = Some(to_set(values));
        self
    }

    pub fn with_bases<I: IntoIterator<Item = PayoutBasis>>(mut self, values: I) -> Self {
        self.bases = Some(values.into_iter().collect());
        self
    }

    pub fn with_bands<I: IntoIterator<Item = PerformanceBand>>(mut self, values: I) -> Self {
        self.bands = Some(values.into_iter().collect());
        self
    }

    pub fn date_range(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        (self.date_from, self.date_to)
    }

    pub fn bands(&self) -> Option<&BTreeSet<PerformanceBand>> {
        self.bands.as_ref()
    }

    /// Selected values of a categorical dimension, if restricted.
    pub fn values(&self, dimension: Dimension) -> Option<&BTreeSet<String>> {
        match dimension {
            Dimension::Campaign => self.campaigns.as_ref(),
            Dimension::Platform => self.platforms.as_ref(),
            Dimension::Category => self.categories.as_ref(),
            Dimension::Gender => self.genders.as_ref(),
            Dimension::Influencer => self.influencers.as_ref(),
            Dimension::Basis => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == FilterSpec::default()
    }

    /// The same spec without its band predicate.
    pub fn without_bands(&self) -> Self {
        Self {
            bands: None,
            ..self.clone()
        }
    }

    fn text_predicates(&self) -> impl Iterator<Item = (Dimension, &BTreeSet<String>)> {
        Dimension::ALL
            .into_iter()
            .filter_map(move |d| self.values(d).map(|set| (d, set)))
    }

    /// Every predicate except the band predicate.
    fn matches_record(&self, record: &EnrichedRecord) -> bool {
        let row = &record.record;
        if self.date_from.is_some_and(|from| row.date < from)
            || self.date_to.is_some_and(|to| row.date > to)
        {
            return false;
        }
        if self.bases.as_ref().is_some_and(|set| !set.contains(&row.basis)) {
            return false;
        }
        self.text_predicates()
            .all(|(dimension, set)| set.contains(row.dimension_str(dimension)))
    }

    fn matches_band(&self, record: &EnrichedRecord, assignment: &BandAssignment) -> bool {
        self.bands
            .as_ref()
            .map_or(true, |set| set.contains(&assignment.band_of(record)))
    }
}

/// Records surviving a filter, borrowed from the base table.
#[derive(Debug, Clone, Default)]
pub struct FilteredView<'a> {
    records: Vec<&'a EnrichedRecord>,
    warnings: Vec<FilterWarning>,
}

impl<'a> FilteredView<'a> {
    /// Unfiltered view over a population.
    pub fn of(records: Vec<&'a EnrichedRecord>) -> Self {
        Self {
            records,
            warnings: Vec::new(),
        }
    }

    pub fn records(&self) -> &[&'a EnrichedRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a EnrichedRecord> + '_ {
        self.records.iter().copied()
    }

    pub fn warnings(&self) -> &[FilterWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A filtered view together with the bands computed over its context.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    pub view: FilteredView<'a>,
    pub bands: BandAssignment,
}

/// Evaluates [`FilterSpec`]s without touching the records they filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEngine;

impl FilterEngine {
    pub fn new() -> Self {
        Self
    }

    /// Keep the records satisfying every predicate of `spec`. The band
    /// predicate is evaluated against the supplied assignment.
    pub fn apply<'a>(
        &self,
        records: &[&'a EnrichedRecord],
        spec: &FilterSpec,
        bands: &BandAssignment,
    ) -> FilteredView<'a> {
        let warnings = conflicts(records, spec);
        for warning in &warnings {
            warn!(dimension = %warning.dimension, value = %warning.value, "Filter value absent from data");
        }
        if !warnings.is_empty() {
            metrics::counter!("segmentation.filter_conflicts").increment(warnings.len() as u64);
        }

        let kept: Vec<&'a EnrichedRecord> = records
            .iter()
            .copied()
            .filter(|r| spec.matches_record(r) && spec.matches_band(r, bands))
            .collect();

        debug!(input = records.len(), kept = kept.len(), "Filter applied");

        FilteredView {
            records: kept,
            warnings,
        }
    }

    /// Full selection pass: filter on everything but bands, classify bands
    /// over that context, then apply the band predicate.
    pub fn select<'a>(
        &self,
        dataset: &'a Dataset,
        spec: &FilterSpec,
        classifier: &BandClassifier,
    ) -> Selection<'a> {
        let config = classifier.config();
        let unbanded = BandAssignment::empty(config.key, config.metric);
        let context = self.apply(&dataset.population(), &spec.without_bands(), &unbanded);
        let bands = classifier.classify(context.records());

        let view = match spec.bands() {
            None => context,
            Some(selected) => {
                let band_only = FilterSpec::new().with_bands(selected.iter().copied());
                let mut banded = self.apply(context.records(), &band_only, &bands);
                banded.warnings = context.warnings;
                banded
            }
        };

        Selection { view, bands }
    }
}

/// Selected values that do not occur in the records for their dimension.
fn conflicts(records: &[&EnrichedRecord], spec: &FilterSpec) -> Vec<FilterWarning> {
    let mut warnings = Vec::new();
    for (dimension, selected) in spec.text_predicates() {
        let present: HashSet<&str> = records
            .iter()
            .map(|r| r.record.dimension_str(dimension))
            .collect();
        warnings.extend(
            selected
                .iter()
                .filter(|v| !present.contains(v.as_str()))
                .map(|v| FilterWarning {
                    dimension: dimension.to_string(),
                    value: v.clone(),
                }),
        );
    }
    if let Some(bases) = &spec.bases {
        let present: HashSet<PayoutBasis> = records.iter().map(|r| r.record.basis).collect();
        warnings.extend(
            bases
                .iter()
                .filter(|b| !present.contains(b))
                .map(|b| FilterWarning {
                    dimension: Dimension::Basis.to_string(),
                    value: b.to_string(),
                }),
        );
    }
    warnings
}
