//! Pairwise metric correlations and clusters of co-moving metrics

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{HealthTrendError, Result};
use crate::models::Metric;
use crate::series::MetricSeries;
use crate::stats;

/// Correlation tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Pairs with fewer shared dates are left out of the matrix
    pub min_joint_observations: usize,

    /// Minimum |r| for two metrics to be linked in a cluster
    pub cluster_threshold: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        CorrelationConfig {
            min_joint_observations: 3,
            cluster_threshold: 0.6,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_joint_observations < 2 {
            return Err(HealthTrendError::invalid_argument(
                "min_joint_observations must be at least 2",
            ));
        }
        if !(self.cluster_threshold > 0.0 && self.cluster_threshold <= 1.0) {
            return Err(HealthTrendError::invalid_argument(
                "cluster_threshold must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Symmetric Pearson-r matrix; pairs without enough data are absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationMatrix {
    values: BTreeMap<Metric, BTreeMap<Metric, f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: Metric, b: Metric) -> Option<f64> {
        self.values.get(&a).and_then(|row| row.get(&b)).copied()
    }

    /// Each unordered pair once, `a < b`
    pub fn pairs(&self) -> impl Iterator<Item = (Metric, Metric, f64)> + '_ {
        self.values.iter().flat_map(|(&a, row)| {
            row.iter()
                .filter(move |(b, _)| a < **b)
                .map(move |(&b, &r)| (a, b, r))
        })
    }

    /// Number of unordered pairs
    pub fn len(&self) -> usize {
        self.pairs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert(&mut self, a: Metric, b: Metric, r: f64) {
        self.values.entry(a).or_default().insert(b, r);
        self.values.entry(b).or_default().insert(a, r);
    }
}

/// Connected group of strongly correlated metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationCluster {
    /// Members in metric order
    pub metrics: Vec<Metric>,
    /// Mean |r| over the strong edges inside the cluster
    pub mean_abs_correlation: f64,
    pub edge_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CorrelationEngine {
    config: CorrelationConfig,
}

impl CorrelationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CorrelationConfig) -> Self {
        CorrelationEngine { config }
    }

    /// Pearson r for every metric pair over the dates both observed
    ///
    /// A gap in one metric never removes observations from another pair.
    pub fn compute_correlation_matrix(
        &self,
        series: &BTreeMap<Metric, MetricSeries>,
    ) -> CorrelationMatrix {
        let metrics: Vec<&MetricSeries> = series.values().collect();
        let pairs: Vec<(usize, usize)> = (0..metrics.len())
            .flat_map(|i| ((i + 1)..metrics.len()).map(move |j| (i, j)))
            .collect();

        let results: Vec<(Metric, Metric, f64)> = pairs
            .par_iter()
            .filter_map(|&(i, j)| {
                let r = self.pair_correlation(metrics[i], metrics[j])?;
                Some((metrics[i].metric, metrics[j].metric, r))
            })
            .collect();

        let mut matrix = CorrelationMatrix::default();
        for (a, b, r) in results {
            matrix.insert(a, b, r);
        }

        debug!(pairs = matrix.len(), "Computed correlation matrix");
        matrix
    }

    /// Connected components over edges with |r| at or above the threshold
    ///
    /// Metrics without a strong edge belong to no cluster. Clusters are
    /// ordered by their first member.
    pub fn derive_clusters(
        &self,
        matrix: &CorrelationMatrix,
        threshold: f64,
    ) -> Vec<CorrelationCluster> {
        let edges: Vec<(Metric, Metric, f64)> = matrix
            .pairs()
            .filter(|(_, _, r)| r.abs() >= threshold)
            .collect();

        let mut parent: BTreeMap<Metric, Metric> = BTreeMap::new();
        for &(a, b, _) in &edges {
            parent.entry(a).or_insert(a);
            parent.entry(b).or_insert(b);
            let root_a = find(&mut parent, a);
            let root_b = find(&mut parent, b);
            if root_a != root_b {
                // smaller metric becomes the root
                let (low, high) = if root_a < root_b { (root_a, root_b) } else { (root_b, root_a) };
                parent.insert(high, low);
            }
        }

        let mut groups: BTreeMap<Metric, CorrelationCluster> = BTreeMap::new();
        let members: Vec<Metric> = parent.keys().copied().collect();
        for metric in members {
            let root = find(&mut parent, metric);
            groups
                .entry(root)
                .or_insert_with(|| CorrelationCluster {
                    metrics: Vec::new(),
                    mean_abs_correlation: 0.0,
                    edge_count: 0,
                })
                .metrics
                .push(metric);
        }

        for (a, _, r) in edges {
            let root = find(&mut parent, a);
            if let Some(cluster) = groups.get_mut(&root) {
                cluster.edge_count += 1;
                cluster.mean_abs_correlation += r.abs();
            }
        }

        groups
            .into_values()
            .map(|mut cluster| {
                if cluster.edge_count > 0 {
                    cluster.mean_abs_correlation /= cluster.edge_count as f64;
                }
                cluster
            })
            .collect()
    }

    /// Clusters at the configured threshold
    pub fn clusters(&self, matrix: &CorrelationMatrix) -> Vec<CorrelationCluster> {
        self.derive_clusters(matrix, self.config.cluster_threshold)
    }

    fn pair_correlation(&self, a: &MetricSeries, b: &MetricSeries) -> Option<f64> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = a
            .points
            .iter()
            .filter_map(|p| b.value_on(p.date).map(|other| (p.value, other)))
            .unzip();

        if xs.len() < self.config.min_joint_observations {
            return None;
        }
        stats::pearson(&xs, &ys)
    }
}

fn find(parent: &mut BTreeMap<Metric, Metric>, metric: Metric) -> Metric {
    let mut root = metric;
    while let Some(&next) = parent.get(&root) {
        if next == root {
            break;
        }
        root = next;
    }

    // path compression
    let mut current = metric;
    while current != root {
        let next = parent.get(&current).copied().unwrap_or(root);
        parent.insert(current, root);
        current = next;
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthLogEntry;
    use crate::series::MetricSeriesExtractor;
    use chrono::{Days, NaiveDate};

    fn date(i: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap() + Days::new(i)
    }

    #[test]
    fn test_identical_series_correlate_perfectly() {
        let entries: Vec<HealthLogEntry> = (0..6)
            .map(|x| {
                let v = 2.0 * x as f64 + 1.0;
                HealthLogEntry::new(date(x))
                    .with(Metric::Fatigue, v)
                    .with(Metric::Stiffness, v)
            })
            .collect();

        let series = MetricSeriesExtractor::extract_all(&entries);
        let matrix = CorrelationEngine::new().compute_correlation_matrix(&series);

        let r = matrix.get(Metric::Fatigue, Metric::Stiffness).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        assert_eq!(matrix.get(Metric::Stiffness, Metric::Fatigue), Some(r));
        assert_eq!(matrix.get(Metric::Fatigue, Metric::Fatigue), None);
    }

    #[test]
    fn test_pairwise_complete_observations() {
        // mood is missing on two days; the fatigue/sleep pair still uses all five
        let entries: Vec<HealthLogEntry> = (0..5)
            .map(|x| {
                let mut e = HealthLogEntry::new(date(x))
                    .with(Metric::Fatigue, x as f64)
                    .with(Metric::Sleep, 9.0 - x as f64);
                if x % 2 == 0 {
                    e = e.with(Metric::Mood, 5.0 + x as f64);
                }
                e
            })
            .collect();

        let series = MetricSeriesExtractor::extract_all(&entries);
        let matrix = CorrelationEngine::new().compute_correlation_matrix(&series);

        assert!((matrix.get(Metric::Fatigue, Metric::Sleep).unwrap() + 1.0).abs() < 1e-9);
        assert!(matrix.get(Metric::Fatigue, Metric::Mood).is_some());
    }

    #[test]
    fn test_sparse_and_constant_pairs_are_omitted() {
        let entries: Vec<HealthLogEntry> = (0..4)
            .map(|x| {
                let mut e = HealthLogEntry::new(date(x))
                    .with(Metric::Fatigue, x as f64)
                    .with(Metric::Hydration, 2.0);
                if x < 2 {
                    e = e.with(Metric::Swelling, x as f64);
                }
                e
            })
            .collect();

        let series = MetricSeriesExtractor::extract_all(&entries);
        let matrix = CorrelationEngine::new().compute_correlation_matrix(&series);

        assert_eq!(matrix.get(Metric::Fatigue, Metric::Swelling), None);
        assert_eq!(matrix.get(Metric::Fatigue, Metric::Hydration), None);
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_clusters_are_connected_components() {
        let mut matrix = CorrelationMatrix::default();
        matrix.insert(Metric::Fatigue, Metric::Stiffness, 0.8);
        matrix.insert(Metric::Stiffness, Metric::BackPain, 0.7);
        matrix.insert(Metric::Fatigue, Metric::BackPain, 0.2);
        matrix.insert(Metric::Sleep, Metric::Mood, -0.9);
        matrix.insert(Metric::Steps, Metric::Mood, 0.3);

        let clusters = CorrelationEngine::new().derive_clusters(&matrix, 0.6);

        assert_eq!(clusters.len(), 2);
        assert_eq!(
            clusters[0].metrics,
            vec![Metric::Fatigue, Metric::Stiffness, Metric::BackPain]
        );
        assert_eq!(clusters[0].edge_count, 2);
        assert!((clusters[0].mean_abs_correlation - 0.75).abs() < 1e-12);
        assert_eq!(clusters[1].metrics, vec![Metric::Sleep, Metric::Mood]);
        assert!(clusters
            .iter()
            .all(|c| !c.metrics.contains(&Metric::Steps)));
    }

    #[test]
    fn test_matrix_pairs_are_unique() {
        let mut matrix = CorrelationMatrix::default();
        matrix.insert(Metric::Bpm, Metric::Weight, 0.5);
        matrix.insert(Metric::Weight, Metric::Steps, -0.4);
        assert_eq!(matrix.len(), 2);
        assert!(matrix.pairs().all(|(a, b, _)| a < b));
    }
}
