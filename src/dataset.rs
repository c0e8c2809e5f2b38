//! A shower's flux profile over one time range.
//!
//! [`FluxDataset`] ties a validated [`FluxRequest`] to an [`ObservationSource`]
//! and to the binner. It is immutable after construction, so the raw rows and
//! the bins are each computed at most once and then served from memory.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::aggregation::bin_observations;
use crate::error::{FluxError, FluxResult};
use crate::model::{Bin, FluxRequest, FluxTableRow, Observation, ObservationQuery};

/// Anything that can deliver observation rows for a query.
///
/// Implementations must return rows in strictly ascending time order, one per
/// observation slot with the contributing stations already summed, and only
/// rows whose collecting area exceeds `query.min_row_eca`. No rows is a valid
/// answer.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch_observations(&self, query: &ObservationQuery)
    -> anyhow::Result<Vec<Observation>>;
}

/// Raw rows and flux bins for one [`FluxRequest`].
pub struct FluxDataset {
    request: FluxRequest,
    source: Arc<dyn ObservationSource>,
    observations: OnceCell<Vec<Observation>>,
    bins: OnceCell<Vec<Bin>>,
}

impl FluxDataset {
    /// Validate `request` and bind it to `source`. Nothing is fetched yet.
    pub fn new(request: FluxRequest, source: Arc<dyn ObservationSource>) -> FluxResult<Self> {
        request.validate()?;

        Ok(Self {
            request,
            source,
            observations: OnceCell::new(),
            bins: OnceCell::new(),
        })
    }

    pub fn request(&self) -> &FluxRequest {
        &self.request
    }

    /// Raw observation rows, fetched from the source on first use.
    pub async fn observations(&self) -> FluxResult<&[Observation]> {
        let rows = self
            .observations
            .get_or_try_init(|| async {
                let query = self.request.observation_query();
                let rows = self.source.fetch_observations(&query).await?;
                info!(
                    shower = %query.shower,
                    station = ?query.station_filter,
                    rows = rows.len(),
                    "Observations loaded"
                );
                Ok::<_, FluxError>(rows)
            })
            .await?;

        Ok(rows.as_slice())
    }

    /// Flux bins, computed from [`Self::observations`] on first use.
    pub async fn bins(&self) -> FluxResult<&[Bin]> {
        let bins = self
            .bins
            .get_or_try_init(|| async {
                let rows = self.observations().await?;
                let binning = self.request.binning();
                let bins = bin_observations(rows, &binning, self.request.begin)?;
                debug!(
                    shower = %self.request.shower,
                    mode = ?binning.mode,
                    bins = bins.len(),
                    "Bins computed"
                );
                Ok::<_, FluxError>(bins)
            })
            .await?;

        Ok(bins.as_slice())
    }

    /// Bins with solar longitude and ZHR, using the request's population index.
    pub async fn flux_table(&self) -> FluxResult<Vec<FluxTableRow>> {
        let population_index = self.request.population_index;
        self.bins()
            .await?
            .iter()
            .map(|bin| FluxTableRow::from_bin(bin, population_index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::model::{BinMode, BinningConfig};

    /// In-memory source that records how often and with what it was queried.
    struct RecordingSource {
        rows: Vec<Observation>,
        calls: AtomicUsize,
        last_query: Mutex<Option<ObservationQuery>>,
    }

    impl RecordingSource {
        fn new(rows: Vec<Observation>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                calls: AtomicUsize::new(0),
                last_query: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ObservationSource for RecordingSource {
        async fn fetch_observations(
            &self,
            query: &ObservationQuery,
        ) -> anyhow::Result<Vec<Observation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_query.lock().unwrap() = Some(query.clone());
            Ok(self.rows.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ObservationSource for FailingSource {
        async fn fetch_observations(
            &self,
            _query: &ObservationQuery,
        ) -> anyhow::Result<Vec<Observation>> {
            anyhow::bail!("database unavailable")
        }
    }

    fn begin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2011, 8, 12, 0, 0, 0).unwrap()
    }

    fn request() -> FluxRequest {
        FluxRequest::new("PER", begin(), begin() + Duration::days(2))
    }

    fn hourly_rows(count: i64) -> Vec<Observation> {
        (0..count)
            .map(|i| Observation {
                timestamp: begin() + Duration::hours(i),
                teff: 60.0,
                eca: 2000.0,
                met: 12,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_fetch() {
        let source = RecordingSource::new(vec![]);
        let bad = request().with_binning(BinningConfig {
            max_interval: 0.1,
            ..Default::default()
        });

        let result = FluxDataset::new(bad, source.clone());
        assert!(matches!(result, Err(FluxError::Config(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_observations_are_memoized() {
        let source = RecordingSource::new(hourly_rows(10));
        let dataset = FluxDataset::new(request().with_station("ham01"), source.clone()).unwrap();

        assert_eq!(dataset.observations().await.unwrap().len(), 10);
        assert_eq!(dataset.bins().await.unwrap().len(), 5);
        assert_eq!(dataset.observations().await.unwrap().len(), 10);
        assert_eq!(dataset.bins().await.unwrap().len(), 5);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let query = source.last_query.lock().unwrap().clone().unwrap();
        assert_eq!(query.shower, "PER");
        assert_eq!(query.station_filter.as_deref(), Some("ham01"));
        assert_eq!(query.begin, begin());
    }

    #[tokio::test]
    async fn test_empty_source_gives_empty_bins() {
        let dataset = FluxDataset::new(request(), RecordingSource::new(vec![])).unwrap();

        assert!(dataset.bins().await.unwrap().is_empty());
        assert!(dataset.flux_table().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fixed_mode_anchored_at_request_begin() {
        let mut rows = hourly_rows(6);
        for row in &mut rows {
            row.timestamp += Duration::minutes(10);
        }
        let request = request().with_binning(BinningConfig {
            min_interval: 3.0,
            max_interval: 6.0,
            mode: BinMode::Fixed,
            ..Default::default()
        });
        let dataset = FluxDataset::new(request, RecordingSource::new(rows)).unwrap();

        let bins = dataset.bins().await.unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].center, begin() + Duration::minutes(90));
        assert_eq!(bins[1].center, begin() + Duration::minutes(270));
    }

    #[tokio::test]
    async fn test_flux_table_uses_population_index() {
        let rows = hourly_rows(4);
        let plain = FluxDataset::new(request(), RecordingSource::new(rows.clone())).unwrap();
        let steep = FluxDataset::new(
            request().with_population_index(3.0),
            RecordingSource::new(rows),
        )
        .unwrap();

        let plain = plain.flux_table().await.unwrap();
        let steep = steep.flux_table().await.unwrap();
        assert_eq!(plain.len(), 2);
        assert_eq!(plain[0].flux, steep[0].flux);
        assert!(plain[0].zhr.unwrap() > steep[0].zhr.unwrap());
        assert_eq!(plain[0].teff_hours, 2.0);
        assert_eq!(plain[0].eca_thousands, 4.0);
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let dataset = FluxDataset::new(request(), Arc::new(FailingSource)).unwrap();

        match dataset.bins().await {
            Err(FluxError::Source(e)) => assert!(e.to_string().contains("unavailable")),
            other => panic!("expected source error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unordered_rows_surface_as_input_error() {
        let mut rows = hourly_rows(3);
        rows.swap(0, 2);
        let dataset = FluxDataset::new(request(), RecordingSource::new(rows)).unwrap();

        assert!(matches!(
            dataset.bins().await,
            Err(FluxError::InputOrder { .. })
        ));
    }
}
