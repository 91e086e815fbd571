//! Feature Assembly
//!
//! Runs every aggregator against the query service and left-joins the
//! results onto the target melts. `fit` fixes the feature schema on a small
//! train sample; `transform` builds full tables against that schema.

use crate::aggregator::Aggregator;
use crate::error::FeatureError;
use crate::events::EventAggregator;
use crate::features::{FeatureTable, TARGET_COLUMNS};
use crate::gas::{GasAggregator, GasWindowAggregator, WindowSpec, GAS_CHANNELS};
use crate::materials::MaterialAggregator;
use crate::schema::{validate, AggregatorSchema, FittedSchema};
use crate::static_attrs::StaticJoiner;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tabular::{ColumnType, Mode, Query, QueryService, Table, Trailing, Value, MELT_ID};
use tracing::{debug, info};

/// Feature assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Target melts sampled by `fit`
    pub fit_sample_rows: usize,
    /// Melts dropped from train output
    pub exclude_melts: Vec<i64>,
    /// Add per-channel min/max to the raw gas features
    pub gas_extrema: bool,
    /// Operation window for the windowed gas features
    pub blow_window: WindowSpec,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fit_sample_rows: 500,
            exclude_melts: vec![511135],
            gas_extrema: false,
            blow_window: WindowSpec::default(),
        }
    }
}

/// Fit/transform orchestrator over a set of aggregators
pub struct FeatureAssembler<S: QueryService> {
    service: S,
    aggregators: Vec<Box<dyn Aggregator>>,
    config: FeatureConfig,
    fitted: Option<FittedSchema>,
}

impl<S: QueryService> FeatureAssembler<S> {
    /// Assembler with no aggregators
    pub fn new(service: S, config: FeatureConfig) -> Self {
        Self {
            service,
            aggregators: Vec::new(),
            config,
            fitted: None,
        }
    }

    /// Assembler with the standard aggregator set
    pub fn from_config(service: S, config: FeatureConfig) -> Self {
        let gas = GasAggregator::new(GAS_CHANNELS, config.gas_extrema);
        let window = GasWindowAggregator::new(config.blow_window.clone());
        Self::new(service, config)
            .with_aggregator(StaticJoiner::default())
            .with_aggregator(EventAggregator::default())
            .with_aggregator(MaterialAggregator::default())
            .with_aggregator(gas)
            .with_aggregator(window)
    }

    /// Append an aggregator; any previous fit is discarded
    pub fn with_aggregator<A: Aggregator + 'static>(mut self, aggregator: A) -> Self {
        self.aggregators.push(Box::new(aggregator));
        self.fitted = None;
        self
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Schema of the last successful fit
    pub fn fitted(&self) -> Option<&FittedSchema> {
        self.fitted.as_ref()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Establish the feature schema from a train sample
    pub async fn fit(&mut self) -> Result<&FittedSchema, FeatureError> {
        info!(
            "Fitting feature schema on {} train melts across {} aggregators",
            self.config.fit_sample_rows,
            self.aggregators.len()
        );

        let mut seen: HashSet<&str> = [MELT_ID, TARGET_COLUMNS[0], TARGET_COLUMNS[1]]
            .into_iter()
            .collect();
        for agg in &self.aggregators {
            for col in agg.schema() {
                if !seen.insert(col.name.as_str()) {
                    return Err(FeatureError::ColumnConflict {
                        aggregator: agg.name().to_string(),
                        column: col.name.clone(),
                    });
                }
            }
        }

        let sample = Trailing::limit(self.config.fit_sample_rows);
        let mut schemas = Vec::with_capacity(self.aggregators.len());
        for agg in &self.aggregators {
            let source = self
                .service
                .execute(&agg.query(Mode::Train).trailing(sample))
                .await?;
            let output = agg.aggregate(&source)?;
            validate(agg.name(), agg.schema(), &output)?;
            debug!(
                "Aggregator {} validated on {} sampled melts",
                agg.name(),
                output.len()
            );
            schemas.push(AggregatorSchema::from_declared(agg.name(), agg.schema()));
        }

        let fitted = FittedSchema::new(schemas);
        info!(
            "Fitted {} feature columns ({} categorical)",
            fitted.feature_columns.len(),
            fitted.categorical.len()
        );
        Ok(self.fitted.insert(fitted))
    }

    /// Assemble the feature table for `"train"` or `"test"`
    pub async fn transform(&self, mode: &str) -> Result<FeatureTable, FeatureError> {
        let mode: Mode = mode.parse()?;
        let fitted = self.fitted.as_ref().ok_or(FeatureError::NotFitted)?;

        let base = Query::target(mode)
            .columns(&TARGET_COLUMNS)
            .trailing(Trailing::for_mode(mode));
        let mut table = self.service.execute(&base).await?;
        if mode == Mode::Train {
            self.drop_unusable(&mut table)?;
        }
        info!("Assembling {} features for {} melts", mode, table.len());

        for agg in &self.aggregators {
            let source = self
                .service
                .execute(&agg.query(mode).trailing(Trailing::none()))
                .await?;
            let output = agg.aggregate(&source)?;
            table.left_join(&output, MELT_ID)?;
        }

        for name in &fitted.categorical {
            table.set_column_type(name, ColumnType::Categorical)?;
        }
        if let Some(missing) = fitted
            .feature_columns
            .iter()
            .find(|name| !table.has_column(name))
        {
            return Err(FeatureError::SchemaDrift(missing.clone()));
        }

        Ok(FeatureTable::new(
            table,
            fitted.feature_columns.clone(),
            fitted.categorical.clone(),
            mode,
        ))
    }

    /// Drop train melts without both targets, and excluded melts
    fn drop_unusable(&self, table: &mut Table) -> Result<(), FeatureError> {
        let key = table.index_of(MELT_ID)?;
        let tst = table.index_of(TARGET_COLUMNS[0])?;
        let c = table.index_of(TARGET_COLUMNS[1])?;
        let excluded: HashSet<i64> = self.config.exclude_melts.iter().copied().collect();
        let present = |v: &Value| v.as_f64().map_or(false, |x| !x.is_nan());

        let before = table.len();
        table.retain_rows(|row| {
            present(&row[tst])
                && present(&row[c])
                && !row[key].as_i64().map_or(false, |k| excluded.contains(&k))
        });
        debug!("Dropped {} train melts", before - table.len());
        Ok(())
    }
}
