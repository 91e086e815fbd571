//! Melt Outcome Pipeline
//!
//! Wires the PostgreSQL query service, the feature assembler and the
//! outcome model into the `extract`, `evaluate` and `submit` commands.

pub mod export;
pub mod settings;

pub use settings::{EvaluationConfig, ModelKind, OutputConfig, PipelineConfig};

use anyhow::Context;
use feature_engine::{FeatureAssembler, FeatureTable, FittedSchema};
use melt_model::{
    cross_validate, DualTargetModel, MeanRegressor, ModelError, Regressor, RidgeRegressor, Targets,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tabular::{ColumnType, PgQueryService, PgSettings, QueryService, Table, Value, MELT_ID};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging; `RUST_LOG` takes precedence over `level`
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Open the database pool and check it answers
pub async fn connect(settings: &PgSettings) -> anyhow::Result<PgQueryService> {
    let service = PgQueryService::connect(settings)
        .await
        .with_context(|| format!("connecting to {}:{}/{}", settings.host, settings.port, settings.name))?;
    service.ping().await.context("database ping failed")?;
    Ok(service)
}

/// Persist the fitted schema as `feature_schema.json`
pub fn write_schema(schema: &FittedSchema, dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("feature_schema.json");
    fs::write(&path, serde_json::to_string_pretty(schema)?)?;
    info!("Feature schema written to {}", path.display());
    Ok(path)
}

/// Assemble one mode and write `features_<mode>.csv`
pub async fn extract<S: QueryService>(
    assembler: &FeatureAssembler<S>,
    mode: &str,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let table = assembler.transform(mode).await?;
    let path = dir.join(format!("features_{}.csv", table.mode()));
    export::write_table_file(table.table(), &path)?;
    info!(
        "Wrote {} melts x {} columns to {}",
        table.len(),
        table.table().columns().len(),
        path.display()
    );
    Ok(path)
}

/// Cross-validation outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model: ModelKind,
    pub melts: usize,
    /// Hit rate per fold
    pub folds: Vec<f64>,
    pub mean: f64,
}

fn cross_validate_kind(
    config: &EvaluationConfig,
    features: &Table,
    targets: &Targets,
) -> Result<Vec<f64>, ModelError> {
    match config.model {
        ModelKind::Mean => cross_validate(&MeanRegressor::new(), features, targets, config.folds),
        ModelKind::Ridge => {
            cross_validate(&RidgeRegressor::new(config.alpha), features, targets, config.folds)
        }
    }
}

/// K-fold hit rate of the configured model on the train table
pub async fn evaluate<S: QueryService>(
    assembler: &FeatureAssembler<S>,
    config: &EvaluationConfig,
) -> anyhow::Result<EvaluationReport> {
    let train = assembler.transform("train").await?;
    let targets = Targets::from_table(train.table())?;
    let folds = cross_validate_kind(config, &train.features()?, &targets)?;
    let mean = folds.iter().sum::<f64>() / folds.len() as f64;

    info!("{:?} model: mean hit rate {:.4} over {} folds", config.model, mean, folds.len());
    Ok(EvaluationReport {
        model: config.model,
        melts: train.len(),
        folds,
        mean,
    })
}

fn fit_predict<R: Regressor + Clone>(
    template: R,
    train: &FeatureTable,
    test: &FeatureTable,
) -> Result<Targets, ModelError> {
    let mut model = DualTargetModel::new(template);
    model.fit_table(train)?;
    model.predict(&test.features()?)
}

/// Fit on all train melts, predict the test melts, and write a
/// timestamped `NPLV,TST,C` submission
pub async fn submit<S: QueryService>(
    assembler: &FeatureAssembler<S>,
    config: &EvaluationConfig,
    dir: &Path,
) -> anyhow::Result<PathBuf> {
    let train = assembler.transform("train").await?;
    let test = assembler.transform("test").await?;
    if test.is_empty() {
        warn!("No test melts to predict");
    }

    let predicted = match config.model {
        ModelKind::Mean => fit_predict(MeanRegressor::new(), &train, &test)?,
        ModelKind::Ridge => fit_predict(RidgeRegressor::new(config.alpha), &train, &test)?,
    };

    let mut submission = Table::with_columns(&[
        (MELT_ID, ColumnType::Integer),
        ("TST", ColumnType::Float),
        ("C", ColumnType::Float),
    ]);
    for (i, melt) in test.melt_ids()?.into_iter().enumerate() {
        submission.push_row(vec![
            Value::Int(melt),
            Value::Float(predicted.tst[i]),
            Value::Float(predicted.c[i]),
        ])?;
    }

    let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let path = dir.join("submissions").join(format!("{}.csv", stamp));
    export::write_table_file(&submission, &path)?;
    info!("Submission for {} melts written to {}", submission.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use feature_engine::{EventAggregator, FeatureConfig};
    use std::sync::Arc;
    use tabular::InMemoryService;

    fn service() -> Arc<InMemoryService> {
        let svc = InMemoryService::new();
        let at = |h, m| {
            NaiveDate::from_ymd_opt(2021, 5, 20)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };

        for (target, suffix, melts) in [
            ("target_train", "train", (1..=12).collect::<Vec<i64>>()),
            ("sample_submission", "test", vec![22, 21, 20]),
        ] {
            let mut t = Table::with_columns(&[
                ("NPLV", ColumnType::Integer),
                ("TST", ColumnType::Float),
                ("C", ColumnType::Float),
            ]);
            let mut chronom = Table::with_columns(&[
                ("NPLV", ColumnType::Integer),
                ("NOP", ColumnType::Text),
                ("VR_NACH", ColumnType::Timestamp),
                ("VR_KON", ColumnType::Timestamp),
                ("O2", ColumnType::Float),
            ]);
            let mut plavki = Table::with_columns(&[
                ("NPLV", ColumnType::Integer),
                ("PLAVKA_VR_KON", ColumnType::Timestamp),
            ]);
            for &melt in &melts {
                let labelled = suffix == "train";
                t.push_row(vec![
                    Value::Int(melt),
                    if labelled { Value::Float(1640.0 + melt as f64) } else { Value::Null },
                    if labelled { Value::Float(0.05) } else { Value::Null },
                ])
                .unwrap();
                chronom
                    .push_row(vec![
                        Value::Int(melt),
                        "Продувка".into(),
                        at(10, 0).into(),
                        at(10, (melt % 30) as u32 + 1).into(),
                        Value::Float(8000.0 + melt as f64),
                    ])
                    .unwrap();
                plavki.push_row(vec![Value::Int(melt), at(11, 0).into()]).unwrap();
            }
            svc.register(target, t).unwrap();
            svc.register(&format!("chronom_{}", suffix), chronom).unwrap();
            svc.register(&format!("plavki_{}", suffix), plavki).unwrap();
        }
        Arc::new(svc)
    }

    async fn fitted() -> FeatureAssembler<Arc<InMemoryService>> {
        let mut assembler = FeatureAssembler::new(service(), FeatureConfig::default())
            .with_aggregator(EventAggregator::default());
        assembler.fit().await.unwrap();
        assembler
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("melt-pipeline-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_extract_writes_feature_csv() {
        let assembler = fitted().await;
        let dir = scratch("extract");

        let path = extract(&assembler, "test", &dir).await.unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert!(path.ends_with("features_test.csv"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("NPLV,TST,C,sum_O2,"));
        assert!(lines[1].starts_with("20,,,8020,"));
    }

    #[tokio::test]
    async fn test_evaluate_reports_every_fold() {
        let assembler = fitted().await;
        let config = EvaluationConfig {
            folds: 4,
            model: ModelKind::Mean,
            alpha: 1.0,
        };

        let report = evaluate(&assembler, &config).await.unwrap();

        assert_eq!(report.melts, 12);
        assert_eq!(report.folds.len(), 4);
        assert!((0.0..=1.0).contains(&report.mean));
    }

    #[tokio::test]
    async fn test_submit_orders_by_melt() {
        let assembler = fitted().await;
        let dir = scratch("submit");

        let path = submit(&assembler, &EvaluationConfig::default(), &dir).await.unwrap();
        let text = fs::read_to_string(&path).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        let ids: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["20", "21", "22"]);
        assert!(text.starts_with("NPLV,TST,C\n"));
    }

    #[tokio::test]
    async fn test_schema_file() {
        let assembler = fitted().await;
        let dir = scratch("schema");

        let path = write_schema(assembler.fitted().unwrap(), &dir).unwrap();
        let schema: FittedSchema = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert_eq!(schema.aggregators[0].aggregator, "events");
        assert!(schema.feature_columns.contains(&"produv_total_sec".to_string()));
    }
}
