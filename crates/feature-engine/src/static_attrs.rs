//! Static Melt Attributes
//!
//! Batch parameters and hot-metal chemistry joined in by melt ID, one row
//! per melt, without aggregation.

use crate::aggregator::{group_by_melt, output_table, Aggregator, MELT_END};
use crate::error::FeatureError;
use crate::schema::{FeatureColumn, SemanticType};
use tabular::{Join, Mode, Query, SourceTable, Table, Value};
use tracing::{debug, warn};

/// Declared batch parameter columns
pub const PLAVKI_COLUMNS: &[(&str, SemanticType)] = &[
    ("PLAVKA_VR_NACH", SemanticType::Temporal),
    ("PLAVKA_VR_KON", SemanticType::Temporal),
    ("PLAVKA_NMZ", SemanticType::Categorical),
    ("PLAVKA_NAPR_ZAD", SemanticType::Categorical),
    ("PLAVKA_STFUT", SemanticType::Integer),
    ("PLAVKA_TIPE_FUR", SemanticType::Categorical),
    ("PLAVKA_ST_FURM", SemanticType::Integer),
    ("PLAVKA_TIPE_GOL", SemanticType::Categorical),
    ("PLAVKA_ST_GOL", SemanticType::Integer),
];

/// Declared hot-metal chemistry columns
pub const CHUGUN_COLUMNS: &[(&str, SemanticType)] = &[
    ("VES", SemanticType::Float),
    ("T", SemanticType::Float),
    ("SI", SemanticType::Float),
    ("MN", SemanticType::Float),
    ("S", SemanticType::Float),
    ("P", SemanticType::Float),
    ("CR", SemanticType::Float),
    ("NI", SemanticType::Float),
    ("CU", SemanticType::Float),
    ("V", SemanticType::Float),
    ("TI", SemanticType::Float),
    ("DATA_ZAMERA", SemanticType::Temporal),
];

/// Joiner for per-melt static attributes
pub struct StaticJoiner {
    plavki: Vec<&'static str>,
    chugun: Vec<&'static str>,
    schema: Vec<FeatureColumn>,
}

impl StaticJoiner {
    pub fn new(
        plavki: &[(&'static str, SemanticType)],
        chugun: &[(&'static str, SemanticType)],
    ) -> Self {
        let schema = plavki
            .iter()
            .chain(chugun.iter())
            .map(|(name, ty)| FeatureColumn::new(*name, *ty))
            .collect();
        Self {
            plavki: plavki.iter().map(|(name, _)| *name).collect(),
            chugun: chugun.iter().map(|(name, _)| *name).collect(),
            schema,
        }
    }
}

impl Default for StaticJoiner {
    fn default() -> Self {
        Self::new(PLAVKI_COLUMNS, CHUGUN_COLUMNS)
    }
}

impl Aggregator for StaticJoiner {
    fn name(&self) -> &'static str {
        "static"
    }

    fn schema(&self) -> &[FeatureColumn] {
        &self.schema
    }

    fn query(&self, mode: Mode) -> Query {
        let keys: &[&str] = if self.plavki.contains(&MELT_END) {
            &[MELT_END]
        } else {
            &[]
        };
        Query::target(mode)
            .join(Join::left(SourceTable::Plavki, &self.plavki).first_by(keys))
            .join(Join::left(SourceTable::Chugun, &self.chugun))
            .sorted()
    }

    fn aggregate(&self, source: &Table) -> Result<Table, FeatureError> {
        let columns = self
            .schema
            .iter()
            .map(|c| source.index_of(&c.name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = output_table(&self.schema);

        for (melt, rows) in group_by_melt(source)? {
            if rows.len() > 1 {
                warn!(
                    "Melt {} has {} static attribute rows, keeping the first",
                    melt,
                    rows.len()
                );
            }
            let Some(first) = rows.first() else {
                continue;
            };
            let mut row = Vec::with_capacity(columns.len() + 1);
            row.push(Value::Int(melt));
            row.extend(columns.iter().map(|&i| first[i].clone()));
            out.push_row(row)?;
        }

        debug!("Static attributes for {} melts", out.len());
        Ok(out)
    }
}
