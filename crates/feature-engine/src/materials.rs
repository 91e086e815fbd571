//! Material Addition Features
//!
//! Grouped statistics per catalogued material plus the first and last
//! material added to each melt.

use crate::aggregator::{before_melt_end, group_by_melt, melt_end_join, output_table, Aggregator, MELT_END};
use crate::error::FeatureError;
use crate::schema::{FeatureColumn, SemanticType};
use crate::statistics::Summary;
use tabular::{Join, Mode, Query, SourceTable, Table, Value};
use tracing::debug;

const MATERIAL: &str = "NMSYP";
const QUANTITY: &str = "VSSYP";
const ADDED_AT: &str = "DAT_OTD";

/// Catalogued additive: column prefix and material label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub prefix: &'static str,
    pub label: &'static str,
}

/// Default material catalogue
pub const MATERIAL_CATALOGUE: &[Material] = &[
    Material { prefix: "ugol", label: "Уголь ТО" },
    Material { prefix: "flumag", label: "ФЛЮМАГ" },
    Material { prefix: "uzvcoi", label: "изв_ЦОИ" },
    Material { prefix: "flusfomi", label: "Флюс ФОМИ" },
];

/// Aggregator over bulk material additions
pub struct MaterialAggregator {
    materials: Vec<Material>,
    schema: Vec<FeatureColumn>,
}

impl MaterialAggregator {
    pub fn new(materials: &[Material]) -> Self {
        let mut schema = Vec::with_capacity(materials.len() * 4 + 2);
        for m in materials {
            schema.push(FeatureColumn::new(format!("{}_cnt", m.prefix), SemanticType::Integer));
            schema.push(FeatureColumn::new(format!("{}_sum", m.prefix), SemanticType::Float));
            schema.push(FeatureColumn::new(format!("{}_avg", m.prefix), SemanticType::Float));
            schema.push(FeatureColumn::new(format!("{}_std", m.prefix), SemanticType::Float));
        }
        schema.push(FeatureColumn::new("first_sip", SemanticType::Categorical));
        schema.push(FeatureColumn::new("last_sip", SemanticType::Categorical));
        Self {
            materials: materials.to_vec(),
            schema,
        }
    }
}

impl Default for MaterialAggregator {
    fn default() -> Self {
        Self::new(MATERIAL_CATALOGUE)
    }
}

impl Aggregator for MaterialAggregator {
    fn name(&self) -> &'static str {
        "materials"
    }

    fn schema(&self) -> &[FeatureColumn] {
        &self.schema
    }

    fn query(&self, mode: Mode) -> Query {
        Query::target(mode)
            .join(Join::left(SourceTable::Sip, &[ADDED_AT, MATERIAL, QUANTITY]))
            .join(melt_end_join())
            .sorted()
    }

    fn aggregate(&self, source: &Table) -> Result<Table, FeatureError> {
        let material = source.index_of(MATERIAL)?;
        let quantity = source.index_of(QUANTITY)?;
        let added_at = source.index_of(ADDED_AT)?;
        let melt_end = source.index_of(MELT_END)?;

        let mut out = output_table(&self.schema);

        for (melt, rows) in group_by_melt(source)? {
            let additions: Vec<&[Value]> = rows
                .into_iter()
                .filter(|row| before_melt_end(&row[added_at], &row[melt_end]))
                .collect();

            let mut row = Vec::with_capacity(self.schema.len() + 1);
            row.push(Value::Int(melt));

            for m in &self.materials {
                let quantities: Vec<f64> = additions
                    .iter()
                    .filter(|a| a[material].as_str() == Some(m.label))
                    .filter_map(|a| a[quantity].as_f64())
                    .collect();
                let stats = Summary::compute(&quantities);
                row.push(Value::Int(stats.count as i64));
                row.push(Value::Float(stats.sum));
                row.push(Value::Float(stats.mean.unwrap_or(0.0)));
                row.push(Value::Float(stats.std_dev.unwrap_or(0.0)));
            }

            // Same-time additions are ordered by material name
            let order = |a: &&[Value], b: &&[Value]| {
                (a[added_at].as_timestamp(), a[material].as_str())
                    .cmp(&(b[added_at].as_timestamp(), b[material].as_str()))
            };
            let first = additions
                .iter()
                .copied()
                .min_by(order)
                .map_or(Value::Null, |a| a[material].clone());
            let last = additions
                .iter()
                .copied()
                .max_by(order)
                .map_or(Value::Null, |a| a[material].clone());
            row.push(first);
            row.push(last);

            out.push_row(row)?;
        }

        debug!("Material features for {} melts", out.len());
        Ok(out)
    }
}
