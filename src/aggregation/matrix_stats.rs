//! matrix_stats: per-field moments with covariance and correlation rows.
//!
//! Shares [`StreamingStats`] and the state lifecycle with PCA; only the
//! finalize step and the rendered shape differ.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::MatrixStrategy;
use crate::error::Result;
use crate::kernel::{Readable, StreamInput, StreamOutput, StreamingStats, Writeable};

/// Summary of one field. Undefined statistics (too few observations, zero
/// variance) are `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub name: String,
    pub count: u64,
    pub mean: f64,
    pub variance: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub covariance: BTreeMap<String, f64>,
    pub correlation: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixStatsResult {
    fields: Vec<FieldSummary>,
}

impl MatrixStatsResult {
    pub fn compute(stats: &StreamingStats) -> Self {
        let names: Vec<&str> = stats.field_names().collect();
        let fields = stats
            .fields()
            .map(|(name, m)| {
                let mut covariance = BTreeMap::new();
                let mut correlation = BTreeMap::new();
                for &other in &names {
                    if let Some(c) = stats.covariance(name, other) {
                        covariance.insert(other.to_string(), c);
                    }
                    if let Some(r) = stats.correlation(name, other) {
                        correlation.insert(other.to_string(), r);
                    }
                }
                FieldSummary {
                    name: name.to_string(),
                    count: m.count,
                    mean: m.mean,
                    variance: m.variance(),
                    skewness: m.skewness(),
                    kurtosis: m.kurtosis(),
                    covariance,
                    correlation,
                }
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSummary] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn write_optional_f64<W: StreamOutput + ?Sized>(out: &mut W, v: Option<f64>) {
    match v {
        Some(x) => {
            out.write_bool(true);
            out.write_f64(x);
        }
        None => out.write_bool(false),
    }
}

fn read_optional_f64<R: StreamInput + ?Sized>(input: &mut R) -> Result<Option<f64>> {
    if input.read_bool()? {
        Ok(Some(input.read_f64()?))
    } else {
        Ok(None)
    }
}

fn write_row<W: StreamOutput + ?Sized>(out: &mut W, row: &BTreeMap<String, f64>) {
    out.write_u64(row.len() as u64);
    for (k, &v) in row {
        out.write_string(k);
        out.write_f64(v);
    }
}

fn read_row<R: StreamInput + ?Sized>(input: &mut R) -> Result<BTreeMap<String, f64>> {
    let len = input.read_len()?;
    let mut row = BTreeMap::new();
    for _ in 0..len {
        let k = input.read_string()?;
        row.insert(k, input.read_f64()?);
    }
    Ok(row)
}

impl Writeable for MatrixStatsResult {
    fn write_to<W: StreamOutput + ?Sized>(&self, out: &mut W) {
        out.write_u64(self.fields.len() as u64);
        for f in &self.fields {
            out.write_string(&f.name);
            out.write_u64(f.count);
            out.write_f64(f.mean);
            write_optional_f64(out, f.variance);
            write_optional_f64(out, f.skewness);
            write_optional_f64(out, f.kurtosis);
            write_row(out, &f.covariance);
            write_row(out, &f.correlation);
        }
    }
}

impl Readable for MatrixStatsResult {
    fn read_from<R: StreamInput + ?Sized>(input: &mut R) -> Result<Self> {
        let len = input.read_len()?;
        let mut fields = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            fields.push(FieldSummary {
                name: input.read_string()?,
                count: input.read_u64()?,
                mean: input.read_f64()?,
                variance: read_optional_f64(input)?,
                skewness: read_optional_f64(input)?,
                kurtosis: read_optional_f64(input)?,
                covariance: read_row(input)?,
                correlation: read_row(input)?,
            });
        }
        Ok(Self { fields })
    }
}

/// The matrix_stats aggregation has no configuration of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MatrixStatsStrategy;

impl MatrixStrategy for MatrixStatsStrategy {
    type Output = MatrixStatsResult;

    const KIND: &'static str = "matrix_stats";

    fn is_compatible(&self, _other: &Self) -> bool {
        true
    }

    fn describe(&self) -> String {
        Self::KIND.to_string()
    }

    fn compute(&self, stats: &StreamingStats) -> Result<MatrixStatsResult> {
        Ok(MatrixStatsResult::compute(stats))
    }

    fn render(&self, result: &MatrixStatsResult, doc: &mut Map<String, Value>) {
        if result.fields.is_empty() {
            return;
        }
        let fields: Vec<Value> = result
            .fields
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "count": f.count,
                    "mean": f.mean,
                    "variance": f.variance,
                    "skewness": f.skewness,
                    "kurtosis": f.kurtosis,
                    "covariance": f.covariance,
                    "correlation": f.correlation,
                })
            })
            .collect();
        doc.insert("fields".to_string(), Value::Array(fields));
    }

    fn write_config<W: StreamOutput + ?Sized>(&self, _out: &mut W) {}

    fn read_config<R: StreamInput + ?Sized>(_input: &mut R) -> Result<Self> {
        Ok(MatrixStatsStrategy)
    }
}
