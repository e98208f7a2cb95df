//! StreamingStats: mergeable per-field moments and pairwise co-moments.
//!
//! Each partition folds its documents into a [`StreamingStats`] without
//! keeping any raw values. Partitions are then combined with
//! [`StreamingStats::merge`], in any order and any tree shape, and the
//! result matches a single pass over the union of their inputs up to
//! floating-point rounding.
//!
//! # Representation
//!
//! Moments are kept centered (mean, M2, M3, M4) instead of as raw power sums.
//! Updates use Welford/Terriberry recurrences and merges use the Chan/Pébay
//! combination formulas, so no step subtracts two large, nearly equal sums.
//!
//! Pairs are keyed by the lexicographically smaller field name and carry their
//! own count and means, so a field pair observed together in only some
//! documents still merges exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stream::{Readable, StreamInput, StreamOutput, Writeable};
use crate::error::Result;

/// Centered moments of one field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMoments {
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    /// Σ(x - mean)²
    pub m2: f64,
    /// Σ(x - mean)³
    pub m3: f64,
    /// Σ(x - mean)⁴
    pub m4: f64,
}

impl FieldMoments {
    fn push(&mut self, x: f64) {
        let n1 = self.count as f64;
        self.count += 1;
        let n = self.count as f64;

        let delta = x - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * n1;

        self.mean += delta_n;
        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0) + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;
        self.sum += x;
    }

    fn combine(&self, other: &FieldMoments) -> FieldMoments {
        if other.count == 0 {
            return self.clone();
        }
        if self.count == 0 {
            return other.clone();
        }

        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        let delta = other.mean - self.mean;
        let delta2 = delta * delta;
        let delta3 = delta2 * delta;
        let delta4 = delta2 * delta2;

        let m2 = self.m2 + other.m2 + delta2 * na * nb / n;
        let m3 = self.m3
            + other.m3
            + delta3 * na * nb * (na - nb) / (n * n)
            + 3.0 * delta * (na * other.m2 - nb * self.m2) / n;
        let m4 = self.m4
            + other.m4
            + delta4 * na * nb * (na * na - na * nb + nb * nb) / (n * n * n)
            + 6.0 * delta2 * (na * na * other.m2 + nb * nb * self.m2) / (n * n)
            + 4.0 * delta * (na * other.m3 - nb * self.m3) / n;

        FieldMoments {
            count: self.count + other.count,
            sum: self.sum + other.sum,
            mean: self.mean + delta * nb / n,
            m2,
            m3,
            m4,
        }
    }

    /// Sample variance, `None` below two observations.
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some(self.m2 / (self.count - 1) as f64)
    }

    /// Σx², derived from the centered representation.
    pub fn sum_of_squares(&self) -> f64 {
        self.m2 + self.count as f64 * self.mean * self.mean
    }

    /// √n · M3 / M2^1.5
    pub fn skewness(&self) -> Option<f64> {
        if self.count == 0 || self.m2 == 0.0 {
            return None;
        }
        Some((self.count as f64).sqrt() * self.m3 / self.m2.powf(1.5))
    }

    /// n · M4 / M2² (non-excess).
    pub fn kurtosis(&self) -> Option<f64> {
        if self.count == 0 || self.m2 == 0.0 {
            return None;
        }
        Some(self.count as f64 * self.m4 / (self.m2 * self.m2))
    }
}

/// Joint moments of a field pair over the documents where both were present.
///
/// Both marginal second moments are kept over the same documents as the
/// co-moment, so [`correlation`](Self::correlation) never mixes populations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PairMoments {
    pub count: u64,
    pub mean_a: f64,
    pub mean_b: f64,
    /// Σ(a - mean_a)² over the joint documents
    pub m2_a: f64,
    /// Σ(b - mean_b)² over the joint documents
    pub m2_b: f64,
    /// Σ(a - mean_a)(b - mean_b)
    pub comoment: f64,
}

impl PairMoments {
    fn push(&mut self, a: f64, b: f64) {
        self.count += 1;
        let n = self.count as f64;
        let da = a - self.mean_a;
        let db = b - self.mean_b;
        self.mean_a += da / n;
        self.mean_b += db / n;
        self.m2_a += da * (a - self.mean_a);
        self.m2_b += db * (b - self.mean_b);
        self.comoment += da * (b - self.mean_b);
    }

    fn combine(&self, other: &PairMoments) -> PairMoments {
        if other.count == 0 {
            return self.clone();
        }
        if self.count == 0 {
            return other.clone();
        }

        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        let da = other.mean_a - self.mean_a;
        let db = other.mean_b - self.mean_b;
        let w = na * nb / n;

        PairMoments {
            count: self.count + other.count,
            mean_a: self.mean_a + da * nb / n,
            mean_b: self.mean_b + db * nb / n,
            m2_a: self.m2_a + other.m2_a + da * da * w,
            m2_b: self.m2_b + other.m2_b + db * db * w,
            comoment: self.comoment + other.comoment + da * db * w,
        }
    }

    /// Sample covariance over the joint documents, `None` below two joint
    /// observations.
    pub fn covariance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some(self.comoment / (self.count - 1) as f64)
    }

    /// Pearson correlation over the joint documents, clamped to `[-1, 1]`.
    ///
    /// `None` below two joint observations or when either field is constant
    /// across them.
    pub fn correlation(&self) -> Option<f64> {
        if self.count < 2 || self.m2_a <= 0.0 || self.m2_b <= 0.0 {
            return None;
        }
        Some((self.comoment / (self.m2_a.sqrt() * self.m2_b.sqrt())).clamp(-1.0, 1.0))
    }
}

/// Streaming sufficient statistics for a set of named numeric fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingStats {
    fields: BTreeMap<String, FieldMoments>,
    /// Outer key < inner key.
    pairs: BTreeMap<String, BTreeMap<String, PairMoments>>,
}

impl StreamingStats {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one document's field values into the statistics.
    ///
    /// Non-finite values are skipped. If a field name repeats, the last
    /// value wins.
    pub fn accumulate<I, K>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let doc: BTreeMap<String, f64> = values
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k.into(), v))
            .collect();

        for (name, &x) in &doc {
            match self.fields.get_mut(name) {
                Some(m) => m.push(x),
                None => {
                    let mut m = FieldMoments::default();
                    m.push(x);
                    self.fields.insert(name.clone(), m);
                }
            }
        }

        let entries: Vec<(&String, f64)> = doc.iter().map(|(k, &v)| (k, v)).collect();
        for (i, &(a, xa)) in entries.iter().enumerate() {
            for &(b, xb) in &entries[i + 1..] {
                self.pair_entry(a, b).push(xa, xb);
            }
        }
    }

    fn pair_entry(&mut self, a: &str, b: &str) -> &mut PairMoments {
        self.pairs
            .entry(a.to_string())
            .or_default()
            .entry(b.to_string())
            .or_default()
    }

    /// Combine two accumulators. The field set of the result is the union
    /// of both inputs.
    pub fn merge(&self, other: &StreamingStats) -> StreamingStats {
        let mut fields = self.fields.clone();
        for (name, theirs) in &other.fields {
            let combined = match fields.get(name) {
                Some(ours) => ours.combine(theirs),
                None => theirs.clone(),
            };
            fields.insert(name.clone(), combined);
        }

        let mut pairs = self.pairs.clone();
        for (a, row) in &other.pairs {
            let ours = pairs.entry(a.clone()).or_default();
            for (b, theirs) in row {
                let combined = match ours.get(b) {
                    Some(p) => p.combine(theirs),
                    None => theirs.clone(),
                };
                ours.insert(b.clone(), combined);
            }
        }

        StreamingStats { fields, pairs }
    }

    /// Number of distinct fields observed.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&FieldMoments> {
        self.fields.get(name)
    }

    /// Iterate fields in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldMoments)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Co-moments for a pair; argument order does not matter.
    pub fn pair(&self, a: &str, b: &str) -> Option<&PairMoments> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.pairs.get(lo).and_then(|row| row.get(hi))
    }

    /// Per-field observation counts.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.count))
            .collect()
    }

    /// Covariance of two fields on the scale of their own variances.
    ///
    /// For `a == b` this is the sample variance. Otherwise it is
    /// `correlation(a, b) · σa · σb`, so every entry of a covariance matrix
    /// is consistent with the diagonal even when the two fields were only
    /// observed together in some documents. Pairs without a usable joint
    /// correlation contribute zero.
    pub fn covariance(&self, a: &str, b: &str) -> Option<f64> {
        let va = self.field(a)?.variance()?;
        if a == b {
            return Some(va);
        }
        let vb = self.field(b)?.variance()?;
        let r = self.pair(a, b).and_then(PairMoments::correlation).unwrap_or(0.0);
        Some(r * va.sqrt() * vb.sqrt())
    }

    /// Pearson correlation of two fields, computed over the documents where
    /// both were present.
    ///
    /// `None` if either field has no positive variance. Pairs without a
    /// usable joint correlation report zero.
    pub fn correlation(&self, a: &str, b: &str) -> Option<f64> {
        let va = self.field(a)?.variance()?;
        let vb = self.field(b)?.variance()?;
        if va == 0.0 || vb == 0.0 {
            return None;
        }
        if a == b {
            return Some(1.0);
        }
        Some(self.pair(a, b).and_then(PairMoments::correlation).unwrap_or(0.0))
    }

    fn num_pairs(&self) -> usize {
        self.pairs.values().map(BTreeMap::len).sum()
    }
}

impl Writeable for StreamingStats {
    fn write_to<W: StreamOutput + ?Sized>(&self, out: &mut W) {
        out.write_u64(self.fields.len() as u64);
        for (name, m) in &self.fields {
            out.write_string(name);
            out.write_u64(m.count);
            out.write_f64(m.sum);
            out.write_f64(m.mean);
            out.write_f64(m.m2);
            out.write_f64(m.m3);
            out.write_f64(m.m4);
        }

        out.write_u64(self.num_pairs() as u64);
        for (a, row) in &self.pairs {
            for (b, p) in row {
                out.write_string(a);
                out.write_string(b);
                out.write_u64(p.count);
                out.write_f64(p.mean_a);
                out.write_f64(p.mean_b);
                out.write_f64(p.m2_a);
                out.write_f64(p.m2_b);
                out.write_f64(p.comoment);
            }
        }
    }
}

impl Readable for StreamingStats {
    fn read_from<R: StreamInput + ?Sized>(input: &mut R) -> Result<Self> {
        let mut stats = StreamingStats::new();

        let num_fields = input.read_len()?;
        for _ in 0..num_fields {
            let name = input.read_string()?;
            let m = FieldMoments {
                count: input.read_u64()?,
                sum: input.read_f64()?,
                mean: input.read_f64()?,
                m2: input.read_f64()?,
                m3: input.read_f64()?,
                m4: input.read_f64()?,
            };
            stats.fields.insert(name, m);
        }

        let num_pairs = input.read_len()?;
        for _ in 0..num_pairs {
            let a = input.read_string()?;
            let b = input.read_string()?;
            let mut p = PairMoments {
                count: input.read_u64()?,
                mean_a: input.read_f64()?,
                mean_b: input.read_f64()?,
                m2_a: input.read_f64()?,
                m2_b: input.read_f64()?,
                comoment: input.read_f64()?,
            };
            let (lo, hi) = if a <= b {
                (a, b)
            } else {
                std::mem::swap(&mut p.mean_a, &mut p.mean_b);
                std::mem::swap(&mut p.m2_a, &mut p.m2_b);
                (b, a)
            };
            stats.pairs.entry(lo).or_default().insert(hi, p);
        }

        Ok(stats)
    }
}
