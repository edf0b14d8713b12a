//! Dynamic Data Generator: typed column value
//! generation with configurable statistical distributions and domain-aware
//! text generators.

mod domains;

pub use domains::Domain;

use crate::{entropy::EntropyManager, value::Value};
use chrono::{Duration, NaiveDateTime};
use rand_distr::{Binomial, Distribution as _, Exp, Normal, Poisson};
use serde::{Deserialize, Serialize};
use zipf::ZipfDistribution;

/// A statistical distribution to sample a numeric value from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Distribution {
    /// Uniform over the column's configured range. The default.
    Uniform,
    /// Normal (Gaussian), parameterized by mean and stddev.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        stddev: f64,
    },
    /// Exponential, parameterized by rate `lambda`.
    Exponential {
        /// Rate parameter.
        lambda: f64,
    },
    /// Zipfian over `n` ranked items with skew `s`.
    Zipfian {
        /// Number of distinct ranks.
        n: u64,
        /// Skew exponent.
        s: f64,
    },
    /// Poisson, parameterized by mean `lambda`.
    Poisson {
        /// Mean event rate.
        lambda: f64,
    },
    /// Binomial with `trials` draws at success probability `p`.
    Binomial {
        /// Number of trials.
        trials: u64,
        /// Success probability.
        p: f64,
    },
}

impl Default for Distribution {
    fn default() -> Self {
        Distribution::Uniform
    }
}

/// The SQL-ish type of a column, as far as the generator needs to know.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ColumnType {
    /// A signed integer in `[lo, hi]`.
    Integer {
        /// Lower bound, inclusive.
        lo: i64,
        /// Upper bound, inclusive.
        hi: i64,
    },
    /// A fixed-point decimal with `precision` total digits and `scale`
    /// digits after the point.
    Decimal {
        /// Total significant digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Variable-length text, `max_len` characters.
    Text {
        /// Maximum emitted length in characters.
        max_len: usize,
    },
    /// A boolean.
    Boolean,
    /// A date/timestamp within `[start, end]`.
    Timestamp {
        /// Earliest allowed instant.
        start: NaiveDateTime,
        /// Latest allowed instant.
        end: NaiveDateTime,
    },
    /// A JSON value, a random tree of at most `max_depth`.
    Json {
        /// Maximum nesting depth.
        max_depth: u32,
    },
    /// A UUID.
    Uuid,
    /// An IPv4 or IPv6 address.
    Inet,
    /// An array of `element` values, `len` entries.
    Array {
        /// The element type.
        element: Box<ColumnType>,
        /// Number of entries.
        len: usize,
    },
}

/// Schema of one column: its SQL-ish type, name (used to pick domain-aware
/// generators), nullability, and distribution.
#[derive(Clone, Debug)]
pub struct ColumnSpec {
    /// Column name; matched case-insensitively against domain keywords.
    pub name: String,
    /// The value shape to generate.
    pub ty: ColumnType,
    /// Whether `NULL` is a legal value for this column.
    pub nullable: bool,
    /// Fraction of generated values that should be `NULL`, when nullable.
    pub null_rate: f64,
    /// Distribution used for numeric types; ignored otherwise.
    pub distribution: Distribution,
}

impl ColumnSpec {
    /// A convenience constructor with a default `null_rate` of 10%.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        ColumnSpec {
            name: name.into(),
            ty,
            nullable: false,
            null_rate: 0.10,
            distribution: Distribution::default(),
        }
    }
}

/// Produces legal values for typed columns, honoring distributions, domain
/// name matching, and inter-column correlations.
#[derive(Clone)]
pub struct DataGenerator<'e> {
    entropy: &'e EntropyManager,
    vocabulary: Vec<String>,
}

impl<'e> DataGenerator<'e> {
    /// Builds a generator backed by `entropy`, with a synthetic word
    /// vocabulary of `vocabulary_size` pre-generated words for `text`
    /// columns that don't match a known domain.
    pub fn new(entropy: &'e EntropyManager, vocabulary_size: usize) -> Self {
        let mut vocabulary = Vec::with_capacity(vocabulary_size);
        const SYLLABLES: &[&str] = &["ba", "re", "lo", "fi", "mu", "ta", "sen", "dor", "qui", "vex"];
        for i in 0..vocabulary_size {
            let a = SYLLABLES[i % SYLLABLES.len()];
            let b = SYLLABLES[(i / SYLLABLES.len()) % SYLLABLES.len()];
            vocabulary.push(format!("{}{}", a, b));
        }
        DataGenerator { entropy, vocabulary }
    }

    /// Generates one value for `column`, given the current row index (used
    /// for `_id`-suffixed sequential columns).
    pub fn generate_value(&self, column: &ColumnSpec, row_index: u64) -> Value {
        if column.nullable && self.entropy.with_rng(|rng| rng.random()) < column.null_rate {
            return Value::Null;
        }
        match &column.ty {
            ColumnType::Integer { lo, hi } => self.generate_integer(column, *lo, *hi, row_index),
            ColumnType::Decimal { precision, scale } => self.generate_decimal(column, *precision, *scale),
            ColumnType::Text { max_len } => self.generate_text(column, *max_len),
            ColumnType::Boolean => self.generate_boolean(column),
            ColumnType::Timestamp { start, end } => self.generate_timestamp(column, *start, *end),
            ColumnType::Json { max_depth } => Value::Json(self.generate_json(*max_depth)),
            ColumnType::Uuid => Value::Uuid(self.generate_uuid()),
            ColumnType::Inet => Value::Inet(self.generate_inet()),
            ColumnType::Array { element, len } => {
                let inner = ColumnSpec::new(column.name.clone(), (**element).clone());
                Value::Array((0..*len).map(|i| self.generate_value(&inner, i)).collect())
            }
        }
    }

    fn generate_integer(&self, column: &ColumnSpec, lo: i64, hi: i64, row_index: u64) -> Value {
        if column.name.to_lowercase().ends_with("_id") {
            return Value::from(row_index as i64 + lo);
        }
        Value::from(self.sample_distribution(column.distribution, lo, hi))
    }

    fn sample_distribution(&self, distribution: Distribution, lo: i64, hi: i64) -> i64 {
        self.entropy.with_rng(|rng| {
            match distribution {
                Distribution::Uniform => rng.randint(lo, hi),
                Distribution::Normal { mean, stddev } => {
                    let dist = Normal::new(mean, stddev).unwrap_or_else(|_| Normal::new(0.0, 1.0).unwrap());
                    let v = dist.sample(rng.rng_mut());
                    (v.round() as i64).clamp(lo, hi)
                }
                Distribution::Exponential { lambda } => {
                    let dist = Exp::new(lambda.max(1e-9)).unwrap_or_else(|_| Exp::new(1.0).unwrap());
                    let v = dist.sample(rng.rng_mut());
                    (lo as f64 + v).round() as i64
                }.clamp(lo, hi),
                Distribution::Zipfian { n, s } => {
                    let dist = ZipfDistribution::new(n.max(1) as usize, s.max(0.01))
                        .unwrap_or_else(|_| ZipfDistribution::new(1, 1.0).unwrap());
                    let rank = dist.sample(rng.rng_mut()) as i64 - 1;
                    (lo + rank).clamp(lo, hi)
                }
                Distribution::Poisson { lambda } => {
                    let dist = Poisson::new(lambda.max(1e-9)).unwrap_or_else(|_| Poisson::new(1.0).unwrap());
                    let v: f64 = dist.sample(rng.rng_mut());
                    (lo + v as i64).clamp(lo, hi)
                }
                Distribution::Binomial { trials, p } => {
                    let dist = Binomial::new(trials, p.clamp(0.0, 1.0)).unwrap_or_else(|_| Binomial::new(1, 0.5).unwrap());
                    let v = dist.sample(rng.rng_mut()) as i64;
                    (lo + v).clamp(lo, hi)
                }
            }
        })
    }

    fn generate_decimal(&self, column: &ColumnSpec, precision: u32, scale: u32) -> Value {
        let lower = column.name.to_lowercase();
        let is_price = lower.contains("price") || lower.contains("amount") || lower.contains("cost");
        let integer_digits = precision.saturating_sub(scale).max(1);
        let max_integer = 10i128.pow(integer_digits) - 1;
        let (integer_part, fractional) = self.entropy.with_rng(|rng| {
            let integer_part = rng.randint(0, max_integer.min(i64::MAX as i128 - 1) as i64) as i128;
            let fractional = if is_price && scale >= 2 {
                99
            } else {
                rng.randint(0, 10i64.pow(scale.max(1)) - 1) as u64
            };
            (integer_part, fractional)
        });
        Value::Number(crate::value::Number::decimal(integer_part, fractional, scale))
    }

    fn generate_text(&self, column: &ColumnSpec, max_len: usize) -> Value {
        if let Some(domain) = Domain::match_column_name(&column.name) {
            return Value::from(domain.generate(self.entropy));
        }
        let word_count = (max_len / 6).max(1).min(12);
        let words: Vec<&str> = (0..word_count)
            .map(|_| self.entropy.with_rng(|rng| self.vocabulary[rng.randint(0, self.vocabulary.len() as i64 - 1) as usize].as_str()))
            .collect();
        let mut text = words.join(" ");
        text.truncate(max_len.max(1));
        Value::from(text)
    }

    fn generate_boolean(&self, column: &ColumnSpec) -> Value {
        let lower = column.name.to_lowercase();
        let bias = if lower.contains("active") || lower.contains("enabled") {
            0.8
        } else if lower.contains("deleted") || lower.contains("disabled") {
            0.2
        } else {
            0.5
        };
        let draw = self.entropy.with_rng(|rng| rng.random());
        Value::from(draw < bias)
    }

    fn generate_timestamp(&self, column: &ColumnSpec, start: NaiveDateTime, end: NaiveDateTime) -> Value {
        let lower = column.name.to_lowercase();
        let (start, end) = if lower.contains("birth") {
            let today = start.date().max(end.date());
            (
                today - Duration::days(80 * 365),
                today - Duration::days(20 * 365),
            )
        } else if lower.contains("created") || lower.contains("updated") {
            let today = end.date();
            (today - Duration::days(365), today)
        } else {
            (start.date(), end.date())
        };
        let span_days = (end - start).num_days().max(0);
        let offset = self.entropy.with_rng(|rng| rng.randint(0, span_days));
        let date = start + Duration::days(offset);
        let seconds = self.entropy.with_rng(|rng| rng.randint(0, 86_399));
        Value::Timestamp(date.and_hms_opt(0, 0, 0).unwrap_or_else(|| date.and_hms_opt(0, 0, 0).unwrap()) + Duration::seconds(seconds))
    }

    fn generate_json(&self, max_depth: u32) -> serde_json::Value {
        self.generate_json_at(max_depth)
    }

    fn generate_json_at(&self, depth_remaining: u32) -> serde_json::Value {
        if depth_remaining == 0 || self.entropy.with_rng(|rng| rng.random()) < 0.4 {
            return match self.entropy.with_rng(|rng| rng.randint(0, 2)) {
                0 => serde_json::Value::from(self.entropy.with_rng(|rng| rng.randint(0, 1000))),
                1 => serde_json::Value::from(self.entropy.with_rng(|rng| rng.random() < 0.5)),
                _ => serde_json::Value::String("leaf".to_owned()),
            };
        }
        if self.entropy.with_rng(|rng| rng.random()) < 0.5 {
            let len = self.entropy.with_rng(|rng| rng.randint(0, 3));
            serde_json::Value::Array((0..len).map(|_| self.generate_json_at(depth_remaining - 1)).collect())
        } else {
            let mut map = serde_json::Map::new();
            for i in 0..self.entropy.with_rng(|rng| rng.randint(1, 3)) {
                map.insert(format!("k{}", i), self.generate_json_at(depth_remaining - 1));
            }
            serde_json::Value::Object(map)
        }
    }

    fn generate_uuid(&self) -> String {
        let bytes: [u8; 16] = self.entropy.with_rng(|rng| {
            let mut b = [0u8; 16];
            for byte in &mut b {
                *byte = rng.randint(0, 255) as u8;
            }
            b[6] = (b[6] & 0x0F) | 0x40;
            b[8] = (b[8] & 0x3F) | 0x80;
            b
        });
        format!(
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
        )
    }

    fn generate_inet(&self) -> String {
        if self.entropy.with_rng(|rng| rng.random()) < 0.8 {
            let octets: Vec<i64> = (0..4).map(|_| self.entropy.with_rng(|rng| rng.randint(0, 255))).collect();
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
        } else {
            let groups: Vec<String> = (0..8)
                .map(|_| format!("{:x}", self.entropy.with_rng(|rng| rng.randint(0, 0xFFFF))))
                .collect();
            groups.join(":")
        }
    }
}

/// A constraint tying several generated column values together, applied
/// atomically after the independent per-column draws.
#[derive(Clone, Debug)]
pub enum Correlation {
    /// `fields.1`'s timestamp is always >= `fields.0`'s.
    Sequential {
        /// (earlier column, later column).
        fields: (String, String),
    },
    /// `target = a * b` for the named numeric fields.
    Proportional {
        /// Output column name.
        target: String,
        /// First factor column name.
        a: String,
        /// Second factor column name.
        b: String,
    },
}

/// Applies `correlations` to an already-generated row (name -> value map),
/// overwriting dependent fields so the named constraints hold.
pub fn apply_correlations(row: &mut std::collections::BTreeMap<String, Value>, correlations: &[Correlation]) {
    for correlation in correlations {
        match correlation {
            Correlation::Sequential { fields } => {
                let (early, late) = fields;
                if let (Some(Value::Timestamp(a)), Some(Value::Timestamp(b))) =
                    (row.get(early).cloned(), row.get(late).cloned())
                {
                    if b < a {
                        row.insert(late.clone(), Value::Timestamp(a));
                    }
                }
            }
            Correlation::Proportional { target, a, b } => {
                if let (Some(Value::Number(av)), Some(Value::Number(bv))) = (row.get(a), row.get(b)) {
                    let product = av.to_string().parse::<f64>().unwrap_or(0.0) * bv.to_string().parse::<f64>().unwrap_or(0.0);
                    row.insert(target.clone(), Value::from(product));
                }
            }
        }
    }
}

/// Deterministically generates a table schema for a given complexity tier.
/// `table_index` feeds the monotonic counter that keeps table names unique
/// across repeated calls.
pub fn generate_schema(complexity: &str, table_index: u64) -> (String, Vec<ColumnSpec>) {
    let column_count = match complexity {
        "simple" => 3,
        "wide" => 15,
        _ => 6,
    };
    let name = format!("gen_table_{}", table_index);
    let mut columns = vec![ColumnSpec::new("id", ColumnType::Integer { lo: 1, hi: i64::MAX })];
    for i in 1..column_count {
        columns.push(ColumnSpec::new(format!("col_{}", i), ColumnType::Text { max_len: 32 }));
    }
    (name, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::{EntropyConfig, EntropyManager};
    use chrono::NaiveDate;

    fn epoch() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn generator(seed: u64) -> EntropyManager {
        EntropyManager::new(EntropyConfig {
            base_seed: Some(seed),
            ..EntropyConfig::default()
        })
    }

    #[test]
    fn id_columns_prefer_sequential_values() {
        let entropy = generator(1);
        let gen = DataGenerator::new(&entropy, 100);
        let column = ColumnSpec::new("user_id", ColumnType::Integer { lo: 0, hi: 1_000_000 });
        let v = gen.generate_value(&column, 42);
        assert_eq!(v, Value::from(42i64));
    }

    #[test]
    fn nullable_column_eventually_emits_null() {
        let entropy = generator(2);
        let gen = DataGenerator::new(&entropy, 100);
        let mut column = ColumnSpec::new("note", ColumnType::Text { max_len: 10 });
        column.nullable = true;
        column.null_rate = 1.0;
        assert_eq!(gen.generate_value(&column, 0), Value::Null);
    }

    #[test]
    fn uuid_has_version_and_variant_nibbles() {
        let entropy = generator(3);
        let gen = DataGenerator::new(&entropy, 10);
        let column = ColumnSpec::new("id", ColumnType::Uuid);
        if let Value::Uuid(uuid) = gen.generate_value(&column, 0) {
            assert_eq!(&uuid[14..15], "4");
            assert!("89ab".contains(&uuid[19..20]));
        } else {
            panic!("expected a uuid value");
        }
    }

    #[test]
    fn sequential_correlation_keeps_created_before_updated() {
        let mut row = std::collections::BTreeMap::new();
        row.insert("created_at".to_owned(), Value::Timestamp(epoch() + Duration::days(5)));
        row.insert("updated_at".to_owned(), Value::Timestamp(epoch()));
        apply_correlations(
            &mut row,
            &[Correlation::Sequential {
                fields: ("created_at".to_owned(), "updated_at".to_owned()),
            }],
        );
        let created = row.get("created_at").unwrap();
        let updated = row.get("updated_at").unwrap();
        assert!(matches!((created, updated), (Value::Timestamp(a), Value::Timestamp(b)) if b >= a));
    }
}
