//! Value model, affinity coercion, and the total order over values (C1).
//!
//! Generalizes `types.rs`'s `Value`/coercion methods to the spec's value
//! domain: a lossless big-integer variant, named collations, and a
//! comparison function usable both by the VDBE's comparison opcodes and by
//! sorters building a total-order key.

use std::cmp::Ordering;

use crate::error::{Error, ErrorCode, Result};

/// A SQL value. `BigInt` carries an arbitrary-precision integer as its
/// canonical decimal digit string (optionally signed) so it can be stored
/// and read back losslessly without a bignum dependency; arithmetic that
/// needs to combine it with other values converts through `f64` and may
/// lose precision, per spec §3.1.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    BigInt(String),
}

/// Column storage-class preference. Governs coercion on write and the
/// comparison rules in `compare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    Integer,
    Real,
    Text,
    #[default]
    Blob,
    Numeric,
}

/// Determine affinity from a declared type name, SQLite's §3.1.1 rules.
pub fn type_affinity(type_name: &str) -> Affinity {
    let upper = type_name.to_uppercase();
    if upper.contains("INT") {
        Affinity::Integer
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        Affinity::Text
    } else if upper.contains("BLOB") || type_name.is_empty() {
        Affinity::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        Affinity::Real
    } else {
        Affinity::Numeric
    }
}

/// A named string-comparison function. `BINARY`, `NOCASE`, and `RTRIM` are
/// built in (spec §3.1); no registration API for user collations exists in
/// this crate, matching the spec's built-in-only collation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    #[default]
    Binary,
    NoCase,
    RTrim,
}

impl Collation {
    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_uppercase().as_str() {
            "BINARY" => Ok(Collation::Binary),
            "NOCASE" => Ok(Collation::NoCase),
            "RTRIM" => Ok(Collation::RTrim),
            other => Err(Error::with_message(
                ErrorCode::Error,
                format!("no such collation sequence: {}", other),
            )),
        }
    }

    pub fn compare_text(self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Binary => a.as_bytes().cmp(b.as_bytes()),
            Collation::NoCase => a.to_uppercase().cmp(&b.to_uppercase()),
            Collation::RTrim => a.trim_end().as_bytes().cmp(b.trim_end().as_bytes()),
        }
    }
}

/// Numeric rank used only to order the four coarse classes of spec §3.1:
/// NULL < numbers < text < blob.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Integer(_) | Value::Real(_) | Value::BigInt(_) => 1,
        Value::Text(_) => 2,
        Value::Blob(_) => 3,
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL truthiness per spec §4.5.2: non-null and non-zero; text is true
    /// unless it parses as zero; a non-empty blob is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::BigInt(s) => !is_zero_digit_string(s),
            Value::Text(s) => match parse_numeric(s) {
                Some(NumericLiteral::Int(i)) => i != 0,
                Some(NumericLiteral::Real(r)) => r != 0.0,
                None => !s.is_empty(),
            },
            Value::Blob(b) => !b.is_empty(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Integer(i) => *i as f64,
            Value::Real(r) => *r,
            Value::BigInt(s) => s.parse().unwrap_or(0.0),
            Value::Text(s) => match parse_numeric(s) {
                Some(NumericLiteral::Int(i)) => i as f64,
                Some(NumericLiteral::Real(r)) => r,
                None => 0.0,
            },
            Value::Blob(_) => 0.0,
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => format_real(*r),
            Value::BigInt(s) => s.clone(),
            Value::Text(s) => s.clone(),
            Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

fn format_real(r: f64) -> String {
    let s = r.to_string();
    if !s.contains('.') && !s.contains('e') && !s.contains('E') {
        format!("{}.0", s)
    } else {
        s
    }
}

fn is_zero_digit_string(s: &str) -> bool {
    s.trim_start_matches(['+', '-']).trim_start_matches('0').is_empty()
}

enum NumericLiteral {
    Int(i64),
    Real(f64),
}

/// Losslessness check used by affinity coercion: does `s` parse as an
/// integer without truncation, then fall back to a real parse.
fn parse_numeric(s: &str) -> Option<NumericLiteral> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(NumericLiteral::Int(i));
    }
    if let Ok(r) = trimmed.parse::<f64>() {
        return Some(NumericLiteral::Real(r));
    }
    None
}

/// Apply a column's affinity to a value per spec §3.1.
pub fn affinity_apply(value: Value, affinity: Affinity) -> Value {
    match affinity {
        Affinity::Blob => value,
        Affinity::Text => match value {
            Value::Integer(i) => Value::Text(i.to_string()),
            Value::Real(r) => Value::Text(format_real(r)),
            Value::BigInt(s) => Value::Text(s),
            other => other,
        },
        Affinity::Integer | Affinity::Real | Affinity::Numeric => match value {
            Value::Text(ref s) => match parse_numeric(s) {
                Some(NumericLiteral::Int(i)) => {
                    if affinity == Affinity::Real {
                        Value::Real(i as f64)
                    } else {
                        Value::Integer(i)
                    }
                }
                Some(NumericLiteral::Real(r)) => Value::Real(r),
                None => value,
            },
            Value::Integer(i) if affinity == Affinity::Real => Value::Real(i as f64),
            other => other,
        },
    }
}

/// Total order over values per spec §3.1: NULL < numbers < text < blob;
/// numbers compared numerically; text compared under `collation`; blobs
/// compared bytewise.
pub fn compare(a: &Value, b: &Value, collation: Collation) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => collation.compare_text(x, y),
        _ => numeric_compare(a, b),
    }
}

fn numeric_compare(a: &Value, b: &Value) -> Ordering {
    fn as_f64(v: &Value) -> f64 {
        match v {
            Value::Integer(i) => *i as f64,
            Value::Real(r) => *r,
            Value::BigInt(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }
    // Two plain integers compare exactly; anything touching Real or BigInt
    // falls back to f64 (precision may be lost, as spec §3.1 allows).
    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
        return x.cmp(y);
    }
    as_f64(a).partial_cmp(&as_f64(b)).unwrap_or(Ordering::Equal)
}

/// Serialize a tuple of values into a total-order byte key, honoring each
/// column's direction and collation. Used by sorters and by secondary-index
/// keys (spec §4.1). Each field is self-delimiting (see `serialize_field`),
/// so fields concatenate into a key that plain byte-compares in the same
/// order as comparing the tuples lexicographically; the encoding tags each
/// value's type class so that distinct Rust values never collide (e.g.
/// integer `1` vs text `"1"`), and flips every byte of a field when its
/// column is descending so plain byte-compare reproduces the wanted order.
pub fn serialize_key(values: &[Value], directions: &[bool], collations: &[Collation]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, v) in values.iter().enumerate() {
        let desc = directions.get(i).copied().unwrap_or(false);
        let coll = collations.get(i).copied().unwrap_or(Collation::Binary);
        let mut field = serialize_field(v, coll);
        if desc {
            for b in field.iter_mut() {
                *b = !*b;
            }
        }
        out.extend_from_slice(&field);
    }
    out
}

/// Encode one value as a self-delimiting, order-preserving byte sequence: a
/// one-byte type tag (ordered to match `type_rank`) followed by the value's
/// content. `Null`/`Integer`/`Real` are fixed-width and need no terminator.
/// `BigInt`/`Text`/`Blob` are variable-width, so their content is escaped
/// and closed with `escape_terminated` instead of a length prefix — a
/// length prefix would order two same-type fields by length before content
/// (e.g. `"b"` sorting before `"aa"`), which is wrong for a byte-compare
/// total order.
fn serialize_field(v: &Value, collation: Collation) -> Vec<u8> {
    match v {
        Value::Null => vec![0u8],
        Value::Integer(i) => {
            let mut buf = vec![1u8];
            // XOR the sign bit so two's-complement integers sort correctly
            // under plain byte comparison.
            buf.extend_from_slice(&((*i as u64) ^ (1 << 63)).to_be_bytes());
            buf
        }
        Value::Real(r) => {
            let mut buf = vec![2u8];
            let bits = r.to_bits();
            let key = if *r < 0.0 { !bits } else { bits ^ (1 << 63) };
            buf.extend_from_slice(&key.to_be_bytes());
            buf
        }
        Value::BigInt(s) => {
            let mut buf = vec![3u8];
            escape_terminated(s.as_bytes(), &mut buf);
            buf
        }
        Value::Text(s) => {
            let mut buf = vec![4u8];
            let transformed: Vec<u8> = match collation {
                Collation::NoCase => s.to_uppercase().into_bytes(),
                Collation::RTrim => s.trim_end().as_bytes().to_vec(),
                Collation::Binary => s.as_bytes().to_vec(),
            };
            escape_terminated(&transformed, &mut buf);
            buf
        }
        Value::Blob(b) => {
            let mut buf = vec![5u8];
            escape_terminated(b, &mut buf);
            buf
        }
    }
}

/// Order-preserving escape for a variable-length field: every literal
/// `0x00` byte becomes `0x00 0xFF`, then the run is closed with a
/// `0x00 0x00` terminator. Since a real continuation byte is either
/// non-zero (`> 0x00`) or an escaped zero (whose second byte `0xFF >
/// 0x00`), the terminator always byte-compares below any continuation,
/// so a field that is a prefix of another sorts first — the same
/// relationship a length prefix is meant to capture, without imposing
/// length as the primary sort key.
fn escape_terminated(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == 0 {
            out.push(0xFF);
        }
    }
    out.push(0);
    out.push(0);
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(x) => x.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_round_trip() {
        for (affinity, v) in [
            (Affinity::Integer, Value::Text("42".into())),
            (Affinity::Real, Value::Text("3.5".into())),
            (Affinity::Text, Value::Integer(7)),
            (Affinity::Blob, Value::Blob(vec![1, 2, 3])),
            (Affinity::Numeric, Value::Text("abc".into())),
        ] {
            let once = affinity_apply(v.clone(), affinity);
            let twice = affinity_apply(once.clone(), affinity);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn comparison_total_order() {
        let values = vec![
            Value::Null,
            Value::Integer(1),
            Value::Real(2.5),
            Value::Text("a".into()),
            Value::Blob(vec![1]),
        ];
        for i in 0..values.len() {
            for j in 0..values.len() {
                let ord = compare(&values[i], &values[j], Collation::Binary);
                if i < j {
                    assert_eq!(ord, Ordering::Less, "{:?} vs {:?}", values[i], values[j]);
                } else if i > j {
                    assert_eq!(ord, Ordering::Greater);
                } else {
                    assert_eq!(ord, Ordering::Equal);
                }
            }
        }
    }

    #[test]
    fn nocase_collation_equates_case() {
        assert_eq!(
            compare(
                &Value::Text("ABC".into()),
                &Value::Text("abc".into()),
                Collation::NoCase
            ),
            Ordering::Equal
        );
    }

    #[test]
    fn rtrim_collation_ignores_trailing_space() {
        assert_eq!(
            compare(
                &Value::Text("abc".into()),
                &Value::Text("abc   ".into()),
                Collation::RTrim
            ),
            Ordering::Equal
        );
    }

    #[test]
    fn serialize_key_respects_descending_direction() {
        let asc = serialize_key(&[Value::Integer(1)], &[false], &[Collation::Binary]);
        let asc2 = serialize_key(&[Value::Integer(2)], &[false], &[Collation::Binary]);
        let desc = serialize_key(&[Value::Integer(1)], &[true], &[Collation::Binary]);
        let desc2 = serialize_key(&[Value::Integer(2)], &[true], &[Collation::Binary]);
        assert!(asc < asc2);
        assert!(desc > desc2);
    }

    #[test]
    fn serialize_key_orders_variable_length_text_by_content_not_length() {
        let shorter = serialize_key(&[Value::Text("b".into())], &[false], &[Collation::Binary]);
        let longer = serialize_key(&[Value::Text("aa".into())], &[false], &[Collation::Binary]);
        assert!(longer < shorter, "\"aa\" must sort before \"b\" ascending");

        let shorter_desc = serialize_key(&[Value::Text("b".into())], &[true], &[Collation::Binary]);
        let longer_desc = serialize_key(&[Value::Text("aa".into())], &[true], &[Collation::Binary]);
        assert!(shorter_desc < longer_desc, "\"b\" must sort before \"aa\" descending");
    }

    #[test]
    fn serialize_key_multi_field_prefix_orders_correctly() {
        let a = serialize_key(&[Value::Text("a".into())], &[false], &[Collation::Binary]);
        let ab = serialize_key(&[Value::Text("ab".into())], &[false], &[Collation::Binary]);
        assert!(a < ab, "a field that is a prefix of another must sort first");
    }
}
