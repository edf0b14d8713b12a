//! Query Hasher / Normalizer.
//!
//! Canonicalizes a query text before hashing so that cosmetically different
//! but semantically identical statements collapse to the same fingerprint.

use sha2::{Digest, Sha256};

/// Which canonicalization steps to apply, and in what order (literal
/// masking, then whitespace collapsing, then case folding).
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct NormalizeConfig {
    /// Collapse runs of whitespace to a single space and trim the ends.
    pub collapse_whitespace: bool,
    /// Upcase the whole string.
    pub upcase: bool,
    /// Replace decimal literals with `#NUM#` and single-quoted string
    /// literals with `'#STR#'`.
    pub mask_literals: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        NormalizeConfig {
            collapse_whitespace: true,
            upcase: false,
            mask_literals: false,
        }
    }
}

/// Canonicalizes `query` per `config`. Idempotent: `normalize(normalize(q))
/// == normalize(q)`.
pub fn normalize(query: &str, config: &NormalizeConfig) -> String {
    let mut s = query.to_owned();
    if config.mask_literals {
        s = mask_literals(&s);
    }
    if config.collapse_whitespace {
        s = collapse_whitespace(&s);
    }
    if config.upcase {
        s = s.to_uppercase();
    }
    s
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

/// Replaces decimal numeric literals with `#NUM#` and single-quoted string
/// literals with `'#STR#'`, preserving doubled-quote escapes inside strings
/// (`''` stays part of the literal being masked, not a literal boundary).
fn mask_literals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    None => break,
                    Some('\'') if chars.get(j + 1) == Some(&'\'') => j += 2,
                    Some('\'') => {
                        j += 1;
                        break;
                    }
                    Some(_) => j += 1,
                }
            }
            out.push_str("'#STR#'");
            i = j;
        } else if c.is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                j += 1;
            }
            out.push_str("#NUM#");
            i = j;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// A 256-bit hash of the normalized query text.
pub fn hash_query(query: &str, config: &NormalizeConfig) -> [u8; 32] {
    let normalized = normalize(query, config);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// A short, printable form of [`hash_query`]'s output.
pub fn fingerprint(query: &str, config: &NormalizeConfig) -> String {
    let hash = hash_query(query, config);
    data_encoding::HEXLOWER.encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let config = NormalizeConfig::default();
        let q = "SELECT   1,   2\nFROM   t";
        let once = normalize(q, &config);
        let twice = normalize(&once, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn hash_matches_iff_normalized_forms_match() {
        let config = NormalizeConfig {
            collapse_whitespace: true,
            upcase: true,
            mask_literals: true,
        };
        let a = "select * from t where id = 1";
        let b = "SELECT  *  FROM  t  WHERE id = 2";
        assert_eq!(
            normalize(a, &config) == normalize(b, &config),
            hash_query(a, &config) == hash_query(b, &config)
        );
        assert_eq!(normalize(a, &config), normalize(b, &config));
    }

    #[test]
    fn mask_literals_preserves_doubled_quote_escapes() {
        let masked = mask_literals("SELECT 'it''s' FROM t");
        assert_eq!(masked, "SELECT '#STR#' FROM t");
    }

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        let fp = fingerprint("SELECT 1", &NormalizeConfig::default());
        assert_eq!(fp.len(), 16);
    }
}
