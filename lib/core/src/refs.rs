//! Document reference ids (`_ref`) and ordering helpers shared by every
//! stage that re-establishes row order after a parallel load.

/// Name of the reference column / dataset in every artifact.
pub const REF_COLUMN: &str = "_ref";

/// Per-document reference id.
pub type RefId = i64;

/// Largest magnitude below which every integer is exact in an `f64` (2^53).
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Parse an integer-like cell into a [`RefId`].
///
/// Accepts surrounding whitespace and a float spelling with no fractional
/// part (`"12.0"`), which is how numeric columns come back from tools that
/// widen integers to floats. Float spellings at or above 2^53 are rejected
/// since distinct refs could round to the same value.
pub fn parse_ref(raw: &str) -> Option<RefId> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT {
        Some(f as i64)
    } else {
        None
    }
}

/// Stable ascending sort permutation of `refs`.
///
/// Equal refs keep their input order, so the result is reproducible as
/// long as the input was concatenated in a deterministic order.
#[must_use]
pub fn sort_permutation(refs: &[RefId]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..refs.len()).collect();
    idx.sort_by_key(|&i| refs[i]);
    idx
}

/// Refs that occur more than once in an ascending-sorted slice.
#[must_use]
pub fn duplicates_in_sorted(sorted: &[RefId]) -> Vec<RefId> {
    let mut dups = Vec::new();
    for pair in sorted.windows(2) {
        if pair[0] == pair[1] && dups.last() != Some(&pair[0]) {
            dups.push(pair[0]);
        }
    }
    dups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ref() {
        assert_eq!(parse_ref("42"), Some(42));
        assert_eq!(parse_ref(" -3 "), Some(-3));
        assert_eq!(parse_ref("12.0"), Some(12));
        assert_eq!(parse_ref("12.5"), None);
        assert_eq!(parse_ref("-7.0"), Some(-7));
        assert_eq!(parse_ref("abc"), None);
        assert_eq!(parse_ref(""), None);
    }

    #[test]
    fn test_parse_ref_rejects_out_of_range() {
        assert_eq!(parse_ref("9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_ref("9223372036854775808"), None);
        assert_eq!(parse_ref("-9223372036854775809"), None);
        assert_eq!(parse_ref("9223372036854775808.0"), None);
        assert_eq!(parse_ref("1e300"), None);

        // integers spelled as floats lose precision from 2^53 on
        assert_eq!(parse_ref("9007199254740991.0"), Some(9_007_199_254_740_991));
        assert_eq!(parse_ref("9007199254740992.0"), None);
        assert_eq!(parse_ref("9007199254740993.0"), None);
        assert_eq!(parse_ref("9007199254740993"), Some(9_007_199_254_740_993));
    }

    #[test]
    fn test_sort_permutation_is_stable() {
        let refs = vec![7, 1, 7, 3];
        let perm = sort_permutation(&refs);
        assert_eq!(perm, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_duplicates_in_sorted() {
        assert_eq!(duplicates_in_sorted(&[1, 2, 2, 2, 3, 4, 4]), vec![2, 4]);
        assert!(duplicates_in_sorted(&[1, 2, 3]).is_empty());
        assert!(duplicates_in_sorted(&[]).is_empty());
    }
}
