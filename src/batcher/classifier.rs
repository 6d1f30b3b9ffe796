/// Dotted metric keys broken into fixed-width classifier rows
///
/// A key like `app.requests.count` is split on `.` into ordered classifier
/// fields. The dimension table has exactly [`CLASSIFIER_WIDTH`] classifier
/// columns, so longer keys fold their excess trailing segments into the last
/// slot and shorter keys pad with empty strings. The row's content id is the
/// high 64 bits of a SHA-1 over the joined sequence, which makes it a stable
/// function of the classifiers and usable as the fact table's foreign key.
use sha1::{Digest, Sha1};

/// Number of classifier columns in the dimension table
pub const CLASSIFIER_WIDTH: usize = 15;

/// Dimension table column names, one per classifier slot
pub const CLASSIFIER_COLUMNS: [&str; CLASSIFIER_WIDTH] = [
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "omicron",
];

/// One derived dimension row: always exactly [`CLASSIFIER_WIDTH`] fields
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierRow {
    pub id: u64,
    pub classifiers: Vec<String>,
}

/// Split a dotted key into a fixed-width classifier row.
pub fn derive(key: &str) -> ClassifierRow {
    let mut classifiers: Vec<String> = key.split('.').map(str::to_owned).collect();

    if classifiers.len() > CLASSIFIER_WIDTH {
        // fold the excess trailing segments into the last slot, rejoined so
        // no characters are lost
        let tail = classifiers.split_off(CLASSIFIER_WIDTH - 1);
        classifiers.push(tail.join("."));
    } else {
        classifiers.resize(CLASSIFIER_WIDTH, String::new());
    }

    let id = classifier_id(&classifiers);
    ClassifierRow { id, classifiers }
}

/// Content identifier for an ordered classifier sequence: the first 16 hex
/// characters (high 64 bits) of its SHA-1, as an unsigned integer.
pub fn classifier_id(classifiers: &[String]) -> u64 {
    let digest = Sha1::digest(classifiers.join(".").as_bytes());
    let mut high = [0u8; 8];
    high.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_key_pads_to_fixed_width() {
        let row = derive("app.requests.count");
        assert_eq!(row.classifiers.len(), CLASSIFIER_WIDTH);
        assert_eq!(row.classifiers[0], "app");
        assert_eq!(row.classifiers[1], "requests");
        assert_eq!(row.classifiers[2], "count");
        assert!(row.classifiers[3..].iter().all(String::is_empty));
    }

    #[test]
    fn test_long_key_folds_tail_into_last_slot() {
        let segments: Vec<String> = (0..20).map(|i| format!("s{i}")).collect();
        let key = segments.join(".");
        let row = derive(&key);

        assert_eq!(row.classifiers.len(), CLASSIFIER_WIDTH);
        assert_eq!(row.classifiers[0], "s0");
        assert_eq!(row.classifiers[CLASSIFIER_WIDTH - 2], "s13");
        // the last slot holds the rejoined suffix with nothing truncated
        assert_eq!(row.classifiers[CLASSIFIER_WIDTH - 1], "s14.s15.s16.s17.s18.s19");
        assert_eq!(row.classifiers.join("."), key);
    }

    #[test]
    fn test_exact_width_key_is_unchanged() {
        let segments: Vec<String> = (0..CLASSIFIER_WIDTH).map(|i| format!("s{i}")).collect();
        let key = segments.join(".");
        let row = derive(&key);
        assert_eq!(row.classifiers, segments);
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = derive("app.requests.count");
        let b = derive("app.requests.count");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_distinct_sequences_get_distinct_ids() {
        let count = derive("app.requests.count");
        let rate = derive("app.requests.rate");
        assert_ne!(count.id, rate.id);
    }

    #[test]
    fn test_id_matches_sha1_high_bits() {
        let row = derive("a.b");
        let digest = Sha1::digest(row.classifiers.join(".").as_bytes());
        assert_eq!(&digest[..8], &row.id.to_be_bytes());
    }

    #[test]
    fn test_single_segment_key() {
        let row = derive("uptime");
        assert_eq!(row.classifiers[0], "uptime");
        assert_eq!(row.classifiers.len(), CLASSIFIER_WIDTH);
    }
}
