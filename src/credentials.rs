//! Provider credentials and round-robin key rotation
//!
//! A provider may hold several API keys for the same upstream. Keys are supplied as a single
//! comma-separated configuration value and used in rotation, so that a burst of requests is
//! spread over all keys instead of exhausting the quota of the first one.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of trailing characters of a key that may appear in logs.
const VISIBLE_SUFFIX: usize = 5;

/// A single secret. `Debug` and `Display` never print the full value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(secret: impl AsRef<str>) -> Self {
        Self(Arc::from(secret.as_ref()))
    }

    /// The raw secret, for building request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short identifier safe to log: `...` followed by the last few characters.
    ///
    /// Short keys would be revealed almost entirely by their suffix, so they are fully masked.
    pub fn suffix(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= VISIBLE_SUFFIX + 3 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - VISIBLE_SUFFIX..].iter().collect();
        format!("...{tail}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.suffix())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.suffix())
    }
}

/// Ordered set of keys for one provider. May be empty, in which case the provider is
/// permanently disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialSet(Vec<Credential>);

impl CredentialSet {
    /// Parse a comma-separated list. Whitespace is trimmed and empty entries are dropped;
    /// order is preserved.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Credential::new)
                .collect(),
        )
    }

    /// Resolve the first variable (in order) that yields at least one key.
    ///
    /// Returns the set together with the name of the variable it came from.
    pub fn resolve<'a>(
        vars: &'a [String],
        lookup: impl Fn(&str) -> Option<String>,
    ) -> (Self, Option<&'a str>) {
        for var in vars {
            if let Some(raw) = lookup(var) {
                let set = Self::parse(&raw);
                if !set.is_empty() {
                    return (set, Some(var.as_str()));
                }
            }
        }
        (Self::default(), None)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.0.iter()
    }
}

impl From<Vec<Credential>> for CredentialSet {
    fn from(keys: Vec<Credential>) -> Self {
        Self(keys)
    }
}

/// Round-robin cursor over a [`CredentialSet`].
///
/// The cursor is shared by all concurrent calls against the same provider and is advanced
/// before the outcome of an attempt is known. Two overlapping calls therefore start on
/// different keys; exact key order under concurrency is not deterministic.
#[derive(Debug, Default)]
pub struct KeyRotator {
    keys: CredentialSet,
    cursor: AtomicUsize,
}

impl KeyRotator {
    pub fn new(keys: CredentialSet) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Take the key under the cursor and advance the cursor by one (mod N).
    ///
    /// Returns `None` only when the set is empty.
    pub fn next(&self) -> Option<(usize, &Credential)> {
        let n = self.keys.len();
        if n == 0 {
            return None;
        }
        let slot = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % n))
            .unwrap_or_else(|current| current)
            % n;
        self.keys.0.get(slot).map(|key| (slot, key))
    }

    /// Current cursor position in `[0, N)`.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn secrets(set: &CredentialSet) -> Vec<&str> {
        set.iter().map(Credential::expose).collect()
    }

    #[rstest]
    #[case(" a , b ,c ", vec!["a", "b", "c"])]
    #[case("a,b,c,", vec!["a", "b", "c"])]
    #[case(",, a,,", vec!["a"])]
    #[case("single", vec!["single"])]
    #[case("", vec![])]
    #[case(" , ,", vec![])]
    fn test_parse_trims_and_drops_empty(#[case] raw: &str, #[case] expected: Vec<&str>) {
        let set = CredentialSet::parse(raw);
        assert_eq!(secrets(&set), expected);
    }

    #[test]
    fn test_resolve_prefers_first_non_empty_var() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEYS", " , "),
            ("GEMINI_API_KEY", "legacy-key"),
        ]);
        let vars = vec!["GEMINI_API_KEYS".to_string(), "GEMINI_API_KEY".to_string()];

        let (set, source) =
            CredentialSet::resolve(&vars, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(secrets(&set), vec!["legacy-key"]);
        assert_eq!(source, Some("GEMINI_API_KEY"));
    }

    #[test]
    fn test_resolve_missing_vars_gives_empty_set() {
        let vars = vec!["NOPE".to_string()];
        let (set, source) = CredentialSet::resolve(&vars, |_| None);
        assert!(set.is_empty());
        assert_eq!(source, None);
    }

    #[test]
    fn test_suffix_never_reveals_full_secret() {
        assert_eq!(Credential::new("sk-1234567890abcdef").suffix(), "...bcdef");
        assert_eq!(Credential::new("short").suffix(), "****");
        assert_eq!(Credential::new("12345678").suffix(), "****");

        let debug = format!("{:?}", Credential::new("sk-very-secret-value"));
        assert!(!debug.contains("sk-very-secret"));
    }

    #[test]
    fn test_rotator_wraps_around() {
        let rotator = KeyRotator::new(CredentialSet::parse("a,b,c"));

        let used: Vec<&str> = (0..7)
            .map(|_| rotator.next().unwrap().1.expose())
            .collect();

        assert_eq!(used, vec!["a", "b", "c", "a", "b", "c", "a"]);
        assert_eq!(rotator.position(), 1);
    }

    #[test]
    fn test_empty_rotator_yields_nothing() {
        let rotator = KeyRotator::new(CredentialSet::default());
        assert!(rotator.next().is_none());
        assert!(rotator.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_spreads_load() {
        let rotator = Arc::new(KeyRotator::new(CredentialSet::parse("k0,k1,k2,k3")));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rotator = Arc::clone(&rotator);
            handles.push(tokio::spawn(async move {
                let mut slots = Vec::new();
                for _ in 0..100 {
                    slots.push(rotator.next().unwrap().0);
                }
                slots
            }));
        }

        let mut counts = [0usize; 4];
        for handle in handles {
            for slot in handle.await.unwrap() {
                counts[slot] += 1;
            }
        }

        // The cursor is advanced atomically, so 800 draws over 4 keys are perfectly even.
        assert_eq!(counts, [200, 200, 200, 200]);
        assert_eq!(rotator.position(), 0);
    }
}
