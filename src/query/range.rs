//! npm-style version ranges on top of [`semver::VersionReq`].
//!
//! Pack queries use the range syntax of the JavaScript ecosystem, where
//! comparators are separated by whitespace and alternatives by `||`. The
//! `semver` crate expects comma-separated comparators and treats a bare
//! version as a caret requirement, so ranges are normalized first:
//!
//! | Query | Normalized |
//! |-------|------------|
//! | `1.2.3` | `=1.2.3` |
//! | `>= 1.0.0 < 2.0.0` | `>=1.0.0, <2.0.0` |
//! | `1.0.0 - 1.4.0` | `>=1.0.0, <=1.4.0` |
//! | `^1.0.0 \|\| ^3.0.0` | `^1.0.0` or `^3.0.0` |
//! | `1.x`, `*`, `v2` | `1.x`, `*`, `=2` |

use semver::{Version, VersionReq};

/// A disjunction of [`VersionReq`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<VersionReq>,
}

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '~', '^'];

fn normalize_comparator(token: &str) -> String {
    let operator_len = token.len() - token.trim_start_matches(OPERATOR_CHARS).len();
    let (operator, version) = token.split_at(operator_len);
    let version = version.strip_prefix(['v', 'V']).unwrap_or(version);
    let is_wildcard = version.is_empty() || version.split('.').any(|part| matches!(part, "*" | "x" | "X"));
    if operator.is_empty() && !is_wildcard {
        format!("={version}")
    } else {
        format!("{operator}{version}")
    }
}

fn normalize_alternative(alternative: &str) -> String {
    let tokens: Vec<&str> = alternative.split_whitespace().collect();

    if let [low, "-", high] = tokens.as_slice() {
        return format!(">={}, <={}", normalize_comparator(low).trim_start_matches('='), normalize_comparator(high).trim_start_matches('='));
    }

    let mut comparators = Vec::new();
    let mut pending_operator: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            pending_operator = Some(token);
            continue;
        }
        let comparator = match pending_operator.take() {
            Some(op) => format!("{op}{token}"),
            None => token.to_string(),
        };
        comparators.push(normalize_comparator(&comparator));
    }
    if comparators.is_empty() {
        return "*".to_string();
    }
    comparators.join(", ")
}

impl VersionRange {
    /// Parse a range; `None` if any alternative is not a valid requirement.
    pub fn parse(range: &str) -> Option<Self> {
        let alternatives = range
            .split("||")
            .map(|alt| VersionReq::parse(&normalize_alternative(alt)).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The highest version in `versions` satisfying this range. Entries that
    /// are not valid versions are skipped.
    pub fn max_satisfying<'a, I>(&self, versions: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        versions
            .into_iter()
            .filter_map(|raw| Version::parse(raw).ok().map(|v| (v, raw)))
            .filter(|(version, _)| self.matches(version))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, raw)| raw)
    }
}
