//! Field patterns as the telemetry service accepts them in query filters.
//!
//! Only the wildcard subset is supported: `*` and `.*` match any run of
//! characters, everything else is literal, and the whole value must match.

use fleetwatch_types::{MetricRecord, MetricsQuery};

/// A compiled field pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Literal pieces between wildcards.
    pieces: Vec<String>,
    leading_wildcard: bool,
    trailing_wildcard: bool,
}

impl Pattern {
    pub fn new(pattern: &str) -> Self {
        let mut pieces = vec![String::new()];
        let mut chars = pattern.chars().peekable();
        let mut wildcards = 0usize;

        while let Some(c) = chars.next() {
            let is_wildcard = match c {
                '*' => true,
                '.' if chars.peek() == Some(&'*') => {
                    chars.next();
                    true
                }
                _ => false,
            };

            if is_wildcard {
                wildcards += 1;
                pieces.push(String::new());
            } else if let Some(last) = pieces.last_mut() {
                last.push(c);
            }
        }

        let leading_wildcard = wildcards > 0 && pieces.first().is_some_and(String::is_empty);
        let trailing_wildcard = wildcards > 0 && pieces.last().is_some_and(String::is_empty);
        pieces.retain(|p| !p.is_empty());

        Self {
            pieces,
            leading_wildcard,
            trailing_wildcard,
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        let no_wildcards = !self.leading_wildcard && !self.trailing_wildcard && self.pieces.len() <= 1;
        if no_wildcards {
            return self.pieces.first().map_or(value.is_empty(), |p| p == value);
        }

        let mut rest = value;
        let last = self.pieces.len().saturating_sub(1);

        for (i, piece) in self.pieces.iter().enumerate() {
            if i == 0 && !self.leading_wildcard {
                match rest.strip_prefix(piece.as_str()) {
                    Some(r) => rest = r,
                    None => return false,
                }
            } else if i == last && !self.trailing_wildcard {
                return rest.ends_with(piece.as_str());
            } else {
                match rest.find(piece.as_str()) {
                    Some(at) => rest = &rest[at + piece.len()..],
                    None => return false,
                }
            }
        }

        self.trailing_wildcard || rest.is_empty()
    }
}

/// Value of a query filter field on a record.
fn field<'a>(record: &'a MetricRecord, name: &str) -> Option<&'a str> {
    let meta = &record.meta;
    match name {
        "name" => Some(record.name.as_str()),
        "node" => meta.node.as_deref(),
        "host" => meta.host.as_deref(),
        "vsn" => meta.vsn.as_deref(),
        "plugin" => meta.plugin.as_deref(),
        "sensor" => meta.sensor.as_deref(),
        "severity" => meta.severity.as_deref(),
        other => meta.extra.get(other).map(String::as_str),
    }
}

/// True if the record satisfies every field pattern in the query.
pub fn matches_query(record: &MetricRecord, query: &MetricsQuery) -> bool {
    query.filter.iter().all(|(name, pattern)| {
        field(record, name).is_some_and(|value| Pattern::new(pattern).matches(value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_types::MetricValue;

    #[test]
    fn test_literal() {
        let p = Pattern::new("sys.uptime");
        assert!(p.matches("sys.uptime"));
        assert!(!p.matches("sys.uptime2"));
        assert!(!p.matches("sys"));
    }

    #[test]
    fn test_trailing_wildcard() {
        let p = Pattern::new("sys.sanity_status.*");
        assert!(p.matches("sys.sanity_status.os"));
        assert!(!p.matches("sys.uptime"));

        assert!(Pattern::new("sys.*").matches("sys.uptime"));
        assert!(Pattern::new(".*").matches(""));
        assert!(Pattern::new("*").matches("anything"));
    }

    #[test]
    fn test_inner_wildcards() {
        let p = Pattern::new("sys.*.os");
        assert!(p.matches("sys.sanity_status.os"));
        assert!(!p.matches("sys.sanity_status.gpu"));

        let p = Pattern::new("*temp*");
        assert!(p.matches("env.temperature"));
        assert!(!p.matches("env.pressure"));
    }

    #[test]
    fn test_matches_query() {
        let record = MetricRecord::builder("env.temperature", MetricValue::Number(20.0))
            .node("a")
            .sensor("bme280")
            .tag("zone", "core")
            .build();

        assert!(matches_query(&record, &MetricsQuery::temperature()));
        assert!(matches_query(&record, &MetricsQuery::new("-1h").filter("zone", "c*")));
        assert!(!matches_query(&record, &MetricsQuery::system()));
        assert!(!matches_query(&record, &MetricsQuery::new("-1h").filter("host", "*")));
    }
}
