use std::collections::BTreeMap;
use std::fmt;

pub const UP: &str = "zk_up";
pub const RUOK: &str = "zk_ruok";
pub const SERVER_LEADER: &str = "zk_server_leader";
pub const VERSION: &str = "zk_version";
pub const PEER_STATE: &str = "zk_peer_state";

pub const HOST_LABEL: &str = "zk_host";

/// Metric key to value, for one scrape. Values are kept as the raw strings
/// ZooKeeper reported, so nothing is lost to float formatting.
pub type Snapshot = BTreeMap<MetricKey, String>;

/// A metric name and its ordered labels, rendered in the exposition format
/// as `name{label="value",...}`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    /// A metric carrying only the host label.
    pub fn new(name: impl Into<String>, host: &str) -> Self {
        Self {
            name: name.into(),
            labels: vec![(HOST_LABEL.to_string(), host.to_string())],
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Build a key from a raw `mntr` key. Hyphens and dots are not allowed in
    /// metric names and become underscores. Labels already embedded in the key,
    /// e.g. `zk_foo{bar="baz"}`, are kept and the host label goes last.
    pub fn from_stat(key: &str, host: &str) -> Self {
        let normalized = normalize(key);

        match normalized.split_once('{') {
            Some((name, rest)) => {
                let inner = rest.split_once('}').map_or(rest, |(inner, _)| inner);
                let mut labels = inner
                    .split(',')
                    .filter_map(|pair| {
                        let (k, v) = pair.split_once('=')?;
                        Some((k.trim().to_string(), v.trim().trim_matches('"').to_string()))
                    })
                    .collect::<Vec<_>>();
                labels.push((HOST_LABEL.to_string(), host.to_string()));

                Self {
                    name: name.to_string(),
                    labels,
                }
            }
            None => Self::new(normalized, host),
        }
    }

    #[cfg(test)]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub(crate) fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.labels.is_empty() {
            return Ok(());
        }

        f.write_str("{")?;
        for (index, (key, value)) in self.labels.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}=\"")?;
            write_escaped(f, value)?;
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

fn normalize(key: &str) -> String {
    key.replace(['-', '.'], "_")
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{c}")?,
        }
    }

    Ok(())
}
