//! Resolver targets and resolver list parsing.

use crate::error::ListError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

/// One resolver to probe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolverTarget {
    pub host: String,
    pub port: u16,
}

impl ResolverTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl std::fmt::Display for ResolverTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A line that could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based
    pub line: usize,
    pub content: String,
}

/// Parsed resolver list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverList {
    /// Unique targets in first-seen order
    pub targets: Vec<ResolverTarget>,
    pub rejected: Vec<RejectedLine>,
}

/// Strict dotted-quad check
pub fn is_valid_ipv4(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

/// Parse a resolver list, one `ip` or `ip:port` per line
///
/// `#` starts a comment. Blank lines are skipped, duplicates collapse onto
/// the first occurrence.
pub fn parse_resolver_list(text: &str, default_port: u16) -> ResolverList {
    let mut list = ResolverList::default();
    let mut seen = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let entry = raw.split('#').next().unwrap_or_default().trim();
        if entry.is_empty() {
            continue;
        }

        match parse_entry(entry, default_port) {
            Some(target) => {
                if seen.insert(target.clone()) {
                    list.targets.push(target);
                }
            }
            None => list.rejected.push(RejectedLine {
                line: idx + 1,
                content: entry.to_string(),
            }),
        }
    }

    list
}

/// Read and parse a resolver list file
///
/// Fails when the file cannot be read or holds no usable entry.
pub fn load_resolver_list(path: &Path, default_port: u16) -> Result<ResolverList, ListError> {
    let text = std::fs::read_to_string(path).map_err(|e| ListError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let list = parse_resolver_list(&text, default_port);
    if list.targets.is_empty() {
        return Err(ListError::Empty {
            path: path.display().to_string(),
            rejected: list.rejected.len(),
        });
    }
    Ok(list)
}

fn parse_entry(entry: &str, default_port: u16) -> Option<ResolverTarget> {
    let (host, port) = match entry.split_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok().filter(|p| *p != 0)?),
        None => (entry, default_port),
    };
    is_valid_ipv4(host).then(|| ResolverTarget::new(host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_validation() {
        assert!(is_valid_ipv4("8.8.8.8"));
        assert!(is_valid_ipv4("255.255.255.255"));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.2.3"));
        assert!(!is_valid_ipv4("1.2.3.4.5"));
        assert!(!is_valid_ipv4("dns.google"));
        assert!(!is_valid_ipv4(""));
    }

    #[test]
    fn test_parse_list() {
        let text = "\
# public resolvers
8.8.8.8
1.1.1.1:5353   # custom port

9.9.9.9
8.8.8.8
not-an-ip
1.1.1.1:99999
";
        let list = parse_resolver_list(text, 53);
        assert_eq!(
            list.targets,
            vec![
                ResolverTarget::new("8.8.8.8", 53),
                ResolverTarget::new("1.1.1.1", 5353),
                ResolverTarget::new("9.9.9.9", 53),
            ]
        );
        assert_eq!(list.rejected.len(), 2);
        assert_eq!(list.rejected[0], RejectedLine { line: 7, content: "not-an-ip".into() });
        assert_eq!(list.rejected[1].line, 8);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("slipnet-hosts-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("resolvers.txt");
        std::fs::write(&good, "1.1.1.1\n8.8.8.8:5353\n").unwrap();
        let list = load_resolver_list(&good, 53).unwrap();
        assert_eq!(list.targets.len(), 2);

        let bad = dir.join("garbage.txt");
        std::fs::write(&bad, "# nothing\nhello\n").unwrap();
        assert!(matches!(
            load_resolver_list(&bad, 53),
            Err(ListError::Empty { rejected: 1, .. })
        ));

        assert!(matches!(
            load_resolver_list(&dir.join("missing.txt"), 53),
            Err(ListError::Io { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_same_host_different_ports_kept() {
        let list = parse_resolver_list("8.8.8.8\n8.8.8.8:5353\n8.8.8.8:53", 53);
        assert_eq!(list.targets.len(), 2);
        assert_eq!(list.targets[1].to_string(), "8.8.8.8:5353");
    }
}
