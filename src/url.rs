//! Destination parsing: `host`, `host:port`, `[v6]:port` or `dropline://host:port`

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

pub fn parse_destination(s: &str, default_port: u16) -> Option<Destination> {
    let s_trim = s.trim();
    let mut rest = s_trim;
    if let Some(scheme_end) = s_trim.find("://") {
        if !s_trim[..scheme_end].eq_ignore_ascii_case("dropline") {
            return None;
        }
        rest = &s_trim[scheme_end + 3..];
    }
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() || rest.contains('/') {
        return None;
    }

    // Bracketed IPv6, optionally with a port
    if let Some(inner) = rest.strip_prefix('[') {
        let (host, after) = inner.split_once(']')?;
        let port = match after {
            "" => default_port,
            p => p.strip_prefix(':')?.parse().ok()?,
        };
        if host.is_empty() {
            return None;
        }
        return Some(Destination {
            host: host.to_string(),
            port,
        });
    }

    // Bare IPv6 has several colons and no port
    if rest.matches(':').count() > 1 {
        return Some(Destination {
            host: rest.to_string(),
            port: default_port,
        });
    }

    let (host, port) = match rest.split_once(':') {
        Some((h, pr)) => (h, pr.parse().ok()?),
        None => (rest, default_port),
    };
    if host.is_empty() {
        return None;
    }
    Some(Destination {
        host: host.to_string(),
        port,
    })
}
