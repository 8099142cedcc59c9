use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds on a monotonic clock. Only differences are meaningful.
pub fn timestamp_us() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}

/// Splits `s` on `sep`, keeping empty fields so that a leading separator
/// still yields an (empty) first element.
pub fn split_options(s: &str, sep: char) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(sep).map(|part| part.trim().to_string()).collect()
}

/// Parses `k=v:k2=v2` into ordered pairs. Malformed entries are logged and
/// skipped.
pub fn parse_option_pairs(s: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for elem in split_options(s, ':') {
        if elem.is_empty() {
            continue;
        }
        match elem.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.contains('=') => {
                pairs.push((key.to_string(), value.to_string()));
            }
            _ => {
                log::warn!("Ignoring invalid option string '{}'", elem);
            }
        }
    }

    pairs
}
