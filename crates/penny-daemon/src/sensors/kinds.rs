//! Value readers, keyed by sensor kind.

/// Reads one value from a source identifier, usually a file path.
pub type ValueReader = fn(&str) -> penny_hw::Result<f64>;

/// Registered kinds.
const KINDS: &[(&str, ValueReader)] = &[("w1-therm", w1_therm)];

/// Looks up the reader for `kind`.
pub fn lookup(kind: &str) -> Option<ValueReader> {
    KINDS
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, reader)| *reader)
}

fn w1_therm(source: &str) -> penny_hw::Result<f64> {
    penny_hw::read_w1_therm(source)
}
