/// Split a raw `Key: Value` block into header pairs.
///
/// Lines are separated by `\n`. A line must contain exactly one `:`;
/// anything else is skipped. Leading spaces of the value are trimmed, the
/// rest is kept as sent.
#[must_use]
pub fn parse_header_block(block: &str) -> Vec<(String, String)> {
    block
        .split('\n')
        .filter_map(|line| {
            let mut parts = line.split(':');
            let key = parts.next()?;
            let value = parts.next()?;
            if parts.next().is_some() {
                return None;
            }
            Some((key.to_owned(), value.trim_start_matches(' ').to_owned()))
        })
        .collect()
}
