/// Scans free text for `key: <number>` and returns the number.
///
/// The key may be followed by whitespace (`temp: 21.5`) or not (`temp:21.5`). Only the
/// leading numeric part of the value is used, so units and trailing text (`21.50*C`) are
/// ignored. The first occurrence that carries a number wins; anything else is `None`.
pub fn parse_numeric(text: &str, key: &str) -> Option<f64> {
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        let Some(rest) = token.strip_prefix(key).and_then(|t| t.strip_prefix(':')) else {
            continue;
        };
        let value = if rest.is_empty() {
            // Peek without consuming, the next token may itself be the key again.
            tokens.clone().next()
        } else {
            Some(rest)
        };
        if let Some(number) = value.and_then(leading_number) {
            return Some(number);
        }
    }
    None
}

fn leading_number(token: &str) -> Option<f64> {
    let end = token
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map_or(token.len(), |(i, _)| i);
    token[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_value_ignoring_other_fields() {
        assert_eq!(parse_numeric("sensor 0: temp: 21.7 humidity: 40", "temp"), Some(21.7));
        assert_eq!(parse_numeric("sensor 0: temp: 21.7 humidity: 40", "humidity"), Some(40.0));
    }

    #[test]
    fn ignores_units_and_surrounding_text() {
        assert_eq!(parse_numeric("> sensor #0 returned temp: 21.50 *C\n", "temp"), Some(21.5));
        assert_eq!(parse_numeric("temp: 19.25°C", "temp"), Some(19.25));
        assert_eq!(parse_numeric("temp:23.5", "temp"), Some(23.5));
        assert_eq!(parse_numeric("temp:\t-4.75 *C", "temp"), Some(-4.75));
    }

    #[test]
    fn first_match_wins() {
        assert_eq!(parse_numeric("temp: 1.0 temp: 2.0", "temp"), Some(1.0));
        assert_eq!(parse_numeric("temp: n/a temp: 2.0", "temp"), Some(2.0));
    }

    #[test]
    fn missing_or_malformed_values_are_no_match() {
        assert_eq!(parse_numeric("", "temp"), None);
        assert_eq!(parse_numeric("> err: command not found", "temp"), None);
        assert_eq!(parse_numeric("temp:", "temp"), None);
        assert_eq!(parse_numeric("temp: .", "temp"), None);
        assert_eq!(parse_numeric("temp: 1.2.3", "temp"), None);
        assert_eq!(parse_numeric("temperature 21.5", "temp"), None);
        assert_eq!(parse_numeric("\u{0}\u{fffd}temp\u{fffd}: 3", "temp"), None);
    }
}
