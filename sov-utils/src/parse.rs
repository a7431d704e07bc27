/// Parse a compact duration token like `30s`, `10m`, `2h`, `1d`, or plain seconds.
pub fn parse_duration_seconds(raw: &str) -> Option<u64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    let compact: String = value.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let bytes = compact.as_bytes();
    let mut cursor = 0;
    let mut total_seconds = 0_u64;
    let mut saw_unit_segment = false;

    while cursor < bytes.len() {
        let number_start = cursor;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }

        if number_start == cursor {
            return None;
        }

        let number = compact[number_start..cursor].parse::<u64>().ok()?;
        if number == 0 {
            return None;
        }

        let saw_unit = cursor < bytes.len();
        let multiplier = if saw_unit {
            let unit = bytes[cursor] as char;
            cursor += 1;

            match unit {
                's' | 'S' => 1_u64,
                'm' | 'M' => 60_u64,
                'h' | 'H' => 60_u64 * 60,
                'd' | 'D' => 60_u64 * 60 * 24,
                _ => return None,
            }
        } else {
            1_u64
        };

        if !saw_unit && saw_unit_segment {
            return None;
        }

        saw_unit_segment = saw_unit_segment || saw_unit;

        let part_seconds = number.checked_mul(multiplier)?;
        total_seconds = total_seconds.checked_add(part_seconds)?;
    }

    if total_seconds == 0 {
        None
    } else {
        Some(total_seconds)
    }
}

pub fn has_duration_unit(raw: &str) -> bool {
    let value = raw.trim();
    let Some(last) = value.chars().last() else {
        return false;
    };

    matches!(last, 's' | 'S' | 'm' | 'M' | 'h' | 'H' | 'd' | 'D')
}

fn is_explicit_unit_duration_token(raw: &str) -> bool {
    has_duration_unit(raw) && parse_duration_seconds(raw).is_some()
}

/// Parse a user reference: `<@123>`, `<@!123>` or a bare snowflake.
pub fn parse_user_id(raw: &str) -> Option<u64> {
    let value = raw.trim();
    let digits = value
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.strip_prefix('!').unwrap_or(inner))
        .unwrap_or(value);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse::<u64>().ok().filter(|id| *id > 0)
}

/// Split off the first whitespace-delimited token, returning it and the trimmed remainder.
pub fn split_first_arg(input: &str) -> (Option<&str>, &str) {
    let trimmed = input.trim_start();
    if trimmed.is_empty() {
        return (None, "");
    }

    match trimmed.find(char::is_whitespace) {
        Some(idx) => (Some(&trimmed[..idx]), trimmed[idx..].trim()),
        None => (Some(trimmed), ""),
    }
}

/// Split leading duration tokens (`1h 30m ...`) from the free-form reason that follows.
///
/// The first token is taken as a duration only when it carries a unit; a `--` token
/// ends duration parsing explicitly so a reason may start with something like `10m`.
pub fn split_duration_and_reason(input: &str) -> (Option<String>, Option<String>) {
    let mut duration_parts = Vec::new();
    let mut reason_tokens = Vec::new();
    let mut tokens = input.split_whitespace();

    while let Some(token) = tokens.next() {
        if token == "--" {
            reason_tokens.extend(tokens.by_ref());
            break;
        }

        if is_explicit_unit_duration_token(token) {
            duration_parts.push(token);
            continue;
        }

        reason_tokens.push(token);
        reason_tokens.extend(tokens.by_ref());
        break;
    }

    let parsed_duration = if duration_parts.is_empty() {
        None
    } else {
        Some(duration_parts.join(" "))
    };

    let parsed_reason = if reason_tokens.is_empty() {
        None
    } else {
        Some(reason_tokens.join(" "))
    };

    (parsed_duration, parsed_reason)
}

#[cfg(test)]
mod tests {
    use super::{
        parse_duration_seconds, parse_user_id, split_duration_and_reason, split_first_arg,
    };

    #[test]
    fn parses_compact_durations() {
        assert_eq!(parse_duration_seconds("30s"), Some(30));
        assert_eq!(parse_duration_seconds("10m"), Some(600));
        assert_eq!(parse_duration_seconds("1h 30m"), Some(5_400));
        assert_eq!(parse_duration_seconds("2d"), Some(172_800));
        assert_eq!(parse_duration_seconds("45"), Some(45));
        assert_eq!(parse_duration_seconds("0m"), None);
        assert_eq!(parse_duration_seconds("10x"), None);
        assert_eq!(parse_duration_seconds("1h 5"), None);
        assert_eq!(parse_duration_seconds(""), None);
    }

    #[test]
    fn parses_user_references() {
        assert_eq!(parse_user_id("<@1234>"), Some(1234));
        assert_eq!(parse_user_id("<@!1234>"), Some(1234));
        assert_eq!(parse_user_id(" 987 "), Some(987));
        assert_eq!(parse_user_id("<#1234>"), None);
        assert_eq!(parse_user_id("someone"), None);
        assert_eq!(parse_user_id("0"), None);
    }

    #[test]
    fn splits_first_argument() {
        assert_eq!(split_first_arg("  <@1> spamming links "), (Some("<@1>"), "spamming links"));
        assert_eq!(split_first_arg("<@1>"), (Some("<@1>"), ""));
        assert_eq!(split_first_arg("   "), (None, ""));
    }

    #[test]
    fn splits_duration_from_reason() {
        assert_eq!(
            split_duration_and_reason("1h 30m flooding the channel"),
            (Some("1h 30m".to_owned()), Some("flooding the channel".to_owned()))
        );
        assert_eq!(
            split_duration_and_reason("flooding 10m"),
            (None, Some("flooding 10m".to_owned()))
        );
        assert_eq!(
            split_duration_and_reason("-- 10m of spam"),
            (None, Some("10m of spam".to_owned()))
        );
        assert_eq!(split_duration_and_reason("2h"), (Some("2h".to_owned()), None));
        assert_eq!(split_duration_and_reason(""), (None, None));
    }
}
