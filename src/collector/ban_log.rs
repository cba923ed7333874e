// Ban event extraction from fail2ban log text.
//
// A typical line:
//   2024-03-02 10:15:01,532 fail2ban.actions [811]: NOTICE  [sshd] Ban 203.0.113.7
//
// "Restore Ban" lines are written when fail2ban reloads bans at startup and
// carry the restart time, so they are skipped. "Increase Ban" is a fresh ban
// with a longer bantime and counts as a ban in its jail.
use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};

use crate::collector::parsers::looks_like_address;
use crate::collector::results::BanEvent;

lazy_static::lazy_static! {
    static ref TIMESTAMP: Regex = Regex::new(
        r"(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2})(?:[,.](\d+))?"
    ).unwrap();
    static ref BRACKETED_BAN: Regex = Regex::new(
        r"\[([^\]\s]+)\]\s+(?:(Restore|Increase)\s+)?Ban\s+([0-9A-Fa-f:./]+)"
    ).unwrap();
    // A jail token followed later by the word Ban. The process id bracket
    // ("[811]:") is excluded by the required whitespace.
    static ref BRACKETED_JAIL_BEFORE_BAN: Regex = Regex::new(
        r"\[[^\]\s]+\]\s[^\[\]]*\bBan\b"
    ).unwrap();
    static ref BARE_BAN: Regex = Regex::new(
        r"(?:^|\s)([A-Za-z0-9_.@-]+):?\s+Ban\s+([0-9A-Fa-f:./]+)"
    ).unwrap();
}

/// Recovers every ban event in `log`.
///
/// Lines without a timestamp, jail and address are skipped. A timestamp that
/// matches lexically but is not a real date resolves to `fallback_time` so the
/// jail/address pair is kept.
pub fn extract_ban_events(log: &str, fallback_time: DateTime<Utc>) -> Vec<BanEvent> {
    log.lines()
        .filter_map(|line| parse_line(line, fallback_time))
        .collect()
}

/// The last `max_lines` lines of `text`.
pub fn tail_lines(text: &str, max_lines: usize) -> &str {
    if max_lines == 0 {
        return "";
    }
    let mut seen = 0;
    for (idx, byte) in text.bytes().enumerate().rev() {
        // A trailing newline terminates the last line rather than starting a new one.
        if byte == b'\n' && idx + 1 != text.len() {
            seen += 1;
            if seen == max_lines {
                return &text[idx + 1..];
            }
        }
    }
    text
}

fn parse_line(line: &str, fallback_time: DateTime<Utc>) -> Option<BanEvent> {
    let stamp = TIMESTAMP.captures(line)?;
    let (jail, address) = ban_target(line)?;

    Some(BanEvent {
        jail,
        address,
        timestamp: to_utc(&stamp).unwrap_or(fallback_time),
    })
}

fn ban_target(line: &str) -> Option<(String, String)> {
    if let Some(caps) = BRACKETED_BAN.captures(line) {
        if caps.get(2).map(|m| m.as_str()) == Some("Restore") {
            return None;
        }
        let address = &caps[3];
        return looks_like_address(address).then(|| (caps[1].to_string(), address.to_string()));
    }
    if BRACKETED_JAIL_BEFORE_BAN.is_match(line) {
        return None;
    }

    let caps = BARE_BAN.captures(line)?;
    looks_like_address(&caps[2]).then(|| (caps[1].to_string(), caps[2].to_string()))
}

fn to_utc(caps: &Captures) -> Option<DateTime<Utc>> {
    let field = |i: usize| caps[i].parse::<u32>().ok();
    let year = caps[1].parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?;

    let nanos = caps
        .get(7)
        .map(|frac| {
            let digits: String = frac.as_str().chars().chain(std::iter::repeat('0')).take(9).collect();
            digits.parse::<u32>().unwrap_or(0)
        })
        .unwrap_or(0);

    date.and_hms_nano_opt(field(4)?, field(5)?, field(6)?, nanos)
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_extracts_bracketed_ban() {
        let log = "2024-03-02 10:15:01,532 fail2ban.actions [811]: NOTICE  [sshd] Ban 203.0.113.7";
        let events = extract_ban_events(log, fallback());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].jail, "sshd");
        assert_eq!(events[0].address, "203.0.113.7");
        assert_eq!(
            events[0].timestamp,
            Utc.with_ymd_and_hms(2024, 3, 2, 10, 15, 1).unwrap() + chrono::Duration::milliseconds(532)
        );
    }

    #[test]
    fn test_skips_unban_and_garbage() {
        let log = "\
2024-03-02 10:15:01,532 fail2ban.actions [811]: NOTICE  [sshd] Unban 203.0.113.7
garbage line with Ban but nothing else
2024-03-02 10:15:02 fail2ban.filter [811]: INFO    [sshd] Found 203.0.113.8
\u{0}\u{1}binary
2024-03-02 10:16:00,001 fail2ban.actions [811]: NOTICE  [nginx-http] Ban 198.51.100.2";
        let events = extract_ban_events(log, fallback());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].jail, "nginx-http");
    }

    #[test]
    fn test_invalid_date_uses_fallback() {
        let log = "2024-13-45 99:00:00,000 fail2ban.actions: NOTICE [sshd] Ban 1.2.3.4";
        let events = extract_ban_events(log, fallback());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, fallback());
    }

    #[test]
    fn test_bare_jail_adjacent_to_ban() {
        let log = "2024-03-02 10:15:01 fail2ban.actions: WARNING sshd Ban 10.0.0.5";
        let events = extract_ban_events(log, fallback());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].jail, "sshd");
        assert_eq!(events[0].address, "10.0.0.5");
    }

    #[test]
    fn test_restore_ban_skipped() {
        let log = "2024-03-02 10:15:01,532 fail2ban.actions [811]: NOTICE  [sshd] Restore Ban 1.2.3.4";
        assert!(extract_ban_events(log, fallback()).is_empty());
    }

    #[test]
    fn test_increase_ban_keeps_bracketed_jail() {
        let log = "2024-03-02 10:15:01,532 fail2ban.actions [811]: NOTICE  [recidive] Increase Ban 1.2.3.4 (2 # 2:00:00 -> 2024-03-02 12:15:01)";
        let events = extract_ban_events(log, fallback());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].jail, "recidive");
        assert_eq!(events[0].address, "1.2.3.4");
    }

    #[test]
    fn test_bracketed_jail_never_falls_back_to_bare_token() {
        let log = "2024-03-02 10:15:01,532 fail2ban.actions [811]: NOTICE  [sshd] Rebuild Ban 1.2.3.4";
        assert!(extract_ban_events(log, fallback()).is_empty());
    }

    #[test]
    fn test_ipv6_ban() {
        let log = "2024-03-02 10:15:01.25 [sshd] Ban 2001:db8::7";
        let events = extract_ban_events(log, fallback());

        assert_eq!(events[0].address, "2001:db8::7");
        assert_eq!(events[0].timestamp.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc\n");
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a\nb", 5), "a\nb");
        assert_eq!(tail_lines("a\nb", 0), "");
    }
}
