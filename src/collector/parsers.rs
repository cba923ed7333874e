// Parsers for fail2ban-client text output.
//
// The client prints a human-readable tree whose layout has drifted across
// releases, so every parser runs an ordered list of matchers and keeps the
// first non-empty result. A miss is never an error.
use regex::Regex;

type Matcher = fn(&str) -> Vec<String>;

lazy_static::lazy_static! {
    static ref JAIL_LIST_LINE: Regex = Regex::new(r"(?m)Jail list:[ \t]*(.*)$").unwrap();
    static ref JAIL_SECTION_HEADER: Regex = Regex::new(r"Status for the jail:[ \t]*(\S+)").unwrap();
    static ref BANNED_IP_LIST: Regex = Regex::new(r"(?s)Banned IP list:(.*)").unwrap();
    static ref BANNED_LINE: Regex = Regex::new(r"(?m)Banned:[ \t]*(.*)$").unwrap();
    static ref LIST_SEPARATOR: Regex = Regex::new(r"[,\s]+").unwrap();
    static ref BANTIME_WITH_UNIT: Regex = Regex::new(r"^(\d+)\s*([smhd])?$").unwrap();
    static ref ADDRESS_TOKEN: Regex = Regex::new(r"^[0-9A-Fa-f:.]+(?:/\d{1,3})?$").unwrap();
}

const JAIL_LIST_MATCHERS: &[Matcher] = &[jail_list_line, jail_section_headers];
const BANNED_LIST_MATCHERS: &[Matcher] = &[banned_ip_list, banned_line];

/// Jail names announced by `fail2ban-client status`, in announced order.
pub fn parse_jail_list(output: &str) -> Vec<String> {
    dedup_preserving_order(first_match(JAIL_LIST_MATCHERS, output))
}

/// Addresses listed by `fail2ban-client status <jail>`, in listed order.
pub fn parse_banned_list(output: &str) -> Vec<String> {
    first_match(BANNED_LIST_MATCHERS, output)
}

/// Ban duration from `fail2ban-client get <jail> bantime`, in seconds.
///
/// Accepts `600`, `10m`, `1h`, `2d` and decimal seconds. Anything else,
/// including the permanent-ban marker `-1`, yields 0.
pub fn parse_bantime(output: &str) -> u64 {
    let value = output.trim();
    if value.is_empty() {
        return 0;
    }

    if let Some(caps) = BANTIME_WITH_UNIT.captures(value) {
        let magnitude: u64 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => return 0,
        };
        let multiplier = match caps.get(2).map(|m| m.as_str()) {
            None | Some("s") => 1,
            Some("m") => 60,
            Some("h") => 3_600,
            Some("d") => 86_400,
            Some(_) => return 0,
        };
        return magnitude.saturating_mul(multiplier);
    }

    match value.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => secs as u64,
        _ => 0,
    }
}

/// Loose IPv4/IPv6 literal check, optionally with a CIDR suffix.
pub fn looks_like_address(token: &str) -> bool {
    ADDRESS_TOKEN.is_match(token)
        && (token.contains('.') || token.contains(':'))
        && token.chars().any(|c| c.is_ascii_digit())
}

/// Jail names are interpolated into remote command lines.
pub fn is_safe_jail_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
}

fn first_match(matchers: &[Matcher], text: &str) -> Vec<String> {
    matchers
        .iter()
        .map(|matcher| matcher(text))
        .find(|values| !values.is_empty())
        .unwrap_or_default()
}

fn split_list(items: &str) -> impl Iterator<Item = &str> {
    LIST_SEPARATOR
        .split(items.trim())
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn jail_list_line(output: &str) -> Vec<String> {
    JAIL_LIST_LINE
        .captures(output)
        .map(|caps| split_list(&caps[1]).map(str::to_string).collect())
        .unwrap_or_default()
}

fn jail_section_headers(output: &str) -> Vec<String> {
    JAIL_SECTION_HEADER
        .captures_iter(output)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn banned_ip_list(output: &str) -> Vec<String> {
    BANNED_IP_LIST
        .captures(output)
        .map(|caps| addresses_in(&caps[1]))
        .unwrap_or_default()
}

fn banned_line(output: &str) -> Vec<String> {
    BANNED_LINE
        .captures(output)
        .map(|caps| addresses_in(&caps[1]))
        .unwrap_or_default()
}

fn addresses_in(items: &str) -> Vec<String> {
    split_list(items)
        .filter(|token| looks_like_address(token))
        .map(str::to_string)
        .collect()
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Status\n|- Number of jail:\t3\n`- Jail list:\tsshd, nginx-http, postfix\n";

    const JAIL_STATUS: &str = "Status for the jail: sshd\n\
|- Filter\n\
|  |- Currently failed:\t1\n\
|  |- Total failed:\t12\n\
|  `- File list:\t/var/log/auth.log\n\
`- Actions\n\
   |- Currently banned:\t2\n\
   |- Total banned:\t5\n\
   `- Banned IP list:\t1.2.3.4 5.6.7.8\n";

    #[test]
    fn test_parse_jail_list_comma_separated() {
        assert_eq!(parse_jail_list("Jail list: a, b, c"), vec!["a", "b", "c"]);
        assert_eq!(parse_jail_list(STATUS), vec!["sshd", "nginx-http", "postfix"]);
    }

    #[test]
    fn test_parse_jail_list_whitespace_separated() {
        assert_eq!(parse_jail_list("Jail list:\tsshd  recidive"), vec!["sshd", "recidive"]);
    }

    #[test]
    fn test_parse_jail_list_empty_does_not_read_next_line() {
        let output = "`- Jail list:\t\nStatus for the jail: sshd\n";
        assert_eq!(parse_jail_list(output), vec!["sshd"]);
    }

    #[test]
    fn test_parse_jail_list_section_fallback() {
        let output = "Status for the jail: sshd\n...\nStatus for the jail: nginx\nStatus for the jail: sshd\n";
        assert_eq!(parse_jail_list(output), vec!["sshd", "nginx"]);
    }

    #[test]
    fn test_parse_jail_list_no_match() {
        assert!(parse_jail_list("ERROR   Failed to access socket path").is_empty());
        assert!(parse_jail_list("").is_empty());
    }

    #[test]
    fn test_parse_banned_list() {
        assert_eq!(parse_banned_list(JAIL_STATUS), vec!["1.2.3.4", "5.6.7.8"]);
    }

    #[test]
    fn test_parse_banned_list_ipv6_and_wrapped() {
        let output = "`- Banned IP list:\t2001:db8::1 10.0.0.1\n   192.168.1.0/24\n";
        assert_eq!(parse_banned_list(output), vec!["2001:db8::1", "10.0.0.1", "192.168.1.0/24"]);
    }

    #[test]
    fn test_parse_banned_list_fallback_line() {
        let output = "Jail: sshd\nBanned: 9.9.9.9, 8.8.8.8\nOther: x\n";
        assert_eq!(parse_banned_list(output), vec!["9.9.9.9", "8.8.8.8"]);
    }

    #[test]
    fn test_parse_banned_list_empty() {
        let output = "   |- Currently banned:\t0\n   `- Banned IP list:\t\n";
        assert!(parse_banned_list(output).is_empty());
        assert!(parse_banned_list("Sorry but the jail 'x' does not exist").is_empty());
    }

    #[test]
    fn test_parse_bantime() {
        assert_eq!(parse_bantime("600"), 600);
        assert_eq!(parse_bantime("600\n"), 600);
        assert_eq!(parse_bantime("10m"), 600);
        assert_eq!(parse_bantime("1h"), 3600);
        assert_eq!(parse_bantime("2d"), 172_800);
        assert_eq!(parse_bantime("45s"), 45);
        assert_eq!(parse_bantime("600.0"), 600);
        assert_eq!(parse_bantime("bogus"), 0);
        assert_eq!(parse_bantime("-1"), 0);
        assert_eq!(parse_bantime(""), 0);
    }

    #[test]
    fn test_looks_like_address() {
        assert!(looks_like_address("1.2.3.4"));
        assert!(looks_like_address("::1"));
        assert!(looks_like_address("10.0.0.0/8"));
        assert!(!looks_like_address("Total"));
        assert!(!looks_like_address("|-"));
        assert!(!looks_like_address("::"));
    }

    #[test]
    fn test_is_safe_jail_name() {
        assert!(is_safe_jail_name("nginx-http"));
        assert!(is_safe_jail_name("sshd@ddos"));
        assert!(!is_safe_jail_name("sshd; rm -rf /"));
        assert!(!is_safe_jail_name(""));
    }
}
