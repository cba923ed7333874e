// Ban expiry reconstruction.
//
// fail2ban-client only reports which addresses are banned right now. The
// time left on each ban is rebuilt from the newest matching "Ban" log line
// plus the jail's bantime.
use chrono::{DateTime, Duration, Utc};

use crate::collector::results::{BanEntry, BanEvent, HostReport};

/// Builds one entry per banned address of `jail`.
///
/// An address with no matching event keeps unknown expiry; logs may have
/// rotated past the ban. Among several matches the newest wins, and on equal
/// timestamps the first in `events` order.
pub fn reconcile(
    jail: &str,
    ban_time_seconds: u64,
    banned: &[String],
    events: &[BanEvent],
    now: DateTime<Utc>,
) -> Vec<BanEntry> {
    banned
        .iter()
        .map(|address| match latest_event(jail, address, events) {
            Some(event) => BanEntry {
                address: address.clone(),
                remaining_seconds: Some(remaining_seconds(event.timestamp, ban_time_seconds, now)),
                banned_at: Some(event.timestamp),
            },
            None => BanEntry::unknown(address.clone()),
        })
        .collect()
}

/// `max(0, banned_at + bantime - now)` in whole seconds.
pub fn remaining_seconds(banned_at: DateTime<Utc>, ban_time_seconds: u64, now: DateTime<Utc>) -> u64 {
    let bantime = i64::try_from(ban_time_seconds).unwrap_or(i64::MAX);
    let expires_at = Duration::try_seconds(bantime)
        .and_then(|bantime| banned_at.checked_add_signed(bantime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (expires_at - now).num_seconds().max(0) as u64
}

/// Completes expiry data on pushed entries.
///
/// An entry with `banned_at` but no `remaining_seconds` gets the remaining
/// time computed from the jail's bantime. An entry with neither is filled
/// from `events`. Entries carrying a remaining time are left untouched.
/// Returns how many entries were filled.
pub fn enrich_report(report: &mut HostReport, events: &[BanEvent], now: DateTime<Utc>) -> usize {
    let mut filled = 0;
    for jail in &mut report.jails {
        for entry in jail.banned_addresses.iter_mut().filter(|e| e.remaining_seconds.is_none()) {
            let banned_at = match entry.banned_at {
                Some(banned_at) => banned_at,
                None => match latest_event(&jail.name, &entry.address, events) {
                    Some(event) => event.timestamp,
                    None => continue,
                },
            };
            entry.banned_at = Some(banned_at);
            entry.remaining_seconds = Some(remaining_seconds(banned_at, jail.ban_time_seconds, now));
            filled += 1;
        }
    }
    filled
}

fn latest_event<'a>(jail: &str, address: &str, events: &'a [BanEvent]) -> Option<&'a BanEvent> {
    events
        .iter()
        .filter(|event| event.jail == jail && event.address == address)
        .fold(None, |best: Option<&BanEvent>, event| match best {
            Some(current) if current.timestamp >= event.timestamp => Some(current),
            _ => Some(event),
        })
}
