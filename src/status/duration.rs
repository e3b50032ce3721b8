use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const YEAR: u64 = 365 * DAY;

/// Format `d` using only its two most significant units out of years, days,
/// hours, minutes and seconds, e.g. `1h5m` or `42s`.
pub fn fmt_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= YEAR {
        format!("{}y{}d", secs / YEAR, (secs % YEAR) / DAY)
    } else if secs >= DAY {
        format!("{}d{}h", secs / DAY, (secs % DAY) / HOUR)
    } else if secs >= HOUR {
        format!("{}h{}m", secs / HOUR, (secs % HOUR) / MINUTE)
    } else if secs >= MINUTE {
        format!("{}m{}s", secs / MINUTE, secs % MINUTE)
    } else {
        format!("{secs}s")
    }
}
