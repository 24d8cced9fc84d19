use chrono::{DateTime, Utc};

/// IMF-fixdate, as expected in `Last-Modified` headers.
pub fn http_date(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
