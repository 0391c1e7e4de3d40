//! Station-name handling across independently fetched datasets.
//!
//! Upstream names are already canonical, so `normalize` only trims. The
//! contour-data service is pickier about spelling than the nearest-station
//! service, which is why `candidates` exists.

use itertools::Itertools;

pub const STATION_SUFFIX: &str = "역";

/// Join key for looking a station up across datasets.
pub fn normalize(name: &str) -> &str {
    name.trim()
}

/// Spellings to try, in order, when requesting contour data for `base_name`.
///
/// The raw name comes first, then the name without whitespace, without and
/// with the station suffix, and finally (for multi-word names) forms that
/// treat the last word as a parenthesised disambiguator, e.g. `"Foo (Bar)"`.
/// Callers try them one at a time and stop at the first hit.
pub fn candidates(base_name: &str) -> Vec<String> {
    let s = base_name.trim();
    if s.is_empty() {
        return vec![];
    }

    let without_suffix = strip_suffix(s).trim();
    let with_suffix = if s.ends_with(STATION_SUFFIX) {
        s.to_owned()
    } else {
        format!("{s}{STATION_SUFFIX}")
    };

    let mut forms = vec![
        s.to_owned(),
        remove_whitespace(s),
        without_suffix.to_owned(),
        with_suffix,
        format!("{without_suffix}{STATION_SUFFIX}"),
    ];

    let tokens: Vec<&str> = s.split_whitespace().collect();
    if let Some((last, init)) = tokens.split_last().filter(|(_, init)| !init.is_empty()) {
        let head = init.concat();
        let head = strip_suffix(&head);
        let parenthesised = [
            format!("{head}({last})"),
            format!("{head} ({last})"),
            format!("{head}{STATION_SUFFIX}({last})"),
            format!("{head} {STATION_SUFFIX}({last})"),
        ];
        let compact: Vec<String> = parenthesised.iter().map(|p| remove_whitespace(p)).collect();

        forms.extend(parenthesised);
        forms.extend(compact);
    }

    forms.into_iter().filter(|f| !f.is_empty()).unique().collect()
}

fn strip_suffix(s: &str) -> &str {
    s.strip_suffix(STATION_SUFFIX).unwrap_or(s)
}

fn remove_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
