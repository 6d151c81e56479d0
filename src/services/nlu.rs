use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};

/// Lowercase and fold Spanish accents so keyword matching is
/// accent-insensitive ("mañana" == "manana").
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            _ => c,
        })
        .collect()
}

pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric() && c != ':')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

const WEEKDAYS: [&str; 7] = [
    "lunes",
    "martes",
    "miercoles",
    "jueves",
    "viernes",
    "sabado",
    "domingo",
];

/// Resolves a Spanish date expression relative to `today`.
///
/// Weekday names resolve to the next strictly-future occurrence, so
/// naming today's weekday means a week from now.
pub fn parse_spanish_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let norm = normalize(text);
    let words = tokens(text);

    // "pasado mañana" must win over the bare "mañana" it contains
    if norm.contains("pasado manana") {
        return Some(today + Duration::days(2));
    }
    if words.iter().any(|w| w == "manana") {
        return Some(today + Duration::days(1));
    }
    if words.iter().any(|w| w == "hoy") {
        return Some(today);
    }

    for (idx, name) in WEEKDAYS.iter().enumerate() {
        if words.iter().any(|w| w == name) {
            let target = idx as i64;
            let current = today.weekday().num_days_from_monday() as i64;
            let mut delta = (target - current).rem_euclid(7);
            if delta == 0 {
                delta = 7;
            }
            return Some(today + Duration::days(delta));
        }
    }

    None
}

fn has_pm_cue(norm: &str) -> bool {
    norm.contains("de la tarde") || norm.contains("de la noche")
}

fn has_am_cue(norm: &str) -> bool {
    norm.contains("de la manana")
}

fn to_24h(hour: u32, pm: bool, am: bool) -> Option<NaiveTime> {
    let hour = match (hour, pm, am) {
        (12, _, true) => 0,
        (12, _, _) => 12,
        (h, true, _) if h < 12 => h + 12,
        (h, _, _) => h,
    };
    NaiveTime::from_hms_opt(hour, 0, 0)
}

/// Resolves a Spanish time expression: "10:30", "a las 3 de la tarde",
/// "a la 1", "5pm".
pub fn parse_spanish_time(text: &str) -> Option<NaiveTime> {
    let norm = normalize(text);
    let words = tokens(text);
    let pm_cue = has_pm_cue(&norm);
    let am_cue = has_am_cue(&norm);

    // Explicit HH:MM
    for word in &words {
        if let Some((h, m)) = word.split_once(':') {
            if let (Ok(hour), Ok(minute)) = (h.parse::<u32>(), m.parse::<u32>()) {
                if minute < 60 {
                    if let Some(t) = to_24h(hour, pm_cue, am_cue) {
                        return t.with_minute(minute);
                    }
                }
            }
        }
    }

    // "a la(s) N"
    for window in words.windows(3) {
        if window[0] == "a" && (window[1] == "la" || window[1] == "las") {
            if let Ok(hour) = window[2].parse::<u32>() {
                let pm = pm_cue || words.iter().any(|w| w == "pm");
                let am = am_cue || words.iter().any(|w| w == "am");
                return to_24h(hour, pm, am);
            }
        }
    }

    // Bare "N am" / "N pm" / "5pm"
    for (i, word) in words.iter().enumerate() {
        let (digits, suffix) = if let Some(d) = word.strip_suffix("am") {
            (d, Some("am"))
        } else if let Some(d) = word.strip_suffix("pm") {
            (d, Some("pm"))
        } else {
            (word.as_str(), None)
        };

        if let Ok(hour) = digits.parse::<u32>() {
            let marker = suffix.or_else(|| {
                words.get(i + 1).and_then(|next| match next.as_str() {
                    "am" => Some("am"),
                    "pm" => Some("pm"),
                    _ => None,
                })
            });
            if let Some(marker) = marker {
                return to_24h(hour, marker == "pm", marker == "am");
            }
        }
    }

    None
}

const SCHEDULING_CUES: [&str; 9] = [
    "agendar",
    "agenda",
    "cita",
    "demostracion",
    "demo",
    "reunion",
    "reserva",
    "reservar",
    "turno",
];

pub fn mentions_scheduling(text: &str) -> bool {
    let words = tokens(text);
    SCHEDULING_CUES.iter().any(|cue| words.iter().any(|w| w == cue))
}

pub fn is_affirmative(text: &str) -> bool {
    let words = tokens(text);
    ["si", "claro", "confirmo", "confirmar", "dale", "correcto", "ok"]
        .iter()
        .any(|w| words.iter().any(|t| t == w))
        || normalize(text).contains("de acuerdo")
}

pub fn is_negative(text: &str) -> bool {
    let words = tokens(text);
    ["no", "cancelar", "cancela", "cancelo"]
        .iter()
        .any(|w| words.iter().any(|t| t == w))
}

pub fn is_quit(text: &str) -> bool {
    let norm = normalize(text);
    let trimmed = norm.trim();
    trimmed.starts_with("/cancel")
        || tokens(text).iter().any(|w| w == "salir" || w == "terminar")
}

pub fn is_valid_email(s: &str) -> bool {
    let s = s.trim();
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty()
        || domain.contains('@')
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && host.chars().all(|c| c.is_ascii_alphanumeric() || ".-".contains(c))
        && tld.len() >= 2
        && tld.chars().all(|c| c.is_ascii_alphabetic())
}
