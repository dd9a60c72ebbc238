//! Human-facing figures derived from a track. Nothing here mutates state.

use chrono::{DateTime, Local, Utc};

use crate::track::Track;

const ONE_HOUR_MS: i64 = 3_600_000;
const METERS_TO_MILES: f64 = 0.000621371192;
const METERS_TO_FEET: f64 = 3.28084;
const MPS_TO_KMH: f64 = 3.6;
const MPS_TO_MPH: f64 = 2.2369362920544;

/// Distance as "850 m" / "1.25 km" or "2,789 ft" / "1.5 mi"
pub fn readable_distance(meters: f64, use_imperial: bool) -> String {
    let (value, unit, fraction_digits) = if use_imperial {
        if meters > 1610.0 {
            (meters * METERS_TO_MILES, "mi", 2)
        } else {
            (meters * METERS_TO_FEET, "ft", 0)
        }
    } else if meters >= 1000.0 {
        (meters * 0.001, "km", 2)
    } else {
        (meters, "m", 0)
    };
    format!("{} {}", format_number(value, fraction_digits), unit)
}

/// Duration as compact "m:ss" / "h:mm" or verbose "M m S s" / "H h M m S s"
pub fn readable_duration(millis: i64, compact: bool) -> String {
    let millis = millis.max(0);
    let hours = millis / ONE_HOUR_MS;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1000) % 60;
    let total_minutes = millis / 60_000;

    match (compact, millis >= ONE_HOUR_MS) {
        (true, true) => format!("{}:{:02}", hours, minutes),
        (true, false) => format!("{}:{:02}", total_minutes, seconds),
        (false, true) => format!("{} h {} m {} s", hours, minutes, seconds),
        (false, false) => format!("{} m {} s", minutes, seconds),
    }
}

/// m/s to km/h, or mph when imperial
pub fn convert_meters_per_second(meters_per_second: f64, use_imperial: bool) -> f64 {
    if use_imperial {
        meters_per_second * MPS_TO_MPH
    } else {
        meters_per_second * MPS_TO_KMH
    }
}

/// Average speed over the time not spent paused, in km/h or mph.
/// Zero when no whole second of movement has been recorded.
pub fn average_velocity(track: &Track, use_imperial: bool) -> f64 {
    let seconds = track.moving_duration() / 1000;
    if seconds <= 0 {
        return 0.0;
    }
    convert_meters_per_second(track.length / seconds as f64, use_imperial)
}

/// Average speed as "12.3 km/h" / "7.6 mph"
pub fn velocity_string(track: &Track, use_imperial: bool) -> String {
    let unit = if use_imperial { "mph" } else { "km/h" };
    if track.moving_duration() / 1000 <= 0 {
        return format!("0 {}", unit);
    }
    let velocity = (average_velocity(track, use_imperial) * 10.0).round() / 10.0;
    format!("{:.1} {}", velocity, unit)
}

/// Long local date, e.g. "March 4, 2024"
pub fn readable_date(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(date) => date.with_timezone(&Local).format("%B %-d, %Y").to_string(),
        None => String::new(),
    }
}

/// File-name friendly UTC timestamp, e.g. "2024-03-04-17-05-09"
pub fn sortable_date(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(date) => date.format("%Y-%m-%d-%H-%M-%S").to_string(),
        None => millis.to_string(),
    }
}

/// Rounded number with at most `fraction_digits` decimals and grouped thousands
fn format_number(value: f64, fraction_digits: usize) -> String {
    let formatted = format!("{:.*}", fraction_digits, value);
    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, fraction.trim_end_matches('0')),
        None => (formatted.as_str(), ""),
    };
    let (sign, digits) = match integer.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", integer),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if fraction.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, fraction)
    }
}
