//! GPX 1.1 export of a recorded track.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::track::Track;

const GPX_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\" ?>\n\
<gpx version=\"1.1\" creator=\"Trackbook\"\n\
     xmlns=\"http://www.topografix.com/GPX/1/1\"\n\
     xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n\
     xsi:schemaLocation=\"http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd\">\n";

/// ISO-8601 UTC with millisecond precision, e.g. "2024-03-04T17:05:09.250Z"
pub fn iso8601(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Parse a GPX time back into epoch milliseconds
pub fn parse_iso8601(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|date| date.timestamp_millis())
}

/// Serialize a track as a GPX document: starred waypoints as `<wpt>`,
/// every waypoint in order as a `<trkpt>`.
pub fn to_gpx(track: &Track) -> String {
    let mut xml = String::with_capacity(256 + track.waypoints.len() * 160);
    xml.push_str(GPX_HEADER);

    xml.push_str("\t<metadata>\n");
    xml.push_str(&format!("\t\t<name>{}</name>\n", escape(&track.name)));
    xml.push_str("\t</metadata>\n");

    for poi in track.starred_waypoints() {
        xml.push_str(&format!(
            "\t<wpt lat=\"{}\" lon=\"{}\">\n",
            poi.latitude, poi.longitude
        ));
        xml.push_str("\t\t<name>Point of interest</name>\n");
        xml.push_str(&format!("\t\t<ele>{}</ele>\n", poi.altitude));
        xml.push_str(&format!("\t\t<time>{}</time>\n", iso8601(poi.time)));
        xml.push_str("\t</wpt>\n");
    }

    xml.push_str("\t<trk>\n");
    xml.push_str(&format!("\t\t<name>{}</name>\n", escape(&track.name)));
    xml.push_str("\t\t<trkseg>\n");
    for waypoint in &track.waypoints {
        xml.push_str(&format!(
            "\t\t\t<trkpt lat=\"{}\" lon=\"{}\">\n",
            waypoint.latitude, waypoint.longitude
        ));
        xml.push_str(&format!("\t\t\t\t<ele>{}</ele>\n", waypoint.altitude));
        xml.push_str(&format!("\t\t\t\t<time>{}</time>\n", iso8601(waypoint.time)));
        xml.push_str("\t\t\t</trkpt>\n");
    }
    xml.push_str("\t\t</trkseg>\n");
    xml.push_str("\t</trk>\n");
    xml.push_str("</gpx>\n");
    xml
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
