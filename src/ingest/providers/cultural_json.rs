// src/ingest/providers/cultural_json.rs
use serde::Deserialize;

use super::{parse_datetime, FeedFormat};
use crate::ingest::normalize_text;
use crate::ingest::types::{Event, EventKind, ParseError, ParseOutcome};

const TAG: &str = FeedFormat::CulturalJson.tag();

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "@graph", default)]
    graph: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dtstart: Option<String>,
    #[serde(default)]
    dtend: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "event-location", default)]
    event_location: Option<String>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Address {
    #[serde(default)]
    district: Option<DistrictRef>,
    #[serde(default)]
    area: Option<Area>,
}

#[derive(Debug, Deserialize)]
struct DistrictRef {
    #[serde(rename = "@id", default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct Area {
    #[serde(rename = "street-address", default)]
    street_address: Option<String>,
}

/// District name from a URI like `.../Distrito/Moncloa-Aravaca`.
fn district_from_uri(uri: &str) -> String {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn convert(it: Item) -> Result<Event, String> {
    let start = it
        .dtstart
        .as_deref()
        .and_then(|s| parse_datetime(s, it.time.as_deref()))
        .ok_or_else(|| format!("unparseable dtstart {:?}", it.dtstart))?;

    let mut ev = Event::new(EventKind::Cultural, TAG, it.id.trim(), &normalize_text(&it.title), start);
    ev.set_end(it.dtend.as_deref().and_then(|s| parse_datetime(s, None)));
    ev.description = normalize_text(it.description.as_deref().unwrap_or_default());
    ev.details_url = it.link.unwrap_or_default().trim().to_string();
    ev.venue = normalize_text(it.event_location.as_deref().unwrap_or_default());
    if let Some(loc) = it.location {
        ev.latitude = loc.latitude.unwrap_or(0.0);
        ev.longitude = loc.longitude.unwrap_or(0.0);
    }
    if let Some(addr) = it.address {
        if let Some(d) = addr.district {
            ev.district = district_from_uri(&d.id);
        }
        if let Some(area) = addr.area {
            ev.address = normalize_text(area.street_address.as_deref().unwrap_or_default());
        }
    }
    Ok(ev)
}

pub fn parse(body: &[u8]) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    let feed: Feed = match serde_json::from_slice(body) {
        Ok(f) => f,
        Err(e) => {
            out.errors
                .push(ParseError::source_level(TAG, format!("decoding cultural json: {e}")));
            return out;
        }
    };

    // Items are decoded one by one so a malformed entry only costs itself.
    for (idx, raw) in feed.graph.into_iter().enumerate() {
        let context = raw.to_string();
        let converted = serde_json::from_value::<Item>(raw)
            .map_err(|e| e.to_string())
            .and_then(convert);
        out.push_checked(TAG, idx, &context, converted);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "@context": {},
      "@graph": [
        {
          "id": "11772365",
          "title": "Concierto &amp; coro",
          "description": "<p>Música   en directo</p>",
          "dtstart": "2024-11-06 00:00:00.0",
          "dtend": "2024-11-06 23:59:00.0",
          "time": "19:00",
          "link": "https://www.madrid.es/evento/11772365",
          "event-location": "Centro Cultural Conde Duque",
          "location": {"latitude": 40.4275, "longitude": -3.7105},
          "address": {
            "district": {"@id": "https://datos.madrid.es/egob/kos/Provincia/Madrid/Municipio/Madrid/Distrito/Centro"},
            "area": {"street-address": "CALLE CONDE DUQUE 11"}
          }
        },
        {"id": "", "title": "sin id", "dtstart": "2024-11-06 00:00:00.0"},
        {"id": "2", "title": "fecha rota", "dtstart": "mañana"},
        {"id": 3}
      ]
    }"#;

    #[test]
    fn parses_good_record_and_collects_errors() {
        let out = parse(SAMPLE.as_bytes());
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.errors.len(), 3);

        let ev = &out.events[0];
        assert_eq!(ev.id, "11772365");
        assert_eq!(ev.title, "Concierto & coro");
        assert_eq!(ev.description, "Música en directo");
        assert_eq!(ev.start.to_string(), "2024-11-06 19:00:00");
        assert_eq!(ev.district, "Centro");
        assert_eq!(ev.address, "CALLE CONDE DUQUE 11");
        assert_eq!(ev.sources, vec!["JSON".to_string()]);

        let idx: Vec<_> = out.errors.iter().map(|e| e.index).collect();
        assert_eq!(idx, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn undecodable_payload_is_one_source_error() {
        let out = parse(b"<html>maintenance</html>");
        assert!(out.events.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].index, None);
    }
}
