// src/ingest/providers/city_xml.rs
use quick_xml::de::from_str;
use serde::Deserialize;

use super::{parse_coord, parse_dmy, FeedFormat};
use crate::ingest::normalize_text;
use crate::ingest::types::{Event, EventKind, ParseError, ParseOutcome};

const TAG: &str = FeedFormat::CityXml.tag();

// Every leaf is optional text so one sloppy <service> cannot fail the document;
// typing happens per record in `convert`.
#[derive(Debug, Deserialize)]
struct ServiceList {
    #[serde(rename = "service", default)]
    service: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "basicData")]
    basic_data: Option<BasicData>,
    #[serde(rename = "geoData")]
    geo_data: Option<GeoData>,
    extradata: Option<ExtraData>,
}

#[derive(Debug, Deserialize)]
struct BasicData {
    name: Option<String>,
    title: Option<String>,
    body: Option<String>,
    web: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeoData {
    address: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtraData {
    #[serde(rename = "item", default)]
    item: Vec<ExtraItem>,
    fechas: Option<Fechas>,
}

#[derive(Debug, Deserialize)]
struct ExtraItem {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Fechas {
    #[serde(rename = "rango", default)]
    rango: Vec<Rango>,
}

#[derive(Debug, Deserialize)]
struct Rango {
    inicio: Option<String>,
    fin: Option<String>,
}

impl Service {
    fn item(&self, name: &str) -> Option<&str> {
        self.extradata
            .as_ref()?
            .item
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
            .map(|i| i.value.as_str())
    }

    fn context(&self) -> String {
        let name = self
            .basic_data
            .as_ref()
            .and_then(|b| b.name.as_deref())
            .unwrap_or_default();
        format!("service id={} name={}", self.id, name)
    }
}

fn convert(s: &Service) -> Result<Event, String> {
    let rangos = s
        .extradata
        .as_ref()
        .and_then(|x| x.fechas.as_ref())
        .map(|f| f.rango.as_slice())
        .unwrap_or_default();
    let first = rangos.first().ok_or("no <fechas><rango> date range")?;
    let clock = s.item("Horario");
    let start = first
        .inicio
        .as_deref()
        .and_then(|d| parse_dmy(d, clock))
        .ok_or_else(|| format!("unparseable inicio {:?}", first.inicio))?;

    let basic = s.basic_data.as_ref();
    let title = basic
        .and_then(|b| b.name.as_deref().or(b.title.as_deref()))
        .unwrap_or_default();

    let mut ev = Event::new(EventKind::City, TAG, s.id.trim(), &normalize_text(title), start);
    // Multi-range listings run until the end of their last range.
    let end = rangos
        .last()
        .and_then(|r| r.fin.as_deref())
        .and_then(|d| parse_dmy(d, Some("23:59")));
    ev.set_end(end);
    if let Some(b) = basic {
        ev.description = normalize_text(b.body.as_deref().unwrap_or_default());
        ev.details_url = b.web.as_deref().unwrap_or_default().trim().to_string();
    }
    ev.venue = normalize_text(s.item("Lugar").unwrap_or_default());
    if let Some(g) = &s.geo_data {
        ev.address = normalize_text(g.address.as_deref().unwrap_or_default());
        ev.latitude = parse_coord(g.latitude.as_deref().unwrap_or_default())?;
        ev.longitude = parse_coord(g.longitude.as_deref().unwrap_or_default())?;
    }
    Ok(ev)
}

pub fn parse(body: &[u8]) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    let xml = String::from_utf8_lossy(body);
    let list: ServiceList = match from_str(&xml) {
        Ok(l) => l,
        Err(e) => {
            out.errors
                .push(ParseError::source_level(TAG, format!("decoding city xml: {e}")));
            return out;
        }
    };

    for (idx, s) in list.service.iter().enumerate() {
        out.push_checked(TAG, idx, &s.context(), convert(s));
    }
    out
}
