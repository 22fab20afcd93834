// src/ingest/providers/cultural_csv.rs
use serde::Deserialize;

use super::{parse_coord, parse_datetime, FeedFormat};
use crate::ingest::normalize_text;
use crate::ingest::types::{Event, EventKind, ParseOutcome};

const TAG: &str = FeedFormat::CulturalCsv.tag();
const PRIMARY_DELIMITER: u8 = b';';
const FALLBACK_DELIMITER: u8 = b',';

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "ID-EVENTO")]
    id: String,
    #[serde(rename = "TITULO")]
    title: String,
    #[serde(rename = "DESCRIPCION", default)]
    description: String,
    #[serde(rename = "FECHA")]
    fecha: String,
    #[serde(rename = "FECHA-FIN", default)]
    fecha_fin: String,
    #[serde(rename = "HORA", default)]
    hora: String,
    #[serde(rename = "NOMBRE-INSTALACION", default)]
    instalacion: String,
    #[serde(rename = "DIRECCION", default)]
    direccion: String,
    #[serde(rename = "DISTRITO-INSTALACION", default)]
    distrito: String,
    #[serde(rename = "LATITUD", default)]
    latitud: String,
    #[serde(rename = "LONGITUD", default)]
    longitud: String,
    #[serde(rename = "CONTENT-URL", default)]
    content_url: String,
}

fn convert(r: Row) -> Result<Event, String> {
    let start = parse_datetime(&r.fecha, Some(&r.hora))
        .ok_or_else(|| format!("unparseable FECHA {:?}", r.fecha))?;

    let mut ev = Event::new(EventKind::Cultural, TAG, r.id.trim(), &normalize_text(&r.title), start);
    ev.set_end(parse_datetime(&r.fecha_fin, None));
    ev.description = normalize_text(&r.description);
    ev.venue = normalize_text(&r.instalacion);
    ev.address = normalize_text(&r.direccion);
    ev.district = r.distrito.trim().to_string();
    ev.details_url = r.content_url.trim().to_string();
    ev.latitude = parse_coord(&r.latitud)?;
    ev.longitude = parse_coord(&r.longitud)?;
    Ok(ev)
}

fn parse_with(text: &str, delimiter: u8) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = rdr.headers().ok().cloned();
    for (idx, rec) in rdr.records().enumerate() {
        let (context, converted) = match rec {
            Ok(raw) => {
                let context = raw.iter().collect::<Vec<_>>().join("|");
                let row = raw
                    .deserialize::<Row>(headers.as_ref())
                    .map_err(|e| e.to_string());
                (context, row.and_then(convert))
            }
            Err(e) => (String::new(), Err(e.to_string())),
        };
        out.push_checked(TAG, idx, &context, converted);
    }
    out
}

/// Parse with `;`, retrying once with `,` when the first pass yields nothing
/// but errors.
pub fn parse(body: &[u8]) -> ParseOutcome {
    let text = String::from_utf8_lossy(body);
    let text = text.trim_start_matches('\u{feff}');

    let first = parse_with(text, PRIMARY_DELIMITER);
    if first.events.is_empty() && !first.errors.is_empty() {
        tracing::debug!(
            target: "ingest",
            errors = first.errors.len(),
            "csv produced no records with ';', retrying with ','"
        );
        return parse_with(text, FALLBACK_DELIMITER);
    }
    first
}
