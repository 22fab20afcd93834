// src/ingest/providers/cultural_xml.rs
//! `<Contenidos>` agenda export. Every field is an `<atributo nombre="…">`,
//! location fields nest one level deeper under `LOCALIZACION`, so the wire
//! schema is a flat name → text map per `<contenido>`.

use std::collections::HashMap;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;

use super::{parse_coord, parse_datetime, FeedFormat};
use crate::ingest::normalize_text;
use crate::ingest::types::{Event, EventKind, ParseError, ParseOutcome};

const TAG: &str = FeedFormat::CulturalXml.tag();

/// Raw `atributo` values of one `<contenido>`, keyed by `nombre`.
#[derive(Debug, Default)]
struct Contenido {
    attrs: HashMap<String, String>,
}

impl Contenido {
    fn get(&self, name: &str) -> &str {
        self.attrs.get(name).map(String::as_str).unwrap_or_default()
    }

    fn context(&self) -> String {
        format!("ID-EVENTO={} TITULO={}", self.get("ID-EVENTO"), self.get("TITULO"))
    }
}

fn nombre(e: &BytesStart<'_>) -> Result<String> {
    Ok(e.try_get_attribute("nombre")?
        .map(|a| a.unescape_value().map(|v| v.into_owned()))
        .transpose()?
        .unwrap_or_default())
}

fn read_contenido(reader: &mut Reader<&[u8]>) -> Result<Contenido> {
    let mut out = Contenido::default();
    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(e) if e.name().as_ref() == b"atributo" => stack.push(nombre(&e)?),
            XmlEvent::End(e) if e.name().as_ref() == b"atributo" => {
                stack.pop();
            }
            XmlEvent::Text(t) => {
                if let Some(name) = stack.last() {
                    let text = t.unescape()?;
                    out.attrs.entry(name.clone()).or_default().push_str(text.trim());
                }
            }
            XmlEvent::CData(c) => {
                if let Some(name) = stack.last() {
                    let text = String::from_utf8_lossy(&c);
                    out.attrs.entry(name.clone()).or_default().push_str(text.trim());
                }
            }
            XmlEvent::End(e) if e.name().as_ref() == b"contenido" => break,
            XmlEvent::Eof => anyhow::bail!("unexpected end of document inside <contenido>"),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn convert(c: &Contenido) -> Result<Event, String> {
    let start = parse_datetime(c.get("FECHA-EVENTO"), Some(c.get("HORA-EVENTO")))
        .ok_or_else(|| format!("unparseable FECHA-EVENTO {:?}", c.get("FECHA-EVENTO")))?;

    let title = normalize_text(c.get("TITULO"));
    let mut ev = Event::new(EventKind::Cultural, TAG, c.get("ID-EVENTO").trim(), &title, start);
    ev.set_end(parse_datetime(c.get("FECHA-FIN-EVENTO"), None));
    ev.description = normalize_text(c.get("DESCRIPCION"));
    ev.details_url = c.get("CONTENT-URL").trim().to_string();
    ev.venue = normalize_text(c.get("NOMBRE-INSTALACION"));
    ev.address = normalize_text(c.get("DIRECCION"));
    ev.district = c.get("DISTRITO").trim().to_string();
    ev.latitude = parse_coord(c.get("LATITUD"))?;
    ev.longitude = parse_coord(c.get("LONGITUD"))?;
    Ok(ev)
}

fn parse_document(xml: &str, out: &mut ParseOutcome) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut idx = 0usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).context("reading cultural xml")? {
            XmlEvent::Start(e) if e.name().as_ref() == b"contenido" => {
                let c = read_contenido(&mut reader)
                    .with_context(|| format!("reading <contenido> #{idx}"))?;
                out.push_checked(TAG, idx, &c.context(), convert(&c));
                idx += 1;
            }
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

pub fn parse(body: &[u8]) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    let xml = String::from_utf8_lossy(body);
    // A structural error stops the reader; records already read are kept.
    if let Err(e) = parse_document(&xml, &mut out) {
        out.errors.push(ParseError::source_level(TAG, format!("{e:#}")));
    }
    out
}
