//! GPX 1.1 export of a completed session.

use std::io::Cursor;

use chrono::{DateTime, TimeZone, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::export::ExportError;
use crate::tracking::types::Session;

/// GPX 1.1 namespace
const NS_GPX: &str = "http://www.topografix.com/GPX/1/1";

/// Render a session as a GPX 1.1 document.
///
/// Incomplete sessions are refused; a completed session with an empty path
/// exports a trackless document rather than erroring.
pub fn export_gpx(session: &Session) -> Result<String, ExportError> {
    if !session.is_completed() {
        return Err(ExportError::SessionNotCompleted);
    }

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

    let mut root = BytesStart::new("gpx");
    root.push_attribute(("version", "1.1"));
    root.push_attribute(("creator", "equitrack"));
    root.push_attribute(("xmlns", NS_GPX));
    writer
        .write_event(Event::Start(root))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

    writer
        .write_event(Event::Start(BytesStart::new("metadata")))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;
    write_element(
        &mut writer,
        "name",
        &format!("{} - {}", session.horse_name, session.training_type),
    )?;
    write_element(&mut writer, "time", &rfc3339_ms(session.start_time as f64))?;
    writer
        .write_event(Event::End(BytesEnd::new("metadata")))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

    if !session.path.is_empty() {
        writer
            .write_event(Event::Start(BytesStart::new("trk")))
            .map_err(|e| ExportError::WriteFailed(e.to_string()))?;
        write_element(&mut writer, "name", &session.training_type)?;

        writer
            .write_event(Event::Start(BytesStart::new("trkseg")))
            .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

        for p in &session.path {
            let mut trkpt = BytesStart::new("trkpt");
            trkpt.push_attribute(("lat", format!("{:.7}", p.latitude).as_str()));
            trkpt.push_attribute(("lon", format!("{:.7}", p.longitude).as_str()));
            writer
                .write_event(Event::Start(trkpt))
                .map_err(|e| ExportError::WriteFailed(e.to_string()))?;
            write_element(&mut writer, "time", &rfc3339_ms(p.timestamp))?;
            writer
                .write_event(Event::End(BytesEnd::new("trkpt")))
                .map_err(|e| ExportError::WriteFailed(e.to_string()))?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("trkseg")))
            .map_err(|e| ExportError::WriteFailed(e.to_string()))?;
        writer
            .write_event(Event::End(BytesEnd::new("trk")))
            .map_err(|e| ExportError::WriteFailed(e.to_string()))?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("gpx")))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(|e| ExportError::WriteFailed(e.to_string()))
}

/// Write a simple element with text content.
fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), ExportError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(|e| ExportError::WriteFailed(e.to_string()))?;

    Ok(())
}

fn rfc3339_ms(epoch_ms: f64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(epoch_ms as i64)
        .single()
        .unwrap_or_default();
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
