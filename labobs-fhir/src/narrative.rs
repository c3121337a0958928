//! XHTML result-history table embedded in the bundle.

use std::io::{self, Write};

use labobs_core::{present, LabRow, ObservationRecord};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::observation::parse_observed_date;

/// Date layout shown to readers of the narrative.
pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

/// One line of the history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub test_name: String,
    pub result: String,
    pub date: String,
}

impl HistoryRow {
    /// Name from the resolved display, else the row's description.
    /// Result is the raw value with its display unit (or UCUM code).
    /// Dates that do not parse are shown as written.
    pub fn new(row: &LabRow, record: &ObservationRecord) -> Self {
        let test_name = record
            .display()
            .or_else(|| present(&row.text_description))
            .unwrap_or_default()
            .to_string();

        let result = match present(&row.value) {
            Some(value) => match present(&row.units).or_else(|| present(&row.ucum)) {
                Some(unit) => format!("{value} {unit}"),
                None => value.to_string(),
            },
            None => String::new(),
        };

        let date = present(&row.date_observed)
            .map(|raw| match parse_observed_date(raw) {
                Some(date) => date.format(DISPLAY_DATE_FORMAT).to_string(),
                None => raw.to_string(),
            })
            .unwrap_or_default();

        Self {
            test_name,
            result,
            date,
        }
    }
}

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// XHTML `div` holding the history table, indented by two spaces.
/// Cell text is escaped by the writer.
pub fn render_table(rows: &[HistoryRow]) -> io::Result<String> {
    let mut xml = Writer::new_with_indent(Vec::new(), b' ', 2);

    let mut div = BytesStart::new("div");
    div.push_attribute(("xmlns", XHTML_NS));
    xml.write_event(Event::Start(div))?;

    let mut table = BytesStart::new("table");
    table.push_attribute(("border", "1"));
    xml.write_event(Event::Start(table))?;

    xml.write_event(Event::Start(BytesStart::new("thead")))?;
    write_row(&mut xml, "th", ["Test Name", "Test Result", "Date"])?;
    xml.write_event(Event::End(BytesEnd::new("thead")))?;

    xml.write_event(Event::Start(BytesStart::new("tbody")))?;
    for row in rows {
        write_row(
            &mut xml,
            "td",
            [row.test_name.as_str(), row.result.as_str(), row.date.as_str()],
        )?;
    }
    xml.write_event(Event::End(BytesEnd::new("tbody")))?;

    xml.write_event(Event::End(BytesEnd::new("table")))?;
    xml.write_event(Event::End(BytesEnd::new("div")))?;

    String::from_utf8(xml.into_inner()).map_err(io::Error::other)
}

fn write_row<W: Write>(xml: &mut Writer<W>, cell: &str, values: [&str; 3]) -> io::Result<()> {
    xml.write_event(Event::Start(BytesStart::new("tr")))?;
    for value in values {
        xml.write_event(Event::Start(BytesStart::new(cell)))?;
        xml.write_event(Event::Text(BytesText::new(value)))?;
        xml.write_event(Event::End(BytesEnd::new(cell)))?;
    }
    xml.write_event(Event::End(BytesEnd::new("tr")))
}
