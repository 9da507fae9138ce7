//! Downloadable import templates
//!
//! One header row (required columns, then optional ones) and one example row
//! whose dates are relative to the day the template is rendered.
//! XLSX output is a minimal SpreadsheetML package: a single `Orders` sheet
//! whose cells all point into the shared-strings table.

use std::io::{Cursor, Write};

use anyhow::Result;
use base64::Engine;
use chrono::{Duration, NaiveDate};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::types::{
    ImportMode, TemplateDownloadResponse, TemplateFormat, MIME_CSV, MIME_XLSX, OPTIONAL_COLUMNS,
};

const SHEET_NAME: &str = "Orders";

/// Rendered template file
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl TemplateFile {
    pub fn to_response(&self) -> TemplateDownloadResponse {
        TemplateDownloadResponse {
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            file_base64: base64::engine::general_purpose::STANDARD.encode(&self.bytes),
            size_bytes: self.bytes.len() as u64,
        }
    }
}

pub fn template_filename(format: TemplateFormat, mode: ImportMode) -> String {
    format!("b2b_orders_template_{}.{}", mode.as_str(), format.extension())
}

/// Header row for a mode
pub fn template_columns(mode: ImportMode) -> Vec<&'static str> {
    mode.required_columns()
        .iter()
        .chain(OPTIONAL_COLUMNS.iter())
        .copied()
        .collect()
}

fn example_value(column: &str, today: NaiveDate) -> String {
    let value = match column {
        "company_name" => "Acme Facilities Pvt Ltd",
        "contact_person" => "Priya Sharma",
        "email" => "ops@acme-facilities.in",
        "phone" => "9876543210",
        "customer_id" => "1",
        "service_name" => "Office deep cleaning",
        "custom_price" => "2499",
        "quantity" => "1",
        "category_id" => "1",
        "subcategory_id" => "101",
        "service_date" => return (today + Duration::days(14)).format("%Y-%m-%d").to_string(),
        "booking_date" => return today.format("%Y-%m-%d").to_string(),
        "payment_status" => "pending",
        "service_address" => "12 MG Road, Bengaluru",
        "notes" => "Access via service lift",
        _ => "",
    };
    value.to_string()
}

/// Render the template for a format and mode
pub fn render_template(format: TemplateFormat, mode: ImportMode, today: NaiveDate) -> Result<TemplateFile> {
    let columns = template_columns(mode);
    let example_values: Vec<String> = columns.iter().map(|c| example_value(c, today)).collect();
    let example: Vec<&str> = example_values.iter().map(String::as_str).collect();

    let (bytes, content_type) = match format {
        TemplateFormat::Csv => (render_csv(&columns, &example)?, MIME_CSV),
        TemplateFormat::Xlsx => (render_xlsx(&[columns.clone(), example])?, MIME_XLSX),
    };

    Ok(TemplateFile {
        filename: template_filename(format, mode),
        content_type: content_type.to_string(),
        bytes,
    })
}

fn render_csv(columns: &[&str], example: &[&str]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    writer.write_record(example)?;
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e.error()))
}

// =============================================================================
// XLSX
// =============================================================================

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 0 -> A, 25 -> Z, 26 -> AA
fn column_letter(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.iter().rev().collect()
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#,
        SHEET_NAME
    )
}

/// Build sheet and shared-strings XML. Every cell is a string.
fn sheet_parts(rows: &[Vec<&str>]) -> (String, String) {
    let mut strings: Vec<&str> = Vec::new();
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let idx = match strings.iter().position(|s| s == value) {
                Some(idx) => idx,
                None => {
                    strings.push(*value);
                    strings.len() - 1
                }
            };
            sheet.push_str(&format!(
                r#"<c r="{}{}" t="s"><v>{}</v></c>"#,
                column_letter(c),
                r + 1,
                idx
            ));
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let total: usize = rows.iter().map(|r| r.iter().filter(|v| !v.is_empty()).count()).sum();
    let mut shared = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
        total,
        strings.len()
    );
    for s in &strings {
        shared.push_str(&format!(r#"<si><t xml:space="preserve">{}</t></si>"#, xml_escape(s)));
    }
    shared.push_str("</sst>");

    (sheet, shared)
}

fn render_xlsx(rows: &[Vec<&str>]) -> Result<Vec<u8>> {
    let (sheet, shared) = sheet_parts(rows);
    let workbook = workbook_xml();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &str); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", workbook.as_str()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
        ("xl/sharedStrings.xml", shared.as_str()),
    ];
    for (name, content) in parts {
        zip.start_file(name, options)?;
        zip.write_all(content.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}
