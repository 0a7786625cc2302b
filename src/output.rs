use std::io::Write;

use linkrot_core::BrokenLink;
use serde::Serialize;

/// Serialized shape of a broken-link record (§6). Field omission rules are
/// encoded via `skip_serializing_if`, not by hand-building a `serde_json::Value`.
#[derive(Serialize)]
struct BrokenLinkRecord {
    url: String,
    #[serde(skip_serializing_if = "is_zero", rename = "status_code")]
    status_code: u16,
    #[serde(skip_serializing_if = "String::is_empty", rename = "error")]
    error: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "error_type")]
    error_type: Option<&'static str>,
    source_page: Option<String>,
    is_external: bool,
}

fn is_zero(v: &u16) -> bool {
    *v == 0
}

impl From<&BrokenLink> for BrokenLinkRecord {
    fn from(link: &BrokenLink) -> Self {
        Self {
            url: link.url.to_string(),
            status_code: link.status,
            error: link.message.clone(),
            error_type: if link.message.is_empty() {
                None
            } else {
                Some(link.category.as_str())
            },
            source_page: link.source_page.as_ref().map(ToString::to_string),
            is_external: link.external,
        }
    }
}

pub fn write_json<W: Write>(broken_links: &[BrokenLink], mut out: W) -> anyhow::Result<()> {
    let records: Vec<BrokenLinkRecord> = broken_links.iter().map(BrokenLinkRecord::from).collect();
    serde_json::to_writer_pretty(&mut out, &records)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_csv<W: Write>(broken_links: &[BrokenLink], out: W) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);
    writer.write_record(["url", "status_code", "error_type", "source_page", "is_external"])?;

    for link in broken_links {
        writer.write_record([
            link.url.to_string(),
            if link.status == 0 {
                String::new()
            } else {
                link.status.to_string()
            },
            if link.message.is_empty() {
                String::new()
            } else {
                link.category.as_str().to_string()
            },
            link.source_page.as_ref().map(ToString::to_string).unwrap_or_default(),
            link.external.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkrot_core::ErrorCategory;
    use url::Url;

    fn sample() -> BrokenLink {
        BrokenLink {
            url: Url::parse("https://example.com/missing").unwrap(),
            status: 404,
            message: "Not Found".to_string(),
            category: ErrorCategory::ClientError,
            source_page: Some(Url::parse("https://example.com/").unwrap()),
            external: false,
        }
    }

    #[test]
    fn json_output_is_a_flat_array() {
        let mut buf = Vec::new();
        write_json(&[sample()], &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed[0]["status_code"], 404);
    }

    #[test]
    fn csv_header_is_always_emitted() {
        let mut buf = Vec::new();
        write_csv(&[], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.trim(), "url,status_code,error_type,source_page,is_external");
    }

    #[test]
    fn csv_row_matches_column_order() {
        let mut buf = Vec::new();
        write_csv(&[sample()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "https://example.com/missing,404,4xx,https://example.com/,false"
        );
    }
}
