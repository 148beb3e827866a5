//! CSV ingest and download.
//!
//! Ingest takes the column named `email` (case-insensitive) when the first
//! row looks like a header, otherwise the first column with the first row
//! treated as data. Download renders the fixed 15-column schema; an errored
//! row keeps its address and leaves every other cell empty, and missing SMTP
//! data leaves the `smtp_*` cells empty.

use anyhow::Context;
use verifier_core::{Reachable, SmtpDetails};

use crate::api_handler::ApiError;
use crate::engine::EmailResult;

pub const CSV_HEADER: [&str; 15] = [
    "email",
    "reachable",
    "syntax_valid",
    "syntax_username",
    "syntax_domain",
    "disposable",
    "role_account",
    "free",
    "has_mx_records",
    "suggestion",
    "smtp_host_exists",
    "smtp_full_inbox",
    "smtp_catch_all",
    "smtp_deliverable",
    "smtp_disabled",
];

/// Extract addresses from an uploaded CSV body.
pub fn parse_emails(body: &[u8]) -> Result<Vec<String>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body);

    let mut emails = Vec::new();
    let mut email_index: Option<usize> = None;

    for record in reader.records() {
        let record = record.map_err(|_| ApiError::InvalidCsv)?;

        let index = match email_index {
            Some(index) => index,
            None => {
                // First row: a cell named "email" marks a header row.
                let header = record
                    .iter()
                    .position(|col| col.trim().eq_ignore_ascii_case("email"));
                if let Some(index) = header {
                    email_index = Some(index);
                    continue;
                }
                email_index = Some(0);
                0
            }
        };

        if let Some(field) = record.get(index) {
            let email = field.trim();
            if !email.is_empty() {
                emails.push(email.to_string());
            }
        }
    }

    Ok(emails)
}

/// Render stored results as the downloadable CSV document.
pub fn render_results(results: &[EmailResult]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for result in results {
        match &result.result {
            None => {
                let mut row = vec![result.email.clone()];
                row.resize(CSV_HEADER.len(), String::new());
                writer.write_record(&row)?;
            }
            Some(verdict) => {
                let smtp = verdict.smtp.as_ref();
                writer.write_record([
                    verdict.email.clone(),
                    reachable_cell(verdict.reachable).to_string(),
                    verdict.syntax.valid.to_string(),
                    verdict.syntax.username.clone(),
                    verdict.syntax.domain.clone(),
                    verdict.disposable.to_string(),
                    verdict.role_account.to_string(),
                    verdict.free.to_string(),
                    verdict.has_mx_records.to_string(),
                    verdict.suggestion.clone().unwrap_or_default(),
                    smtp_cell(smtp, |s| s.host_exists),
                    smtp_cell(smtp, |s| s.full_inbox),
                    smtp_cell(smtp, |s| s.catch_all),
                    smtp_cell(smtp, |s| s.deliverable),
                    smtp_cell(smtp, |s| s.disabled),
                ])?;
            }
        }
    }

    writer.into_inner().context("flushing csv output")
}

const fn reachable_cell(reachable: Reachable) -> &'static str {
    match reachable {
        Reachable::Yes => "yes",
        Reachable::No => "no",
        Reachable::Unknown => "unknown",
    }
}

fn smtp_cell(smtp: Option<&SmtpDetails>, field: impl Fn(&SmtpDetails) -> bool) -> String {
    smtp.map(|s| field(s).to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use verifier_core::{Syntax, Verdict};

    fn verdict(email: &str, smtp: Option<SmtpDetails>) -> Verdict {
        let syntax = verifier_core::syntax::parse(email);
        Verdict {
            email: email.to_string(),
            reachable: Reachable::Unknown,
            syntax,
            smtp,
            suggestion: None,
            disposable: false,
            role_account: true,
            free: false,
            has_mx_records: true,
        }
    }

    #[test]
    fn test_parse_headerless_first_column() {
        let body = b"a@example.com,extra\nb@example.com,more\n";
        let emails = parse_emails(body).unwrap();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_parse_with_email_header_column() {
        let body = b"name,Email,age\nalice,a@example.com,30\nbob,b@example.com,40\n";
        let emails = parse_emails(body).unwrap();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_parse_skips_blank_cells() {
        let body = b"a@example.com\n\nb@example.com\n  \n";
        let emails = parse_emails(body).unwrap();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_parse_quoted_fields() {
        let body = b"email\n\"quoted@example.com\"\n";
        let emails = parse_emails(body).unwrap();
        assert_eq!(emails, vec!["quoted@example.com"]);
    }

    #[test]
    fn test_parse_rejects_malformed_csv() {
        let body = b"email\n\"unterminated\n";
        assert_eq!(parse_emails(body), Err(ApiError::InvalidCsv));
    }

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_emails(b"").unwrap().is_empty());
    }

    #[test]
    fn test_render_header_and_row_shape() {
        let results = vec![EmailResult::verdict(
            "info@example.com",
            verdict(
                "info@example.com",
                Some(SmtpDetails {
                    host_exists: true,
                    full_inbox: false,
                    catch_all: true,
                    deliverable: false,
                    disabled: false,
                }),
            ),
        )];
        let bytes = render_results(&results).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), CSV_HEADER.join(","));
        let row = lines.next().unwrap();
        let cells: Vec<&str> = row.split(',').collect();
        assert_eq!(cells.len(), CSV_HEADER.len());
        assert_eq!(cells[0], "info@example.com");
        assert_eq!(cells[1], "unknown");
        assert_eq!(cells[2], "true");
        assert_eq!(cells[6], "true"); // role_account
        assert_eq!(cells[10], "true"); // smtp_host_exists
        assert_eq!(cells[12], "true"); // smtp_catch_all
        assert_eq!(cells[13], "false"); // smtp_deliverable
    }

    #[test]
    fn test_render_errored_row_is_empty_cells() {
        let results = vec![EmailResult::error("broken@example.com", "probe failed")];
        let text = String::from_utf8(render_results(&results).unwrap()).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row, format!("broken@example.com{}", ",".repeat(14)));
    }

    #[test]
    fn test_render_missing_smtp_leaves_cells_empty() {
        let results = vec![EmailResult::verdict(
            "a@example.com",
            verdict("a@example.com", None),
        )];
        let text = String::from_utf8(render_results(&results).unwrap()).unwrap();
        let row = text.lines().nth(1).unwrap();
        let cells: Vec<&str> = row.split(',').collect();
        assert!(cells[10..].iter().all(|c| c.is_empty()));
    }

    #[test]
    fn test_round_trip_one_row_per_address() {
        let emails = ["a@x.test", "b@y.test", "c@z.test"];
        let results: Vec<EmailResult> = emails
            .iter()
            .map(|e| EmailResult::verdict(*e, verdict(e, None)))
            .collect();
        let text = String::from_utf8(render_results(&results).unwrap()).unwrap();
        let rows: Vec<&str> = text.lines().skip(1).collect();
        assert_eq!(rows.len(), emails.len());
        for (row, email) in rows.iter().zip(emails.iter()) {
            assert_eq!(row.split(',').next().unwrap(), *email);
        }
    }
}
