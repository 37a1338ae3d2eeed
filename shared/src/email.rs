//! MIME handling for raw emails pulled from S3.

use mailparse::ParsedMail;
use tracing::debug;

/// Return the decoded HTML body of a raw RFC 822 message.
///
/// The first `text/html` part wins, searched depth-first. Messages without
/// one, or that fail to parse, come back as the raw text.
pub fn extract_html(raw: &[u8]) -> String {
    match mailparse::parse_mail(raw) {
        Ok(mail) => find_html(&mail).unwrap_or_else(|| lossy(raw)),
        Err(e) => {
            debug!(error = %e, "Could not parse message as MIME, using raw text");
            lossy(raw)
        }
    }
}

fn find_html(part: &ParsedMail<'_>) -> Option<String> {
    if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        return match part.get_body() {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(error = %e, "Failed to decode text/html part");
                part.get_body_raw().ok().map(|bytes| lossy(&bytes))
            }
        };
    }
    part.subparts.iter().find_map(find_html)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &[u8] = include_bytes!("../tests/fixtures/hub_premier_inn_test.eml");

    #[test]
    fn test_multipart_returns_html_part() {
        let html = extract_html(FIXTURE);
        assert!(html.contains("<html"));
        assert!(html.contains("MAQ1101970"));
        assert!(!html.contains("Content-Type: text/plain"));
    }

    #[test]
    fn test_single_part_html_is_decoded() {
        let raw = b"From: a@example.com\r\n\
Subject: hi\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
<p class=3D\"x\">Total =C2=A3100</p>\r\n";
        let html = extract_html(raw);
        assert!(html.contains("<p class=\"x\">Total \u{a3}100</p>"));
    }

    #[test]
    fn test_base64_html_part() {
        // "<b>Booked</b>"
        let raw = b"Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
\r\n\
Booked\r\n\
--b1\r\n\
Content-Type: text/html\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
PGI+Qm9va2VkPC9iPg==\r\n\
--b1--\r\n";
        assert_eq!(extract_html(raw).trim(), "<b>Booked</b>");
    }

    #[test]
    fn test_plain_text_falls_back_to_raw() {
        let raw = b"Subject: plain\r\nContent-Type: text/plain\r\n\r\nJust text\r\n";
        let text = extract_html(raw);
        assert!(text.starts_with("Subject: plain"));
        assert!(text.contains("Just text"));
    }
}
