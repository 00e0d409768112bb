use swiftea_core::emlx::{parse_emlx_bytes, parse_emlx_file};
use swiftea_core::error::EmlxError;

/// Wrap an RFC 5322 message in emlx framing with an exact byte count.
fn emlx(message: &str) -> Vec<u8> {
    let mut data = format!("{}\n", message.len()).into_bytes();
    data.extend_from_slice(message.as_bytes());
    data
}

#[test]
fn encoded_headers_decode_to_display_names() {
    // RFC 2047 Q- and B-encoded headers, UTF-8 charset.
    let message = "Message-ID: <encoded999@example.de>\r\n\
        Subject: Re: =?utf-8?Q?Caf=C3=A9?= meeting\r\n\
        From: =?utf-8?Q?J=C3=BCrgen_M=C3=BCller?= <jurgen@example.de>\r\n\
        To: =?utf-8?B?VMOpc3Q=?= <test@example.com>\r\n\
        Date: Mon, 14 Jul 2025 09:00:00 +0200\r\n\
        \r\n\
        Hallo!\r\n";

    let msg = parse_emlx_bytes(&emlx(message)).unwrap();
    let from = msg.from.as_ref().expect("from parsed");
    assert_eq!(from.name.as_deref(), Some("Jürgen Müller"));
    assert_eq!(from.email, "jurgen@example.de");
    assert_eq!(msg.subject.as_deref(), Some("Re: Café meeting"));
    assert_eq!(msg.to[0].name.as_deref(), Some("Tést"));
    assert_eq!(
        from.display_string(),
        "Jürgen Müller <jurgen@example.de>"
    );
}

#[test]
fn multipart_alternative_keeps_both_bodies_without_attachments() {
    let message = "Message-ID: <alt@example.com>\r\n\
        From: a@example.com\r\n\
        Subject: Alternative\r\n\
        Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\
        \r\n\
        --XYZ\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        plain version\r\n\
        --XYZ\r\n\
        Content-Type: text/html; charset=utf-8\r\n\
        \r\n\
        <p>html version</p>\r\n\
        --XYZ--\r\n";

    let msg = parse_emlx_bytes(&emlx(message)).unwrap();
    assert!(msg.body_text.as_deref().unwrap().contains("plain version"));
    assert!(msg.body_html.as_deref().unwrap().contains("html version"));
    assert!(msg.attachments.is_empty());
    assert_eq!(msg.content_type, "multipart/alternative");
}

#[test]
fn multipart_mixed_collects_attachments() {
    // "hello attachment" base64-encoded.
    let message = "Message-ID: <mixed@example.com>\r\n\
        From: a@example.com\r\n\
        Subject: Mixed\r\n\
        Content-Type: multipart/mixed; boundary=\"AAA\"\r\n\
        \r\n\
        --AAA\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        see attached\r\n\
        --AAA\r\n\
        Content-Type: application/pdf; name=\"report.pdf\"\r\n\
        Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
        Content-Transfer-Encoding: base64\r\n\
        \r\n\
        aGVsbG8gYXR0YWNobWVudA==\r\n\
        --AAA\r\n\
        Content-Type: image/png\r\n\
        Content-ID: <logo@cid>\r\n\
        Content-Disposition: inline; filename=\"logo.png\"\r\n\
        Content-Transfer-Encoding: base64\r\n\
        \r\n\
        aGVsbG8=\r\n\
        --AAA--\r\n";

    let msg = parse_emlx_bytes(&emlx(message)).unwrap();
    assert!(msg.body_text.as_deref().unwrap().contains("see attached"));
    assert_eq!(msg.attachments.len(), 2);

    let pdf = &msg.attachments[0];
    assert_eq!(pdf.filename.as_deref(), Some("report.pdf"));
    assert_eq!(pdf.mime_type, "application/pdf");
    assert_eq!(pdf.size, "hello attachment".len());
    assert!(!pdf.is_inline);

    let logo = &msg.attachments[1];
    assert_eq!(logo.filename.as_deref(), Some("logo.png"));
    assert!(logo.is_inline);
    assert_eq!(logo.content_id.as_deref(), Some("logo@cid"));
}

#[test]
fn quoted_printable_body_is_decoded() {
    let message = "From: a@example.com\r\n\
        Subject: QP\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        Content-Transfer-Encoding: quoted-printable\r\n\
        \r\n\
        Caf=C3=A9 au lait\r\n";

    let msg = parse_emlx_bytes(&emlx(message)).unwrap();
    assert!(msg.body_text.as_deref().unwrap().contains("Café au lait"));
}

#[test]
fn threading_headers_are_normalized_and_deduplicated() {
    let message = "Message-ID: <leaf@example.com>\r\n\
        In-Reply-To: <Mid@Example.com>\r\n\
        References: <root@example.com> <mid@example.com> <ROOT@example.com>\r\n\
        From: a@example.com\r\n\
        \r\n\
        body\r\n";

    let msg = parse_emlx_bytes(&emlx(message)).unwrap();
    // Raw tokens keep their brackets for storage.
    assert_eq!(msg.in_reply_to.as_deref(), Some("<Mid@Example.com>"));
    assert_eq!(msg.references.len(), 3);

    let threading = msg.threading_headers();
    assert_eq!(threading.message_id.as_deref(), Some("leaf@example.com"));
    assert_eq!(threading.in_reply_to.as_deref(), Some("mid@example.com"));
    assert_eq!(threading.references, vec!["root@example.com", "mid@example.com"]);
}

#[test]
fn reparsing_serialized_headers_is_stable() {
    let original = parse_emlx_bytes(&emlx(
        "Message-ID: <stable@example.com>\r\n\
         Subject: Round trip\r\n\
         From: Sender <sender@example.com>\r\n\
         To: one@example.com, Two <two@example.com>\r\n\
         Date: Tue, 15 Jul 2025 10:30:00 +0000\r\n\
         In-Reply-To: <parent@example.com>\r\n\
         References: <root@example.com> <parent@example.com>\r\n\
         \r\n\
         body line\r\n",
    ))
    .unwrap();

    // Re-serialize the parsed headers and body, then parse again.
    let mut rebuilt = String::new();
    for (name, value) in &original.headers {
        rebuilt.push_str(&format!("{}: {}\r\n", name, value));
    }
    rebuilt.push_str("\r\n");
    rebuilt.push_str(original.body_text.as_deref().unwrap_or(""));

    let reparsed = parse_emlx_bytes(&emlx(&rebuilt)).unwrap();
    assert_eq!(reparsed.message_id, original.message_id);
    assert_eq!(reparsed.subject, original.subject);
    assert_eq!(reparsed.from, original.from);
    assert_eq!(reparsed.to, original.to);
    assert_eq!(reparsed.date, original.date);
    assert_eq!(reparsed.in_reply_to, original.in_reply_to);
    assert_eq!(reparsed.references, original.references);
    assert_eq!(reparsed.body_text, original.body_text);
}

#[test]
fn plist_trailer_rides_behind_the_message() {
    let message = "From: a@example.com\r\nSubject: With plist\r\n\r\nbody\r\n";
    let mut data = emlx(message);
    data.extend_from_slice(
        br#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>flags</key>
    <integer>33751040</integer>
    <key>remote-id</key>
    <string>9042</string>
</dict>
</plist>
"#,
    );

    let msg = parse_emlx_bytes(&data).unwrap();
    let plist = msg.apple_plist.expect("plist present");
    assert_eq!(plist.len(), 2);
    assert_eq!(msg.bytes_consumed, message.len());
}

#[test]
fn framing_failures_are_invalid_format() {
    assert!(matches!(
        parse_emlx_bytes(b"").unwrap_err(),
        EmlxError::InvalidFormat { .. }
    ));
    assert!(matches!(
        parse_emlx_bytes(b"abc\nFrom: x@y\r\n\r\nhi").unwrap_err(),
        EmlxError::InvalidFormat { .. }
    ));
}

#[test]
fn missing_file_is_file_not_found() {
    let err = parse_emlx_file(std::path::Path::new("/no/such/msg.emlx")).unwrap_err();
    assert!(matches!(err, EmlxError::FileNotFound { .. }));
}

#[test]
fn file_round_trip_through_disk() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("7.emlx");
    let message = "Message-ID: <disk@example.com>\r\nFrom: a@b.example\r\n\r\nfrom disk\r\n";
    std::fs::write(&path, emlx(message)).unwrap();

    let msg = parse_emlx_file(&path).unwrap();
    assert_eq!(msg.message_id.as_deref(), Some("<disk@example.com>"));
    assert!(msg.body_text.as_deref().unwrap().contains("from disk"));
}
