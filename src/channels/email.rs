//! Mailbox ingestion over raw IMAP/TLS.
//!
//! The fetch is blocking (std `TcpStream` + rustls) and meant to run inside
//! `spawn_blocking`. Every fetched message is flagged `\Seen` right after it
//! is read, so a message is handed to the pipeline at most once.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use mail_parser::{MessageParser, MimeHeaders};
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::parse_number;
use crate::error::ConfigError;

pub const DEFAULT_IMAP_SERVER: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox credentials.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
}

impl EmailConfig {
    /// Returns `None` unless both `EMAIL_USERNAME` and `EMAIL_PASSWORD` are set.
    pub fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let (Some(username), Some(password)) = (get("EMAIL_USERNAME"), get("EMAIL_PASSWORD")) else {
            return Ok(None);
        };

        let imap_port = match get("EMAIL_IMAP_PORT") {
            Some(v) => parse_number::<u16>("EMAIL_IMAP_PORT", &v)?,
            None => DEFAULT_IMAP_PORT,
        };

        Ok(Some(Self {
            imap_host: get("EMAIL_IMAP_SERVER").unwrap_or_else(|| DEFAULT_IMAP_SERVER.to_string()),
            imap_port,
            username,
            password: SecretString::from(password),
        }))
    }
}

// ── Fetched messages ────────────────────────────────────────────────

/// One unseen message pulled from the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedEmail {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
}

impl FetchedEmail {
    /// Text handed to the pipeline: subject and body joined by a space.
    pub fn text(&self) -> String {
        format!("{} {}", self.subject, self.body)
    }
}

/// Parse a raw RFC 822 message.
pub fn parse_email(raw: &[u8]) -> Option<FetchedEmail> {
    let parsed = MessageParser::default().parse(raw)?;
    Some(FetchedEmail {
        message_id: parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4())),
        sender: extract_sender(&parsed),
        subject: parsed.subject().unwrap_or_default().to_string(),
        body: extract_text(&parsed),
    })
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Plain-text part first, then HTML with tags stripped, then any textual
/// attachment. Empty when nothing readable exists.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

// ── IMAP ────────────────────────────────────────────────────────────

/// Error type for IMAP fetch operations.
pub type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Quote a string as an IMAP quoted literal.
fn imap_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Message sequence numbers from `* SEARCH` response lines.
fn search_ids(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.starts_with("* SEARCH"))
        .flat_map(|l| l.split_whitespace().skip(2).map(String::from))
        .collect()
}

fn read_line<S: Read>(stream: &mut S) -> Result<String, ImapError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match stream.read(&mut byte) {
            Ok(0) => return Err("IMAP connection closed".into()),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_tagged(line: &str, tag: &str) -> bool {
    line.strip_prefix(tag).is_some_and(|rest| rest.starts_with(' '))
}

/// Error unless the tagged completion line reports `OK`.
fn check_status(line: &str, tag: &str, command: &str) -> Result<(), ImapError> {
    let status = line.strip_prefix(tag).unwrap_or(line).trim();
    if status.starts_with("OK") {
        Ok(())
    } else {
        Err(format!("IMAP {command} failed: {status}").into())
    }
}

/// Send a command and collect the response up to its tagged completion,
/// which must be `OK`.
fn send_cmd<S: Read + Write>(
    stream: &mut S,
    tag: &str,
    cmd: &str,
) -> Result<Vec<String>, ImapError> {
    stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
    stream.flush()?;
    let command = cmd.split_whitespace().next().unwrap_or(cmd);
    let mut lines = Vec::new();
    loop {
        let line = read_line(stream)?;
        if is_tagged(&line, tag) {
            check_status(&line, tag, command)?;
            lines.push(line);
            return Ok(lines);
        }
        lines.push(line);
    }
}

/// Byte count of a `{size}` literal announced at the end of a response line.
fn literal_size(line: &str) -> Option<usize> {
    let open = line.trim_end().strip_suffix('}')?;
    let start = open.rfind('{')?;
    open[start + 1..].parse().ok()
}

/// `FETCH <id> RFC822`, returning the message literal read by its exact size.
fn fetch_rfc822<S: Read + Write>(
    stream: &mut S,
    tag: &str,
    id: &str,
) -> Result<Option<Vec<u8>>, ImapError> {
    stream.write_all(format!("{tag} FETCH {id} RFC822\r\n").as_bytes())?;
    stream.flush()?;
    let mut literal = None;
    loop {
        let line = read_line(stream)?;
        if is_tagged(&line, tag) {
            check_status(&line, tag, "FETCH")?;
            return Ok(literal);
        }
        if literal.is_none()
            && let Some(size) = literal_size(&line)
        {
            let mut buf = vec![0u8; size];
            stream.read_exact(&mut buf)?;
            literal = Some(buf);
        }
    }
}

fn connect(config: &EmailConfig) -> Result<TlsStream, ImapError> {
    let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))?;
    tcp.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;
    Ok(rustls::StreamOwned::new(conn, tcp))
}

/// Fetch unseen messages and flag each one `\Seen` (blocking).
pub fn fetch_unseen_imap(config: &EmailConfig) -> Result<Vec<FetchedEmail>, ImapError> {
    let mut tls = connect(config)?;
    fetch_unseen(&mut tls, config)
}

/// One IMAP session over an established stream.
///
/// Failures before the per-message loop are errors. Once messages are being
/// fetched, a failed `FETCH` or `STORE` ends the session early and the
/// messages read so far are still returned: they are already `\Seen` on the
/// server and would otherwise never reach the pipeline.
fn fetch_unseen<S: Read + Write>(
    stream: &mut S,
    config: &EmailConfig,
) -> Result<Vec<FetchedEmail>, ImapError> {
    let _greeting = read_line(stream)?;

    send_cmd(
        stream,
        "A1",
        &format!(
            "LOGIN {} {}",
            imap_quote(&config.username),
            imap_quote(config.password.expose_secret())
        ),
    )?;
    send_cmd(stream, "A2", "SELECT \"INBOX\"")?;

    let ids = search_ids(&send_cmd(stream, "A3", "SEARCH UNSEEN")?);
    debug!(count = ids.len(), "Unseen messages in inbox");

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    for id in &ids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let raw = match fetch_rfc822(stream, &fetch_tag, id) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    id = %id,
                    error = %e,
                    kept = results.len(),
                    "IMAP FETCH failed, ending poll early"
                );
                return Ok(results);
            }
        };

        match raw.as_deref().and_then(parse_email) {
            Some(email) => results.push(email),
            None => debug!(id = %id, "Skipping unparseable message"),
        }

        let store_tag = format!("A{tag_counter}");
        tag_counter += 1;
        if let Err(e) = send_cmd(stream, &store_tag, &format!("STORE {id} +FLAGS (\\Seen)")) {
            warn!(
                id = %id,
                error = %e,
                kept = results.len(),
                "IMAP STORE failed, ending poll early"
            );
            return Ok(results);
        }
    }

    let logout_tag = format!("A{tag_counter}");
    if let Err(e) = send_cmd(stream, &logout_tag, "LOGOUT") {
        debug!(error = %e, "IMAP LOGOUT failed");
    }

    Ok(results)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn config_requires_credentials() {
        let get = lookup(&[("EMAIL_USERNAME", "leads@example.com")]);
        assert!(EmailConfig::from_lookup(&get).unwrap().is_none());
    }

    #[test]
    fn config_defaults_to_gmail() {
        let get = lookup(&[("EMAIL_USERNAME", "u"), ("EMAIL_PASSWORD", "p")]);
        let config = EmailConfig::from_lookup(&get).unwrap().unwrap();
        assert_eq!(config.imap_host, "imap.gmail.com");
        assert_eq!(config.imap_port, 993);
    }

    #[test]
    fn config_rejects_bad_port() {
        let get = lookup(&[
            ("EMAIL_USERNAME", "u"),
            ("EMAIL_PASSWORD", "p"),
            ("EMAIL_IMAP_PORT", "99999"),
        ]);
        assert!(EmailConfig::from_lookup(&get).is_err());
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn strip_html_separates_block_elements() {
        assert_eq!(
            strip_html("<div>Телефон: 89001234567</div><div>Имя: Олег</div>"),
            "Телефон: 89001234567 Имя: Олег"
        );
    }

    #[test]
    fn strip_html_empty() {
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(imap_quote("plain"), "\"plain\"");
        assert_eq!(imap_quote(r#"pa"ss\w"#), r#""pa\"ss\\w""#);
    }

    #[test]
    fn search_ids_collects_all_lines() {
        let lines = vec![
            "* SEARCH 3 7\r\n".to_string(),
            "* SEARCH 9\r\n".to_string(),
            "A3 OK SEARCH completed\r\n".to_string(),
        ];
        assert_eq!(search_ids(&lines), vec!["3", "7", "9"]);
    }

    #[test]
    fn search_ids_empty_result() {
        let lines = vec!["* SEARCH\r\n".to_string(), "A3 OK\r\n".to_string()];
        assert!(search_ids(&lines).is_empty());
    }

    #[test]
    fn parse_plain_text_message() {
        let raw = "From: Tilda <noreply@tilda.ws>\r\n\
                   To: leads@example.com\r\n\
                   Subject: Новая заявка № 77\r\n\
                   Message-ID: <abc@tilda.ws>\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   Телефон: +7 900 123-45-67\r\n";
        let email = parse_email(raw.as_bytes()).unwrap();
        assert_eq!(email.sender, "noreply@tilda.ws");
        assert_eq!(email.subject, "Новая заявка № 77");
        assert_eq!(email.message_id, "abc@tilda.ws");
        assert!(email.body.contains("Телефон: +7 900 123-45-67"));
        assert!(email.text().starts_with("Новая заявка № 77 Телефон:"));
    }

    #[test]
    fn parse_html_only_message() {
        let raw = "From: site@example.com\r\n\
                   Subject: Form\r\n\
                   Content-Type: text/html; charset=utf-8\r\n\
                   \r\n\
                   <html><body><p>Данные формы:</p><p>Телефон: 89001234567</p></body></html>\r\n";
        let email = parse_email(raw.as_bytes()).unwrap();
        assert!(email.body.contains("Данные формы:"));
        assert!(email.body.contains("Телефон: 89001234567"));
        assert!(!email.body.contains('<'));
        assert!(email.message_id.starts_with("gen-"));
    }

    // ── IMAP session ────────────────────────────────────────────────

    /// Replays canned server output and records what the client sends.
    struct ScriptedServer {
        replies: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl ScriptedServer {
        fn new(replies: &str) -> Self {
            Self {
                replies: Cursor::new(replies.as_bytes().to_vec()),
                sent: Vec::new(),
            }
        }

        fn sent(&self) -> String {
            String::from_utf8_lossy(&self.sent).to_string()
        }
    }

    impl Read for ScriptedServer {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for ScriptedServer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    const SESSION_START: &str = "* OK IMAP4rev1 ready\r\n\
                                 A1 OK LOGIN completed\r\n\
                                 * 3 EXISTS\r\n\
                                 A2 OK [READ-WRITE] SELECT completed\r\n";

    fn mailbox() -> EmailConfig {
        EmailConfig {
            imap_host: "imap.example.com".into(),
            imap_port: 993,
            username: "leads@example.com".into(),
            password: SecretString::from("secret"),
        }
    }

    fn lead_mail(n: u32) -> String {
        format!(
            "From: site@example.com\r\n\
             Subject: Новая заявка № {n}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             Телефон: 8900123456{n}"
        )
    }

    fn fetch_reply(seq: u32, tag: &str, raw: &str) -> String {
        format!(
            "* {seq} FETCH (RFC822 {{{}}}\r\n{raw})\r\n{tag} OK FETCH completed\r\n",
            raw.len()
        )
    }

    fn store_reply(seq: u32, tag: &str) -> String {
        format!("* {seq} FETCH (FLAGS (\\Seen))\r\n{tag} OK STORE completed\r\n")
    }

    #[test]
    fn literal_size_from_fetch_header() {
        assert_eq!(literal_size("* 1 FETCH (RFC822 {342}\r\n"), Some(342));
        assert_eq!(literal_size("* SEARCH 1 2\r\n"), None);
        assert_eq!(literal_size("* 1 FETCH (RFC822 {x}\r\n"), None);
    }

    #[test]
    fn tag_match_is_exact() {
        assert!(is_tagged("A1 OK done\r\n", "A1"));
        assert!(!is_tagged("A10 OK done\r\n", "A1"));
        assert!(!is_tagged("* OK\r\n", "A1"));
    }

    #[test]
    fn session_reads_literals_by_size() {
        let script = format!(
            "{SESSION_START}* SEARCH 1\r\nA3 OK SEARCH completed\r\n{}{}* BYE\r\nA6 OK LOGOUT completed\r\n",
            fetch_reply(1, "A4", &lead_mail(1)),
            store_reply(1, "A5"),
        );
        let mut server = ScriptedServer::new(&script);

        let emails = fetch_unseen(&mut server, &mailbox()).unwrap();

        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].subject, "Новая заявка № 1");
        assert_eq!(emails[0].body.trim(), "Телефон: 89001234561");
        assert!(!emails[0].text().contains(')'));

        let sent = server.sent();
        assert!(sent.contains("A1 LOGIN \"leads@example.com\" \"secret\"\r\n"));
        assert!(sent.contains("A5 STORE 1 +FLAGS (\\Seen)\r\n"));
        assert!(sent.contains("A6 LOGOUT\r\n"));
    }

    #[test]
    fn dropped_connection_keeps_messages_already_fetched() {
        let script = format!(
            "{SESSION_START}* SEARCH 1 2 3\r\nA3 OK SEARCH completed\r\n{}{}{}{}",
            fetch_reply(1, "A4", &lead_mail(1)),
            store_reply(1, "A5"),
            fetch_reply(2, "A6", &lead_mail(2)),
            store_reply(2, "A7"),
        );
        let mut server = ScriptedServer::new(&script);

        let emails = fetch_unseen(&mut server, &mailbox()).unwrap();

        let subjects: Vec<_> = emails.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Новая заявка № 1", "Новая заявка № 2"]);
        assert!(server.sent().contains("A8 FETCH 3 RFC822\r\n"));
    }

    #[test]
    fn rejected_fetch_ends_the_poll() {
        let script = format!(
            "{SESSION_START}* SEARCH 1 2\r\nA3 OK SEARCH completed\r\n\
             A4 NO [UNAVAILABLE] message expunged\r\n"
        );
        let mut server = ScriptedServer::new(&script);

        let emails = fetch_unseen(&mut server, &mailbox()).unwrap();

        assert!(emails.is_empty());
        assert!(!server.sent().contains("FETCH 2"));
    }

    #[test]
    fn failed_store_keeps_the_fetched_message() {
        let script = format!(
            "{SESSION_START}* SEARCH 1 2\r\nA3 OK SEARCH completed\r\n{}A5 BAD command unknown\r\n",
            fetch_reply(1, "A4", &lead_mail(1)),
        );
        let mut server = ScriptedServer::new(&script);

        let emails = fetch_unseen(&mut server, &mailbox()).unwrap();

        assert_eq!(emails.len(), 1);
        assert!(!server.sent().contains("FETCH 2"));
    }

    #[test]
    fn rejected_login_is_an_error() {
        let mut server = ScriptedServer::new(
            "* OK IMAP4rev1 ready\r\nA1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n",
        );

        let err = fetch_unseen(&mut server, &mailbox()).unwrap_err();
        assert!(err.to_string().contains("LOGIN"));
        assert!(!server.sent().contains("SELECT"));
    }
}
