//! Rendering an [`ExecutionOutcome`] into a chat reply.

use {evalbot_config::ReplyConfig, tracing::debug};

use crate::{Result, evaluator::ExecutionOutcome, transport::ReplyTarget};

/// Prefix of inline replies for failed scripts.
pub const ERROR_HEADER: &str = "<b>Error while executing snippet:</b>\n\n";

const CODE_OPEN: &str = "<pre><code class=\"language-rhai\">";
const CODE_CLOSE: &str = "</code></pre>";

/// What gets sent back for one `/run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Inline(InlineReply),
    File(FileReply),
}

/// An HTML message showing the script and its output.
///
/// `input` and `output` are stored raw; escaping happens in [`InlineReply::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineReply {
    pub header: Option<&'static str>,
    pub input: String,
    pub output: String,
}

impl InlineReply {
    #[must_use]
    pub fn render(&self) -> String {
        let mut html = String::new();
        if let Some(header) = self.header {
            html.push_str(header);
        }
        html.push_str("<b>Input:</b>\n");
        push_code_block(&mut html, &self.input);
        html.push_str("\n<b>Output:</b>\n");
        push_code_block(&mut html, &self.output);
        html
    }
}

fn push_code_block(html: &mut String, text: &str) {
    html.push_str(CODE_OPEN);
    html.push_str(&escape_html(text));
    html.push_str(CODE_CLOSE);
}

/// Plain-text attachment used when the inline message would be too long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReply {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub caption: String,
}

/// Choose between an inline message and an attachment.
///
/// The shape depends only on the rendered inline length against
/// `config.inline_limit`; the attachment holds the untruncated output.
#[must_use]
pub fn format_reply(script: &str, outcome: &ExecutionOutcome, config: &ReplyConfig) -> Reply {
    let output = outcome.output_text();
    let inline = InlineReply {
        header: outcome.is_failure().then_some(ERROR_HEADER),
        input: script.to_string(),
        output,
    };
    let length = inline.render().chars().count();
    if length <= config.inline_limit {
        return Reply::Inline(inline);
    }

    let filename = attachment_name(&config.attachment_extension);
    debug!(length, limit = config.inline_limit, %filename, "reply too long, sending file");
    Reply::File(FileReply {
        filename,
        bytes: inline.output.into_bytes(),
        caption: config.oversized_caption.clone(),
    })
}

/// `<first UUID segment, uppercased>.<extension>`, e.g. `3F2A9C01.TXT`.
fn attachment_name(extension: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let stem = id.split('-').next().unwrap_or_default().to_uppercase();
    format!("{stem}.{extension}")
}

/// Send `reply` to its destination.
///
/// Inline replies replace the placeholder. Attachments replace it too: the
/// placeholder is deleted first, then the file is sent.
pub async fn deliver(reply: &Reply, target: &dyn ReplyTarget) -> Result<()> {
    match reply {
        Reply::Inline(inline) => target.edit_placeholder(&inline.render()).await,
        Reply::File(file) => {
            target.delete_placeholder().await?;
            target.send_file(file).await
        },
    }
}

/// Escape text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const ENTITIES: [(&str, char); 6] = [
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&#x27;", '\''),
    ("&#39;", '\''),
];

/// Inverse of [`escape_html`]. Unknown entities are left as-is.
#[must_use]
pub fn unescape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            },
        }
    }
    out.push_str(rest);
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::Error,
        async_trait::async_trait,
        rstest::rstest,
        std::sync::Mutex,
    };

    fn completed(captured: &str) -> ExecutionOutcome {
        ExecutionOutcome::Completed {
            captured: captured.into(),
            value: None,
        }
    }

    fn failed(traceback: &str) -> ExecutionOutcome {
        ExecutionOutcome::Failed {
            captured: String::new(),
            traceback: traceback.into(),
        }
    }

    #[rstest]
    #[case("")]
    #[case("plain text")]
    #[case("a < b && c > d")]
    #[case(r#"print("it's")"#)]
    #[case("&amp; already escaped")]
    #[case("emoji 🦀 and ünïcode")]
    fn escape_round_trips(#[case] text: &str) {
        assert_eq!(unescape_html(&escape_html(text)), text);
    }

    #[test]
    fn escaped_text_has_no_markup() {
        let escaped = escape_html(r#"<b>"x" & 'y'</b>"#);
        assert!(!escaped.contains(['<', '>', '"', '\'']));
        assert_eq!(escaped, "&lt;b&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/b&gt;");
    }

    #[test]
    fn unknown_entities_are_kept() {
        assert_eq!(unescape_html("&nbsp;&lt;"), "&nbsp;<");
        assert_eq!(unescape_html("trailing &"), "trailing &");
    }

    #[test]
    fn successful_reply_is_inline_without_header() {
        let reply = format_reply(r#"print("hi")"#, &completed("hi"), &ReplyConfig::default());
        let Reply::Inline(inline) = reply else {
            panic!("expected inline reply");
        };
        assert_eq!(inline.header, None);
        assert_eq!(
            inline.render(),
            "<b>Input:</b>\n\
             <pre><code class=\"language-rhai\">print(&quot;hi&quot;)</code></pre>\n\
             <b>Output:</b>\n\
             <pre><code class=\"language-rhai\">hi</code></pre>"
        );
    }

    #[test]
    fn failure_reply_carries_header_and_escaped_traceback() {
        let outcome = failed("Traceback (most recent call last):\nTypeError: <i32> vs <string>");
        let Reply::Inline(inline) = format_reply("1 + \"a\"", &outcome, &ReplyConfig::default())
        else {
            panic!("expected inline reply");
        };
        let html = inline.render();
        assert!(html.starts_with(ERROR_HEADER));
        assert!(html.contains("TypeError: &lt;i32&gt; vs &lt;string&gt;"));
    }

    #[test]
    fn oversized_output_becomes_file() {
        let output = "x".repeat(5000);
        let reply = format_reply("big()", &completed(&output), &ReplyConfig::default());
        let Reply::File(file) = reply else {
            panic!("expected file reply");
        };
        assert_eq!(file.bytes, output.as_bytes());
        assert_eq!(file.caption, "Output is too large to be sent as a text message.");
        let (stem, ext) = file.filename.split_once('.').unwrap();
        assert_eq!(ext, "TXT");
        assert_eq!(stem.len(), 8);
        assert!(
            stem.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn limit_applies_to_rendered_length() {
        let config = ReplyConfig::default();
        let fits = InlineReply {
            header: None,
            input: "s".into(),
            output: String::new(),
        }
        .render()
        .chars()
        .count();
        let room = config.inline_limit - fits;

        let at_limit = format_reply("s", &completed(&"y".repeat(room)), &config);
        assert!(matches!(at_limit, Reply::Inline(_)));
        let over = format_reply("s", &completed(&"y".repeat(room + 1)), &config);
        assert!(matches!(over, Reply::File(_)));

        // escaping counts: one `<` renders as four characters
        let escaped = format_reply("s", &completed(&"<".repeat(room / 4 + 1)), &config);
        assert!(matches!(escaped, Reply::File(_)));
    }

    #[rstest]
    #[case(completed("short"))]
    #[case(completed(&"z".repeat(6000)))]
    #[case(failed("RuntimeError: boom"))]
    fn formatting_is_stable(#[case] outcome: ExecutionOutcome) {
        let config = ReplyConfig::default();
        let first = format_reply("code", &outcome, &config);
        let second = format_reply("code", &outcome, &config);
        match (first, second) {
            (Reply::Inline(a), Reply::Inline(b)) => assert_eq!(a, b),
            (Reply::File(a), Reply::File(b)) => {
                assert_eq!(a.bytes, b.bytes);
                assert_eq!(a.caption, b.caption);
            },
            _ => panic!("reply shape changed between calls"),
        }
    }

    #[test]
    fn custom_extension_is_used() {
        let config = ReplyConfig {
            inline_limit: 10,
            attachment_extension: "log".into(),
            ..Default::default()
        };
        let Reply::File(file) = format_reply("s", &completed("long enough"), &config) else {
            panic!("expected file reply");
        };
        assert!(file.filename.ends_with(".log"), "{}", file.filename);
    }

    #[derive(Default)]
    struct RecordingTarget {
        calls: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    #[async_trait]
    impl ReplyTarget for RecordingTarget {
        async fn edit_placeholder(&self, html: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("edit {html}"));
            Ok(())
        }

        async fn delete_placeholder(&self) -> Result<()> {
            if self.fail_delete {
                return Err(Error::message("message to delete not found"));
            }
            self.calls.lock().unwrap().push("delete".into());
            Ok(())
        }

        async fn send_file(&self, file: &FileReply) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("file {} {}", file.filename, file.bytes.len()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn inline_delivery_edits_placeholder() {
        let target = RecordingTarget::default();
        let reply = format_reply("1", &completed("1"), &ReplyConfig::default());
        deliver(&reply, &target).await.unwrap();

        let calls = target.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("edit <b>Input:</b>"));
    }

    #[tokio::test]
    async fn file_delivery_deletes_then_sends() {
        let target = RecordingTarget::default();
        let reply = format_reply("s", &completed(&"x".repeat(5000)), &ReplyConfig::default());
        deliver(&reply, &target).await.unwrap();

        let calls = target.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], "delete");
        assert!(calls[1].starts_with("file ") && calls[1].ends_with(" 5000"));
    }

    #[tokio::test]
    async fn failed_delete_skips_the_file() {
        let target = RecordingTarget {
            fail_delete: true,
            ..Default::default()
        };
        let reply = format_reply("s", &completed(&"x".repeat(5000)), &ReplyConfig::default());
        assert!(deliver(&reply, &target).await.is_err());
        assert!(target.calls.lock().unwrap().is_empty());
    }
}
