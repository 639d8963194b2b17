use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde_json::Value;
use tracing::debug;

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::{ChatStream, ResponseAdapter, ResponseDialect};
use crate::types::Fragment;

/// Text yielded when a stream ends without a single non-empty fragment.
pub const EMPTY_STREAM_WARNING: &str = "no content received from the model";

/// Longest stream line buffered while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Outcome of decoding a single stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Blank line, non-JSON framing, or an event without visible text.
    Skip,
    /// Termination token; nothing after it is read.
    Done,
    /// Visible answer text.
    Text(String),
}

/// Decodes one line of an event stream with the given response adapter.
///
/// The function is pure: the same line always decodes to the same event.
///
/// # Examples
///
/// ```
/// use omnichat::provider::ResponseDialect;
/// use omnichat::stream::{decode_line, LineEvent};
///
/// let line = r#"data: {"choices":[{"delta":{"content":"he"}}]}"#;
/// assert_eq!(decode_line(line, &ResponseDialect::OpenAi), LineEvent::Text("he".into()));
/// assert_eq!(decode_line("data: [DONE]", &ResponseDialect::OpenAi), LineEvent::Done);
/// assert_eq!(decode_line("data: {not json", &ResponseDialect::OpenAi), LineEvent::Skip);
/// ```
pub fn decode_line(line: &str, adapter: &impl ResponseAdapter) -> LineEvent {
    let mut data = line.trim();
    if data.is_empty() {
        return LineEvent::Skip;
    }
    if let Some(rest) = data.strip_prefix("data:") {
        data = rest.trim();
    }
    if data == "[DONE]" || data == "data: [DONE]" {
        return LineEvent::Done;
    }

    let event: Value = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, line = data, "skipping non-JSON stream line");
            return LineEvent::Skip;
        }
    };

    if let Some(reasoning) = adapter.parse_reasoning(&event) {
        debug!(reasoning = %reasoning, "reasoning fragment");
    }

    let text = adapter.parse_fragment(&event);
    if text.is_empty() {
        LineEvent::Skip
    } else {
        LineEvent::Text(text)
    }
}

/// Wraps a raw HTTP body into a [`ChatStream`] of answer fragments.
pub(crate) fn create_stream(body: HttpBodyStream, dialect: ResponseDialect) -> ChatStream {
    Box::pin(FragmentStream::new(body, dialect))
}

/// Lazy, forward-only fragment decoder over a streaming HTTP body.
///
/// The body is dropped as soon as the stream terminates (termination token, connection
/// close, or transport error), and dropping the decoder early drops it too, so the
/// connection is never held past the consumer's interest.
pub struct FragmentStream {
    body: Option<HttpBodyStream>,
    buffer: Vec<u8>,
    dialect: ResponseDialect,
    pending: VecDeque<Result<Fragment, LLMError>>,
    max_line_bytes: usize,
    // 超长行的剩余部分丢弃到下一个换行
    discarding: bool,
    produced_text: bool,
    finished: bool,
}

impl FragmentStream {
    pub fn new(body: HttpBodyStream, dialect: ResponseDialect) -> Self {
        Self {
            body: Some(body),
            buffer: Vec::new(),
            dialect,
            pending: VecDeque::new(),
            max_line_bytes: MAX_LINE_BYTES,
            discarding: false,
            produced_text: false,
            finished: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Appends a body chunk, skipping the tail of a line that already overflowed.
    fn push_bytes(&mut self, bytes: &[u8]) {
        if !self.discarding {
            self.buffer.extend_from_slice(bytes);
            return;
        }
        if let Some(pos) = bytes.iter().position(|b| *b == b'\n') {
            self.discarding = false;
            self.buffer.extend_from_slice(&bytes[pos + 1..]);
        }
    }

    fn check_overflow(&mut self) {
        if self.buffer.len() > self.max_line_bytes {
            self.pending.push_back(Ok(Fragment::Diagnostic(format!(
                "stream line exceeds {} bytes without a newline; discarded",
                self.max_line_bytes
            ))));
            self.buffer.clear();
            self.discarding = true;
        }
    }

    /// Returns `true` once the termination token has been seen.
    fn handle_line(&mut self, line: &[u8]) -> bool {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(err) => {
                self.pending.push_back(Ok(Fragment::Diagnostic(format!(
                    "invalid UTF-8 in stream line: {err}"
                ))));
                return false;
            }
        };

        match decode_line(line, &self.dialect) {
            LineEvent::Skip => false,
            LineEvent::Done => true,
            LineEvent::Text(text) => {
                self.produced_text = true;
                self.pending.push_back(Ok(Fragment::Text(text)));
                false
            }
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.body = None;
        self.buffer.clear();
        if !self.produced_text {
            self.pending
                .push_back(Ok(Fragment::Warning(EMPTY_STREAM_WARNING.to_string())));
        }
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }
}

impl Stream for FragmentStream {
    type Item = Result<Fragment, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            let Some(body) = this.body.as_mut() else {
                this.finish();
                continue;
            };

            match body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.push_bytes(&bytes);
                    while let Some(line) = Self::drain_line(&mut this.buffer) {
                        if this.handle_line(&line) {
                            this.finish();
                            break;
                        }
                    }
                    if !this.finished {
                        this.check_overflow();
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    // 传输中断：上报一次错误后结束，不再追加空流警告
                    this.finished = true;
                    this.body = None;
                    this.buffer.clear();
                    this.pending.push_back(Err(err));
                }
                Poll::Ready(None) => {
                    let rest = std::mem::take(&mut this.buffer);
                    if !rest.is_empty() {
                        this.handle_line(&rest);
                    }
                    this.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures_util::StreamExt;
    use futures_util::stream;

    use super::*;

    fn build_body(chunks: Vec<Result<Vec<u8>, LLMError>>) -> HttpBodyStream {
        Box::pin(stream::iter(chunks))
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<Fragment, LLMError>> {
        stream.collect::<Vec<_>>().await
    }

    fn texts(items: &[Result<Fragment, LLMError>]) -> Vec<Fragment> {
        items
            .iter()
            .map(|item| item.as_ref().expect("fragment").clone())
            .collect()
    }

    #[test]
    fn decode_line_is_stable_for_repeated_input() {
        let line = r#"data: {"type":"content_block_delta","delta":{"text":"!"}}"#;
        let first = decode_line(line, &ResponseDialect::Anthropic);
        let second = decode_line(line, &ResponseDialect::Anthropic);
        assert_eq!(first, LineEvent::Text("!".to_string()));
        assert_eq!(first, second);
    }

    #[test]
    fn decode_line_handles_framing_variants() {
        let dialect = ResponseDialect::OpenAi;
        assert_eq!(decode_line("", &dialect), LineEvent::Skip);
        assert_eq!(decode_line("   ", &dialect), LineEvent::Skip);
        assert_eq!(decode_line("[DONE]", &dialect), LineEvent::Done);
        assert_eq!(decode_line("data:[DONE]", &dialect), LineEvent::Done);
        assert_eq!(decode_line("data: data: [DONE]", &dialect), LineEvent::Done);
        assert_eq!(decode_line("event: ping", &dialect), LineEvent::Skip);
        assert_eq!(decode_line(": keep-alive", &dialect), LineEvent::Skip);
        assert_eq!(
            decode_line(r#"{"choices":[{"delta":{"content":"raw"}}]}"#, &dialect),
            LineEvent::Text("raw".to_string())
        );
    }

    #[tokio::test]
    async fn stream_yields_fragments_until_done() {
        let chunks = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"he\"}}]}\n\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n".to_vec()),
            Ok(b"data: [DONE]\n\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n".to_vec()),
        ];
        let items = collect(FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)).await;
        assert_eq!(
            texts(&items),
            vec![
                Fragment::Text("he".to_string()),
                Fragment::Text("llo".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn done_in_the_middle_of_a_chunk_discards_the_rest() {
        let chunks = vec![Ok(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n"
                .to_vec(),
        )];
        let items = collect(FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)).await;
        assert_eq!(texts(&items), vec![Fragment::Text("a".to_string())]);
    }

    #[tokio::test]
    async fn stream_reassembles_lines_split_across_chunks() {
        let chunks = vec![
            Ok(b"data: {\"choices\":[{\"del".to_vec()),
            Ok(b"ta\":{\"content\":\"joined\"}}]}\r\n".to_vec()),
            Ok(b"\r\ndata: [DONE]\r\n".to_vec()),
        ];
        let items = collect(FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)).await;
        assert_eq!(texts(&items), vec![Fragment::Text("joined".to_string())]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let chunks = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n".to_vec()),
            Ok(b"data: {broken json\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}\n".to_vec()),
        ];
        let items = collect(FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)).await;
        assert_eq!(
            texts(&items),
            vec![
                Fragment::Text("one".to_string()),
                Fragment::Text("two".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn unterminated_last_line_is_decoded_on_close() {
        let chunks = vec![Ok(
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"tail\"}}".to_vec(),
        )];
        let items =
            collect(FragmentStream::new(build_body(chunks), ResponseDialect::Anthropic)).await;
        assert_eq!(texts(&items), vec![Fragment::Text("tail".to_string())]);
    }

    #[tokio::test]
    async fn anthropic_event_stream_keeps_only_text_deltas() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"content\":[]}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let chunks = vec![Ok(body.as_bytes().to_vec())];
        let items =
            collect(FragmentStream::new(build_body(chunks), ResponseDialect::Anthropic)).await;
        assert_eq!(texts(&items), vec![Fragment::Text("Hi".to_string())]);
    }

    #[tokio::test]
    async fn empty_stream_yields_a_single_warning() {
        let chunks = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n".to_vec()),
            Ok(b"data: [DONE]\n\n".to_vec()),
        ];
        let items = collect(FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)).await;
        assert_eq!(
            texts(&items),
            vec![Fragment::Warning(EMPTY_STREAM_WARNING.to_string())]
        );

        let items =
            collect(FragmentStream::new(build_body(Vec::new()), ResponseDialect::Gemini)).await;
        assert_eq!(
            texts(&items),
            vec![Fragment::Warning(EMPTY_STREAM_WARNING.to_string())]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_line_becomes_diagnostic_and_stream_continues() {
        let chunks = vec![
            Ok(b"data: \xff\xfe\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n".to_vec()),
        ];
        let items = collect(FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[0].as_ref().expect("fragment"),
            Fragment::Diagnostic(message) if message.contains("UTF-8")
        ));
        assert_eq!(
            items[1].as_ref().expect("fragment"),
            &Fragment::Text("ok".to_string())
        );
    }

    #[tokio::test]
    async fn oversized_line_is_discarded_with_a_diagnostic() {
        let chunks = vec![
            Ok(vec![b'x'; 40]),
            Ok(vec![b'x'; 40]),
            Ok(b"xxx\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n".to_vec()),
        ];
        let stream = FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)
            .with_max_line_bytes(64);
        let items = texts(&collect(stream).await);
        assert_eq!(items.len(), 2);
        assert!(
            matches!(&items[0], Fragment::Diagnostic(message) if message.contains("64 bytes")),
            "{items:?}"
        );
        assert_eq!(items[1], Fragment::Text("ok".to_string()));
    }

    #[tokio::test]
    async fn transport_error_is_reported_once_and_ends_the_stream() {
        let chunks = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n".to_vec()),
            Err(LLMError::transport("connection reset")),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n".to_vec()),
        ];
        let items = collect(FragmentStream::new(build_body(chunks), ResponseDialect::OpenAi)).await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_ref().expect("fragment"),
            &Fragment::Text("par".to_string())
        );
        assert!(matches!(items[1], Err(LLMError::Transport { .. })));
    }

    /// Body that records when it is dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn tracked_body(dropped: Arc<AtomicBool>) -> HttpBodyStream {
        let guard = DropFlag(dropped);
        let lines = (0..100).map(|idx| {
            Ok(format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{idx}\"}}}}]}}\n").into_bytes())
        });
        Box::pin(stream::iter(lines).map(move |chunk| {
            let _keep = &guard;
            chunk
        }))
    }

    #[tokio::test]
    async fn abandoning_the_stream_releases_the_body() {
        let dropped = Arc::new(AtomicBool::new(false));
        let mut stream = FragmentStream::new(tracked_body(dropped.clone()), ResponseDialect::OpenAi);

        let first = stream.next().await.expect("item").expect("fragment");
        assert_eq!(first, Fragment::Text("0".to_string()));
        assert!(!dropped.load(Ordering::SeqCst));

        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn body_is_released_as_soon_as_done_arrives() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let chunks = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n".to_vec()),
            Ok(b"data: [DONE]\n".to_vec()),
        ];
        let body: HttpBodyStream = Box::pin(stream::iter(chunks).map(move |chunk| {
            let _keep = &guard;
            chunk
        }));
        let mut stream = FragmentStream::new(body, ResponseDialect::OpenAi);

        assert_eq!(
            stream.next().await.expect("item").expect("fragment"),
            Fragment::Text("x".to_string())
        );
        assert!(stream.next().await.is_none());
        assert!(dropped.load(Ordering::SeqCst));
    }
}
