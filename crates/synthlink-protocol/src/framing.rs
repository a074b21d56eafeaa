//! Newline-delimited framing.
//!
//! The transport delivers bytes in arbitrary chunks that have nothing to do
//! with record boundaries. [`LineFramer`] reassembles them into complete
//! records, [`LineReader`] drives a framer from an async reader.
//!
//! ```text
//! chunks:  "ab" | "c\nd" | "ef\n"
//! records: "abc", "def"
//! ```

use std::collections::VecDeque;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::Envelope;
use crate::{DELIMITER, MAX_LINE_LENGTH};

/// Size of each read from the underlying stream.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Encodes an envelope as one compact JSON line, delimiter included.
///
/// # Example
///
/// ```rust
/// use synthlink_protocol::{Envelope, encode_line};
///
/// let line = encode_line(&Envelope::new(0, "ping")).unwrap();
/// assert_eq!(line, b"{\"id\":0,\"payload\":\"ping\"}\n");
/// ```
pub fn encode_line<T: Serialize>(envelope: &Envelope<T>) -> ProtocolResult<Vec<u8>> {
    encode_line_limited(envelope, MAX_LINE_LENGTH)
}

/// Same as [`encode_line`] with a caller-chosen line limit.
pub fn encode_line_limited<T: Serialize>(
    envelope: &Envelope<T>,
    max: usize,
) -> ProtocolResult<Vec<u8>> {
    // Compact serde_json output never contains a raw newline.
    let mut line = serde_json::to_vec(envelope)?;
    if line.len() > max {
        return Err(ProtocolError::MessageTooLarge {
            size: line.len(),
            max,
        });
    }
    line.push(DELIMITER);
    Ok(line)
}

/// Decodes one complete record (delimiter already stripped).
///
/// A trailing `\r` is tolerated. Anything that is not an object with an
/// unsigned integer `id` is reported as [`ProtocolError::MalformedRecord`].
pub fn decode_line(record: &[u8]) -> ProtocolResult<Envelope> {
    let record = record.strip_suffix(b"\r").unwrap_or(record);
    serde_json::from_slice(record).map_err(|e| ProtocolError::malformed(e.to_string(), record))
}

/// Incremental splitter turning arbitrary chunks into complete records.
///
/// Between two calls to [`push`](Self::push) the retained buffer never holds
/// a delimiter. Empty records are skipped.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every record it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == DELIMITER) {
            self.buffer.extend_from_slice(&rest[..pos]);
            let record = std::mem::take(&mut self.buffer);
            if !record.is_empty() {
                records.push(record);
            }
            rest = &rest[pos + 1..];
        }

        self.buffer.extend_from_slice(rest);
        records
    }

    /// Bytes of the partial record carried over to the next chunk.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns true if no partial record is retained.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drops the partial record.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Takes the partial record out, leaving the framer empty.
    pub fn take_remainder(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

/// Reads complete records from an async byte stream.
pub struct LineReader<R> {
    reader: R,
    framer: LineFramer,
    ready: VecDeque<Vec<u8>>,
    chunk: Vec<u8>,
    max_line_length: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Creates a reader with the default line limit.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            ready: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE],
            max_line_length: MAX_LINE_LENGTH,
        }
    }

    /// Builder: set the maximum record length.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Returns the next complete record.
    ///
    /// Returns `Ok(None)` once the stream reaches EOF. An unterminated tail
    /// at EOF is discarded. This method is cancel safe: dropping the future
    /// loses no bytes.
    pub async fn next_record(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Ok(Some(record));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if !self.framer.is_empty() {
                    warn!(
                        bytes = self.framer.buffered().len(),
                        "discarding unterminated record at end of stream"
                    );
                    self.framer.clear();
                }
                return Ok(None);
            }

            let records = self.framer.push(&self.chunk[..n]);
            trace!(bytes = n, records = records.len(), "read chunk");

            let max = self.max_line_length;
            if self.framer.buffered().len() > max || records.iter().any(|r| r.len() > max) {
                return Err(ProtocolError::LineTooLong { max });
            }
            self.ready.extend(records);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    fn feed(framer: &mut LineFramer, chunks: &[&str]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|chunk| framer.push(chunk.as_bytes()))
            .map(|record| String::from_utf8(record).unwrap())
            .collect()
    }

    #[test]
    fn records_split_across_chunks() {
        let mut framer = LineFramer::new();
        let records = feed(&mut framer, &["ab", "c\nd", "ef\n"]);
        assert_eq!(records, vec!["abc", "def"]);
        assert!(framer.is_empty());
    }

    #[test]
    fn trailing_partial_is_retained() {
        let mut framer = LineFramer::new();
        let records = feed(&mut framer, &["x\ny\nz"]);
        assert_eq!(records, vec!["x", "y"]);
        assert_eq!(framer.buffered(), b"z");

        let records = feed(&mut framer, &["\n"]);
        assert_eq!(records, vec!["z"]);
    }

    #[test]
    fn chunk_without_delimiter_accumulates() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"{\"id\":").is_empty());
        assert!(framer.push(b"12,").is_empty());
        assert_eq!(framer.buffered(), b"{\"id\":12,");
    }

    #[test]
    fn empty_records_are_skipped() {
        let mut framer = LineFramer::new();
        let records = feed(&mut framer, &["\n\na\n\n", "\nb\n"]);
        assert_eq!(records, vec!["a", "b"]);
        assert!(framer.is_empty());
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let text = "é\n".as_bytes();
        let mut framer = LineFramer::new();
        assert!(framer.push(&text[..1]).is_empty());
        let records = framer.push(&text[1..]);
        assert_eq!(records, vec!["é".as_bytes().to_vec()]);
    }

    #[test]
    fn byte_at_a_time_matches_whole_input() {
        let input = b"{\"id\":0}\n{\"id\":1,\"payload\":[1,2]}\npartial";

        let mut whole = LineFramer::new();
        let expected = whole.push(input);

        let mut split = LineFramer::new();
        let actual: Vec<_> = input.iter().flat_map(|b| split.push(&[*b])).collect();

        assert_eq!(actual, expected);
        assert_eq!(split.take_remainder(), b"partial");
        assert!(split.is_empty());
    }

    #[test]
    fn encode_appends_single_delimiter() {
        let line = encode_line(&Envelope::new(0, json!({"type": "Ping"}))).unwrap();
        let text = String::from_utf8(line).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
        insta::assert_snapshot!(text.trim_end(), @r#"{"id":0,"payload":{"type":"Ping"}}"#);
    }

    #[test]
    fn encode_escapes_embedded_newlines() {
        let line = encode_line(&Envelope::new(1, "two\nlines")).unwrap();
        assert_eq!(line.iter().filter(|&&b| b == DELIMITER).count(), 1);
    }

    #[test]
    fn encode_rejects_oversized_line() {
        let result = encode_line_limited(&Envelope::new(0, "x".repeat(64)), 16);
        assert!(matches!(
            result,
            Err(ProtocolError::MessageTooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn decode_reply() {
        let envelope = decode_line(br#"{"id":0,"payload":"pong"}"#).unwrap();
        assert_eq!(envelope.id, 0);
        assert_eq!(envelope.payload, json!("pong"));
    }

    #[test]
    fn decode_tolerates_carriage_return() {
        let envelope = decode_line(b"{\"id\":4,\"payload\":true}\r").unwrap();
        assert_eq!(envelope, Envelope::new(4, json!(true)));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_line(b"not json").unwrap_err();
        match err {
            ProtocolError::MalformedRecord { record, .. } => assert_eq!(record, "not json"),
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_missing_id() {
        let result = decode_line(br#"{"payload":"pong"}"#);
        assert!(matches!(result, Err(ProtocolError::MalformedRecord { .. })));
    }

    #[tokio::test]
    async fn reader_yields_records_in_order() {
        let input: &[u8] = b"{\"id\":1}\n{\"id\":0}\n";
        let mut reader = LineReader::new(input);

        assert_eq!(reader.next_record().await.unwrap().unwrap(), b"{\"id\":1}");
        assert_eq!(reader.next_record().await.unwrap().unwrap(), b"{\"id\":0}");
        assert!(reader.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_reassembles_chunks_from_stream() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = LineReader::new(rx);

        let writer = tokio::spawn(async move {
            for chunk in ["ab", "c\nd", "ef\n"] {
                tx.write_all(chunk.as_bytes()).await.unwrap();
                tx.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        assert_eq!(reader.next_record().await.unwrap().unwrap(), b"abc");
        assert_eq!(reader.next_record().await.unwrap().unwrap(), b"def");

        writer.await.unwrap();
        assert!(reader.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_drops_unterminated_tail_at_eof() {
        let input: &[u8] = b"done\nhalf";
        let mut reader = LineReader::new(input);

        assert_eq!(reader.next_record().await.unwrap().unwrap(), b"done");
        assert!(reader.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reader_rejects_overlong_line() {
        let input = vec![b'a'; 100];
        let mut reader = LineReader::new(input.as_slice()).with_max_line_length(10);

        let result = reader.next_record().await;
        assert!(matches!(result, Err(ProtocolError::LineTooLong { max: 10 })));
    }
}
