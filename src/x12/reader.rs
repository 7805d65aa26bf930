//! Stream framing for X12 interchanges
//!
//! [`X12StreamReader`] is the source that turns raw bytes into framed
//! segment strings. Construction consumes the fixed-width 106-byte ISA
//! header and extracts the four delimiters by offset; everything after
//! that is delimiter-driven. The reader performs no interpretation of
//! segment contents - structural meaning is the parser's job.
//!
//! Concatenated interchanges are supported: when a freshly started segment
//! turns out to be another `ISA`, the reader re-enters fixed-width mode
//! and re-derives the delimiters from that header, so a stream whose
//! second interchange uses different separators still frames correctly.

use std::fmt;
use std::io::{self, BufReader, Read};

use crate::x12::segment::Delimiters;

/// Fixed width of an ISA header, terminator included.
pub const ISA_SEGMENT_LENGTH: usize = 106;

/// Byte offsets of the separators inside the ISA header.
const ELEMENT_SEPARATOR_OFFSET: usize = 3;
const REPETITION_SEPARATOR_OFFSET: usize = 82;
const COMPONENT_SEPARATOR_OFFSET: usize = 104;
const SEGMENT_TERMINATOR_OFFSET: usize = 105;

/// Errors raised while framing the stream.
#[derive(Debug)]
pub enum ReaderError {
    /// The stream held no segment data at all (only ignored bytes, or
    /// nothing). The parser maps this to an empty result.
    EmptyStream,
    /// The ISA header was truncated, did not start with `ISA`, or declared
    /// clashing delimiters.
    MalformedHeader(String),
    /// The underlying stream failed.
    Io(io::Error),
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::EmptyStream => write!(f, "Stream contains no segment data"),
            ReaderError::MalformedHeader(msg) => write!(f, "Malformed ISA header: {}", msg),
            ReaderError::Io(err) => write!(f, "I/O error while reading stream: {}", err),
        }
    }
}

impl std::error::Error for ReaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReaderError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Framing reader over any byte stream.
pub struct X12StreamReader<R: Read> {
    input: BufReader<R>,
    delimiters: Delimiters,
    isa_segment: String,
    ignored_chars: Vec<u8>,
}

impl<R: Read> X12StreamReader<R> {
    /// Read the 106-byte ISA header and extract the delimiters.
    ///
    /// Leading bytes from `ignored_chars` (and leading whitespace) are
    /// consumed first. A stream that ends before any header byte fails
    /// with [`ReaderError::EmptyStream`]; a short or non-`ISA` header
    /// fails with [`ReaderError::MalformedHeader`].
    pub fn new(input: R, ignored_chars: &[u8]) -> Result<Self, ReaderError> {
        let mut reader = X12StreamReader {
            input: BufReader::new(input),
            delimiters: Delimiters::canonical(),
            isa_segment: String::new(),
            ignored_chars: ignored_chars.to_vec(),
        };

        let first = loop {
            match reader.read_byte()? {
                None => return Err(ReaderError::EmptyStream),
                Some(b) if reader.ignored_chars.contains(&b) || b.is_ascii_whitespace() => {
                    continue
                }
                Some(b) => break b,
            }
        };

        let mut header = [0u8; ISA_SEGMENT_LENGTH];
        header[0] = first;
        reader.read_header_remainder(&mut header[1..])?;

        let (delimiters, isa_segment) = parse_isa_header(&header)?;
        reader.delimiters = delimiters;
        reader.isa_segment = isa_segment;
        Ok(reader)
    }

    /// Delimiters of the interchange currently being framed.
    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    /// The ISA segment most recently read, without its terminator.
    pub fn current_isa_segment(&self) -> &str {
        &self.isa_segment
    }

    /// The substring of `segment` before the first element separator, or
    /// all of it if there is none.
    pub fn read_segment_id<'a>(&self, segment: &'a str) -> &'a str {
        match segment.find(self.delimiters.element_separator as char) {
            Some(pos) => &segment[..pos],
            None => segment,
        }
    }

    /// Next segment string without its terminator. End of stream yields an
    /// empty string, which callers use as loop termination.
    pub fn read_next_segment(&mut self) -> Result<String, ReaderError> {
        loop {
            match self.read_raw_segment()? {
                None => return Ok(String::new()),
                Some(segment) if segment.is_empty() => continue,
                Some(segment) => return Ok(segment),
            }
        }
    }

    /// One framed segment, or `None` at end of stream. A stray terminator
    /// produces `Some("")`, which the caller skips.
    fn read_raw_segment(&mut self) -> Result<Option<String>, ReaderError> {
        let first = match self.skip_to_segment_start()? {
            None => return Ok(None),
            Some(b) if b == self.delimiters.segment_terminator => {
                return Ok(Some(String::new()))
            }
            Some(b) => b,
        };

        let mut buf = vec![first];
        loop {
            if buf.len() == 3 && buf == b"ISA" {
                return self.resync_isa_header().map(Some);
            }
            match self.read_byte()? {
                None => break,
                Some(b) if b == self.delimiters.segment_terminator => break,
                Some(b) if self.ignored_chars.contains(&b) => continue,
                Some(b) => buf.push(b),
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Consume inter-segment noise: ignored bytes and trailing whitespace
    /// left after a terminator. A whitespace byte serving as a separator
    /// (newline terminators are common) is never skipped.
    fn skip_to_segment_start(&mut self) -> Result<Option<u8>, ReaderError> {
        loop {
            match self.read_byte()? {
                None => return Ok(None),
                Some(b) if self.ignored_chars.contains(&b) => continue,
                Some(b) if b.is_ascii_whitespace() && !self.is_separator(b) => continue,
                Some(b) => return Ok(Some(b)),
            }
        }
    }

    /// A new `ISA` was encountered mid-stream. Read the remainder of the
    /// fixed-width header and re-derive the delimiters from it.
    fn resync_isa_header(&mut self) -> Result<String, ReaderError> {
        let mut header = [0u8; ISA_SEGMENT_LENGTH];
        header[..3].copy_from_slice(b"ISA");
        self.read_header_remainder(&mut header[3..])?;

        let (delimiters, isa_segment) = parse_isa_header(&header)?;
        self.delimiters = delimiters;
        self.isa_segment = isa_segment;
        Ok(self.isa_segment.clone())
    }

    fn read_header_remainder(&mut self, buf: &mut [u8]) -> Result<(), ReaderError> {
        self.input.read_exact(buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                ReaderError::MalformedHeader(format!(
                    "interchange shorter than the {}-byte ISA header",
                    ISA_SEGMENT_LENGTH
                ))
            } else {
                ReaderError::Io(err)
            }
        })
    }

    fn is_separator(&self, b: u8) -> bool {
        b == self.delimiters.element_separator
            || b == self.delimiters.component_separator
            || b == self.delimiters.segment_terminator
            || self.delimiters.repetition_separator == Some(b)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ReaderError> {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(ReaderError::Io(err)),
            }
        }
    }
}

/// Extract delimiters by fixed offset and validate the header shape.
fn parse_isa_header(header: &[u8; ISA_SEGMENT_LENGTH]) -> Result<(Delimiters, String), ReaderError> {
    if &header[..3] != b"ISA" {
        return Err(ReaderError::MalformedHeader(format!(
            "expected segment identifier ISA, found {:?}",
            String::from_utf8_lossy(&header[..3])
        )));
    }

    let repetition = header[REPETITION_SEPARATOR_OFFSET];
    let delimiters = Delimiters {
        element_separator: header[ELEMENT_SEPARATOR_OFFSET],
        component_separator: header[COMPONENT_SEPARATOR_OFFSET],
        // 4010 carries the standards identifier (typically `U`) in this
        // position; only a non-alphanumeric, non-space byte is a separator.
        repetition_separator: if repetition.is_ascii_alphanumeric() || repetition == b' ' {
            None
        } else {
            Some(repetition)
        },
        segment_terminator: header[SEGMENT_TERMINATOR_OFFSET],
    };

    if !delimiters.are_distinct() {
        return Err(ReaderError::MalformedHeader(format!(
            "delimiters are not distinct: {}",
            delimiters
        )));
    }

    let isa_segment = String::from_utf8_lossy(&header[..SEGMENT_TERMINATOR_OFFSET]).into_owned();
    Ok((delimiters, isa_segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const ISA_4010: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
*040101*1200*U*00401*000000001*0*P*:~";

    const ISA_5010: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
*100101*1200*^*00501*000000201*0*P*:~";

    fn reader_over(text: &str) -> X12StreamReader<Cursor<Vec<u8>>> {
        X12StreamReader::new(Cursor::new(text.as_bytes().to_vec()), &[])
            .expect("header should frame")
    }

    #[test]
    fn test_header_is_exactly_106_bytes() {
        assert_eq!(ISA_4010.len(), ISA_SEGMENT_LENGTH);
        assert_eq!(ISA_5010.len(), ISA_SEGMENT_LENGTH);
    }

    #[test]
    fn test_delimiter_discovery_4010() {
        let reader = reader_over(ISA_4010);
        let d = reader.delimiters();
        assert_eq!(d.element_separator, b'*');
        assert_eq!(d.component_separator, b':');
        assert_eq!(d.segment_terminator, b'~');
        // 4010 carries `U` in the repetition position, so no separator
        assert_eq!(d.repetition_separator, None);
        assert_eq!(reader.current_isa_segment(), &ISA_4010[..105]);
    }

    #[test]
    fn test_delimiter_discovery_5010() {
        let reader = reader_over(ISA_5010);
        assert_eq!(reader.delimiters().repetition_separator, Some(b'^'));
    }

    #[test]
    fn test_empty_stream() {
        let result = X12StreamReader::new(Cursor::new(Vec::new()), &[]);
        assert!(matches!(result, Err(ReaderError::EmptyStream)));
    }

    #[test]
    fn test_whitespace_only_stream_is_empty() {
        let result = X12StreamReader::new(Cursor::new(b"\r\n  \n".to_vec()), &[]);
        assert!(matches!(result, Err(ReaderError::EmptyStream)));
    }

    #[test]
    fn test_short_header_is_malformed() {
        let result = X12StreamReader::new(Cursor::new(b"ISA*00*shorty~".to_vec()), &[]);
        assert!(matches!(result, Err(ReaderError::MalformedHeader(_))));
    }

    #[test]
    fn test_non_isa_prefix_is_malformed() {
        let text = format!("GS{}", &ISA_4010[2..]);
        let result = X12StreamReader::new(Cursor::new(text.into_bytes()), &[]);
        assert!(matches!(result, Err(ReaderError::MalformedHeader(_))));
    }

    #[test]
    fn test_reads_segments_without_terminator() {
        let text = format!("{}GS*HC*S*R*20040101*1200*1*X*004010~ST*837*0001~", ISA_4010);
        let mut reader = reader_over(&text);
        assert_eq!(
            reader.read_next_segment().unwrap(),
            "GS*HC*S*R*20040101*1200*1*X*004010"
        );
        assert_eq!(reader.read_next_segment().unwrap(), "ST*837*0001");
        assert_eq!(reader.read_next_segment().unwrap(), "");
        assert_eq!(reader.read_next_segment().unwrap(), "");
    }

    #[test]
    fn test_ignored_chars_are_skipped() {
        let text = format!("{}\r\nGS*HC*S*R~\r\nST*837*0001~\r\n", ISA_4010);
        let mut reader =
            X12StreamReader::new(Cursor::new(text.into_bytes()), &[b'\r', b'\n']).unwrap();
        assert_eq!(reader.read_next_segment().unwrap(), "GS*HC*S*R");
        assert_eq!(reader.read_next_segment().unwrap(), "ST*837*0001");
        assert_eq!(reader.read_next_segment().unwrap(), "");
    }

    #[test]
    fn test_newline_terminator_strips_inter_segment_whitespace() {
        let header = ISA_4010.replace('~', "\n");
        let text = format!("{}GS*HC*S*R\n\nST*837*0001\n", header);
        let mut reader = X12StreamReader::new(Cursor::new(text.into_bytes()), &[]).unwrap();
        assert_eq!(reader.delimiters().segment_terminator, b'\n');
        assert_eq!(reader.read_next_segment().unwrap(), "GS*HC*S*R");
        assert_eq!(reader.read_next_segment().unwrap(), "ST*837*0001");
        assert_eq!(reader.read_next_segment().unwrap(), "");
    }

    #[test]
    fn test_stray_terminators_are_skipped() {
        let text = format!("{}~~GS*HC*S*R~~~IEA*0*000000001~", ISA_4010);
        let mut reader = reader_over(&text);
        assert_eq!(reader.read_next_segment().unwrap(), "GS*HC*S*R");
        assert_eq!(reader.read_next_segment().unwrap(), "IEA*0*000000001");
        assert_eq!(reader.read_next_segment().unwrap(), "");
    }

    #[test]
    fn test_unterminated_tail_is_returned() {
        let text = format!("{}IEA*0*000000001", ISA_4010);
        let mut reader = reader_over(&text);
        assert_eq!(reader.read_next_segment().unwrap(), "IEA*0*000000001");
        assert_eq!(reader.read_next_segment().unwrap(), "");
    }

    #[test]
    fn test_resync_on_second_interchange() {
        let second = ISA_4010.replace('*', "|");
        let text = format!("{}IEA*0*000000001~{}IEA|0|000000001~", ISA_4010, second);
        let mut reader = reader_over(&text);
        assert_eq!(reader.read_next_segment().unwrap(), "IEA*0*000000001");

        let isa = reader.read_next_segment().unwrap();
        assert!(isa.starts_with("ISA|00|"));
        assert_eq!(reader.delimiters().element_separator, b'|');
        assert_eq!(reader.current_isa_segment(), isa);

        assert_eq!(reader.read_next_segment().unwrap(), "IEA|0|000000001");
        assert_eq!(reader.read_next_segment().unwrap(), "");
    }

    #[test]
    fn test_read_segment_id() {
        let reader = reader_over(ISA_4010);
        assert_eq!(reader.read_segment_id("CLM*A37YH556*500"), "CLM");
        assert_eq!(reader.read_segment_id("SE"), "SE");
        assert_eq!(reader.read_segment_id(""), "");
    }
}
