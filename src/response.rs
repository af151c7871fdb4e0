//! Response body decoding

use crate::config::LineBreaks;
use std::io::{self, BufRead, BufReader, Read};

/// Read a response body to the end and decode it as UTF-8 text.
///
/// Malformed sequences become U+FFFD. With [`LineBreaks::Discard`] the body is
/// read line by line and the lines are joined with nothing in between.
pub fn read_text<R: Read>(reader: R, line_breaks: LineBreaks) -> io::Result<String> {
    let mut reader = BufReader::new(reader);

    match line_breaks {
        LineBreaks::Preserve => {
            let mut body = Vec::new();
            reader.read_to_end(&mut body)?;
            Ok(String::from_utf8_lossy(&body).into_owned())
        }
        LineBreaks::Discard => {
            let mut text = String::new();
            let mut line = Vec::new();
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line)? == 0 {
                    break;
                }
                // a lone '\r' also ends a line
                line.retain(|&b| b != b'\n' && b != b'\r');
                text.push_str(&String::from_utf8_lossy(&line));
            }
            Ok(text)
        }
    }
}
