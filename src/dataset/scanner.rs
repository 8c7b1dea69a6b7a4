//! Byte-level element readers for the two supported dataset layouts.
//!
//! Both readers hand out the raw bytes of one top-level record at a time and
//! can step over a record without keeping its bytes, so skipping a committed
//! prefix of a large file never builds records in memory.

use std::io::{self, BufRead};

/// Outcome of reading one element.
#[derive(Debug, PartialEq, Eq)]
pub enum Element {
    /// Raw JSON bytes of the element.
    Bytes(Vec<u8>),
    /// The element was consumed without being kept.
    Skipped,
    /// A top-level value that is not an object.
    NotAnObject,
}

/// Reads one JSON object per non-blank line.
pub struct LineScanner<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead> LineScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }

    pub fn next_element(&mut self, keep: bool) -> io::Result<Option<Element>> {
        loop {
            self.line.clear();
            if self.reader.read_until(b'\n', &mut self.line)? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            if !keep {
                return Ok(Some(Element::Skipped));
            }
            if trimmed[0] != b'{' {
                return Ok(Some(Element::NotAnObject));
            }
            return Ok(Some(Element::Bytes(trimmed.to_vec())));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// Before the opening bracket.
    Start,
    /// After `[`, before the first element.
    First,
    /// After an element, expecting `,` or `]`.
    Between,
    /// After `]` or end of input.
    Done,
}

/// Streams the elements of a single top-level JSON array.
pub struct ArrayScanner<R> {
    reader: R,
    state: ArrayState,
}

impl<R: BufRead> ArrayScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ArrayState::Start,
        }
    }

    pub fn next_element(&mut self, keep: bool) -> io::Result<Option<Element>> {
        loop {
            match self.state {
                ArrayState::Done => return Ok(None),
                ArrayState::Start => match self.next_significant()? {
                    None => {
                        self.state = ArrayState::Done;
                        return Ok(None);
                    }
                    Some(b'[') => self.state = ArrayState::First,
                    Some(b) => return Err(syntax(format!("expected '[', found {:?}", b as char))),
                },
                ArrayState::First => match self.peek_significant()? {
                    None => return Err(syntax("unterminated array".to_string())),
                    Some(b']') => {
                        self.bump()?;
                        self.state = ArrayState::Done;
                    }
                    Some(_) => {
                        self.state = ArrayState::Between;
                        return self.read_element(keep).map(Some);
                    }
                },
                ArrayState::Between => match self.next_significant()? {
                    None => return Err(syntax("unterminated array".to_string())),
                    Some(b']') => self.state = ArrayState::Done,
                    Some(b',') => {
                        if self.peek_significant()? == Some(b']') {
                            return Err(syntax("trailing comma in array".to_string()));
                        }
                        return self.read_element(keep).map(Some);
                    }
                    Some(b) => {
                        return Err(syntax(format!("expected ',' or ']', found {:?}", b as char)));
                    }
                },
            }
        }
    }

    /// Consume one element starting at the next significant byte.
    fn read_element(&mut self, keep: bool) -> io::Result<Element> {
        let first = self
            .next_significant()?
            .ok_or_else(|| syntax("unterminated array".to_string()))?;
        if first != b'{' {
            self.skip_scalar_or_container(first)?;
            return Ok(Element::NotAnObject);
        }

        let mut bytes = Vec::new();
        if keep {
            bytes.push(first);
        }
        self.scan_container(&mut bytes, keep)?;
        Ok(if keep {
            Element::Bytes(bytes)
        } else {
            Element::Skipped
        })
    }

    /// Scan until the container opened just before this call is closed.
    fn scan_container(&mut self, bytes: &mut Vec<u8>, keep: bool) -> io::Result<()> {
        let mut depth = 1usize;
        let mut in_string = false;
        let mut escaped = false;

        while depth > 0 {
            let b = self
                .next_byte()?
                .ok_or_else(|| syntax("unexpected end of input inside record".to_string()))?;
            if keep {
                bytes.push(b);
            }
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    fn skip_scalar_or_container(&mut self, first: u8) -> io::Result<()> {
        let mut sink = Vec::new();
        match first {
            b'[' => self.scan_container(&mut sink, false),
            b'"' => {
                let mut escaped = false;
                loop {
                    let b = self
                        .next_byte()?
                        .ok_or_else(|| syntax("unterminated string".to_string()))?;
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        return Ok(());
                    }
                }
            }
            _ => {
                while let Some(b) = self.peek_byte()? {
                    if b == b',' || b == b']' || b.is_ascii_whitespace() {
                        break;
                    }
                    self.bump()?;
                }
                Ok(())
            }
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let b = self.peek_byte()?;
        if b.is_some() {
            self.reader.consume(1);
        }
        Ok(b)
    }

    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        let buf = self.reader.fill_buf()?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) -> io::Result<()> {
        self.next_byte().map(|_| ())
    }

    fn peek_significant(&mut self) -> io::Result<Option<u8>> {
        while let Some(b) = self.peek_byte()? {
            if !b.is_ascii_whitespace() {
                return Ok(Some(b));
            }
            self.reader.consume(1);
        }
        Ok(None)
    }

    fn next_significant(&mut self) -> io::Result<Option<u8>> {
        let b = self.peek_significant()?;
        if b.is_some() {
            self.reader.consume(1);
        }
        Ok(b)
    }
}

fn syntax(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect_array(input: &str) -> io::Result<Vec<String>> {
        let mut scanner = ArrayScanner::new(Cursor::new(input.as_bytes().to_vec()));
        let mut out = Vec::new();
        while let Some(element) = scanner.next_element(true)? {
            match element {
                Element::Bytes(b) => out.push(String::from_utf8(b).unwrap()),
                Element::NotAnObject => out.push("<not an object>".to_string()),
                Element::Skipped => unreachable!(),
            }
        }
        Ok(out)
    }

    #[test]
    fn test_array_elements_with_nested_values() {
        let input = r#" [ {"id": 1, "images": ["a]", "b"]},
            {"id": 2, "name": "quote \" and } brace", "meta": {"k": [1, {"x": 2}]}} ] "#;
        let elements = collect_array(input).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0], r#"{"id": 1, "images": ["a]", "b"]}"#);
        assert!(elements[1].ends_with(r#"{"x": 2}]}}"#));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(collect_array("").unwrap().is_empty());
        assert!(collect_array("  [ ]  ").unwrap().is_empty());
    }

    #[test]
    fn test_non_object_elements_are_flagged() {
        let elements = collect_array(r#"[{"id": 1}, 42, "x", [1, 2], null]"#).unwrap();
        assert_eq!(
            elements,
            vec![
                r#"{"id": 1}"#.to_string(),
                "<not an object>".to_string(),
                "<not an object>".to_string(),
                "<not an object>".to_string(),
                "<not an object>".to_string(),
            ]
        );
    }

    #[test]
    fn test_array_syntax_errors() {
        assert!(collect_array(r#"{"id": 1}"#).is_err());
        assert!(collect_array(r#"[{"id": 1},]"#).is_err());
        assert!(collect_array(r#"[{"id": 1} {"id": 2}]"#).is_err());
        assert!(collect_array(r#"[{"id": 1}"#).is_err());
        assert!(collect_array(r#"[{"id": 1"#).is_err());
    }

    #[test]
    fn test_array_skip_does_not_keep_bytes() {
        let mut scanner =
            ArrayScanner::new(Cursor::new(br#"[{"id": 1}, {"id": 2}, {"id": 3}]"#.to_vec()));
        assert_eq!(scanner.next_element(false).unwrap(), Some(Element::Skipped));
        assert_eq!(scanner.next_element(false).unwrap(), Some(Element::Skipped));
        assert_eq!(
            scanner.next_element(true).unwrap(),
            Some(Element::Bytes(br#"{"id": 3}"#.to_vec()))
        );
        assert_eq!(scanner.next_element(true).unwrap(), None);
    }

    #[test]
    fn test_lines_skip_blank_lines() {
        let input = "{\"id\": 1}\n\n   \n{\"id\": 2}\r\n7\n";
        let mut scanner = LineScanner::new(Cursor::new(input.as_bytes().to_vec()));
        assert_eq!(
            scanner.next_element(true).unwrap(),
            Some(Element::Bytes(b"{\"id\": 1}".to_vec()))
        );
        assert_eq!(scanner.next_element(false).unwrap(), Some(Element::Skipped));
        assert_eq!(
            scanner.next_element(true).unwrap(),
            Some(Element::NotAnObject)
        );
        assert_eq!(scanner.next_element(true).unwrap(), None);
    }
}
