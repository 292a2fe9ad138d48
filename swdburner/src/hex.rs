// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Intel HEX parsing
//!
//! Record types 00 (data), 01 (end of file), 02 (extended segment address)
//! and 04 (extended linear address) are used.  03 and 05, the start
//! addresses, are parsed and ignored: the target starts from its reset
//! vector.  Every record's checksum is checked.

use core::fmt;
use core::ops::Range;
use heapless::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

/// Most data bytes one record can carry.
pub const MAX_RECORD_DATA: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexErrorKind {
    /// Line does not start with ':'
    MissingColon,
    /// A character is not a hex digit, or the line has an odd length
    InvalidDigit,
    /// Byte count doesn't match the line length, or the record type's
    /// fixed length
    BadLength,
    /// Checksum byte is wrong
    Checksum,
    /// Record type other than 00-05
    UnknownRecord(u8),
    /// Address outside the 32-bit space
    AddressOverflow,
    /// No end of file record
    MissingEof,
    /// File has no data records
    Empty,
}

/// A parse failure, with the 1-based line it occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexError {
    pub line: usize,
    pub kind: HexErrorKind,
}

impl HexError {
    fn new(line: usize, kind: HexErrorKind) -> Self {
        Self { line, kind }
    }
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {:?}", self.line, self.kind)
    }
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Data { offset: u16, data: Vec<u8, MAX_RECORD_DATA> },
    EndOfFile,
    ExtendedSegmentAddress(u16),
    StartSegmentAddress { cs: u16, ip: u16 },
    ExtendedLinearAddress(u16),
    StartLinearAddress(u32),
}

fn hex_digit(c: u8) -> Result<u8, HexErrorKind> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(HexErrorKind::InvalidDigit),
    }
}

fn parse_record(line: &[u8]) -> Result<Record, HexErrorKind> {
    let digits = line.strip_prefix(b":").ok_or(HexErrorKind::MissingColon)?;
    if digits.len() % 2 != 0 {
        return Err(HexErrorKind::InvalidDigit);
    }

    // Byte count, address (2), type, data, checksum
    let mut bytes: Vec<u8, { MAX_RECORD_DATA + 5 }> = Vec::new();
    for pair in digits.chunks_exact(2) {
        let byte = (hex_digit(pair[0])? << 4) | hex_digit(pair[1])?;
        bytes.push(byte).map_err(|_| HexErrorKind::BadLength)?;
    }
    if bytes.len() < 5 || bytes.len() != bytes[0] as usize + 5 {
        return Err(HexErrorKind::BadLength);
    }

    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != 0 {
        return Err(HexErrorKind::Checksum);
    }

    let offset = u16::from_be_bytes([bytes[1], bytes[2]]);
    let record_type = bytes[3];
    let data = &bytes[4..bytes.len() - 1];
    let word = |n: usize| -> Result<(), HexErrorKind> {
        if data.len() == n {
            Ok(())
        } else {
            Err(HexErrorKind::BadLength)
        }
    };

    match record_type {
        0x00 => Ok(Record::Data {
            offset,
            data: Vec::from_slice(data).map_err(|_| HexErrorKind::BadLength)?,
        }),
        0x01 => word(0).map(|_| Record::EndOfFile),
        0x02 => word(2).map(|_| Record::ExtendedSegmentAddress(u16::from_be_bytes([data[0], data[1]]))),
        0x03 => word(4).map(|_| Record::StartSegmentAddress {
            cs: u16::from_be_bytes([data[0], data[1]]),
            ip: u16::from_be_bytes([data[2], data[3]]),
        }),
        0x04 => word(2).map(|_| Record::ExtendedLinearAddress(u16::from_be_bytes([data[0], data[1]]))),
        0x05 => word(4).map(|_| {
            Record::StartLinearAddress(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
        }),
        other => Err(HexErrorKind::UnknownRecord(other)),
    }
}

/// Longest line accepted: a full data record, plus a CR.
pub const MAX_LINE: usize = 1 + 2 * (MAX_RECORD_DATA + 5) + 1;

// Bytes read at a time when streaming
const READ_CHUNK: usize = 128;

/// Turns lines into absolute data records, tracking the extended address
/// records between them.
#[derive(Debug, Default)]
pub struct Decoder {
    base: u32,
    line: usize,
    done: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one line.
    ///
    /// Returns:
    /// - `Ok(Some((addr, data)))`: for a data record.
    /// - `Ok(None)`: for a blank line, any other record, or anything after
    ///   the end of file record.
    /// - `Err(HexError)`: if the line is malformed.
    pub fn feed(&mut self, raw: &[u8]) -> Result<Option<(u32, Vec<u8, MAX_RECORD_DATA>)>, HexError> {
        if self.done {
            return Ok(None);
        }
        self.line += 1;
        let line = raw.trim_ascii();
        if line.is_empty() {
            return Ok(None);
        }
        match parse_record(line).map_err(|kind| self.error(kind))? {
            Record::Data { offset, data } => {
                let addr = self
                    .base
                    .checked_add(offset as u32)
                    .filter(|a| a.checked_add(data.len() as u32).is_some())
                    .ok_or(self.error(HexErrorKind::AddressOverflow))?;
                return Ok(Some((addr, data)));
            }
            Record::ExtendedSegmentAddress(segment) => self.base = (segment as u32) << 4,
            Record::ExtendedLinearAddress(upper) => self.base = (upper as u32) << 16,
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {
                trace!("Info:  Ignoring start address record");
            }
            Record::EndOfFile => self.done = true,
        }
        Ok(None)
    }

    /// Whether the end of file record has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Checks the file ended properly.
    pub fn finish(&self) -> Result<(), HexError> {
        if self.done {
            Ok(())
        } else {
            Err(self.error(HexErrorKind::MissingEof))
        }
    }

    fn error(&self, kind: HexErrorKind) -> HexError {
        HexError::new(self.line, kind)
    }
}

/// Calls `f` with the absolute address and bytes of every data record, in
/// file order, reading the file in chunks rather than holding it in memory.
///
/// Arguments:
/// - `len`: Length of the file.
/// - `read`: Fills a buffer from the file, starting at the given offset.
/// - `f`: Called once per data record.
///
/// Returns:
/// - `Ok(())`: if the whole file parsed, up to and including its end of
///   file record, and every call to `f` succeeded.
/// - `Err(E)`: the first read or parse error, converted, or the first error
///   from `f`.
pub fn for_each_data_in<E, R, F>(len: u32, mut read: R, mut f: F) -> Result<(), E>
where
    E: From<HexError>,
    R: FnMut(u32, &mut [u8]) -> Result<(), E>,
    F: FnMut(u32, &[u8]) -> Result<(), E>,
{
    let mut decoder = Decoder::new();
    let mut line: Vec<u8, MAX_LINE> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut offset = 0;

    while offset < len {
        let n = (len - offset).min(READ_CHUNK as u32) as usize;
        read(offset, &mut chunk[..n])?;
        offset += n as u32;

        for &byte in &chunk[..n] {
            if byte != b'\n' {
                if line.push(byte).is_err() {
                    decoder.line += 1;
                    return Err(decoder.error(HexErrorKind::BadLength).into());
                }
                continue;
            }
            if let Some((addr, data)) = decoder.feed(&line)? {
                f(addr, &data)?;
            }
            line.clear();
            if decoder.is_done() {
                return Ok(());
            }
        }
    }

    // Final line without a newline
    if let Some((addr, data)) = decoder.feed(&line)? {
        f(addr, &data)?;
    }
    decoder.finish()?;
    Ok(())
}

/// Calls `f` with the absolute address and bytes of every data record of a
/// file held in memory.  See [`for_each_data_in`].
pub fn for_each_data<E, F>(text: &[u8], f: F) -> Result<(), E>
where
    E: From<HexError>,
    F: FnMut(u32, &[u8]) -> Result<(), E>,
{
    for_each_data_in(text.len() as u32, slice_reader(text), f)
}

/// The address range covered by the data records of a file read in chunks,
/// from the lowest address to one past the highest.
pub fn extent_in<E, R>(len: u32, read: R) -> Result<Range<u32>, E>
where
    E: From<HexError>,
    R: FnMut(u32, &mut [u8]) -> Result<(), E>,
{
    let mut range: Option<Range<u32>> = None;
    for_each_data_in::<E, _, _>(len, read, |addr, data| {
        let end = addr + data.len() as u32;
        range = Some(match range.take() {
            Some(r) => r.start.min(addr)..r.end.max(end),
            None => addr..end,
        });
        Ok(())
    })?;
    range.ok_or(HexError::new(0, HexErrorKind::Empty).into())
}

/// The address range covered by the file's data records, from the lowest
/// address to one past the highest.
pub fn extent(text: &[u8]) -> Result<Range<u32>, HexError> {
    extent_in(text.len() as u32, slice_reader(text))
}

fn slice_reader<E>(text: &[u8]) -> impl FnMut(u32, &mut [u8]) -> Result<(), E> + '_ {
    move |offset, buf| {
        let start = offset as usize;
        buf.copy_from_slice(&text[start..start + buf.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLINKY: &str = "\
:020000040800F2
:10000000000200209D010008A1010008A3010008D2
:04001000A50100083E
:040000050800019955
:00000001FF
";

    #[test]
    fn record_types() {
        let records: std::vec::Vec<_> = BLINKY
            .lines()
            .map(|line| parse_record(line.as_bytes()))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0], Record::ExtendedLinearAddress(0x0800));
        match &records[1] {
            Record::Data { offset, data } => {
                assert_eq!(*offset, 0);
                assert_eq!(data.len(), 16);
                assert_eq!(data[..4], [0x00, 0x02, 0x00, 0x20]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(records[3], Record::StartLinearAddress(0x0800_0199));
        assert_eq!(records[4], Record::EndOfFile);
    }

    #[test]
    fn absolute_addresses() {
        let mut seen = std::vec::Vec::new();
        for_each_data::<HexError, _>(BLINKY.as_bytes(), |addr, data| {
            seen.push((addr, data.len()));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, [(0x0800_0000, 16), (0x0800_0010, 4)]);
        assert_eq!(extent(BLINKY.as_bytes()), Ok(0x0800_0000..0x0800_0014));
    }

    #[test]
    fn segment_addressing() {
        let text = ":020000021000EC\n:01001000559A\n:00000001FF\n";
        assert_eq!(extent(text.as_bytes()), Ok(0x1_0010..0x1_0011));
    }

    #[test]
    fn checksum_is_checked() {
        let text = ":04001000A50100083F\n:00000001FF\n";
        let err = extent(text.as_bytes()).unwrap_err();
        assert_eq!(err, HexError { line: 1, kind: HexErrorKind::Checksum });
    }

    #[test]
    fn malformed_lines() {
        let kind = |text: &str| extent(text.as_bytes()).unwrap_err().kind;
        assert_eq!(kind("04001000A50100083E\n"), HexErrorKind::MissingColon);
        assert_eq!(kind(":04001000A5010008\n"), HexErrorKind::BadLength);
        assert_eq!(kind(":0400100GA50100083E\n"), HexErrorKind::InvalidDigit);
        assert_eq!(kind(":00000006FA\n"), HexErrorKind::UnknownRecord(6));
        assert_eq!(kind(":04001000A50100083E\n"), HexErrorKind::MissingEof);
        assert_eq!(kind(":00000001FF\n"), HexErrorKind::Empty);
    }

    #[test]
    fn streamed_in_small_reads() {
        let text = BLINKY.as_bytes();
        let mut reads = 0;
        let mut seen = std::vec::Vec::new();
        for_each_data_in::<HexError, _, _>(
            text.len() as u32,
            |offset, buf| {
                reads += 1;
                buf.copy_from_slice(&text[offset as usize..offset as usize + buf.len()]);
                Ok(())
            },
            |addr, data| {
                seen.push((addr, data.to_vec()));
                Ok(())
            },
        )
        .unwrap();
        assert!(reads > 1);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (0x0800_0010, std::vec![0xA5, 0x01, 0x00, 0x08]));
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut text = std::string::String::from(":020000040800F2\n:");
        text.push_str(&"0".repeat(MAX_LINE));
        text.push('\n');
        let err = extent(text.as_bytes()).unwrap_err();
        assert_eq!(err, HexError { line: 2, kind: HexErrorKind::BadLength });
    }

    #[test]
    fn final_line_needs_no_newline() {
        assert_eq!(extent(b":0100000011EE\n:00000001FF"), Ok(0..1));
    }

    #[test]
    fn crlf_and_trailing_records() {
        let text = ":0100000011EE\r\n\r\n:00000001FF\r\n:0100010022DC\r\n";
        assert_eq!(extent(text.as_bytes()), Ok(0..1));
    }
}
