//! Motorola S-record reader and writer
//!
//! Only S1, S2 and S3 lines carry program data (16, 24 and 32 bit
//! addresses). Header, count and start-address lines are skipped.
//!
//! ```text
//! S1 13 7AF0 0A0A0D00000000000000000000000000 61
//! ^  ^  ^    ^                                ^
//! |  |  |    data                             checksum
//! |  |  address
//! |  byte count (address + data + checksum)
//! type
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::{DataRecord, FirmwareImage, ImageError, ImageSource, UpdatePlan};

/// Longest line accepted, a type tag plus 255 hex-encoded bytes
pub const MAX_CHARS_PER_LINE: usize = 512;

/// One's complement of the low byte of the sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Address width in bytes of a data record type, `None` for other types
fn data_address_width(kind: char) -> Option<usize> {
    match kind {
        '1' => Some(2),
        '2' => Some(3),
        '3' => Some(4),
        _ => None,
    }
}

fn is_srecord_line(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('S' | 's'), Some(kind)) if kind.is_ascii_digit()
    )
}

fn malformed(line: usize, reason: impl Into<String>) -> ImageError {
    ImageError::Malformed {
        line,
        reason: reason.into(),
    }
}

/// Decode one line, returning `None` for lines that carry no program data
fn parse_line(text: &str, line: usize) -> Result<Option<DataRecord>, ImageError> {
    let text = text.trim_end();
    if text.len() > MAX_CHARS_PER_LINE {
        return Err(malformed(
            line,
            format!(
                "{} characters exceeds the {} character limit",
                text.len(),
                MAX_CHARS_PER_LINE
            ),
        ));
    }
    if !is_srecord_line(text) {
        if !text.is_empty() {
            debug!(line, "Skipping non S-record line");
        }
        return Ok(None);
    }

    // Both leading characters are ASCII, so byte offset 2 is a char boundary
    let Some(address_width) = text[1..2].chars().next().and_then(data_address_width) else {
        return Ok(None);
    };

    let bytes = hex::decode(&text[2..])
        .map_err(|e| malformed(line, format!("invalid hex: {}", e)))?;
    let Some((&count, rest)) = bytes.split_first() else {
        return Err(malformed(line, "missing byte count"));
    };
    if rest.len() != usize::from(count) {
        return Err(malformed(
            line,
            format!("byte count is {} but {} bytes follow", count, rest.len()),
        ));
    }
    if rest.len() < address_width + 1 {
        return Err(malformed(line, "record too short for its address"));
    }

    let (body, expected) = bytes.split_at(bytes.len() - 1);
    if checksum(body) != expected[0] {
        warn!(line, "Skipping S-record with bad checksum");
        return Ok(None);
    }

    let address = body[1..=address_width]
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    let data = &body[1 + address_width..];
    if data.is_empty() {
        return Ok(None);
    }

    Ok(Some(DataRecord {
        address,
        data: data.to_vec(),
    }))
}

/// Opens `.srec`/`.s19`/`.s28`/`.s37` style files
#[derive(Debug, Clone, Copy, Default)]
pub struct SrecordSource;

impl ImageSource for SrecordSource {
    type Image = SrecordImage<BufReader<File>>;

    fn validate(&self, path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };

        let mut first = String::new();
        match BufReader::new(file).read_line(&mut first) {
            Ok(0) | Err(_) => false,
            Ok(_) => is_srecord_line(&first),
        }
    }

    fn open(&self, path: &Path) -> Result<Self::Image, ImageError> {
        let file = File::open(path)?;
        Ok(SrecordImage::new(BufReader::new(file)))
    }
}

/// An opened S-record image
pub struct SrecordImage<R> {
    reader: Option<R>,
    line_no: usize,
    line: String,
}

impl<R: BufRead + Seek> SrecordImage<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            line_no: 0,
            line: String::new(),
        }
    }

    fn rewind(&mut self) -> Result<(), ImageError> {
        let reader = self.reader.as_mut().ok_or(ImageError::Closed)?;
        reader.seek(SeekFrom::Start(0))?;
        self.line_no = 0;
        Ok(())
    }

    /// Read the next line into `self.line`, `false` at end of file
    fn read_line(&mut self) -> Result<bool, ImageError> {
        let reader = self.reader.as_mut().ok_or(ImageError::Closed)?;
        self.line.clear();

        match reader.read_line(&mut self.line) {
            Ok(0) => Ok(false),
            Ok(_) => {
                self.line_no += 1;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                Err(malformed(self.line_no + 1, "line is not valid text"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: BufRead + Seek + Send> FirmwareImage for SrecordImage<R> {
    fn parse(&mut self) -> Result<UpdatePlan, ImageError> {
        self.rewind()?;

        let mut low = u32::MAX;
        let mut high = 0u32;
        let mut total = 0u32;
        let mut records = 0usize;

        while let Some(record) = self.next_record()? {
            let len = record.len() as u32;
            let end = record
                .address
                .checked_add(len - 1)
                .ok_or_else(|| {
                    malformed(self.line_no, "record extends past the 32-bit address space")
                })?;

            low = low.min(record.address);
            high = high.max(end);
            total += len;
            records += 1;
        }

        self.rewind()?;

        if records == 0 {
            return Err(ImageError::Empty);
        }

        debug!(records, low, high, total, "Parsed S-record image");
        Ok(UpdatePlan {
            address_low: low,
            address_high: high,
            total_bytes: total,
        })
    }

    fn next_record(&mut self) -> Result<Option<DataRecord>, ImageError> {
        while self.read_line()? {
            if let Some(record) = parse_line(&self.line, self.line_no)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!("S-record image closed");
        }
    }
}

/// Writes data as S-records.
///
/// Each line uses the narrowest data record type that can hold its
/// addresses, and [`finish`](Self::finish) writes the matching
/// termination record.
pub struct SrecordWriter<W: Write> {
    writer: W,
    bytes_per_line: usize,
    widest: usize,
}

impl<W: Write> SrecordWriter<W> {
    /// Bytes per line are clamped so an S3 line stays within [`MAX_CHARS_PER_LINE`]
    pub fn new(writer: W, bytes_per_line: usize) -> Self {
        // count byte, 4 address bytes and checksum
        let max_data = (MAX_CHARS_PER_LINE - 2) / 2 - 6;
        Self {
            writer,
            bytes_per_line: bytes_per_line.clamp(1, max_data),
            widest: 2,
        }
    }

    /// S0 header record with free-form text
    pub fn write_header(&mut self, text: &str) -> io::Result<()> {
        let text = &text.as_bytes()[..text.len().min(self.bytes_per_line)];
        self.write_record('0', 0, 2, text)
    }

    pub fn write_data(&mut self, address: u32, data: &[u8]) -> io::Result<()> {
        let mut address = address;
        for chunk in data.chunks(self.bytes_per_line) {
            let end = u64::from(address) + chunk.len() as u64 - 1;
            let width = if end <= 0xFFFF {
                2
            } else if end <= 0xFF_FFFF {
                3
            } else {
                4
            };
            self.widest = self.widest.max(width);

            let kind = match width {
                2 => '1',
                3 => '2',
                _ => '3',
            };
            self.write_record(kind, address, width, chunk)?;
            address = address.wrapping_add(chunk.len() as u32);
        }
        Ok(())
    }

    /// Write the termination record and hand back the writer
    pub fn finish(mut self, start_address: u32) -> io::Result<W> {
        let kind = match self.widest {
            2 => '9',
            3 => '8',
            _ => '7',
        };
        let width = self.widest;
        self.write_record(kind, start_address, width, &[])?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_record(
        &mut self,
        kind: char,
        address: u32,
        width: usize,
        data: &[u8],
    ) -> io::Result<()> {
        let mut body = Vec::with_capacity(1 + width + data.len());
        body.push((width + data.len() + 1) as u8);
        body.extend_from_slice(&address.to_be_bytes()[4 - width..]);
        body.extend_from_slice(data);

        writeln!(
            self.writer,
            "S{}{}{:02X}",
            kind,
            hex::encode_upper(&body),
            checksum(&body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
S00600004844521B
S107100001020304DE
S206012000AABB73
S30908000000DEADBEEFB6
S5030003F9
S70508000000F2
";

    fn image(content: &str) -> SrecordImage<Cursor<Vec<u8>>> {
        SrecordImage::new(Cursor::new(content.as_bytes().to_vec()))
    }

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_checksum() {
        // Reference line from the Motorola format description
        let bytes = hex::decode("137AF00A0A0D0000000000000000000000000061").unwrap();
        let (body, expected) = bytes.split_at(bytes.len() - 1);
        assert_eq!(checksum(body), expected[0]);
    }

    #[test]
    fn test_records_in_file_order() {
        let mut image = image(SAMPLE);

        let records: Vec<DataRecord> =
            std::iter::from_fn(|| image.next_record().unwrap()).collect();

        assert_eq!(
            records,
            vec![
                DataRecord { address: 0x1000, data: vec![1, 2, 3, 4] },
                DataRecord { address: 0x01_2000, data: vec![0xAA, 0xBB] },
                DataRecord { address: 0x0800_0000, data: vec![0xDE, 0xAD, 0xBE, 0xEF] },
            ]
        );
    }

    #[test]
    fn test_parse_plan_and_rewind() {
        let mut image = image(SAMPLE);

        let plan = image.parse().unwrap();
        assert_eq!(
            plan,
            UpdatePlan {
                address_low: 0x1000,
                address_high: 0x0800_0003,
                total_bytes: 10,
            }
        );

        // Parsing leaves the image at the first record
        let first = image.next_record().unwrap().unwrap();
        assert_eq!(first.address, 0x1000);
    }

    #[test]
    fn test_bad_checksum_is_skipped() {
        let mut image = image("S107100001020304DF\nS206012000AABB73\n");

        let record = image.next_record().unwrap().unwrap();
        assert_eq!(record.address, 0x01_2000);
        assert!(image.next_record().unwrap().is_none());
    }

    #[test]
    fn test_lowercase_and_crlf() {
        let mut image = image("s107100001020304de\r\n");
        let record = image.next_record().unwrap().unwrap();
        assert_eq!(record.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_invalid_hex_is_malformed() {
        let mut image = image("S00600004844521B\nS1071000010203ZZDE\n");
        let err = image.next_record().unwrap_err();
        assert!(matches!(err, ImageError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_wrong_byte_count_is_malformed() {
        let mut image = image("S10810000102030400\n");
        assert!(matches!(
            image.next_record().unwrap_err(),
            ImageError::Malformed { line: 1, .. }
        ));
    }

    fn s1_line(data_len: usize) -> String {
        let mut body = vec![(data_len + 3) as u8, 0x10, 0x00];
        body.extend((0..data_len).map(|i| i as u8));
        body.push(checksum(&body));
        format!("S1{}\n", hex::encode_upper(&body))
    }

    #[test]
    fn test_line_length_limit() {
        let longest = s1_line(251);
        assert_eq!(longest.trim_end().len(), MAX_CHARS_PER_LINE);
        let record = image(&longest).next_record().unwrap().unwrap();
        assert_eq!(record.data.len(), 251);

        let too_long = s1_line(252);
        assert_eq!(too_long.trim_end().len(), MAX_CHARS_PER_LINE + 2);
        assert!(matches!(
            image(&too_long).next_record().unwrap_err(),
            ImageError::Malformed { line: 1, .. }
        ));
    }

    #[test]
    fn test_writer_lines_fit_limit() {
        let data = vec![0x5A; 1000];
        let mut writer = SrecordWriter::new(Vec::new(), 1000);
        writer.write_data(0x0800_0000, &data).unwrap();
        let out = String::from_utf8(writer.finish(0).unwrap()).unwrap();

        let longest = out.lines().map(str::len).max().unwrap();
        assert_eq!(longest, MAX_CHARS_PER_LINE);

        let mut image = SrecordImage::new(Cursor::new(out.into_bytes()));
        assert_eq!(image.parse().unwrap().total_bytes, 1000);
    }

    #[test]
    fn test_empty_image() {
        let mut image = image("S00600004844521B\nS9030000FC\n");
        assert!(matches!(image.parse().unwrap_err(), ImageError::Empty));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut image = image(SAMPLE);
        image.close();
        image.close();
        assert!(matches!(image.next_record().unwrap_err(), ImageError::Closed));
        assert!(matches!(image.parse().unwrap_err(), ImageError::Closed));
    }

    #[test]
    fn test_validate() {
        let source = SrecordSource;

        let good = temp_file(SAMPLE.as_bytes());
        assert!(source.validate(good.path()));

        let text = temp_file(b"hello world\n");
        assert!(!source.validate(text.path()));

        let empty = temp_file(b"");
        assert!(!source.validate(empty.path()));

        let binary = temp_file(&[0xFF, 0xFE, 0x00, 0x81]);
        assert!(!source.validate(binary.path()));

        assert!(!source.validate(Path::new("/nonexistent/firmware.srec")));
    }

    #[test]
    fn test_open_and_parse_file() {
        let file = temp_file(SAMPLE.as_bytes());
        let mut image = SrecordSource.open(file.path()).unwrap();
        assert_eq!(image.parse().unwrap().total_bytes, 10);
        image.close();
    }

    #[test]
    fn test_open_missing_file() {
        let result = SrecordSource.open(Path::new("/nonexistent/firmware.srec"));
        assert!(matches!(result, Err(ImageError::Io(_))));
    }

    #[test]
    fn test_writer_output() {
        let mut writer = SrecordWriter::new(Vec::new(), 16);
        writer.write_header("HDR").unwrap();
        writer.write_data(0x1000, &[1, 2, 3, 4]).unwrap();
        let out = String::from_utf8(writer.finish(0).unwrap()).unwrap();

        assert_eq!(out, "S00600004844521B\nS107100001020304DE\nS9030000FC\n");
    }

    #[test]
    fn test_writer_picks_record_type() {
        let mut writer = SrecordWriter::new(Vec::new(), 16);
        writer.write_data(0x0800_0000, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        let out = String::from_utf8(writer.finish(0x0800_0000).unwrap()).unwrap();

        assert_eq!(out, "S30908000000DEADBEEFB6\nS70508000000F2\n");
    }

    #[test]
    fn test_writer_output_reads_back() {
        let data: Vec<u8> = (0..=255).collect();
        let mut writer = SrecordWriter::new(Vec::new(), 32);
        writer.write_data(0xFFF0, &data).unwrap();
        let bytes = writer.finish(0).unwrap();

        let mut image = SrecordImage::new(Cursor::new(bytes));
        let plan = image.parse().unwrap();
        assert_eq!(plan.address_low, 0xFFF0);
        assert_eq!(plan.address_high, 0xFFF0 + 255);
        assert_eq!(plan.total_bytes, 256);

        let mut read = Vec::new();
        while let Some(record) = image.next_record().unwrap() {
            read.extend(record.data);
        }
        assert_eq!(read, data);
    }
}
