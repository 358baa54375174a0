use csv::{ByteRecord, Reader, ReaderBuilder, Trim};

use crate::storage::ObjectReader;

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Both passes read with the same settings so their record counts agree.
pub(crate) fn csv_reader(stream: ObjectReader) -> Reader<ObjectReader> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .buffer_capacity(READ_BUFFER_BYTES)
        .from_reader(stream)
}

/// Counts data records, header excluded.
pub(crate) fn count_records(stream: ObjectReader) -> Result<u64, csv::Error> {
    let mut rdr = csv_reader(stream);
    let mut record = ByteRecord::new();
    let mut total = 0u64;
    while rdr.read_byte_record(&mut record)? {
        total += 1;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(content: &str) -> ObjectReader {
        Box::new(Cursor::new(content.as_bytes().to_vec()))
    }

    #[test]
    fn test_count_excludes_header() {
        let csv = "identifier,name,description\nA1,Widget,x\n,Bad,y\nA2,Gadget,z\n";
        assert_eq!(count_records(stream(csv)).unwrap(), 3);
    }

    #[test]
    fn test_count_handles_quoted_newlines_and_ragged_rows() {
        let csv = "identifier,name,description\nA1,\"Multi\nline\",x\nA2\nA3,Lamp,desk,extra\n";
        assert_eq!(count_records(stream(csv)).unwrap(), 3);
    }

    #[test]
    fn test_count_empty_and_header_only() {
        assert_eq!(count_records(stream("")).unwrap(), 0);
        assert_eq!(count_records(stream("identifier,name\n")).unwrap(), 0);
    }

    #[test]
    fn test_headers_are_trimmed() {
        let mut rdr = csv_reader(stream(" identifier , name \nA1,Widget\n"));
        let headers = rdr.byte_headers().unwrap().clone();
        assert_eq!(&headers[0], b"identifier");
        assert_eq!(&headers[1], b"name");
    }
}
