//! Reader for recorded dumps: a stream of JSON [`RpcRecord`]s, one per call,
//! either newline-delimited or simply concatenated.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde_json::de::IoRead;
use serde_json::StreamDeserializer;
use tracing::debug;

use crate::error::LoadError;
use crate::message::RpcRecord;

pub struct DumpReader<R: Read> {
    records: StreamDeserializer<'static, IoRead<R>, RpcRecord>,
    index: usize,
}

impl DumpReader<BufReader<File>> {
    /// Open a dump file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Opened dump {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> DumpReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            records: serde_json::Deserializer::from_reader(reader).into_iter(),
            index: 0,
        }
    }

    /// Next record, `Ok(None)` at a clean end of input.
    pub fn next_record(&mut self) -> Result<Option<RpcRecord>, LoadError> {
        let index = self.index;
        match self.records.next() {
            None => Ok(None),
            Some(Err(source)) => Err(LoadError::Json { index, source }),
            Some(Ok(record)) => {
                self.index += 1;
                if record.service.is_empty() || record.method.is_empty() {
                    return Err(LoadError::InvalidRecord {
                        index,
                        reason: "record is missing service or method".to_string(),
                    });
                }
                Ok(Some(record))
            }
        }
    }

    /// Number of records read so far.
    pub fn records_read(&self) -> usize {
        self.index
    }
}

impl<R: Read> Iterator for DumpReader<R> {
    type Item = Result<RpcRecord, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Origin;

    const TWO_RECORDS: &str = r#"
{"service":"pkg.Svc","method":"Chat","messages":[{"message_origin":"client","raw_message":"YQ=="},{"message_origin":"server","raw_message":"Yg=="}]}
{"service":"pkg.Svc","method":"Watch","messages":[{"message_origin":"server","raw_message":"Yw=="}]}
"#;

    #[test]
    fn test_reads_records_in_order_then_stops() {
        let mut reader = DumpReader::new(TWO_RECORDS.as_bytes());

        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.stream_name(), "/pkg.Svc/Chat");
        assert_eq!(first.messages.len(), 2);
        assert_eq!(first.messages[0].message_origin, Origin::Client);
        assert_eq!(first.messages[1].raw_message, b"b");

        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.stream_name(), "/pkg.Svc/Watch");

        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.records_read(), 2);
    }

    #[test]
    fn test_concatenated_records_without_newlines() {
        let input = r#"{"service":"a.B","method":"C"}{"service":"a.B","method":"D"}"#;
        let names: Vec<String> = DumpReader::new(input.as_bytes())
            .map(|record| record.unwrap().stream_name())
            .collect();
        assert_eq!(names, vec!["/a.B/C", "/a.B/D"]);
    }

    #[test]
    fn test_malformed_record_is_an_error() {
        let input = r#"{"service":"a.B","method":"C"} {"service": 12"#;
        let mut reader = DumpReader::new(input.as_bytes());
        assert!(reader.next_record().unwrap().is_some());
        match reader.next_record() {
            Err(LoadError::Json { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected json error, got {:?}", other),
        }
    }

    #[test]
    fn test_record_without_method_is_rejected() {
        let input = r#"{"service":"a.B","method":""}"#;
        let mut reader = DumpReader::new(input.as_bytes());
        assert!(matches!(
            reader.next_record(),
            Err(LoadError::InvalidRecord { index: 0, .. })
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let err = DumpReader::open("/definitely/not/here.json").err().unwrap();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
