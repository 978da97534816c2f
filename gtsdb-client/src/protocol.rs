//! GTSDB wire protocol
//!
//! Newline-delimited ASCII. Client requests:
//!
//! ```text
//! key,timestamp,value               write one data point
//! key,start,end,downsampling        range query (0 = raw points)
//! subscribe,key                     begin push notifications
//! unsubscribe,key                   stop push notifications
//! ```
//!
//! Server lines are either a query response (`rec|rec|...`, each record being
//! `key,timestamp,value`) or an unsolicited push (`key,timestamp,value`). Nothing
//! on the wire tells the two apart; see [`crate::framing`].

use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between records of a query response
pub const RECORD_SEPARATOR: char = '|';

/// Separator between fields of a record
pub const FIELD_SEPARATOR: char = ',';

/// A single measurement as carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub key: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(key: impl Into<String>, timestamp: i64, value: f64) -> Self {
        Self {
            key: key.into(),
            timestamp,
            value,
        }
    }

    /// Timestamp as a UTC date-time, `None` if out of chrono's range.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
    }
}

/// A range query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub key: String,
    pub start: i64,
    pub end: i64,
    /// Aggregation interval in seconds, 0 requests raw points
    pub downsampling: u64,
}

impl QueryRequest {
    pub fn new(key: impl Into<String>, start: i64, end: i64, downsampling: u64) -> Self {
        Self {
            key: key.into(),
            start,
            end,
            downsampling,
        }
    }

    pub fn encode(&self) -> String {
        encode_query(&self.key, self.start, self.end, self.downsampling)
    }
}

/// Decoded query response
///
/// Malformed records are dropped from `points` but counted in `skipped`, so
/// callers can tell an empty response from one that was all garbage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub points: Vec<DataPoint>,
    pub skipped: usize,
}

impl QueryResponse {
    /// Number of records the server sent, valid or not
    pub fn record_count(&self) -> usize {
        self.points.len() + self.skipped
    }

    /// True when the server sent no records at all
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn last(&self) -> Option<&DataPoint> {
        self.points.last()
    }

    /// Arithmetic mean of the valid values
    pub fn mean(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let sum: f64 = self.points.iter().map(|p| p.value).sum();
        Some(sum / self.points.len() as f64)
    }
}

/// Format a write request. `key` must not contain `,` or a newline.
///
/// `value` should be finite; NaN and infinities format as `NaN`/`inf`, which
/// do not decode back to the same value. [`crate::TsdbClient::write_data`]
/// rejects them.
pub fn encode_write(key: &str, timestamp: i64, value: f64) -> String {
    format!("{key},{timestamp},{value}\n")
}

/// Format a range query request
pub fn encode_query(key: &str, start: i64, end: i64, downsampling: u64) -> String {
    format!("{key},{start},{end},{downsampling}\n")
}

pub fn encode_subscribe(key: &str) -> String {
    format!("subscribe,{key}\n")
}

pub fn encode_unsubscribe(key: &str) -> String {
    format!("unsubscribe,{key}\n")
}

/// Split a response line into raw records. An empty line has no records.
pub fn split_records(line: &str) -> impl Iterator<Item = &str> {
    let trimmed = line.trim();
    trimmed
        .split(RECORD_SEPARATOR)
        .filter(move |_| !trimmed.is_empty())
}

/// Parse one `key,timestamp,value` record
pub fn decode_record(record: &str) -> Result<DataPoint, ParseError> {
    let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
    let [key, timestamp, value] = fields.as_slice() else {
        return Err(ParseError::FieldCount {
            found: fields.len(),
            line: record.to_string(),
        });
    };

    let timestamp = timestamp
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidTimestamp {
            field: timestamp.to_string(),
        })?;
    let value = value.parse::<f64>().map_err(|_| ParseError::InvalidValue {
        field: value.to_string(),
    })?;

    Ok(DataPoint::new(*key, timestamp, value))
}

/// Parse a query response line, keeping count of malformed records
pub fn parse_query_response(line: &str) -> QueryResponse {
    let mut response = QueryResponse::default();
    for record in split_records(line) {
        match decode_record(record) {
            Ok(point) => response.points.push(point),
            Err(_) => response.skipped += 1,
        }
    }
    response
}

/// Decode a query response line. Malformed records are skipped.
pub fn decode_query_response(line: &str) -> Vec<DataPoint> {
    parse_query_response(line).points
}

/// Decode a push notification line. Malformed lines are an error.
pub fn decode_push_line(line: &str) -> Result<DataPoint, ParseError> {
    decode_record(line.trim_end_matches(['\r', '\n']))
}
