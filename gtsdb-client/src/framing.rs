//! Inbound line classification
//!
//! Query responses and push notifications share one stream, with no tag or
//! correlation id. A [`FramingStrategy`] decides which is which. The default
//! [`LegacyFraming`] attributes every line that arrives while a query is in
//! flight to that query, and treats everything else as a push. A push that
//! races a query is therefore consumed as the query's response; callers must
//! keep queries and push activity apart.

/// Classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Response to the in-flight query
    Response(String),
    /// Unsolicited push notification
    Push(String),
}

/// Decides how an inbound line is routed
pub trait FramingStrategy: Send + 'static {
    /// Classify `line` given whether a query is currently awaiting a response.
    fn classify(&mut self, line: String, query_in_flight: bool) -> Frame;
}

/// In-flight heuristic of the GTSDB line protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyFraming;

impl FramingStrategy for LegacyFraming {
    fn classify(&mut self, line: String, query_in_flight: bool) -> Frame {
        if query_in_flight {
            Frame::Response(line)
        } else {
            Frame::Push(line)
        }
    }
}

impl<F> FramingStrategy for F
where
    F: FnMut(String, bool) -> Frame + Send + 'static,
{
    fn classify(&mut self, line: String, query_in_flight: bool) -> Frame {
        self(line, query_in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_framing() {
        let mut framing = LegacyFraming;
        assert_eq!(
            framing.classify("a,1,2".to_string(), true),
            Frame::Response("a,1,2".to_string())
        );
        assert_eq!(
            framing.classify("a,1,2".to_string(), false),
            Frame::Push("a,1,2".to_string())
        );
    }

    #[test]
    fn test_closure_framing() {
        // Responses carry at least one '|' or are empty in this test protocol
        let mut framing = |line: String, _in_flight: bool| {
            if line.contains('|') || line.is_empty() {
                Frame::Response(line)
            } else {
                Frame::Push(line)
            }
        };

        assert_eq!(
            FramingStrategy::classify(&mut framing, "a,1,2".to_string(), true),
            Frame::Push("a,1,2".to_string())
        );
        assert_eq!(
            FramingStrategy::classify(&mut framing, "a,1,2|a,2,3".to_string(), false),
            Frame::Response("a,1,2|a,2,3".to_string())
        );
    }
}
