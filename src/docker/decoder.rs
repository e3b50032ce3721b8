use serde_json::Value;
use tracing::warn;

use super::DockerEvent;

/// Incremental decoder for a stream of concatenated JSON records.
///
/// HTTP chunks do not line up with records, so bytes are buffered until a
/// whole value is available. A syntax error ends the stream; a well-formed
/// value that is not a Docker event is skipped.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buf: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<DockerEvent>, serde_json::Error> {
        self.buf.extend_from_slice(chunk);

        let mut values = Vec::new();
        let mut consumed = 0;
        {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        consumed = stream.byte_offset();
                        values.push(value);
                    }
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => return Err(e),
                    None => {
                        consumed = stream.byte_offset();
                        break;
                    }
                }
            }
        }
        self.buf.drain(..consumed);

        Ok(values.into_iter().filter_map(to_event).collect())
    }

    /// Finish the stream, failing if a partial record was left behind.
    pub fn finish(self) -> Result<(), serde_json::Error> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        serde_json::from_slice::<Value>(&self.buf).map(|_| ())
    }
}

fn to_event(value: Value) -> Option<DockerEvent> {
    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Skipping malformed docker event");
            None
        }
    }
}
