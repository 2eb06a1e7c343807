//! Line ingestion: reader → memory buffer, with throttled redraw hints.

use std::sync::Arc;
use std::time::{Duration, Instant};

use core_buffer::MemoryBuffer;
use core_hub::{DrawOptions, Hub};
use core_model::{IdGen, Line};
use core_pipeline::Scope;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Minimum interval between line-arrived draw hints.
const HINT_INTERVAL: Duration = Duration::from_millis(50);
/// Hint at least once per this many ingested lines, throttle permitting.
const HINT_EVERY_LINES: usize = 200;

#[derive(Clone)]
pub struct ReaderConfig {
    pub idgen: Arc<IdGen>,
    pub enable_sep: bool,
    pub parse_ansi: bool,
    /// Scan-buffer ceiling in bytes; a longer line aborts ingestion.
    pub max_line_bytes: usize,
}

/// Spawn the ingestion task. It appends into `buffer`, hints the event
/// loop through `hub`, and closes the buffer's done latch on end-of-stream
/// or cancellation.
pub fn spawn_reader_task<R>(
    mut reader: R,
    buffer: Arc<MemoryBuffer>,
    hub: Hub,
    scope: Scope,
    config: ReaderConfig,
) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut raw = Vec::with_capacity(256);
        let mut ingested = 0usize;
        let mut since_hint = 0usize;
        let mut last_hint = Instant::now();
        loop {
            raw.clear();
            let read = tokio::select! {
                _ = scope.cancelled() => break,
                read = reader.read_until(b'\n', &mut raw) => read,
            };
            match read {
                Ok(0) => break,
                Ok(_) if raw.len() > config.max_line_bytes => {
                    warn!(
                        target: "input.reader",
                        size = raw.len(),
                        limit = config.max_line_bytes,
                        "line exceeds scan buffer; ingestion stopped"
                    );
                    break;
                }
                Ok(_) => {
                    trim_line_ending(&mut raw);
                    let text = String::from_utf8_lossy(&raw).into_owned();
                    buffer.append(Arc::new(Line::new(
                        config.idgen.next(),
                        text,
                        config.enable_sep,
                        config.parse_ansi,
                    )));
                    ingested += 1;
                    since_hint += 1;
                    if since_hint >= HINT_EVERY_LINES || last_hint.elapsed() >= HINT_INTERVAL {
                        hub.send_draw(DrawOptions::default()).await;
                        since_hint = 0;
                        last_hint = Instant::now();
                    }
                }
                Err(err) => {
                    warn!(target: "input.reader", %err, "read failed; ingestion stopped");
                    break;
                }
            }
        }
        debug!(target: "input.reader", lines = ingested, "end of stream");
        buffer.set_end_mark();
        hub.send_draw(DrawOptions::default()).await;
    })
}

fn trim_line_ending(raw: &mut Vec<u8>) {
    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_hub::channel;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn config() -> ReaderConfig {
        ReaderConfig {
            idgen: Arc::new(IdGen::fixed(0)),
            enable_sep: false,
            parse_ansi: false,
            max_line_bytes: 256 * 1024,
        }
    }

    async fn ingest(input: &str, config: ReaderConfig) -> Arc<MemoryBuffer> {
        let buffer = Arc::new(MemoryBuffer::new());
        let (hub, _rx) = channel(64);
        let scope = Scope::root();
        let reader = BufReader::new(Cursor::new(input.to_string().into_bytes()));
        spawn_reader_task(reader, buffer.clone(), hub, scope, config)
            .await
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn lines_arrive_in_order_with_increasing_ids() {
        let buffer = ingest("alpha\nbeta\ngamma\n", config()).await;
        assert_eq!(buffer.size(), 3);
        let texts: Vec<String> = (0..3)
            .map(|i| buffer.line_at(i).unwrap().display().to_string())
            .collect();
        assert_eq!(texts, vec!["alpha", "beta", "gamma"]);
        assert!(buffer.line_at(0).unwrap().id() < buffer.line_at(2).unwrap().id());
    }

    #[tokio::test]
    async fn crlf_and_missing_trailing_newline_are_handled() {
        let buffer = ingest("one\r\ntwo", config()).await;
        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.line_at(0).unwrap().display(), "one");
        assert_eq!(buffer.line_at(1).unwrap().display(), "two");
    }

    #[tokio::test]
    async fn nul_separator_mode_splits_lines() {
        let mut cfg = config();
        cfg.enable_sep = true;
        let buffer = ingest("show\0emit\n", cfg).await;
        let line = buffer.line_at(0).unwrap();
        assert_eq!(line.display(), "show");
        assert_eq!(line.output(), "emit");
    }

    #[tokio::test]
    async fn oversized_line_stops_ingestion() {
        let mut cfg = config();
        cfg.max_line_bytes = 8;
        let buffer = ingest("short\nwaaaaaaaay too long\nafter\n", cfg).await;
        assert_eq!(buffer.size(), 1);
    }

    #[tokio::test]
    async fn end_of_stream_closes_done_latch() {
        let buffer = ingest("x\n", config()).await;
        tokio::time::timeout(Duration::from_millis(10), buffer.done().wait())
            .await
            .expect("done latch must close at EOF");
    }
}
