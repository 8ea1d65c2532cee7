// Frame source driven by a text script, for demos and tests without a camera
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::frame::{DecodedSymbol, Frame, FrameSource, SymbolDecoder};
use crate::{Error, Result};

/// Plays back one frame per script line.
///
/// Each line is the payload a decoder will find in that frame: comma-separated
/// barcodes, or blank for a frame with nothing in view.
pub struct ScriptedFrameSource {
    lines: Vec<String>,
    position: usize,
    interval: Duration,
    /// Keep presenting the last line instead of running dry
    hold_last: bool,
    released: bool,
    release_count: Arc<AtomicU32>,
}

impl ScriptedFrameSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            position: 0,
            interval: Duration::ZERO,
            hold_last: false,
            released: false,
            release_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The same barcode repeated for `frames` frames
    pub fn repeating(barcode: &str, frames: usize) -> Self {
        Self::new(std::iter::repeat(barcode).take(frames))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::new(contents.lines()))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn hold_last(mut self, hold: bool) -> Self {
        self.hold_last = hold;
        self
    }

    /// Shared counter of `release` calls, readable after the source has been
    /// handed to a session
    pub fn release_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.release_count)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[async_trait]
impl FrameSource for ScriptedFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Err(Error::Capture("frame source already released".into()));
        }

        let line = match self.lines.get(self.position) {
            Some(line) => line,
            None if self.hold_last && !self.lines.is_empty() => &self.lines[self.lines.len() - 1],
            None => return Ok(None),
        };
        let payload = line.as_bytes().to_vec();

        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        } else {
            // Let other tasks in, the way a real camera's pacing would
            tokio::task::yield_now().await;
        }

        let id = self.position as u64;
        self.position += 1;
        Ok(Some(Frame::new(id, payload, 0, 0)))
    }

    fn release(&mut self) {
        self.released = true;
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "script"
    }
}

/// Reads scripted frames back as symbols
#[derive(Debug, Default, Clone, Copy)]
pub struct TextPayloadDecoder;

impl SymbolDecoder for TextPayloadDecoder {
    fn decode(&self, frame: &Frame) -> Vec<DecodedSymbol> {
        String::from_utf8_lossy(&frame.data)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(DecodedSymbol::new)
            .collect()
    }
}
