use async_trait::async_trait;
use std::sync::Arc;
use std::time::SystemTime;

use crate::Result;

/// One image from the frame source
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic per-source frame number
    pub id: u64,
    pub timestamp: SystemTime,
    /// Raw bytes, shared so the display handoff never copies
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(id: u64, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            data: Arc::new(data),
            width,
            height,
        }
    }
}

/// Where a symbol sat in the frame. Only the UI cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One barcode the decoder found in a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSymbol {
    pub text: String,
    pub bounds: Option<BoundingBox>,
}

impl DecodedSymbol {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bounds: None,
        }
    }
}

/// A camera, or anything that behaves like one.
///
/// A capture session takes ownership of its source and calls `release`
/// exactly once when it ends.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source has nothing more to give
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn release(&mut self);

    fn name(&self) -> &str {
        "camera"
    }
}

/// Barcode symbology decoding. Runs on the frame loop, so it must not do I/O.
pub trait SymbolDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Vec<DecodedSymbol>;
}
