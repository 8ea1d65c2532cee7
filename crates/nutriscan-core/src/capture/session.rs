use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::{barcode, config::CaptureConfig, Error, Result};

/// How a detection turns into a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Detection arms the session; an explicit capture trigger resolves
    Manual,
    /// First detection resolves and ends the session
    Auto,
    /// Keeps scanning after each resolution. Each barcode stays quiet until it
    /// has been out of view for the cooldown.
    Continuous,
}

impl FromStr for CaptureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(CaptureMode::Manual),
            "auto" => Ok(CaptureMode::Auto),
            "continuous" => Ok(CaptureMode::Continuous),
            other => Err(Error::InvalidInput(format!("unknown capture mode: {}", other))),
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureMode::Manual => write!(f, "manual"),
            CaptureMode::Auto => write!(f, "auto"),
            CaptureMode::Continuous => write!(f, "continuous"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureState {
    /// No frame source held yet
    Idle,
    Scanning,
    /// Manual mode only: a barcode is in view and waiting for the trigger
    Detected,
    /// A resolution was dispatched. Terminal.
    Captured,
    /// Explicitly stopped, or the source ran dry. Terminal.
    Stopped,
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Captured | CaptureState::Stopped)
    }
}

/// Tuning knobs. None of them change which transitions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTuning {
    pub cooldown: Duration,
    /// Empty frames between hints. 0 disables hints.
    pub no_barcode_hint_frames: u32,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for SessionTuning {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            no_barcode_hint_frames: config.no_barcode_hint_frames,
        }
    }
}

/// What the frame loop should do after feeding a frame in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing decodable in view
    Empty { streak: u32, show_hint: bool },
    /// Manual mode armed on this barcode
    Armed(String),
    /// Dispatch exactly one resolution for this barcode
    Resolve(String),
    /// Seen, but debounce or cooldown says ignore it
    Suppressed,
    /// The session isn't scanning
    Ignored,
}

/// The capture state machine for one session. Pure: the caller supplies the
/// clock and the decoded symbols, so every transition is testable without a
/// camera or a runtime.
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    mode: CaptureMode,
    state: CaptureState,
    tuning: SessionTuning,
    last_detected_barcode: Option<String>,
    last_frame_at: Option<Instant>,
    no_detection_streak: u32,
    /// Continuous mode: when each recently seen barcode was last in view
    last_seen: HashMap<String, Instant>,
    resolutions: u32,
}

impl CaptureSession {
    pub fn new(mode: CaptureMode, tuning: SessionTuning) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            state: CaptureState::Idle,
            tuning,
            last_detected_barcode: None,
            last_frame_at: None,
            no_detection_streak: 0,
            last_seen: HashMap::new(),
            resolutions: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn last_detected_barcode(&self) -> Option<&str> {
        self.last_detected_barcode.as_deref()
    }

    pub fn last_frame_at(&self) -> Option<Instant> {
        self.last_frame_at
    }

    pub fn no_detection_streak(&self) -> u32 {
        self.no_detection_streak
    }

    /// How many resolutions this session has asked for
    pub fn resolutions(&self) -> u32 {
        self.resolutions
    }

    /// Frame source acquired
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Idle => {
                self.state = CaptureState::Scanning;
                Ok(())
            }
            other => Err(Error::Capture(format!(
                "session {} cannot start from {:?}",
                self.id, other
            ))),
        }
    }

    /// Feed in the symbols decoded from one frame
    pub fn on_frame<S: AsRef<str>>(&mut self, now: Instant, symbols: &[S]) -> FrameOutcome {
        match self.state {
            CaptureState::Scanning => {}
            CaptureState::Detected => {
                self.last_frame_at = Some(now);
                return FrameOutcome::Suppressed;
            }
            _ => return FrameOutcome::Ignored,
        }
        self.last_frame_at = Some(now);

        // At most one symbol per frame is considered
        let Some(detected) = symbols
            .iter()
            .map(|s| barcode::normalize(s.as_ref().trim()))
            .find(|code| !code.is_empty())
        else {
            self.no_detection_streak = self.no_detection_streak.saturating_add(1);
            let hint_every = self.tuning.no_barcode_hint_frames;
            return FrameOutcome::Empty {
                streak: self.no_detection_streak,
                show_hint: hint_every > 0 && self.no_detection_streak % hint_every == 0,
            };
        };

        self.no_detection_streak = 0;
        self.last_detected_barcode = Some(detected.clone());

        match self.mode {
            CaptureMode::Manual => {
                self.state = CaptureState::Detected;
                FrameOutcome::Armed(detected)
            }
            CaptureMode::Auto => {
                self.state = CaptureState::Captured;
                self.resolutions += 1;
                FrameOutcome::Resolve(detected)
            }
            CaptureMode::Continuous => {
                let cooldown = self.tuning.cooldown;
                self.last_seen
                    .retain(|_, seen| now.saturating_duration_since(*seen) < cooldown);

                // Every sighting pushes the window out, so a barcode left in
                // view never re-triggers
                let cooling = self.last_seen.insert(detected.clone(), now).is_some();
                if cooling {
                    FrameOutcome::Suppressed
                } else {
                    self.resolutions += 1;
                    FrameOutcome::Resolve(detected)
                }
            }
        }
    }

    /// External trigger for manual mode. Returns the barcode to resolve, or
    /// `None` if nothing is armed.
    pub fn capture(&mut self) -> Option<String> {
        if self.mode != CaptureMode::Manual || self.state != CaptureState::Detected {
            return None;
        }
        self.state = CaptureState::Captured;
        self.resolutions += 1;
        self.last_detected_barcode.clone()
    }

    /// Stop from any state. Returns false if already terminal.
    pub fn stop(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = CaptureState::Stopped;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[&str] = &[];

    fn tuning(cooldown_ms: u64, hint_frames: u32) -> SessionTuning {
        SessionTuning {
            cooldown: Duration::from_millis(cooldown_ms),
            no_barcode_hint_frames: hint_frames,
        }
    }

    fn started(mode: CaptureMode) -> CaptureSession {
        let mut session = CaptureSession::new(mode, tuning(2000, 30));
        session.start().unwrap();
        session
    }

    #[test]
    fn test_starts_idle_and_only_starts_once() {
        let mut session = CaptureSession::new(CaptureMode::Auto, SessionTuning::default());
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(session.on_frame(Instant::now(), &["123"]), FrameOutcome::Ignored);

        session.start().unwrap();
        assert_eq!(session.state(), CaptureState::Scanning);
        assert!(session.start().is_err());
    }

    #[test]
    fn test_auto_resolves_once_for_many_frames() {
        let mut session = started(CaptureMode::Auto);
        let now = Instant::now();

        let resolves = (0..50)
            .map(|i| session.on_frame(now + Duration::from_millis(i * 33), &["1234567890"]))
            .filter(|outcome| matches!(outcome, FrameOutcome::Resolve(_)))
            .count();

        assert_eq!(resolves, 1);
        assert_eq!(session.resolutions(), 1);
        assert_eq!(session.state(), CaptureState::Captured);
    }

    #[test]
    fn test_detection_is_normalized() {
        let mut session = started(CaptureMode::Auto);
        assert_eq!(
            session.on_frame(Instant::now(), &["0012345678905"]),
            FrameOutcome::Resolve("012345678905".into())
        );
        assert_eq!(session.last_detected_barcode(), Some("012345678905"));
    }

    #[test]
    fn test_blank_symbols_count_as_empty() {
        let mut session = started(CaptureMode::Auto);
        assert!(matches!(
            session.on_frame(Instant::now(), &["  ", ""]),
            FrameOutcome::Empty { streak: 1, .. }
        ));
        assert_eq!(session.state(), CaptureState::Scanning);
    }

    #[test]
    fn test_hint_every_n_empty_frames() {
        let mut session = CaptureSession::new(CaptureMode::Auto, tuning(2000, 3));
        session.start().unwrap();
        let now = Instant::now();

        let hints: Vec<bool> = (0..7)
            .map(|_| match session.on_frame(now, NONE) {
                FrameOutcome::Empty { show_hint, .. } => show_hint,
                other => panic!("unexpected {:?}", other),
            })
            .collect();

        assert_eq!(hints, vec![false, false, true, false, false, true, false]);
        assert_eq!(session.no_detection_streak(), 7);

        session.on_frame(now, &["1"]);
        assert_eq!(session.no_detection_streak(), 0);
    }

    #[test]
    fn test_zero_hint_frames_disables_hints() {
        let mut session = CaptureSession::new(CaptureMode::Auto, tuning(2000, 0));
        session.start().unwrap();
        for _ in 0..100 {
            assert!(matches!(
                session.on_frame(Instant::now(), NONE),
                FrameOutcome::Empty { show_hint: false, .. }
            ));
        }
    }

    #[test]
    fn test_manual_needs_trigger() {
        let mut session = started(CaptureMode::Manual);
        let now = Instant::now();

        assert_eq!(session.capture(), None);
        assert_eq!(session.on_frame(now, &["42"]), FrameOutcome::Armed("42".into()));
        assert_eq!(session.state(), CaptureState::Detected);

        // Held in view: stays armed on the first barcode
        assert_eq!(session.on_frame(now, &["43"]), FrameOutcome::Suppressed);
        assert_eq!(session.resolutions(), 0);

        assert_eq!(session.capture(), Some("42".into()));
        assert_eq!(session.state(), CaptureState::Captured);
        assert_eq!(session.capture(), None);
        assert_eq!(session.resolutions(), 1);
    }

    #[test]
    fn test_continuous_cooldown_per_barcode() {
        let mut session = started(CaptureMode::Continuous);
        let t0 = Instant::now();
        let at = |ms: u64| t0 + Duration::from_millis(ms);

        assert_eq!(session.on_frame(at(0), &["A"]), FrameOutcome::Resolve("A".into()));
        assert_eq!(session.on_frame(at(500), &["A"]), FrameOutcome::Suppressed);
        // A different barcode is not held back by A's cooldown
        assert_eq!(session.on_frame(at(600), &["B"]), FrameOutcome::Resolve("B".into()));
        // B firing in between does not lift A's cooldown
        assert_eq!(session.on_frame(at(700), &["A"]), FrameOutcome::Suppressed);

        // A was last seen at 700
        assert_eq!(session.on_frame(at(2800), &["A"]), FrameOutcome::Resolve("A".into()));

        assert_eq!(session.state(), CaptureState::Scanning);
        assert_eq!(session.resolutions(), 3);
    }

    #[test]
    fn test_continuous_two_products_in_view_resolve_once_each() {
        let mut session = started(CaptureMode::Continuous);
        let t0 = Instant::now();

        // Decoder order flips between frames
        let resolved: Vec<String> = (0..30u64)
            .filter_map(|i| {
                let symbols = if i % 2 == 0 { ["A", "B"] } else { ["B", "A"] };
                match session.on_frame(t0 + Duration::from_millis(i * 33), &symbols) {
                    FrameOutcome::Resolve(code) => Some(code),
                    _ => None,
                }
            })
            .collect();

        assert_eq!(resolved, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(session.resolutions(), 2);
    }

    #[test]
    fn test_continuous_barcode_left_in_view_never_retriggers() {
        let mut session = started(CaptureMode::Continuous);
        let t0 = Instant::now();

        assert!(matches!(session.on_frame(t0, &["A"]), FrameOutcome::Resolve(_)));
        for i in 1..=300u64 {
            let outcome = session.on_frame(t0 + Duration::from_millis(i * 33), &["A"]);
            assert_eq!(outcome, FrameOutcome::Suppressed);
        }

        // Out of view long enough, then shown again
        let later = t0 + Duration::from_millis(300 * 33 + 2500);
        assert!(matches!(session.on_frame(later, &["A"]), FrameOutcome::Resolve(_)));
        assert_eq!(session.resolutions(), 2);
    }

    #[test]
    fn test_stop_from_any_state() {
        let mut idle = CaptureSession::new(CaptureMode::Auto, SessionTuning::default());
        assert!(idle.stop());
        assert_eq!(idle.state(), CaptureState::Stopped);
        assert!(!idle.stop());

        let mut armed = started(CaptureMode::Manual);
        armed.on_frame(Instant::now(), &["1"]);
        assert!(armed.stop());
        assert_eq!(armed.capture(), None);
        assert_eq!(armed.on_frame(Instant::now(), &["1"]), FrameOutcome::Ignored);

        let mut captured = started(CaptureMode::Auto);
        captured.on_frame(Instant::now(), &["1"]);
        assert!(!captured.stop());
        assert_eq!(captured.state(), CaptureState::Captured);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Auto".parse::<CaptureMode>().unwrap(), CaptureMode::Auto);
        assert_eq!(" manual ".parse::<CaptureMode>().unwrap(), CaptureMode::Manual);
        assert_eq!(
            "continuous".parse::<CaptureMode>().unwrap(),
            CaptureMode::Continuous
        );
        assert!("burst".parse::<CaptureMode>().is_err());
    }
}
