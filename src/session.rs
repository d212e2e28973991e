//! The owned-state controller for one editing session.
//!
//! A [`Session`] owns everything that changes while a user edits: the
//! [`AdjustmentSet`], the loaded [`DecodedSource`], the text baseline, the
//! adjusted buffer, and the text-adding interaction state. All mutation goes
//! through its methods; nothing recomputes implicitly.
//!
//! ## Pipeline
//!
//! ```text
//! decoded source ──(committed text)──▶ baseline
//! baseline ──vibrance → exposure → temperature──▶ adjusted buffer
//! adjusted buffer ──filter chain──▶ export
//! ```
//!
//! Committed text is part of the baseline, so the per-pixel adjustments and
//! the filter chain recolor it along with the image: warming the image
//! warms white text too. Text is not kept as a separate layer and there is
//! no per-run undo; [`Session::revert_to_decoded`] drops every committed
//! run at once.
//!
//! Mutations mark the session dirty and notify subscribers; the host then
//! calls [`Session::recompute`]. Per-pixel adjustments always restart from
//! the baseline, so repeated edits never compound rounding error. When they
//! are all neutral no adjusted copy exists and a lazily decoded source is
//! not realized.
//!
//! ## Loads
//!
//! Decoding may run elsewhere (another thread, a task). [`Session::begin_load`]
//! hands out a [`LoadTicket`] and cancels the previous one;
//! [`Session::finish_load`] commits a result only if its ticket is still the
//! newest. Earlier loads are discarded whenever they settle. A failed load
//! leaves the previous image and adjustments untouched.

use crate::adjustments::{AdjustmentError, AdjustmentSet, ParamKey, ParamValue};
use crate::config::EditorConfig;
use crate::export::{ExportError, ExportableBuffer, flatten};
use crate::filters::{FilterChain, build_filter_chain};
use crate::imaging::{
    CancelToken, DecodeError, DecodeOptions, DecodedSource, FontBook, PixelAdjustments,
    PixelBuffer, SourceKind, TextRun, TextStyle, apply_pixel_adjustments, commit_text,
    decode_with,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no image loaded")]
    NoImage,
    #[error("not in text-adding mode")]
    NotAddingText,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Adjustment(#[from] AdjustmentError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SourceLoaded {
        kind: SourceKind,
        width: u32,
        height: u32,
    },
    LoadDiscarded {
        generation: u64,
    },
    AdjustmentChanged(ParamKey),
    TextModeChanged(bool),
    TextCommitted,
    Reverted,
    Recomputed,
}

type Subscriber = Box<dyn FnMut(&SessionEvent) + Send>;

/// Claim on the session's next source.
///
/// Only the most recently issued ticket can commit.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    cancel: CancelToken,
    options: DecodeOptions,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Decode under this ticket's options and cancellation token.
    pub fn decode(&self, bytes: Vec<u8>, mime: &str) -> Result<DecodedSource, DecodeError> {
        decode_with(bytes, mime, &self.options, &self.cancel)
    }
}

pub struct Session {
    adjustments: AdjustmentSet,
    text_style: TextStyle,
    font_family: String,
    fonts: FontBook,
    decode_options: DecodeOptions,

    source: Option<DecodedSource>,
    /// Source plus committed text; `None` until text is committed.
    text_baseline: Option<PixelBuffer>,
    /// Baseline after per-pixel adjustments; `None` when they are neutral.
    adjusted: Option<PixelBuffer>,
    chain: FilterChain,
    text_committed: bool,
    dirty: bool,

    pending_text: Option<TextRun>,

    generation: u64,
    in_flight: Option<CancelToken>,
    subscribers: Vec<Subscriber>,
}

impl Default for Session {
    fn default() -> Self {
        Self::from_parts(AdjustmentSet::stock(), &EditorConfig::default())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("source", &self.source.as_ref().map(DecodedSource::kind))
            .field("fonts", &self.fonts)
            .field("generation", &self.generation)
            .field("text_committed", &self.text_committed)
            .field("dirty", &self.dirty)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Session {
    /// A session using the config's startup adjustments, text style and
    /// decoder options.
    pub fn new(config: &EditorConfig) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(config.adjustment_set()?, config))
    }

    fn from_parts(adjustments: AdjustmentSet, config: &EditorConfig) -> Self {
        let chain = build_filter_chain(&adjustments);
        Self {
            adjustments,
            text_style: config.text_style(),
            font_family: config.text.font_family.clone(),
            fonts: FontBook::load(config.text.system_fonts, &config.text.font_dirs),
            decode_options: config.decode_options(),
            source: None,
            text_baseline: None,
            adjusted: None,
            chain,
            text_committed: false,
            dirty: false,
            pending_text: None,
            generation: 0,
            in_flight: None,
            subscribers: Vec::new(),
        }
    }

    /// Register a change listener.
    pub fn subscribe(&mut self, subscriber: impl FnMut(&SessionEvent) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    fn notify(&mut self, event: SessionEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }

    // =========================================================================
    // Adjustments
    // =========================================================================

    pub fn adjustments(&self) -> &AdjustmentSet {
        &self.adjustments
    }

    /// Current value by key name (`"brightness"`, `"shadowColor"`, ...).
    pub fn get(&self, key: &str) -> Result<ParamValue, AdjustmentError> {
        let key: ParamKey = key.parse()?;
        self.adjustments
            .get(key)
            .map(|p| p.value)
            .ok_or_else(|| AdjustmentError::UnknownParameter(key.to_string()))
    }

    /// Store a value by key name. Out-of-range values are refused.
    pub fn set(&mut self, key: &str, value: ParamValue) -> Result<bool, AdjustmentError> {
        let key: ParamKey = key.parse()?;
        let changed = self.adjustments.set(key, value)?;
        self.adjustment_changed(key, changed);
        Ok(changed)
    }

    /// Store a slider value, clamping it into range.
    pub fn set_clamped(&mut self, key: &str, value: f64) -> Result<bool, AdjustmentError> {
        let key: ParamKey = key.parse()?;
        let changed = self.adjustments.set_clamped(key, value)?;
        self.adjustment_changed(key, changed);
        Ok(changed)
    }

    pub fn set_color(&mut self, key: &str, value: &str) -> Result<bool, AdjustmentError> {
        let key: ParamKey = key.parse()?;
        let changed = self.adjustments.set_color(key, value)?;
        self.adjustment_changed(key, changed);
        Ok(changed)
    }

    pub fn reset(&mut self, key: &str) -> Result<bool, AdjustmentError> {
        let key: ParamKey = key.parse()?;
        let changed = self.adjustments.reset(key)?;
        self.adjustment_changed(key, changed);
        Ok(changed)
    }

    pub fn reset_all(&mut self) {
        self.adjustments.reset_all();
        self.dirty = true;
        for key in ParamKey::ALL {
            self.notify(SessionEvent::AdjustmentChanged(key));
        }
    }

    fn adjustment_changed(&mut self, key: ParamKey, changed: bool) {
        if changed {
            self.dirty = true;
            self.notify(SessionEvent::AdjustmentChanged(key));
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Start a new load, cancelling any load still in flight.
    pub fn begin_load(&mut self) -> LoadTicket {
        if let Some(previous) = self.in_flight.take() {
            previous.cancel();
        }
        self.generation += 1;
        let cancel = CancelToken::new();
        self.in_flight = Some(cancel.clone());
        LoadTicket {
            generation: self.generation,
            cancel,
            options: self.decode_options,
        }
    }

    /// Commit a decode result if `ticket` is still the newest.
    ///
    /// Returns `Ok(false)` when the result was stale and discarded. Errors
    /// leave the previous source in place.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<DecodedSource, DecodeError>,
    ) -> Result<bool, SessionError> {
        if ticket.generation != self.generation {
            log::warn!(
                "discarding load #{} (newest is #{})",
                ticket.generation,
                self.generation
            );
            self.notify(SessionEvent::LoadDiscarded {
                generation: ticket.generation,
            });
            return Ok(false);
        }
        self.in_flight = None;

        let source = result?;
        let (width, height) = source.dimensions();
        let kind = source.kind();
        log::info!("loaded {kind:?} {width}x{height}");

        self.source = Some(source);
        self.text_baseline = None;
        self.adjusted = None;
        self.text_committed = false;
        self.dirty = true;
        self.notify(SessionEvent::SourceLoaded {
            kind,
            width,
            height,
        });
        Ok(true)
    }

    /// Decode and commit synchronously.
    pub fn load(&mut self, bytes: Vec<u8>, mime: &str) -> Result<(), SessionError> {
        let ticket = self.begin_load();
        let result = ticket.decode(bytes, mime);
        self.finish_load(ticket, result)?;
        Ok(())
    }

    pub fn source(&self) -> Option<&DecodedSource> {
        self.source.as_ref()
    }

    /// True while a load ticket is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Enter text-adding mode with an empty run in the configured family.
    pub fn begin_text(&mut self) {
        self.pending_text = Some(TextRun::new("").with_family(self.font_family.clone()));
        self.notify(SessionEvent::TextModeChanged(true));
    }

    pub fn is_adding_text(&self) -> bool {
        self.pending_text.is_some()
    }

    /// The run being edited, while in text-adding mode.
    pub fn pending_text_mut(&mut self) -> Option<&mut TextRun> {
        self.pending_text.as_mut()
    }

    /// Leave text-adding mode without drawing anything.
    pub fn cancel_text(&mut self) {
        if self.pending_text.take().is_some() {
            self.notify(SessionEvent::TextModeChanged(false));
        }
    }

    /// Burn the pending run into the baseline and leave text-adding mode.
    ///
    /// Empty content only leaves the mode. Returns whether text was drawn.
    pub fn commit_text(&mut self) -> Result<bool, SessionError> {
        let run = self.pending_text.take().ok_or(SessionError::NotAddingText)?;
        self.notify(SessionEvent::TextModeChanged(false));
        if run.content.is_empty() {
            return Ok(false);
        }

        let baseline = self.baseline()?.clone();
        self.text_baseline = Some(commit_text(baseline, &run, &self.text_style, &self.fonts));
        self.text_committed = true;
        self.dirty = true;
        self.notify(SessionEvent::TextCommitted);
        Ok(true)
    }

    /// Drop committed text and start over from the decoded source.
    pub fn revert_to_decoded(&mut self) {
        self.text_baseline = None;
        self.text_committed = false;
        self.dirty = true;
        self.notify(SessionEvent::Reverted);
    }

    pub fn text_committed(&self) -> bool {
        self.text_committed
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    fn baseline(&self) -> Result<&PixelBuffer, SessionError> {
        match &self.text_baseline {
            Some(buffer) => Ok(buffer),
            None => Ok(self.source.as_ref().ok_or(SessionError::NoImage)?.pixels()?),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rebuild the filter chain and rerun per-pixel adjustments from the
    /// baseline.
    pub fn recompute(&mut self) -> Result<(), SessionError> {
        self.chain = build_filter_chain(&self.adjustments);
        let pixel = PixelAdjustments::from_set(&self.adjustments);
        self.adjusted = if pixel.is_neutral() || self.source.is_none() {
            None
        } else {
            Some(apply_pixel_adjustments(self.baseline()?.clone(), &pixel))
        };
        self.dirty = false;
        self.notify(SessionEvent::Recomputed);
        Ok(())
    }

    /// The chain from the last recompute.
    pub fn filter_chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Buffer the filter chain applies to, as of the last recompute.
    pub fn current_buffer(&self) -> Result<&PixelBuffer, SessionError> {
        match &self.adjusted {
            Some(buffer) => Ok(buffer),
            None => self.baseline(),
        }
    }

    /// Flatten the current state for download, recomputing first if needed.
    pub fn export(&mut self) -> Result<ExportableBuffer, SessionError> {
        if self.dirty {
            self.recompute()?;
        }
        let buffer = self.current_buffer()?.clone();
        Ok(flatten(buffer, &self.chain, self.text_committed))
    }
}
