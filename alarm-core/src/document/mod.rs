//! In-place rendering of the status page.
//!
//! The page is a complete HTML document held in a fixed buffer. Three
//! fixed-width regions, described by [`fields::STATUS_FIELDS`], are rewritten
//! on every tick; every other byte stays exactly as shipped so the embedded
//! script keeps parsing the values at the same positions.

use core::fmt::Write as _;
use core::ops::Range;
use core::time::Duration;

use heapless::String;

use crate::tracker::{DoorState, SensorEvent, TrackerSnapshot};

pub mod fields;

pub use fields::{
    ELAPSED_WIDTH, FieldId, FieldSpec, FieldTable, LABEL_WIDTH, LIVE_SPAN_CAPACITY, STATUS_FIELDS,
    TemplateError, TemplateField,
};

/// The shipped status page, placeholders included.
pub const STATUS_PAGE: &[u8] = include_bytes!("status_page.html");

/// Length of [`STATUS_PAGE`] in bytes.
pub const STATUS_PAGE_LEN: usize = STATUS_PAGE.len();

/// Door label written while the contact is open.
pub const OPEN_LABEL: &[u8; LABEL_WIDTH] = b"  \"OPEN\"";

/// Door label written while the contact is closed.
pub const CLOSED_LABEL: &[u8; LABEL_WIDTH] = b"\"CLOSED\"";

/// Decimal digits of `u64::MAX`.
const MAX_DECIMAL_DIGITS: usize = 20;

/// Status page buffer plus its validated field table.
#[derive(Clone)]
pub struct DocumentTemplate<const N: usize = STATUS_PAGE_LEN> {
    bytes: [u8; N],
    fields: FieldTable,
}

impl DocumentTemplate<STATUS_PAGE_LEN> {
    /// Loads the shipped status page.
    ///
    /// # Errors
    ///
    /// Fails only if the embedded page no longer matches [`STATUS_FIELDS`].
    pub fn status_page() -> Result<Self, TemplateError> {
        let mut bytes = [0; STATUS_PAGE_LEN];
        bytes.copy_from_slice(STATUS_PAGE);
        Self::new(bytes, &STATUS_FIELDS)
    }
}

impl<const N: usize> DocumentTemplate<N> {
    /// Wraps `bytes`, placing and validating `specs` once.
    ///
    /// # Errors
    ///
    /// Returns the [`TemplateError`] reported by [`FieldTable::locate`].
    pub fn new(bytes: [u8; N], specs: &[FieldSpec; FieldId::COUNT]) -> Result<Self, TemplateError> {
        let fields = FieldTable::locate(&bytes, specs)?;
        Ok(Self { bytes, fields })
    }

    /// Rewrites the three fields from the given sensor state.
    pub fn render(&mut self, now: Duration, door: DoorState, motion: SensorEvent) {
        self.write_elapsed(FieldId::MotionElapsed, motion.elapsed(now));
        self.write_label(door.is_open);
        self.write_elapsed(FieldId::DoorElapsed, door.change.elapsed(now));
    }

    /// Convenience wrapper over [`render`](Self::render).
    pub fn render_snapshot(&mut self, now: Duration, snapshot: &TrackerSnapshot) {
        self.render(now, snapshot.door, snapshot.motion);
    }

    /// The complete document as served.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// View handed to the connection slots for the current tick.
    #[must_use]
    pub fn page(&self) -> Page<'_> {
        Page {
            bytes: &self.bytes,
            live: self.fields.span(),
        }
    }

    /// Current contents of a single field.
    #[must_use]
    pub fn field(&self, id: FieldId) -> &[u8] {
        &self.bytes[self.fields.get(id).range()]
    }

    #[must_use]
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    fn write_elapsed(&mut self, id: FieldId, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let field = *self.fields.get(id);
        write_decimal(&mut self.bytes[field.range()], millis, field.fill);
    }

    fn write_label(&mut self, is_open: bool) {
        let label = if is_open { OPEN_LABEL } else { CLOSED_LABEL };
        let range = self.fields.get(FieldId::DoorLabel).range();
        // FieldTable::locate guarantees the label field is LABEL_WIDTH wide.
        self.bytes[range].copy_from_slice(label);
    }
}

/// Document bytes plus the span the renderer rewrites between ticks.
///
/// A response that outlives a tick must serve the live span from a copy
/// taken when the response started, so the fields it carries come from one
/// render.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Page<'a> {
    bytes: &'a [u8],
    live: Range<usize>,
}

impl<'a> Page<'a> {
    /// A page with no live span.
    #[must_use]
    pub const fn fixed(bytes: &'a [u8]) -> Self {
        Self { bytes, live: 0..0 }
    }

    /// A page whose `live` range changes between ticks. `None` if the range
    /// runs past `bytes` or exceeds [`LIVE_SPAN_CAPACITY`].
    #[must_use]
    pub fn with_live(bytes: &'a [u8], live: Range<usize>) -> Option<Self> {
        (live.start <= live.end && live.end <= bytes.len() && live.len() <= LIVE_SPAN_CAPACITY)
            .then_some(Self { bytes, live })
    }

    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[must_use]
    pub fn live(&self) -> Range<usize> {
        self.live.clone()
    }

    /// Current contents of the live span.
    #[must_use]
    pub fn live_bytes(&self) -> &'a [u8] {
        &self.bytes[self.live.clone()]
    }
}

/// Largest value that fits in `width` decimal digits.
#[must_use]
pub fn max_decimal(width: usize) -> u64 {
    u32::try_from(width)
        .ok()
        .and_then(|digits| 10_u64.checked_pow(digits))
        .map_or(u64::MAX, |limit| limit - 1)
}

/// Right-justifies `value` in `slot`, clamping to the largest value the slot
/// can display.
fn write_decimal(slot: &mut [u8], value: u64, fill: u8) {
    let clamped = value.min(max_decimal(slot.len()));
    let mut text: String<MAX_DECIMAL_DIGITS> = String::new();
    // u64 never exceeds MAX_DECIMAL_DIGITS digits.
    let _ = write!(text, "{clamped}");

    let pad = slot.len() - text.len();
    slot[..pad].fill(fill);
    slot[pad..].copy_from_slice(text.as_bytes());
}
