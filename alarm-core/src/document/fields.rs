//! Declarative descriptors for the mutable regions of the status page.

use core::fmt;
use core::ops::Range;

/// Width of the elapsed-milliseconds fields.
pub const ELAPSED_WIDTH: usize = 12;

/// Width of the door label field.
pub const LABEL_WIDTH: usize = 8;

/// Largest span, first field start to last field end, a response can hold
/// a private copy of.
pub const LIVE_SPAN_CAPACITY: usize = 64;

/// Mutable regions of the status page.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldId {
    MotionElapsed,
    DoorLabel,
    DoorElapsed,
}

impl FieldId {
    /// Number of fields in a [`FieldTable`].
    pub const COUNT: usize = 3;

    /// Position of the field inside a [`FieldTable`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            FieldId::MotionElapsed => 0,
            FieldId::DoorLabel => 1,
            FieldId::DoorElapsed => 2,
        }
    }
}

/// Compile-time description of a field: the field starts right after
/// `anchor` and spans `width` bytes. Values are right-justified and padded
/// with `fill`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldSpec {
    pub id: FieldId,
    pub anchor: &'static [u8],
    pub width: usize,
    pub fill: u8,
}

impl FieldSpec {
    pub const fn new(id: FieldId, anchor: &'static [u8], width: usize) -> Self {
        Self {
            id,
            anchor,
            width,
            fill: b' ',
        }
    }
}

/// Fields of the shipped status page, in [`FieldId::as_index`] order. The
/// anchors are the script variable names the page parses the values from.
pub const STATUS_FIELDS: [FieldSpec; FieldId::COUNT] = [
    FieldSpec::new(FieldId::MotionElapsed, b"lastMotionMs:", ELAPSED_WIDTH),
    FieldSpec::new(FieldId::DoorLabel, b"doorState:", LABEL_WIDTH),
    FieldSpec::new(FieldId::DoorElapsed, b"lastDoorChangeMs:", ELAPSED_WIDTH),
];

/// A field placed at a concrete byte offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TemplateField {
    pub id: FieldId,
    pub offset: usize,
    pub width: usize,
    pub fill: u8,
}

impl TemplateField {
    /// Byte range occupied inside the document.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }

    fn overlaps(&self, other: &TemplateField) -> bool {
        self.offset < other.offset + other.width && other.offset < self.offset + self.width
    }
}

/// Reasons a document cannot host its field table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TemplateError {
    /// The field's anchor text does not occur in the document.
    AnchorMissing(FieldId),
    /// The anchor occurs more than once, so the offset is ambiguous.
    AnchorAmbiguous(FieldId),
    /// The field has zero width.
    EmptyField(FieldId),
    /// The field extends past the end of the document.
    OutOfBounds(FieldId),
    /// Two fields share bytes.
    Overlap(FieldId, FieldId),
    /// Field specs are not listed in [`FieldId::as_index`] order.
    Misordered(FieldId),
    /// The door label field cannot hold the fixed-size label variants.
    LabelWidthMismatch { width: usize },
    /// The fields are spread wider than [`LIVE_SPAN_CAPACITY`].
    SpanTooWide { width: usize },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::AnchorMissing(id) => write!(f, "anchor for {id:?} not found"),
            TemplateError::AnchorAmbiguous(id) => write!(f, "anchor for {id:?} occurs twice"),
            TemplateError::EmptyField(id) => write!(f, "field {id:?} has zero width"),
            TemplateError::OutOfBounds(id) => write!(f, "field {id:?} runs past the document"),
            TemplateError::Overlap(a, b) => write!(f, "fields {a:?} and {b:?} overlap"),
            TemplateError::Misordered(id) => write!(f, "field {id:?} declared out of order"),
            TemplateError::LabelWidthMismatch { width } => {
                write!(f, "door label field is {width} bytes, labels are {LABEL_WIDTH}")
            }
            TemplateError::SpanTooWide { width } => {
                write!(f, "fields span {width} bytes, at most {LIVE_SPAN_CAPACITY} fit")
            }
        }
    }
}

/// Located fields, validated against a concrete document.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldTable {
    fields: [TemplateField; FieldId::COUNT],
}

impl FieldTable {
    /// Places every spec in `document` and checks bounds and overlap.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] describing the first descriptor that
    /// cannot be placed.
    pub fn locate(
        document: &[u8],
        specs: &[FieldSpec; FieldId::COUNT],
    ) -> Result<Self, TemplateError> {
        let fields = [
            place(document, &specs[0], 0)?,
            place(document, &specs[1], 1)?,
            place(document, &specs[2], 2)?,
        ];

        for (index, field) in fields.iter().enumerate() {
            if let Some(other) = fields[index + 1..].iter().find(|other| field.overlaps(other)) {
                return Err(TemplateError::Overlap(field.id, other.id));
            }
        }

        let label = fields[FieldId::DoorLabel.as_index()];
        if label.width != LABEL_WIDTH {
            return Err(TemplateError::LabelWidthMismatch { width: label.width });
        }

        let table = Self { fields };
        let width = table.span().len();
        if width > LIVE_SPAN_CAPACITY {
            return Err(TemplateError::SpanTooWide { width });
        }
        Ok(table)
    }

    /// Smallest byte range covering every field.
    #[must_use]
    pub fn span(&self) -> Range<usize> {
        let start = self.fields.iter().map(|field| field.offset).min().unwrap_or(0);
        let end = self
            .fields
            .iter()
            .map(|field| field.offset + field.width)
            .max()
            .unwrap_or(0);
        start..end
    }

    /// Returns the placed field for `id`.
    #[must_use]
    pub const fn get(&self, id: FieldId) -> &TemplateField {
        &self.fields[id.as_index()]
    }

    /// Iterates over the placed fields in index order.
    pub fn iter(&self) -> core::slice::Iter<'_, TemplateField> {
        self.fields.iter()
    }

    /// Returns `true` when `offset` belongs to any field.
    #[must_use]
    pub fn covers(&self, offset: usize) -> bool {
        self.fields.iter().any(|field| field.range().contains(&offset))
    }
}

fn place(document: &[u8], spec: &FieldSpec, index: usize) -> Result<TemplateField, TemplateError> {
    if spec.id.as_index() != index {
        return Err(TemplateError::Misordered(spec.id));
    }
    if spec.width == 0 {
        return Err(TemplateError::EmptyField(spec.id));
    }

    let position = find(document, spec.anchor).ok_or(TemplateError::AnchorMissing(spec.id))?;
    let after = position + spec.anchor.len();
    if find(&document[after..], spec.anchor).is_some() {
        return Err(TemplateError::AnchorAmbiguous(spec.id));
    }
    if after + spec.width > document.len() {
        return Err(TemplateError::OutOfBounds(spec.id));
    }

    Ok(TemplateField {
        id: spec.id,
        offset: after,
        width: spec.width,
        fill: spec.fill,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = b"<p>a:            |b:  \"OPEN\"|c:            </p>";

    fn specs() -> [FieldSpec; FieldId::COUNT] {
        [
            FieldSpec::new(FieldId::MotionElapsed, b"a:", ELAPSED_WIDTH),
            FieldSpec::new(FieldId::DoorLabel, b"b:", LABEL_WIDTH),
            FieldSpec::new(FieldId::DoorElapsed, b"c:", ELAPSED_WIDTH),
        ]
    }

    #[test]
    fn locates_fields_after_their_anchors() {
        let table = FieldTable::locate(DOC, &specs()).expect("fields should place");
        assert_eq!(table.get(FieldId::MotionElapsed).offset, 5);
        assert_eq!(table.get(FieldId::DoorLabel).range(), 20..28);
        assert_eq!(&DOC[table.get(FieldId::DoorLabel).range()], b"  \"OPEN\"");
        assert!(table.covers(5));
        assert!(!table.covers(17));
        assert_eq!(table.span(), 5..43);
    }

    #[test]
    fn rejects_fields_spread_past_the_live_span() {
        let mut doc = b"a:            |b:  \"OPEN\"|".to_vec();
        doc.extend_from_slice(&[b'-'; LIVE_SPAN_CAPACITY]);
        doc.extend_from_slice(b"c:            ");
        assert!(matches!(
            FieldTable::locate(&doc, &specs()),
            Err(TemplateError::SpanTooWide { width }) if width > LIVE_SPAN_CAPACITY
        ));
    }

    #[test]
    fn rejects_missing_anchor() {
        let mut specs = specs();
        specs[2].anchor = b"zz:";
        assert_eq!(
            FieldTable::locate(DOC, &specs),
            Err(TemplateError::AnchorMissing(FieldId::DoorElapsed))
        );
    }

    #[test]
    fn rejects_field_past_the_end() {
        let mut specs = specs();
        specs[2].width = 40;
        assert_eq!(
            FieldTable::locate(DOC, &specs),
            Err(TemplateError::OutOfBounds(FieldId::DoorElapsed))
        );
    }

    #[test]
    fn rejects_overlapping_fields() {
        let mut specs = specs();
        specs[0].width = 18;
        assert_eq!(
            FieldTable::locate(DOC, &specs),
            Err(TemplateError::Overlap(FieldId::MotionElapsed, FieldId::DoorLabel))
        );
    }

    #[test]
    fn rejects_label_field_that_cannot_hold_labels() {
        let mut specs = specs();
        specs[1].width = 6;
        assert_eq!(
            FieldTable::locate(DOC, &specs),
            Err(TemplateError::LabelWidthMismatch { width: 6 })
        );
    }

    #[test]
    fn rejects_ambiguous_and_misordered_specs() {
        let doc = b"a:            a:            b:  \"OPEN\"c:            ";
        assert_eq!(
            FieldTable::locate(doc, &specs()),
            Err(TemplateError::AnchorAmbiguous(FieldId::MotionElapsed))
        );

        let mut swapped = specs();
        swapped.swap(0, 2);
        assert_eq!(
            FieldTable::locate(DOC, &swapped),
            Err(TemplateError::Misordered(FieldId::DoorElapsed))
        );
    }
}
