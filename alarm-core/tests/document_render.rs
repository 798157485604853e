use core::time::Duration;

use alarm_core::document::{
    CLOSED_LABEL, DocumentTemplate, ELAPSED_WIDTH, FieldId, OPEN_LABEL, STATUS_PAGE,
    STATUS_PAGE_LEN, max_decimal,
};
use alarm_core::tracker::{DoorState, EventTracker, PinLevel, Sensor, SensorEvent};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn page() -> DocumentTemplate {
    DocumentTemplate::status_page().expect("shipped page should carry every field")
}

fn parse_field(bytes: &[u8]) -> u64 {
    let text = core::str::from_utf8(bytes).expect("field should be ASCII");
    text.trim_start_matches(' ')
        .parse()
        .expect("field should hold a decimal value")
}

fn door(is_open: bool, at: u64) -> DoorState {
    DoorState {
        is_open,
        change: SensorEvent::at(ms(at)),
    }
}

#[test]
fn shipped_page_keeps_the_script_offsets() {
    let page = page();
    let fields = page.fields();

    assert_eq!(STATUS_PAGE_LEN, 3_808);
    assert_eq!(fields.get(FieldId::MotionElapsed).range(), 1_650..1_662);
    assert_eq!(fields.get(FieldId::DoorLabel).range(), 1_673..1_681);
    assert_eq!(fields.get(FieldId::DoorElapsed).range(), 1_700..1_712);
    assert_eq!(page.field(FieldId::DoorLabel), OPEN_LABEL);
}

#[test]
fn elapsed_values_round_trip_within_the_field() {
    let mut page = page();
    let samples = [
        0,
        1,
        9,
        10,
        999,
        12_000,
        86_400_000,
        4_294_967_295,
        max_decimal(ELAPSED_WIDTH),
    ];

    for elapsed in samples {
        let now = ms(elapsed);
        page.render(now, door(true, 0), SensorEvent::at(ms(0)));

        let field = page.field(FieldId::MotionElapsed);
        assert_eq!(field.len(), ELAPSED_WIDTH);
        assert_eq!(parse_field(field), elapsed, "motion field for {elapsed}");
        assert_eq!(parse_field(page.field(FieldId::DoorElapsed)), elapsed);

        let digits = field.iter().skip_while(|b| **b == b' ');
        assert!(digits.clone().all(u8::is_ascii_digit), "no stray characters");
        assert_eq!(digits.count(), elapsed.to_string().len());
    }
}

#[test]
fn oversized_elapsed_values_clamp_to_all_nines() {
    // The historical firmware let the formatter truncate the text, which kept
    // the leading digits and silently divided the value. Clamping keeps the
    // value monotonic and still a valid number for the page script.
    let mut page = page();
    let too_large = max_decimal(ELAPSED_WIDTH) + 1;

    page.render(
        ms(too_large + 5),
        door(false, 5),
        SensorEvent::at(ms(0)),
    );

    assert_eq!(page.field(FieldId::MotionElapsed), b"999999999999");
    assert_eq!(page.field(FieldId::DoorElapsed), b"999999999999");

    page.render(Duration::MAX, door(false, 0), SensorEvent::at(ms(0)));
    assert_eq!(page.field(FieldId::MotionElapsed), b"999999999999");
}

#[test]
fn event_in_the_future_renders_zero() {
    let mut page = page();
    page.render(ms(100), door(true, 500), SensorEvent::at(ms(900)));

    assert_eq!(page.field(FieldId::MotionElapsed), b"           0");
    assert_eq!(page.field(FieldId::DoorElapsed), b"           0");
}

#[test]
fn door_label_switches_without_shifting_bytes() {
    let mut page = page();
    let label = page.fields().get(FieldId::DoorLabel).range();

    page.render(ms(10), door(false, 0), SensorEvent::at(ms(0)));
    assert_eq!(page.field(FieldId::DoorLabel), CLOSED_LABEL);
    assert_eq!(&page.as_bytes()[label.end..label.end + 2], b", ");
    assert_eq!(&page.as_bytes()[label.start - 10..label.start], b"doorState:");

    page.render(ms(20), door(true, 0), SensorEvent::at(ms(0)));
    assert_eq!(page.field(FieldId::DoorLabel), OPEN_LABEL);
    assert_eq!(page.as_bytes().len(), STATUS_PAGE_LEN);
}

#[test]
fn render_only_touches_declared_fields() {
    let mut page = page();
    page.render(
        ms(123_456_789),
        door(false, 1_000),
        SensorEvent::at(ms(77)),
    );

    let rendered = page.as_bytes();
    assert_ne!(rendered, STATUS_PAGE);
    for (offset, (after, before)) in rendered.iter().zip(STATUS_PAGE).enumerate() {
        if !page.fields().covers(offset) {
            assert_eq!(after, before, "byte {offset} changed outside any field");
        }
    }
    assert!(rendered.starts_with(b"<!DOCTYPE html>"));
    assert!(rendered.ends_with(b"</html>\n"));
}

#[test]
fn motion_at_five_seconds_renders_from_that_baseline() {
    let tracker = EventTracker::new(ms(0), PinLevel::High);
    let mut page = page();

    tracker.on_pin_change(Sensor::Motion, PinLevel::High, ms(5_000));

    page.render_snapshot(ms(5_000), &tracker.snapshot());
    assert_eq!(page.field(FieldId::MotionElapsed), b"           0");

    page.render_snapshot(ms(17_000), &tracker.snapshot());
    assert_eq!(page.field(FieldId::MotionElapsed), b"       12000");
}

#[test]
fn door_closing_at_two_seconds_renders_closed_label() {
    let tracker = EventTracker::new(ms(0), PinLevel::High);
    let mut page = page();

    tracker.on_pin_change(Sensor::Door, PinLevel::Low, ms(2_000));
    page.render_snapshot(ms(9_500), &tracker.snapshot());

    assert_eq!(page.field(FieldId::DoorLabel), b"\"CLOSED\"");
    assert_eq!(page.field(FieldId::DoorElapsed), b"        7500");
    assert_eq!(page.field(FieldId::MotionElapsed), b"        9500");
}
