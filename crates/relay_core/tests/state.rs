use pretty_assertions::assert_eq;
use relay_core::{BatchSummary, ItemLifecycle, ItemRange, ItemState, RangeError};

#[test]
fn full_pipeline_walk_is_accepted() {
    let mut item = ItemLifecycle::new();
    for next in [
        ItemState::Acquiring,
        ItemState::Normalizing,
        ItemState::Partitioning,
        ItemState::Delivering,
        ItemState::Succeeded,
    ] {
        item.advance(next).unwrap();
    }
    assert!(item.state().is_terminal());
    assert_eq!(item.history().len(), 6);
}

#[test]
fn steps_cannot_be_skipped() {
    let mut item = ItemLifecycle::new();
    item.advance(ItemState::Acquiring).unwrap();
    let err = item.advance(ItemState::Delivering).unwrap_err();
    assert_eq!(err.from, ItemState::Acquiring);
    assert_eq!(item.state(), ItemState::Acquiring);
    item.advance(ItemState::Failed).unwrap();
}

#[test]
fn range_parsing() {
    assert_eq!(ItemRange::parse("all").unwrap(), ItemRange::All);
    assert_eq!(ItemRange::parse("").unwrap(), ItemRange::All);
    assert_eq!(
        ItemRange::parse(" 3 - 7 ").unwrap(),
        ItemRange::Span { start: 3, end: 7 }
    );
    assert_eq!(
        ItemRange::parse("4").unwrap(),
        ItemRange::Span { start: 4, end: 4 }
    );
    assert_eq!(ItemRange::parse("0-2"), Err(RangeError::ZeroStart));
    assert_eq!(
        ItemRange::parse("5-2"),
        Err(RangeError::Reversed { start: 5, end: 2 })
    );
    assert!(matches!(ItemRange::parse("x"), Err(RangeError::Malformed(_))));
}

#[test]
fn range_resolution_clamps_end() {
    assert_eq!(ItemRange::All.resolve(4), Ok((0, 4)));
    assert_eq!(ItemRange::Span { start: 2, end: 10 }.resolve(4), Ok((1, 4)));
    assert_eq!(
        ItemRange::Span { start: 6, end: 10 }.resolve(4),
        Err(RangeError::OutOfBounds {
            start: 6,
            end: 10,
            len: 4
        })
    );
}

#[test]
fn summary_display_mentions_stop() {
    let mut summary = BatchSummary::default();
    summary.record(ItemState::Succeeded);
    summary.record(ItemState::Failed);
    summary.record(ItemState::Skipped);
    summary.processed_range = Some((1, 3));
    summary.cancelled = true;
    assert_eq!(summary.attempted(), 3);
    assert_eq!(
        summary.to_string(),
        "succeeded=1 failed=1 skipped=1 range=1-3 (stopped)"
    );
}
