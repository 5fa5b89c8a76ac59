use capburn_caption_model::{
    parse_whisper_log, CaptionEdit, CaptionId, CaptionStore, TimedText,
};
use proptest::prelude::*;

#[test]
fn add_edit_delete_leaves_expected_set_with_stable_ids() {
    let mut store = CaptionStore::new();
    let first = store.add(TimedText::new(0.0, 3.0, "Your first caption")).unwrap();
    let second = store.add(TimedText::new(3.0, 6.0, "")).unwrap();
    let third = store.add(TimedText::new(6.0, 9.0, "third")).unwrap();

    store.update(&second, CaptionEdit::Start(3.5)).unwrap();
    store.update(&second, CaptionEdit::End(7.0)).unwrap();
    store
        .update(&second, CaptionEdit::Text("edited".to_string()))
        .unwrap();
    store.remove(&third).unwrap();

    let remaining: Vec<(CaptionId, f64, f64, String)> = store
        .iter()
        .map(|c| (c.id.clone(), c.start, c.end, c.text.clone()))
        .collect();

    assert_eq!(
        remaining,
        vec![
            (first, 0.0, 3.0, "Your first caption".to_string()),
            (second, 3.5, 7.0, "edited".to_string()),
        ]
    );
    assert!(store.get(&third).is_none());
}

#[test]
fn removed_ids_are_not_reused() {
    let mut store = CaptionStore::new();
    let a = store.add(TimedText::new(0.0, 1.0, "a")).unwrap();
    store.remove(&a).unwrap();
    let b = store.add(TimedText::new(0.0, 1.0, "b")).unwrap();
    assert_ne!(a, b);
}

#[test]
fn imported_log_feeds_the_store() {
    let log = "[00:00.000 --> 00:01.200]  one\n[00:01.200 --> 00:02.400]  two\n";
    let store = CaptionStore::from_segments(parse_whisper_log(log)).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.active_at(1.2).map(|c| c.text.as_str()), Some("one"));
}

proptest! {
    #[test]
    fn log_times_parse_to_minutes_times_sixty_plus_seconds(
        sm in 0u32..100, ss in 0u32..60, sms in 0u32..1000,
        em in 0u32..100, es in 0u32..60, ems in 0u32..1000,
        text in "[a-zA-Z][a-zA-Z ]{0,30}",
    ) {
        let line = format!(
            "[{sm:02}:{ss:02}.{sms:03} --> {em:02}:{es:02}.{ems:03}]  {text}"
        );
        let parsed = parse_whisper_log(&line);
        prop_assert_eq!(parsed.len(), 1);

        let expected_start = sm as f64 * 60.0 + ss as f64 + sms as f64 / 1000.0;
        let expected_end = em as f64 * 60.0 + es as f64 + ems as f64 / 1000.0;
        prop_assert!((parsed[0].start - expected_start).abs() < 1e-6);
        prop_assert!((parsed[0].end - expected_end).abs() < 1e-6);
        prop_assert_eq!(parsed[0].text.as_str(), text.trim());
    }

    #[test]
    fn active_selection_is_repeatable(
        spans in prop::collection::vec((0.0f64..50.0, 0.0f64..10.0), 1..12),
        t in 0.0f64..60.0,
    ) {
        let store = CaptionStore::from_segments(
            spans.iter().map(|(s, d)| TimedText::new(*s, s + d, "x")),
        ).unwrap();

        let first = store.active_at(t).map(|c| c.id.clone());
        let expected = store.iter().find(|c| c.start <= t && t <= c.end).map(|c| c.id.clone());
        prop_assert_eq!(&first, &expected);
        for _ in 0..5 {
            prop_assert_eq!(store.active_at(t).map(|c| c.id.clone()), first.clone());
        }
    }
}
