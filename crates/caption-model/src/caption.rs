//! Timed captions and the caption store.
//!
//! The store keeps captions in insertion order. That order is what the
//! compositor scans when picking the active caption, so overlapping
//! captions resolve to the earliest-inserted match. Editors that want a
//! chronological listing use [`CaptionStore::by_start`], which does not
//! reorder the store.

use std::fmt;

use capburn_common::error::CapburnError;
use serde::{Deserialize, Serialize};

/// Opaque caption identifier, unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptionId(String);

impl CaptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A caption's timing and text without an identity.
///
/// This is what importers and the transcription collaborator produce;
/// the store assigns ids on insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedText {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Caption text.
    pub text: String,
}

impl TimedText {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A timed caption owned by a [`CaptionStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub id: CaptionId,
    /// Start time in seconds (>= 0).
    pub start: f64,
    /// End time in seconds (>= start).
    pub end: f64,
    pub text: String,
}

impl Caption {
    /// Whether `time_secs` falls inside the closed interval `[start, end]`.
    pub fn contains(&self, time_secs: f64) -> bool {
        self.start <= time_secs && time_secs <= self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn timed_text(&self) -> TimedText {
        TimedText::new(self.start, self.end, self.text.clone())
    }
}

/// A single-field edit applied to one caption.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionEdit {
    Start(f64),
    End(f64),
    Text(String),
}

/// Errors raised by caption store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptionError {
    #[error("Invalid timing: start={start}, end={end} (need 0 <= start <= end)")]
    InvalidTiming { start: f64, end: f64 },

    #[error("Caption not found: {id}")]
    NotFound { id: CaptionId },

    #[error("Duplicate caption id: {id}")]
    DuplicateId { id: CaptionId },

    #[error("Invalid style value for {field}: {value:?}")]
    InvalidStyleValue { field: String, value: String },
}

pub type CaptionResult<T> = Result<T, CaptionError>;

impl From<CaptionError> for CapburnError {
    fn from(err: CaptionError) -> Self {
        match err {
            CaptionError::InvalidStyleValue { .. } => CapburnError::config(err.to_string()),
            _ => CapburnError::invalid_state(err.to_string()),
        }
    }
}

fn validate_timing(start: f64, end: f64) -> CaptionResult<()> {
    if start.is_finite() && end.is_finite() && start >= 0.0 && end >= start {
        Ok(())
    } else {
        Err(CaptionError::InvalidTiming { start, end })
    }
}

/// Ordered set of timed captions with unique ids.
#[derive(Debug, Clone, Default)]
pub struct CaptionStore {
    captions: Vec<Caption>,
    next_seq: u64,
}

impl CaptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from segments, assigning fresh ids in order.
    pub fn from_segments(segments: impl IntoIterator<Item = TimedText>) -> CaptionResult<Self> {
        let mut store = Self::new();
        store.replace_all(segments)?;
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.captions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captions.is_empty()
    }

    /// Captions in store order.
    pub fn iter(&self) -> impl Iterator<Item = &Caption> {
        self.captions.iter()
    }

    pub fn as_slice(&self) -> &[Caption] {
        &self.captions
    }

    pub fn get(&self, id: &CaptionId) -> Option<&Caption> {
        self.captions.iter().find(|c| &c.id == id)
    }

    /// Append a caption and return its new id.
    pub fn add(&mut self, segment: TimedText) -> CaptionResult<CaptionId> {
        validate_timing(segment.start, segment.end)?;
        let id = self.allocate_id();
        self.captions.push(Caption {
            id: id.clone(),
            start: segment.start,
            end: segment.end,
            text: segment.text,
        });
        tracing::debug!(caption = %id, "Caption added");
        Ok(id)
    }

    /// Insert a caption that already carries an id (e.g. loaded from disk).
    pub fn insert(&mut self, caption: Caption) -> CaptionResult<()> {
        validate_timing(caption.start, caption.end)?;
        if self.get(&caption.id).is_some() {
            return Err(CaptionError::DuplicateId { id: caption.id });
        }
        self.captions.push(caption);
        Ok(())
    }

    /// Replace every caption. Validation happens up front, so on error the
    /// store is left untouched.
    pub fn replace_all(&mut self, segments: impl IntoIterator<Item = TimedText>) -> CaptionResult<()> {
        let segments: Vec<TimedText> = segments.into_iter().collect();
        for segment in &segments {
            validate_timing(segment.start, segment.end)?;
        }
        self.captions.clear();
        self.next_seq = 0;
        for segment in segments {
            let id = self.allocate_id();
            self.captions.push(Caption {
                id,
                start: segment.start,
                end: segment.end,
                text: segment.text,
            });
        }
        tracing::debug!(count = self.captions.len(), "Caption store replaced");
        Ok(())
    }

    /// Apply a single-field edit in place.
    pub fn update(&mut self, id: &CaptionId, edit: CaptionEdit) -> CaptionResult<()> {
        let caption = self
            .captions
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| CaptionError::NotFound { id: id.clone() })?;

        match edit {
            CaptionEdit::Start(start) => {
                validate_timing(start, caption.end)?;
                caption.start = start;
            }
            CaptionEdit::End(end) => {
                validate_timing(caption.start, end)?;
                caption.end = end;
            }
            CaptionEdit::Text(text) => caption.text = text,
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &CaptionId) -> CaptionResult<Caption> {
        let index = self
            .captions
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| CaptionError::NotFound { id: id.clone() })?;
        Ok(self.captions.remove(index))
    }

    pub fn clear(&mut self) {
        self.captions.clear();
    }

    /// The active caption at `time_secs`: the first caption in store order
    /// whose interval contains the time.
    pub fn active_at(&self, time_secs: f64) -> Option<&Caption> {
        self.captions.iter().find(|c| c.contains(time_secs))
    }

    /// Captions ordered by start time. Ties keep store order.
    pub fn by_start(&self) -> Vec<&Caption> {
        let mut sorted: Vec<&Caption> = self.captions.iter().collect();
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
        sorted
    }

    pub fn segments(&self) -> Vec<TimedText> {
        self.captions.iter().map(Caption::timed_text).collect()
    }

    fn allocate_id(&mut self) -> CaptionId {
        loop {
            let id = CaptionId(format!("caption-{}", self.next_seq));
            self.next_seq += 1;
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_unique_ids() {
        let mut store = CaptionStore::new();
        let a = store.add(TimedText::new(0.0, 1.0, "a")).unwrap();
        let b = store.add(TimedText::new(1.0, 2.0, "b")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_ids_follow_segment_index() {
        let store = CaptionStore::from_segments(vec![
            TimedText::new(0.0, 1.0, "a"),
            TimedText::new(1.0, 2.0, "b"),
        ])
        .unwrap();
        let ids: Vec<&str> = store.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["caption-0", "caption-1"]);
    }

    #[test]
    fn test_add_rejects_inverted_interval() {
        let mut store = CaptionStore::new();
        let err = store.add(TimedText::new(2.0, 1.0, "x")).unwrap_err();
        assert!(matches!(err, CaptionError::InvalidTiming { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_rejects_negative_and_nan() {
        let mut store = CaptionStore::new();
        assert!(store.add(TimedText::new(-0.5, 1.0, "x")).is_err());
        assert!(store.add(TimedText::new(f64::NAN, 1.0, "x")).is_err());
    }

    #[test]
    fn test_zero_length_caption_is_allowed() {
        let mut store = CaptionStore::new();
        let id = store.add(TimedText::new(1.0, 1.0, "")).unwrap();
        assert!(store.get(&id).unwrap().contains(1.0));
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut store = CaptionStore::new();
        let id = store.add(TimedText::new(0.0, 1.0, "a")).unwrap();
        let err = store
            .insert(Caption {
                id: id.clone(),
                start: 0.0,
                end: 1.0,
                text: "dup".to_string(),
            })
            .unwrap_err();
        assert_eq!(err, CaptionError::DuplicateId { id });
    }

    #[test]
    fn test_allocation_skips_ids_taken_by_inserted_captions() {
        let mut store = CaptionStore::new();
        store
            .insert(Caption {
                id: CaptionId::from("caption-0"),
                start: 0.0,
                end: 1.0,
                text: "loaded".to_string(),
            })
            .unwrap();
        let fresh = store.add(TimedText::new(1.0, 2.0, "new")).unwrap();
        assert_eq!(fresh.as_str(), "caption-1");
    }

    #[test]
    fn test_update_end_before_start_is_rejected_and_leaves_caption() {
        let mut store = CaptionStore::new();
        let id = store.add(TimedText::new(2.0, 4.0, "a")).unwrap();
        assert!(store.update(&id, CaptionEdit::End(1.0)).is_err());
        assert_eq!(store.get(&id).unwrap().end, 4.0);
    }

    #[test]
    fn test_replace_all_is_atomic_on_error() {
        let mut store = CaptionStore::new();
        store.add(TimedText::new(0.0, 1.0, "keep")).unwrap();
        let result = store.replace_all(vec![
            TimedText::new(0.0, 1.0, "ok"),
            TimedText::new(3.0, 2.0, "bad"),
        ]);
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.as_slice()[0].text, "keep");
    }

    #[test]
    fn test_active_at_is_first_match_in_store_order() {
        let mut store = CaptionStore::new();
        let later = store.add(TimedText::new(1.0, 5.0, "inserted first")).unwrap();
        store.add(TimedText::new(0.0, 5.0, "starts earlier")).unwrap();

        for _ in 0..10 {
            assert_eq!(store.active_at(2.0).map(|c| &c.id), Some(&later));
        }
    }

    #[test]
    fn test_active_at_bounds_are_inclusive() {
        let store = CaptionStore::from_segments(vec![TimedText::new(1.0, 2.0, "x")]).unwrap();
        assert!(store.active_at(1.0).is_some());
        assert!(store.active_at(2.0).is_some());
        assert!(store.active_at(2.0001).is_none());
    }

    #[test]
    fn test_by_start_does_not_reorder_store() {
        let store = CaptionStore::from_segments(vec![
            TimedText::new(5.0, 6.0, "b"),
            TimedText::new(1.0, 2.0, "a"),
        ])
        .unwrap();
        let sorted: Vec<&str> = store.by_start().iter().map(|c| c.text.as_str()).collect();
        assert_eq!(sorted, vec!["a", "b"]);
        assert_eq!(store.as_slice()[0].text, "b");
    }
}
