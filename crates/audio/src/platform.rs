//! Audio platforms for the ffmpeg host and the headless host.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::{AudioOrigin, AudioTrack, MediaElement};

use crate::graph::{AudioContext, AudioContextState, AudioNodeId, AudioPlatform, NodeGraph, TapRegistry};

/// Context behaviour that differs between platforms.
#[derive(Debug, Clone, Copy)]
struct ContextPolicy {
    starts_suspended: bool,
    resume_allowed: bool,
    accepts_synthetic: bool,
}

/// Counters shared between a platform and its contexts.
#[derive(Debug, Default)]
struct PlatformCounters {
    contexts: AtomicUsize,
    sources: AtomicUsize,
}

struct HostAudioContext {
    graph: NodeGraph,
    state: AudioContextState,
    policy: ContextPolicy,
    counters: Arc<PlatformCounters>,
}

impl AudioContext for HostAudioContext {
    fn state(&self) -> AudioContextState {
        self.state
    }

    fn resume(&mut self) -> CapburnResult<()> {
        match self.state {
            AudioContextState::Running => Ok(()),
            AudioContextState::Closed => Err(CapburnError::audio("cannot resume a closed audio context")),
            AudioContextState::Suspended if !self.policy.resume_allowed => Err(CapburnError::audio(
                "audio context resume was blocked by the platform",
            )),
            AudioContextState::Suspended => {
                self.state = AudioContextState::Running;
                tracing::debug!("Audio context resumed");
                Ok(())
            }
        }
    }

    fn create_media_element_source(
        &mut self,
        element: &dyn MediaElement,
    ) -> CapburnResult<AudioNodeId> {
        if let Some(info) = element.audio_source() {
            if matches!(info.origin, AudioOrigin::Synthetic { .. }) && !self.policy.accepts_synthetic {
                return Err(CapburnError::audio(format!(
                    "{} has synthetic audio this platform cannot tap",
                    element.element_id()
                )));
            }
        }
        let node = self.graph.add_source(element)?;
        self.counters.sources.fetch_add(1, Ordering::SeqCst);
        Ok(node)
    }

    fn create_stream_destination(&mut self) -> CapburnResult<AudioNodeId> {
        self.graph.add_destination()
    }

    fn output(&self) -> AudioNodeId {
        self.graph.output()
    }

    fn connect(&mut self, from: AudioNodeId, to: AudioNodeId) -> CapburnResult<()> {
        self.graph.connect(from, to)
    }

    fn destination_track(&self, destination: AudioNodeId) -> Option<AudioTrack> {
        self.graph.destination_track(destination)
    }

    fn close(&mut self) -> CapburnResult<()> {
        self.graph.close();
        self.state = AudioContextState::Closed;
        Ok(())
    }
}

fn new_context(
    taps: &TapRegistry,
    policy: ContextPolicy,
    counters: &Arc<PlatformCounters>,
) -> Box<dyn AudioContext> {
    counters.contexts.fetch_add(1, Ordering::SeqCst);
    Box::new(HostAudioContext {
        graph: NodeGraph::new(Arc::clone(taps)),
        state: if policy.starts_suspended {
            AudioContextState::Suspended
        } else {
            AudioContextState::Running
        },
        policy,
        counters: Arc::clone(counters),
    })
}

/// Audio platform for the ffmpeg host: sources are audio streams of media
/// files, and the capturable track names the file stream the recorder
/// muxes. Contexts run immediately; there is no gesture policy.
#[derive(Debug, Clone)]
pub struct FileAudioPlatform {
    taps: TapRegistry,
    counters: Arc<PlatformCounters>,
}

impl Default for FileAudioPlatform {
    fn default() -> Self {
        Self {
            taps: Arc::new(Mutex::new(HashSet::new())),
            counters: Arc::new(PlatformCounters::default()),
        }
    }
}

impl FileAudioPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioPlatform for FileAudioPlatform {
    fn create_context(&self) -> CapburnResult<Box<dyn AudioContext>> {
        Ok(new_context(
            &self.taps,
            ContextPolicy {
                starts_suspended: false,
                resume_allowed: true,
                accepts_synthetic: false,
            },
            &self.counters,
        ))
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Scriptable audio platform for the headless host.
///
/// Contexts start suspended, as they would before a user gesture. Clones
/// share counters, so a test can keep one clone to observe a platform it
/// handed to a routing graph.
#[derive(Debug, Clone)]
pub struct SyntheticAudioPlatform {
    taps: TapRegistry,
    counters: Arc<PlatformCounters>,
    resume_allowed: bool,
    available: bool,
}

impl Default for SyntheticAudioPlatform {
    fn default() -> Self {
        Self {
            taps: Arc::new(Mutex::new(HashSet::new())),
            counters: Arc::new(PlatformCounters::default()),
            resume_allowed: true,
            available: true,
        }
    }
}

impl SyntheticAudioPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts stay suspended; `resume` fails.
    pub fn blocking_resume() -> Self {
        Self {
            resume_allowed: false,
            ..Self::default()
        }
    }

    /// Context creation fails outright.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    pub fn contexts_created(&self) -> usize {
        self.counters.contexts.load(Ordering::SeqCst)
    }

    /// Media element sources created across all contexts.
    pub fn sources_created(&self) -> usize {
        self.counters.sources.load(Ordering::SeqCst)
    }
}

impl AudioPlatform for SyntheticAudioPlatform {
    fn create_context(&self) -> CapburnResult<Box<dyn AudioContext>> {
        if !self.available {
            return Err(CapburnError::audio("audio graph creation is blocked on this platform"));
        }
        Ok(new_context(
            &self.taps,
            ContextPolicy {
                starts_suspended: true,
                resume_allowed: self.resume_allowed,
                accepts_synthetic: true,
            },
            &self.counters,
        ))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capburn_media::headless::{ScriptedMedia, ScriptedMediaConfig};

    #[test]
    fn test_synthetic_context_starts_suspended() {
        let platform = SyntheticAudioPlatform::new();
        let mut ctx = platform.create_context().unwrap();
        assert_eq!(ctx.state(), AudioContextState::Suspended);
        ctx.resume().unwrap();
        assert_eq!(ctx.state(), AudioContextState::Running);
        assert_eq!(platform.contexts_created(), 1);
    }

    #[test]
    fn test_blocked_resume_is_an_error() {
        let platform = SyntheticAudioPlatform::blocking_resume();
        let mut ctx = platform.create_context().unwrap();
        assert!(ctx.resume().is_err());
        assert_eq!(ctx.state(), AudioContextState::Suspended);
    }

    #[test]
    fn test_file_platform_rejects_synthetic_audio() {
        let platform = FileAudioPlatform::new();
        let mut ctx = platform.create_context().unwrap();
        assert_eq!(ctx.state(), AudioContextState::Running);
        let media = ScriptedMedia::new(ScriptedMediaConfig::default());
        assert!(ctx.create_media_element_source(&media).is_err());
    }

    #[test]
    fn test_closed_context_cannot_resume() {
        let platform = SyntheticAudioPlatform::new();
        let mut ctx = platform.create_context().unwrap();
        ctx.close().unwrap();
        assert!(ctx.resume().is_err());
    }
}
