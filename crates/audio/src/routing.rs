//! The persistent audio routing graph.
//!
//! One media element's audio is tapped once and fanned out to the audible
//! output and to a capturable stream destination. Most platforms refuse
//! (or silently break) a second tap of the same element, so the graph is
//! built at most once per element and only resumed afterwards. It lives
//! until [`AudioRoutingGraph::teardown`]: at session end, or when a
//! different element is loaded.

use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::{AudioTrack, MediaElement, MediaElementId};

use crate::graph::{AudioContext, AudioContextState, AudioNodeId, AudioPlatform};

/// What export gets back from [`AudioRoutingGraph::ensure_routing`].
#[derive(Debug, Clone)]
pub struct CapturableAudio {
    /// The capturable track; `None` when the element has no audio.
    pub track: Option<AudioTrack>,
    pub context_state: AudioContextState,
}

impl CapturableAudio {
    /// Whether a recording made now would carry live audio.
    pub fn is_audible(&self) -> bool {
        self.track.as_ref().is_some_and(|t| t.is_live())
            && self.context_state == AudioContextState::Running
    }
}

struct BuiltRouting {
    element: MediaElementId,
    context: Box<dyn AudioContext>,
    destination: AudioNodeId,
}

/// Session-owned singleton audio tap.
pub struct AudioRoutingGraph {
    platform: Box<dyn AudioPlatform>,
    built: Option<BuiltRouting>,
    build_count: u32,
}

impl AudioRoutingGraph {
    pub fn new(platform: Box<dyn AudioPlatform>) -> Self {
        Self {
            platform,
            built: None,
            build_count: 0,
        }
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Element the graph is bound to.
    pub fn bound_element(&self) -> Option<MediaElementId> {
        self.built.as_ref().map(|b| b.element)
    }

    /// Number of times a graph has been constructed over this object's life.
    pub fn build_count(&self) -> u32 {
        self.build_count
    }

    pub fn context_state(&self) -> Option<AudioContextState> {
        self.built.as_ref().map(|b| b.context.state())
    }

    /// Make sure `element`'s audio is routed and the context is running.
    ///
    /// The first call builds the graph. Later calls for the same element
    /// only resume a suspended context. A resume failure is not an error
    /// here: the returned state says the capture will be silent.
    pub fn ensure_routing(&mut self, element: &dyn MediaElement) -> CapburnResult<CapturableAudio> {
        let element_id = element.element_id();

        if let Some(built) = self.built.as_mut() {
            if built.element != element_id {
                return Err(CapburnError::audio(format!(
                    "routing graph is bound to {}; tear it down before routing {element_id}",
                    built.element
                )));
            }
            return Ok(resume_and_describe(built));
        }

        let mut context = self.platform.create_context()?;
        let wired = wire(context.as_mut(), element);
        let destination = match wired {
            Ok(destination) => destination,
            Err(e) => {
                if let Err(close_err) = context.close() {
                    tracing::warn!(error = %close_err, "Failed to close partial audio context");
                }
                return Err(e);
            }
        };

        self.build_count += 1;
        tracing::info!(
            element = %element_id,
            platform = self.platform.name(),
            builds = self.build_count,
            "Audio routing graph built"
        );

        let built = self.built.insert(BuiltRouting {
            element: element_id,
            context,
            destination,
        });
        let audio = resume_and_describe(built);
        if audio.track.is_none() {
            tracing::warn!(element = %element_id, "Media element has no audio track; captures will be silent");
        }
        Ok(audio)
    }

    /// Resume the context if built. Used on user gestures before export.
    pub fn resume(&mut self) -> CapburnResult<()> {
        match self.built.as_mut() {
            Some(built) => built.context.resume(),
            None => Ok(()),
        }
    }

    /// Close the context and release the element tap.
    pub fn teardown(&mut self) {
        if let Some(mut built) = self.built.take() {
            if let Err(e) = built.context.close() {
                tracing::warn!(error = %e, "Failed to close audio context");
            }
            tracing::info!(element = %built.element, "Audio routing graph torn down");
        }
    }
}

impl Drop for AudioRoutingGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn wire(context: &mut dyn AudioContext, element: &dyn MediaElement) -> CapburnResult<AudioNodeId> {
    let source = context.create_media_element_source(element)?;
    let destination = context.create_stream_destination()?;
    let output = context.output();
    context.connect(source, output)?;
    context.connect(source, destination)?;
    Ok(destination)
}

fn resume_and_describe(built: &mut BuiltRouting) -> CapturableAudio {
    if built.context.state() == AudioContextState::Suspended {
        match built.context.resume() {
            Ok(()) => tracing::debug!(element = %built.element, "Audio context resumed"),
            Err(e) => tracing::warn!(
                element = %built.element,
                error = %e,
                "Audio context is still suspended; captured audio will be silent"
            ),
        }
    }
    CapturableAudio {
        track: built.context.destination_track(built.destination),
        context_state: built.context.state(),
    }
}
