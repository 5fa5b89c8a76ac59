//! Audio context contracts and the node graph behind them.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use capburn_common::error::{CapburnError, CapburnResult};
use capburn_media::{AudioSourceInfo, AudioTrack, MediaElement, MediaElementId};

/// Node handle within one audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioNodeId(u32);

impl fmt::Display for AudioNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Processing state of an audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioContextState {
    /// Created but not processing, typically until a user gesture.
    Suspended,
    Running,
    Closed,
}

/// An audio processing context.
pub trait AudioContext: Send {
    fn state(&self) -> AudioContextState;

    /// Move a suspended context to running. No-op when already running.
    fn resume(&mut self) -> CapburnResult<()>;

    /// Tap a media element's audio. An element can be tapped at most once
    /// per platform; a second attempt fails.
    fn create_media_element_source(
        &mut self,
        element: &dyn MediaElement,
    ) -> CapburnResult<AudioNodeId>;

    /// A node whose input becomes a capturable audio track.
    fn create_stream_destination(&mut self) -> CapburnResult<AudioNodeId>;

    /// The audible output (speakers).
    fn output(&self) -> AudioNodeId;

    fn connect(&mut self, from: AudioNodeId, to: AudioNodeId) -> CapburnResult<()>;

    /// The track a stream destination produces, if anything audible feeds it.
    fn destination_track(&self, destination: AudioNodeId) -> Option<AudioTrack>;

    fn close(&mut self) -> CapburnResult<()>;
}

/// Creates audio contexts.
pub trait AudioPlatform: Send {
    fn create_context(&self) -> CapburnResult<Box<dyn AudioContext>>;

    fn name(&self) -> &str;
}

/// Elements that currently have a source node, shared across every context
/// a platform creates.
pub(crate) type TapRegistry = Arc<Mutex<HashSet<MediaElementId>>>;

#[derive(Debug)]
enum NodeKind {
    Output,
    Source {
        element: MediaElementId,
        audio: Option<AudioSourceInfo>,
    },
    Destination {
        track: Option<AudioTrack>,
    },
}

/// Node/edge bookkeeping shared by the platform contexts.
#[derive(Debug)]
pub(crate) struct NodeGraph {
    nodes: Vec<NodeKind>,
    edges: Vec<(AudioNodeId, AudioNodeId)>,
    taps: TapRegistry,
    closed: bool,
}

impl NodeGraph {
    pub(crate) fn new(taps: TapRegistry) -> Self {
        Self {
            nodes: vec![NodeKind::Output],
            edges: Vec::new(),
            taps,
            closed: false,
        }
    }

    pub(crate) fn output(&self) -> AudioNodeId {
        AudioNodeId(0)
    }

    fn ensure_open(&self) -> CapburnResult<()> {
        if self.closed {
            return Err(CapburnError::audio("audio context is closed"));
        }
        Ok(())
    }

    fn push(&mut self, node: NodeKind) -> AudioNodeId {
        self.nodes.push(node);
        AudioNodeId((self.nodes.len() - 1) as u32)
    }

    pub(crate) fn add_source(&mut self, element: &dyn MediaElement) -> CapburnResult<AudioNodeId> {
        self.ensure_open()?;
        let id = element.element_id();
        {
            let mut taps = self.taps.lock().unwrap_or_else(|p| p.into_inner());
            if !taps.insert(id) {
                return Err(CapburnError::audio(format!(
                    "{id} is already connected to an audio graph"
                )));
            }
        }
        Ok(self.push(NodeKind::Source {
            element: id,
            audio: element.audio_source(),
        }))
    }

    pub(crate) fn add_destination(&mut self) -> CapburnResult<AudioNodeId> {
        self.ensure_open()?;
        Ok(self.push(NodeKind::Destination { track: None }))
    }

    pub(crate) fn connect(&mut self, from: AudioNodeId, to: AudioNodeId) -> CapburnResult<()> {
        self.ensure_open()?;
        let audio = match self.nodes.get(from.0 as usize) {
            Some(NodeKind::Source { audio, .. }) => audio.clone(),
            Some(_) => {
                return Err(CapburnError::audio(format!("{from} is not a source node")));
            }
            None => return Err(CapburnError::audio(format!("unknown node {from}"))),
        };

        match self.nodes.get_mut(to.0 as usize) {
            Some(NodeKind::Output) => {}
            Some(NodeKind::Destination { track }) => {
                if track.is_none() {
                    if let Some(info) = audio {
                        *track =
                            Some(AudioTrack::new(info.origin, info.sample_rate, info.channels));
                    }
                }
            }
            Some(NodeKind::Source { .. }) => {
                return Err(CapburnError::audio(format!("{to} cannot accept input")));
            }
            None => return Err(CapburnError::audio(format!("unknown node {to}"))),
        }

        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
        Ok(())
    }

    pub(crate) fn destination_track(&self, destination: AudioNodeId) -> Option<AudioTrack> {
        match self.nodes.get(destination.0 as usize) {
            Some(NodeKind::Destination { track }) => track.clone(),
            _ => None,
        }
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Stop destination tracks and release tapped elements.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut taps = self.taps.lock().unwrap_or_else(|p| p.into_inner());
        for node in &self.nodes {
            match node {
                NodeKind::Destination { track: Some(track) } => track.stop(),
                NodeKind::Source { element, .. } => {
                    taps.remove(element);
                }
                _ => {}
            }
        }
    }
}

impl Drop for NodeGraph {
    fn drop(&mut self) {
        self.close();
    }
}
