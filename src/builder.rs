//! Builder for [`EndpointSynth`].

use crate::binding::{delivery_handler, Renderer};
use crate::{EndpointSynth, Error, Result};
use legato_midi::{EndpointRef, SourceEndpoint, Subscription};
use legato_synth::{EngineConfig, InstrumentDescriptor, RenderHead, SynthEngine, UnitHost};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Configures and constructs an [`EndpointSynth`].
///
/// The endpoint is validated before any engine resource is allocated, the
/// engine is brought up (instantiating and loading the instrument) before
/// the subscription is opened, and the audio stream starts last, so a
/// failure at any step unwinds cleanly and never leaves a binding that
/// silently plays the wrong sound.
pub struct EndpointSynthBuilder {
    endpoint: Option<EndpointRef>,
    instrument: InstrumentDescriptor,
    config: EngineConfig,
    host: Option<Arc<UnitHost>>,
    client_name: String,
    output_device: Option<usize>,
}

impl Default for EndpointSynthBuilder {
    fn default() -> Self {
        Self {
            endpoint: None,
            instrument: InstrumentDescriptor::general_midi(),
            config: EngineConfig::default(),
            host: None,
            client_name: "legato".to_string(),
            output_device: None,
        }
    }
}

impl EndpointSynthBuilder {
    /// Binds to an external source endpoint.
    pub fn source(mut self, source: SourceEndpoint) -> Self {
        self.endpoint = Some(EndpointRef::Source(source));
        self
    }

    /// Creates and binds a client-owned virtual destination.
    pub fn virtual_destination(mut self, name: impl Into<String>) -> Self {
        self.endpoint = Some(EndpointRef::Virtual { name: name.into() });
        self
    }

    pub fn instrument(mut self, instrument: InstrumentDescriptor) -> Self {
        self.instrument = instrument;
        self
    }

    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a unit host (soundfont cache, registered factories) across
    /// bindings. Each binding still owns its engine exclusively.
    pub fn unit_host(mut self, host: Arc<UnitHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Client name shown to the MIDI transport.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Output device index for the cpal stream (default device if unset).
    #[cfg(feature = "audio-out")]
    pub fn output_device(mut self, index: usize) -> Self {
        self.output_device = Some(index);
        self
    }

    /// Builds the binding and plays it through the system audio output.
    /// The engine sample rate follows the output device.
    #[cfg(feature = "audio-out")]
    pub fn build(mut self) -> Result<EndpointSynth> {
        let endpoint = self.validated_endpoint()?;
        // Probe the device before building the engine so the unit renders at
        // the device rate.
        let mut output = crate::output::AudioOutput::new(self.output_device)?;
        self.config.sample_rate = output.sample_rate();
        let (mut synth, head) = self.assemble(endpoint)?;
        // If the stream fails to start, dropping `synth` unsubscribes before
        // the engine goes away.
        output.start(head)?;
        synth.renderer = Some(Renderer::Stream(output));
        Ok(synth)
    }

    /// Builds the binding but hands the render head to the caller, for
    /// embedding in an existing audio callback (and for tests). No audio
    /// stream is opened.
    pub fn build_manual(self) -> Result<(EndpointSynth, RenderHead)> {
        let endpoint = self.validated_endpoint()?;
        self.assemble(endpoint)
    }

    fn validated_endpoint(&self) -> Result<EndpointRef> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| Error::EndpointInvalid("no endpoint specified".into()))?;
        match &endpoint {
            EndpointRef::Source(source) => {
                let sources = legato_midi::list_sources()?;
                let present = sources
                    .iter()
                    .any(|candidate| candidate.index == source.index && candidate.name == source.name);
                if !present {
                    return Err(Error::EndpointInvalid(source.name.clone()));
                }
            }
            EndpointRef::Virtual { name } => {
                if name.is_empty() {
                    return Err(Error::EndpointInvalid(
                        "virtual destination name is empty".into(),
                    ));
                }
            }
        }
        Ok(endpoint)
    }

    /// Engine first, subscription second. If the subscription fails the
    /// engine is released on unwind; the reverse order could deliver events
    /// into a binding whose instrument never loaded.
    fn assemble(self, endpoint: EndpointRef) -> Result<(EndpointSynth, RenderHead)> {
        let host = self.host.unwrap_or_else(|| Arc::new(UnitHost::new()));
        let (mut engine, head) = SynthEngine::new(host, self.instrument, self.config)?;

        let sender = engine
            .take_sender()
            .ok_or_else(|| Error::EngineInstantiation("event sender already taken".into()))?;
        let parse_failures = Arc::new(AtomicU64::new(0));
        let handler = delivery_handler(sender, parse_failures.clone());

        let subscription = Subscription::open(&endpoint, &self.client_name, handler)?;
        let info = subscription.info().clone();

        Ok((
            EndpointSynth {
                info,
                subscription: Some(subscription),
                renderer: Some(Renderer::Manual),
                engine,
                parse_failures,
                closed: false,
            },
            head,
        ))
    }
}
