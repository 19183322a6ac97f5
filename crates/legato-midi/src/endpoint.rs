//! Endpoint identity and discovery.

use serde::{Deserialize, Serialize};

#[cfg(feature = "midi-io")]
use crate::{Error, Result};

/// An external transport input port, discovered via [`list_sources`].
/// The index is a connection hint only; identity is checked by name when a
/// subscription is opened, since indexes shift on hot-plug.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub index: usize,
    pub name: String,
}

/// A deliverable endpoint: either an external source this process merely
/// listens to, or a virtual destination this process creates and owns so
/// other applications can send MIDI into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointRef {
    Source(SourceEndpoint),
    Virtual { name: String },
}

impl EndpointRef {
    pub fn source(source: SourceEndpoint) -> Self {
        EndpointRef::Source(source)
    }

    pub fn virtual_destination(name: impl Into<String>) -> Self {
        EndpointRef::Virtual { name: name.into() }
    }

    pub fn info(&self) -> EndpointInfo {
        match self {
            EndpointRef::Source(source) => EndpointInfo {
                name: source.name.clone(),
                kind: EndpointKind::Source,
            },
            EndpointRef::Virtual { name } => EndpointInfo {
                name: name.clone(),
                kind: EndpointKind::VirtualDestination,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    Source,
    VirtualDestination,
}

/// Stable identity of a bound endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub name: String,
    pub kind: EndpointKind,
}

impl std::fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            EndpointKind::Source => write!(f, "source \"{}\"", self.name),
            EndpointKind::VirtualDestination => write!(f, "virtual destination \"{}\"", self.name),
        }
    }
}

/// Enumerates the transport's input ports.
#[cfg(feature = "midi-io")]
pub fn list_sources() -> Result<Vec<SourceEndpoint>> {
    let input = midir::MidiInput::new("legato-enumerate")?;
    Ok(input
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| SourceEndpoint {
            index,
            name: input
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown Endpoint {}", index)),
        })
        .collect())
}

/// Finds the first source whose name contains `fragment` (case-insensitive).
#[cfg(feature = "midi-io")]
pub fn find_source(fragment: &str) -> Result<SourceEndpoint> {
    let needle = fragment.to_lowercase();
    list_sources()?
        .into_iter()
        .find(|source| source.name.to_lowercase().contains(&needle))
        .ok_or_else(|| Error::PortNotFound(fragment.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_ref_info() {
        let source = EndpointRef::source(SourceEndpoint {
            index: 2,
            name: "TestKeyboard".into(),
        });
        let info = source.info();
        assert_eq!(info.name, "TestKeyboard");
        assert_eq!(info.kind, EndpointKind::Source);

        let dest = EndpointRef::virtual_destination("legato-in");
        let info = dest.info();
        assert_eq!(info.name, "legato-in");
        assert_eq!(info.kind, EndpointKind::VirtualDestination);
    }

    #[test]
    fn test_info_display() {
        let info = EndpointInfo {
            name: "Piano".into(),
            kind: EndpointKind::Source,
        };
        assert_eq!(info.to_string(), "source \"Piano\"");
    }

    #[cfg(feature = "midi-io")]
    #[test]
    fn test_list_sources_does_not_crash() {
        // Availability depends on the system; only the call shape is checked.
        match list_sources() {
            Ok(sources) => println!("found {} MIDI sources", sources.len()),
            Err(e) => println!("MIDI transport unavailable: {}", e),
        }
    }
}
