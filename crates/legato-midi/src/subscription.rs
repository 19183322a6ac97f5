//! Endpoint subscriptions.
//!
//! One `Subscription` owns one transport connection. Closing (or dropping)
//! it tears the connection down synchronously: the transport joins any
//! in-flight delivery callback before the close returns, so the handler can
//! never fire afterwards.

use crate::endpoint::{EndpointInfo, EndpointRef};
use crate::{Error, Result};
use midir::{MidiInput, MidiInputConnection};
use tracing::debug;

pub struct Subscription {
    connection: Option<MidiInputConnection<()>>,
    info: EndpointInfo,
}

impl Subscription {
    /// Subscribes `handler` to the endpoint's delivery stream.
    ///
    /// `handler` runs on the transport's delivery thread with the raw bytes
    /// of one message; it must not block. For a [`EndpointRef::Source`] the
    /// port is looked up and its name re-checked (indexes are not stable
    /// across hot-plug). For a [`EndpointRef::Virtual`] a client-owned
    /// destination port is created; it lives exactly as long as this
    /// subscription.
    pub fn open<H>(endpoint: &EndpointRef, client_name: &str, handler: H) -> Result<Self>
    where
        H: FnMut(&[u8]) + Send + 'static,
    {
        let info = endpoint.info();
        let input = MidiInput::new(client_name)?;
        let connection = match endpoint {
            EndpointRef::Source(source) => {
                let ports = input.ports();
                let port = ports
                    .get(source.index)
                    .ok_or_else(|| Error::PortNotFound(source.name.clone()))?;
                let name = input
                    .port_name(port)
                    .map_err(|e| Error::PortInvalid(e.to_string()))?;
                if name != source.name {
                    return Err(Error::PortInvalid(source.name.clone()));
                }
                connect_source(input, port, client_name, handler)?
            }
            EndpointRef::Virtual { name } => connect_virtual(input, name, handler)?,
        };
        debug!("subscribed to MIDI {}", info);
        Ok(Self {
            connection: Some(connection),
            info,
        })
    }

    pub fn info(&self) -> &EndpointInfo {
        &self.info
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Unsubscribes. Synchronous: by the time this returns the transport has
    /// stopped delivering and no callback is in flight. Closing a
    /// client-owned virtual destination also destroys the port.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
            debug!("unsubscribed from MIDI {}", self.info);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("endpoint", &self.info)
            .field("open", &self.connection.is_some())
            .finish()
    }
}

fn connect_source<H>(
    input: MidiInput,
    port: &midir::MidiInputPort,
    client_name: &str,
    mut handler: H,
) -> Result<MidiInputConnection<()>>
where
    H: FnMut(&[u8]) + Send + 'static,
{
    input
        .connect(
            port,
            client_name,
            move |_timestamp, bytes, _| handler(bytes),
            (),
        )
        .map_err(Error::from)
}

#[cfg(unix)]
fn connect_virtual<H>(input: MidiInput, name: &str, mut handler: H) -> Result<MidiInputConnection<()>>
where
    H: FnMut(&[u8]) + Send + 'static,
{
    use midir::os::unix::VirtualInput;
    input
        .create_virtual(name, move |_timestamp, bytes, _| handler(bytes), ())
        .map_err(Error::from)
}

#[cfg(not(unix))]
fn connect_virtual<H>(
    _input: MidiInput,
    _name: &str,
    _handler: H,
) -> Result<MidiInputConnection<()>>
where
    H: FnMut(&[u8]) + Send + 'static,
{
    Err(Error::VirtualUnsupported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::SourceEndpoint;

    #[test]
    fn test_open_missing_source_fails() {
        let endpoint = EndpointRef::source(SourceEndpoint {
            index: usize::MAX,
            name: "no-such-endpoint".into(),
        });
        // Fails as PortNotFound with a transport present, Init without one.
        let result = Subscription::open(&endpoint, "legato-test", |_| {});
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_virtual_destination_lifecycle() {
        let endpoint = EndpointRef::virtual_destination("legato-test-in");
        let mut subscription = match Subscription::open(&endpoint, "legato-test", |_| {}) {
            Ok(subscription) => subscription,
            Err(e) => {
                eprintln!("Skipping: MIDI transport unavailable ({})", e);
                return;
            }
        };
        assert!(subscription.is_open());
        assert_eq!(subscription.info().name, "legato-test-in");
        subscription.close();
        assert!(!subscription.is_open());
        // Second close is a no-op.
        subscription.close();
    }
}
