//! Change subscription on a single provider URI

use crossbeam_channel::Sender;
use log::{debug, info};
use std::sync::Arc;

use crate::context::{ContentObserver, ObserverId, ProviderContext};

/// Forwards changes at one URI into a channel, ignoring every other URI
struct ForwardingObserver {
    uri: String,
    tx: Sender<()>,
}

impl ContentObserver for ForwardingObserver {
    fn on_change(&self, uri: &str) {
        if uri != self.uri {
            debug!("Ignoring change at {}", uri);
            return;
        }
        // Receiver gone means the subscription is being torn down
        let _ = self.tx.try_send(());
    }
}

/// Registration against a provider URI.
///
/// Each change signalled at the URI is delivered as one `()` message on the
/// channel passed to [`ChangeSubscription::start`]. Stopping (or dropping)
/// unregisters the observer; the channel disconnects once the provider has
/// released it.
pub struct ChangeSubscription {
    ctx: Arc<dyn ProviderContext>,
    uri: String,
    id: Option<ObserverId>,
}

impl ChangeSubscription {
    /// Register for changes at `uri`
    pub fn start(ctx: Arc<dyn ProviderContext>, uri: &str, tx: Sender<()>) -> Self {
        info!("Start observing {}", uri);
        let observer = Arc::new(ForwardingObserver {
            uri: uri.to_string(),
            tx,
        });
        let id = ctx.register_observer(uri, observer);
        Self {
            ctx,
            uri: uri.to_string(),
            id: Some(id),
        }
    }

    /// Observed URI
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Check if the subscription is still registered
    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Unregister from the provider; later calls are no-ops
    pub fn stop(&mut self) {
        if let Some(id) = self.id.take() {
            info!("Stop observing {}", self.uri);
            self.ctx.unregister_observer(id);
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
