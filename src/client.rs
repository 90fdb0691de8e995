//! Media scanner client
//!
//! [`MediaScannerClient`] is the façade application code talks to. Exactly
//! one live instance exists per [`ClientSlot`]: the composition root owns a
//! slot (or uses [`ClientSlot::global`]) and hands out the shared
//! [`ClientHandle`]. Destroying the instance tears down its subscription and
//! empties the slot, so the next request builds a fresh client.

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use crate::config::ClientConfig;
use crate::context::ProviderContext;
use crate::error::ClientError;
use crate::listener::{ListenerRegistry, ScanListener};
use crate::models::{MediaRecord, MediaTypeFlag, ScanState};
use crate::selection::Selection;
use crate::tracker::ScanStateTracker;

/// Column of the media table holding the file path
pub const PATH_COLUMN: &str = "path";

/// Shared handle to the live client
pub type ClientHandle = Arc<MediaScannerClient>;

type SlotCell = Mutex<Option<ClientHandle>>;

/// Owner of at most one live client
#[derive(Clone, Default)]
pub struct ClientSlot {
    cell: Arc<SlotCell>,
}

impl ClientSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide slot
    pub fn global() -> &'static ClientSlot {
        static GLOBAL: OnceLock<ClientSlot> = OnceLock::new();
        GLOBAL.get_or_init(ClientSlot::new)
    }

    /// Return the live client, creating it with the default config if needed
    pub fn get_or_create(&self, ctx: Arc<dyn ProviderContext>) -> Result<ClientHandle, ClientError> {
        self.get_or_create_with_config(ctx, ClientConfig::default())
    }

    /// Return the live client, creating it with `config` if needed.
    ///
    /// `ctx` and `config` are ignored when a client already exists.
    pub fn get_or_create_with_config(
        &self,
        ctx: Arc<dyn ProviderContext>,
        config: ClientConfig,
    ) -> Result<ClientHandle, ClientError> {
        let mut cell = lock(&self.cell);
        if let Some(client) = cell.as_ref() {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(MediaScannerClient::new(
            ctx,
            config,
            Arc::downgrade(&self.cell),
        )?);
        *cell = Some(Arc::clone(&client));
        info!("Created media scanner client");
        Ok(client)
    }

    /// The live client, if any
    pub fn current(&self) -> Option<ClientHandle> {
        lock(&self.cell).clone()
    }
}

/// Observes the scanner service and queries its results
pub struct MediaScannerClient {
    ctx: Arc<dyn ProviderContext>,
    config: ClientConfig,
    listeners: Arc<ListenerRegistry>,
    tracker: ScanStateTracker,
    media_type_flag: AtomicU8,
    destroyed: AtomicBool,
    slot: Weak<SlotCell>,
}

impl MediaScannerClient {
    /// Get the process-wide client, creating it on first use
    pub fn get_instance(ctx: Arc<dyn ProviderContext>) -> Result<ClientHandle, ClientError> {
        ClientSlot::global().get_or_create(ctx)
    }

    fn new(
        ctx: Arc<dyn ProviderContext>,
        config: ClientConfig,
        slot: Weak<SlotCell>,
    ) -> Result<Self, ClientError> {
        let listeners = Arc::new(ListenerRegistry::new());
        let tracker = ScanStateTracker::start(
            Arc::clone(&ctx),
            &config.scan_state_uri(),
            config.notify_policy,
            Arc::clone(&listeners),
        )?;

        Ok(Self {
            media_type_flag: AtomicU8::new(config.default_media_type_flag.bits()),
            ctx,
            config,
            listeners,
            tracker,
            destroyed: AtomicBool::new(false),
            slot,
        })
    }

    /// Stop observing and release the slot.
    ///
    /// Every later call on this instance, including a second `destroy`,
    /// fails with [`ClientErrorKind::Destroyed`](crate::ClientErrorKind::Destroyed).
    pub fn destroy(&self) -> Result<(), ClientError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Err(ClientError::destroyed());
        }
        info!("Destroying media scanner client");

        // Empty the slot first; stopping the tracker may wait on a slow listener
        let taken = self.slot.upgrade().and_then(|cell| {
            let mut guard = lock(&cell);
            let ours = guard
                .as_ref()
                .is_some_and(|c| std::ptr::eq(Arc::as_ptr(c), self));
            if ours {
                guard.take()
            } else {
                None
            }
        });

        self.tracker.stop();
        drop(taken);
        Ok(())
    }

    /// Check if this instance was destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Config this client was created with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Select which media categories [`get_media_info`](Self::get_media_info) returns
    pub fn set_media_type_flag(&self, flag: MediaTypeFlag) -> Result<(), ClientError> {
        self.ensure_alive()?;
        self.media_type_flag.store(flag.bits(), Ordering::SeqCst);
        debug!("Media type flag set to {}", flag);
        Ok(())
    }

    /// Currently selected media categories
    pub fn media_type_flag(&self) -> Result<MediaTypeFlag, ClientError> {
        self.ensure_alive()?;
        Ok(self.current_flag())
    }

    /// Whether the provider reports a running scan right now
    pub fn is_scanning(&self) -> Result<bool, ClientError> {
        self.ensure_alive()?;
        Ok(self.tracker.is_scanning())
    }

    /// Current scan state as reported by the provider
    pub fn scan_state(&self) -> Result<ScanState, ClientError> {
        self.ensure_alive()?;
        Ok(self.tracker.scan_state())
    }

    /// Query the media catalog with the current flag.
    ///
    /// `Ok(None)` means the query could not be answered (provider
    /// unavailable or result malformed); `Ok(Some(vec![]))` means it ran and
    /// nothing matched.
    pub fn get_media_info(&self) -> Result<Option<Vec<MediaRecord>>, ClientError> {
        self.ensure_alive()?;

        let selection = Selection::from_flag(self.current_flag());
        let uri = self.config.media_uri();
        let paths = self
            .ctx
            .query(&uri, &selection)
            .and_then(|rows| rows.text_column(&uri, PATH_COLUMN));

        match paths {
            Ok(paths) => {
                debug!("Media query returned {} rows", paths.len());
                Ok(Some(paths.into_iter().map(MediaRecord::new).collect()))
            }
            Err(e) => {
                warn!("Media query failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Ask the scanner service for a full scan without waiting for it
    pub fn scan_all(&self) -> Result<(), ClientError> {
        self.ensure_alive()?;
        info!("Requesting full scan");
        if let Err(e) = self.ctx.send_broadcast(&self.config.scan_all_action) {
            warn!("Failed to send scan request: {}", e);
        }
        Ok(())
    }

    /// Add a scan listener; already registered listeners are ignored
    pub fn register_scan_listener(&self, listener: Arc<dyn ScanListener>) -> Result<(), ClientError> {
        self.ensure_alive()?;
        self.listeners.register(listener);
        Ok(())
    }

    /// Remove a scan listener; unknown listeners are ignored
    pub fn unregister_scan_listener(&self, listener: &Arc<dyn ScanListener>) -> Result<(), ClientError> {
        self.ensure_alive()?;
        self.listeners.unregister(listener);
        Ok(())
    }

    fn current_flag(&self) -> MediaTypeFlag {
        MediaTypeFlag::from_bits_truncate(self.media_type_flag.load(Ordering::SeqCst))
    }

    fn ensure_alive(&self) -> Result<(), ClientError> {
        if self.is_destroyed() {
            return Err(ClientError::destroyed());
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
