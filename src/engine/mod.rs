mod availability;
mod booking;
mod confirmation;
mod conflict;
mod error;
mod mutations;
mod queries;
mod slots;
mod store;

pub use availability::{blocked_spans, merge_overlapping, resolve_open_ranges, subtract_intervals};
pub use booking::{BookingReceipt, BookingRequest};
pub use confirmation::Confirmation;
pub use error::EngineError;
pub use mutations::{duration_from_label, RuleUpdate};
pub use queries::DaySchedule;
pub use slots::{generate_slots, Slot, SlotInputs, SlotIter, SlotState};
pub use store::{SharedBarberState, Store};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard};
use ulid::Ulid;

use crate::clock::Clock;
use crate::limits::{DEFAULT_SLOT_STEP_MINUTES, DEFAULT_TOKEN_TTL_MINUTES};
use crate::model::*;
use crate::notify::Notifier;
use crate::token::TokenSigner;
use crate::wal::Wal;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub slot_step_minutes: u32,
    pub token_secret: Vec<u8>,
    pub token_ttl_minutes: u32,
    /// Compact the journal at start-up once it holds this many events.
    pub compact_threshold: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            slot_step_minutes: DEFAULT_SLOT_STEP_MINUTES,
            token_secret: b"chairbook-dev-secret".to_vec(),
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            compact_threshold: 1000,
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the journal. Appends that arrive while a flush is pending are
/// drained into the same batch and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&wal, other);
                }
            }
            other => handle_non_append(&wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so a partial batch does not leak
    // into the next one.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

/// The scheduling engine. Every mutation journals its event first and
/// applies it to the store only once the append is durable.
pub struct Engine {
    pub store: Arc<Store>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) signer: TokenSigner,
    pub(super) settings: EngineSettings,
    /// Serialises read-modify-journal of client records.
    pub(super) client_updates: Mutex<()>,
}

impl Engine {
    /// Replay the journal at `wal_path` into `store` and start the writer
    /// task. Must be called inside a Tokio runtime.
    pub fn new(
        store: Arc<Store>,
        wal_path: PathBuf,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        for event in &events {
            store.replay_event(event);
        }
        tracing::info!("replayed {} events from {}", events.len(), wal_path.display());

        let mut wal = Wal::open(&wal_path)?;
        if events.len() as u64 >= settings.compact_threshold
            && let Some(snapshot) = store.snapshot()
            && snapshot.len() < events.len()
        {
            Wal::write_compact_file(&wal_path, &snapshot)?;
            wal.swap_compact_file()?;
            tracing::info!("compacted journal: {} -> {} events", events.len(), snapshot.len());
        }

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let signer = TokenSigner::new(settings.token_secret.clone(), settings.token_ttl_minutes);
        Ok(Self {
            store,
            wal_tx,
            notifier,
            clock,
            signer,
            settings,
            client_updates: Mutex::new(()),
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub(super) fn step_ms(&self) -> Ms {
        minutes_ms(self.settings.slot_step_minutes)
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Journal, then apply to the barber state the caller has locked.
    pub(super) async fn persist_and_apply(
        &self,
        bs: &mut BarberState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(bs, event);
        metrics::counter!(crate::observability::EVENTS_COMMITTED_TOTAL).increment(1);
        Ok(())
    }

    /// Journal, then apply an event that is not scoped to a locked barber.
    pub(super) async fn persist_global(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_global(event);
        metrics::counter!(crate::observability::EVENTS_COMMITTED_TOTAL).increment(1);
        Ok(())
    }

    /// Exclusive lock on a barber's state. Fails if the barber was deleted
    /// while we waited.
    pub(super) async fn barber_write(
        &self,
        barber_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<BarberState>, EngineError> {
        let bs = self
            .store
            .get_barber(&barber_id)
            .ok_or(EngineError::NotFound(barber_id))?;
        let guard = bs.clone().write_owned().await;
        match self.store.get_barber(&barber_id) {
            Some(current) if Arc::ptr_eq(&current, &bs) => Ok(guard),
            _ => Err(EngineError::NotFound(barber_id)),
        }
    }

    /// Lookup entity → barber, then lock that barber.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<BarberState>), EngineError> {
        let barber_id = self
            .store
            .barber_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let guard = self.barber_write(barber_id).await?;
        Ok((barber_id, guard))
    }
}
