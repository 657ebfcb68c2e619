//! Bounded, keyed pool of broker producers.
//!
//! Each [`ProducerKind`] owns an independent `deadpool` sub-pool whose
//! manager opens producers through a [`ProducerFactory`] and validates idle
//! ones before they are handed out. A capped sub-pool parks borrowers until a
//! producer comes back or the max wait elapses. An uncapped one never waits:
//! it grows whenever every producer is busy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use deadpool::managed::{
    self, Metrics, Object, Pool, PoolError, RecycleError, RecycleResult, TimeoutType, Timeouts,
};
use deadpool::Runtime;
use tracing::{debug, info, warn};

use crate::config::{Config, PoolConfig};
use crate::kafka::{
    BrokerProducer, KafkaProducerFactory, OutboundRecord, ProducerFactory, ProducerKind,
};
use crate::{Error, Result};

/// Starting size of an uncapped sub-pool; doubled each time it runs dry.
const UNCAPPED_INITIAL_SIZE: usize = 16;

/// A pool-managed producer connection.
pub struct PooledProducer {
    id: u64,
    kind: ProducerKind,
    producer: Option<Box<dyn BrokerProducer>>,
}

impl PooledProducer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ProducerKind {
        self.kind
    }

    /// The underlying connection, absent once it has been taken away.
    pub fn producer(&self) -> Option<&dyn BrokerProducer> {
        self.producer.as_deref()
    }

    pub async fn send(&self, record: &OutboundRecord) -> Result<()> {
        match self.producer.as_deref() {
            Some(producer) => producer.send(record).await,
            None => Err(Error::Connection(format!(
                "{} producer #{} has no live connection",
                self.kind, self.id
            ))),
        }
    }

    pub(crate) fn take_producer(&mut self) -> Option<Box<dyn BrokerProducer>> {
        self.producer.take()
    }
}

/// A producer on loan from the pool. Dropping it returns it to the idle set.
pub type BorrowedProducer = Object<ProducerManager>;

/// Opens and recycles the producers of one kind.
pub struct ProducerManager {
    kind: ProducerKind,
    factory: Arc<dyn ProducerFactory>,
    next_id: Arc<AtomicU64>,
}

impl managed::Manager for ProducerManager {
    type Type = PooledProducer;
    type Error = Error;

    async fn create(&self) -> Result<PooledProducer> {
        let producer = self.factory.create(self.kind)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(kind = %self.kind, producer = id, "Created producer");

        Ok(PooledProducer {
            id,
            kind: self.kind,
            producer: Some(producer),
        })
    }

    async fn recycle(&self, pooled: &mut PooledProducer, _: &Metrics) -> RecycleResult<Error> {
        if self.factory.validate(pooled) {
            return Ok(());
        }

        warn!(
            kind = %self.kind,
            producer = pooled.id,
            "Discarding idle producer that failed validation"
        );
        if let Some(producer) = pooled.take_producer() {
            self.factory.destroy(producer).await;
        }
        Err(RecycleError::Message("producer connection is no longer usable".into()))
    }
}

pub struct KeyedProducerPool {
    factory: Arc<dyn ProducerFactory>,
    pools: HashMap<ProducerKind, Pool<ProducerManager>>,
    max_total_per_key: Option<usize>,
    max_wait: Option<Duration>,
    /// Held for reading while a handle goes back, for writing while the
    /// idle sets are drained, so no producer is parked after shutdown.
    closed: RwLock<bool>,
}

impl KeyedProducerPool {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::new(KafkaProducerFactory::new(config.kafka.clone()), &config.pool)
    }

    pub fn new(factory: impl ProducerFactory, config: &PoolConfig) -> Result<Self> {
        if config.max_total_per_key == Some(0) {
            return Err(Error::Config(
                "pool.max_total_per_key must be positive; leave it unset for no cap".to_string(),
            ));
        }

        let factory: Arc<dyn ProducerFactory> = Arc::new(factory);
        let next_id = Arc::new(AtomicU64::new(1));
        let mut pools = HashMap::new();

        for kind in ProducerKind::ALL {
            let manager = ProducerManager {
                kind,
                factory: Arc::clone(&factory),
                next_id: Arc::clone(&next_id),
            };
            let pool = Pool::builder(manager)
                .max_size(config.max_total_per_key.unwrap_or(UNCAPPED_INITIAL_SIZE))
                .wait_timeout(config.max_wait())
                .runtime(Runtime::Tokio1)
                .build()
                .map_err(|e| Error::Config(format!("cannot build {} producer pool: {}", kind, e)))?;
            pools.insert(kind, pool);
        }

        info!(
            max_total_per_key = ?config.max_total_per_key,
            max_wait_ms = ?config.max_wait_ms,
            "Producer pool created"
        );

        Ok(Self {
            factory,
            pools,
            max_total_per_key: config.max_total_per_key,
            max_wait: config.max_wait(),
            closed: RwLock::new(false),
        })
    }

    pub fn factory(&self) -> &dyn ProducerFactory {
        self.factory.as_ref()
    }

    fn pool(&self, kind: ProducerKind) -> Result<&Pool<ProducerManager>> {
        self.pools
            .get(&kind)
            .ok_or_else(|| Error::Config(format!("no sub-pool for producer kind '{}'", kind)))
    }

    fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrows a producer of `kind`, waiting for one to be released when
    /// the kind is at capacity.
    pub async fn borrow(&self, kind: ProducerKind) -> Result<BorrowedProducer> {
        if self.is_closed() {
            return Err(Error::Shutdown);
        }

        let pool = self.pool(kind)?;
        let borrowed = match self.max_total_per_key {
            Some(_) => pool.get().await,
            None => get_growing(pool).await,
        };

        borrowed.map_err(|e| self.pool_error(kind, e))
    }

    fn pool_error(&self, kind: ProducerKind, error: PoolError<Error>) -> Error {
        match error {
            PoolError::Timeout(TimeoutType::Wait) => {
                let waited = self.max_wait.unwrap_or_default();
                warn!(kind = %kind, waited = ?waited, "Timed out waiting for a producer");
                Error::PoolExhausted {
                    kind,
                    max_total: self.max_total_per_key.unwrap_or_default(),
                    waited,
                }
            }
            PoolError::Timeout(other) => Error::Timeout {
                message: format!("{} producer pool timed out ({:?})", kind, other),
            },
            PoolError::Backend(e) => {
                warn!(kind = %kind, "Failed to create producer: {}", e);
                e
            }
            PoolError::Closed => Error::Shutdown,
            other => Error::Config(format!("{} producer pool error: {}", kind, other)),
        }
    }

    /// Returns a borrowed producer to the idle set of its kind.
    pub async fn release(&self, handle: BorrowedProducer) {
        let orphan = {
            let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
            if *closed {
                Some(Object::take(handle))
            } else {
                // Puts it back in the idle set and wakes the next waiter.
                drop(handle);
                None
            }
        };

        if let Some(pooled) = orphan {
            debug!(
                kind = %pooled.kind,
                producer = pooled.id,
                "Pool closed, destroying returned producer"
            );
            self.destroy(pooled).await;
        }
    }

    /// Destroys a borrowed producer instead of returning it.
    pub async fn evict(&self, handle: BorrowedProducer) {
        info!(kind = %handle.kind, producer = handle.id, "Evicting producer");
        self.destroy(Object::take(handle)).await;
    }

    async fn destroy(&self, mut pooled: PooledProducer) {
        if let Some(producer) = pooled.take_producer() {
            self.factory.destroy(producer).await;
        }
    }

    /// Borrow, send, release. A failed send is logged and returned; the
    /// producer goes back to the pool either way.
    pub async fn publish(&self, record: &OutboundRecord, kind: ProducerKind) -> Result<()> {
        let handle = self.borrow(kind).await?;
        let result = handle.send(record).await;

        if let Err(e) = &result {
            warn!(
                topic = %record.topic,
                kind = %kind,
                producer = handle.id,
                "Failed to publish record: {}", e
            );
        }

        self.release(handle).await;
        result
    }

    /// Closes the pool: waiting borrowers fail with [`Error::Shutdown`] and
    /// every idle producer is destroyed. Borrowed producers are destroyed as
    /// they come back.
    pub async fn shutdown(&self) {
        let drained = {
            let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
            if *closed {
                return;
            }
            *closed = true;

            info!("Shutting down producer pool");
            let mut drained = Vec::new();
            for pool in self.pools.values() {
                drained.extend(pool.retain(|_, _| false).removed);
                pool.close();
            }
            drained
        };

        let count = drained.len();
        futures::future::join_all(drained.into_iter().map(|p| self.destroy(p))).await;
        info!(destroyed = count, "Producer pool shut down");
    }

    /// Producers of `kind` currently alive, idle or borrowed.
    pub fn live_count(&self, kind: ProducerKind) -> usize {
        self.pool(kind).map(|p| p.status().size).unwrap_or_default()
    }

    pub fn idle_count(&self, kind: ProducerKind) -> usize {
        self.pool(kind).map(|p| p.status().available).unwrap_or_default()
    }
}

/// Borrow from an uncapped sub-pool, doubling its size instead of waiting.
async fn get_growing(
    pool: &Pool<ProducerManager>,
) -> std::result::Result<BorrowedProducer, PoolError<Error>> {
    let no_wait = Timeouts {
        wait: Some(Duration::ZERO),
        ..Timeouts::default()
    };

    loop {
        match pool.timeout_get(&no_wait).await {
            Err(PoolError::Timeout(TimeoutType::Wait)) => {
                let grown = pool.status().max_size.saturating_mul(2);
                debug!(max_size = grown, "Growing uncapped producer pool");
                pool.resize(grown);
            }
            other => return other,
        }
    }
}
